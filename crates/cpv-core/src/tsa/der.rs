//! Minimal ASN.1 DER reader and writer.
//!
//! Covers the subset needed for RFC 3161 time-stamp tokens and requests:
//! single-byte tags, definite lengths up to four length octets, and
//! object identifiers. Indefinite lengths (BER) are rejected.

use thiserror::Error;

use crate::error::VerifyError;

/// `BOOLEAN`.
pub const TAG_BOOLEAN: u8 = 0x01;
/// `INTEGER`.
pub const TAG_INTEGER: u8 = 0x02;
/// `OCTET STRING`.
pub const TAG_OCTET_STRING: u8 = 0x04;
/// `NULL`.
pub const TAG_NULL: u8 = 0x05;
/// `OBJECT IDENTIFIER`.
pub const TAG_OID: u8 = 0x06;
/// `GeneralizedTime`.
pub const TAG_GENERALIZED_TIME: u8 = 0x18;
/// `SEQUENCE`.
pub const TAG_SEQUENCE: u8 = 0x30;
/// `SET`.
pub const TAG_SET: u8 = 0x31;
/// Context-specific, constructed, tag number 0.
pub const TAG_CONTEXT_0: u8 = 0xA0;
/// Context-specific, constructed, tag number 1.
pub const TAG_CONTEXT_1: u8 = 0xA1;

/// Largest DER input accepted.
pub const MAX_DER_SIZE: usize = 64 * 1024;

/// DER decoding failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DerError {
    /// Input ended inside an element.
    #[error("truncated DER element at offset {offset}")]
    Truncated {
        /// Byte offset where more input was needed.
        offset: usize,
    },

    /// Indefinite-length encoding.
    #[error("indefinite length at offset {offset} is not DER")]
    IndefiniteLength {
        /// Byte offset of the length octet.
        offset: usize,
    },

    /// Length field wider than supported.
    #[error("length at offset {offset} uses {octets} octets")]
    LengthTooLarge {
        /// Byte offset of the length octet.
        offset: usize,
        /// Declared number of length octets.
        octets: usize,
    },

    /// Multi-byte tag numbers are not supported.
    #[error("high tag number form at offset {offset}")]
    HighTagNumber {
        /// Byte offset of the tag.
        offset: usize,
    },

    /// A different tag was found than required.
    #[error("expected tag 0x{expected:02x}, found 0x{found:02x} at offset {offset}")]
    UnexpectedTag {
        /// Required tag.
        expected: u8,
        /// Tag present.
        found: u8,
        /// Byte offset of the tag.
        offset: usize,
    },

    /// Bytes remained after the outermost element.
    #[error("{remaining} trailing bytes after DER element")]
    TrailingData {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// Input exceeds [`MAX_DER_SIZE`].
    #[error("DER input of {size} bytes exceeds maximum {max}")]
    TooLarge {
        /// Input size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// Content of a primitive element is malformed.
    #[error("malformed {what}")]
    Malformed {
        /// What was being decoded.
        what: &'static str,
    },
}

impl From<DerError> for VerifyError {
    fn from(e: DerError) -> Self {
        Self::token_unparseable(e.to_string())
    }
}

/// One decoded element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Identifier octet.
    pub tag: u8,
    /// Content octets.
    pub content: &'a [u8],
    /// The complete encoding: identifier, length and content octets.
    pub raw: &'a [u8],
    /// Offset of the tag from the start of the outermost input.
    pub offset: usize,
}

/// Sequential reader over concatenated DER elements.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    input: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> DerReader<'a> {
    /// Reader over `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            base: 0,
        }
    }

    /// Reader over the content of a constructed element.
    #[must_use]
    pub const fn nested(tlv: &Tlv<'a>) -> Self {
        Self {
            input: tlv.content,
            pos: 0,
            base: tlv.offset + (tlv.raw.len() - tlv.content.len()),
        }
    }

    /// True once every element has been read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Tag of the next element without consuming it.
    #[must_use]
    pub fn peek_tag(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Reads the next element, whatever its tag.
    ///
    /// # Errors
    ///
    /// Returns a [`DerError`] if the element is not well-formed DER.
    pub fn read_any(&mut self) -> Result<Tlv<'a>, DerError> {
        let offset = self.base + self.pos;
        let tag = *self
            .input
            .get(self.pos)
            .ok_or(DerError::Truncated { offset })?;
        if tag & 0x1f == 0x1f {
            return Err(DerError::HighTagNumber { offset });
        }

        let len_offset = offset + 1;
        let first = *self
            .input
            .get(self.pos + 1)
            .ok_or(DerError::Truncated { offset: len_offset })?;
        let mut cursor = self.pos + 2;
        let len = match first {
            0x00..=0x7f => usize::from(first),
            0x80 => return Err(DerError::IndefiniteLength { offset: len_offset }),
            _ => {
                let octets = usize::from(first & 0x7f);
                if octets > 4 {
                    return Err(DerError::LengthTooLarge {
                        offset: len_offset,
                        octets,
                    });
                }
                let bytes = self
                    .input
                    .get(cursor..cursor + octets)
                    .ok_or(DerError::Truncated { offset: len_offset })?;
                cursor += octets;
                bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
            },
        };

        let end = cursor.saturating_add(len);
        let content = self.input.get(cursor..end).ok_or(DerError::Truncated {
            offset: self.base + cursor,
        })?;
        let raw = &self.input[self.pos..end];
        self.pos = end;
        Ok(Tlv {
            tag,
            content,
            raw,
            offset,
        })
    }

    /// Reads the next element, which must carry `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`DerError::UnexpectedTag`] for a different tag, or any
    /// decoding error.
    pub fn read(&mut self, tag: u8) -> Result<Tlv<'a>, DerError> {
        let tlv = self.read_any()?;
        if tlv.tag == tag {
            Ok(tlv)
        } else {
            Err(DerError::UnexpectedTag {
                expected: tag,
                found: tlv.tag,
                offset: tlv.offset,
            })
        }
    }

    /// Reads the next element only if it carries `tag`.
    ///
    /// # Errors
    ///
    /// Returns a [`DerError`] if the element is present but malformed.
    pub fn read_optional(&mut self, tag: u8) -> Result<Option<Tlv<'a>>, DerError> {
        if self.peek_tag() == Some(tag) {
            self.read(tag).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Fails if unread bytes remain.
    ///
    /// # Errors
    ///
    /// Returns [`DerError::TrailingData`].
    pub const fn finish(&self) -> Result<(), DerError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DerError::TrailingData {
                remaining: self.input.len() - self.pos,
            })
        }
    }
}

/// Parses `input` as exactly one element carrying `tag`.
///
/// # Errors
///
/// Returns a [`DerError`] if `input` is oversized, malformed, carries a
/// different tag, or has trailing bytes.
pub fn parse_single(input: &[u8], tag: u8) -> Result<Tlv<'_>, DerError> {
    if input.len() > MAX_DER_SIZE {
        return Err(DerError::TooLarge {
            size: input.len(),
            max: MAX_DER_SIZE,
        });
    }
    let mut reader = DerReader::new(input);
    let tlv = reader.read(tag)?;
    reader.finish()?;
    Ok(tlv)
}

/// Decodes a small non-negative `INTEGER` content.
///
/// # Errors
///
/// Returns [`DerError::Malformed`] for negative values or values wider than
/// 64 bits.
pub fn decode_u64(content: &[u8]) -> Result<u64, DerError> {
    let malformed = DerError::Malformed { what: "INTEGER" };
    match content {
        [] => Err(malformed),
        [first, ..] if first & 0x80 != 0 => Err(malformed),
        _ => {
            let trimmed = content.strip_prefix(&[0]).filter(|r| !r.is_empty()).unwrap_or(content);
            if trimmed.len() > 8 {
                return Err(malformed);
            }
            Ok(trimmed.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
        },
    }
}

/// Renders `OBJECT IDENTIFIER` content in dotted form.
///
/// # Errors
///
/// Returns [`DerError::Malformed`] for truncated or oversized arcs.
pub fn decode_oid(content: &[u8]) -> Result<String, DerError> {
    let malformed = DerError::Malformed {
        what: "OBJECT IDENTIFIER",
    };
    let mut arcs: Vec<u64> = Vec::new();
    let mut value: u64 = 0;
    let mut pending = false;
    for byte in content {
        if value > (u64::MAX >> 7) {
            return Err(malformed);
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        pending = byte & 0x80 != 0;
        if !pending {
            if arcs.is_empty() {
                let first = (value / 40).min(2);
                arcs.push(first);
                arcs.push(value - first * 40);
            } else {
                arcs.push(value);
            }
            value = 0;
        }
    }
    if pending || arcs.is_empty() {
        return Err(malformed);
    }
    Ok(arcs
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("."))
}

/// Encodes a dotted object identifier as `OBJECT IDENTIFIER` content.
///
/// # Errors
///
/// Returns [`DerError::Malformed`] if `dotted` is not a valid OID.
pub fn encode_oid(dotted: &str) -> Result<Vec<u8>, DerError> {
    let malformed = DerError::Malformed {
        what: "OBJECT IDENTIFIER",
    };
    let arcs = dotted
        .split('.')
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed.clone())?;
    let [first, second, rest @ ..] = arcs.as_slice() else {
        return Err(malformed);
    };
    if *first > 2 || (*first < 2 && *second >= 40) {
        return Err(malformed);
    }

    let mut out = Vec::new();
    for arc in std::iter::once(first * 40 + second).chain(rest.iter().copied()) {
        let mut groups = vec![(arc & 0x7f) as u8];
        let mut rem = arc >> 7;
        while rem > 0 {
            groups.push(((rem & 0x7f) as u8) | 0x80);
            rem >>= 7;
        }
        out.extend(groups.iter().rev());
    }
    Ok(out)
}

/// Encodes one element.
#[must_use]
pub fn encode(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

/// Encodes a constructed element from already-encoded children.
#[must_use]
pub fn encode_constructed(tag: u8, children: &[Vec<u8>]) -> Vec<u8> {
    encode(tag, &children.concat())
}

/// Encodes a non-negative `INTEGER`.
#[must_use]
pub fn encode_u64(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let mut content = bytes[skip..].to_vec();
    if content[0] & 0x80 != 0 {
        content.insert(0, 0);
    }
    encode(TAG_INTEGER, &content)
}
