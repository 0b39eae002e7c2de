//! Code-point level codec for the encodings an XML document can use.
//!
//! The tokenizer consumes exactly one code point per state transition, so
//! everything here works on a single [`Char`] at a time: [`decode`] reads the
//! next code point from a byte window, [`encode`] serializes a scalar back
//! into document byte order (used when a character reference is resolved into
//! the scratch buffer).

/// Unicode "byte order mark" encoded as UTF-8.
pub(crate) const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
/// Unicode "byte order mark" encoded as UTF-16 with little-endian byte order.
pub(crate) const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
/// Unicode "byte order mark" encoded as UTF-16 with big-endian byte order.
pub(crate) const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// The character encoding a document is parsed in.
///
/// The encoding is [`Unknown`] until a byte-order mark or an
/// `<?xml encoding="…"?>` declaration establishes it. `Unknown` input is
/// treated as a single-byte encoding, which is correct for any document that
/// only uses code points up to `U+007F`.
///
/// [`Unknown`]: Encoding::Unknown
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// No BOM or declaration seen yet; bytes are decoded as 8-bit values.
    Unknown,
    /// UTF-8, one to four bytes per code point.
    Utf8,
    /// UTF-16 little-endian, two or four bytes per code point.
    Utf16Le,
    /// UTF-16 big-endian, two or four bytes per code point.
    Utf16Be,
}

impl Encoding {
    /// Returns `true` for both UTF-16 flavors.
    #[inline]
    pub fn is_utf16(self) -> bool {
        matches!(self, Self::Utf16Le | Self::Utf16Be)
    }

    /// Size in bytes of a string terminator (one 16-bit unit for UTF-16).
    #[inline]
    pub(crate) fn terminator_len(self) -> usize {
        if self.is_utf16() {
            2
        } else {
            1
        }
    }
}

/// One decoded code point together with its serialized form in document
/// byte order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Char {
    /// The Unicode scalar value (or raw byte value for [`Encoding::Unknown`]).
    pub value: u32,
    bytes: [u8; 4],
    len: u8,
}

impl Char {
    /// The encoded bytes, in the order they appear in the document.
    #[inline]
    pub fn encoded(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Number of bytes this code point occupies in the document.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// `true` if the code point occupies no bytes. Never the case for values
    /// produced by [`decode`] or [`encode`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Decodes the next code point from the start of `bytes`.
///
/// Returns `None` if the slice does not hold enough bytes to decode one full
/// code point — the caller is expected to stash the partial bytes and retry
/// once more input is available. This is the sole mechanism by which chunk
/// boundaries inside a code point are handled.
///
/// A lead byte announcing an impossible sequence is not validated here;
/// continuation bytes are masked as-is, mirroring what the grammar layer can
/// actually observe one code point at a time.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Option<Char> {
    match encoding {
        Encoding::Unknown => {
            let b = *bytes.first()?;
            Some(Char {
                value: u32::from(b),
                bytes: [b, 0, 0, 0],
                len: 1,
            })
        }
        Encoding::Utf8 => {
            let b0 = *bytes.first()?;
            // 0xxxxxxx / 110xxxxx / 1110xxxx / 11110xxx
            let len: usize = if b0 & 0x80 == 0x00 {
                1
            } else if b0 & 0xE0 == 0xC0 {
                2
            } else if b0 & 0xF0 == 0xE0 {
                3
            } else if b0 & 0xF8 == 0xF0 {
                4
            } else {
                // A stray continuation byte decodes as its raw value; the
                // grammar layer rejects it where it is not character data.
                return Some(Char {
                    value: u32::from(b0),
                    bytes: [b0, 0, 0, 0],
                    len: 1,
                });
            };
            if bytes.len() < len {
                return None;
            }
            let value = match len {
                1 => u32::from(b0 & 0x7F),
                2 => (u32::from(b0 & 0x1F) << 6) | u32::from(bytes[1] & 0x3F),
                3 => {
                    (u32::from(b0 & 0x0F) << 12)
                        | (u32::from(bytes[1] & 0x3F) << 6)
                        | u32::from(bytes[2] & 0x3F)
                }
                _ => {
                    (u32::from(b0 & 0x07) << 18)
                        | (u32::from(bytes[1] & 0x3F) << 12)
                        | (u32::from(bytes[2] & 0x3F) << 6)
                        | u32::from(bytes[3] & 0x3F)
                }
            };
            Some(pack(value, &bytes[..len]))
        }
        Encoding::Utf16Be => {
            if bytes.len() < 2 {
                return None;
            }
            // A high surrogate (110110xx) opens a four-byte pair; we must see
            // all four bytes before deciding, so a straddled pair never
            // decodes differently depending on how the input was chunked.
            if bytes[0] >> 2 == 0x36 {
                if bytes.len() < 4 {
                    return None;
                }
                if bytes[2] >> 2 == 0x37 {
                    let value = ((u32::from(bytes[0] & 0x03) << 18)
                        | (u32::from(bytes[1]) << 10)
                        | (u32::from(bytes[2] & 0x03) << 8)
                        | u32::from(bytes[3]))
                        + 0x1_0000;
                    return Some(pack(value, &bytes[..4]));
                }
            }
            let value = (u32::from(bytes[0]) << 8) | u32::from(bytes[1]);
            Some(pack(value, &bytes[..2]))
        }
        Encoding::Utf16Le => {
            if bytes.len() < 2 {
                return None;
            }
            if bytes[1] >> 2 == 0x36 {
                if bytes.len() < 4 {
                    return None;
                }
                if bytes[3] >> 2 == 0x37 {
                    let value = ((u32::from(bytes[1] & 0x03) << 18)
                        | (u32::from(bytes[0]) << 10)
                        | (u32::from(bytes[3] & 0x03) << 8)
                        | u32::from(bytes[2]))
                        + 0x1_0000;
                    return Some(pack(value, &bytes[..4]));
                }
            }
            let value = (u32::from(bytes[1]) << 8) | u32::from(bytes[0]);
            Some(pack(value, &bytes[..2]))
        }
    }
}

/// Encodes a Unicode scalar into document byte order.
///
/// Returns `None` if `value` cannot be represented in the encoding: the
/// surrogate range `U+D800..=U+DFFF` and anything above `U+10FFFF` are
/// rejected. [`Encoding::Unknown`] encodes as UTF-8.
pub fn encode(value: u32, encoding: Encoding) -> Option<Char> {
    match encoding {
        Encoding::Unknown | Encoding::Utf8 => match value {
            0..=0x7F => Some(Char {
                value,
                bytes: [value as u8, 0, 0, 0],
                len: 1,
            }),
            0x80..=0x7FF => Some(Char {
                value,
                bytes: [0xC0 | (value >> 6) as u8, 0x80 | (value & 0x3F) as u8, 0, 0],
                len: 2,
            }),
            0x800..=0xD7FF | 0xE000..=0xFFFF => Some(Char {
                value,
                bytes: [
                    0xE0 | (value >> 12) as u8,
                    0x80 | ((value >> 6) & 0x3F) as u8,
                    0x80 | (value & 0x3F) as u8,
                    0,
                ],
                len: 3,
            }),
            0x1_0000..=0x10_FFFF => Some(Char {
                value,
                bytes: [
                    0xF0 | (value >> 18) as u8,
                    0x80 | ((value >> 12) & 0x3F) as u8,
                    0x80 | ((value >> 6) & 0x3F) as u8,
                    0x80 | (value & 0x3F) as u8,
                ],
                len: 4,
            }),
            _ => None,
        },
        Encoding::Utf16Be | Encoding::Utf16Le => {
            let swap = encoding == Encoding::Utf16Le;
            match value {
                0..=0xD7FF | 0xE000..=0xFFFF => {
                    let (hi, lo) = ((value >> 8) as u8, (value & 0xFF) as u8);
                    let bytes = if swap {
                        [lo, hi, 0, 0]
                    } else {
                        [hi, lo, 0, 0]
                    };
                    Some(Char {
                        value,
                        bytes,
                        len: 2,
                    })
                }
                0x1_0000..=0x10_FFFF => {
                    let v = value - 0x1_0000;
                    let high = 0xD800 | (v >> 10);
                    let low = 0xDC00 | (v & 0x3FF);
                    let (h0, h1) = ((high >> 8) as u8, (high & 0xFF) as u8);
                    let (l0, l1) = ((low >> 8) as u8, (low & 0xFF) as u8);
                    let bytes = if swap {
                        [h1, h0, l1, l0]
                    } else {
                        [h0, h1, l0, l1]
                    };
                    Some(Char {
                        value,
                        bytes,
                        len: 4,
                    })
                }
                _ => None,
            }
        }
    }
}

/// Encodes an ASCII byte. Infallible, for the handful of literal characters
/// the state machine writes back into the buffer itself.
pub(crate) fn ascii(byte: u8, encoding: Encoding) -> Char {
    debug_assert!(byte < 0x80);
    match encoding {
        Encoding::Unknown | Encoding::Utf8 => Char {
            value: u32::from(byte),
            bytes: [byte, 0, 0, 0],
            len: 1,
        },
        Encoding::Utf16Be => Char {
            value: u32::from(byte),
            bytes: [0, byte, 0, 0],
            len: 2,
        },
        Encoding::Utf16Le => Char {
            value: u32::from(byte),
            bytes: [byte, 0, 0, 0],
            len: 2,
        },
    }
}

#[inline]
fn pack(value: u32, encoded: &[u8]) -> Char {
    let mut bytes = [0u8; 4];
    bytes[..encoded.len()].copy_from_slice(encoded);
    Char {
        value,
        bytes,
        len: encoded.len() as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn utf8_lengths() {
        assert_eq!(decode(b"A", Encoding::Utf8).unwrap().value, 0x41);
        assert_eq!(decode("é".as_bytes(), Encoding::Utf8).unwrap().len(), 2);
        assert_eq!(decode("€".as_bytes(), Encoding::Utf8).unwrap().value, 0x20AC);
        assert_eq!(
            decode("𝄞".as_bytes(), Encoding::Utf8).unwrap().value,
            0x1D11E
        );
    }

    #[test]
    fn utf16_surrogate_pairs() {
        // 𝄞 = U+1D11E = D834 DD1E
        let be = [0xD8, 0x34, 0xDD, 0x1E];
        let le = [0x34, 0xD8, 0x1E, 0xDD];
        assert_eq!(decode(&be, Encoding::Utf16Be).unwrap().value, 0x1D11E);
        assert_eq!(decode(&le, Encoding::Utf16Le).unwrap().value, 0x1D11E);
        assert_eq!(decode(&be, Encoding::Utf16Be).unwrap().len(), 4);
    }

    #[test]
    fn insufficient_input() {
        assert_eq!(decode(b"", Encoding::Unknown), None);
        assert_eq!(decode(&[0xE2, 0x82], Encoding::Utf8), None);
        assert_eq!(decode(&[0x00], Encoding::Utf16Be), None);
        // a high surrogate needs the full pair before it decodes
        assert_eq!(decode(&[0xD8, 0x34], Encoding::Utf16Be), None);
        assert_eq!(decode(&[0x34, 0xD8, 0x1E], Encoding::Utf16Le), None);
    }

    #[test]
    fn round_trips() {
        for &encoding in &[Encoding::Utf8, Encoding::Utf16Le, Encoding::Utf16Be] {
            for &value in &[0x09, 0x41, 0xE9, 0x20AC, 0xD7FF, 0xE000, 0xFFFD, 0x1D11E, 0x10FFFF] {
                let c = encode(value, encoding).unwrap();
                let back = decode(c.encoded(), encoding).unwrap();
                assert_eq!(back.value, value, "{:#X} in {:?}", value, encoding);
                assert_eq!(back.len(), c.len());
            }
        }
    }

    #[test]
    fn rejects_illegal_scalars() {
        for &encoding in &[Encoding::Utf8, Encoding::Utf16Le, Encoding::Utf16Be] {
            assert_eq!(encode(0xD800, encoding), None);
            assert_eq!(encode(0xDFFF, encoding), None);
            assert_eq!(encode(0x11_0000, encoding), None);
        }
    }

    #[test]
    fn unknown_is_single_byte() {
        let c = decode(&[0xFF, 0xFE], Encoding::Unknown).unwrap();
        assert_eq!((c.value, c.len()), (0xFF, 1));
    }
}
