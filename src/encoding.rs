//! A module for wrappers that decode the staged bytes for the host.

use std::borrow::Cow;

#[cfg(feature = "encoding")]
use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8};

use crate::codec::Encoding;
use crate::errors::{Error, Result};

/// Decoder of byte slices into strings.
///
/// The observable strings of a [`Parser`] — tag, attribute, value, content —
/// are byte slices in *document* encoding. `Decoder` turns them into `str`.
/// Obtain one from [`Parser::decoder`]; it carries whatever encoding the
/// byte-order mark or the XML declaration established at that point.
///
/// If feature `encoding` is disabled, the decoder handles UTF-8 and
/// [`Encoding::Unknown`] input only and returns [`Error::Encoding`] for
/// UTF-16 documents; the tokenizer itself still parses those fine.
///
/// [`Parser`]: crate::Parser
/// [`Parser::decoder`]: crate::Parser::decoder
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Decoder {
    pub(crate) encoding: Encoding,
}

impl Decoder {
    /// The document encoding this decoder was created with.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

#[cfg(not(feature = "encoding"))]
impl Decoder {
    /// Decodes the bytes of an observable string.
    ///
    /// Without the `encoding` feature only UTF-8 compatible input is
    /// accepted: malformed UTF-8 and UTF-16 documents yield
    /// [`Error::Encoding`].
    pub fn decode<'b>(&self, bytes: &'b [u8]) -> Result<Cow<'b, str>> {
        if self.encoding.is_utf16() {
            return Err(Error::Encoding);
        }
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(Cow::Borrowed(s)),
            Err(_) => Err(Error::Encoding),
        }
    }
}

#[cfg(feature = "encoding")]
impl Decoder {
    /// Decodes the bytes of an observable string using the document
    /// encoding.
    ///
    /// Returns [`Error::Encoding`] in case of malformed sequences in the
    /// `bytes`.
    pub fn decode<'b>(&self, bytes: &'b [u8]) -> Result<Cow<'b, str>> {
        let encoding = match self.encoding {
            Encoding::Unknown | Encoding::Utf8 => UTF_8,
            Encoding::Utf16Le => UTF_16LE,
            Encoding::Utf16Be => UTF_16BE,
        };
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or(Error::Encoding)
    }
}
