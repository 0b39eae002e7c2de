//! Extraction of the `encoding="…"` pseudo-attribute from the content of an
//! `<?xml …?>` declaration, and its reconciliation with the encoding the
//! byte-order mark established.

use crate::codec::Encoding;
use crate::errors::Error;
use crate::strings::{self, Case, Chars};

/// What the declaration claims the document encoding to be.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Declared {
    Utf8,
    Utf16,
    /// Some other name; meaningful only when a BOM pinned the encoding.
    Other,
}

/// Longest encoding name this parser distinguishes ("UTF-16" = 6).
const NAME_CAP: usize = 8;

/// Looks for `encoding=` in the declaration's content and classifies the
/// quoted token that follows it. Returns `None` when the pseudo-attribute is
/// absent or malformed — an absent declaration never contradicts anything.
pub(super) fn declared_encoding(content: &[u8], encoding: Encoding) -> Option<Declared> {
    let at = strings::find(content, encoding, b"encoding=\0", Encoding::Unknown, Case::Sensitive)?;
    let mut it = Chars::new(&content[at..], encoding).skip("encoding=".len());
    let quote = it.next()?;
    if quote != u32::from(b'"') && quote != u32::from(b'\'') {
        return None;
    }
    let mut name = [0u32; NAME_CAP];
    let mut len = 0;
    loop {
        let c = it.next()?;
        if c == quote {
            break;
        }
        if len == NAME_CAP {
            return Some(Declared::Other);
        }
        name[len] = c;
        len += 1;
    }
    if matches_ascii(&name[..len], b"UTF-8") {
        Some(Declared::Utf8)
    } else if matches_ascii(&name[..len], b"UTF-16") {
        Some(Declared::Utf16)
    } else {
        Some(Declared::Other)
    }
}

/// Checks the BOM-derived encoding against the declared one.
///
/// Returns the encoding to continue parsing with, or [`Error::Encoding`] on
/// a contradiction. UTF-16 may only be declared when a UTF-16 BOM was seen:
/// without one there is no way to know the byte order.
pub(super) fn reconcile(current: Encoding, declared: Option<Declared>) -> Result<Encoding, Error> {
    match (current, declared) {
        (_, None) => Ok(current),
        (Encoding::Unknown, Some(Declared::Utf8)) => Ok(Encoding::Utf8),
        (Encoding::Unknown, Some(Declared::Utf16)) => Err(Error::Encoding),
        (Encoding::Unknown, Some(Declared::Other)) => Ok(current),
        (Encoding::Utf8, Some(Declared::Utf8)) => Ok(current),
        (Encoding::Utf16Le | Encoding::Utf16Be, Some(Declared::Utf16)) => Ok(current),
        _ => Err(Error::Encoding),
    }
}

fn matches_ascii(name: &[u32], expected: &[u8]) -> bool {
    name.len() == expected.len()
        && name
            .iter()
            .zip(expected)
            .all(|(&c, &e)| Case::Insensitive.fold(c) == Case::Insensitive.fold(u32::from(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_the_quoted_token() {
        let content = b"version=\"1.0\" encoding=\"UTF-8\"\0";
        assert_eq!(declared_encoding(content, Encoding::Utf8), Some(Declared::Utf8));
        assert_eq!(
            declared_encoding(b"encoding='utf-16'\0", Encoding::Unknown),
            Some(Declared::Utf16)
        );
        assert_eq!(
            declared_encoding(b"encoding=\"ISO-8859-1\"\0", Encoding::Unknown),
            Some(Declared::Other)
        );
        // UTF-16LE is not the same token as UTF-16
        assert_eq!(
            declared_encoding(b"encoding='UTF-16LE'\0", Encoding::Unknown),
            Some(Declared::Other)
        );
        assert_eq!(declared_encoding(b"version=\"1.0\"\0", Encoding::Utf8), None);
        // unterminated quote
        assert_eq!(declared_encoding(b"encoding=\"UTF-8\0", Encoding::Utf8), None);
    }

    #[test]
    fn reconciliation_rules() {
        use Encoding::*;
        assert_eq!(reconcile(Unknown, Some(Declared::Utf8)), Ok(Utf8));
        assert_eq!(reconcile(Unknown, Some(Declared::Utf16)), Err(Error::Encoding));
        assert_eq!(reconcile(Unknown, Some(Declared::Other)), Ok(Unknown));
        assert_eq!(reconcile(Unknown, None), Ok(Unknown));
        assert_eq!(reconcile(Utf8, Some(Declared::Utf8)), Ok(Utf8));
        assert_eq!(reconcile(Utf8, Some(Declared::Utf16)), Err(Error::Encoding));
        assert_eq!(reconcile(Utf16Le, Some(Declared::Utf16)), Ok(Utf16Le));
        assert_eq!(reconcile(Utf16Be, Some(Declared::Utf8)), Err(Error::Encoding));
        assert_eq!(reconcile(Utf16Be, None), Ok(Utf16Be));
    }
}
