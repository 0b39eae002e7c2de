//! Error management module

use std::error::Error as StdError;
use std::fmt;

/// An error returned when the tokenizer cannot make progress.
///
/// Two variants are recoverable:
///
/// - [`Error::NoRoom`] clears after [`Parser::grow`] installs a larger
///   scratch buffer;
/// - [`Error::UnexpectedEof`] clears after [`Parser::parse`] is called with
///   more input.
///
/// Every other variant is terminal: the parser stays in the error state and
/// repeats the same error on subsequent calls. The location of the offending
/// code point is available from [`Parser::line`] and [`Parser::column`].
///
/// [`Parser::grow`]: crate::Parser::grow
/// [`Parser::parse`]: crate::Parser::parse
/// [`Parser::line`]: crate::Parser::line
/// [`Parser::column`]: crate::Parser::column
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The next write would overflow the scratch buffer. Recoverable: call
    /// [`Parser::grow`] with a larger buffer and parsing resumes at the code
    /// point that could not be stored.
    ///
    /// [`Parser::grow`]: crate::Parser::grow
    NoRoom,
    /// The input slice ran out before a token boundary, possibly in the
    /// middle of a multi-byte code point. Recoverable: call
    /// [`Parser::parse`] with the next chunk of the document.
    ///
    /// [`Parser::parse`]: crate::Parser::parse
    UnexpectedEof,
    /// The document violates the XML grammar.
    Syntax(SyntaxError),
    /// The byte-order mark and the `<?xml encoding="…"?>` declaration
    /// contradict each other, or UTF-16 was declared without a BOM.
    Encoding,
    /// A close tag does not match the open tag it would close, for example
    /// `<tag>` followed by `</tga>`.
    MismatchedTag,
    /// A `<!DOCTYPE>` declaration was found after the root element.
    DoctypeAfterRoot,
    /// An `<?xml?>` declaration was found after the root element.
    DeclAfterRoot,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoRoom => f.write_str("scratch buffer is too small for the next write"),
            Self::UnexpectedEof => f.write_str("unexpected end of input"),
            Self::Syntax(e) => write!(f, "syntax error: {}", e),
            Self::Encoding => f.write_str("byte-order mark and encoding declaration contradict"),
            Self::MismatchedTag => f.write_str("close tag does not match the open tag"),
            Self::DoctypeAfterRoot => {
                f.write_str("<!DOCTYPE> is only allowed before the root element")
            }
            Self::DeclAfterRoot => f.write_str("<?xml?> is only allowed before the root element"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Syntax(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyntaxError> for Error {
    #[inline]
    fn from(error: SyntaxError) -> Self {
        Self::Syntax(error)
    }
}

/// The XML construct that was malformed when [`Error::Syntax`] was returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyntaxError {
    /// A byte-order mark was begun but not completed.
    InvalidBom,
    /// Non-whitespace character data outside of the root element.
    ContentBeforeRoot,
    /// Unexpected character in a tag or element name, including `</tag/>`.
    InvalidTagName,
    /// Unexpected character in an attribute name or before the `=`.
    InvalidAttrName,
    /// An attribute value was not quoted or contains a raw `<`.
    InvalidAttrValue,
    /// Only comments, CDATA sections and `<!DOCTYPE>` can start with `<!`.
    InvalidBangMarkup,
    /// A comment was opened with a single `-`, or `--` inside a comment was
    /// not followed by `>`.
    InvalidComment,
    /// `<![` was not followed by `CDATA[`.
    InvalidCData,
    /// The `<!DOCTYPE` keyword or the declaration's name was malformed.
    InvalidDoctype,
    /// An entity or character reference could not be resolved: the name is
    /// not one of `lt`, `gt`, `amp`, `apos`, `quot`, or the referenced
    /// scalar is not a legal XML character.
    InvalidReference,
    /// A processing instruction's target was malformed or its `?` was not
    /// followed by `>`.
    InvalidPi,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidBom => f.write_str("incomplete byte-order mark"),
            Self::ContentBeforeRoot => f.write_str("character data outside of the root element"),
            Self::InvalidTagName => f.write_str("invalid character in tag name"),
            Self::InvalidAttrName => f.write_str("invalid character in attribute name"),
            Self::InvalidAttrValue => f.write_str("invalid character in attribute value"),
            Self::InvalidBangMarkup => {
                f.write_str("only comment, CDATA or DOCTYPE can start with `<!`")
            }
            Self::InvalidComment => f.write_str("invalid comment delimiter"),
            Self::InvalidCData => f.write_str("`<![` is not followed by `CDATA[`"),
            Self::InvalidDoctype => f.write_str("invalid document type declaration"),
            Self::InvalidReference => f.write_str("unresolvable entity or character reference"),
            Self::InvalidPi => f.write_str("invalid processing instruction"),
        }
    }
}

impl StdError for SyntaxError {}

/// A specialized `Result` type where the error is hard-wired to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
