//! Incremental XML pull tokenizer for fixed memory budgets.
//!
//! ## Description
//!
//! `scratch-xml` parses XML 1.0 without reading the whole document into
//! memory and without allocating on its own: every string it produces —
//! element names, attribute names and values, character content,
//! processing-instruction targets and bodies — is staged inside a single
//! scratch buffer the host supplies up front. The host feeds input in
//! chunks of any size (chunk boundaries may fall inside a multi-byte code
//! point) and pulls one token at a time with [`Parser::parse`].
//!
//! Documents in UTF-8, UTF-16 LE and UTF-16 BE are supported; the encoding
//! is detected from the byte-order mark or the `<?xml encoding="…"?>`
//! declaration. Observable strings are byte slices in *document* encoding —
//! use [`Parser::decoder`] to turn them into `str`.
//!
//! ## Example
//!
//! ```
//! use scratch_xml::{Event, Parser};
//!
//! let xml = br#"<greeting lang="en">hello &amp; welcome</greeting>"#;
//!
//! // The parser stages everything in this buffer and never allocates more;
//! // a buffer that turns out too small can be swapped for a larger one
//! // mid-parse with `Parser::grow`.
//! let mut parser = Parser::new(vec![0; 256]);
//!
//! let mut tags = Vec::new();
//! let mut text = None;
//! loop {
//!     match parser.parse(xml) {
//!         Ok(Event::Start) => tags.push(parser.tag().unwrap().to_vec()),
//!         Ok(Event::Attribute) => {
//!             assert_eq!(parser.attribute(), Some(&b"lang"[..]));
//!             assert_eq!(parser.value(), Some(&b"en"[..]));
//!         }
//!         Ok(Event::End) => text = parser.content().map(<[u8]>::to_vec),
//!         Ok(Event::Eof) => break,
//!         Ok(_) => {}
//!         Err(e) => panic!("error at {}:{}: {}", parser.line(), parser.column(), e),
//!     }
//! }
//! assert_eq!(tags, [b"greeting".to_vec()]);
//! assert_eq!(text.unwrap(), b"hello & welcome");
//! ```
//!
//! ## Feeding input in chunks
//!
//! [`Parser::parse`] consumes the given slice until it either reaches a
//! token boundary or runs out of bytes. In the latter case it returns
//! [`Error::UnexpectedEof`]; pass the next chunk (a slice with a different
//! address) to continue exactly where decoding stalled. Likewise,
//! [`Error::NoRoom`] suspends parsing until [`Parser::grow`] installs a
//! larger scratch buffer. Both recoveries are loss-free: the token stream
//! does not depend on where the input was split or when the buffer grew.
#![cfg_attr(
    feature = "document-features",
    cfg_attr(doc, doc = ::document_features::document_features!())
)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod errors;

mod encoding;
mod parser;
mod scratch;
mod strings;

// reexports
pub use crate::codec::Encoding;
pub use crate::encoding::Decoder;
pub use crate::errors::{Error, Result, SyntaxError};
pub use crate::parser::{Event, Parser};
