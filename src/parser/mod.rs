//! The tokenizer state machine and its context.
//!
//! [`Parser`] consumes the document one code point per state transition and
//! returns to the host at every token boundary. All string data is staged in
//! the host-supplied scratch buffer (see [`crate::scratch`]); the host reads
//! the strings of the token it just received through the observable
//! accessors ([`Parser::tag`] and friends), which stay valid until the next
//! [`Parser::parse`] call.
//!
//! Input arrives in arbitrarily-sized chunks. A code point straddling a
//! chunk boundary is carried over in a small fixed buffer and completed from
//! the next chunk, so the token stream is independent of how the document
//! was split.

use crate::codec::{self, Char, Encoding};
use crate::encoding::Decoder;
use crate::errors::{Error, Result, SyntaxError};
use crate::scratch::{flags, NoRoom, Scratch};
use crate::strings::{self, Case};

mod decl;

/// A token returned by [`Parser::parse`].
///
/// Tokens carry no data themselves; the strings belonging to the token are
/// read from the parser's observable accessors while the token is current.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Event {
    /// A start tag or empty element was opened; [`Parser::tag`] is its name.
    Start,
    /// An element was closed (`</tag>` or `<tag/>`); [`Parser::tag`] is its
    /// name and [`Parser::content`] its character content, if any.
    End,
    /// An attribute was parsed; [`Parser::attribute`], [`Parser::value`] and
    /// [`Parser::tag`] (the enclosing element) are set.
    Attribute,
    /// A processing instruction began; [`Parser::tag`] is its target.
    PiStart,
    /// A processing instruction ended; [`Parser::content`] is its body.
    PiEnd,
    /// The root element was closed; parsing is done.
    Eof,
}

/// Internal grammar state. One state transition per decoded code point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    /// Before the root element: initial, after `<?xml?>`, after a DOCTYPE.
    Document,
    /// `EF` seen at document start, expecting `BB`.
    Utf8Bom1,
    /// `EF BB` seen, expecting `BF`.
    Utf8Bom2,
    /// `FE` seen, expecting `FF`.
    Utf16BeBom,
    /// `FF` seen, expecting `FE`.
    Utf16LeBom,
    /// `<` consumed, a frame pushed; dispatching on the next code point.
    TagBegin,
    /// Inside an element or close-tag name.
    ElemName,
    /// Inside an open start tag after the name, between attributes.
    ElemTail,
    /// Inside an attribute name.
    AttrName,
    /// After an attribute name, expecting `=`.
    AttrNameTail,
    /// After `=`, expecting the opening quote.
    AttrAssign,
    /// Inside a quoted attribute value.
    AttrValue,
    /// Character content between a start tag and the next `<`.
    Content,
    /// `<!` seen; `-`, `[` or `D` decide what follows.
    Bang,
    /// `<!-` seen, expecting the second `-`.
    CommentOpen,
    /// Inside a comment.
    Comment,
    /// One `-` seen inside a comment.
    CommentDash,
    /// `--` seen inside a comment, expecting `>`.
    CommentClose,
    /// `<![` seen, expecting `C`.
    MaybeCData1,
    /// `<![C` seen, expecting `D`.
    MaybeCData2,
    /// `<![CD` seen, expecting `A`.
    MaybeCData3,
    /// `<![CDA` seen, expecting `T`.
    MaybeCData4,
    /// `<![CDAT` seen, expecting `A`.
    MaybeCData5,
    /// `<![CDATA` seen, expecting `[`.
    MaybeCData6,
    /// Inside a CDATA section.
    CDataContent,
    /// One `]` withheld; it may open the `]]>` terminator.
    CDataClose1,
    /// Two `]` withheld, expecting `>`.
    CDataClose2,
    /// `&` seen in content or an attribute value.
    RefBegin,
    /// Accumulating a predefined entity name.
    RefEntity,
    /// Accumulating decimal digits of `&#…;`.
    RefDecimal,
    /// Accumulating hex digits of `&#x…;`.
    RefHex,
    /// `<?` seen, expecting the target's first character.
    PiBegin,
    /// Inside a processing-instruction target.
    PiTarget,
    /// Inside a processing-instruction body.
    PiContent,
    /// `?` seen after the target or body, expecting `>`.
    PiClose,
    /// `<!D` seen, expecting `O`.
    MaybeDoctype1,
    /// `<!DO` seen, expecting `C`.
    MaybeDoctype2,
    /// `<!DOC` seen, expecting `T`.
    MaybeDoctype3,
    /// `<!DOCT` seen, expecting `Y`.
    MaybeDoctype4,
    /// `<!DOCTY` seen, expecting `P`.
    MaybeDoctype5,
    /// `<!DOCTYP` seen, expecting `E`.
    MaybeDoctype6,
    /// `<!DOCTYPE` seen, expecting whitespace.
    DoctypeGap,
    /// Whitespace after `<!DOCTYPE`, expecting the name.
    DoctypeLead,
    /// Inside the declaration's name.
    DoctypeName,
    /// Consuming declaration content up to a top-level `>`.
    DoctypeContent,
    /// Inside the `[ … ]` internal subset.
    DoctypeSubset,
    /// The root element has been closed.
    Done,
}

/// Deferred cleanup recorded when a token is emitted and executed at the
/// start of the next parse call, so the token's strings survive until then.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Post {
    /// Pop the frame whose tag just completed; may end the document.
    TagEnd,
    /// Retract the attribute name and value that were just delivered.
    AttrEnd,
}

/// Why parsing stopped, when it did not stop at a token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Halt {
    /// Terminal error; repeated on every further call.
    Fatal(Error),
    /// Out of input. `resume` re-enters the grammar when more arrives.
    NeedInput { resume: State },
    /// Out of buffer. `resume` re-enters the grammar after [`Parser::grow`].
    NeedRoom { resume: State },
}

/// Control flow of a single state transition.
enum Interrupt {
    /// The write did not fit; nothing was modified.
    Room,
    Fatal(Error),
}

impl From<NoRoom> for Interrupt {
    #[inline]
    fn from(_: NoRoom) -> Self {
        Self::Room
    }
}

impl From<SyntaxError> for Interrupt {
    #[inline]
    fn from(e: SyntaxError) -> Self {
        Self::Fatal(Error::Syntax(e))
    }
}

type Step = std::result::Result<Option<Event>, Interrupt>;

/// A pull-style, incremental XML tokenizer.
///
/// The parser owns the scratch buffer the host hands to [`Parser::new`] and
/// never allocates beyond it; when it reports [`Error::NoRoom`] the host
/// decides whether to supply a larger buffer via [`Parser::grow`].
///
/// ```
/// use scratch_xml::{Event, Parser};
///
/// let mut parser = Parser::new(vec![0; 128]);
/// let xml = b"<point x='4' y='2'/>";
///
/// assert_eq!(parser.parse(xml), Ok(Event::Start));
/// assert_eq!(parser.tag(), Some(&b"point"[..]));
/// assert_eq!(parser.parse(xml), Ok(Event::Attribute));
/// assert_eq!(parser.attribute(), Some(&b"x"[..]));
/// assert_eq!(parser.value(), Some(&b"4"[..]));
/// assert_eq!(parser.parse(xml), Ok(Event::Attribute));
/// assert_eq!(parser.parse(xml), Ok(Event::End));
/// assert_eq!(parser.parse(xml), Ok(Event::Eof));
/// ```
#[derive(Debug)]
pub struct Parser {
    scratch: Scratch,
    encoding: Encoding,
    state: State,
    post: Option<Post>,
    /// State to go back to when a comment or reference completes: the state
    /// that was current when its introducing `<` or `&` arrived.
    return_state: State,
    halt: Option<Halt>,
    /// Bytes of a code point straddling a chunk boundary.
    carry: [u8; 4],
    carry_len: u8,
    cursor: usize,
    /// Address of the last input slice, to detect when the host switches to
    /// a new chunk. Never dereferenced.
    input: Option<usize>,
    tag: Option<usize>,
    attribute: Option<usize>,
    value: Option<usize>,
    content: Option<usize>,
    /// First payload byte of the reference currently being accumulated.
    ref_start: Option<usize>,
    line: u32,
    column: u32,
    /// Position of the first code point of the current tag name, reported on
    /// a tag mismatch.
    mark_line: u32,
    mark_column: u32,
    /// A byte-order mark is only recognized before anything else was
    /// consumed.
    bom_ok: bool,
}

impl Parser {
    /// Creates a parser that stages its strings in `buffer`.
    ///
    /// The buffer is zeroed. It must at least fit one frame header plus the
    /// longest name in the document, or parsing will immediately ask for
    /// more via [`Error::NoRoom`].
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is 4 GiB or larger.
    pub fn new(buffer: Vec<u8>) -> Self {
        Self {
            scratch: Scratch::new(buffer),
            encoding: Encoding::Unknown,
            state: State::Document,
            post: None,
            return_state: State::Document,
            halt: None,
            carry: [0; 4],
            carry_len: 0,
            cursor: 0,
            input: None,
            tag: None,
            attribute: None,
            value: None,
            content: None,
            ref_start: None,
            line: 1,
            column: 0,
            mark_line: 1,
            mark_column: 0,
            bom_ok: true,
        }
    }

    /// Begins or continues parsing, returning the next token.
    ///
    /// Passing a slice with a new address starts consuming it from its first
    /// byte; passing the same slice again resumes at the internal cursor
    /// (extending the same slice in place is also honored). Call repeatedly
    /// with the same chunk until it is exhausted — that is signaled by
    /// [`Error::UnexpectedEof`], which clears once the next chunk arrives.
    ///
    /// An empty slice always returns [`Error::UnexpectedEof`].
    pub fn parse(&mut self, xml: &[u8]) -> Result<Event> {
        if xml.is_empty() {
            return Err(Error::UnexpectedEof);
        }
        match self.halt {
            Some(Halt::Fatal(e)) => return Err(e),
            Some(Halt::NeedRoom { .. }) => return Err(Error::NoRoom),
            Some(Halt::NeedInput { resume }) => {
                // Peek whether a whole code point can now be assembled from
                // the carry-over plus the new bytes before resuming.
                let fresh = if self.input == Some(xml.as_ptr() as usize) {
                    &xml[self.cursor.min(xml.len())..]
                } else {
                    xml
                };
                let n = self.carry_len as usize;
                let mut window = [0u8; 4];
                window[..n].copy_from_slice(&self.carry[..n]);
                let take = fresh.len().min(4 - n);
                window[n..n + take].copy_from_slice(&fresh[..take]);
                match codec::decode(&window[..n + take], self.encoding) {
                    Some(c) if c.value != 0 => {
                        self.state = resume;
                        self.halt = None;
                    }
                    _ => return Err(Error::UnexpectedEof),
                }
            }
            None => {}
        }
        if self.state == State::Done {
            return Ok(Event::Eof);
        }
        if self.post_cleanup() {
            return Ok(Event::Eof);
        }

        let addr = xml.as_ptr() as usize;
        if self.input != Some(addr) {
            self.input = Some(addr);
            self.cursor = 0;
        }

        loop {
            // Assemble up to four bytes from the carry-over and the input.
            let n = self.carry_len as usize;
            let rem = xml.len().saturating_sub(self.cursor);
            let take = rem.min(4 - n);
            let mut window = [0u8; 4];
            window[..n].copy_from_slice(&self.carry[..n]);
            window[n..n + take].copy_from_slice(&xml[self.cursor..self.cursor + take]);
            let avail = n + take;

            let c = match codec::decode(&window[..avail], self.encoding) {
                // A NUL code point ends the input like the original
                // C-string contract; it cannot occur in a document.
                Some(c) if c.value != 0 => c,
                _ => {
                    self.carry[..avail].copy_from_slice(&window[..avail]);
                    self.carry_len = avail as u8;
                    self.cursor += take;
                    self.halt = Some(Halt::NeedInput { resume: self.state });
                    return Err(Error::UnexpectedEof);
                }
            };

            let (line, column) = (self.line, self.column);
            if is_new_line(c.value) {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
            let consumed = c.len() - n;
            self.cursor += consumed;
            self.carry_len = 0;

            let state = self.state;
            match self.step(&c) {
                Ok(None) => {}
                Ok(Some(event)) => return Ok(event),
                Err(Interrupt::Room) => {
                    // The code point was not stored; rewind so it is
                    // re-delivered against the grown buffer.
                    self.cursor -= consumed;
                    self.carry_len = n as u8;
                    self.line = line;
                    self.column = column;
                    self.halt = Some(Halt::NeedRoom { resume: state });
                    return Err(Error::NoRoom);
                }
                Err(Interrupt::Fatal(e)) => {
                    self.halt = Some(Halt::Fatal(e));
                    return Err(e);
                }
            }
        }
    }

    /// Installs a strictly larger scratch buffer, the recovery path for
    /// [`Error::NoRoom`].
    ///
    /// All staged strings and the observable accessors carry over unchanged.
    /// Returns the buffer that is no longer in use: the previous one on
    /// success, or `new` itself if it was not larger than the current
    /// buffer (in which case nothing changes).
    ///
    /// # Panics
    ///
    /// Panics if `new` is 4 GiB or larger.
    pub fn grow(&mut self, new: Vec<u8>) -> Vec<u8> {
        match self.scratch.grow(new) {
            Ok(old) => {
                if let Some(Halt::NeedRoom { resume }) = self.halt {
                    self.state = resume;
                    self.halt = None;
                }
                old
            }
            Err(rejected) => rejected,
        }
    }

    /// The name of the open or just-closed element, or the target of the
    /// current processing instruction, in document encoding.
    pub fn tag(&self) -> Option<&[u8]> {
        self.observable(self.tag)
    }

    /// The name of the attribute delivered by [`Event::Attribute`].
    pub fn attribute(&self) -> Option<&[u8]> {
        self.observable(self.attribute)
    }

    /// The value of the attribute delivered by [`Event::Attribute`].
    pub fn value(&self) -> Option<&[u8]> {
        self.observable(self.value)
    }

    /// The character content of the element closed by [`Event::End`]
    /// (including whitespace), or the body of a processing instruction at
    /// [`Event::PiEnd`].
    pub fn content(&self) -> Option<&[u8]> {
        self.observable(self.content)
    }

    /// Line of the code point last consumed, 1-based. Lines are delimited by
    /// line feeds and carriage returns.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Column of the code point last consumed on the current line, 1-based.
    /// Byte-order-mark bytes are not counted.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// The document encoding as established by the byte-order mark or the
    /// XML declaration, [`Encoding::Unknown`] before either was seen.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// A [`Decoder`] for turning the observable byte strings into `str` in
    /// the current document encoding.
    pub fn decoder(&self) -> Decoder {
        Decoder {
            encoding: self.encoding,
        }
    }

    fn observable(&self, offset: Option<usize>) -> Option<&[u8]> {
        offset.map(|o| strings::terminated(&self.scratch.bytes()[o..], self.encoding))
    }

    /// Runs the cleanup a previous token deferred. Returns `true` when the
    /// document ended with it.
    fn post_cleanup(&mut self) -> bool {
        match self.post.take() {
            None => false,
            Some(Post::AttrEnd) => {
                // Retract the delivered attribute so the space is reused.
                if let Some(at) = self.attribute.take() {
                    self.scratch.retract(at);
                }
                self.value = None;
                false
            }
            Some(Post::TagEnd) => {
                let was_decl = match self.scratch.head() {
                    Some(frame) => {
                        self.scratch.flags_of(frame) & flags::PROCESSING_INSTRUCTION != 0
                            && strings::eq(
                                self.name_at(frame),
                                self.encoding,
                                b"xml",
                                Encoding::Unknown,
                                Case::Insensitive,
                            )
                    }
                    None => false,
                };
                if was_decl {
                    // The declaration does not open the document's root.
                    self.state = State::Document;
                }
                self.pop_frame();
                if self.scratch.head().is_none() && !was_decl {
                    self.state = State::Done;
                    return true;
                }
                false
            }
        }
    }

    fn pop_frame(&mut self) {
        self.scratch.pop();
        self.tag = None;
        self.attribute = None;
        self.value = None;
        self.content = None;
    }

    /// Payload bytes of a frame up to the end of the buffer; reads stop at
    /// the string terminator.
    fn name_at(&self, frame: usize) -> &[u8] {
        &self.scratch.bytes()[Scratch::payload(frame)..]
    }

    /// `<` was consumed: open a frame and remember where to come back to
    /// should this turn out to be a comment.
    fn begin_tag(&mut self) -> std::result::Result<(), Interrupt> {
        self.scratch.push()?;
        self.return_state = self.state;
        self.state = State::TagBegin;
        Ok(())
    }

    /// A complete tag was recognized. Dispatches on the head frame's flags
    /// and emits the corresponding token.
    fn end_tag(&mut self) -> std::result::Result<Event, Interrupt> {
        self.state = State::Content;
        self.post = Some(Post::TagEnd);
        let frame = match self.scratch.head() {
            Some(frame) => frame,
            None => return Err(SyntaxError::InvalidTagName.into()),
        };
        let frame_flags = self.scratch.flags_of(frame);
        if frame_flags & flags::END_TAG != 0 {
            // a name-start character is required before this state is reached
            debug_assert!(strings::len(self.name_at(frame), self.encoding) > 0);
            let parent = self.scratch.parent_of(frame);
            let matches = parent.map_or(false, |p| {
                strings::eq(
                    self.name_at(frame),
                    self.encoding,
                    self.name_at(p),
                    self.encoding,
                    Case::Sensitive,
                )
            });
            match parent {
                Some(parent) if matches => {
                    self.pop_frame();
                    let tag = Scratch::payload(parent);
                    self.tag = Some(tag);
                    let name_bytes =
                        strings::terminated(&self.scratch.bytes()[tag..], self.encoding).len();
                    self.content = Some(tag + name_bytes + self.encoding.terminator_len());
                    Ok(Event::End)
                }
                _ => {
                    // Report the position of the close tag's name, not of
                    // the `>` that completed it.
                    self.line = self.mark_line;
                    self.column = self.mark_column;
                    Err(Interrupt::Fatal(Error::MismatchedTag))
                }
            }
        } else if frame_flags & flags::EMPTY_ELEMENT != 0 {
            self.content = None;
            Ok(Event::End)
        } else if frame_flags & flags::PROCESSING_INSTRUCTION != 0 {
            Ok(Event::PiEnd)
        } else {
            // A plain start tag: the frame stays open, nothing to defer.
            self.post = None;
            self.content = None;
            Ok(Event::Start)
        }
    }

    /// Rejects `<?xml?>` anywhere but before the root element. Called when
    /// the target string completes.
    fn check_decl_placement(&self) -> std::result::Result<(), Interrupt> {
        if let Some(frame) = self.scratch.head() {
            if self.scratch.parent_of(frame).is_some()
                && strings::eq(
                    self.name_at(frame),
                    self.encoding,
                    b"xml",
                    Encoding::Unknown,
                    Case::Insensitive,
                )
            {
                return Err(Interrupt::Fatal(Error::DeclAfterRoot));
            }
        }
        Ok(())
    }

    /// At the `?` closing an `<?xml …?>` declaration: compare the declared
    /// encoding with what the BOM established.
    fn reconcile_encoding(&mut self) -> std::result::Result<(), Interrupt> {
        let declared = self
            .content
            .and_then(|off| decl::declared_encoding(&self.scratch.bytes()[off..], self.encoding));
        match decl::reconcile(self.encoding, declared) {
            Ok(encoding) => {
                self.encoding = encoding;
                Ok(())
            }
            Err(e) => Err(Interrupt::Fatal(e)),
        }
    }

    /// Resolves an accumulated `&name;` reference in place.
    fn end_entity_ref(&mut self) -> std::result::Result<(), Interrupt> {
        let start = match self.ref_start.take() {
            Some(start) => start,
            None => return Err(SyntaxError::InvalidReference.into()),
        };
        let name = &self.scratch.bytes()[start..];
        let eq = |literal: &[u8]| {
            strings::eq(name, self.encoding, literal, Encoding::Unknown, Case::Sensitive)
        };
        let value = if eq(b"lt") {
            b'<'
        } else if eq(b"gt") {
            b'>'
        } else if eq(b"amp") {
            b'&'
        } else if eq(b"apos") {
            b'\''
        } else if eq(b"quot") {
            b'"'
        } else {
            return Err(SyntaxError::InvalidReference.into());
        };
        let c = codec::ascii(value, self.encoding);
        // The reference body is always at least as long as the replacement,
        // so this append cannot fail.
        self.scratch.retract(start);
        self.scratch.append(&c)?;
        self.state = self.return_state;
        Ok(())
    }

    /// Resolves an accumulated `&#…;` / `&#x…;` reference in place.
    fn end_char_ref(&mut self, radix: u32) -> std::result::Result<(), Interrupt> {
        let start = match self.ref_start.take() {
            Some(start) => start,
            None => return Err(SyntaxError::InvalidReference.into()),
        };
        let mut value: u32 = 0;
        let mut any = false;
        for d in strings::Chars::new(&self.scratch.bytes()[start..], self.encoding) {
            let digit = match digit_value(d) {
                Some(digit) if digit < radix => digit,
                _ => return Err(SyntaxError::InvalidReference.into()),
            };
            value = value.saturating_mul(radix).saturating_add(digit);
            any = true;
        }
        // NUL, surrogates and anything past U+10FFFF are not XML characters;
        // encode() rejects the latter two itself.
        if !any || value == 0 {
            return Err(SyntaxError::InvalidReference.into());
        }
        let c = match codec::encode(value, self.encoding) {
            Some(c) => c,
            None => return Err(SyntaxError::InvalidReference.into()),
        };
        self.scratch.retract(start);
        self.scratch.append(&c)?;
        self.state = self.return_state;
        Ok(())
    }

    /// Appends `pending` withheld `]` code points followed by `c`. Checks
    /// room up front so a failed write leaves the frame untouched and the
    /// whole group is replayed after [`Parser::grow`].
    fn flush_brackets(&mut self, pending: usize, c: &Char) -> std::result::Result<(), Interrupt> {
        let bracket = codec::ascii(b']', self.encoding);
        if !self.scratch.has_room(pending * bracket.len() + c.len()) {
            return Err(Interrupt::Room);
        }
        for _ in 0..pending {
            self.scratch.append(&bracket)?;
        }
        self.scratch.append(c)?;
        Ok(())
    }

    /// One state transition for one decoded code point.
    fn step(&mut self, c: &Char) -> Step {
        let d = c.value;
        match self.state {
            State::Document => {
                if d == '<' as u32 {
                    self.bom_ok = false;
                    self.begin_tag()?;
                } else if self.bom_ok && d == 0xEF {
                    self.state = State::Utf8Bom1;
                    self.column -= 1;
                } else if self.bom_ok && d == 0xFE {
                    self.state = State::Utf16BeBom;
                    self.column -= 1;
                } else if self.bom_ok && d == 0xFF {
                    self.state = State::Utf16LeBom;
                    self.column -= 1;
                } else if is_whitespace(d) {
                    self.bom_ok = false;
                } else {
                    return Err(SyntaxError::ContentBeforeRoot.into());
                }
            }
            State::Utf8Bom1 => {
                self.column -= 1;
                if d == 0xBB {
                    self.state = State::Utf8Bom2;
                } else {
                    return Err(SyntaxError::InvalidBom.into());
                }
            }
            State::Utf8Bom2 => {
                self.column -= 1;
                if d == 0xBF {
                    self.encoding = Encoding::Utf8;
                    self.state = State::Document;
                    self.bom_ok = false;
                } else {
                    return Err(SyntaxError::InvalidBom.into());
                }
            }
            State::Utf16BeBom => {
                self.column -= 1;
                if d == 0xFF {
                    self.encoding = Encoding::Utf16Be;
                    self.state = State::Document;
                    self.bom_ok = false;
                } else {
                    return Err(SyntaxError::InvalidBom.into());
                }
            }
            State::Utf16LeBom => {
                self.column -= 1;
                if d == 0xFE {
                    self.encoding = Encoding::Utf16Le;
                    self.state = State::Document;
                    self.bom_ok = false;
                } else {
                    return Err(SyntaxError::InvalidBom.into());
                }
            }
            State::TagBegin => {
                if d == '?' as u32 {
                    self.scratch.set_flag(flags::PROCESSING_INSTRUCTION);
                    self.state = State::PiBegin;
                } else if d == '/' as u32 {
                    self.scratch.set_flag(flags::END_TAG);
                } else if d == '!' as u32 {
                    self.state = State::Bang;
                } else if is_name_start(d) {
                    let start = self.scratch.tip();
                    self.scratch.append(c)?;
                    self.tag = Some(start);
                    self.mark_line = self.line;
                    self.mark_column = self.column;
                    self.state = State::ElemName;
                } else {
                    return Err(SyntaxError::InvalidTagName.into());
                }
            }
            State::ElemName => {
                if d == '>' as u32 {
                    self.scratch.terminate(self.encoding)?;
                    return self.end_tag().map(Some);
                } else if d == '/' as u32 {
                    if self.scratch.has_flag(flags::END_TAG) {
                        // `</tag/>` closes twice
                        return Err(SyntaxError::InvalidTagName.into());
                    }
                    self.scratch.terminate(self.encoding)?;
                    self.scratch.set_flag(flags::EMPTY_ELEMENT);
                    return Ok(Some(Event::Start));
                } else if is_whitespace(d) {
                    self.scratch.terminate(self.encoding)?;
                    self.scratch.set_flag(flags::BEGUN);
                    self.state = State::ElemTail;
                    return Ok(Some(Event::Start));
                } else if is_name_char(d) {
                    self.scratch.append(c)?;
                } else {
                    return Err(SyntaxError::InvalidTagName.into());
                }
            }
            State::ElemTail => {
                if d == '>' as u32 {
                    self.scratch.terminate(self.encoding)?;
                    if self.scratch.has_flag(flags::BEGUN)
                        && !self.scratch.has_flag(flags::EMPTY_ELEMENT)
                    {
                        // A token for this tag already went out when
                        // whitespace ended the name; finish the bookkeeping
                        // without emitting another one.
                        self.end_tag()?;
                        self.post_cleanup();
                    } else {
                        return self.end_tag().map(Some);
                    }
                } else if d == '/' as u32 {
                    if self.scratch.has_flag(flags::END_TAG) {
                        return Err(SyntaxError::InvalidTagName.into());
                    }
                    self.scratch.set_flag(flags::EMPTY_ELEMENT);
                } else if is_name_start(d) {
                    let start = self.scratch.tip();
                    self.scratch.append(c)?;
                    self.attribute = Some(start);
                    self.state = State::AttrName;
                } else if !is_whitespace(d) {
                    return Err(SyntaxError::InvalidAttrName.into());
                }
            }
            State::AttrName => {
                if d == '=' as u32 {
                    self.scratch.terminate(self.encoding)?;
                    self.state = State::AttrAssign;
                } else if is_name_char(d) {
                    self.scratch.append(c)?;
                } else if is_whitespace(d) {
                    self.scratch.terminate(self.encoding)?;
                    self.state = State::AttrNameTail;
                } else {
                    return Err(SyntaxError::InvalidAttrName.into());
                }
            }
            State::AttrNameTail => {
                if d == '=' as u32 {
                    self.state = State::AttrAssign;
                } else if !is_whitespace(d) {
                    return Err(SyntaxError::InvalidAttrName.into());
                }
            }
            State::AttrAssign => {
                if d == '"' as u32 || d == '\'' as u32 {
                    if d == '"' as u32 {
                        self.scratch.set_flag(flags::DOUBLE_QUOTE);
                    } else {
                        self.scratch.clear_flag(flags::DOUBLE_QUOTE);
                    }
                    self.value = Some(self.scratch.tip());
                    self.state = State::AttrValue;
                } else if !is_whitespace(d) {
                    return Err(SyntaxError::InvalidAttrValue.into());
                }
            }
            State::AttrValue => {
                let double = self.scratch.has_flag(flags::DOUBLE_QUOTE);
                if (double && d == '"' as u32) || (!double && d == '\'' as u32) {
                    self.scratch.terminate(self.encoding)?;
                    self.state = State::ElemTail;
                    self.post = Some(Post::AttrEnd);
                    return Ok(Some(Event::Attribute));
                } else if d == '&' as u32 {
                    self.return_state = State::AttrValue;
                    self.state = State::RefBegin;
                } else if is_char_data(d) {
                    self.scratch.append(c)?;
                } else {
                    return Err(SyntaxError::InvalidAttrValue.into());
                }
            }
            State::Content => {
                if d == '<' as u32 {
                    self.begin_tag()?;
                } else if d == '&' as u32 {
                    self.return_state = State::Content;
                    self.state = State::RefBegin;
                } else {
                    // everything else, `>` included, is character data
                    if self.content.is_none() {
                        self.content = Some(self.scratch.tip());
                    }
                    self.scratch.append(c)?;
                }
            }
            State::Bang => {
                if d == '-' as u32 {
                    self.state = State::CommentOpen;
                } else if d == '[' as u32 {
                    self.state = State::MaybeCData1;
                } else if d == 'D' as u32 {
                    if self.return_state != State::Document {
                        return Err(Interrupt::Fatal(Error::DoctypeAfterRoot));
                    }
                    self.state = State::MaybeDoctype1;
                } else {
                    return Err(SyntaxError::InvalidBangMarkup.into());
                }
            }
            State::CommentOpen => {
                // the `<` pushed a frame before `<!--` was recognized
                self.pop_frame();
                if d == '-' as u32 {
                    self.state = State::Comment;
                } else {
                    return Err(SyntaxError::InvalidComment.into());
                }
            }
            State::Comment => {
                if d == '-' as u32 {
                    self.state = State::CommentDash;
                }
            }
            State::CommentDash => {
                self.state = if d == '-' as u32 {
                    State::CommentClose
                } else {
                    State::Comment
                };
            }
            State::CommentClose => {
                if d == '>' as u32 {
                    self.state = self.return_state;
                } else {
                    // `--` must not occur inside a comment
                    return Err(SyntaxError::InvalidComment.into());
                }
            }
            State::MaybeCData1 => {
                self.pop_frame();
                if d == 'C' as u32 {
                    self.state = State::MaybeCData2;
                } else {
                    return Err(SyntaxError::InvalidCData.into());
                }
            }
            State::MaybeCData2 => {
                if d == 'D' as u32 {
                    self.state = State::MaybeCData3;
                } else {
                    return Err(SyntaxError::InvalidCData.into());
                }
            }
            State::MaybeCData3 => {
                if d == 'A' as u32 {
                    self.state = State::MaybeCData4;
                } else {
                    return Err(SyntaxError::InvalidCData.into());
                }
            }
            State::MaybeCData4 => {
                if d == 'T' as u32 {
                    self.state = State::MaybeCData5;
                } else {
                    return Err(SyntaxError::InvalidCData.into());
                }
            }
            State::MaybeCData5 => {
                if d == 'A' as u32 {
                    self.state = State::MaybeCData6;
                } else {
                    return Err(SyntaxError::InvalidCData.into());
                }
            }
            State::MaybeCData6 => {
                if d == '[' as u32 {
                    self.state = State::CDataContent;
                } else {
                    return Err(SyntaxError::InvalidCData.into());
                }
            }
            State::CDataContent => {
                if d == ']' as u32 {
                    // withhold: this may open the `]]>` terminator
                    self.state = State::CDataClose1;
                } else {
                    if self.content.is_none() {
                        self.content = Some(self.scratch.tip());
                    }
                    self.scratch.append(c)?;
                }
            }
            State::CDataClose1 => {
                if d == ']' as u32 {
                    self.state = State::CDataClose2;
                } else {
                    self.flush_brackets(1, c)?;
                    self.state = State::CDataContent;
                }
            }
            State::CDataClose2 => {
                if d == '>' as u32 {
                    // the withheld `]]` belonged to the terminator
                    self.state = State::Content;
                } else if d == ']' as u32 {
                    // `]]]…`: the oldest bracket is content, keep holding two
                    let bracket = codec::ascii(b']', self.encoding);
                    self.scratch.append(&bracket)?;
                } else {
                    self.flush_brackets(2, c)?;
                    self.state = State::CDataContent;
                }
            }
            State::RefBegin => {
                self.ref_start = Some(self.scratch.tip());
                if d == '#' as u32 {
                    self.state = State::RefDecimal;
                } else if ('a' as u32..='z' as u32).contains(&d) {
                    self.scratch.append(c)?;
                    self.state = State::RefEntity;
                } else {
                    return Err(SyntaxError::InvalidReference.into());
                }
            }
            State::RefEntity => {
                if d == ';' as u32 {
                    self.end_entity_ref()?;
                } else if (0x21..=0x7F).contains(&d) {
                    self.scratch.append(c)?;
                } else {
                    return Err(SyntaxError::InvalidReference.into());
                }
            }
            State::RefDecimal => {
                if d == ';' as u32 {
                    self.end_char_ref(10)?;
                } else if d == 'x' as u32 && self.ref_start == Some(self.scratch.tip()) {
                    // hex marker, only directly after `&#`
                    self.state = State::RefHex;
                } else if is_digit(d) {
                    self.scratch.append(c)?;
                } else {
                    return Err(SyntaxError::InvalidReference.into());
                }
            }
            State::RefHex => {
                if d == ';' as u32 {
                    self.end_char_ref(16)?;
                } else if is_hex_digit(d) {
                    self.scratch.append(c)?;
                } else {
                    return Err(SyntaxError::InvalidReference.into());
                }
            }
            State::PiBegin => {
                if is_name_start(d) {
                    let start = self.scratch.tip();
                    self.scratch.append(c)?;
                    self.tag = Some(start);
                    self.state = State::PiTarget;
                } else {
                    return Err(SyntaxError::InvalidPi.into());
                }
            }
            State::PiTarget => {
                if is_whitespace(d) {
                    self.check_decl_placement()?;
                    self.scratch.terminate(self.encoding)?;
                    self.state = State::PiContent;
                    return Ok(Some(Event::PiStart));
                } else if d == '?' as u32 {
                    // `<?pi?>`: no body, no PiStart — only PiEnd follows
                    self.check_decl_placement()?;
                    self.scratch.terminate(self.encoding)?;
                    self.state = State::PiClose;
                } else if is_name_char(d) {
                    self.scratch.append(c)?;
                } else {
                    return Err(SyntaxError::InvalidPi.into());
                }
            }
            State::PiContent => {
                if d == '?' as u32 {
                    if let Some(frame) = self.scratch.head() {
                        if strings::eq(
                            self.name_at(frame),
                            self.encoding,
                            b"xml",
                            Encoding::Unknown,
                            Case::Insensitive,
                        ) {
                            self.reconcile_encoding()?;
                        }
                    }
                    self.scratch.terminate(self.encoding)?;
                    self.state = State::PiClose;
                } else {
                    if self.content.is_none() {
                        self.content = Some(self.scratch.tip());
                    }
                    self.scratch.append(c)?;
                }
            }
            State::PiClose => {
                if d == '>' as u32 {
                    return self.end_tag().map(Some);
                } else {
                    return Err(SyntaxError::InvalidPi.into());
                }
            }
            State::MaybeDoctype1 => {
                self.pop_frame();
                if d == 'O' as u32 {
                    self.state = State::MaybeDoctype2;
                } else {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::MaybeDoctype2 => {
                if d == 'C' as u32 {
                    self.state = State::MaybeDoctype3;
                } else {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::MaybeDoctype3 => {
                if d == 'T' as u32 {
                    self.state = State::MaybeDoctype4;
                } else {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::MaybeDoctype4 => {
                if d == 'Y' as u32 {
                    self.state = State::MaybeDoctype5;
                } else {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::MaybeDoctype5 => {
                if d == 'P' as u32 {
                    self.state = State::MaybeDoctype6;
                } else {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::MaybeDoctype6 => {
                if d == 'E' as u32 {
                    self.state = State::DoctypeGap;
                } else {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::DoctypeGap => {
                if is_whitespace(d) {
                    self.state = State::DoctypeLead;
                } else {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::DoctypeLead => {
                if is_name_start(d) {
                    self.state = State::DoctypeName;
                } else if !is_whitespace(d) {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::DoctypeName => {
                // the name is validated but not stored; DTDs yield no tokens
                if d == '>' as u32 {
                    self.state = State::Document;
                } else if is_whitespace(d) {
                    self.state = State::DoctypeContent;
                } else if !is_name_char(d) {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::DoctypeContent => {
                if d == '[' as u32 {
                    self.state = State::DoctypeSubset;
                } else if d == '>' as u32 {
                    self.state = State::Document;
                } else if !is_char_data(d) {
                    return Err(SyntaxError::InvalidDoctype.into());
                }
            }
            State::DoctypeSubset => {
                // markup declarations pass through opaquely
                if d == ']' as u32 {
                    self.state = State::DoctypeContent;
                }
            }
            State::Done => {}
        }
        Ok(None)
    }
}

#[inline]
fn is_new_line(c: u32) -> bool {
    c == 0x0A || c == 0x0D
}

#[inline]
fn is_whitespace(c: u32) -> bool {
    c == 0x20 || c == 0x09 || is_new_line(c)
}

/// Character data is everything except the markup introducers.
#[inline]
fn is_char_data(c: u32) -> bool {
    c != '<' as u32 && c != '&' as u32
}

#[inline]
fn is_digit(c: u32) -> bool {
    ('0' as u32..='9' as u32).contains(&c)
}

#[inline]
fn digit_value(c: u32) -> Option<u32> {
    match c {
        _ if is_digit(c) => Some(c - '0' as u32),
        _ if ('a' as u32..='f' as u32).contains(&c) => Some(c - 'a' as u32 + 10),
        _ if ('A' as u32..='F' as u32).contains(&c) => Some(c - 'A' as u32 + 10),
        _ => None,
    }
}

#[inline]
fn is_hex_digit(c: u32) -> bool {
    is_digit(c) || ('a' as u32..='f' as u32).contains(&c) || ('A' as u32..='F' as u32).contains(&c)
}

#[inline]
fn is_alpha(c: u32) -> bool {
    ('a' as u32..='z' as u32).contains(&c) || ('A' as u32..='Z' as u32).contains(&c)
}

/// NameStartChar, approximated the way the original does: ASCII letters,
/// `:`, `_` and the Latin-1 letter ranges, with everything above U+00F8
/// accepted.
#[inline]
fn is_name_start(c: u32) -> bool {
    is_alpha(c)
        || c == ':' as u32
        || c == '_' as u32
        || (0xC0..=0xD6).contains(&c)
        || (0xD8..=0xF6).contains(&c)
        || c >= 0xF8
}

#[inline]
fn is_name_char(c: u32) -> bool {
    is_name_start(c) || c == '-' as u32 || c == '.' as u32 || is_digit(c)
}
