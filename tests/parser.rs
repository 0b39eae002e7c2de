//! Token-stream tests over whole documents.

use pretty_assertions::assert_eq;
use scratch_xml::{Encoding, Error, Event, Parser, SyntaxError};

/// Pulls every token out of `xml` with a comfortably sized buffer, panicking
/// on any error.
fn events(xml: &[u8]) -> Vec<Event> {
    let mut parser = Parser::new(vec![0; 512]);
    let mut out = Vec::new();
    loop {
        match parser.parse(xml) {
            Ok(Event::Eof) => {
                out.push(Event::Eof);
                return out;
            }
            Ok(e) => out.push(e),
            Err(e) => panic!(
                "error {} at {}:{} in {:?}",
                e,
                parser.line(),
                parser.column(),
                String::from_utf8_lossy(xml)
            ),
        }
    }
}

/// Parses until the first error and returns it.
fn first_error(xml: &[u8]) -> Error {
    let mut parser = Parser::new(vec![0; 512]);
    loop {
        match parser.parse(xml) {
            Ok(Event::Eof) => panic!("{:?} parsed successfully", String::from_utf8_lossy(xml)),
            Ok(_) => {}
            Err(e) => return e,
        }
    }
}

#[test]
fn declaration_and_nested_elements() {
    let xml = br#"<?xml version="1.0" encoding="UTF-8"?><r><b>A</b><b>B</b></r>"#;
    let mut parser = Parser::new(vec![0; 256]);

    assert_eq!(parser.parse(xml), Ok(Event::PiStart));
    assert_eq!(parser.tag(), Some(&b"xml"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::PiEnd));
    assert_eq!(
        parser.content(),
        Some(&b"version=\"1.0\" encoding=\"UTF-8\""[..])
    );
    assert_eq!(parser.encoding(), Encoding::Utf8);

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.tag(), Some(&b"r"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.tag(), Some(&b"b"[..]));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.tag(), Some(&b"b"[..]));
    assert_eq!(parser.content(), Some(&b"A"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.content(), Some(&b"B"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.tag(), Some(&b"r"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Eof));
}

#[test]
fn attributes_of_an_empty_element() {
    let xml = br#"<a x="1" y='2'/>"#;
    let mut parser = Parser::new(vec![0; 256]);

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.tag(), Some(&b"a"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Attribute));
    assert_eq!(parser.attribute(), Some(&b"x"[..]));
    assert_eq!(parser.value(), Some(&b"1"[..]));
    assert_eq!(parser.tag(), Some(&b"a"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Attribute));
    assert_eq!(parser.attribute(), Some(&b"y"[..]));
    assert_eq!(parser.value(), Some(&b"2"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.content(), None);
    assert_eq!(parser.parse(xml), Ok(Event::Eof));
}

#[test]
fn references_become_literal_content() {
    let xml = b"<a>&lt;&#65;&#x42;</a>";
    let mut parser = Parser::new(vec![0; 256]);
    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.content(), Some(&b"<AB"[..]));
    assert_eq!(parser.parse(xml), Ok(Event::Eof));
}

#[test]
fn references_in_attribute_values() {
    let xml = br#"<a q="&quot;&apos;&amp;"/>"#;
    let mut parser = Parser::new(vec![0; 256]);
    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Ok(Event::Attribute));
    assert_eq!(parser.value(), Some(&b"\"'&"[..]));
}

#[test]
fn comment_content_is_discarded() {
    use Event::*;
    assert_eq!(events(b"<a><!-- </a> --></a>"), [Start, End, Eof]);
}

#[test]
fn cdata_passes_markup_through() {
    let xml = b"<a><![CDATA[<b>&]]></a>";
    let mut parser = Parser::new(vec![0; 256]);
    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.content(), Some(&b"<b>&"[..]));
}

#[test]
fn utf16le_bom_document() {
    let xml: &[u8] = &[0xFF, 0xFE, 0x3C, 0, 0x61, 0, 0x2F, 0, 0x3E, 0];
    let mut parser = Parser::new(vec![0; 256]);
    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.encoding(), Encoding::Utf16Le);
    assert_eq!(parser.tag(), Some(&[0x61, 0x00][..]));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.parse(xml), Ok(Event::Eof));
}

#[test]
fn utf16be_bom_document() {
    // <w>é</w> in UTF-16 BE; é = U+00E9
    let mut xml = vec![0xFE, 0xFF];
    for unit in [
        0x003Cu16, 0x0077, 0x003E, 0x00E9, 0x003C, 0x002F, 0x0077, 0x003E,
    ] {
        xml.extend_from_slice(&unit.to_be_bytes());
    }
    let mut parser = Parser::new(vec![0; 256]);
    assert_eq!(parser.parse(&xml), Ok(Event::Start));
    assert_eq!(parser.encoding(), Encoding::Utf16Be);
    assert_eq!(parser.parse(&xml), Ok(Event::End));
    assert_eq!(parser.content(), Some(&[0x00, 0xE9][..]));
    if cfg!(feature = "encoding") {
        let decoded = parser.decoder().decode(parser.content().unwrap());
        assert_eq!(decoded.as_deref(), Ok("é"));
    }
    assert_eq!(parser.parse(&xml), Ok(Event::Eof));
}

#[test]
fn mismatched_close_tag_position() {
    let xml = b"<a><b></c></a>";
    let mut parser = Parser::new(vec![0; 256]);
    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Err(Error::MismatchedTag));
    assert_eq!((parser.line(), parser.column()), (1, 9));
    // terminal errors repeat without advancing
    assert_eq!(parser.parse(xml), Err(Error::MismatchedTag));
}

#[test]
fn a_little_bit_of_everything() {
    let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE catalog [<!ENTITY unused "x">]>
<!-- header -->
<catalog year="2024">
  <item id="1">&lt;first&gt;</item>
  <item id="2"><![CDATA[a < b && c]]></item>
  <note>line one
line two</note>
  <?render flush?>
  <empty/>
</catalog>"#;

    let mut parser = Parser::new(vec![0; 512]);

    assert_eq!(parser.parse(xml), Ok(Event::PiStart));
    assert_eq!(parser.parse(xml), Ok(Event::PiEnd));
    assert_eq!(parser.encoding(), Encoding::Utf8);

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.tag(), Some(&b"catalog"[..]));
    assert_eq!(parser.parse(xml), Ok(Event::Attribute));
    assert_eq!(parser.attribute(), Some(&b"year"[..]));
    assert_eq!(parser.value(), Some(&b"2024"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Ok(Event::Attribute));
    assert_eq!(parser.value(), Some(&b"1"[..]));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.content(), Some(&b"<first>"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Ok(Event::Attribute));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.content(), Some(&b"a < b && c"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.tag(), Some(&b"note"[..]));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.content(), Some(&b"line one\nline two"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::PiStart));
    assert_eq!(parser.tag(), Some(&b"render"[..]));
    assert_eq!(parser.parse(xml), Ok(Event::PiEnd));
    assert_eq!(parser.content(), Some(&b"flush"[..]));

    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.tag(), Some(&b"empty"[..]));
    assert_eq!(parser.parse(xml), Ok(Event::End));

    assert_eq!(parser.parse(xml), Ok(Event::End));
    assert_eq!(parser.tag(), Some(&b"catalog"[..]));
    assert_eq!(parser.parse(xml), Ok(Event::Eof));

    assert_eq!(parser.line(), 11);
}

#[test]
fn surrogate_pair_reference_in_utf16() {
    // <m>&#x1D11E;</m> encoded in UTF-16 LE behind its BOM
    let mut xml = vec![0xFF, 0xFE];
    for b in b"<m>&#x1D11E;</m>" {
        xml.extend_from_slice(&[*b, 0]);
    }
    let mut parser = Parser::new(vec![0; 256]);
    assert_eq!(parser.parse(&xml), Ok(Event::Start));
    assert_eq!(parser.parse(&xml), Ok(Event::End));
    // U+1D11E as a UTF-16 LE surrogate pair
    assert_eq!(parser.content(), Some(&[0x34, 0xD8, 0x1E, 0xDD][..]));
    assert_eq!(parser.parse(&xml), Ok(Event::Eof));
}

#[test]
fn whitespace_around_the_root_is_fine() {
    use Event::*;
    assert_eq!(events(b"  \n\t<a/>"), [Start, End, Eof]);
}

#[test]
fn invalid_documents() {
    assert_eq!(first_error(b"<r><!DOCTYPE r></r>"), Error::DoctypeAfterRoot);
    assert_eq!(first_error(b"<r><?xml v?></r>"), Error::DeclAfterRoot);
    assert_eq!(
        first_error(b"<a></a/>"),
        Error::Syntax(SyntaxError::InvalidTagName)
    );
    assert_eq!(
        first_error(b"<a$></a$>"),
        Error::Syntax(SyntaxError::InvalidTagName)
    );
    assert_eq!(
        first_error(b"<a>&nope;</a>"),
        Error::Syntax(SyntaxError::InvalidReference)
    );
    assert_eq!(
        first_error(b"<a><![CDETA[x]]></a>"),
        Error::Syntax(SyntaxError::InvalidCData)
    );
    assert_eq!(
        first_error(b"<a><element<</a>"),
        Error::Syntax(SyntaxError::InvalidTagName)
    );
    assert_eq!(first_error(b"<a><b></B></b></a>"), Error::MismatchedTag);
}

#[test]
fn encoding_contradictions() {
    // declared UTF-16 without any BOM
    assert_eq!(
        first_error(br#"<?xml version="1.0" encoding="UTF-16"?><r/>"#),
        Error::Encoding
    );
    // UTF-8 BOM but declared UTF-16
    let mut xml = vec![0xEF, 0xBB, 0xBF];
    xml.extend_from_slice(br#"<?xml version="1.0" encoding="UTF-16"?><r/>"#);
    assert_eq!(first_error(&xml), Error::Encoding);
    // UTF-16 LE BOM but declared UTF-8
    let mut xml = vec![0xFF, 0xFE];
    for b in br#"<?xml version="1.0" encoding="UTF-8"?><r/>"# {
        xml.extend_from_slice(&[*b, 0]);
    }
    assert_eq!(first_error(&xml), Error::Encoding);
    // matching BOM and declaration is not a contradiction
    let mut xml = vec![0xFF, 0xFE];
    for b in br#"<?xml version="1.0" encoding="UTF-16"?><r/>"# {
        xml.extend_from_slice(&[*b, 0]);
    }
    let mut parser = Parser::new(vec![0; 512]);
    assert_eq!(parser.parse(&xml), Ok(Event::PiStart));
    assert_eq!(parser.parse(&xml), Ok(Event::PiEnd));
    assert_eq!(parser.encoding(), Encoding::Utf16Le);
}

#[test]
fn doctype_variants_parse_silently() {
    use Event::*;
    assert_eq!(events(b"<!DOCTYPE r><r/>"), [Start, End, Eof]);
    assert_eq!(
        events(b"<!DOCTYPE r SYSTEM \"some.dtd\"><r/>"),
        [Start, End, Eof]
    );
    assert_eq!(
        events(b"<!DOCTYPE r [<!ELEMENT r (#PCDATA)><!ENTITY e \"v\">]><r/>"),
        [Start, End, Eof]
    );
}

#[test]
fn decoder_round_trip_for_observables() {
    let xml = "<name>J\u{00FC}rgen</name>".as_bytes();
    let mut parser = Parser::new(vec![0; 256]);
    assert_eq!(parser.parse(xml), Ok(Event::Start));
    assert_eq!(parser.parse(xml), Ok(Event::End));
    let decoder = parser.decoder();
    assert_eq!(
        decoder.decode(parser.content().unwrap()).as_deref(),
        Ok("J\u{00FC}rgen")
    );
}
