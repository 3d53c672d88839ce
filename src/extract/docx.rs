use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ExtractError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Paragraph text of a DOCX body, one line per `w:p`.
pub fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Archive(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ExtractError::Archive(e.to_string()))?
        .read_to_string(&mut xml)?;
    paragraphs_from_xml(&xml)
}

fn paragraphs_from_xml(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text = true;
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:p" => out.push('\n'),
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(ref t)) if in_text => {
                out.push_str(&String::from_utf8_lossy(t));
            }
            Ok(Event::GeneralRef(ref r)) if in_text => {
                if let Some(c) = resolve_entity(&String::from_utf8_lossy(r)) {
                    out.push(c);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn resolve_entity(name: &str) -> Option<char> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse().ok()?,
        };
        return char::from_u32(value);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(DOCUMENT_PART, SimpleFileOptions::default()).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn paragraphs_become_lines() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Solar </w:t></w:r><w:r><w:t>power</w:t></w:r></w:p>\
             <w:p/>\
             <w:p><w:r><w:t>Costs</w:t><w:tab/><w:t>fall</w:t></w:r></w:p>",
        );
        assert_eq!(docx_text(&bytes).unwrap(), "Solar power\n\nCosts\tfall\n");
    }

    #[test]
    fn entities_are_resolved() {
        let bytes = docx_with_body("<w:p><w:r><w:t>R&amp;D &#x4E2D; &lt;1%</w:t></w:r></w:p>");
        assert_eq!(docx_text(&bytes).unwrap(), "R&D 中 <1%\n");
    }

    #[test]
    fn instruction_text_outside_runs_is_ignored() {
        let bytes = docx_with_body("<w:p><w:instrText>PAGE</w:instrText><w:r><w:t>Body</w:t></w:r></w:p>");
        assert_eq!(docx_text(&bytes).unwrap(), "Body\n");
    }

    #[test]
    fn not_a_zip_is_an_archive_error() {
        assert!(matches!(docx_text(b"plain text"), Err(ExtractError::Archive(_))));
    }

    #[test]
    fn zip_without_document_part_is_an_archive_error() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("other.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<x/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert!(matches!(docx_text(&bytes), Err(ExtractError::Archive(_))));
    }
}
