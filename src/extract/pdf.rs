//! Text layer of a digital PDF, read with `pdf-extract`.
//!
//! Scanned pages have no text layer and come out empty.

use std::panic;

use super::ExtractError;

/// Page texts joined by newlines.
pub fn pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed font dictionaries.
    let pages = panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("reader aborted on malformed input".into()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let text = pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    tracing::debug!(pages = pages.len(), "PDF text layer read");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use lopdf::{Document, Object, Stream};

    /// One page per entry in `contents`, all sharing font `/F1`.
    fn build_pdf(font: Object, contents: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(font);
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::new();
        for content in contents {
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.as_bytes().to_vec(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn helvetica() -> Object {
        Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        })
    }

    #[test]
    fn reads_text_from_every_page() {
        let pdf = build_pdf(
            helvetica(),
            &[
                "BT /F1 12 Tf 72 700 Td (Quarterly results) Tj ET",
                "BT /F1 12 Tf 72 700 Td (Next steps) Tj ET",
            ],
        );
        let text = pdf_text(&pdf).unwrap();
        assert!(text.contains("Quarterly"), "got: {text}");
        assert!(text.contains("steps"), "got: {text}");
        assert!(text.find("Quarterly") < text.find("steps"));
    }

    #[test]
    fn hex_strings_are_decoded() {
        let pdf = build_pdf(helvetica(), &["BT /F1 12 Tf 72 700 Td <48656C6C6F> Tj ET"]);
        let text = pdf_text(&pdf).unwrap();
        assert!(text.contains("Hello"), "got: {text}");
    }

    #[test]
    fn identity_h_text_maps_through_to_unicode() {
        let mut doc_font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "NotoSans",
            "Encoding" => "Identity-H",
        };
        let cid_font = dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "NotoSans",
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => dictionary! {
                "Type" => "FontDescriptor",
                "FontName" => "NotoSans",
                "Flags" => 32,
            },
            "DW" => 600,
        };
        let cmap = "/CIDInit /ProcSet findresource begin\n\
                    12 dict begin\n\
                    begincmap\n\
                    /CMapName /Adobe-Identity-UCS def\n\
                    /CMapType 2 def\n\
                    1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n\
                    1 beginbfrange\n<0020> <007E> <0020>\nendbfrange\n\
                    endcmap\n\
                    CMapName currentdict /CMap defineresource pop\n\
                    end\nend\n";
        doc_font.set("DescendantFonts", vec![Object::Dictionary(cid_font)]);
        doc_font.set(
            "ToUnicode",
            Object::Stream(Stream::new(dictionary! {}, cmap.as_bytes().to_vec())),
        );

        let pdf = build_pdf(
            Object::Dictionary(doc_font),
            &["BT /F1 12 Tf 72 700 Td <00480065006C006C006F> Tj ET"],
        );
        let text = pdf_text(&pdf).unwrap();
        assert!(text.contains("Hello"), "got: {text}");
    }

    #[test]
    fn page_without_text_is_empty() {
        let pdf = build_pdf(helvetica(), &["0 0 m 100 100 l S"]);
        assert_eq!(pdf_text(&pdf).unwrap(), "");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(pdf_text(b"not a pdf at all"), Err(ExtractError::Pdf(_))));
        assert!(pdf_text(b"").is_err());
    }
}
