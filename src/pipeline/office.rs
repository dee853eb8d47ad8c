//! Text extraction from Office Open XML documents (`.docx`, `.pptx`).
//!
//! Both formats are zip archives of XML parts. Rather than pulling in a full
//! Office library, the relevant parts are read with `zip` and walked with
//! `roxmltree`:
//!
//! * `.docx` — `word/document.xml`, one paragraph (`w:p`) per line.
//! * `.pptx` — `ppt/slides/slideN.xml`, one page per slide in slide order.
//!
//! These functions are blocking; callers run them inside `spawn_blocking`.

use crate::error::FileError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};

static RE_SLIDE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

/// Plain text of a Word document, one paragraph per line.
///
/// Paragraphs styled as headings are prefixed with `#` so the structure
/// survives into the parsing prompt.
pub fn docx_text(bytes: &[u8]) -> Result<String, FileError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    let doc = parse_xml(&xml, "word/document.xml")?;

    let mut lines = Vec::new();
    for para in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "p")
    {
        let text = paragraph_text(para);
        if text.is_empty() {
            continue;
        }
        if is_heading_paragraph(para) {
            lines.push(format!("# {text}"));
        } else {
            lines.push(text);
        }
    }

    if lines.is_empty() {
        return Err(FileError::Unreadable {
            detail: "DOCX contains no paragraph text".to_string(),
        });
    }
    Ok(lines.join("\n"))
}

/// Text of every slide of a presentation, in slide order.
///
/// Slides without any text are kept as empty strings so page numbers match
/// slide numbers.
pub fn pptx_slides(bytes: &[u8]) -> Result<Vec<String>, FileError> {
    let mut archive = open_archive(bytes)?;

    let mut parts: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let caps = RE_SLIDE_PART.captures(name)?;
            let number = caps[1].parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    parts.sort_by_key(|(number, _)| *number);

    if parts.is_empty() {
        return Err(FileError::Unreadable {
            detail: "PPTX contains no slides".to_string(),
        });
    }

    let mut slides = Vec::with_capacity(parts.len());
    for (_, name) in parts {
        let xml = read_part(&mut archive, &name)?;
        let doc = parse_xml(&xml, &name)?;
        let text = doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "p")
            .map(paragraph_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        slides.push(text);
    }

    if slides.iter().all(String::is_empty) {
        return Err(FileError::Unreadable {
            detail: "PPTX contains no slide text".to_string(),
        });
    }
    Ok(slides)
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>, FileError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| FileError::Unreadable {
        detail: format!("zip open failed: {e}"),
    })
}

fn read_part(archive: &mut zip::ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String, FileError> {
    let mut part = archive.by_name(name).map_err(|e| FileError::Unreadable {
        detail: format!("{name} missing: {e}"),
    })?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| FileError::Unreadable {
            detail: format!("cannot read {name}: {e}"),
        })?;
    Ok(xml)
}

fn parse_xml<'a>(xml: &'a str, name: &str) -> Result<roxmltree::Document<'a>, FileError> {
    roxmltree::Document::parse(xml).map_err(|e| FileError::Unreadable {
        detail: format!("{name} parse failed: {e}"),
    })
}

/// Concatenated runs of one `w:p` / `a:p` paragraph.
fn paragraph_text(para: roxmltree::Node<'_, '_>) -> String {
    let mut buf = String::new();
    for node in para.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "t" => {
                if let Some(text) = node.text() {
                    buf.push_str(text);
                }
            }
            "tab" => buf.push('\t'),
            "br" | "cr" => buf.push('\n'),
            _ => {}
        }
    }
    buf.trim().to_string()
}

fn is_heading_paragraph(para: roxmltree::Node<'_, '_>) -> bool {
    para.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "pStyle")
        .flat_map(|style| style.attributes())
        .filter(|attr| attr.name() == "val")
        .any(|attr| {
            let id = attr.value().to_ascii_lowercase();
            id.starts_with("heading") || id.starts_with("title")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn archive(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
    const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

    #[test]
    fn docx_paragraphs_and_headings() {
        let xml = format!(
            r#"<w:document xmlns:w="{W_NS}"><w:body>
                <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>โฉนดที่ดิน</w:t></w:r></w:p>
                <w:p><w:r><w:t>เลขที่ </w:t></w:r><w:r><w:t>1234</w:t></w:r></w:p>
                <w:p></w:p>
            </w:body></w:document>"#
        );
        let bytes = archive(&[("word/document.xml", &xml)]);
        assert_eq!(docx_text(&bytes).unwrap(), "# โฉนดที่ดิน\nเลขที่ 1234");
    }

    #[test]
    fn docx_without_text_is_unreadable() {
        let xml = format!(r#"<w:document xmlns:w="{W_NS}"><w:body/></w:document>"#);
        let bytes = archive(&[("word/document.xml", &xml)]);
        assert!(matches!(docx_text(&bytes), Err(FileError::Unreadable { .. })));
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |text: &str| {
            format!(r#"<p:sld xmlns:p="p" xmlns:a="{A_NS}"><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:sld>"#)
        };
        let s1 = slide("one");
        let s2 = slide("two");
        let s10 = slide("ten");
        let bytes = archive(&[
            ("ppt/slides/slide10.xml", &s10),
            ("ppt/slides/slide2.xml", &s2),
            ("ppt/slides/slide1.xml", &s1),
            ("ppt/slides/_rels/slide1.xml.rels", "<r/>"),
        ]);
        assert_eq!(pptx_slides(&bytes).unwrap(), vec!["one", "two", "ten"]);
    }

    #[test]
    fn not_a_zip() {
        assert!(matches!(docx_text(b"nope"), Err(FileError::Unreadable { .. })));
        assert!(matches!(pptx_slides(b"nope"), Err(FileError::Unreadable { .. })));
    }
}
