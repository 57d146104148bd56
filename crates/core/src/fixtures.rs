//! Small generated PDFs for tests.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;

pub struct FixtureInfo<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub creation_date: Option<&'a str>,
}

/// Writes a PDF with one page per entry in `pages`; an empty entry makes a blank page.
pub fn write_pdf(
    path: &Path,
    pages: &[&str],
    info: Option<FixtureInfo<'_>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), Object::Integer(10)]),
                Operation::new("Td", vec![Object::Integer(40), Object::Integer(800)]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = document.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::from(page_id));
    }

    let page_count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    if let Some(info) = info {
        let mut entries = dictionary! {
            "Title" => Object::string_literal(info.title),
            "Author" => Object::string_literal(info.author),
        };
        if let Some(created) = info.creation_date {
            entries.set("CreationDate", Object::string_literal(created));
        }
        let info_id = document.add_object(entries);
        document.trailer.set("Info", info_id);
    }

    document.save(path)?;
    Ok(())
}
