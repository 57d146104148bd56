use crate::error::IngestError;
use crate::models::{DocumentMetadata, PageText};
use lopdf::{Dictionary, Document, Object};
use std::path::Path;
use tracing::{debug, warn};

pub trait PdfExtractor {
    fn extract(&self, path: &Path) -> Result<(Vec<PageText>, DocumentMetadata), IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<(Vec<PageText>, DocumentMetadata), IngestError> {
        ensure_file(path)?;
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let pages = extract_pages(&document);
        let metadata = extract_metadata(&document);
        Ok((pages, metadata))
    }
}

/// Reads per-page text and document metadata from the PDF at `path`.
pub fn parse_pdf(path: &Path) -> Result<(Vec<PageText>, DocumentMetadata), IngestError> {
    LopdfExtractor.extract(path)
}

fn ensure_file(path: &Path) -> Result<(), IngestError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(IngestError::NotFound(path.to_path_buf()))
    }
}

/// Page text in physical order. Pages that are blank after trimming, or whose
/// text cannot be decoded, are left out.
pub fn extract_pages(document: &Document) -> Vec<PageText> {
    collect_pages(
        document
            .get_pages()
            .into_keys()
            .map(|page_no| (page_no, document.extract_text(&[page_no]))),
    )
}

fn collect_pages<I, E>(pages: I) -> Vec<PageText>
where
    I: IntoIterator<Item = (u32, Result<String, E>)>,
    E: std::fmt::Display,
{
    let mut kept = Vec::new();
    for (page_no, extracted) in pages {
        let text = match extracted {
            Ok(text) => text,
            Err(error) => {
                warn!(page = page_no, %error, "skipping page whose text cannot be decoded");
                continue;
            }
        };

        if text.trim().is_empty() {
            debug!(page = page_no, "skipping page without text");
            continue;
        }

        kept.push(PageText {
            number: page_no,
            text,
        });
    }

    kept
}

pub fn extract_metadata(document: &Document) -> DocumentMetadata {
    let info = document
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|object| resolve_dictionary(document, object));

    let Some(info) = info else {
        return DocumentMetadata::default();
    };

    DocumentMetadata {
        title: info_field(document, info, b"Title"),
        author: info_field(document, info, b"Author"),
        creation_date: info_field(document, info, b"CreationDate"),
    }
}

fn resolve_dictionary<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Dictionary(dictionary) => Some(dictionary),
        Object::Reference(id) => document.get_dictionary(*id).ok(),
        _ => None,
    }
}

fn info_field(document: &Document, info: &Dictionary, key: &[u8]) -> String {
    let value = match info.get(key) {
        Ok(Object::Reference(id)) => document.get_object(*id).ok(),
        Ok(object) => Some(object),
        Err(_) => None,
    };

    match value {
        Some(Object::String(bytes, _)) => decode_text_string(bytes).trim().to_string(),
        Some(Object::Name(name)) => String::from_utf8_lossy(name).trim().to_string(),
        _ => String::new(),
    }
}

/// Decodes a PDF text string: UTF-16BE when it carries a byte-order mark,
/// otherwise UTF-8 with a Latin-1 fallback.
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&byte| char::from(byte)).collect(),
    }
}
