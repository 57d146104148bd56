use crate::error::IngestError;
use crate::models::{Chunk, DocumentMetadata, IngestionOptions, PageText};

/// Separators tried in order, coarsest first. The empty separator splits
/// between characters and always applies.
pub const DEFAULT_SEPARATORS: [&str; 12] = [
    "\n\n", "\n", ".", "!", "?", "。", "！", "？", ",", "，", " ", "",
];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
            ..Self::default()
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max chunk size must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text on the coarsest separator that occurs in it and only falls
/// back to finer separators for pieces that are still too long.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    config: ChunkingConfig,
}

impl RecursiveCharacterSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.config.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|separator| separator.is_empty() || text.contains(separator.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(start, ch)| &text[start..start + ch.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|piece| !piece.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.config.max_chars {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending, separator));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending, separator));
        }

        chunks
    }

    /// Packs pieces into windows of at most `max_chars`, carrying up to
    /// `overlap_chars` of trailing pieces into the next window.
    fn merge_pieces(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let max = self.config.max_chars;
        let overlap = self.config.overlap_chars;

        let mut merged = Vec::new();
        let mut window: Vec<(&str, usize)> = Vec::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { separator_len };

            if total + len + joiner > max && !window.is_empty() {
                if let Some(text) = join_window(&window, separator) {
                    merged.push(text);
                }

                while !window.is_empty() && (total > overlap || total + len + separator_len > max)
                {
                    let (_, first_len) = window.remove(0);
                    let joiner = if window.is_empty() { 0 } else { separator_len };
                    total -= first_len + joiner;
                }
            }

            let joiner = if window.is_empty() { 0 } else { separator_len };
            window.push((piece, len));
            total += len + joiner;
        }

        if let Some(text) = join_window(&window, separator) {
            merged.push(text);
        }

        merged
    }
}

fn join_window(window: &[(&str, usize)], separator: &str) -> Option<String> {
    let joined = window
        .iter()
        .map(|(piece, _)| *piece)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Chunks every page and tags each chunk with its page, per-page index and
/// the document metadata. Output is page order, then chunk order.
pub fn build_chunks(
    pages: &[PageText],
    metadata: &DocumentMetadata,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    let splitter = RecursiveCharacterSplitter::new(config)?;

    let mut chunks = Vec::new();
    for page in pages {
        for (index, content) in splitter.split_text(&page.text).into_iter().enumerate() {
            chunks.push(Chunk::new(content, page.number, index, metadata.clone()));
        }
    }

    Ok(chunks)
}
