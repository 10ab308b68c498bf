use crate::error::QaError;
use crate::models::{DocumentChunk, PageText, SplitterConfig};
use sha2::{Digest, Sha256};

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace while keeping every occurrence of a separator that
/// itself contains whitespace, so the splitter can still cut on it.
pub fn normalize_preserving(text: &str, separator: &str) -> String {
    if !separator.chars().any(char::is_whitespace) {
        return normalize_whitespace(text);
    }

    text.split(separator)
        .map(normalize_whitespace)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

pub fn validate(config: &SplitterConfig) -> Result<(), QaError> {
    if config.chunk_size == 0 {
        return Err(QaError::Split("chunk_size must be greater than zero".to_string()));
    }

    if config.chunk_overlap >= config.chunk_size {
        return Err(QaError::Split(format!(
            "chunk_overlap {} must be smaller than chunk_size {}",
            config.chunk_overlap, config.chunk_size
        )));
    }

    Ok(())
}

/// Splits `text` into windows of at most `chunk_size` characters.
///
/// Every chunk after the first begins `chunk_overlap` characters before the
/// end of its predecessor. A chunk that stops short of the end of the text is
/// cut just before the last separator in its window when that still leaves it
/// longer than the overlap, and hard-cut at `chunk_size` otherwise.
pub fn split_text(text: &str, config: &SplitterConfig) -> Result<Vec<String>, QaError> {
    validate(config)?;

    let chars: Vec<char> = text.chars().collect();
    if chars.iter().all(|ch| ch.is_whitespace()) {
        return Ok(Vec::new());
    }

    let separator: Vec<char> = config.separator.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let window_end = (start + config.chunk_size).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            last_separator(&chars, &separator, start + config.chunk_overlap + 1, window_end)
                .unwrap_or(window_end)
        };

        chunks.push(chars[start..end].iter().collect());

        if end == chars.len() {
            break;
        }
        start = end - config.chunk_overlap;
    }

    Ok(chunks)
}

/// Highest position in `lowest..=highest` where `separator` begins.
fn last_separator(chars: &[char], separator: &[char], lowest: usize, highest: usize) -> Option<usize> {
    if separator.is_empty() || lowest > highest {
        return None;
    }

    (lowest..=highest)
        .rev()
        .find(|&position| chars.get(position..position + separator.len()) == Some(separator))
}

pub fn split_pages(
    pages: &[PageText],
    source_path: &str,
    config: &SplitterConfig,
) -> Result<Vec<DocumentChunk>, QaError> {
    validate(config)?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        let normalized = normalize_preserving(&page.text, &config.separator);
        for text in split_text(&normalized, config)? {
            chunks.push(DocumentChunk {
                chunk_id: make_chunk_id(source_path, page.number, cursor, &text),
                source_path: source_path.to_string(),
                page: page.number,
                chunk_index: cursor,
                text,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn make_chunk_id(source_path: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
