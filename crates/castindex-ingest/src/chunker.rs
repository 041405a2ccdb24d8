//! Transcript chunking.
//!
//! Text is split into units (lines, sentences or paragraphs) that keep their
//! trailing separators, then accumulated into chunks of at most
//! `max_chunk_size` characters, overlap included. Each chunk after the first
//! starts with the last `overlap` characters of the previous one, shortened
//! when the next unit would not fit otherwise.

use castindex_config::ChunkingConfig;
use castindex_core::{DocumentId, TextChunk};
use std::str::FromStr;

/// Boundary at which text may be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkUnit {
    #[default]
    Line,
    Sentence,
    Paragraph,
}

impl FromStr for ChunkUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(ChunkUnit::Line),
            "sentence" => Ok(ChunkUnit::Sentence),
            "paragraph" => Ok(ChunkUnit::Paragraph),
            other => Err(format!("unknown chunk unit: {}", other)),
        }
    }
}

/// Configuration for chunking. Sizes are in characters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub max_chunk_size: usize,
    pub overlap: usize,
    pub unit: ChunkUnit,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1024,
            overlap: 100,
            unit: ChunkUnit::Line,
        }
    }
}

impl ChunkConfig {
    /// Create config from chunking settings.
    pub fn from_chunking_config(config: &ChunkingConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size,
            overlap: config.overlap,
            unit: config.unit.parse().unwrap_or_default(),
        }
    }
}

const SENTENCE_END: &[char] = &['.', '!', '?', '。', '！', '？', '…'];
const CLOSING: &[char] = &['"', '\'', '」', '』', '）', ')', '”', '’'];

/// Content chunker for splitting transcripts.
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Create a new chunker with the given configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split text into chunks.
    ///
    /// Empty or whitespace-only text yields no chunks. Every chunk, overlap
    /// included, stays within the maximum unless it holds a single unit that
    /// is longer than the maximum on its own.
    pub fn chunk_text(&self, document_id: &DocumentId, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let max = self.config.max_chunk_size.max(1);
        let overlap = self.config.overlap;

        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut overlap_len = 0;
        let mut body_len = 0;

        for unit in self.split_units(text) {
            let unit_len = unit.chars().count();

            if body_len > 0 && overlap_len + body_len + unit_len > max {
                let closed_len = overlap_len + body_len;
                let seed = if overlap > 0 && closed_len > overlap {
                    tail_chars(&buffer, overlap).to_string()
                } else {
                    String::new()
                };

                let index = chunks.len() as u32;
                chunks.push(TextChunk::new(
                    document_id.clone(),
                    index,
                    std::mem::take(&mut buffer),
                    overlap_len,
                ));

                overlap_len = seed.chars().count();
                buffer = seed;
                body_len = 0;
            }

            // A seed that would push a fitting unit past the maximum is shortened
            if body_len == 0 && unit_len <= max && overlap_len + unit_len > max {
                overlap_len = max - unit_len;
                buffer = tail_chars(&buffer, overlap_len).to_string();
            }

            buffer.push_str(unit);
            body_len += unit_len;
        }

        if body_len > 0 {
            let index = chunks.len() as u32;
            chunks.push(TextChunk::new(document_id.clone(), index, buffer, overlap_len));
        }

        chunks
    }

    /// Split text into units that keep their trailing separators.
    fn split_units<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self.config.unit {
            ChunkUnit::Line => text.split_inclusive('\n').collect(),
            ChunkUnit::Paragraph => split_after(text, |rest| {
                let newlines = rest.chars().take_while(|c| *c == '\n').count();
                (newlines >= 2).then(|| {
                    rest.len() - rest.trim_start_matches(|c: char| c.is_whitespace()).len()
                })
            }),
            ChunkUnit::Sentence => split_sentences(text),
        }
    }
}

/// The last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    if n == 0 {
        return "";
    }
    let start = s
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}

/// Split `text` at positions where `boundary(rest)` returns the separator length.
fn split_after<'a, F>(text: &'a str, boundary: F) -> Vec<&'a str>
where
    F: Fn(&'a str) -> Option<usize>,
{
    let mut units = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while pos < text.len() {
        if let Some(sep) = boundary(&text[pos..]) {
            let end = pos + sep;
            units.push(&text[start..end]);
            start = end;
            pos = end;
            continue;
        }
        pos += text[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
    }
    if start < text.len() {
        units.push(&text[start..]);
    }
    units
}

/// Sentences end at terminal punctuation, optional closing quotes, then any
/// whitespace. Newlines also end a sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let is_end = SENTENCE_END.contains(&c) || c == '\n';
        if !is_end {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if SENTENCE_END.contains(&next) || CLOSING.contains(&next) || next.is_whitespace() {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        units.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        units.push(&text[start..]);
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, overlap: usize, unit: ChunkUnit) -> Chunker {
        Chunker::new(ChunkConfig {
            max_chunk_size: max,
            overlap,
            unit,
        })
    }

    fn rebuild(chunks: &[TextChunk]) -> String {
        chunks.iter().map(|c| c.body()).collect()
    }

    #[test]
    fn test_short_text_single_chunk() {
        let c = chunker(1024, 100, ChunkUnit::Line);
        let chunks = c.chunk_text(&"doc".to_string(), "Line1\nLine2\nLine3");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Line1\nLine2\nLine3");
        assert_eq!(chunks[0].id, "doc_0");
        assert_eq!(chunks[0].overlap_len, 0);
    }

    #[test]
    fn test_empty_and_whitespace() {
        let c = chunker(10, 2, ChunkUnit::Line);
        assert!(c.chunk_text(&"d".to_string(), "").is_empty());
        assert!(c.chunk_text(&"d".to_string(), " \n\t\n").is_empty());
    }

    #[test]
    fn test_three_thousand_chars_three_chunks() {
        let text = format!(
            "{}\n{}\n{}\n",
            "a".repeat(999),
            "b".repeat(923),
            "c".repeat(1075)
        );
        assert_eq!(text.chars().count(), 3000);

        let c = chunker(1024, 100, ChunkUnit::Line);
        let chunks = c.chunk_text(&"doc".to_string(), &text);
        assert_eq!(chunks.len(), 3);

        let first = &chunks[0].text;
        let tail: String = first.chars().skip(first.chars().count() - 100).collect();
        assert!(chunks[1].text.starts_with(&tail));
        assert_eq!(chunks[1].overlap_len, 100);
        assert_eq!(chunks[1].length, 1024);
        assert_eq!(rebuild(&chunks), text);

        let indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_length_includes_overlap() {
        let text: String = (0..30).map(|i| format!("{:02}{}\n", i, "x".repeat(97))).collect();
        let c = chunker(1024, 100, ChunkUnit::Line);
        let chunks = c.chunk_text(&"doc".to_string(), &text);
        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(chunk.length <= 1024, "{} has length {}", chunk.id, chunk.length);
        }
        assert!(chunks[1..].iter().all(|c| c.overlap_len == 100));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_seed_shortened_for_long_unit() {
        let text = format!("{}\n{}\n", "a".repeat(999), "b".repeat(999));
        let c = chunker(1024, 100, ChunkUnit::Line);
        let chunks = c.chunk_text(&"doc".to_string(), &text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].overlap_len, 24);
        assert_eq!(chunks[1].length, 1024);
        assert!(chunks[1].text.starts_with(&"a".repeat(23)));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_oversized_unit_emitted_whole() {
        let big = "x".repeat(50);
        let text = format!("short\n{}\nend", big);
        let c = chunker(20, 5, ChunkUnit::Line);
        let chunks = c.chunk_text(&"d".to_string(), &text);
        assert!(chunks.iter().any(|ch| ch.body() == format!("{}\n", big)));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_body_bounded_and_lossless_cjk() {
        let text: String = (0..40)
            .map(|i| format!("第{}句話，這是一段中文逐字稿。\n", i))
            .collect();
        let c = chunker(64, 10, ChunkUnit::Line);
        let chunks = c.chunk_text(&"d".to_string(), &text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.length <= 64);
            assert!(chunk.overlap_len <= 10);
        }
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_overlap_skipped_when_chunk_is_short() {
        let c = chunker(6, 10, ChunkUnit::Line);
        let chunks = c.chunk_text(&"d".to_string(), "abcd\nefgh\n");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].overlap_len, 0);
        assert_eq!(chunks[1].text, "efgh\n");
    }

    #[test]
    fn test_sentence_units() {
        let c = chunker(12, 0, ChunkUnit::Sentence);
        let text = "你好。今天天氣很好！我們開始吧? Yes.";
        let chunks = c.chunk_text(&"d".to_string(), text);
        assert_eq!(rebuild(&chunks), text);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].text.ends_with('！'));
    }

    #[test]
    fn test_paragraph_units() {
        let c = chunker(15, 0, ChunkUnit::Paragraph);
        let text = "first para\nline\n\nsecond para\n\n\nthird";
        let chunks = c.chunk_text(&"d".to_string(), text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "first para\nline\n\n");
        assert_eq!(chunks[1].text, "second para\n\n\n");
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!("Sentence".parse::<ChunkUnit>().unwrap(), ChunkUnit::Sentence);
        assert!("word".parse::<ChunkUnit>().is_err());
    }
}
