use crate::models::Chunk;
use chrono::{DateTime, Utc};

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_CHUNK_STRIDE: usize = 80;

/// Word-window parameters. Both values are always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    size: usize,
    stride: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            stride: DEFAULT_CHUNK_STRIDE,
        }
    }
}

impl ChunkingConfig {
    /// Zero values are raised to 1.
    pub fn new(size: usize, stride: usize) -> Self {
        Self {
            size: size.max(1),
            stride: stride.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Builds a config from caller-supplied values, replacing anything that
    /// is missing, zero, or negative with the default.
    pub fn from_requested(size: Option<i64>, stride: Option<i64>) -> Self {
        let positive = |value: Option<i64>, default: usize| {
            value
                .filter(|value| *value > 0)
                .and_then(|value| usize::try_from(value).ok())
                .unwrap_or(default)
        };

        Self {
            size: positive(size, DEFAULT_CHUNK_SIZE),
            stride: positive(stride, DEFAULT_CHUNK_STRIDE),
        }
    }

    /// Same as [`ChunkingConfig::from_requested`] for raw form values.
    /// Unparsable text falls back to the default.
    pub fn from_form_values(size: Option<&str>, stride: Option<&str>) -> Self {
        let parse = |value: Option<&str>| value.and_then(|raw| raw.trim().parse::<i64>().ok());
        Self::from_requested(parse(size), parse(stride))
    }

    pub fn overlap(&self) -> usize {
        self.size.saturating_sub(self.stride)
    }
}

/// Splits `text` into windows of `size` words that start every `stride`
/// words. The window reaching the last word is emitted once and ends the
/// sequence. A zero `size` or `stride` is treated as 1.
pub fn chunk_words(text: &str, size: usize, stride: usize) -> Vec<String> {
    let size = size.max(1);
    let stride = stride.max(1);
    let words = text.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = start.saturating_add(size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start = start.saturating_add(stride);
    }

    chunks
}

pub fn build_chunks(
    filename: &str,
    text: &str,
    config: ChunkingConfig,
    ingested_at: DateTime<Utc>,
) -> Vec<Chunk> {
    chunk_words(text, config.size, config.stride)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            text,
            sequence_number: index + 1,
            source_filename: filename.to_string(),
            ingested_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|index| format!("w{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn zero_size_or_stride_is_raised_to_one() {
        let config = ChunkingConfig::new(4, 0);
        assert_eq!((config.size(), config.stride()), (4, 1));
        assert_eq!(ChunkingConfig::new(0, 0), ChunkingConfig::new(1, 1));

        let chunks = build_chunks("a.pdf", &numbered_words(6), config, Utc::now());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text, "w2 w3 w4 w5");
    }

    #[test]
    fn zero_arguments_to_chunk_words_still_terminate() {
        let chunks = chunk_words(&numbered_words(3), 0, 0);
        assert_eq!(chunks, vec!["w0", "w1", "w2"]);
    }

    #[test]
    fn overlapping_windows_stop_at_the_last_word() {
        let chunks = chunk_words(&numbered_words(10), 4, 3);

        assert_eq!(
            chunks,
            vec![
                "w0 w1 w2 w3".to_string(),
                "w3 w4 w5 w6".to_string(),
                "w6 w7 w8 w9".to_string(),
            ]
        );
    }

    #[test]
    fn short_final_window_is_emitted_once() {
        let chunks = chunk_words(&numbered_words(10), 4, 4);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "w8 w9");
    }

    #[test]
    fn stride_larger_than_size_skips_words() {
        let chunks = chunk_words(&numbered_words(10), 2, 5);
        assert_eq!(chunks, vec!["w0 w1".to_string(), "w5 w6".to_string()]);
    }

    #[test]
    fn window_starts_advance_by_stride_until_the_end() {
        let text = numbered_words(237);
        let chunks = chunk_words(&text, 100, 80);

        for (index, chunk) in chunks.iter().enumerate() {
            let first = chunk.split(' ').next().unwrap();
            assert_eq!(first, format!("w{}", index * 80));
        }
        assert!(chunks.last().unwrap().ends_with("w236"));
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_words("", 100, 80).is_empty());
        assert!(chunk_words(" \n\t ", 100, 80).is_empty());
    }

    #[test]
    fn size_covering_all_words_yields_one_normalized_chunk() {
        let chunks = chunk_words("  one\ntwo   three ", 50, 10);
        assert_eq!(chunks, vec!["one two three".to_string()]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = numbered_words(55);
        assert_eq!(chunk_words(&text, 7, 3), chunk_words(&text, 7, 3));
    }

    #[test]
    fn build_chunks_numbers_from_one() {
        let now = Utc::now();
        let config = ChunkingConfig::new(3, 2);
        let chunks = build_chunks("guide.pdf", &numbered_words(6), config, now);

        let numbers = chunks.iter().map(|chunk| chunk.sequence_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(chunks.iter().all(|chunk| chunk.source_filename == "guide.pdf"));
        assert!(chunks.iter().all(|chunk| chunk.ingested_at == now));
    }

    #[test]
    fn invalid_requested_values_fall_back_to_defaults() {
        assert_eq!(
            ChunkingConfig::from_requested(Some(0), Some(-4)),
            ChunkingConfig::default()
        );
        assert_eq!(
            ChunkingConfig::from_form_values(Some("abc"), Some("")),
            ChunkingConfig::default()
        );
        assert_eq!(
            ChunkingConfig::from_form_values(Some("50"), Some(" 25 ")),
            ChunkingConfig::new(50, 25)
        );
        assert_eq!(ChunkingConfig::default().overlap(), 20);
    }
}
