//! Text chunking used when the model answer carries no Q/A structure.

/// Splits raw text into ordered chunks of bounded length.
pub trait TextSplitter: Send + Sync {
    /// Returns chunks of at most `max_len` characters covering `text`.
    fn split(&self, text: &str, max_len: usize) -> Vec<String>;
}

/// Characters that end a sentence.
const SENTENCE_ENDS: &[char] = &['.', '!', '?', ';', '。', '！', '？', '；'];

/// Default splitter.
///
/// Cuts each window at the strongest breakpoint found in its second half:
/// a blank line, then a line break, then a sentence end, then any
/// whitespace. A window without breakpoints is cut hard at `max_len`.
/// Chunks are trimmed and blank chunks dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceSplitter;

impl SentenceSplitter {
    pub fn new() -> Self {
        Self
    }

    /// Position right after the best breakpoint in `window`, if any lies at
    /// or beyond `min_cut`.
    fn find_cut(window: &[char], min_cut: usize) -> Option<usize> {
        let tiers: [&dyn Fn(usize) -> bool; 4] = [
            &|i: usize| window[i] == '\n' && i > 0 && window[i - 1] == '\n',
            &|i: usize| window[i] == '\n',
            &|i: usize| SENTENCE_ENDS.contains(&window[i]),
            &|i: usize| window[i].is_whitespace(),
        ];

        tiers.iter().find_map(|matches| {
            (0..window.len())
                .rev()
                .map(|i| i + 1)
                .take_while(|cut| *cut >= min_cut.max(1))
                .find(|cut| matches(cut - 1))
        })
    }
}

impl TextSplitter for SentenceSplitter {
    fn split(&self, text: &str, max_len: usize) -> Vec<String> {
        let max_len = max_len.max(1);
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = if chars.len() - start <= max_len {
                chars.len()
            } else {
                let window = &chars[start..start + max_len];
                start + Self::find_cut(window, max_len / 2).unwrap_or(max_len)
            };

            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            start = end;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = SentenceSplitter.split("  hello world \n", 500);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(SentenceSplitter.split("", 500).is_empty());
        assert!(SentenceSplitter.split(" \n\n ", 500).is_empty());
    }

    #[test]
    fn test_chunks_respect_max_len() {
        let sentence = "Ownership rules govern how memory is managed. ";
        let text = sentence.repeat(40);
        let chunks = SentenceSplitter.split(&text, 500);

        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 500);
            assert!(chunk.ends_with('.'), "cut should land on a sentence end: {chunk:?}");
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let first = "a".repeat(30);
        let second = "b ".repeat(20);
        let text = format!("{first}\n\n{second}");
        let chunks = SentenceSplitter.split(&text, 40);
        assert_eq!(chunks[0], first);
    }

    #[test]
    fn test_hard_cut_without_breakpoints() {
        let text = "x".repeat(1200);
        let chunks = SentenceSplitter.split(&text, 500);
        let lens: Vec<usize> = chunks.iter().map(|c| char_len(c)).collect();
        assert_eq!(lens, vec![500, 500, 200]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "数据集训练。".repeat(200);
        let chunks = SentenceSplitter.split(&text, 500);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 500);
        }
        let total: usize = chunks.iter().map(|c| char_len(c)).sum();
        assert_eq!(total, char_len(&text));
    }
}
