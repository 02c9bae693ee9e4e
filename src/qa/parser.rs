//! Parsing of the model's QA answer into training chunks.
//!
//! The model is asked to reply with numbered blocks:
//!
//! ```text
//! Q1: question
//! A1: answer
//! Q2: ...
//! ```
//!
//! A question marker `Q<n>:` opens a block that runs until the next question
//! marker or the end of the text; the first `A<n>:` inside the block separates
//! the question from the answer. When no block can be extracted the source
//! text itself is chunked instead, so every task yields training data.

use std::sync::OnceLock;

use regex::Regex;

use super::splitter::TextSplitter;
use super::types::{ChunkIndex, IndexKind, TrainingChunk};

fn question_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Q\d+\s*[:：]").expect("question marker regex is valid"))
}

fn answer_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"A\d+\s*[:：]").expect("answer marker regex is valid"))
}

fn newline_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\n\s*").expect("newline run regex is valid"))
}

/// Extracts the Q/A blocks of `answer`.
///
/// Returns an empty vector when the answer does not follow the format.
pub fn extract_qa_blocks(answer: &str) -> Vec<TrainingChunk> {
    let text = answer.replace("\\n", "\n");
    let starts: Vec<(usize, usize)> = question_marker()
        .find_iter(&text)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut chunks = Vec::with_capacity(starts.len());
    for (i, &(_, body_start)) in starts.iter().enumerate() {
        let body_end = starts.get(i + 1).map_or(text.len(), |&(next, _)| next);
        let block = &text[body_start..body_end];

        let Some(split) = answer_marker().find(block) else {
            continue;
        };
        let q = block[..split.start()].trim();
        let a = block[split.end()..].trim();
        if q.is_empty() {
            continue;
        }

        chunks.push(TrainingChunk {
            q: q.to_string(),
            a: a.to_string(),
            indexes: vec![ChunkIndex::default_of(
                IndexKind::Qa,
                format!("{}\n{}", q, newline_run().replace_all(a, "\n")),
            )],
        });
    }

    chunks
}

/// Turns a model answer into training chunks, falling back to chunking the
/// source text when the answer has no Q/A blocks.
pub fn parse_qa_answer(
    answer: &str,
    source_text: &str,
    splitter: &dyn TextSplitter,
    fallback_chunk_len: usize,
) -> Vec<TrainingChunk> {
    let chunks = extract_qa_blocks(answer);
    if !chunks.is_empty() {
        return chunks;
    }

    splitter
        .split(source_text, fallback_chunk_len)
        .into_iter()
        .map(|chunk| TrainingChunk {
            indexes: vec![ChunkIndex::default_of(IndexKind::Chunk, chunk.clone())],
            q: chunk,
            a: String::new(),
        })
        .collect()
}
