//! QA extraction: prompt construction, answer parsing and fallback chunking.

pub mod parser;
pub mod prompt;
pub mod splitter;
pub mod types;

pub use parser::{extract_qa_blocks, parse_qa_answer};
pub use prompt::{build_qa_messages, replace_variables, DEFAULT_QA_PROMPT, DEFAULT_THEME};
pub use splitter::{SentenceSplitter, TextSplitter};
pub use types::{ChunkIndex, IndexKind, TrainingChunk};
