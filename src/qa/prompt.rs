//! Prompt construction for QA extraction.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::llm::Message;

/// Theme substituted into the default prompt.
pub const DEFAULT_THEME: &str = "it may cover several different topics";

/// Prompt used when a task carries no custom template.
pub const DEFAULT_QA_PROMPT: &str = r#"I will give you a piece of text; {{theme}}. Study it and organise what you learned as questions and answers:
1. Ask questions and give an answer to each of them.
2. Answers must be detailed and complete, keeping the original wording where possible. They may contain plain text, links, code, tables and other markdown elements.
3. Ask at most 30 questions.

Reply strictly in the following format:
Q1: question
A1: answer
Q2:
A2:
...

Text:
"""{{text}}""""#;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder regex is valid"))
}

/// Replaces `{{name}}` placeholders with the given values in one pass.
///
/// Unknown placeholders are left as they are and substituted values are
/// never scanned again.
pub fn replace_variables(template: &str, vars: &[(&str, &str)]) -> String {
    let lookup: HashMap<&str, &str> = vars.iter().copied().collect();
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| {
            match lookup.get(&caps[1]) {
                Some(value) => (*value).to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Builds the single user message sent to the model for one task.
pub fn build_qa_messages(custom_prompt: Option<&str>, text: &str) -> Vec<Message> {
    let content = match custom_prompt.filter(|p| !p.trim().is_empty()) {
        Some(template) => replace_variables(template, &[("text", text)]),
        None => replace_variables(
            DEFAULT_QA_PROMPT,
            &[("theme", DEFAULT_THEME), ("text", text)],
        ),
    };
    vec![Message::user(content)]
}
