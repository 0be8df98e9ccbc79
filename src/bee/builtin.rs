//! Built-in executors.
//!
//! [`DocExecutor`] covers the document-processing role: summarize, analyze,
//! generate, and extract over a text payload. The operation is picked by the
//! payload's `operation` field and defaults to summarization.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;

use crate::agents::model::BeeRole;
use crate::bee::executor::Executor;
use crate::error::ExecutorError;
use crate::rpc::types::TaskEnvelope;

/// Longest summary we will produce, in characters.
const SUMMARY_MAX_CHARS: usize = 400;

/// Document-processing executor.
pub struct DocExecutor {
    email_re: Regex,
    url_re: Regex,
}

impl DocExecutor {
    pub fn new() -> Self {
        Self {
            email_re: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
            url_re: Regex::new(r"https?://[^\s<>\x22]+").unwrap(),
        }
    }

    fn summarize(&self, text: &str) -> serde_json::Value {
        let summary = leading_sentences(text, 2);
        serde_json::json!({
            "summary": summary,
            "original_length": text.len(),
            "summary_length": summary.len(),
            "method": "leading_sentences",
        })
    }

    fn analyze(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "word_count": text.split_whitespace().count(),
            "char_count": text.len(),
            "line_count": text.lines().count(),
            "key_points": top_words(text, 5),
            "sentiment": "neutral",
        })
    }

    fn generate(&self, prompt: &str) -> serde_json::Value {
        let content = format!("Draft based on: {prompt}");
        serde_json::json!({
            "generated_content": content,
            "word_count": content.split_whitespace().count(),
        })
    }

    fn extract(&self, text: &str) -> serde_json::Value {
        let emails: Vec<&str> = self.email_re.find_iter(text).map(|m| m.as_str()).collect();
        let urls: Vec<&str> = self.url_re.find_iter(text).map(|m| m.as_str()).collect();
        serde_json::json!({
            "emails": emails,
            "urls": urls,
            "count": emails.len() + urls.len(),
        })
    }
}

impl Default for DocExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for DocExecutor {
    fn role(&self) -> BeeRole {
        BeeRole::Doc
    }

    async fn execute(&self, task: &TaskEnvelope) -> Result<serde_json::Value, ExecutorError> {
        let operation = task
            .payload
            .get("operation")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("summarize");

        match operation {
            "summarize" => Ok(self.summarize(require_str(task, "text")?)),
            "analyze" => Ok(self.analyze(require_str(task, "text")?)),
            "generate" => Ok(self.generate(require_str(task, "prompt")?)),
            "extract" => Ok(self.extract(require_str(task, "text")?)),
            other => Err(ExecutorError::InvalidPayload {
                task_id: task.id,
                reason: format!("unknown operation '{other}'"),
            }),
        }
    }
}

/// Fetch a required non-empty string field from the payload.
fn require_str<'a>(task: &'a TaskEnvelope, key: &str) -> Result<&'a str, ExecutorError> {
    task.payload
        .get(key)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ExecutorError::InvalidPayload {
            task_id: task.id,
            reason: format!("missing '{key}' string field"),
        })
}

/// Take the first `limit` sentences, hard-capped at [`SUMMARY_MAX_CHARS`].
fn leading_sentences(text: &str, limit: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in text.split_inclusive(['.', '!', '?']).enumerate() {
        if i == limit {
            break;
        }
        out.push_str(chunk);
    }

    let trimmed = out.trim();
    if trimmed.len() <= SUMMARY_MAX_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Most frequent words of five or more letters, ties broken alphabetically.
fn top_words(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.len() >= 5 {
            *counts.entry(cleaned).or_insert(0) += 1;
        }
    }

    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.into_iter().take(limit).map(|(word, _)| word).collect()
}
