//! Guardian — content-level screening of task payloads.
//!
//! Runs before the executor sees a payload and blocks anything that looks
//! like a destructive command. Complements the lease protocol, which only
//! protects task ownership, not task content. A blocked task is reported
//! as a non-retryable failure; retrying would hit the same patterns again.

use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use serde::Serialize;

/// Screening outcome for one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Blocked { reason: String },
}

/// Running counters, exposed for logging and diagnostics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GuardianStats {
    pub approved: u64,
    pub blocked: u64,
    pub total: u64,
}

/// Payload screen with a fixed set of destructive-command patterns.
pub struct Guardian {
    patterns: Vec<Regex>,
    approved_count: AtomicU64,
    blocked_count: AtomicU64,
}

impl Guardian {
    /// Create a guardian with the default pattern set.
    pub fn new() -> Self {
        let patterns = vec![
            Regex::new(r"(?i)rm\s+-rf").unwrap(),
            Regex::new(r"(?i)delete\s+from\s+\w+").unwrap(),
            Regex::new(r"(?i)drop\s+table").unwrap(),
            Regex::new(r"(?i)drop\s+database").unwrap(),
            Regex::new(r"(?i)truncate\s+table").unwrap(),
            Regex::new(r"(?i)mkfs\.").unwrap(),
            Regex::new(r"(?i)dd\s+if=").unwrap(),
            Regex::new(r"(?i)>\s*/dev/sd").unwrap(),
        ];
        Self {
            patterns,
            approved_count: AtomicU64::new(0),
            blocked_count: AtomicU64::new(0),
        }
    }

    /// Screen a payload. Every string value in the JSON tree is checked.
    pub fn screen(&self, payload: &serde_json::Value) -> Verdict {
        if let Some(pattern) = self.find_match(payload) {
            self.blocked_count.fetch_add(1, Ordering::Relaxed);
            return Verdict::Blocked {
                reason: format!("Blocked dangerous pattern: {pattern}"),
            };
        }
        self.approved_count.fetch_add(1, Ordering::Relaxed);
        Verdict::Approved
    }

    pub fn stats(&self) -> GuardianStats {
        let approved = self.approved_count.load(Ordering::Relaxed);
        let blocked = self.blocked_count.load(Ordering::Relaxed);
        GuardianStats {
            approved,
            blocked,
            total: approved + blocked,
        }
    }

    /// First pattern matching any string in the payload, if any.
    fn find_match(&self, value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::String(s) => self
                .patterns
                .iter()
                .find(|re| re.is_match(s))
                .map(|re| re.as_str().to_string()),
            serde_json::Value::Array(items) => {
                items.iter().find_map(|item| self.find_match(item))
            }
            serde_json::Value::Object(map) => {
                map.values().find_map(|item| self.find_match(item))
            }
            _ => None,
        }
    }
}

impl Default for Guardian {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(guardian: &Guardian, payload: serde_json::Value) -> bool {
        matches!(guardian.screen(&payload), Verdict::Blocked { .. })
    }

    #[test]
    fn approves_ordinary_document_payload() {
        let guardian = Guardian::new();
        let verdict = guardian.screen(&serde_json::json!({
            "operation": "summarize",
            "text": "Quarterly report covering revenue and headcount."
        }));
        assert_eq!(verdict, Verdict::Approved);
    }

    #[test]
    fn blocks_shell_wipe_patterns() {
        let guardian = Guardian::new();
        assert!(blocked(&guardian, serde_json::json!({"cmd": "rm -rf /"})));
        assert!(blocked(&guardian, serde_json::json!({"cmd": "dd if=/dev/zero of=/dev/sda"})));
        assert!(blocked(&guardian, serde_json::json!({"cmd": "echo x > /dev/sda1"})));
        assert!(blocked(&guardian, serde_json::json!({"cmd": "mkfs.ext4 /dev/sdb"})));
    }

    #[test]
    fn blocks_sql_wipe_patterns_case_insensitively() {
        let guardian = Guardian::new();
        assert!(blocked(&guardian, serde_json::json!({"sql": "DROP TABLE users"})));
        assert!(blocked(&guardian, serde_json::json!({"sql": "drop database prod"})));
        assert!(blocked(&guardian, serde_json::json!({"sql": "DELETE FROM accounts"})));
        assert!(blocked(&guardian, serde_json::json!({"sql": "Truncate Table logs"})));
    }

    #[test]
    fn scans_nested_structures() {
        let guardian = Guardian::new();
        let payload = serde_json::json!({
            "steps": [
                {"name": "fetch", "run": "curl https://example.com"},
                {"name": "cleanup", "run": "rm -rf /tmp/build"}
            ]
        });
        assert!(blocked(&guardian, payload));
    }

    #[test]
    fn blocked_reason_names_the_pattern() {
        let guardian = Guardian::new();
        match guardian.screen(&serde_json::json!({"cmd": "rm -rf /data"})) {
            Verdict::Blocked { reason } => assert!(reason.contains("rm")),
            Verdict::Approved => panic!("Expected blocked verdict"),
        }
    }

    #[test]
    fn mentioning_tables_in_prose_is_fine() {
        let guardian = Guardian::new();
        let verdict = guardian.screen(&serde_json::json!({
            "text": "The report includes a table of deleted records from last year."
        }));
        assert_eq!(verdict, Verdict::Approved);
    }

    #[test]
    fn stats_count_both_outcomes() {
        let guardian = Guardian::new();
        guardian.screen(&serde_json::json!({"text": "hello"}));
        guardian.screen(&serde_json::json!({"cmd": "rm -rf /"}));
        guardian.screen(&serde_json::json!({"text": "world"}));

        let stats = guardian.stats();
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.total, 3);
    }

    #[test]
    fn non_string_values_are_ignored() {
        let guardian = Guardian::new();
        let verdict = guardian.screen(&serde_json::json!({
            "count": 42, "ratio": 0.5, "flag": true, "nothing": null
        }));
        assert_eq!(verdict, Verdict::Approved);
    }
}
