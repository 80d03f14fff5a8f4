//! Per-branch execution context.
//!
//! Contexts are copied at fork and merged at join; no two branches ever
//! share a mutable context, which is what keeps branch isolation free of
//! locking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Conflict-resolution rule when merging branch contexts at a join.
///
/// The default follows the documented "last contributing branch wins"
/// policy; arrival order among contributing branches defines "last".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// On key collision the later-arriving branch wins.
    #[default]
    LastWriteWins,
    /// On key collision the earlier-arriving branch wins.
    FirstWriteWins,
}

/// Accumulated key/value outputs for one branch, plus task identity and
/// caller-supplied metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Owning task.
    pub task_id: Uuid,
    /// Caller-supplied metadata, read-only for providers.
    metadata: HashMap<String, serde_json::Value>,
    /// Outputs accumulated along this branch.
    outputs: HashMap<String, serde_json::Value>,
    /// Result URLs accumulated along this branch.
    result_urls: Vec<String>,
}

impl ExecutionContext {
    /// Creates the root context from the caller's input payload.
    #[must_use]
    pub fn new(task_id: Uuid, metadata: HashMap<String, serde_json::Value>) -> Self {
        Self {
            task_id,
            metadata,
            outputs: HashMap::new(),
            result_urls: Vec::new(),
        }
    }

    /// Returns an independent copy for a forked branch.
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Gets a metadata value.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// All caller-supplied metadata.
    #[must_use]
    pub fn metadata_map(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Gets an accumulated output value.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&serde_json::Value> {
        self.outputs.get(key)
    }

    /// Returns all accumulated outputs.
    #[must_use]
    pub fn outputs(&self) -> &HashMap<String, serde_json::Value> {
        &self.outputs
    }

    /// Returns accumulated result URLs.
    #[must_use]
    pub fn result_urls(&self) -> &[String] {
        &self.result_urls
    }

    /// Records one provider's output into this branch.
    pub fn absorb(
        &mut self,
        data: HashMap<String, serde_json::Value>,
        result_urls: Vec<String>,
    ) {
        self.outputs.extend(data);
        self.result_urls.extend(result_urls);
    }

    /// Merges another branch's context into this one per the policy.
    ///
    /// `other` is the later arrival; under [`MergePolicy::LastWriteWins`]
    /// its keys overwrite, under [`MergePolicy::FirstWriteWins`] they are
    /// only inserted where absent.
    pub fn merge(&mut self, other: Self, policy: MergePolicy) {
        match policy {
            MergePolicy::LastWriteWins => {
                self.outputs.extend(other.outputs);
            }
            MergePolicy::FirstWriteWins => {
                for (key, value) in other.outputs {
                    self.outputs.entry(key).or_insert(value);
                }
            }
        }
        for url in other.result_urls {
            if !self.result_urls.contains(&url) {
                self.result_urls.push(url);
            }
        }
    }

    /// Consumes the context into its artifact map and result URLs.
    #[must_use]
    pub fn into_artifacts(self) -> (HashMap<String, serde_json::Value>, Vec<String>) {
        (self.outputs, self.result_urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), HashMap::new())
    }

    #[test]
    fn test_fork_is_isolated() {
        let mut parent = ctx();
        parent.absorb(
            HashMap::from([("a".to_string(), serde_json::json!(1))]),
            vec![],
        );

        let mut child = parent.fork();
        child.absorb(
            HashMap::from([("b".to_string(), serde_json::json!(2))]),
            vec![],
        );

        assert!(parent.output("b").is_none());
        assert_eq!(child.output("a"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut first = ctx();
        first.absorb(
            HashMap::from([("k".to_string(), serde_json::json!("early"))]),
            vec![],
        );
        let mut late = ctx();
        late.absorb(
            HashMap::from([("k".to_string(), serde_json::json!("late"))]),
            vec![],
        );

        first.merge(late, MergePolicy::LastWriteWins);
        assert_eq!(first.output("k"), Some(&serde_json::json!("late")));
    }

    #[test]
    fn test_merge_first_write_wins() {
        let mut first = ctx();
        first.absorb(
            HashMap::from([("k".to_string(), serde_json::json!("early"))]),
            vec![],
        );
        let mut late = ctx();
        late.absorb(
            HashMap::from([("k".to_string(), serde_json::json!("late"))]),
            vec![],
        );

        first.merge(late, MergePolicy::FirstWriteWins);
        assert_eq!(first.output("k"), Some(&serde_json::json!("early")));
    }

    #[test]
    fn test_merge_dedupes_result_urls() {
        let mut a = ctx();
        a.absorb(HashMap::new(), vec!["https://cdn/x".to_string()]);
        let mut b = ctx();
        b.absorb(
            HashMap::new(),
            vec!["https://cdn/x".to_string(), "https://cdn/y".to_string()],
        );

        a.merge(b, MergePolicy::LastWriteWins);
        assert_eq!(a.result_urls().len(), 2);
    }
}
