//! # Query History Module
//!
//! ## Purpose
//! Bounded, persisted list of the queries a user has searched, most recent
//! first, so the search box can offer them back across restarts.
//!
//! ## Key Features
//! - Case-insensitive de-duplication, duplicates move to the front
//! - Hard cap on retained entries (oldest dropped)
//! - Corrupt or missing storage degrades to an empty list, never an error

use crate::errors::Result;
use tracing::warn;

const HISTORY_TREE: &str = "query_history";
const HISTORY_KEY: &[u8] = b"entries";

/// Persisted, bounded search history
pub struct QueryHistory {
    tree: sled::Tree,
    limit: usize,
}

impl QueryHistory {
    /// Open the history tree on a shared sled database
    pub fn open(db: &sled::Db, limit: usize) -> Result<Self> {
        let tree = db.open_tree(HISTORY_TREE)?;
        Ok(Self { tree, limit })
    }

    /// Current entries, most recent first
    pub fn entries(&self) -> Vec<String> {
        let bytes = match self.tree.get(HISTORY_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "history read failed, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<String>>(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "corrupt history record, starting empty");
                Vec::new()
            }
        }
    }

    /// Push a query to the front, collapsing case-insensitive duplicates
    /// and truncating to the cap
    pub fn record(&self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(());
        }

        let lower = query.to_lowercase();
        let mut entries = self.entries();
        entries.retain(|existing| existing.to_lowercase() != lower);
        entries.insert(0, query.to_string());
        entries.truncate(self.limit);

        let bytes = serde_json::to_vec(&entries)?;
        self.tree.insert(HISTORY_KEY, bytes)?;
        Ok(())
    }

    /// Remove all entries
    pub fn clear(&self) -> Result<()> {
        self.tree.remove(HISTORY_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_history(limit: usize) -> (QueryHistory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("history.db")).unwrap();
        let history = QueryHistory::open(&db, limit).unwrap();
        (history, dir)
    }

    #[test]
    fn most_recent_first_and_capped() {
        let (history, _dir) = open_history(10);
        for i in 0..12 {
            history.record(&format!("node-{i}")).unwrap();
        }

        let entries = history.entries();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0], "node-11");
        assert_eq!(entries[9], "node-2");
    }

    #[test]
    fn duplicates_collapse_to_front_case_insensitively() {
        let (history, _dir) = open_history(10);
        history.record("Node-A").unwrap();
        history.record("node-b").unwrap();
        history.record("NODE-A").unwrap();

        let entries = history.entries();
        assert_eq!(entries, vec!["NODE-A".to_string(), "node-b".to_string()]);
    }

    #[test]
    fn corrupt_storage_degrades_to_empty() {
        let (history, _dir) = open_history(10);
        history.tree.insert(HISTORY_KEY, b"{broken".to_vec()).unwrap();
        assert!(history.entries().is_empty());

        // A new record heals the slot.
        history.record("node-1").unwrap();
        assert_eq!(history.entries(), vec!["node-1".to_string()]);
    }

    #[test]
    fn blank_queries_are_ignored() {
        let (history, _dir) = open_history(10);
        history.record("   ").unwrap();
        assert!(history.entries().is_empty());
    }
}
