//! Version-control domain types
//!
//! These mirror what the database engine reports about branches, commits,
//! working-set status, diffs and merges. None of them are persisted by vtsql.

use crate::{RowData, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hash identifying an immutable commit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHash(String);

impl CommitHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitHash {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

impl From<String> for CommitHash {
    fn from(v: String) -> Self {
        Self(v)
    }
}

/// Something a diff, reset or hash lookup can point at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommitRef {
    /// The live, uncommitted working set
    Working,
    /// Changes staged for the next commit
    Staged,
    /// The checked-out branch head
    Head,
    /// A branch name, commit hash, tag or ancestry spec such as `main~1`
    Named(String),
}

impl CommitRef {
    /// The spelling the engine understands
    pub fn as_str(&self) -> &str {
        match self {
            CommitRef::Working => "WORKING",
            CommitRef::Staged => "STAGED",
            CommitRef::Head => "HEAD",
            CommitRef::Named(name) => name,
        }
    }
}

impl std::fmt::Display for CommitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CommitRef {
    fn from(v: &str) -> Self {
        match v {
            "WORKING" => CommitRef::Working,
            "STAGED" => CommitRef::Staged,
            "HEAD" => CommitRef::Head,
            other => CommitRef::Named(other.to_string()),
        }
    }
}

impl From<String> for CommitRef {
    fn from(v: String) -> Self {
        CommitRef::from(v.as_str())
    }
}

impl From<&CommitHash> for CommitRef {
    fn from(v: &CommitHash) -> Self {
        CommitRef::Named(v.as_str().to_string())
    }
}

impl From<CommitHash> for CommitRef {
    fn from(v: CommitHash) -> Self {
        CommitRef::Named(v.0)
    }
}

/// A branch as listed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub head: CommitHash,
    pub latest_committer: Option<String>,
    pub latest_committer_email: Option<String>,
    pub latest_commit_date: Option<DateTime<Utc>>,
    pub latest_commit_message: Option<String>,
}

/// One entry of the commit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: CommitHash,
    pub author: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// A table whose working state differs from the last commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub table_name: String,
    pub staged: bool,
    /// Engine wording, e.g. "modified", "new table", "deleted"
    pub status: String,
}

/// Kind of row-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    Added,
    Modified,
    Removed,
}

impl DiffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffType::Added => "added",
            DiffType::Modified => "modified",
            DiffType::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "added" => Some(DiffType::Added),
            "modified" => Some(DiffType::Modified),
            "removed" => Some(DiffType::Removed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-level change of one table between two refs
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    pub diff_type: DiffType,
    pub from_commit: Option<String>,
    pub to_commit: Option<String>,
    /// Column values before the change (all NULL for added rows)
    pub from_values: RowData,
    /// Column values after the change (all NULL for removed rows)
    pub to_values: RowData,
}

impl DiffEntry {
    /// The row as it looks on the side that still has it
    pub fn row(&self) -> &RowData {
        match self.diff_type {
            DiffType::Removed => &self.from_values,
            DiffType::Added | DiffType::Modified => &self.to_values,
        }
    }

    /// Value of `column` on the side that still has the row
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.row().get(column)
    }

    /// Columns whose value differs between the two sides
    pub fn changed_columns(&self) -> Vec<&str> {
        let mut changed: Vec<&str> = self
            .to_values
            .iter()
            .filter(|(col, to)| self.from_values.get(col.as_str()) != Some(*to))
            .map(|(col, _)| col.as_str())
            .collect();
        for col in self.from_values.keys() {
            if !self.to_values.contains_key(col) {
                changed.push(col);
            }
        }
        changed
    }
}

/// Outcome of merging a branch into the active one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub commit_hash: CommitHash,
    pub fast_forward: bool,
    /// Rows the engine could not reconcile; these need manual resolution and
    /// a follow-up commit
    pub conflict_count: u64,
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        self.conflict_count > 0
    }
}

/// Unresolved merge conflicts of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub table_name: String,
    pub conflict_count: u64,
}
