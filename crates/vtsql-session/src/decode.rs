//! Decoding of engine result rows into version-control types

use vtsql_core::{
    BranchInfo, CommitHash, CommitRecord, ConflictSummary, DiffEntry, DiffType, QueryResult,
    Result, Row, RowData, StatusEntry, Value, VtError,
};

fn missing(column: &str, what: &str) -> VtError {
    VtError::UnexpectedResult(format!("{} row has no usable '{}' column", what, column))
}

fn text(row: &Row, column: &str, what: &str) -> Result<String> {
    match row.get_by_name(column) {
        Some(Value::Null) | None => Err(missing(column, what)),
        Some(value) => Ok(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())),
    }
}

fn optional_text(row: &Row, column: &str) -> Option<String> {
    match row.get_by_name(column) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())),
    }
}

fn count(row: &Row, column: &str, what: &str) -> Result<u64> {
    row.get_by_name(column)
        .and_then(Value::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| missing(column, what))
}

pub fn branch(row: &Row) -> Result<BranchInfo> {
    Ok(BranchInfo {
        name: text(row, "name", "branch")?,
        head: CommitHash::new(text(row, "hash", "branch")?),
        latest_committer: optional_text(row, "latest_committer"),
        latest_committer_email: optional_text(row, "latest_committer_email"),
        latest_commit_date: row
            .get_by_name("latest_commit_date")
            .and_then(Value::as_datetime_utc),
        latest_commit_message: optional_text(row, "latest_commit_message"),
    })
}

pub fn commit_record(row: &Row) -> Result<CommitRecord> {
    let timestamp = row
        .get_by_name("date")
        .and_then(Value::as_datetime_utc)
        .ok_or_else(|| missing("date", "log"))?;
    Ok(CommitRecord {
        hash: CommitHash::new(text(row, "commit_hash", "log")?),
        author: text(row, "committer", "log")?,
        email: optional_text(row, "email").unwrap_or_default(),
        timestamp,
        message: optional_text(row, "message").unwrap_or_default(),
    })
}

pub fn status_entry(row: &Row) -> Result<StatusEntry> {
    Ok(StatusEntry {
        table_name: text(row, "table_name", "status")?,
        staged: row
            .get_by_name("staged")
            .and_then(Value::as_bool)
            .ok_or_else(|| missing("staged", "status"))?,
        status: text(row, "status", "status")?,
    })
}

/// Split a `DOLT_DIFF` row into its before and after images
///
/// Data columns come prefixed with `from_` and `to_`; the commit and commit
/// date columns of each side are bookkeeping, not row data.
pub fn diff_entry(row: &Row) -> Result<DiffEntry> {
    let raw_type = text(row, "diff_type", "diff")?;
    let diff_type = DiffType::parse(&raw_type).ok_or_else(|| {
        VtError::UnexpectedResult(format!("unknown diff type '{}'", raw_type))
    })?;

    let mut from_values = RowData::new();
    let mut to_values = RowData::new();
    for (column, value) in row.iter() {
        let lower = column.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "from_commit" | "to_commit" | "from_commit_date" | "to_commit_date" | "diff_type"
        ) {
            continue;
        }
        if let Some(name) = column.strip_prefix("from_") {
            from_values.insert(name.to_string(), value.clone());
        } else if let Some(name) = column.strip_prefix("to_") {
            to_values.insert(name.to_string(), value.clone());
        }
    }

    Ok(DiffEntry {
        diff_type,
        from_commit: optional_text(row, "from_commit"),
        to_commit: optional_text(row, "to_commit"),
        from_values,
        to_values,
    })
}

pub fn conflict(row: &Row) -> Result<ConflictSummary> {
    Ok(ConflictSummary {
        table_name: text(row, "table", "conflicts")?,
        conflict_count: count(row, "num_conflicts", "conflicts")?,
    })
}

/// Raw merge outcome; older engines report no hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRow {
    pub hash: Option<CommitHash>,
    pub fast_forward: bool,
    pub conflicts: u64,
}

pub fn merge_row(result: &QueryResult) -> Result<MergeRow> {
    let row = result
        .rows
        .first()
        .ok_or_else(|| VtError::UnexpectedResult("merge returned no rows".into()))?;
    Ok(MergeRow {
        hash: optional_text(row, "hash")
            .filter(|h| !h.is_empty())
            .map(CommitHash::new),
        fast_forward: row
            .get_by_name("fast_forward")
            .and_then(Value::as_bool)
            .ok_or_else(|| missing("fast_forward", "merge"))?,
        conflicts: count(row, "conflicts", "merge")?,
    })
}

/// First column of the first row as a commit hash
pub fn commit_hash(result: &QueryResult, what: &str) -> Result<CommitHash> {
    match result.scalar() {
        Some(Value::Null) | None => Err(VtError::UnexpectedResult(format!(
            "{} returned no commit hash",
            what
        ))),
        Some(value) => {
            let hash = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            if hash.is_empty() {
                return Err(VtError::UnexpectedResult(format!(
                    "{} returned an empty commit hash",
                    what
                )));
            }
            Ok(CommitHash::new(hash))
        }
    }
}

pub fn scalar_text(result: &QueryResult, what: &str) -> Result<String> {
    match result.scalar() {
        Some(Value::Null) | None => Err(VtError::UnexpectedResult(format!("{} returned nothing", what))),
        Some(value) => Ok(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())),
    }
}

pub fn scalar_count(result: &QueryResult, what: &str) -> Result<u64> {
    result
        .scalar()
        .and_then(Value::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| VtError::UnexpectedResult(format!("{} returned no count", what)))
}

/// Decode every row with `f`
pub fn all<T>(result: &QueryResult, f: impl Fn(&Row) -> Result<T>) -> Result<Vec<T>> {
    result.rows.iter().map(f).collect()
}
