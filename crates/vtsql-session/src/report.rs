//! Human-readable summaries of query results and version-control state
//!
//! Tables are rendered with ASCII borders so they survive log files.

use comfy_table::{Table, presets};
use vtsql_core::{
    BranchInfo, CommitRecord, DiffEntry, DiffType, MergeResult, QueryResult, StatusEntry, Value,
};

fn table_with_header<I, S>(headers: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut table = Table::new();
    table
        .load_preset(presets::ASCII_FULL_CONDENSED)
        .set_header(headers.into_iter().map(Into::into).collect::<Vec<String>>());
    table
}

/// Any query result, one table row per result row
pub fn query_table(result: &QueryResult) -> Table {
    let mut table = table_with_header(result.column_names());
    for row in &result.rows {
        table.add_row(row.values.iter().map(cell).collect::<Vec<_>>());
    }
    table
}

fn cell(value: &Value) -> String {
    value.to_string()
}

pub fn branches_table(branches: &[BranchInfo]) -> Table {
    let mut table = table_with_header(["name", "hash", "latest_committer", "latest_commit_message"]);
    for branch in branches {
        table.add_row([
            branch.name.clone(),
            branch.head.short().to_string(),
            branch.latest_committer.clone().unwrap_or_default(),
            branch.latest_commit_message.clone().unwrap_or_default(),
        ]);
    }
    table
}

pub fn log_table(commits: &[CommitRecord]) -> Table {
    let mut table = table_with_header(["commit", "author", "date", "message"]);
    for commit in commits {
        table.add_row([
            commit.hash.short().to_string(),
            format!("{} <{}>", commit.author, commit.email),
            commit.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            commit.message.clone(),
        ]);
    }
    table
}

pub fn status_table(entries: &[StatusEntry]) -> Table {
    let mut table = table_with_header(["table_name", "staged", "status"]);
    for entry in entries {
        table.add_row([
            entry.table_name.clone(),
            entry.staged.to_string(),
            entry.status.clone(),
        ]);
    }
    table
}

/// One line per changed row; modified rows show `before -> after`
pub fn diff_table(entries: &[DiffEntry]) -> Table {
    let columns: Vec<String> = entries
        .first()
        .map(|e| {
            let side = if e.to_values.is_empty() { &e.from_values } else { &e.to_values };
            side.keys().cloned().collect()
        })
        .unwrap_or_default();

    let headers = std::iter::once("diff_type".to_string()).chain(columns.iter().cloned());
    let mut table = table_with_header(headers);
    for entry in entries {
        let mut row = vec![entry.diff_type.to_string()];
        for column in &columns {
            let from = entry.from_values.get(column);
            let to = entry.to_values.get(column);
            row.push(match (from, to) {
                (Some(from), Some(to)) if entry.diff_type == DiffType::Modified && from != to => {
                    format!("{} -> {}", cell(from), cell(to))
                }
                _ => entry.value(column).map(cell).unwrap_or_default(),
            });
        }
        table.add_row(row);
    }
    table
}

pub fn merge_summary(source: &str, target: &str, merge: &MergeResult) -> String {
    let kind = if merge.fast_forward { "fast-forward" } else { "merge commit" };
    if merge.has_conflicts() {
        format!(
            "merged {} into {} ({}) at {} with {} conflict(s) to resolve",
            source,
            target,
            kind,
            merge.commit_hash.short(),
            merge.conflict_count
        )
    } else {
        format!(
            "merged {} into {} ({}) at {}",
            source,
            target,
            kind,
            merge.commit_hash.short()
        )
    }
}
