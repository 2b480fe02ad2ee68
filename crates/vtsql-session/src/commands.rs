//! Statements understood by a Dolt-compatible engine
//!
//! Every version-control primitive the session issues is built here, so the
//! exact call shapes live in one place and can be checked without a server.

use std::borrow::Cow;
use vtsql_core::{
    CommitRef, Result, RowData, Value, VtError,
    sql::{quote_identifier, quote_literal, quote_table_name},
};

/// A statement plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub sql: Cow<'static, str>,
    pub params: Vec<Value>,
}

impl Command {
    fn fixed(sql: &'static str) -> Self {
        Self {
            sql: Cow::Borrowed(sql),
            params: Vec::new(),
        }
    }

    fn with_params(sql: &'static str, params: Vec<Value>) -> Self {
        Self {
            sql: Cow::Borrowed(sql),
            params,
        }
    }

    fn owned(sql: String) -> Self {
        Self {
            sql: Cow::Owned(sql),
            params: Vec::new(),
        }
    }
}

pub fn list_branches() -> Command {
    Command::fixed(
        "SELECT name, hash, latest_committer, latest_committer_email, latest_commit_date, \
         latest_commit_message FROM dolt_branches ORDER BY name",
    )
}

pub fn branch_exists(name: &str) -> Command {
    Command::with_params(
        "SELECT COUNT(*) AS branch_count FROM dolt_branches WHERE name = ?",
        vec![name.into()],
    )
}

pub fn create_branch(name: &str) -> Command {
    Command::with_params("CALL DOLT_BRANCH(?)", vec![name.into()])
}

pub fn delete_branch(name: &str) -> Command {
    Command::with_params("CALL DOLT_BRANCH('-d', ?)", vec![name.into()])
}

/// Delete even when the branch holds commits not merged into the active branch
pub fn force_delete_branch(name: &str) -> Command {
    Command::with_params("CALL DOLT_BRANCH('-D', ?)", vec![name.into()])
}

pub fn checkout(name: &str) -> Command {
    Command::with_params("CALL DOLT_CHECKOUT(?)", vec![name.into()])
}

/// Create `name` from the current head and check it out in one call
pub fn checkout_new(name: &str) -> Command {
    Command::with_params("CALL DOLT_CHECKOUT('-b', ?)", vec![name.into()])
}

pub fn active_branch() -> Command {
    Command::fixed("SELECT active_branch() AS branch")
}

pub fn reset_hard(target: Option<&CommitRef>) -> Command {
    match target {
        Some(target) => Command::with_params(
            "CALL DOLT_RESET('--hard', ?)",
            vec![target.as_str().into()],
        ),
        None => Command::fixed("CALL DOLT_RESET('--hard')"),
    }
}

/// Stage everything and commit it under `author` (`Name <email>`)
pub fn commit(author: &str, message: &str) -> Command {
    Command::with_params(
        "CALL DOLT_COMMIT('-A', '-m', ?, '--author', ?)",
        vec![message.into(), author.into()],
    )
}

/// One page of the commit log, most recent first
///
/// Commits sharing a timestamp are ordered by hash so pages never overlap.
pub fn log_page(limit: usize, offset: usize) -> Command {
    Command::owned(format!(
        "SELECT commit_hash, committer, email, date, message FROM dolt_log \
         ORDER BY date DESC, commit_hash DESC LIMIT {} OFFSET {}",
        limit, offset
    ))
}

pub fn status() -> Command {
    Command::fixed("SELECT table_name, staged, status FROM dolt_status ORDER BY table_name")
}

pub fn diff(table: &str, from: &CommitRef, to: &CommitRef) -> Command {
    Command::with_params(
        "SELECT * FROM DOLT_DIFF(?, ?, ?)",
        vec![from.as_str().into(), to.as_str().into(), table.into()],
    )
}

pub fn merge(branch: &str) -> Command {
    Command::with_params("CALL DOLT_MERGE(?)", vec![branch.into()])
}

pub fn conflicts() -> Command {
    Command::fixed("SELECT `table`, num_conflicts FROM dolt_conflicts ORDER BY `table`")
}

pub fn hash_of(target: &CommitRef) -> Command {
    Command::with_params("SELECT HASHOF(?) AS hash", vec![target.as_str().into()])
}

pub fn list_tables() -> Command {
    Command::fixed("SHOW TABLES")
}

pub fn drop_table(table: &str) -> Command {
    Command::owned(format!("DROP TABLE IF EXISTS {}", quote_table_name(table)))
}

/// Multi-row insert that overwrites the non-key columns of conflicting rows
///
/// All rows must carry the same columns in the same order, and every
/// conflict key must be one of those columns. Values are rendered as
/// literals, so the command carries no parameters.
pub fn upsert(table: &str, rows: &[RowData], conflict_keys: &[&str]) -> Result<Command> {
    let first = rows
        .first()
        .ok_or_else(|| VtError::InvalidInput(format!("no rows to upsert into '{}'", table)))?;
    if conflict_keys.is_empty() {
        return Err(VtError::InvalidInput(format!(
            "upsert into '{}' needs at least one conflict key",
            table
        )));
    }
    let columns: Vec<&str> = first.keys().map(String::as_str).collect();
    if columns.is_empty() {
        return Err(VtError::InvalidInput(format!(
            "rows for '{}' have no columns",
            table
        )));
    }
    if let Some(missing) = conflict_keys.iter().find(|key| !columns.contains(key)) {
        return Err(VtError::InvalidInput(format!(
            "conflict key '{}' is not a column of the rows for '{}'",
            missing, table
        )));
    }

    let mut tuples = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        if !row.keys().map(String::as_str).eq(columns.iter().copied()) {
            return Err(VtError::InvalidInput(format!(
                "row {} for '{}' has columns [{}], expected [{}]",
                idx,
                table,
                row.keys().map(String::as_str).collect::<Vec<_>>().join(", "),
                columns.join(", ")
            )));
        }
        let literals: Vec<String> = row.values().map(quote_literal).collect();
        tuples.push(format!("({})", literals.join(", ")));
    }

    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !conflict_keys.contains(c))
        .map(|c| {
            let quoted = quote_identifier(c);
            format!("{} = VALUES({})", quoted, quoted)
        })
        .collect();
    // With only key columns there is nothing to overwrite, but the statement
    // still has to accept duplicates.
    let update_clause = if updates.is_empty() {
        let key = quote_identifier(conflict_keys[0]);
        format!("{} = {}", key, key)
    } else {
        updates.join(", ")
    };

    Ok(Command::owned(format!(
        "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
        quote_table_name(table),
        column_list,
        tuples.join(", "),
        update_clause
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vtsql_core::{row_data, sql::bind_params};

    fn rendered(command: &Command) -> String {
        bind_params(&command.sql, &command.params).unwrap()
    }

    #[test]
    fn test_branch_commands() {
        assert_eq!(rendered(&create_branch("modify_data")), "CALL DOLT_BRANCH('modify_data')");
        assert_eq!(
            rendered(&delete_branch("modify_data")),
            "CALL DOLT_BRANCH('-d', 'modify_data')"
        );
        assert_eq!(
            rendered(&force_delete_branch("modify_data")),
            "CALL DOLT_BRANCH('-D', 'modify_data')"
        );
        assert_eq!(rendered(&checkout("main")), "CALL DOLT_CHECKOUT('main')");
        assert_eq!(
            rendered(&checkout_new("modify_schema")),
            "CALL DOLT_CHECKOUT('-b', 'modify_schema')"
        );
    }

    #[test]
    fn test_reset_with_and_without_ref() {
        assert_eq!(rendered(&reset_hard(None)), "CALL DOLT_RESET('--hard')");
        assert_eq!(
            rendered(&reset_hard(Some(&CommitRef::from("main~1")))),
            "CALL DOLT_RESET('--hard', 'main~1')"
        );
    }

    #[test]
    fn test_commit_escapes_message() {
        assert_eq!(
            rendered(&commit("Brian <brian@dolthub.com>", "Brian's change")),
            "CALL DOLT_COMMIT('-A', '-m', 'Brian''s change', '--author', 'Brian <brian@dolthub.com>')"
        );
    }

    #[test]
    fn test_diff_against_working() {
        assert_eq!(
            rendered(&diff("employees", &CommitRef::Head, &CommitRef::Working)),
            "SELECT * FROM DOLT_DIFF('HEAD', 'WORKING', 'employees')"
        );
    }

    #[test]
    fn test_log_page() {
        assert_eq!(
            log_page(50, 100).sql,
            "SELECT commit_hash, committer, email, date, message FROM dolt_log \
             ORDER BY date DESC, commit_hash DESC LIMIT 50 OFFSET 100"
        );
    }

    #[test]
    fn test_drop_table_quotes_name() {
        assert_eq!(drop_table("employees_teams").sql, "DROP TABLE IF EXISTS `employees_teams`");
    }

    #[test]
    fn test_upsert_overwrites_non_key_columns() {
        let rows = vec![
            row_data! { "id" => 0, "last_name" => "Sehn", "first_name" => "Tim" },
            row_data! { "id" => 1, "last_name" => "Hendriks", "first_name" => "Brian" },
        ];
        let command = upsert("employees", &rows, &["id"]).unwrap();
        assert_eq!(
            command.sql,
            "INSERT INTO `employees` (`id`, `last_name`, `first_name`) VALUES \
             (0, 'Sehn', 'Tim'), (1, 'Hendriks', 'Brian') ON DUPLICATE KEY UPDATE \
             `last_name` = VALUES(`last_name`), `first_name` = VALUES(`first_name`)"
        );
        assert!(command.params.is_empty());
    }

    #[test]
    fn test_upsert_key_only_table() {
        let rows = vec![row_data! { "team_id" => 0, "employee_id" => 1 }];
        let command = upsert("employees_teams", &rows, &["team_id", "employee_id"]).unwrap();
        assert!(command.sql.ends_with("ON DUPLICATE KEY UPDATE `team_id` = `team_id`"));
    }

    #[test]
    fn test_upsert_rejects_bad_input() {
        let rows = vec![
            row_data! { "id" => 0, "team_name" => "Engineering" },
            row_data! { "id" => 1 },
        ];
        assert!(matches!(
            upsert("teams", &rows, &["id"]),
            Err(VtError::InvalidInput(_))
        ));
        assert!(matches!(
            upsert("teams", &rows[..1], &["name"]),
            Err(VtError::InvalidInput(_))
        ));
        assert!(matches!(upsert("teams", &rows[..1], &[]), Err(VtError::InvalidInput(_))));
        assert!(matches!(upsert("teams", &[], &["id"]), Err(VtError::InvalidInput(_))));
    }
}
