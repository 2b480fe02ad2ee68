//! Versioned-table session
//!
//! A [`VersionedSession`] wraps one connection to a Dolt-compatible server and
//! exposes its branch, commit, diff and merge primitives as typed calls. The
//! engine does all the version-control work; this type only marshals
//! statements and results and adds existence checks where the engine's own
//! errors would be ambiguous.

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use vtsql_core::{
    BranchError, BranchInfo, CommitHash, CommitRecord, CommitRef, ConflictSummary, Connection,
    ConnectionConfig, DiffEntry, MergeResult, QueryResult, Result, RowData, SessionOptions,
    StatementResult, StatusEntry, Transaction, TransactionErrorPolicy, Value, VtError,
};
use vtsql_driver_mysql::MySqlDriver;

use crate::commands::{self, Command};
use crate::decode;

/// Rows fetched per round trip when walking the commit log
pub(crate) const LOG_PAGE_SIZE: usize = 50;

/// Position of a commit-log walk
struct LogCursor {
    offset: usize,
    remaining: Option<usize>,
    exhausted: bool,
}

/// A session against one database of a version-controlled SQL server
///
/// The engine tracks the checked-out branch per SQL connection, and the
/// connection behind a session is pinned, so every call made through the
/// same session sees the same active branch.
pub struct VersionedSession {
    conn: Arc<dyn Connection>,
    options: SessionOptions,
}

impl VersionedSession {
    /// Connect with default session options
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        Self::connect_with_options(config, SessionOptions::default()).await
    }

    pub async fn connect_with_options(
        config: &ConnectionConfig,
        options: SessionOptions,
    ) -> Result<Self> {
        let conn = MySqlDriver::new().connect(config).await?;
        Ok(Self::with_connection(conn, options))
    }

    /// Build a session over an already open connection
    pub fn with_connection(conn: Arc<dyn Connection>, options: SessionOptions) -> Self {
        Self { conn, options }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    async fn run_query(&self, command: Command) -> Result<QueryResult> {
        self.conn.query(&command.sql, &command.params).await
    }

    async fn run_execute(&self, command: Command) -> Result<StatementResult> {
        self.conn.execute(&command.sql, &command.params).await
    }

    /// Run a branch-level procedure, attributing engine failures to `branch`
    async fn run_branch_command(&self, branch: &str, command: Command) -> Result<QueryResult> {
        self.run_query(command).await.map_err(|e| match e {
            VtError::Query(message) => VtError::Branch(BranchError::Engine {
                branch: branch.to_string(),
                message,
            }),
            other => other,
        })
    }

    // ---- branches ----

    pub async fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        let result = self.run_query(commands::list_branches()).await?;
        decode::all(&result, decode::branch)
    }

    pub async fn branch_exists(&self, name: &str) -> Result<bool> {
        let result = self.run_query(commands::branch_exists(name)).await?;
        Ok(decode::scalar_count(&result, "branch lookup")? > 0)
    }

    /// Create `name` at the current head without checking it out
    #[tracing::instrument(skip(self))]
    pub async fn create_branch(&self, name: &str) -> Result<()> {
        validate_branch_name(name)?;
        if self.branch_exists(name).await? {
            return Err(BranchError::AlreadyExists(name.to_string()).into());
        }
        self.run_branch_command(name, commands::create_branch(name))
            .await?;
        tracing::info!(branch = name, "branch created");
        Ok(())
    }

    /// Switch the session to `name`, creating it first when allowed
    ///
    /// Existence is checked before anything is created, so repeating the
    /// call with `create_if_missing` checks out the branch made the first
    /// time instead of failing on a duplicate. The check and the create are
    /// two round trips; concurrent sessions racing on the same new name can
    /// still collide.
    #[tracing::instrument(skip(self))]
    pub async fn checkout_branch(&self, name: &str, create_if_missing: bool) -> Result<()> {
        validate_branch_name(name)?;
        if self.branch_exists(name).await? {
            self.run_branch_command(name, commands::checkout(name))
                .await?;
            tracing::info!(branch = name, "checked out branch");
        } else if create_if_missing {
            self.run_branch_command(name, commands::checkout_new(name))
                .await?;
            tracing::info!(branch = name, "created and checked out branch");
        } else {
            return Err(BranchError::NotFound(name.to_string()).into());
        }
        Ok(())
    }

    pub async fn active_branch(&self) -> Result<String> {
        let result = self.run_query(commands::active_branch()).await?;
        decode::scalar_text(&result, "active_branch()")
    }

    /// Delete a branch that exists and is not the active one
    ///
    /// The engine refuses branches with commits not merged into the active
    /// branch; see [`Self::force_delete_branch`].
    #[tracing::instrument(skip(self))]
    pub async fn delete_branch(&self, name: &str) -> Result<()> {
        self.remove_branch(name, false).await
    }

    /// Like [`Self::delete_branch`], but unmerged commits are discarded
    #[tracing::instrument(skip(self))]
    pub async fn force_delete_branch(&self, name: &str) -> Result<()> {
        self.remove_branch(name, true).await
    }

    async fn remove_branch(&self, name: &str, force: bool) -> Result<()> {
        validate_branch_name(name)?;
        if !self.branch_exists(name).await? {
            return Err(BranchError::NotFound(name.to_string()).into());
        }
        if self.active_branch().await? == name {
            return Err(BranchError::CheckedOut(name.to_string()).into());
        }
        let command = if force {
            commands::force_delete_branch(name)
        } else {
            commands::delete_branch(name)
        };
        self.run_branch_command(name, command).await?;
        tracing::info!(branch = name, force, "branch deleted");
        Ok(())
    }

    // ---- working set ----

    /// Discard uncommitted changes, moving to `target` or the branch head
    #[tracing::instrument(skip(self))]
    pub async fn reset_hard(&self, target: Option<CommitRef>) -> Result<()> {
        self.run_query(commands::reset_hard(target.as_ref())).await?;
        tracing::info!(
            target = target.as_ref().map(CommitRef::as_str).unwrap_or("HEAD"),
            "working set reset"
        );
        Ok(())
    }

    /// Run schema statements as one SQL transaction
    ///
    /// The first failing statement rolls the transaction back and is named in
    /// the returned [`VtError::Schema`].
    #[tracing::instrument(skip(self, definitions), fields(statements = definitions.len()))]
    pub async fn apply_schema<S: AsRef<str>>(&self, definitions: &[S]) -> Result<()> {
        let tx = self.conn.begin_transaction().await?;
        for (idx, definition) in definitions.iter().enumerate() {
            let definition = definition.as_ref();
            let outcome = tx.execute(definition, &[]).await;
            if let Err(e) = outcome {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "failed to roll back schema change");
                }
                return Err(VtError::Schema(format!(
                    "statement {} of {} failed ({}): {}",
                    idx + 1,
                    definitions.len(),
                    statement_preview(definition),
                    e
                )));
            }
        }
        tx.commit()
            .await
            .map_err(|e| VtError::Schema(format!("failed to commit schema change: {}", e)))?;
        tracing::info!("schema applied");
        Ok(())
    }

    /// Insert rows, overwriting non-key columns of rows whose keys collide
    ///
    /// Returns the engine's affected-row count. No rows is a no-op.
    #[tracing::instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn upsert_rows(
        &self,
        table: &str,
        rows: &[RowData],
        conflict_keys: &[&str],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let command = commands::upsert(table, rows, conflict_keys)?;
        let result = self.run_execute(command).await?;
        Ok(result.affected_rows)
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let result = self.run_query(commands::list_tables()).await?;
        result
            .rows
            .iter()
            .map(|row| match row.get(0) {
                Some(Value::Null) | None => Err(VtError::UnexpectedResult(
                    "SHOW TABLES returned an empty row".into(),
                )),
                Some(value) => Ok(value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string())),
            })
            .collect()
    }

    /// Drop each table that exists, in the order given
    pub async fn drop_tables<S: AsRef<str>>(&self, tables: &[S]) -> Result<()> {
        for table in tables {
            self.run_execute(commands::drop_table(table.as_ref()))
                .await?;
        }
        Ok(())
    }

    /// Ordinary statement returning rows, on the active branch
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.conn.query(sql, params).await
    }

    /// Ordinary statement without rows, on the active branch
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.conn.execute(sql, params).await
    }

    // ---- history ----

    /// Stage everything and commit it
    ///
    /// When the working set is already clean nothing is committed and the
    /// current head hash comes back, so repeating a commit without writes in
    /// between yields the same hash.
    #[tracing::instrument(skip(self, message))]
    pub async fn commit(&self, author: &str, message: &str) -> Result<CommitHash> {
        validate_author(author)?;
        if message.trim().is_empty() {
            return Err(VtError::InvalidInput("commit message must not be empty".into()));
        }

        if self.status().await?.is_empty() {
            let head = self.head_hash(&CommitRef::Head).await?;
            tracing::info!(hash = %head.short(), "nothing to commit, working set clean");
            return Ok(head);
        }

        let result = self.run_query(commands::commit(author, message)).await?;
        let hash = decode::commit_hash(&result, "DOLT_COMMIT")?;
        tracing::info!(hash = %hash.short(), "committed");
        Ok(hash)
    }

    /// Commit log of the active branch, most recent first
    ///
    /// Pages are fetched as the stream is polled; `limit` caps the number of
    /// records yielded.
    pub fn commit_log(&self, limit: Option<usize>) -> BoxStream<'_, Result<CommitRecord>> {
        let start = LogCursor {
            offset: 0,
            remaining: limit,
            exhausted: false,
        };
        stream::try_unfold(start, move |cursor| self.next_log_page(cursor))
            .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    async fn next_log_page(
        &self,
        mut cursor: LogCursor,
    ) -> Result<Option<(Vec<CommitRecord>, LogCursor)>> {
        let page_size = match cursor.remaining {
            Some(0) => return Ok(None),
            Some(n) => n.min(LOG_PAGE_SIZE),
            None => LOG_PAGE_SIZE,
        };
        if cursor.exhausted {
            return Ok(None);
        }

        let result = self
            .run_query(commands::log_page(page_size, cursor.offset))
            .await?;
        let records = decode::all(&result, decode::commit_record)?;
        if records.is_empty() {
            return Ok(None);
        }

        cursor.exhausted = records.len() < page_size;
        cursor.offset += records.len();
        if let Some(remaining) = cursor.remaining.as_mut() {
            *remaining = remaining.saturating_sub(records.len());
        }
        Ok(Some((records, cursor)))
    }

    /// Collected form of [`commit_log`](Self::commit_log)
    pub async fn commit_history(&self, limit: Option<usize>) -> Result<Vec<CommitRecord>> {
        self.commit_log(limit).try_collect().await
    }

    /// Tables whose working state differs from the head; empty when clean
    pub async fn status(&self) -> Result<Vec<StatusEntry>> {
        let result = self.run_query(commands::status()).await?;
        decode::all(&result, decode::status_entry)
    }

    /// Row-level changes to `table` between two refs
    #[tracing::instrument(skip(self))]
    pub async fn diff(&self, table: &str, from: &CommitRef, to: &CommitRef) -> Result<Vec<DiffEntry>> {
        let result = self.run_query(commands::diff(table, from, to)).await?;
        let entries = decode::all(&result, decode::diff_entry)?;
        tracing::debug!(changes = entries.len(), "diff computed");
        Ok(entries)
    }

    /// Merge `source_branch` into the active branch
    ///
    /// Conflicts are never resolved here. A non-zero `conflict_count` leaves
    /// conflict rows in the working set for the caller to resolve and commit.
    #[tracing::instrument(skip(self))]
    pub async fn merge(&self, source_branch: &str) -> Result<MergeResult> {
        validate_branch_name(source_branch)?;
        if !self.branch_exists(source_branch).await? {
            return Err(BranchError::NotFound(source_branch.to_string()).into());
        }

        let result = self
            .run_branch_command(source_branch, commands::merge(source_branch))
            .await?;
        let row = decode::merge_row(&result)?;
        let commit_hash = match row.hash {
            Some(hash) => hash,
            None => self.head_hash(&CommitRef::Head).await?,
        };

        let merge = MergeResult {
            commit_hash,
            fast_forward: row.fast_forward,
            conflict_count: row.conflicts,
        };
        if merge.has_conflicts() {
            tracing::warn!(
                conflicts = merge.conflict_count,
                "merge left conflicts that need resolving before the next commit"
            );
        } else {
            tracing::info!(
                hash = %merge.commit_hash.short(),
                fast_forward = merge.fast_forward,
                "merge complete"
            );
        }
        Ok(merge)
    }

    /// Unresolved conflicts per table
    pub async fn conflicts(&self) -> Result<Vec<ConflictSummary>> {
        let result = self.run_query(commands::conflicts()).await?;
        decode::all(&result, decode::conflict)
    }

    /// Hash a ref resolves to
    pub async fn head_hash(&self, target: &CommitRef) -> Result<CommitHash> {
        let result = self.run_query(commands::hash_of(target)).await?;
        decode::commit_hash(&result, "HASHOF")
    }

    // ---- transactions ----

    /// Run `work` inside one SQL transaction on the session's connection
    ///
    /// The transaction commits when `work` succeeds and rolls back when it
    /// fails. A failure is returned as [`VtError::Transaction`] under
    /// [`TransactionErrorPolicy::Propagate`]; under
    /// [`TransactionErrorPolicy::Suppress`] it is logged and `Ok(None)` comes
    /// back instead.
    ///
    /// ```ignore
    /// session
    ///     .with_transaction(|tx| Box::pin(async move {
    ///         tx.execute("UPDATE employees SET first_name = ? WHERE id = ?", &["Tim".into(), 0.into()]).await
    ///     }))
    ///     .await?;
    /// ```
    pub async fn with_transaction<T, F>(&self, work: F) -> Result<Option<T>>
    where
        F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let tx = self.conn.begin_transaction().await?;
        let outcome = work(tx.as_ref()).await;
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(Some(value))
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "failed to roll back transaction");
                }
                match self.options.on_transaction_error {
                    TransactionErrorPolicy::Propagate => {
                        tracing::error!(error = %e, "transaction rolled back");
                        Err(VtError::Transaction(Box::new(e)))
                    }
                    TransactionErrorPolicy::Suppress => {
                        tracing::warn!(error = %e, "transaction rolled back, error suppressed");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Release the connection; calling it again does nothing
    pub async fn close(&self) -> Result<()> {
        self.conn.close().await
    }
}

fn validate_branch_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VtError::InvalidInput("branch name must not be empty".into()));
    }
    Ok(())
}

/// Authors are given as `Name <email>`
fn validate_author(author: &str) -> Result<()> {
    let invalid = || {
        VtError::InvalidInput(format!(
            "author '{}' is not in the form 'Name <email>'",
            author
        ))
    };
    let (name, rest) = author.split_once('<').ok_or_else(invalid)?;
    let email = rest.strip_suffix('>').ok_or_else(invalid)?;
    if name.trim().is_empty() || !email.contains('@') || email.contains(['<', '>']) {
        return Err(invalid());
    }
    Ok(())
}

fn statement_preview(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 60 {
        format!("{}...", flat.chars().take(60).collect::<String>())
    } else {
        flat
    }
}

#[cfg(test)]
mod tests;
