//! MySQL transaction implementation

use async_trait::async_trait;
use mysql_async::{Conn, prelude::*};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use vtsql_core::{QueryResult, Result, StatementResult, Transaction, Value, VtError, sql::bind_params};

use crate::connection::{run_execute, run_query, sql_preview};

/// MySQL transaction implementation
///
/// Runs on the session's pinned connection, so statements inside the
/// transaction see the branch the session has checked out. The connection
/// stays with the session after COMMIT or ROLLBACK.
pub struct MySqlTransaction {
    conn: Arc<Mutex<Option<Conn>>>,
    in_transaction: Arc<AtomicBool>,
    finished: bool,
}

impl MySqlTransaction {
    pub(crate) fn new(conn: Arc<Mutex<Option<Conn>>>, in_transaction: Arc<AtomicBool>) -> Self {
        Self {
            conn,
            in_transaction,
            finished: false,
        }
    }

    async fn finish(&mut self, statement: &'static str) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| VtError::Connection("Transaction connection no longer available".into()))?;
        conn.query_drop(statement).await.map_err(|e| {
            VtError::Query(format!("Failed to {} transaction: {}", statement.to_lowercase(), e))
        })?;
        self.finished = true;
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Transaction for MySqlTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing MySQL transaction");
        self.finish("COMMIT").await?;
        tracing::debug!("MySQL transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back MySQL transaction");
        self.finish("ROLLBACK").await?;
        tracing::debug!("MySQL transaction rolled back");
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %sql_preview(sql), "executing statement in transaction");
        let final_sql = bind_params(sql, params)?;
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| VtError::Connection("Transaction connection no longer available".into()))?;
        run_execute(conn, &final_sql).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %sql_preview(sql), "executing query in transaction");
        let final_sql = bind_params(sql, params)?;
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| VtError::Connection("Transaction connection no longer available".into()))?;
        run_query(conn, &final_sql).await
    }
}

impl Drop for MySqlTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("MySQL transaction dropped without commit or rollback - will auto-rollback");
        let conn_mutex = self.conn.clone();
        let in_transaction = self.in_transaction.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut guard = conn_mutex.lock().await;
                    if let Some(conn) = guard.as_mut() {
                        if let Err(e) = conn.query_drop("ROLLBACK").await {
                            tracing::error!("Failed to rollback dropped transaction: {}", e);
                        }
                    }
                    in_transaction.store(false, Ordering::SeqCst);
                });
            }
            Err(_) => {
                tracing::error!("no runtime available to roll back dropped transaction");
                in_transaction.store(false, Ordering::SeqCst);
            }
        }
    }
}
