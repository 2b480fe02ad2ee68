//! MySQL connection implementation

use async_trait::async_trait;
use mysql_async::{
    Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row as MySqlRow,
    consts::ColumnType, prelude::*,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use vtsql_core::{
    ColumnMeta, Connection, ConnectionConfig, QueryResult, Result, Row, StatementResult,
    Transaction, Value, VtError, sql::bind_params,
};

use crate::MysqlTlsConnector;
use crate::transaction::MySqlTransaction;
use crate::value::mysql_value_to_value;

/// MySQL connection wrapper
///
/// Versioned servers keep the checked-out branch per SQL connection, so a
/// `MySqlConnection` pins one pooled connection for its whole lifetime and
/// runs every statement on it. The pool itself stays shareable with further
/// sessions up to its configured bound.
pub struct MySqlConnection {
    pool: Pool,
    session: Arc<Mutex<Option<Conn>>>,
    in_transaction: Arc<AtomicBool>,
    closed: AtomicBool,
    database: String,
}

impl MySqlConnection {
    /// Connect to a MySQL-protocol server
    #[tracing::instrument(skip(config), fields(host = %config.host, port = config.port, database = %config.database))]
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(tls = %config.tls.mode, "connecting to MySQL-protocol server");

        let ssl_opts = MysqlTlsConnector::build(&config.tls)
            .map_err(|e| VtError::Security(format!("{:#}", e)))?;

        let constraints = PoolConstraints::new(config.pool.min_idle, config.pool.max_size)
            .ok_or_else(|| {
                VtError::Configuration(format!(
                    "Failed to configure MySQL pool constraints (min={}, max={})",
                    config.pool.min_idle, config.pool.max_size
                ))
            })?;

        // Resetting would wipe the checked-out branch between statements.
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_reset_connection(false);

        let opts_builder = OptsBuilder::from_opts(Opts::default())
            .ip_or_hostname(config.host.as_str())
            .tcp_port(config.port)
            .user(Some(config.user.as_str()))
            .pass(config.password.as_deref())
            .db_name(Some(config.database.as_str()))
            .ssl_opts(ssl_opts)
            .pool_opts(pool_opts);

        let pool = Pool::new(Opts::from(opts_builder));
        let conn = match pool.get_conn().await {
            Ok(conn) => conn,
            Err(e) => {
                let _ = pool.disconnect().await;
                return Err(VtError::Connection(format!(
                    "Failed to connect to {}:{}: {}",
                    config.host, config.port, e
                )));
            }
        };

        tracing::info!("MySQL connection established");
        Ok(Self {
            pool,
            session: Arc::new(Mutex::new(Some(conn))),
            in_transaction: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            database: config.database.clone(),
        })
    }

    /// Name of the database the session was opened against
    pub fn database(&self) -> &str {
        &self.database
    }
}

fn closed_error() -> VtError {
    VtError::Connection("connection is closed".to_string())
}

/// Run a statement that returns rows on `conn`
pub(crate) async fn run_query(conn: &mut Conn, sql: &str) -> Result<QueryResult> {
    let start_time = std::time::Instant::now();

    let mut result = conn
        .query_iter(sql)
        .await
        .map_err(|e| VtError::Query(format!("Failed to execute query: {}", e)))?;

    let mut columns = Vec::new();
    let mut column_names = Vec::new();
    let mut column_types = Vec::new();
    for (idx, col) in result.columns_ref().iter().enumerate() {
        let name = col.name_str().to_string();
        columns.push(ColumnMeta::new(
            name.clone(),
            format!("{:?}", col.column_type()),
            idx,
        ));
        column_names.push(name);
        column_types.push(col.column_type());
    }
    let affected_rows = result.affected_rows();

    let mysql_rows: Vec<MySqlRow> = result
        .collect()
        .await
        .map_err(|e| VtError::Query(format!("Failed to read result rows: {}", e)))?;
    // Procedure calls end with an extra status result set
    result
        .drop_result()
        .await
        .map_err(|e| VtError::Query(format!("Failed to drain result sets: {}", e)))?;

    let rows = mysql_rows
        .into_iter()
        .map(|mysql_row| {
            let values = (0..column_names.len())
                .map(|idx| {
                    let mysql_val: mysql_async::Value =
                        mysql_row.get(idx).unwrap_or(mysql_async::Value::NULL);
                    let col_type = column_types
                        .get(idx)
                        .copied()
                        .unwrap_or(ColumnType::MYSQL_TYPE_STRING);
                    mysql_value_to_value(mysql_val, col_type)
                })
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect::<Vec<_>>();

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms = execution_time_ms,
        "query executed successfully"
    );

    Ok(QueryResult {
        columns,
        rows,
        affected_rows,
        execution_time_ms,
    })
}

/// Run a statement that does not return rows on `conn`
pub(crate) async fn run_execute(conn: &mut Conn, sql: &str) -> Result<StatementResult> {
    conn.query_drop(sql)
        .await
        .map_err(|e| VtError::Query(format!("Failed to execute statement: {}", e)))?;
    let affected_rows = conn.affected_rows();
    tracing::debug!(affected_rows = affected_rows, "statement executed");
    Ok(StatementResult { affected_rows })
}

pub(crate) fn sql_preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let final_sql = bind_params(sql, params)?;
        let mut guard = self.session.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_error)?;
        run_execute(conn, &final_sql).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let final_sql = bind_params(sql, params)?;
        let mut guard = self.session.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_error)?;
        run_query(conn, &final_sql).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        if self.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(VtError::Query(
                "a transaction is already open on this connection; nested transactions are not supported"
                    .to_string(),
            ));
        }

        tracing::debug!("beginning MySQL transaction");
        let started = {
            let mut guard = self.session.lock().await;
            match guard.as_mut() {
                Some(conn) => conn.query_drop("START TRANSACTION").await.map_err(|e| {
                    VtError::Query(format!("Failed to begin transaction: {}", e))
                }),
                None => Err(closed_error()),
            }
        };
        if let Err(e) = started {
            self.in_transaction.store(false, Ordering::SeqCst);
            return Err(e);
        }

        tracing::debug!("MySQL transaction begun successfully");
        Ok(Box::new(MySqlTransaction::new(
            self.session.clone(),
            self.in_transaction.clone(),
        )))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("MySQL connection already closed");
            return Ok(());
        }

        tracing::info!("closing MySQL connection pool");
        let pinned = self.session.lock().await.take();
        if let Some(conn) = pinned {
            if let Err(e) = conn.disconnect().await {
                tracing::warn!(error = %e, "failed to disconnect session connection cleanly");
            }
        }

        self.pool.clone().disconnect().await.map_err(|e| {
            VtError::Connection(format!("Failed to close MySQL connection pool: {}", e))
        })?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
