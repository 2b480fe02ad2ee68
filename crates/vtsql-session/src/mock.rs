//! In-memory connection for exercising the session without a server

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use vtsql_core::{
    Connection, QueryResult, Result, StatementResult, Transaction, Value, VtError,
    sql::bind_params,
};

#[derive(Default)]
struct MockState {
    /// SQL-pattern-based responses; the last queued result for a pattern is
    /// sticky, earlier ones are consumed in order
    responses: Vec<(String, VecDeque<QueryResult>)>,
    /// Statements containing the pattern fail with the message
    failures: Vec<(String, String)>,
    /// Every statement with parameters bound, plus transaction control
    log: Vec<String>,
    affected_rows: u64,
    in_transaction: bool,
    closed: bool,
}

/// Mock connection recording the SQL a session sends
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().affected_rows = 1;
        mock
    }

    /// Answer statements containing `sql_contains` with `result`
    ///
    /// Registering the same pattern again queues another answer.
    pub fn respond(self, sql_contains: impl Into<String>, result: QueryResult) -> Self {
        let pattern = sql_contains.into();
        {
            let mut state = self.state.lock();
            match state.responses.iter_mut().find(|(p, _)| *p == pattern) {
                Some((_, queue)) => queue.push_back(result),
                None => state.responses.push((pattern, VecDeque::from([result]))),
            }
        }
        self
    }

    /// Answer with a single-column, single-row result
    pub fn respond_scalar(
        self,
        sql_contains: impl Into<String>,
        column: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.respond(
            sql_contains,
            QueryResult::from_rows([column], vec![vec![value.into()]]),
        )
    }

    pub fn fail_on(self, sql_contains: impl Into<String>, message: impl Into<String>) -> Self {
        self.state
            .lock()
            .failures
            .push((sql_contains.into(), message.into()));
        self
    }

    pub fn with_affected_rows(self, affected_rows: u64) -> Self {
        self.state.lock().affected_rows = affected_rows;
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Number of logged statements containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|sql| sql.contains(pattern))
            .count()
    }

    fn record(&self, sql: &str, params: &[Value]) -> Result<String> {
        let bound = bind_params(sql, params)?;
        let mut state = self.state.lock();
        if state.closed {
            return Err(VtError::Connection("connection is closed".into()));
        }
        state.log.push(bound.clone());
        if let Some((_, message)) = state.failures.iter().find(|(p, _)| bound.contains(p.as_str())) {
            return Err(VtError::Query(message.clone()));
        }
        Ok(bound)
    }

    fn answer(&self, bound: &str) -> QueryResult {
        let mut state = self.state.lock();
        for (pattern, queue) in state.responses.iter_mut() {
            if bound.contains(pattern.as_str()) {
                if queue.len() > 1 {
                    if let Some(result) = queue.pop_front() {
                        return result;
                    }
                }
                return queue.front().cloned().unwrap_or_default();
            }
        }
        QueryResult::empty()
    }

    fn control(&self, statement: &str) {
        self.state.lock().log.push(statement.to_string());
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.record(sql, params)?;
        Ok(StatementResult {
            affected_rows: self.state.lock().affected_rows,
        })
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let bound = self.record(sql, params)?;
        Ok(self.answer(&bound))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        {
            let mut state = self.state.lock();
            if state.in_transaction {
                return Err(VtError::Query("nested transactions are not supported".into()));
            }
            state.in_transaction = true;
        }
        self.control("START TRANSACTION");
        Ok(Box::new(MockTransaction { conn: self.clone() }))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.log.push("CLOSE".to_string());
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

pub struct MockTransaction {
    conn: MockConnection,
}

impl MockTransaction {
    fn finish(&self, statement: &str) {
        self.conn.control(statement);
        self.conn.state.lock().in_transaction = false;
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.conn.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.conn.execute(sql, params).await
    }
}
