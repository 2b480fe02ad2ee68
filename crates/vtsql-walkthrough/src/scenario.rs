//! The walkthrough: branch, change, diff, commit and merge a small database
//!
//! Every step logs what it did. Checks that fail stop the walkthrough, since
//! later steps would otherwise run against an inconsistent database.

use anyhow::{Context, ensure};
use futures::FutureExt;
use vtsql_session::{
    CommitHash, CommitRef, DiffType, RowData, TransactionErrorPolicy, Value, VersionedSession,
    VtError, report, row_data,
};

pub const MAIN_BRANCH: &str = "main";
pub const DATA_BRANCH: &str = "modify_data";
pub const SCHEMA_BRANCH: &str = "modify_schema";

pub const SETUP_AUTHOR: &str = "Tim <tim@dolthub.com>";
pub const DATA_AUTHOR: &str = "Brian <brian@dolthub.com>";

/// Drop order respects the foreign keys between the tables
const TABLES: [&str; 3] = ["employees_teams", "employees", "teams"];

const CREATE_TABLES: [&str; 3] = [
    "CREATE TABLE employees (\
        id int NOT NULL, \
        last_name varchar(255), \
        first_name varchar(255), \
        PRIMARY KEY (id))",
    "CREATE TABLE teams (\
        id int NOT NULL, \
        team_name varchar(255), \
        PRIMARY KEY (id))",
    "CREATE TABLE employees_teams (\
        team_id int NOT NULL, \
        employee_id int NOT NULL, \
        PRIMARY KEY (team_id, employee_id), \
        FOREIGN KEY (team_id) REFERENCES teams(id), \
        FOREIGN KEY (employee_id) REFERENCES employees(id))",
];

const ADD_START_DATE: [&str; 1] = ["ALTER TABLE employees ADD COLUMN start_date date"];

const SUMMARY_QUERY: &str = "SELECT e.first_name, e.last_name, t.team_name, e.start_date \
    FROM employees e \
    JOIN employees_teams et ON e.id = et.employee_id \
    JOIN teams t ON t.id = et.team_id \
    ORDER BY t.team_name, e.id";

/// What the walkthrough ended with
#[derive(Debug, Clone)]
pub struct Outcome {
    pub head: CommitHash,
    pub employee_count: u64,
    pub summary_rows: usize,
}

pub fn seed_employees() -> Vec<RowData> {
    vec![
        row_data! { "id" => 0, "last_name" => "Sehn", "first_name" => "Tim" },
        row_data! { "id" => 1, "last_name" => "Hendriks", "first_name" => "Brian" },
        row_data! { "id" => 2, "last_name" => "Son", "first_name" => "Aaron" },
        row_data! { "id" => 3, "last_name" => "Fitzgerald", "first_name" => "Brian" },
    ]
}

pub fn seed_teams() -> Vec<RowData> {
    vec![
        row_data! { "id" => 0, "team_name" => "Engineering" },
        row_data! { "id" => 1, "team_name" => "Sales" },
    ]
}

pub fn seed_memberships() -> Vec<RowData> {
    [(0, 0), (1, 0), (2, 0), (0, 1), (3, 1)]
        .into_iter()
        .map(|(employee_id, team_id)| row_data! { "team_id" => team_id, "employee_id" => employee_id })
        .collect()
}

/// Start dates set on the schema branch, by employee id
pub const START_DATES: [(i64, &str); 4] = [
    (0, "2018-09-08"),
    (1, "2021-04-19"),
    (2, "2021-04-19"),
    (3, "2021-04-19"),
];

pub struct Walkthrough<'a> {
    session: &'a VersionedSession,
}

impl<'a> Walkthrough<'a> {
    pub fn new(session: &'a VersionedSession) -> Self {
        Self { session }
    }

    pub async fn run(&self) -> anyhow::Result<Outcome> {
        self.reset_database().await.context("resetting the database")?;
        self.create_and_seed().await.context("creating tables")?;
        self.show_reset_discards_changes()
            .await
            .context("demonstrating hard reset")?;
        self.modify_data_on_branch()
            .await
            .context("changing data on a branch")?;
        self.modify_schema_on_branch()
            .await
            .context("changing schema on a branch")?;
        self.merge_branches().await.context("merging branches")?;
        let summary_rows = self.print_summary().await.context("summary query")?;
        self.show_failed_transaction()
            .await
            .context("transaction rollback demo")?;

        let history = self.session.commit_history(Some(10)).await?;
        tracing::info!("commit log\n{}", report::log_table(&history));

        let head = self.session.head_hash(&CommitRef::Head).await?;
        Ok(Outcome {
            head,
            employee_count: self.employee_count().await?,
            summary_rows,
        })
    }

    /// Put `main` back to a state without walkthrough branches or tables
    async fn reset_database(&self) -> anyhow::Result<()> {
        let session = self.session;
        session.checkout_branch(MAIN_BRANCH, false).await?;
        session.reset_hard(None).await?;

        // A previous run may have stopped before merging these
        for branch in [DATA_BRANCH, SCHEMA_BRANCH] {
            if session.branch_exists(branch).await? {
                session.force_delete_branch(branch).await?;
            }
        }

        let existing = session.list_tables().await?;
        let to_drop: Vec<&str> = TABLES
            .into_iter()
            .filter(|t| existing.iter().any(|e| e == t))
            .collect();
        if !to_drop.is_empty() {
            session.drop_tables(&to_drop).await?;
            session
                .commit(SETUP_AUTHOR, "Removed walkthrough tables")
                .await?;
        }
        tracing::info!(dropped = to_drop.len(), "database reset");
        Ok(())
    }

    async fn create_and_seed(&self) -> anyhow::Result<()> {
        let session = self.session;
        session.apply_schema(&CREATE_TABLES).await?;
        session.upsert_rows("employees", &seed_employees(), &["id"]).await?;
        session.upsert_rows("teams", &seed_teams(), &["id"]).await?;
        session
            .upsert_rows("employees_teams", &seed_memberships(), &["team_id", "employee_id"])
            .await?;

        tracing::info!("working set\n{}", report::status_table(&session.status().await?));
        let hash = session
            .commit(SETUP_AUTHOR, "Created initial schema and data")
            .await?;

        ensure!(
            session.status().await?.is_empty(),
            "working set still dirty after commit"
        );
        let head = session.commit_history(Some(1)).await?;
        ensure!(
            head.first().map(|c| &c.hash) == Some(&hash),
            "commit log head does not match commit {}",
            hash
        );
        tracing::info!(hash = %hash.short(), "tables created and seeded");
        Ok(())
    }

    async fn show_reset_discards_changes(&self) -> anyhow::Result<()> {
        let session = self.session;
        session
            .execute(
                "INSERT INTO teams (id, team_name) VALUES (?, ?)",
                &[99.into(), "Scratch".into()],
            )
            .await?;
        let dirty = session.status().await?;
        tracing::info!("before reset\n{}", report::status_table(&dirty));
        ensure!(!dirty.is_empty(), "scratch insert did not show up in status");

        session.reset_hard(None).await?;
        ensure!(
            session.status().await?.is_empty(),
            "working set still dirty after hard reset"
        );
        tracing::info!("hard reset discarded the scratch row");
        Ok(())
    }

    async fn modify_data_on_branch(&self) -> anyhow::Result<()> {
        let session = self.session;
        session.checkout_branch(DATA_BRANCH, true).await?;
        let base = session.head_hash(&CommitRef::Head).await?;

        session
            .upsert_rows(
                "employees",
                &[row_data! { "id" => 4, "last_name" => "Bantle", "first_name" => "Taylor" }],
                &["id"],
            )
            .await?;
        session
            .upsert_rows(
                "employees_teams",
                &[row_data! { "team_id" => 0, "employee_id" => 4 }],
                &["team_id", "employee_id"],
            )
            .await?;

        let diff = session
            .diff("employees", &CommitRef::from(&base), &CommitRef::Working)
            .await?;
        tracing::info!("employees diff on {}\n{}", DATA_BRANCH, report::diff_table(&diff));
        ensure!(
            diff.len() == 1 && diff[0].diff_type == DiffType::Added,
            "expected exactly one added employee, got {} change(s)",
            diff.len()
        );
        ensure!(
            diff[0].value("id") == Some(&Value::Int64(4)),
            "added row is not employee 4"
        );

        let hash = session
            .commit(DATA_AUTHOR, "Modified data on branch")
            .await?;
        tracing::info!(branch = DATA_BRANCH, hash = %hash.short(), "data change committed");
        Ok(())
    }

    async fn modify_schema_on_branch(&self) -> anyhow::Result<()> {
        let session = self.session;
        session.checkout_branch(MAIN_BRANCH, false).await?;
        session.checkout_branch(SCHEMA_BRANCH, true).await?;

        session.apply_schema(&ADD_START_DATE).await?;
        for (id, date) in START_DATES {
            session
                .execute(
                    "UPDATE employees SET start_date = ? WHERE id = ?",
                    &[date.into(), id.into()],
                )
                .await?;
        }

        let hash = session
            .commit(SETUP_AUTHOR, "Added start_date column to employees")
            .await?;
        tracing::info!(branch = SCHEMA_BRANCH, hash = %hash.short(), "schema change committed");
        Ok(())
    }

    async fn merge_branches(&self) -> anyhow::Result<()> {
        let session = self.session;
        session.checkout_branch(MAIN_BRANCH, false).await?;
        tracing::info!("branches\n{}", report::branches_table(&session.list_branches().await?));

        let data_merge = session.merge(DATA_BRANCH).await?;
        tracing::info!("{}", report::merge_summary(DATA_BRANCH, MAIN_BRANCH, &data_merge));
        ensure!(data_merge.fast_forward, "merge of {} was not a fast-forward", DATA_BRANCH);
        ensure!(
            !data_merge.has_conflicts(),
            "merge of {} left {} conflict(s)",
            DATA_BRANCH,
            data_merge.conflict_count
        );
        let employees = self.employee_count().await?;
        ensure!(employees == 5, "expected 5 employees after merge, found {}", employees);

        let schema_merge = session.merge(SCHEMA_BRANCH).await?;
        tracing::info!("{}", report::merge_summary(SCHEMA_BRANCH, MAIN_BRANCH, &schema_merge));
        if schema_merge.has_conflicts() {
            let conflicts = session.conflicts().await?;
            for conflict in &conflicts {
                tracing::error!(table = %conflict.table_name, count = conflict.conflict_count, "unresolved conflict");
            }
            anyhow::bail!(
                "merge of {} left {} conflict(s)",
                SCHEMA_BRANCH,
                schema_merge.conflict_count
            );
        }

        session
            .execute(
                "UPDATE employees SET start_date = ? WHERE last_name = ?",
                &["2021-04-19".into(), "Bantle".into()],
            )
            .await?;
        session
            .commit(DATA_AUTHOR, "Set start date for Taylor Bantle")
            .await?;
        Ok(())
    }

    async fn print_summary(&self) -> anyhow::Result<usize> {
        let result = self.session.query(SUMMARY_QUERY, &[]).await?;
        tracing::info!("team summary\n{}", report::query_table(&result));

        let taylor = result.rows.iter().find(|row| {
            row.get_by_name("first_name").and_then(Value::as_str) == Some("Taylor")
        });
        ensure!(
            taylor.is_some_and(|row| !row.get_by_name("start_date").is_none_or(Value::is_null)),
            "summary is missing Taylor Bantle with a start date"
        );
        Ok(result.row_count())
    }

    /// A transaction that fails halfway leaves nothing behind
    async fn show_failed_transaction(&self) -> anyhow::Result<()> {
        let session = self.session;
        let outcome = session
            .with_transaction(|tx| {
                async move {
                    tx.execute(
                        "INSERT INTO teams (id, team_name) VALUES (?, ?)",
                        &[2.into(), "Marketing".into()],
                    )
                    .await?;
                    // Duplicate key, fails and takes the insert above with it
                    tx.execute(
                        "INSERT INTO teams (id, team_name) VALUES (?, ?)",
                        &[0.into(), "Engineering".into()],
                    )
                    .await?;
                    Ok::<_, VtError>(())
                }
                .boxed()
            })
            .await;

        match (outcome, session.options().on_transaction_error) {
            (Err(VtError::Transaction(cause)), TransactionErrorPolicy::Propagate) => {
                tracing::info!(cause = %cause, "transaction rolled back as expected");
            }
            (Ok(None), TransactionErrorPolicy::Suppress) => {
                tracing::info!("transaction rolled back, error suppressed by policy");
            }
            (Ok(Some(())), _) => anyhow::bail!("duplicate-key transaction unexpectedly committed"),
            (Err(e), _) => return Err(e.into()),
            (Ok(None), TransactionErrorPolicy::Propagate) => {
                anyhow::bail!("transaction failure was suppressed under the propagate policy")
            }
        }

        ensure!(
            session.status().await?.is_empty(),
            "rolled back transaction left changes in the working set"
        );
        Ok(())
    }

    async fn employee_count(&self) -> anyhow::Result<u64> {
        let result = self
            .session
            .query("SELECT COUNT(*) AS n FROM employees", &[])
            .await?;
        result
            .scalar()
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .context("employee count query returned nothing")
    }
}
