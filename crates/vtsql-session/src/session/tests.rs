//! Tests for the versioned session against a mock connection

use super::*;
use crate::mock::MockConnection;
use futures::FutureExt;
use pretty_assertions::assert_eq;
use rstest::rstest;
use vtsql_core::{DiffType, row_data};

const BRANCH_LOOKUP: &str = "FROM dolt_branches WHERE name";

fn session(mock: &MockConnection) -> VersionedSession {
    VersionedSession::with_connection(Arc::new(mock.clone()), SessionOptions::default())
}

fn session_with_policy(mock: &MockConnection, policy: TransactionErrorPolicy) -> VersionedSession {
    VersionedSession::with_connection(
        Arc::new(mock.clone()),
        SessionOptions::default().with_transaction_error_policy(policy),
    )
}

fn branch_count(n: i64) -> QueryResult {
    QueryResult::from_rows(["branch_count"], vec![vec![Value::Int64(n)]])
}

fn status_rows(entries: &[(&str, i64, &str)]) -> QueryResult {
    QueryResult::from_rows(
        ["table_name", "staged", "status"],
        entries
            .iter()
            .map(|(table, staged, status)| {
                vec![(*table).into(), Value::Int64(*staged), (*status).into()]
            })
            .collect(),
    )
}

fn log_rows(hashes: &[&str]) -> QueryResult {
    QueryResult::from_rows(
        ["commit_hash", "committer", "email", "date", "message"],
        hashes
            .iter()
            .enumerate()
            .map(|(idx, hash)| {
                vec![
                    (*hash).into(),
                    "Brian".into(),
                    "brian@dolthub.com".into(),
                    format!("2024-03-01 12:{:02}:00", 59 - idx).into(),
                    format!("commit {}", idx).into(),
                ]
            })
            .collect(),
    )
}

#[tokio::test]
async fn test_checkout_existing_branch() {
    let mock = MockConnection::new().respond(BRANCH_LOOKUP, branch_count(1));
    session(&mock).checkout_branch("main", false).await.unwrap();

    assert_eq!(
        mock.log(),
        vec![
            "SELECT COUNT(*) AS branch_count FROM dolt_branches WHERE name = 'main'".to_string(),
            "CALL DOLT_CHECKOUT('main')".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_checkout_create_if_missing_twice_creates_once() {
    let mock = MockConnection::new()
        .respond(BRANCH_LOOKUP, branch_count(0))
        .respond(BRANCH_LOOKUP, branch_count(1));
    let session = session(&mock);

    session.checkout_branch("modify_data", true).await.unwrap();
    session.checkout_branch("modify_data", true).await.unwrap();

    assert_eq!(mock.count("CALL DOLT_CHECKOUT('-b', 'modify_data')"), 1);
    assert_eq!(mock.count("CALL DOLT_CHECKOUT('modify_data')"), 1);
    assert_eq!(mock.count("DOLT_BRANCH"), 0);
}

#[tokio::test]
async fn test_checkout_missing_branch_without_create() {
    let mock = MockConnection::new().respond(BRANCH_LOOKUP, branch_count(0));
    let err = session(&mock)
        .checkout_branch("nope", false)
        .await
        .unwrap_err();

    assert!(matches!(err, VtError::Branch(BranchError::NotFound(ref b)) if b == "nope"));
    assert_eq!(mock.count("DOLT_CHECKOUT"), 0);
}

#[tokio::test]
async fn test_checkout_engine_failure_is_branch_error() {
    let mock = MockConnection::new()
        .respond(BRANCH_LOOKUP, branch_count(1))
        .fail_on("DOLT_CHECKOUT", "local changes would be stomped by checkout");
    let err = session(&mock)
        .checkout_branch("main", false)
        .await
        .unwrap_err();

    match err {
        VtError::Branch(BranchError::Engine { branch, message }) => {
            assert_eq!(branch, "main");
            assert!(message.contains("stomped"));
        }
        other => panic!("expected engine branch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_branch_name_rejected() {
    let mock = MockConnection::new();
    let err = session(&mock).checkout_branch("  ", true).await.unwrap_err();
    assert!(matches!(err, VtError::InvalidInput(_)));
    assert!(mock.log().is_empty());
}

#[tokio::test]
async fn test_delete_branch_checks() {
    let mock = MockConnection::new()
        .respond(BRANCH_LOOKUP, branch_count(0))
        .respond(BRANCH_LOOKUP, branch_count(1))
        .respond_scalar("active_branch()", "branch", "main");
    let session = session(&mock);

    let missing = session.delete_branch("gone").await.unwrap_err();
    assert!(matches!(missing, VtError::Branch(BranchError::NotFound(_))));

    let active = session.delete_branch("main").await.unwrap_err();
    assert!(matches!(active, VtError::Branch(BranchError::CheckedOut(ref b)) if b == "main"));
    assert_eq!(mock.count("DOLT_BRANCH('-d'"), 0);

    session.delete_branch("modify_data").await.unwrap();
    assert_eq!(mock.count("CALL DOLT_BRANCH('-d', 'modify_data')"), 1);
}

#[tokio::test]
async fn test_force_delete_unmerged_branch() {
    let mock = MockConnection::new()
        .respond(BRANCH_LOOKUP, branch_count(1))
        .respond_scalar("active_branch()", "branch", "main")
        .fail_on("DOLT_BRANCH('-d'", "branch 'modify_data' is not fully merged");
    let session = session(&mock);

    let refused = session.delete_branch("modify_data").await.unwrap_err();
    assert!(matches!(refused, VtError::Branch(BranchError::Engine { .. })));

    session.force_delete_branch("modify_data").await.unwrap();
    assert_eq!(mock.count("CALL DOLT_BRANCH('-D', 'modify_data')"), 1);

    // The active branch stays protected
    let active = session.force_delete_branch("main").await.unwrap_err();
    assert!(matches!(active, VtError::Branch(BranchError::CheckedOut(_))));
    assert_eq!(mock.count("DOLT_BRANCH('-D', 'main')"), 0);
}

#[tokio::test]
async fn test_create_branch_already_exists() {
    let mock = MockConnection::new().respond(BRANCH_LOOKUP, branch_count(1));
    let err = session(&mock).create_branch("main").await.unwrap_err();
    assert!(matches!(err, VtError::Branch(BranchError::AlreadyExists(_))));
    assert!(err.is_branch_error());
}

#[tokio::test]
async fn test_list_branches() {
    let mock = MockConnection::new().respond(
        "FROM dolt_branches ORDER BY name",
        QueryResult::from_rows(
            [
                "name",
                "hash",
                "latest_committer",
                "latest_committer_email",
                "latest_commit_date",
                "latest_commit_message",
            ],
            vec![vec![
                "main".into(),
                "abc".into(),
                "Tim".into(),
                "tim@dolthub.com".into(),
                "2024-03-01 12:00:00".into(),
                "Created tables".into(),
            ]],
        ),
    );
    let branches = session(&mock).list_branches().await.unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].name, "main");
    assert_eq!(branches[0].head.as_str(), "abc");
    assert!(branches[0].latest_commit_date.is_some());
}

#[rstest]
#[case(None, "CALL DOLT_RESET('--hard')")]
#[case(Some(CommitRef::from("main")), "CALL DOLT_RESET('--hard', 'main')")]
#[tokio::test]
async fn test_reset_hard(#[case] target: Option<CommitRef>, #[case] expected: &str) {
    let mock = MockConnection::new();
    session(&mock).reset_hard(target).await.unwrap();
    assert_eq!(mock.log(), vec![expected.to_string()]);
}

#[tokio::test]
async fn test_reset_then_status_is_clean() {
    let mock = MockConnection::new()
        .respond("FROM dolt_status", status_rows(&[("employees", 0, "modified")]))
        .respond("FROM dolt_status", status_rows(&[]));
    let session = session(&mock);

    assert_eq!(session.status().await.unwrap().len(), 1);
    session.reset_hard(None).await.unwrap();
    assert!(session.status().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_schema_in_one_transaction() {
    let mock = MockConnection::new();
    session(&mock)
        .apply_schema(&[
            "CREATE TABLE teams (id int, team_name varchar(255), PRIMARY KEY(id))",
            "CREATE TABLE employees_teams (team_id int, employee_id int, PRIMARY KEY(team_id, employee_id))",
        ])
        .await
        .unwrap();

    let log = mock.log();
    assert_eq!(log.first().map(String::as_str), Some("START TRANSACTION"));
    assert_eq!(log.last().map(String::as_str), Some("COMMIT"));
    assert_eq!(log.len(), 4);
}

#[tokio::test]
async fn test_apply_schema_failure_rolls_back() {
    let mock = MockConnection::new().fail_on("CREATE TABLE teams", "table already exists");
    let err = session(&mock)
        .apply_schema(&[
            "CREATE TABLE employees (id int, PRIMARY KEY(id))",
            "CREATE TABLE teams (id int, PRIMARY KEY(id))",
            "CREATE TABLE employees_teams (team_id int, PRIMARY KEY(team_id))",
        ])
        .await
        .unwrap_err();

    match err {
        VtError::Schema(message) => {
            assert!(message.contains("statement 2 of 3"), "{}", message);
            assert!(message.contains("table already exists"), "{}", message);
        }
        other => panic!("expected schema error, got {:?}", other),
    }
    assert_eq!(mock.count("ROLLBACK"), 1);
    assert_eq!(mock.count("COMMIT"), 0);
    assert_eq!(mock.count("employees_teams"), 0);
}

#[tokio::test]
async fn test_upsert_rows() {
    let mock = MockConnection::new().with_affected_rows(2);
    let rows = vec![
        row_data! { "id" => 0, "team_name" => "Engineering" },
        row_data! { "id" => 1, "team_name" => "Sales" },
    ];
    let affected = session(&mock)
        .upsert_rows("teams", &rows, &["id"])
        .await
        .unwrap();

    assert_eq!(affected, 2);
    assert_eq!(
        mock.log(),
        vec![
            "INSERT INTO `teams` (`id`, `team_name`) VALUES (0, 'Engineering'), (1, 'Sales') \
             ON DUPLICATE KEY UPDATE `team_name` = VALUES(`team_name`)"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_upsert_no_rows_is_noop() {
    let mock = MockConnection::new();
    assert_eq!(session(&mock).upsert_rows("teams", &[], &["id"]).await.unwrap(), 0);
    assert!(mock.log().is_empty());
}

#[tokio::test]
async fn test_commit_dirty_working_set() {
    let mock = MockConnection::new()
        .respond("FROM dolt_status", status_rows(&[("employees", 0, "modified")]))
        .respond_scalar("DOLT_COMMIT", "hash", "n9lg3bmcp1ipm1dpbbpvcnb4t7ad3vrf");
    let hash = session(&mock)
        .commit("Brian <brian@dolthub.com>", "Modified data on branch")
        .await
        .unwrap();

    assert_eq!(hash.as_str(), "n9lg3bmcp1ipm1dpbbpvcnb4t7ad3vrf");
    assert_eq!(
        mock.count(
            "CALL DOLT_COMMIT('-A', '-m', 'Modified data on branch', '--author', 'Brian <brian@dolthub.com>')"
        ),
        1
    );
}

#[tokio::test]
async fn test_commit_twice_without_writes_returns_same_hash() {
    let mock = MockConnection::new()
        .respond("FROM dolt_status", status_rows(&[("teams", 0, "new table")]))
        .respond("FROM dolt_status", status_rows(&[]))
        .respond_scalar("DOLT_COMMIT", "hash", "h1")
        .respond_scalar("HASHOF('HEAD')", "hash", "h1");
    let session = session(&mock);

    let first = session.commit("Tim <tim@dolthub.com>", "Created tables").await.unwrap();
    let second = session.commit("Tim <tim@dolthub.com>", "Created tables").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(mock.count("DOLT_COMMIT"), 1);
}

#[rstest]
#[case("Brian")]
#[case("<brian@dolthub.com>")]
#[case("Brian <brian>")]
#[case("Brian brian@dolthub.com>")]
#[tokio::test]
async fn test_commit_rejects_malformed_author(#[case] author: &str) {
    let mock = MockConnection::new();
    let err = session(&mock).commit(author, "msg").await.unwrap_err();
    assert!(matches!(err, VtError::InvalidInput(_)));
    assert!(mock.log().is_empty());
}

#[tokio::test]
async fn test_commit_log_respects_limit() {
    let mock = MockConnection::new().respond("FROM dolt_log", log_rows(&["c3", "c2"]));
    let history = session(&mock).commit_history(Some(2)).await.unwrap();

    let hashes: Vec<&str> = history.iter().map(|c| c.hash.as_str()).collect();
    assert_eq!(hashes, vec!["c3", "c2"]);
    assert_eq!(mock.count("LIMIT 2 OFFSET 0"), 1);
    assert_eq!(mock.count("FROM dolt_log"), 1);
}

#[tokio::test]
async fn test_commit_log_stops_on_short_page() {
    let mock = MockConnection::new().respond("FROM dolt_log", log_rows(&["c3", "c2", "c1"]));
    let history = session(&mock).commit_history(None).await.unwrap();

    assert_eq!(history.len(), 3);
    assert!(history[0].timestamp > history[2].timestamp);
    assert_eq!(mock.count(&format!("LIMIT {} OFFSET 0", LOG_PAGE_SIZE)), 1);
    assert_eq!(mock.count("FROM dolt_log"), 1);
}

#[tokio::test]
async fn test_commit_log_is_lazy() {
    let mock = MockConnection::new().respond("FROM dolt_log", log_rows(&["c1"]));
    let session = session(&mock);
    let log = session.commit_log(None);
    assert!(mock.log().is_empty());
    drop(log);
}

#[tokio::test]
async fn test_diff_against_working_after_insert() {
    let mock = MockConnection::new().respond(
        "DOLT_DIFF",
        QueryResult::from_rows(
            [
                "to_id",
                "to_last_name",
                "to_first_name",
                "to_commit",
                "from_id",
                "from_last_name",
                "from_first_name",
                "from_commit",
                "diff_type",
            ],
            vec![vec![
                Value::Int64(4),
                "Bantle".into(),
                "Taylor".into(),
                "WORKING".into(),
                Value::Null,
                Value::Null,
                Value::Null,
                "abc".into(),
                "added".into(),
            ]],
        ),
    );
    let entries = session(&mock)
        .diff("employees", &CommitRef::Named("abc".into()), &CommitRef::Working)
        .await
        .unwrap();

    assert_eq!(mock.log(), vec!["SELECT * FROM DOLT_DIFF('abc', 'WORKING', 'employees')".to_string()]);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].diff_type, DiffType::Added);
    assert_eq!(
        entries[0].row(),
        &row_data! { "id" => 4, "last_name" => "Bantle", "first_name" => "Taylor" }
    );
}

#[tokio::test]
async fn test_merge_fast_forward() {
    let mock = MockConnection::new()
        .respond(BRANCH_LOOKUP, branch_count(1))
        .respond(
            "DOLT_MERGE",
            QueryResult::from_rows(
                ["hash", "fast_forward", "conflicts", "message"],
                vec![vec!["m1".into(), Value::Int64(1), Value::Int64(0), "merge successful".into()]],
            ),
        );
    let merge = session(&mock).merge("modify_data").await.unwrap();

    assert_eq!(
        merge,
        MergeResult {
            commit_hash: CommitHash::new("m1"),
            fast_forward: true,
            conflict_count: 0,
        }
    );
    assert_eq!(mock.count("CALL DOLT_MERGE('modify_data')"), 1);
}

#[tokio::test]
async fn test_merge_without_hash_reads_head() {
    let mock = MockConnection::new()
        .respond(BRANCH_LOOKUP, branch_count(1))
        .respond(
            "DOLT_MERGE",
            QueryResult::from_rows(
                ["fast_forward", "conflicts"],
                vec![vec![Value::Int64(0), Value::Int64(3)]],
            ),
        )
        .respond_scalar("HASHOF('HEAD')", "hash", "head1");
    let merge = session(&mock).merge("modify_schema").await.unwrap();

    assert_eq!(merge.commit_hash.as_str(), "head1");
    assert!(!merge.fast_forward);
    assert!(merge.has_conflicts());
}

#[tokio::test]
async fn test_merge_unknown_branch() {
    let mock = MockConnection::new().respond(BRANCH_LOOKUP, branch_count(0));
    let err = session(&mock).merge("nope").await.unwrap_err();
    assert!(matches!(err, VtError::Branch(BranchError::NotFound(_))));
    assert_eq!(mock.count("DOLT_MERGE"), 0);
}

#[tokio::test]
async fn test_conflicts() {
    let mock = MockConnection::new().respond(
        "dolt_conflicts",
        QueryResult::from_rows(
            ["table", "num_conflicts"],
            vec![vec!["employees".into(), Value::Int64(2)]],
        ),
    );
    let conflicts = session(&mock).conflicts().await.unwrap();
    assert_eq!(conflicts[0].table_name, "employees");
    assert_eq!(conflicts[0].conflict_count, 2);
}

#[tokio::test]
async fn test_list_and_drop_tables() {
    let mock = MockConnection::new().respond(
        "SHOW TABLES",
        QueryResult::from_rows(
            ["Tables_in_getting_started"],
            vec![vec!["employees".into()], vec!["teams".into()]],
        ),
    );
    let session = session(&mock);
    let tables = session.list_tables().await.unwrap();
    assert_eq!(tables, vec!["employees".to_string(), "teams".to_string()]);

    session.drop_tables(&tables).await.unwrap();
    assert_eq!(mock.count("DROP TABLE IF EXISTS `employees`"), 1);
    assert_eq!(mock.count("DROP TABLE IF EXISTS `teams`"), 1);
}

#[tokio::test]
async fn test_with_transaction_commits_on_success() {
    let mock = MockConnection::new();
    let value = session(&mock)
        .with_transaction(|tx| {
            async move {
                tx.execute("UPDATE employees SET first_name = ? WHERE id = ?", &["Timothy".into(), 0.into()])
                    .await?;
                Ok::<_, VtError>(7)
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(value, Some(7));
    assert_eq!(
        mock.log(),
        vec![
            "START TRANSACTION".to_string(),
            "UPDATE employees SET first_name = 'Timothy' WHERE id = 0".to_string(),
            "COMMIT".to_string(),
        ]
    );
}

#[rstest]
#[case(TransactionErrorPolicy::Propagate)]
#[case(TransactionErrorPolicy::Suppress)]
#[tokio::test]
async fn test_with_transaction_rolls_back_on_failure(#[case] policy: TransactionErrorPolicy) {
    let mock = MockConnection::new().fail_on("INSERT INTO teams", "duplicate primary key");
    let outcome = session_with_policy(&mock, policy)
        .with_transaction(|tx| {
            async move {
                tx.execute("INSERT INTO teams VALUES (0, 'Engineering')", &[])
                    .await?;
                Ok::<_, VtError>(())
            }
            .boxed()
        })
        .await;

    assert_eq!(mock.count("ROLLBACK"), 1);
    assert_eq!(mock.count("COMMIT"), 0);
    match policy {
        TransactionErrorPolicy::Propagate => match outcome {
            Err(VtError::Transaction(inner)) => {
                assert!(inner.to_string().contains("duplicate primary key"))
            }
            other => panic!("expected transaction error, got {:?}", other),
        },
        TransactionErrorPolicy::Suppress => assert!(matches!(outcome, Ok(None))),
    }
}

#[tokio::test]
async fn test_nested_transactions_rejected() {
    let mock = MockConnection::new();
    let session = session(&mock);
    let outer = session.connection().begin_transaction().await.unwrap();
    let nested = session
        .with_transaction(|_tx| async move { Ok(()) }.boxed())
        .await;
    assert!(nested.is_err());
    outer.rollback().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let mock = MockConnection::new();
    let session = session(&mock);
    session.close().await.unwrap();
    session.close().await.unwrap();
    assert_eq!(mock.count("CLOSE"), 1);
    assert!(session.connection().is_closed());
}
