//! Submission mapper: binds one survey to the stored procedure and runs it.

use std::sync::Arc;

use schoolwatch_database::DbConnection;
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use thiserror::Error;
use tracing::info;

use crate::submission::{SurveySubmission, PARAMETERS};

/// Qualified name of the stored procedure that records one survey.
pub const INDICATORS_PROCEDURE: &str = "mne.insert_school_indicators";

/// Submission mapper errors
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Invalid value for {field}: {reason}")]
    Coercion { field: String, reason: String },
}

/// Maps typed submissions onto the stored procedure through the shared pool.
pub struct SubmissionService {
    db: Arc<DbConnection>,
}

impl SubmissionService {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    /// Render the procedure call for one submission.
    ///
    /// Placeholders are generated from the parameter table; user data only
    /// travels as bound values, never in the SQL text.
    pub fn call_statement(submission: &SurveySubmission) -> Statement {
        let placeholders = (1..=PARAMETERS.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let values = submission.bind_values();
        debug_assert_eq!(values.len(), PARAMETERS.len());
        Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            format!("CALL {INDICATORS_PROCEDURE}({placeholders})"),
            values,
        )
    }

    /// Persist one submission with a single stored-procedure invocation.
    ///
    /// Nothing is retried and no transaction is opened here; the procedure's
    /// own transactional behavior governs atomicity.
    pub async fn submit(&self, submission: &SurveySubmission) -> Result<(), SubmissionError> {
        self.db.execute(Self::call_statement(submission)).await?;
        info!(
            school_code = submission.school_code.as_deref().unwrap_or("<unknown>"),
            "survey submission recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbErr, MockDatabase, MockExecResult, Transaction};
    use serde_json::json;

    fn submission_for(code: &str) -> SurveySubmission {
        SurveySubmission::from_document(json!({
            "SCHOOL_CODE": code,
            "TOTAL_STUDENTS": 420,
            "S_CAMERA": "Y"
        }))
        .unwrap()
    }

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    fn expected_transaction(submission: &SurveySubmission) -> Transaction {
        let statement = SubmissionService::call_statement(submission);
        Transaction::from_sql_and_values(
            DatabaseBackend::Postgres,
            statement.sql.as_str(),
            statement.values.expect("parameterized statement").0,
        )
    }

    #[test]
    fn call_statement_covers_every_parameter() {
        let statement = SubmissionService::call_statement(&SurveySubmission::default());
        assert!(statement
            .sql
            .starts_with("CALL mne.insert_school_indicators($1, "));
        assert!(statement.sql.ends_with(&format!("${})", PARAMETERS.len())));
        assert_eq!(statement.sql.matches('$').count(), PARAMETERS.len());

        let values = statement.values.expect("parameterized statement").0;
        assert_eq!(values.len(), PARAMETERS.len());
    }

    #[tokio::test]
    async fn submit_executes_exactly_one_call() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec_ok()])
                .into_connection(),
        );
        let service = SubmissionService::new(db.clone());

        let submission = submission_for("SW-0001");
        service.submit(&submission).await.unwrap();
        drop(service);

        let log = Arc::try_unwrap(db)
            .expect("service dropped, no other handles")
            .into_transaction_log();
        assert_eq!(log, vec![expected_transaction(&submission)]);
    }

    #[tokio::test]
    async fn submit_surfaces_driver_errors_without_retrying() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_errors([DbErr::Custom("duplicate key value".to_owned())])
                .into_connection(),
        );
        let service = SubmissionService::new(db.clone());

        let err = service
            .submit(&submission_for("SW-0001"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Database(_)));
        drop(service);

        // One failed attempt, nothing retried
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_submissions_stay_request_local() {
        let codes = ["SW-0001", "SW-0002", "SW-0003", "SW-0004"];
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results(codes.iter().map(|_| exec_ok()))
                .into_connection(),
        );
        let service = Arc::new(SubmissionService::new(db.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for code in codes {
            let service = service.clone();
            tasks.spawn(async move { service.submit(&submission_for(code)).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        drop(service);

        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert_eq!(log.len(), codes.len());
        for code in codes {
            let expected = expected_transaction(&submission_for(code));
            assert_eq!(
                log.iter().filter(|entry| **entry == expected).count(),
                1,
                "expected exactly one invocation for {code}"
            );
        }
    }
}
