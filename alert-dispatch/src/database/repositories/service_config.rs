//! Service configuration repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ServiceConfigDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::{next_failure_ms, now_ms};
use crate::database::begin_immediate;
use crate::domain::FailureInfo;
use crate::{Error, Result};

/// Service configuration repository trait.
#[async_trait]
pub trait ServiceConfigRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<ServiceConfigDbModel>;
    async fn list_for_project(&self, project_id: &str) -> Result<Vec<ServiceConfigDbModel>>;
    async fn list_enabled_for_project(&self, project_id: &str) -> Result<Vec<ServiceConfigDbModel>>;
    async fn create(&self, config: &ServiceConfigDbModel) -> Result<()>;
    /// Persist user-editable fields. `kind` is never written.
    ///
    /// `config.version` must match the stored version; the stored row is
    /// returned with the bumped version.
    async fn update(&self, config: &ServiceConfigDbModel) -> Result<ServiceConfigDbModel>;
    async fn delete(&self, id: &str) -> Result<()>;

    // Failure state
    /// Clear all failure fields. Returns whether the row was failing before.
    async fn record_success(&self, id: &str) -> Result<bool>;
    /// Overwrite all failure fields. Returns whether the row was failing before.
    async fn record_failure(&self, id: &str, failure: &FailureInfo) -> Result<bool>;
}

/// SQLx implementation of ServiceConfigRepository.
pub struct SqlxServiceConfigRepository {
    pool: SqlitePool,
}

impl SqlxServiceConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn record_failure_once(&self, id: &str, failure: &FailureInfo) -> Result<bool> {
        let mut tx = begin_immediate(&self.pool).await?;

        let previous: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT last_failure_at FROM service_config WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((previous_at,)) = previous else {
            tx.rollback().await?;
            return Err(Error::not_found("ServiceConfig", id));
        };

        let at = next_failure_ms(previous_at, failure.at.timestamp_millis());
        let status_code = failure.status_code.map(i64::from);

        sqlx::query(
            r#"
            UPDATE service_config SET
                last_failure_at = ?,
                last_failure_kind = ?,
                last_failure_message = ?,
                last_failure_status_code = ?,
                last_failure_body = ?,
                last_failure_body_is_structured = ?
            WHERE id = ?
            "#,
        )
        .bind(at)
        .bind(failure.kind.to_string())
        .bind(&failure.message)
        .bind(status_code)
        .bind(&failure.body)
        .bind(failure.body_is_structured)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous_at.is_some())
    }
}

fn map_unique_violation(err: sqlx::Error, config: &ServiceConfigDbModel) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::conflict(format!(
            "Project {} already has a {} configuration",
            config.project_id, config.kind
        )),
        _ => Error::DatabaseSqlx(err),
    }
}

#[async_trait]
impl ServiceConfigRepository for SqlxServiceConfigRepository {
    async fn get(&self, id: &str) -> Result<ServiceConfigDbModel> {
        sqlx::query_as::<_, ServiceConfigDbModel>("SELECT * FROM service_config WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("ServiceConfig", id))
    }

    async fn list_for_project(&self, project_id: &str) -> Result<Vec<ServiceConfigDbModel>> {
        let configs = sqlx::query_as::<_, ServiceConfigDbModel>(
            "SELECT * FROM service_config WHERE project_id = ? ORDER BY created_at, id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(configs)
    }

    async fn list_enabled_for_project(&self, project_id: &str) -> Result<Vec<ServiceConfigDbModel>> {
        let configs = sqlx::query_as::<_, ServiceConfigDbModel>(
            "SELECT * FROM service_config WHERE project_id = ? AND enabled = TRUE ORDER BY created_at, id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(configs)
    }

    async fn create(&self, config: &ServiceConfigDbModel) -> Result<()> {
        retry_on_sqlite_busy("create_service_config", || async {
            sqlx::query(
                r#"
                INSERT INTO service_config (
                    id, project_id, kind, display_name, enabled, settings, only_new_issues,
                    last_failure_at, last_failure_kind, last_failure_message,
                    last_failure_status_code, last_failure_body, last_failure_body_is_structured,
                    version, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL, NULL, NULL, FALSE, ?, ?, ?)
                "#,
            )
            .bind(&config.id)
            .bind(&config.project_id)
            .bind(&config.kind)
            .bind(&config.display_name)
            .bind(config.enabled)
            .bind(&config.settings)
            .bind(config.only_new_issues)
            .bind(config.version)
            .bind(config.created_at)
            .bind(config.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, config))?;
            Ok(())
        })
        .await
    }

    async fn update(&self, config: &ServiceConfigDbModel) -> Result<ServiceConfigDbModel> {
        let updated_at = now_ms();
        let result = retry_on_sqlite_busy("update_service_config", || async {
            Ok(sqlx::query(
                r#"
                UPDATE service_config SET
                    display_name = ?,
                    enabled = ?,
                    settings = ?,
                    only_new_issues = ?,
                    version = version + 1,
                    updated_at = ?
                WHERE id = ? AND version = ?
                "#,
            )
            .bind(&config.display_name)
            .bind(config.enabled)
            .bind(&config.settings)
            .bind(config.only_new_issues)
            .bind(updated_at)
            .bind(&config.id)
            .bind(config.version)
            .execute(&self.pool)
            .await?)
        })
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a stale version.
            let current = self.get(&config.id).await?;
            return Err(Error::conflict(format!(
                "ServiceConfig {} was modified concurrently (expected version {}, found {})",
                config.id, config.version, current.version
            )));
        }

        self.get(&config.id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = retry_on_sqlite_busy("delete_service_config", || async {
            Ok(sqlx::query("DELETE FROM service_config WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("ServiceConfig", id));
        }
        Ok(())
    }

    async fn record_success(&self, id: &str) -> Result<bool> {
        // Single statement, so the clear is atomic without an explicit transaction.
        let result = retry_on_sqlite_busy("record_service_config_success", || async {
            Ok(sqlx::query(
                r#"
                UPDATE service_config SET
                    last_failure_at = NULL,
                    last_failure_kind = NULL,
                    last_failure_message = NULL,
                    last_failure_status_code = NULL,
                    last_failure_body = NULL,
                    last_failure_body_is_structured = FALSE
                WHERE id = ? AND last_failure_at IS NOT NULL
                "#,
            )
            .bind(id)
            .execute(&self.pool)
            .await?)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failure(&self, id: &str, failure: &FailureInfo) -> Result<bool> {
        retry_on_sqlite_busy("record_service_config_failure", || {
            self.record_failure_once(id, failure)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ErrorKind;
    use crate::database::{init_pool, run_migrations};
    use chrono::{Duration, Utc};

    async fn setup() -> SqlxServiceConfigRepository {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlxServiceConfigRepository::new(pool)
    }

    fn failure(at: chrono::DateTime<Utc>, status: Option<u16>) -> FailureInfo {
        FailureInfo {
            at,
            kind: ErrorKind::HttpError,
            message: "Status 500".to_string(),
            status_code: status,
            body: Some("oops".to_string()),
            body_is_structured: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_unique_per_kind() {
        let repo = setup().await;
        let config = ServiceConfigDbModel::new("p1", "webhook", "Webhook", "{}");
        repo.create(&config).await.unwrap();

        let duplicate = ServiceConfigDbModel::new("p1", "webhook", "Other hook", "{}");
        assert!(matches!(repo.create(&duplicate).await, Err(Error::Conflict(_))));

        let other_project = ServiceConfigDbModel::new("p2", "webhook", "Webhook", "{}");
        repo.create(&other_project).await.unwrap();

        assert_eq!(repo.list_for_project("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_enabled_filters_disabled() {
        let repo = setup().await;
        let enabled = ServiceConfigDbModel::new("p1", "webhook", "Webhook", "{}");
        let mut disabled = ServiceConfigDbModel::new("p1", "pagerduty", "PagerDuty", "{}");
        disabled.enabled = false;
        repo.create(&enabled).await.unwrap();
        repo.create(&disabled).await.unwrap();

        let listed = repo.list_enabled_for_project("p1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, enabled.id);
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_detects_stale() {
        let repo = setup().await;
        let mut config = ServiceConfigDbModel::new("p1", "webhook", "Webhook", "{}");
        repo.create(&config).await.unwrap();

        config.display_name = "Ops hook".to_string();
        let updated = repo.update(&config).await.unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.display_name, "Ops hook");

        // Still at version 0.
        assert!(matches!(repo.update(&config).await, Err(Error::Conflict(_))));

        let mut missing = config.clone();
        missing.id = "nope".to_string();
        assert!(matches!(repo.update(&missing).await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_kind_cannot_change_at_storage_level() {
        let repo = setup().await;
        let config = ServiceConfigDbModel::new("p1", "webhook", "Webhook", "{}");
        repo.create(&config).await.unwrap();

        let result = sqlx::query("UPDATE service_config SET kind = 'jira_cloud' WHERE id = ?")
            .bind(&config.id)
            .execute(&repo.pool)
            .await;
        assert!(result.is_err());
        assert_eq!(repo.get(&config.id).await.unwrap().kind, "webhook");
    }

    #[tokio::test]
    async fn test_failure_state_transitions() {
        let repo = setup().await;
        let config = ServiceConfigDbModel::new("p1", "webhook", "Webhook", "{}");
        repo.create(&config).await.unwrap();

        let now = Utc::now();
        assert!(!repo.record_failure(&config.id, &failure(now, Some(500))).await.unwrap());
        let row = repo.get(&config.id).await.unwrap();
        assert_eq!(row.last_failure_at, Some(now.timestamp_millis()));
        assert_eq!(row.last_failure_kind.as_deref(), Some("http_error"));
        assert_eq!(row.last_failure_status_code, Some(500));

        // An older clock reading must not move the timestamp backwards.
        let earlier = now - Duration::seconds(30);
        let mut network = failure(earlier, None);
        network.kind = ErrorKind::NetworkError;
        network.body = None;
        assert!(repo.record_failure(&config.id, &network).await.unwrap());
        let row = repo.get(&config.id).await.unwrap();
        assert_eq!(row.last_failure_at, Some(now.timestamp_millis()));
        assert_eq!(row.last_failure_kind.as_deref(), Some("network_error"));
        assert_eq!(row.last_failure_status_code, None);
        assert_eq!(row.last_failure_body, None);

        assert!(repo.record_success(&config.id).await.unwrap());
        let row = repo.get(&config.id).await.unwrap();
        assert!(!row.is_failing());
        assert!(row.last_failure_kind.is_none());
        assert!(row.last_failure_message.is_none());
        assert!(!row.last_failure_body_is_structured);

        assert!(!repo.record_success(&config.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_failure_missing_row() {
        let repo = setup().await;
        let result = repo.record_failure("missing", &failure(Utc::now(), None)).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
