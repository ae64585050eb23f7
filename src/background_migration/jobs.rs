//! Batch job classes shipped with the service.

use anyhow::{Context, bail};
use async_trait::async_trait;
use diesel::sql_types::BigInt;
use diesel_async::RunQueryDsl;

use crate::background_migration::{BatchRange, BatchedMigration, MigrationJob};
use crate::db::AsyncDbPool;

/// Copies one column into another over the batch range:
/// `job_arguments = ["source_column", "target_column"]`.
///
/// Re-running a range writes the same values again.
#[derive(Clone)]
pub struct CopyColumnJob {
    pool: AsyncDbPool,
}

impl CopyColumnJob {
    pub const JOB_CLASS_NAME: &'static str = "CopyColumnUsingBackgroundMigrationJob";

    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    fn copy_statement(migration: &BatchedMigration) -> anyhow::Result<String> {
        let args: Vec<String> = serde_json::from_value(migration.job_arguments.clone())
            .context("job_arguments must be an array of column names")?;
        let [source, target] = args.as_slice() else {
            bail!("job_arguments must be [source_column, target_column]");
        };

        Ok(format!(
            "UPDATE {table} SET {target} = {source} WHERE {column} BETWEEN $1 AND $2",
            table = quote_identifier(&migration.table_name)?,
            target = quote_identifier(target)?,
            source = quote_identifier(source)?,
            column = quote_identifier(&migration.column_name)?,
        ))
    }
}

#[async_trait]
impl MigrationJob for CopyColumnJob {
    fn job_class_name(&self) -> &'static str {
        Self::JOB_CLASS_NAME
    }

    async fn perform(&self, migration: &BatchedMigration, batch: BatchRange) -> anyhow::Result<()> {
        let statement = Self::copy_statement(migration)?;
        let mut conn = self.pool.get().await.context("checkout connection")?;

        let updated = diesel::sql_query(statement)
            .bind::<BigInt, _>(batch.start)
            .bind::<BigInt, _>(batch.end)
            .execute(&mut conn)
            .await?;

        tracing::debug!(migration_id = migration.id, updated, "Copied column batch");
        Ok(())
    }
}

/// Plain identifiers only; anything else is rejected rather than escaped.
fn quote_identifier(name: &str) -> anyhow::Result<String> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        bail!("invalid identifier '{}'", name);
    }
    Ok(format!("\"{}\"", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_migration::MigrationStatus;
    use chrono::NaiveDate;

    fn migration(args: serde_json::Value) -> BatchedMigration {
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        BatchedMigration {
            id: 1,
            job_class_name: CopyColumnJob::JOB_CLASS_NAME.to_string(),
            table_name: "issues".to_string(),
            column_name: "id".to_string(),
            job_arguments: args,
            status: MigrationStatus::Active,
            interval_seconds: 120,
            min_value: 1,
            max_value: 1000,
            batch_size: 100,
            next_min_value: 1,
            failed_attempts: 0,
            last_run_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_copy_statement() {
        let sql = CopyColumnJob::copy_statement(&migration(serde_json::json!([
            "project_id",
            "project_id_convert_to_bigint"
        ])))
        .unwrap();

        assert_eq!(
            sql,
            "UPDATE \"issues\" SET \"project_id_convert_to_bigint\" = \"project_id\" WHERE \"id\" BETWEEN $1 AND $2"
        );
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(CopyColumnJob::copy_statement(&migration(serde_json::json!(["only_one"]))).is_err());
        assert!(
            CopyColumnJob::copy_statement(&migration(serde_json::json!(["a", "b; DROP TABLE x"])))
                .is_err()
        );
        assert!(CopyColumnJob::copy_statement(&migration(serde_json::json!({"a": 1}))).is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("events").unwrap(), "\"events\"");
        assert!(quote_identifier("1abc").is_err());
        assert!(quote_identifier("").is_err());
        assert!(quote_identifier("a\"b").is_err());
    }
}
