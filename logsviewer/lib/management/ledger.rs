use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::{models::ImportedMustGather, LogsViewerResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Checks whether an archive with this file name was already imported.
pub async fn is_already_imported(pool: &Pool<Sqlite>, name: &str) -> LogsViewerResult<bool> {
    let exists: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM imported_must_gathers WHERE name = ?)
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(exists != 0)
}

/// Records an imported archive in the ledger.
pub async fn record_import(
    pool: &Pool<Sqlite>,
    name: &str,
    import_time: DateTime<Utc>,
    gather_time: DateTime<Utc>,
) -> LogsViewerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO imported_must_gathers (name, import_time, gather_time)
        VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            import_time = excluded.import_time,
            gather_time = excluded.gather_time
        "#,
    )
    .bind(name)
    .bind(import_time)
    .bind(gather_time)
    .execute(pool)
    .await?;

    Ok(())
}

/// Lists every imported archive, most recently imported first.
pub async fn list_imports(pool: &Pool<Sqlite>) -> LogsViewerResult<Vec<ImportedMustGather>> {
    let rows = sqlx::query(
        r#"
        SELECT name, import_time, gather_time
        FROM imported_must_gathers
        ORDER BY import_time DESC, name
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> LogsViewerResult<ImportedMustGather> {
            Ok(ImportedMustGather {
                name: row.try_get("name")?,
                import_time: row.try_get("import_time")?,
                gather_time: row.try_get("gather_time")?,
            })
        })
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::management::{init_db, LOGSVIEWER_DB_MIGRATOR};

    #[test_log::test(tokio::test)]
    async fn test_import_ledger() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let pool = init_db(temp_dir.path().join("test.db"), &LOGSVIEWER_DB_MIGRATOR).await?;

        assert!(!is_already_imported(&pool, "must-gather.tar.gz").await?);

        let gather_time = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let import_time = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        record_import(&pool, "must-gather.tar.gz", import_time, gather_time).await?;

        assert!(is_already_imported(&pool, "must-gather.tar.gz").await?);
        assert!(!is_already_imported(&pool, "other.tar.gz").await?);

        let imports = list_imports(&pool).await?;
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].gather_time, gather_time);
        assert_eq!(imports[0].import_time, import_time);
        Ok(())
    }
}
