use std::time::Duration;

use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row};

use crate::error::ApiError;

// Validation is a security boundary: statements must be read-only, single,
// and free of injection patterns before they touch even the disposable
// dataset.

const ALLOWED_PREFIXES: [&str; 3] = ["SELECT", "WITH", "PRAGMA"];

const DISALLOWED_KEYWORDS: [&str; 15] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "CREATE", "ALTER", "TRUNCATE", "EXEC", "EXECUTE",
    "CALL", "ATTACH", "DETACH", "VACUUM", "REINDEX", "ANALYZE",
];

#[derive(Serialize, Debug, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

pub fn validate_query(query: &str) -> Result<(), ApiError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("Query must not be empty".to_string()));
    }

    let upper = trimmed.to_uppercase();

    if !ALLOWED_PREFIXES.iter().any(|p| upper.starts_with(p)) {
        return Err(ApiError::Validation(
            "Only SELECT, WITH, and PRAGMA statements are allowed".to_string(),
        ));
    }

    // Substring match, deliberately conservative: identifiers that merely
    // embed a keyword (e.g. `updated_time`) are rejected along with it
    for keyword in DISALLOWED_KEYWORDS {
        if upper.contains(keyword) {
            return Err(ApiError::Validation(format!(
                "Disallowed SQL keyword: {keyword}"
            )));
        }
    }

    if upper.contains("--") || upper.contains("/*") {
        return Err(ApiError::Validation(
            "SQL comments are not allowed".to_string(),
        ));
    }

    let collapsed: String = upper.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.contains("UNION SELECT") {
        return Err(ApiError::Validation(
            "UNION SELECT is not allowed".to_string(),
        ));
    }

    let squeezed: String = upper.chars().filter(|c| !c.is_whitespace()).collect();
    for tautology in ["OR1=1", "OR'1'='1'", "OR\"1\"=\"1\"", "OR1=1--"] {
        if squeezed.contains(tautology) {
            return Err(ApiError::Validation(
                "Tautological predicates are not allowed".to_string(),
            ));
        }
    }

    for clause in ["INTO OUTFILE", "INTO DUMPFILE"] {
        if collapsed.contains(clause) {
            return Err(ApiError::Validation(
                "File output clauses are not allowed".to_string(),
            ));
        }
    }

    Ok(())
}

/// Opens a throwaway in-memory dataset. The primary store is never visible
/// from here.
async fn open_scratch_db() -> sqlx::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE sample_table (
            id INTEGER PRIMARY KEY,
            name TEXT,
            value INTEGER,
            created_date DATE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO sample_table (name, value, created_date) VALUES
            ('Alice', 100, '2023-01-01'),
            ('Bob', 200, '2023-01-02'),
            ('Charlie', 150, '2023-01-03')
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

fn decode_row(row: &SqliteRow) -> Vec<serde_json::Value> {
    (0..row.columns().len())
        .map(|i| {
            if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                return v.map_or(serde_json::Value::Null, |n| n.into());
            }
            if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
                return v.map_or(serde_json::Value::Null, |n| n.into());
            }
            if let Ok(v) = row.try_get::<Option<String>, _>(i) {
                return v.map_or(serde_json::Value::Null, |s| s.into());
            }
            serde_json::Value::Null
        })
        .collect()
}

/// Validates and runs one read-only query against the disposable dataset
/// under a wall-clock deadline. A blown deadline is a reported error, not a
/// server fault.
pub async fn execute(query: &str, timeout: Duration) -> Result<QueryOutput, ApiError> {
    validate_query(query)?;

    let pool = open_scratch_db()
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    let fetched = tokio::time::timeout(timeout, sqlx::query(query.trim()).fetch_all(&pool)).await;
    pool.close().await;

    let rows = match fetched {
        Err(_) => {
            return Err(ApiError::Validation(format!(
                "Query timed out after {} seconds",
                timeout.as_secs()
            )));
        }
        Ok(Err(e)) => {
            return Err(ApiError::Validation(format!("Query execution failed: {e}")));
        }
        Ok(Ok(rows)) => rows,
    };

    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let data: Vec<Vec<serde_json::Value>> = rows.iter().map(decode_row).collect();
    let row_count = data.len();

    Ok(QueryOutput {
        columns,
        rows: data,
        row_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_read_only_statements() {
        assert!(validate_query("SELECT * FROM sample_table").is_ok());
        assert!(validate_query("  with t as (select 1) select * from t").is_ok());
        assert!(validate_query("PRAGMA table_info(sample_table)").is_ok());
    }

    #[test]
    fn test_rejects_non_select_prefix() {
        assert!(validate_query("DROP TABLE sample_table").is_err());
        assert!(validate_query("UPDATE sample_table SET value = 0").is_err());
        assert!(validate_query("").is_err());
    }

    #[test]
    fn test_rejects_disallowed_keywords_anywhere() {
        assert!(validate_query("SELECT 1; DELETE FROM sample_table").is_err());
        assert!(validate_query("SELECT * FROM t WHERE x = (SELECT 1); DROP TABLE t").is_err());
        assert!(validate_query("WITH t AS (SELECT 1) INSERT INTO x SELECT * FROM t").is_err());
        assert!(validate_query("SELECT 1 ATTACH DATABASE 'x' AS y").is_err());
    }

    #[test]
    fn test_keyword_check_is_substring_based() {
        // Even identifiers that embed a keyword are rejected
        assert!(validate_query("SELECT updated_time FROM sample_table").is_err());
        assert!(validate_query("SELECT created_date FROM sample_table").is_err());
        assert!(validate_query("SELECT * FROM sample_table ORDER BY created_date").is_err());
    }

    #[test]
    fn test_rejects_injection_patterns() {
        assert!(validate_query("SELECT * FROM t WHERE 1=1 OR 1=1").is_err());
        assert!(validate_query("SELECT * FROM t WHERE name = '' OR '1'='1'").is_err());
        assert!(validate_query("SELECT * FROM t -- comment").is_err());
        assert!(validate_query("SELECT /* hidden */ 1").is_err());
        assert!(validate_query("SELECT 1 UNION SELECT password FROM users").is_err());
        assert!(validate_query("SELECT * FROM t INTO OUTFILE '/tmp/x'").is_err());
    }

    #[tokio::test]
    async fn test_execute_returns_columns_and_rows() {
        let out = execute(
            "SELECT name, value FROM sample_table ORDER BY value DESC",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(out.columns, vec!["name", "value"]);
        assert_eq!(out.row_count, 3);
        assert_eq!(out.rows[0], vec![serde_json::json!("Bob"), serde_json::json!(200)]);
    }

    #[tokio::test]
    async fn test_execute_rejects_mutation_before_touching_db() {
        let err = execute("DELETE FROM sample_table", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_execute_reports_sql_errors_as_validation() {
        let err = execute("SELECT * FROM no_such_table", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
