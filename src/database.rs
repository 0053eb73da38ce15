use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::ApiError;

const DATABASE_NAME: &str = "codedrill.sqlite3";

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "codedrill").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(0) // Allow pool to shrink when idle
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot run inside a transaction
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",  // Write-Ahead Logging for better concurrency
        "PRAGMA synchronous = NORMAL;", // Balance between safety and performance
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS employees (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            email         TEXT,
            department    TEXT,
            position      TEXT,
            created_at    TEXT NOT NULL
        );",
        r"
        CREATE TABLE IF NOT EXISTS problems (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            title             TEXT    NOT NULL UNIQUE,
            description       TEXT    NOT NULL,
            examples          TEXT    NOT NULL DEFAULT '[]',
            constraints       TEXT    NOT NULL DEFAULT '[]',
            difficulty        TEXT    NOT NULL,
            category          TEXT    NOT NULL,
            tags              TEXT    NOT NULL DEFAULT '[]',
            test_cases        TEXT    NOT NULL DEFAULT '[]',
            solution_template TEXT    NOT NULL DEFAULT '{}',
            acceptance_rate   REAL,
            created_at        TEXT    NOT NULL
        );",
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       TEXT    NOT NULL,
            problem_id    INTEGER NOT NULL,
            language_id   INTEGER NOT NULL,
            source_code   TEXT    NOT NULL,
            status        TEXT    NOT NULL,
            runtime_ms    REAL,
            memory_kb     INTEGER,
            submitted_at  TEXT    NOT NULL,
            FOREIGN KEY (problem_id) REFERENCES problems (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS user_progress (
            user_id           TEXT PRIMARY KEY,
            problems_solved   INTEGER NOT NULL DEFAULT 0,
            easy_solved       INTEGER NOT NULL DEFAULT 0,
            medium_solved     INTEGER NOT NULL DEFAULT 0,
            hard_solved       INTEGER NOT NULL DEFAULT 0,
            total_submissions INTEGER NOT NULL DEFAULT 0,
            last_solved_at    TEXT
        );",
        r"
        CREATE TABLE IF NOT EXISTS interview_sessions (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id    TEXT NOT NULL UNIQUE,
            username      TEXT NOT NULL,
            employee_id   TEXT,
            start_time    TEXT NOT NULL,
            end_time      TEXT,
            status        TEXT NOT NULL DEFAULT 'active',
            overall_score REAL
        );",
        r"
        CREATE TABLE IF NOT EXISTS interview_questions (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id    TEXT NOT NULL,
            question_text TEXT NOT NULL,
            category      TEXT,
            difficulty    TEXT,
            asked_at      TEXT NOT NULL,
            response_text TEXT,
            score         REAL,
            feedback      TEXT,
            FOREIGN KEY (session_id) REFERENCES interview_sessions (session_id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS interview_activities (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id    TEXT NOT NULL,
            activity_type TEXT NOT NULL,
            activity_data TEXT NOT NULL DEFAULT '{}',
            timestamp     TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES interview_sessions (session_id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS session_reports (
            session_id      TEXT PRIMARY KEY,
            strengths       TEXT NOT NULL DEFAULT '',
            weaknesses      TEXT NOT NULL DEFAULT '',
            recommendations TEXT NOT NULL DEFAULT '',
            assessment      TEXT NOT NULL DEFAULT '',
            overall_score   REAL NOT NULL,
            generated_at    TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES interview_sessions (session_id)
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    seed_problems(&db_pool).await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

// ============ Problems ============

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

#[derive(Serialize, Debug)]
pub struct ProblemSummary {
    pub id: i64,
    pub title: String,
    pub difficulty: String,
    pub category: String,
    pub tags: Vec<String>,
    pub acceptance_rate: Option<f64>,
}

#[derive(Serialize, Debug)]
pub struct ProblemDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub examples: serde_json::Value,
    pub constraints: serde_json::Value,
    pub difficulty: String,
    pub category: String,
    pub tags: Vec<String>,
    pub test_cases: Vec<TestCase>,
    pub solution_template: serde_json::Value,
    pub acceptance_rate: Option<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl FromStr for Difficulty {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Easy" => Ok(Self::Easy),
            "Medium" => Ok(Self::Medium),
            "Hard" => Ok(Self::Hard),
            other => Err(ApiError::Validation(format!(
                "Unknown difficulty: {other}"
            ))),
        }
    }
}

fn parse_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub async fn list_problems(
    pool: &SqlitePool,
    difficulty: Option<&str>,
    category: Option<&str>,
) -> sqlx::Result<Vec<ProblemSummary>> {
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
        "SELECT id, title, difficulty, category, tags, acceptance_rate FROM problems WHERE 1=1",
    );
    if let Some(difficulty) = difficulty {
        qb.push(" AND difficulty = ").push_bind(difficulty);
    }
    if let Some(category) = category {
        qb.push(" AND category = ").push_bind(category);
    }
    qb.push(" ORDER BY id");

    #[derive(sqlx::FromRow)]
    struct Row {
        id: i64,
        title: String,
        difficulty: String,
        category: String,
        tags: String,
        acceptance_rate: Option<f64>,
    }

    let rows = qb.build_query_as::<Row>().fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|r| ProblemSummary {
            id: r.id,
            title: r.title,
            difficulty: r.difficulty,
            category: r.category,
            tags: parse_tags(&r.tags),
            acceptance_rate: r.acceptance_rate,
        })
        .collect())
}

pub async fn fetch_problem(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<ProblemDetail>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        id: i64,
        title: String,
        description: String,
        examples: String,
        constraints: String,
        difficulty: String,
        category: String,
        tags: String,
        test_cases: String,
        solution_template: String,
        acceptance_rate: Option<f64>,
    }

    let row: Option<Row> = sqlx::query_as(
        r#"
        SELECT id, title, description, examples, constraints, difficulty,
               category, tags, test_cases, solution_template, acceptance_rate
        FROM problems WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| ProblemDetail {
        id: r.id,
        title: r.title,
        description: r.description,
        examples: serde_json::from_str(&r.examples).unwrap_or_default(),
        constraints: serde_json::from_str(&r.constraints).unwrap_or_default(),
        difficulty: r.difficulty,
        category: r.category,
        tags: parse_tags(&r.tags),
        test_cases: serde_json::from_str(&r.test_cases).unwrap_or_default(),
        solution_template: serde_json::from_str(&r.solution_template).unwrap_or_default(),
        acceptance_rate: r.acceptance_rate,
    }))
}

/// Returns (difficulty, ordered test cases) or None when the problem is absent.
pub async fn fetch_problem_cases(
    pool: &SqlitePool,
    id: i64,
) -> sqlx::Result<Option<(String, Vec<TestCase>)>> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT difficulty, test_cases FROM problems WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(difficulty, raw)| {
        let cases: Vec<TestCase> = serde_json::from_str(&raw).unwrap_or_default();
        (difficulty, cases)
    }))
}

pub async fn fetch_problem_category(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT category FROM problems WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(category,)| category))
}

// ============ Submissions (append-only ledger) ============

pub async fn record_submission(
    pool: &SqlitePool,
    user_id: &str,
    problem_id: i64,
    language_id: i64,
    source_code: &str,
    status: &str,
    runtime_ms: Option<f64>,
    memory_kb: Option<i64>,
) -> sqlx::Result<i64> {
    let now = crate::create_timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO submissions
            (user_id, problem_id, language_id, source_code, status, runtime_ms, memory_kb, submitted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(problem_id)
    .bind(language_id)
    .bind(source_code)
    .bind(status)
    .bind(runtime_ms)
    .bind(memory_kb)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

// ============ Progress aggregator ============

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ProgressReport {
    pub problems_solved: i64,
    pub easy_solved: i64,
    pub medium_solved: i64,
    pub hard_solved: i64,
    pub total_submissions: i64,
    pub last_solved_at: Option<String>,
}

pub async fn fetch_progress(pool: &SqlitePool, user_id: &str) -> sqlx::Result<ProgressReport> {
    #[derive(sqlx::FromRow)]
    struct Row {
        problems_solved: i64,
        easy_solved: i64,
        medium_solved: i64,
        hard_solved: i64,
        total_submissions: i64,
        last_solved_at: Option<String>,
    }

    let row: Option<Row> = sqlx::query_as(
        r#"
        SELECT problems_solved, easy_solved, medium_solved, hard_solved,
               total_submissions, last_solved_at
        FROM user_progress WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|r| ProgressReport {
            problems_solved: r.problems_solved,
            easy_solved: r.easy_solved,
            medium_solved: r.medium_solved,
            hard_solved: r.hard_solved,
            total_submissions: r.total_submissions,
            last_solved_at: r.last_solved_at,
        })
        .unwrap_or_default())
}

/// Credits a fully accepted submission to the user's running tally.
///
/// A single upsert statement so that concurrent accepted submissions from the
/// same user never lose an increment to a read-modify-write race.
pub async fn record_acceptance(
    pool: &SqlitePool,
    user_id: &str,
    difficulty: Difficulty,
) -> sqlx::Result<()> {
    let now = crate::create_timestamp();
    let easy = i64::from(difficulty == Difficulty::Easy);
    let medium = i64::from(difficulty == Difficulty::Medium);
    let hard = i64::from(difficulty == Difficulty::Hard);

    sqlx::query(
        r#"
        INSERT INTO user_progress
            (user_id, problems_solved, easy_solved, medium_solved, hard_solved,
             total_submissions, last_solved_at)
        VALUES (?, 1, ?, ?, ?, 1, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            problems_solved   = problems_solved + 1,
            easy_solved       = easy_solved + excluded.easy_solved,
            medium_solved     = medium_solved + excluded.medium_solved,
            hard_solved       = hard_solved + excluded.hard_solved,
            total_submissions = total_submissions + 1,
            last_solved_at    = excluded.last_solved_at
        "#,
    )
    .bind(user_id)
    .bind(easy)
    .bind(medium)
    .bind(hard)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

// ============ Seed data ============

async fn seed_problems(pool: &SqlitePool) -> sqlx::Result<()> {
    let now = crate::create_timestamp();

    let two_sum_cases = serde_json::json!([
        { "input": "[2,7,11,15]\n9", "expected_output": "[0,1]" },
        { "input": "[3,2,4]\n6", "expected_output": "[1,2]" },
        { "input": "[3,3]\n6", "expected_output": "[0,1]" }
    ]);
    let two_sum_examples = serde_json::json!([
        {
            "input": "nums = [2,7,11,15], target = 9",
            "output": "[0,1]",
            "explanation": "Because nums[0] + nums[1] == 9, we return [0, 1]."
        }
    ]);
    let two_sum_templates = serde_json::json!({
        "python": "def two_sum(nums, target):\n    # Write your code here\n    pass\n",
        "javascript": "function twoSum(nums, target) {\n    // Write your code here\n    return [];\n}\n"
    });

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO problems
            (title, description, examples, constraints, difficulty, category, tags,
             test_cases, solution_template, acceptance_rate, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind("Two Sum")
    .bind(
        "Given an array of integers `nums` and an integer `target`, return indices of \
         the two numbers such that they add up to `target`. Each input has exactly one \
         solution, and you may not use the same element twice.",
    )
    .bind(two_sum_examples.to_string())
    .bind(
        serde_json::json!([
            "2 <= nums.length <= 10^4",
            "-10^9 <= nums[i] <= 10^9",
            "Only one valid answer exists."
        ])
        .to_string(),
    )
    .bind("Easy")
    .bind("Array")
    .bind(serde_json::json!(["Array", "Hash Table"]).to_string())
    .bind(two_sum_cases.to_string())
    .bind(two_sum_templates.to_string())
    .bind(85.5)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO problems
            (title, description, examples, constraints, difficulty, category, tags,
             test_cases, solution_template, acceptance_rate, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind("High Value Records")
    .bind(
        "Write a query that returns the name and value of every row in `sample_table` \
         with a value above 120, ordered by value descending.",
    )
    .bind(
        serde_json::json!([
            {
                "input": "sample_table(name, value)",
                "expected_output": "Bob|200, Charlie|150"
            }
        ])
        .to_string(),
    )
    .bind(serde_json::json!(["Use a single SELECT statement."]).to_string())
    .bind("Easy")
    .bind("SQL")
    .bind(serde_json::json!(["SQL", "Filtering"]).to_string())
    .bind("[]")
    .bind(
        serde_json::json!({
            "sql": "SELECT name, value FROM sample_table WHERE -- your condition here\n"
        })
        .to_string(),
    )
    .bind(72.0)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}
