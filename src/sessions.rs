use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

// Durable store for interview sessions. Session ids are random UUIDs rather
// than row ids so they cannot be enumerated. Rows are append-or-update only;
// nothing here deletes.

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Serialize, Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    pub session_id: String,
    pub username: String,
    pub employee_id: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: String,
    pub overall_score: Option<f64>,
}

#[derive(Serialize, Debug, sqlx::FromRow)]
pub struct QuestionRecord {
    pub id: i64,
    pub session_id: String,
    pub question_text: String,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub asked_at: String,
    pub response_text: Option<String>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Serialize, Debug, sqlx::FromRow)]
pub struct ActivityRecord {
    pub activity_type: String,
    pub activity_data: String,
    pub timestamp: String,
}

#[derive(Serialize, Debug, sqlx::FromRow)]
pub struct ReportRecord {
    pub session_id: String,
    pub strengths: String,
    pub weaknesses: String,
    pub recommendations: String,
    pub assessment: String,
    pub overall_score: f64,
    pub generated_at: String,
}

/// Narrative sections an agent may attach when finalizing a report.
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct ReportNarrative {
    #[serde(default)]
    pub strengths: String,
    #[serde(default)]
    pub weaknesses: String,
    #[serde(default)]
    pub recommendations: String,
    #[serde(default)]
    pub assessment: String,
}

pub async fn create_session(
    pool: &SqlitePool,
    username: &str,
    employee_id: Option<&str>,
) -> sqlx::Result<String> {
    let session_id = Uuid::new_v4().to_string();
    let now = crate::create_timestamp();

    sqlx::query(
        r#"
        INSERT INTO interview_sessions (session_id, username, employee_id, start_time, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session_id)
    .bind(username)
    .bind(employee_id)
    .bind(&now)
    .bind(STATUS_ACTIVE)
    .execute(pool)
    .await?;

    log::info!("Created interview session {session_id} for user {username}");
    Ok(session_id)
}

pub async fn get_session(
    pool: &SqlitePool,
    session_id: &str,
) -> sqlx::Result<Option<SessionRecord>> {
    sqlx::query_as(
        r#"
        SELECT session_id, username, employee_id, start_time, end_time, status, overall_score
        FROM interview_sessions WHERE session_id = ?
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_sessions(pool: &SqlitePool, username: &str) -> sqlx::Result<Vec<SessionRecord>> {
    sqlx::query_as(
        r#"
        SELECT session_id, username, employee_id, start_time, end_time, status, overall_score
        FROM interview_sessions
        WHERE username = ?
        ORDER BY start_time DESC
        "#,
    )
    .bind(username)
    .fetch_all(pool)
    .await
}

pub async fn update_status(
    pool: &SqlitePool,
    session_id: &str,
    status: &str,
    end_time: Option<&str>,
) -> sqlx::Result<()> {
    match end_time {
        Some(end_time) => {
            sqlx::query(
                "UPDATE interview_sessions SET status = ?, end_time = ? WHERE session_id = ?",
            )
            .bind(status)
            .bind(end_time)
            .bind(session_id)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query("UPDATE interview_sessions SET status = ? WHERE session_id = ?")
                .bind(status)
                .bind(session_id)
                .execute(pool)
                .await?;
        }
    }

    log::info!("Updated interview session {session_id} status to {status}");
    Ok(())
}

pub async fn record_activity(
    pool: &SqlitePool,
    session_id: &str,
    activity_type: &str,
    payload: &serde_json::Value,
) -> sqlx::Result<()> {
    let now = crate::create_timestamp();

    sqlx::query(
        r#"
        INSERT INTO interview_activities (session_id, activity_type, activity_data, timestamp)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(activity_type)
    .bind(payload.to_string())
    .bind(&now)
    .execute(pool)
    .await?;

    log::debug!("Recorded activity {activity_type} for session {session_id}");
    Ok(())
}

pub async fn list_activities(
    pool: &SqlitePool,
    session_id: &str,
) -> sqlx::Result<Vec<ActivityRecord>> {
    sqlx::query_as(
        r#"
        SELECT activity_type, activity_data, timestamp
        FROM interview_activities
        WHERE session_id = ?
        ORDER BY timestamp
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
}

async fn is_active(pool: &SqlitePool, session_id: &str) -> sqlx::Result<bool> {
    Ok(get_session(pool, session_id)
        .await?
        .is_some_and(|s| s.status == STATUS_ACTIVE))
}

/// Tool-call: appends a question to the session. A soft no-op when the
/// session is not active, because the agent may call tools slightly out of
/// order with connection teardown.
pub async fn log_question(
    pool: &SqlitePool,
    session_id: &str,
    question: &str,
    category: &str,
    difficulty: &str,
) -> sqlx::Result<String> {
    if !is_active(pool, session_id).await? {
        return Ok("No active session".to_string());
    }

    let now = crate::create_timestamp();
    sqlx::query(
        r#"
        INSERT INTO interview_questions (session_id, question_text, category, difficulty, asked_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(question)
    .bind(category)
    .bind(difficulty)
    .bind(&now)
    .execute(pool)
    .await?;

    log::info!("Question logged for {session_id}: {category} - {difficulty}");
    Ok(format!("Question logged: {category} - {difficulty}"))
}

/// Tool-call: attaches the candidate's response, a score and feedback to the
/// most recently asked question in the session. No-ops when no question has
/// been asked yet.
pub async fn log_evaluation(
    pool: &SqlitePool,
    session_id: &str,
    response: &str,
    score: f64,
    feedback: &str,
) -> sqlx::Result<String> {
    if !is_active(pool, session_id).await? {
        return Ok("No active session".to_string());
    }

    let latest: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM interview_questions
        WHERE session_id = ?
        ORDER BY asked_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    let Some((question_id,)) = latest else {
        return Ok("No question to evaluate".to_string());
    };

    sqlx::query(
        "UPDATE interview_questions SET response_text = ?, score = ?, feedback = ? WHERE id = ?",
    )
    .bind(response)
    .bind(score)
    .bind(feedback)
    .bind(question_id)
    .execute(pool)
    .await?;

    log::info!("Response evaluated for {session_id}: score={score}");
    Ok(format!("Response evaluated with score: {score}"))
}

/// Tool-call: finalizes the session. Overall score is the mean of all scored
/// questions (0.0 when none were scored), the session flips to completed with
/// an end time, and the report row is written insert-or-replace so a repeated
/// call recomputes deterministically instead of duplicating.
pub async fn generate_report(
    pool: &SqlitePool,
    session_id: &str,
    narrative: &ReportNarrative,
) -> sqlx::Result<String> {
    if get_session(pool, session_id).await?.is_none() {
        return Ok("No active session".to_string());
    }

    let scores: Vec<(f64,)> = sqlx::query_as(
        r#"
        SELECT score FROM interview_questions
        WHERE session_id = ? AND score IS NOT NULL
        ORDER BY asked_at
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    // Zero scored questions reports 0.0, not NULL
    let overall_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|(s,)| s).sum::<f64>() / scores.len() as f64
    };

    let now = crate::create_timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE interview_sessions
        SET overall_score = ?, status = ?, end_time = ?
        WHERE session_id = ?
        "#,
    )
    .bind(overall_score)
    .bind(STATUS_COMPLETED)
    .bind(&now)
    .bind(session_id)
    .execute(tx.as_mut())
    .await?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO session_reports
            (session_id, strengths, weaknesses, recommendations, assessment,
             overall_score, generated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(&narrative.strengths)
    .bind(&narrative.weaknesses)
    .bind(&narrative.recommendations)
    .bind(&narrative.assessment)
    .bind(overall_score)
    .bind(&now)
    .execute(tx.as_mut())
    .await?;

    tx.commit().await?;

    log::info!("Session report generated for {session_id}: overall_score={overall_score:.2}");
    Ok(format!(
        "Session completed with overall score: {overall_score:.2}"
    ))
}

pub async fn fetch_report(
    pool: &SqlitePool,
    session_id: &str,
) -> sqlx::Result<Option<ReportRecord>> {
    sqlx::query_as(
        r#"
        SELECT session_id, strengths, weaknesses, recommendations, assessment,
               overall_score, generated_at
        FROM session_reports WHERE session_id = ?
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await
}
