use serde::Serialize;
use sqlx::SqlitePool;

use crate::database as db;
use crate::error::ApiError;
use crate::judge::{Judge, JudgeSubmission};

/// Aggregate result of grading one submission against a problem's test cases.
#[derive(Serialize, Debug, PartialEq)]
pub struct GradeOutcome {
    pub status: String,
    pub accepted: bool,
    pub avg_runtime_ms: f64,
    pub avg_memory_kb: i64,
    pub test_cases_passed: usize,
}

/// Grades `source_code` against the problem's ordered test cases.
///
/// Cases run strictly in stored order and grading stops at the first
/// non-accepted verdict; that verdict's status string becomes the overall
/// status and `test_cases_passed` is the index of the failing case. An empty
/// case list is trivially accepted with zero averages. The submission is
/// recorded either way; the progress tally moves only on full acceptance.
pub async fn grade(
    pool: &SqlitePool,
    judge: &dyn Judge,
    user_id: &str,
    problem_id: i64,
    source_code: &str,
    language_id: i64,
) -> Result<GradeOutcome, ApiError> {
    let (difficulty, cases) = db::fetch_problem_cases(pool, problem_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Problem {problem_id} not found")))?;

    let mut passed = 0usize;
    let mut total_time_ms = 0.0f64;
    let mut total_memory_kb = 0i64;
    let mut failure: Option<String> = None;

    for (idx, case) in cases.iter().enumerate() {
        let verdict = judge
            .run_case(&JudgeSubmission {
                source_code,
                language_id,
                stdin: &case.input,
                expected_output: &case.expected_output,
            })
            .await?;

        if !verdict.is_accepted() {
            log::info!(
                "Submission by {user_id} on problem {problem_id} failed case {idx}: {}",
                verdict.status
            );
            failure = Some(verdict.status);
            break;
        }

        passed += 1;
        total_time_ms += verdict.time_ms.unwrap_or(0.0);
        total_memory_kb += verdict.memory_kb.unwrap_or(0);
    }

    let accepted = failure.is_none();
    let status = failure.unwrap_or_else(|| "Accepted".to_string());
    let (avg_runtime_ms, avg_memory_kb) = if accepted && !cases.is_empty() {
        (
            total_time_ms / cases.len() as f64,
            total_memory_kb / cases.len() as i64,
        )
    } else {
        (0.0, 0)
    };

    db::record_submission(
        pool,
        user_id,
        problem_id,
        language_id,
        source_code,
        &status,
        Some(avg_runtime_ms),
        Some(avg_memory_kb),
    )
    .await?;

    if accepted {
        let difficulty = difficulty.parse()?;
        db::record_acceptance(pool, user_id, difficulty).await?;
        log::info!("Submission by {user_id} on problem {problem_id} accepted, progress updated");
    }

    Ok(GradeOutcome {
        status,
        accepted,
        avg_runtime_ms,
        avg_memory_kb,
        test_cases_passed: passed,
    })
}
