use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::auth::AuthTokens;
use crate::config::{LanguageConfig, SandboxConfig};
use crate::database as db;
use crate::error::ApiError;
use crate::grader;
use crate::judge::{Judge, JudgeSubmission};
use crate::sql_sandbox;

#[derive(Deserialize, Debug)]
pub struct ProblemsQuery {
    pub difficulty: Option<String>,
    pub category: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct RunCodeRequest {
    pub source_code: String,
    pub language: String,
    #[serde(default)]
    pub stdin: String,
}

#[derive(Deserialize, Debug)]
pub struct SubmitRequest {
    pub source_code: String,
    pub language: String,
}

#[derive(Deserialize, Debug)]
pub struct SqlRequest {
    pub query: String,
}

fn resolve_language(languages: &[LanguageConfig], name: &str) -> Result<i64, ApiError> {
    languages
        .iter()
        .find(|l| l.name == name)
        .map(|l| l.judge_id)
        .ok_or_else(|| ApiError::Validation(format!("Unsupported language: {name}")))
}

#[get("/api/problems")]
pub async fn list_problems_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
    query: web::Query<ProblemsQuery>,
) -> Result<HttpResponse, ApiError> {
    tokens.require(&req)?;

    let problems = db::list_problems(
        &pool,
        query.difficulty.as_deref(),
        query.category.as_deref(),
    )
    .await?;

    log::info!("Listed {} problems", problems.len());
    Ok(HttpResponse::Ok().json(json!({ "problems": problems })))
}

#[get("/api/problems/{id}")]
pub async fn get_problem_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    tokens.require(&req)?;
    let problem_id = path.into_inner();

    let problem = db::fetch_problem(&pool, problem_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Problem {problem_id} not found")))?;

    Ok(HttpResponse::Ok().json(problem))
}

/// Reports whether the external execution service is reachable. Outages are
/// part of the answer here, not an error.
#[get("/api/judge/status")]
pub async fn judge_status_handler(judge: web::Data<dyn Judge>) -> HttpResponse {
    match judge.health().await {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => HttpResponse::Ok().json(json!({
            "status": "disconnected",
            "error": e.to_string()
        })),
    }
}

#[get("/api/languages")]
pub async fn languages_handler(languages: web::Data<Vec<LanguageConfig>>) -> HttpResponse {
    let map: serde_json::Map<String, serde_json::Value> = languages
        .iter()
        .map(|l| (l.name.clone(), json!(l.judge_id)))
        .collect();
    HttpResponse::Ok().json(json!({ "languages": map }))
}

#[post("/api/problems/{id}/run")]
pub async fn run_code_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
    judge: web::Data<dyn Judge>,
    languages: web::Data<Vec<LanguageConfig>>,
    path: web::Path<i64>,
    body: web::Json<RunCodeRequest>,
) -> Result<HttpResponse, ApiError> {
    tokens.require(&req)?;
    let problem_id = path.into_inner();

    if db::fetch_problem_category(&pool, problem_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Problem {problem_id} not found")));
    }

    let language_id = resolve_language(&languages, &body.language)?;
    let verdict = judge
        .run_case(&JudgeSubmission {
            source_code: &body.source_code,
            language_id,
            stdin: &body.stdin,
            expected_output: "",
        })
        .await?;

    Ok(HttpResponse::Ok().json(verdict))
}

#[post("/api/problems/{id}/submit")]
pub async fn submit_code_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
    judge: web::Data<dyn Judge>,
    languages: web::Data<Vec<LanguageConfig>>,
    path: web::Path<i64>,
    body: web::Json<SubmitRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = tokens.require(&req)?;
    let problem_id = path.into_inner();
    let language_id = resolve_language(&languages, &body.language)?;

    let outcome = grader::grade(
        &pool,
        judge.as_ref(),
        &username,
        problem_id,
        &body.source_code,
        language_id,
    )
    .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

async fn require_sql_problem(pool: &SqlitePool, problem_id: i64) -> Result<(), ApiError> {
    let category = db::fetch_problem_category(pool, problem_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Problem {problem_id} not found")))?;
    if category != "SQL" {
        return Err(ApiError::Validation("This is not a SQL problem".to_string()));
    }
    Ok(())
}

#[post("/api/problems/{id}/run-sql")]
pub async fn run_sql_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
    sandbox: web::Data<SandboxConfig>,
    path: web::Path<i64>,
    body: web::Json<SqlRequest>,
) -> Result<HttpResponse, ApiError> {
    tokens.require(&req)?;
    require_sql_problem(&pool, path.into_inner()).await?;

    let output = sql_sandbox::execute(&body.query, sandbox.timeout()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "result": output,
        "message": format!("Query executed successfully. {} rows returned.", output.row_count)
    })))
}

#[post("/api/problems/{id}/submit-sql")]
pub async fn submit_sql_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
    sandbox: web::Data<SandboxConfig>,
    path: web::Path<i64>,
    body: web::Json<SqlRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = tokens.require(&req)?;
    let problem_id = path.into_inner();
    require_sql_problem(&pool, problem_id).await?;

    let output = sql_sandbox::execute(&body.query, sandbox.timeout()).await?;

    // SQL grading accepts any query that executes cleanly; language id 0
    // marks the submission as SQL in the ledger.
    db::record_submission(
        &pool, &username, problem_id, 0, &body.query, "Accepted", Some(0.0), Some(0),
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "Accepted",
        "score": 100,
        "message": "Submission successful!",
        "result": output
    })))
}
