use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::auth::AuthTokens;
use crate::database as db;
use crate::error::ApiError;
use crate::sessions;

#[derive(Deserialize, Debug, Default)]
pub struct StartInterviewRequest {
    pub employee_id: Option<String>,
}

#[post("/api/start-interview")]
pub async fn start_interview_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
    body: Option<web::Json<StartInterviewRequest>>,
) -> Result<HttpResponse, ApiError> {
    let username = tokens.require(&req)?;
    let employee_id = body.and_then(|b| b.into_inner().employee_id);

    let session_id =
        sessions::create_session(&pool, &username, employee_id.as_deref()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "session_id": session_id,
        "message": "Interview session started successfully"
    })))
}

#[get("/api/sessions")]
pub async fn sessions_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
) -> Result<HttpResponse, ApiError> {
    let username = tokens.require(&req)?;
    let records = sessions::list_sessions(&pool, &username).await?;
    Ok(HttpResponse::Ok().json(json!({ "sessions": records })))
}

#[get("/api/sessions/{id}")]
pub async fn session_detail_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let username = tokens.require(&req)?;
    let session_id = path.into_inner();

    let session = sessions::get_session(&pool, &session_id)
        .await?
        .filter(|s| s.username == username)
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    let activities = sessions::list_activities(&pool, &session_id).await?;
    let report = sessions::fetch_report(&pool, &session_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "session": session,
        "activities": activities,
        "report": report
    })))
}

#[get("/api/user/progress")]
pub async fn progress_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    pool: web::Data<SqlitePool>,
) -> Result<HttpResponse, ApiError> {
    let username = tokens.require(&req)?;
    let progress = db::fetch_progress(&pool, &username).await?;
    Ok(HttpResponse::Ok().json(progress))
}
