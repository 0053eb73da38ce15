mod auth;
mod interview;
mod problems;
mod query;
mod ws;

pub use auth::{login_handler, logout_handler, user_handler};
pub use interview::{
    progress_handler, session_detail_handler, sessions_handler, start_interview_handler,
};
pub use problems::{
    get_problem_handler, judge_status_handler, languages_handler, list_problems_handler,
    run_code_handler, run_sql_handler, submit_code_handler, submit_sql_handler,
};
pub use query::query_handler;
pub use ws::ws_handler;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorBody {
        detail: format!("Invalid request body: {err}"),
    });
    InternalError::from_response(err, response).into()
}
