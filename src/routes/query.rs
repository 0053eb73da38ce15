use actix_web::{HttpRequest, HttpResponse, post, web};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthTokens;
use crate::config::SandboxConfig;
use crate::error::ApiError;
use crate::sql_sandbox;

#[derive(Deserialize, Debug)]
pub struct QueryRequest {
    pub query: String,
}

/// Ad-hoc read-only SQL against the sandbox dataset, never the primary store.
#[post("/api/query")]
pub async fn query_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
    sandbox: web::Data<SandboxConfig>,
    body: web::Json<QueryRequest>,
) -> Result<HttpResponse, ApiError> {
    tokens.require(&req)?;

    let output = sql_sandbox::execute(&body.query, sandbox.timeout()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "columns": output.columns,
        "data": output.rows,
        "row_count": output.row_count
    })))
}
