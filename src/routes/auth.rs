use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthTokens, SESSION_COOKIE};
use crate::error::ApiError;

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[post("/api/login")]
pub async fn login_handler(
    tokens: web::Data<AuthTokens>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let Some(token) = tokens.login(&body.username, &body.password) else {
        // Do not reveal whether the username exists
        return Err(ApiError::Unauthorized);
    };

    let cookie = Cookie::build(SESSION_COOKIE, token)
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(json!({
        "success": true,
        "message": "Login successful",
        "user": { "username": body.username }
    })))
}

#[post("/api/logout")]
pub async fn logout_handler(
    req: HttpRequest,
    tokens: web::Data<AuthTokens>,
) -> Result<HttpResponse, ApiError> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        tokens.invalidate(cookie.value());
    }

    let mut expired = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    expired.set_max_age(CookieDuration::ZERO);

    Ok(HttpResponse::Ok().cookie(expired).json(json!({
        "success": true,
        "message": "Logged out successfully"
    })))
}

#[get("/api/user")]
pub async fn user_handler(req: HttpRequest, tokens: web::Data<AuthTokens>) -> HttpResponse {
    match tokens.current_user(&req) {
        Some(username) => HttpResponse::Ok().json(json!({
            "user": { "username": username },
            "authenticated": true
        })),
        None => HttpResponse::Ok().json(json!({
            "user": null,
            "authenticated": false
        })),
    }
}
