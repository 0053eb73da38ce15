pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod grader;
pub mod judge;
pub mod orchestrator;
pub mod realtime;
pub mod routes;
pub mod sessions;
pub mod sql_sandbox;
pub mod web_server;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
