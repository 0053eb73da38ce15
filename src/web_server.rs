use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::SqlitePool;

use crate::auth::AuthTokens;
use crate::config::{LanguageConfig, SandboxConfig, ServerConfig};
use crate::judge::Judge;
use crate::orchestrator::SessionRegistry;
use crate::realtime::RealtimeConnector;
use crate::routes::{
    get_problem_handler, json_error_handler, judge_status_handler, languages_handler,
    list_problems_handler, login_handler, logout_handler, progress_handler, query_handler,
    run_code_handler, run_sql_handler, session_detail_handler, sessions_handler,
    start_interview_handler, submit_code_handler, submit_sql_handler, user_handler, ws_handler,
};

#[allow(clippy::too_many_arguments)]
pub fn build_server(
    server_config: ServerConfig,
    languages: Vec<LanguageConfig>,
    sandbox: SandboxConfig,
    db_pool: SqlitePool,
    tokens: Arc<AuthTokens>,
    judge: Arc<dyn Judge>,
    connector: Arc<dyn RealtimeConnector>,
    registry: Arc<SessionRegistry>,
) -> std::io::Result<Server> {
    let db_pool = web::Data::new(db_pool);
    let languages = web::Data::new(languages);
    let sandbox = web::Data::new(sandbox);
    let tokens = web::Data::from(tokens);
    let judge = web::Data::from(judge);
    let connector = web::Data::from(connector);
    let registry = web::Data::from(registry);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(languages.clone())
            .app_data(sandbox.clone())
            .app_data(tokens.clone())
            .app_data(judge.clone())
            .app_data(connector.clone())
            .app_data(registry.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .service(login_handler)
            .service(logout_handler)
            .service(user_handler)
            .service(list_problems_handler)
            .service(get_problem_handler)
            .service(languages_handler)
            .service(judge_status_handler)
            .service(run_code_handler)
            .service(submit_code_handler)
            .service(run_sql_handler)
            .service(submit_sql_handler)
            .service(query_handler)
            .service(start_interview_handler)
            .service(sessions_handler)
            .service(session_detail_handler)
            .service(progress_handler)
            .service(ws_handler)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(8004),
    ))?
    .run();

    Ok(server)
}
