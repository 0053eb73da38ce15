use std::sync::Arc;

use clap::Parser;

use codedrill::auth::AuthTokens;
use codedrill::config::{CliArgs, Config};
use codedrill::database as db;
use codedrill::judge::{Judge, JudgeClient};
use codedrill::orchestrator::SessionRegistry;
use codedrill::realtime::build_connector;
use codedrill::web_server::build_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let db_path = db::get_db_path();
    let cli = CliArgs::parse();

    let Config {
        server: server_config,
        judge: judge_config,
        auth: auth_config,
        realtime: realtime_config,
        sandbox: sandbox_config,
        languages: language_config,
    } = cli.to_config().expect("Failed to load configuration");

    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .expect("Failed to initialize database");

    let tokens = Arc::new(AuthTokens::new(
        auth_config.users,
        auth_config.token_ttl_minutes.unwrap_or(480),
    ));
    let judge: Arc<dyn Judge> = Arc::new(JudgeClient::new(&judge_config));
    let connector = build_connector(&realtime_config);
    let registry = Arc::new(SessionRegistry::new());

    // ======= PREPARATION END, EXECUTION START =======

    let server = build_server(
        server_config,
        language_config,
        sandbox_config,
        db_pool,
        tokens,
        judge,
        connector,
        registry.clone(),
    )
    .expect("Failed to build server");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Tear down any interview channels that are still live
    registry.shutdown_all().await;

    log::info!("Shutdown complete");
    Ok(())
}
