use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "codedrill", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub judge: JudgeConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    pub languages: Vec<LanguageConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug)]
pub struct JudgeConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    /// RapidAPI host header, only sent when an API key is configured
    pub api_host: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AuthConfig {
    pub users: Vec<UserConfig>,
    /// Session token lifetime in minutes, defaults to 480
    pub token_ttl_minutes: Option<i64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UserConfig {
    pub username: String,
    /// Either `salt:sha256hex` or a plain string (development only)
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct RealtimeConfig {
    /// When false the interview channel runs against an inert session
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SandboxConfig {
    /// Wall-clock budget for ad-hoc queries in seconds, defaults to 10
    pub query_timeout_secs: Option<u64>,
}

impl SandboxConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_timeout_secs.unwrap_or(10))
    }
}

/// Maps a human-facing language name to the judge service's numeric id.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    pub name: String,
    pub judge_id: i64,
}
