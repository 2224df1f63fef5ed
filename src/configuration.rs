use config::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;
const MAX_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Which persistence backend the stores run on
#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local maps; state is lost on restart
    Memory,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub storage: StorageBackend,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection, used to create per-test databases
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT signing settings; loaded once, immutable afterwards
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: i64, // 7200 = 2 hours
    pub issuer: String,
}

fn default_token_ttl() -> i64 {
    2 * 60 * 60
}

impl JwtSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.token_ttl_seconds <= 0 || self.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
            return Err(ConfigError::Message(format!(
                "jwt.token_ttl_seconds must be between 1 and {}",
                MAX_TOKEN_TTL_SECONDS
            )));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct SessionSettings {
    /// How often expired sessions are purged; 0 disables the sweeper
    pub sweep_interval_seconds: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 15 * 60,
        }
    }
}

/// Reads `configuration.{yaml,toml,json}` if present, then `APP__*`
/// environment variables (e.g. `APP__JWT__SECRET`).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.jwt.validate()?;
    Ok(settings)
}
