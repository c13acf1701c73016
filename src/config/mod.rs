use serde::Deserialize;

static CONFIG: OnceCell<Config> = OnceCell::const_new();

mod config_dir;
pub use config_dir::{find_config_file, read_config};

mod error;
pub use error::{ConfigError, ConfigResult};
use tokio::sync::OnceCell;

#[derive(Debug, Deserialize)]
pub struct Config {
    host: Host,
    app: App,
    #[serde(default)]
    rate_limit: RateLimit,
}

#[derive(Debug, Deserialize)]
pub struct Host {
    bindto: String,
}

#[derive(Debug, Deserialize)]
pub struct App {
    jwt: String,
    database_uri: String,
    #[serde(default)]
    docs: bool,
    #[serde(default = "default_environment")]
    environment: String,
    #[serde(default = "default_cors_origin")]
    cors_origin: String,
    admin_username: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimit {
    window_secs: u64,
    max_requests: u32,
}

fn default_environment() -> String {
    String::from("development")
}

fn default_cors_origin() -> String {
    String::from("*")
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            max_requests: 100,
        }
    }
}

impl Config {
    #[tracing::instrument]
    pub async fn get_or_init(use_local: bool) -> &'static Config {
        CONFIG
            .get_or_init(|| async {
                let read_cfg = |use_local| -> ConfigResult<Self> {
                    let bytes = read_config(use_local)?;
                    let mut config: Self = toml::from_slice(&bytes)?;
                    config.apply_overrides(|key| std::env::var(key).ok());
                    config.validate()?;
                    Ok(config)
                };

                match read_cfg(use_local) {
                    Ok(c) => c,
                    Err(e) => {
                        if !matches!(e, error::ConfigError::ConfigNotFound) {
                            crate::error::log_error(&e);
                        }
                        tracing::error!("Config not found.");
                        std::process::exit(1);
                    }
                }
            })
            .await
    }

    /// Returns the loaded config without initializing it.
    pub fn try_get() -> Option<&'static Config> {
        CONFIG.get()
    }

    /// Environment variables win over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("DATABASE_URL") {
            self.app.database_uri = uri;
        }

        if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
            let host = self
                .host
                .bindto
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| String::from("0.0.0.0"));
            self.host.bindto = format!("{}:{}", host, port);
        }

        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.app.cors_origin = origin;
        }

        if let Some(secret) = lookup("JWT_SECRET") {
            self.app.jwt = secret;
        }

        if let Some(env) = lookup("APP_ENV") {
            self.app.environment = env;
        }

        if let Some(ms) = lookup("RATE_LIMIT_WINDOW_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.rate_limit.window_secs = (ms / 1000).max(1);
        }

        if let Some(max) = lookup("RATE_LIMIT_MAX_REQUESTS").and_then(|v| v.parse::<u32>().ok()) {
            self.rate_limit.max_requests = max;
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.app.jwt.trim().is_empty() {
            return Err(ConfigError::Invalid("app.jwt must not be empty"));
        }
        if self.app.database_uri.trim().is_empty() {
            return Err(ConfigError::Invalid("app.database_uri must not be empty"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid("rate_limit.window_secs must be positive"));
        }
        Ok(())
    }

    #[inline]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[inline]
    pub fn app(&self) -> &App {
        &self.app
    }

    #[inline]
    pub fn rate_limit(&self) -> &RateLimit {
        &self.rate_limit
    }
}

impl Host {
    #[inline]
    pub fn bindto(&self) -> &str {
        &self.bindto
    }
}

impl App {
    #[inline]
    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    #[inline]
    pub fn database_uri(&self) -> &str {
        &self.database_uri
    }

    #[inline]
    pub fn docs(&self) -> bool {
        self.docs
    }

    #[inline]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    #[inline]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    #[inline]
    pub fn cors_origin(&self) -> &str {
        &self.cors_origin
    }

    /// Bootstrap admin credentials, present only when username and password are both set.
    pub fn admin_credentials(&self) -> Option<(&str, &str, &str)> {
        let username = self.admin_username.as_deref()?;
        let password = self.admin_password.as_deref()?;
        let email = self.admin_email.as_deref().unwrap_or("admin@localhost");
        Some((username, email, password))
    }
}

impl RateLimit {
    #[inline]
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    #[inline]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}
