use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at the config file.
pub const CONFIG_ENV: &str = "APP_CONF";

/// Config file used when neither `--config` nor `APP_CONF` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/local.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found at {0:?}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file (invalid TOML): {0}")]
    Parse(#[from] toml::de::Error),
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    pub data: DataConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub db: DbConfig,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Driver name: `postgres`, `mysql` or `sqlite`.
    ///
    /// Kept as a plain string so an unsupported value surfaces at startup
    /// rather than as a parse error.
    #[serde(rename = "type")]
    pub kind: String,
    pub dsn: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub addr: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub api_sign: ApiSignConfig,
}

/// Shared-secret material for request signing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSignConfig {
    pub app_key: String,
    pub app_secret: String,
}

impl Config {
    /// Resolve the config path: explicit argument, then `APP_CONF`, then the default.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load config from a TOML file and expand `${VAR}` references.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml(&content)?;
        config.expand_variables(|name| env::var(name).ok());

        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse config from a TOML string without touching the environment.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Expand ${var} references in DSNs and secrets
    fn expand_variables<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.data.db.dsn = expand_string(&self.data.db.dsn, &lookup);
        self.data.redis.addr = expand_string(&self.data.redis.addr, &lookup);
        self.data.redis.password = expand_string(&self.data.redis.password, &lookup);
        self.security.api_sign.app_key = expand_string(&self.security.api_sign.app_key, &lookup);
        self.security.api_sign.app_secret =
            expand_string(&self.security.api_sign.app_secret, &lookup);
    }
}

/// Expand ${var} references in a string. Unknown variables expand to "".
fn expand_string<F>(s: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + len];
        result.push_str(&lookup(name).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }

    result.push_str(rest);
    result
}
