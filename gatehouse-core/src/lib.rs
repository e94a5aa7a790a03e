//! gatehouse-core: configuration shared by the server and the CLI

pub mod config;

pub use config::{
    ApiSignConfig, Config, ConfigError, DataConfig, DbConfig, HttpConfig, RedisConfig,
    SecurityConfig,
};
