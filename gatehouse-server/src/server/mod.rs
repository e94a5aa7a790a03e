//! Servers run by the app

pub mod http;
pub mod migrate;

pub use self::http::HttpServer;
pub use self::migrate::Migrate;
