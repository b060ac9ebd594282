//! Environment configuration.

use std::env;

/// Runtime configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Root directory for chunks, uploads and transcoded output
    pub storage_dir: String,
    /// Optional Redis broker URL; absence selects in-process (local) mode
    pub redis_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            storage_dir: env::var("STORAGE_DIR").unwrap_or_else(|_| String::from("./storage")),
            redis_url: env::var("REDIS_URL").ok(),
        }
    }
}
