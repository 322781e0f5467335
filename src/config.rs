// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Length of a generated quiz access code.
pub const ACCESS_CODE_LENGTH: usize = 6;

/// Maximum number of collision retries before giving up on code generation.
pub const ACCESS_CODE_MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
        }
    }
}
