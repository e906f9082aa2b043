// src/config.rs

use std::env;

use dotenvy::dotenv;

/// Runtime settings, materialized once at startup and carried in `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: i64,
    pub rust_log: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_email: String,
    pub upload: UploadConfig,
}

/// Settings for stored question/explanation images.
///
/// `root` is the on-disk directory; the two slot dirs are subdirectories of
/// it and also the second path segment of the public `/uploads/...` URLs.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub root: String,
    pub question_image_dir: String,
    pub explanation_image_dir: String,
    pub max_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_ALLOWED_EXTENSIONS: &str = "jpg,jpeg,png,gif,webp";
// Eight days, in seconds.
const DEFAULT_JWT_EXPIRATION: i64 = 60 * 60 * 24 * 8;

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_JWT_EXPIRATION);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8002);

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        let admin_username = env::var("ADMIN_USERNAME")
            .unwrap_or_else(|_| "admin".to_string());
        let admin_password = env::var("ADMIN_PASSWORD")
            .unwrap_or_else(|_| "admin123".to_string());
        let admin_email = env::var("ADMIN_EMAIL")
            .unwrap_or_else(|_| "admin@cbt.com".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            host,
            port,
            cors_origins,
            admin_username,
            admin_password,
            admin_email,
            upload: UploadConfig::from_env(),
        }
    }
}

impl UploadConfig {
    pub fn from_env() -> Self {
        let root = env::var("UPLOAD_ROOT")
            .unwrap_or_else(|_| "uploads".to_string());

        let question_image_dir = env::var("QUESTION_IMAGE_DIR")
            .unwrap_or_else(|_| "question_images".to_string());
        let explanation_image_dir = env::var("EXPLANATION_IMAGE_DIR")
            .unwrap_or_else(|_| "explanation_images".to_string());

        let max_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let allowed_extensions = env::var("ALLOWED_IMAGE_EXTENSIONS")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_EXTENSIONS.to_string())
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            root,
            question_image_dir,
            explanation_image_dir,
            max_bytes,
            allowed_extensions,
        }
    }
}
