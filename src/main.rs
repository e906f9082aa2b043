// src/main.rs

use cbt_backend::config::Config;
use cbt_backend::images::ImageManager;
use cbt_backend::routes;
use cbt_backend::state::AppState;
use cbt_backend::storage::LocalFileStore;
use cbt_backend::utils::hash::hash_password;
use dotenvy::dotenv;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .expect("DATABASE_URL is not a valid SQLite connection string")
        .create_if_missing(true)
        .foreign_keys(true);

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(connect_options.clone())
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {})",
                    retry_count
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    // Seed Admin User
    if let Err(e) = seed_admin_user(&pool, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    // Seed Default Exam Types
    if let Err(e) = seed_exam_types(&pool).await {
        tracing::error!("Failed to seed exam types: {:?}", e);
    }

    let store = Arc::new(LocalFileStore::new(&config.upload.root));
    let images = ImageManager::new(pool.clone(), store, config.upload.clone());

    // Create AppState
    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        images,
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    // Start the server
    axum::serve(listener, app).await.unwrap();
}

/// Creates the bootstrap admin account unless the username is already taken.
async fn seed_admin_user(
    pool: &SqlitePool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ?")
        .bind(&config.admin_username)
        .fetch_optional(pool)
        .await?;

    if existing.is_none() {
        tracing::info!("Seeding admin user: {}", config.admin_username);
        let hashed_password = hash_password(&config.admin_password)?;

        sqlx::query(
            r#"
            INSERT INTO users (username, email, hashed_password, full_name, role, is_active, created_at)
            VALUES (?, ?, ?, 'System Administrator', 'admin', 1, ?)
            "#,
        )
        .bind(&config.admin_username)
        .bind(&config.admin_email)
        .bind(&hashed_password)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await?;
        tracing::info!("Admin user created successfully.");
    }
    Ok(())
}

/// Inserts the default examination bodies on first start.
async fn seed_exam_types(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    for name in ["NECO", "WAEC", "JAMB", "NABTEB"] {
        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM exam_types WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;

        if existing.is_none() {
            sqlx::query("INSERT INTO exam_types (name, description, created_at) VALUES (?, ?, ?)")
                .bind(name)
                .bind(format!("{} examination", name))
                .bind(chrono::Utc::now())
                .execute(pool)
                .await?;
            tracing::info!("Seeded exam type: {}", name);
        }
    }
    Ok(())
}
