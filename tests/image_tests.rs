// tests/image_tests.rs
//
// End-to-end coverage of the question image lifecycle: upload, replace,
// delete, cascade cleanup on question deletion, and public serving.

use cbt_backend::{
    config::{Config, UploadConfig},
    images::ImageManager,
    routes,
    state::AppState,
    storage::LocalFileStore,
    utils::hash::hash_password,
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::PathBuf;
use std::sync::Arc;

struct TestApp {
    address: String,
    pool: SqlitePool,
    upload_root: PathBuf,
    _tmp: tempfile::TempDir,
}

/// Spawns the app with a private database and upload root. The upload size
/// limit is shrunk to 1 KiB so the limit tests stay cheap.
async fn spawn_app() -> TestApp {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = tmp.path().join("test.db");
    let upload_root = tmp.path().join("uploads");

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to open test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let hashed = hash_password("admin123").expect("Failed to hash admin password");
    sqlx::query(
        r#"
        INSERT INTO users (username, email, hashed_password, full_name, role, is_active, created_at)
        VALUES ('admin', 'admin@cbt.com', ?, 'System Administrator', 'admin', 1, ?)
        "#,
    )
    .bind(&hashed)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .expect("Failed to seed admin user");

    let config = Config {
        database_url: format!("sqlite://{}", db_path.display()),
        jwt_secret: "image_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        admin_username: "admin".to_string(),
        admin_password: "admin123".to_string(),
        admin_email: "admin@cbt.com".to_string(),
        upload: UploadConfig {
            root: upload_root.display().to_string(),
            question_image_dir: "question_images".to_string(),
            explanation_image_dir: "explanation_images".to_string(),
            max_bytes: 1024,
            allowed_extensions: ["jpg", "jpeg", "png", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        },
    };

    let store = Arc::new(LocalFileStore::new(&config.upload.root));
    let images = ImageManager::new(pool.clone(), store, config.upload.clone());

    let state = AppState {
        pool: pool.clone(),
        config,
        images,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        upload_root,
        _tmp: tmp,
    }
}

async fn login(client: &reqwest::Client, address: &str, username: &str, password: &str) -> String {
    let body = client
        .post(&format!("{}/api/v1/users/login", address))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .expect("Login request failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    body["access_token"]
        .as_str()
        .expect("Token not found")
        .to_string()
}

async fn register_student(client: &reqwest::Client, address: &str, username: &str) -> String {
    let response = client
        .post(&format!("{}/api/v1/users/register", address))
        .json(&serde_json::json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "password123",
            "full_name": "Test Student"
        }))
        .send()
        .await
        .expect("Register request failed");
    assert_eq!(response.status().as_u16(), 201);

    login(client, address, username, "password123").await
}

/// Seeds an exam type, a subject and one question; returns the question id.
async fn seed_question(pool: &SqlitePool) -> i64 {
    let exam_type_id = sqlx::query("INSERT INTO exam_types (name) VALUES ('WAEC')")
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();

    let subject_id = sqlx::query("INSERT INTO subjects (name) VALUES ('Mathematics')")
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();

    sqlx::query(
        r#"
        INSERT INTO questions
        (exam_type_id, subject_id, question_text, options, correct_answer, explanation)
        VALUES (?, ?, 'What is shown in the diagram?', ?, 'A', 'See the figure.')
        "#,
    )
    .bind(exam_type_id)
    .bind(subject_id)
    .bind(serde_json::json!({"A": "A circle", "B": "A square"}).to_string())
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

/// POSTs a multipart upload to one of the two image endpoints.
async fn upload(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    question_id: i64,
    endpoint: &str,
    filename: &str,
    data: &[u8],
) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name(filename.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);

    client
        .post(&format!(
            "{}/api/v1/questions/{}/{}",
            address, question_id, endpoint
        ))
        .header("Authorization", format!("Bearer {}", token))
        .multipart(form)
        .send()
        .await
        .expect("Upload request failed")
}

/// Maps a public `/uploads/...` reference to its on-disk location.
fn stored_file(app: &TestApp, reference: &str) -> PathBuf {
    let relative = reference
        .strip_prefix("/uploads/")
        .expect("reference must live under /uploads/");
    app.upload_root.join(relative)
}

fn files_in(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn upload_and_serve_roundtrip() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &app.address, "admin", "admin123").await;
    let question_id = seed_question(&app.pool).await;
    let data = b"png bytes for the diagram";

    // 1. Upload
    let response = upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-question-image",
        "diagram.png",
        data,
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let question: serde_json::Value = response.json().await.unwrap();
    let reference = question["question_image"].as_str().unwrap().to_string();
    assert!(
        reference.starts_with("/uploads/question_images/"),
        "unexpected reference: {}",
        reference
    );
    assert!(reference.ends_with(".png"));
    // The stored name is generated, never taken from the client.
    assert!(!reference.contains("diagram"));

    // 2. The bytes landed under the upload root
    let on_disk = stored_file(&app, &reference);
    assert_eq!(std::fs::read(&on_disk).unwrap(), data);

    // 3. The record points at the reference
    let stored: Option<String> =
        sqlx::query_scalar("SELECT question_image FROM questions WHERE id = ?")
            .bind(question_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(stored.as_deref(), Some(reference.as_str()));

    // 4. The public URL serves the bytes with the right headers
    let served = client
        .get(&format!("{}{}", app.address, reference))
        .send()
        .await
        .unwrap();
    assert_eq!(served.status().as_u16(), 200);
    assert_eq!(
        served.headers().get("content-type").unwrap().to_str().unwrap(),
        "image/png"
    );
    let cache = served
        .headers()
        .get("cache-control")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cache.contains("max-age=31536000"), "cache header: {}", cache);
    assert_eq!(served.bytes().await.unwrap().as_ref(), data);
}

#[tokio::test]
async fn replacing_an_image_releases_the_old_file() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &app.address, "admin", "admin123").await;
    let question_id = seed_question(&app.pool).await;

    // 1. First upload
    let first: serde_json::Value = upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-question-image",
        "first.png",
        b"the first image",
    )
    .await
    .json()
    .await
    .unwrap();
    let old_reference = first["question_image"].as_str().unwrap().to_string();
    let old_file = stored_file(&app, &old_reference);
    assert!(old_file.exists());

    // 2. Replace it with a different format
    let second: serde_json::Value = upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-question-image",
        "second.jpg",
        b"the replacement image",
    )
    .await
    .json()
    .await
    .unwrap();
    let new_reference = second["question_image"].as_str().unwrap().to_string();
    assert_ne!(new_reference, old_reference);
    assert!(new_reference.ends_with(".jpg"));

    // 3. The old file is gone; exactly one remains
    assert!(!old_file.exists(), "old file must be cleaned up");
    assert!(stored_file(&app, &new_reference).exists());
    assert_eq!(files_in(&app.upload_root.join("question_images")), 1);

    // 4. The old URL 404s, the new one serves
    let response = client
        .get(&format!("{}{}", app.address, old_reference))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = client
        .get(&format!("{}{}", app.address, new_reference))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap().to_str().unwrap(),
        "image/jpeg"
    );
}

#[tokio::test]
async fn deleting_an_image_clears_slot_and_file() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &app.address, "admin", "admin123").await;
    let question_id = seed_question(&app.pool).await;

    let uploaded: serde_json::Value = upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-question-image",
        "todelete.png",
        b"short-lived image",
    )
    .await
    .json()
    .await
    .unwrap();
    let reference = uploaded["question_image"].as_str().unwrap().to_string();

    // Act
    let response = client
        .delete(&format!(
            "{}/api/v1/questions/{}/question-image",
            app.address, question_id
        ))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Question image deleted successfully");

    let question: serde_json::Value = client
        .get(&format!("{}/api/v1/questions/{}", app.address, question_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(question["question_image"].is_null());

    assert!(!stored_file(&app, &reference).exists());
    assert_eq!(files_in(&app.upload_root.join("question_images")), 0);

    // Deleting an empty slot is 404
    let response = client
        .delete(&format!(
            "{}/api/v1/questions/{}/question-image",
            app.address, question_id
        ))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn question_and_explanation_slots_are_independent() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &app.address, "admin", "admin123").await;
    let question_id = seed_question(&app.pool).await;

    // 1. Fill both slots
    upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-question-image",
        "stem.png",
        b"stem image",
    )
    .await;
    let question: serde_json::Value = upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-explanation-image",
        "workings.png",
        b"explanation image",
    )
    .await
    .json()
    .await
    .unwrap();

    let question_ref = question["question_image"].as_str().unwrap().to_string();
    let explanation_ref = question["explanation_image"].as_str().unwrap().to_string();
    assert!(explanation_ref.starts_with("/uploads/explanation_images/"));
    assert_ne!(question_ref, explanation_ref);

    // 2. Clearing one slot leaves the other alone
    let response = client
        .delete(&format!(
            "{}/api/v1/questions/{}/question-image",
            app.address, question_id
        ))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let question: serde_json::Value = client
        .get(&format!("{}/api/v1/questions/{}", app.address, question_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(question["question_image"].is_null());
    assert_eq!(question["explanation_image"], explanation_ref.as_str());

    assert!(stored_file(&app, &explanation_ref).exists());
    let response = client
        .get(&format!("{}{}", app.address, explanation_ref))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn rejects_unsupported_extensions() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &app.address, "admin", "admin123").await;
    let question_id = seed_question(&app.pool).await;

    // Act: a disallowed extension, then a missing one
    for filename in ["payload.exe", "noextension"] {
        let response = upload(
            &client,
            &app.address,
            &admin_token,
            question_id,
            "upload-question-image",
            filename,
            b"whatever",
        )
        .await;
        assert_eq!(response.status().as_u16(), 415, "accepted {}", filename);
    }

    // Assert: nothing stored, slot untouched
    let stored: Option<String> =
        sqlx::query_scalar("SELECT question_image FROM questions WHERE id = ?")
            .bind(question_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert!(stored.is_none());
    assert_eq!(files_in(&app.upload_root.join("question_images")), 0);
}

#[tokio::test]
async fn enforces_the_size_limit() {
    // Arrange: the test config caps uploads at 1024 bytes
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &app.address, "admin", "admin123").await;
    let question_id = seed_question(&app.pool).await;

    // 1. Exactly at the limit is accepted
    let at_limit = vec![0xAB; 1024];
    let response = upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-question-image",
        "full.png",
        &at_limit,
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);
    let question: serde_json::Value = response.json().await.unwrap();
    let reference = question["question_image"].as_str().unwrap().to_string();

    // 2. One byte over is rejected and changes nothing
    let over_limit = vec![0xCD; 1025];
    let response = upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-question-image",
        "toobig.png",
        &over_limit,
    )
    .await;
    assert_eq!(response.status().as_u16(), 413);

    let stored: Option<String> =
        sqlx::query_scalar("SELECT question_image FROM questions WHERE id = ?")
            .bind(question_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(stored.as_deref(), Some(reference.as_str()));
    assert!(stored_file(&app, &reference).exists());
    assert_eq!(files_in(&app.upload_root.join("question_images")), 1);
}

#[tokio::test]
async fn serve_rejects_traversal_and_unknown_paths() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Encoded dot-dot and slash tricks, unknown directories, missing files:
    // all indistinguishable 404s.
    let paths = [
        "/uploads/question_images/%2E%2E",
        "/uploads/question_images/..%2F..%2Fsecret.png",
        "/uploads/question_images/%2e%2e%5c%2e%2e%5csecret.png",
        "/uploads/avatars/whatever.png",
        "/uploads/question_images/no-such-file.png",
    ];

    for path in paths {
        let response = client
            .get(&format!("{}{}", app.address, path))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 404, "leaked: {}", path);
    }
}

#[tokio::test]
async fn deleting_a_question_cascades_to_its_files() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &app.address, "admin", "admin123").await;
    let question_id = seed_question(&app.pool).await;

    upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-question-image",
        "stem.png",
        b"stem image",
    )
    .await;
    let question: serde_json::Value = upload(
        &client,
        &app.address,
        &admin_token,
        question_id,
        "upload-explanation-image",
        "workings.jpg",
        b"explanation image",
    )
    .await
    .json()
    .await
    .unwrap();
    let question_ref = question["question_image"].as_str().unwrap().to_string();
    let explanation_ref = question["explanation_image"].as_str().unwrap().to_string();

    // Act
    let response = client
        .delete(&format!("{}/api/v1/questions/{}", app.address, question_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 204);

    let response = client
        .get(&format!("{}/api/v1/questions/{}", app.address, question_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    assert_eq!(files_in(&app.upload_root.join("question_images")), 0);
    assert_eq!(files_in(&app.upload_root.join("explanation_images")), 0);

    let response = client
        .get(&format!("{}{}", app.address, question_ref))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let response = client
        .get(&format!("{}{}", app.address, explanation_ref))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn uploads_are_admin_only() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let question_id = seed_question(&app.pool).await;
    let student_token = register_student(&client, &app.address, "sneaky").await;

    // No token
    let part = reqwest::multipart::Part::bytes(b"data".to_vec()).file_name("x.png");
    let form = reqwest::multipart::Form::new().part("file", part);
    let response = client
        .post(&format!(
            "{}/api/v1/questions/{}/upload-question-image",
            app.address, question_id
        ))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Student token
    let response = upload(
        &client,
        &app.address,
        &student_token,
        question_id,
        "upload-question-image",
        "x.png",
        b"data",
    )
    .await;
    assert_eq!(response.status().as_u16(), 403);

    // Nothing was written either way
    assert_eq!(files_in(&app.upload_root.join("question_images")), 0);
}

#[tokio::test]
async fn upload_to_missing_question_leaves_no_orphan() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &app.address, "admin", "admin123").await;

    // Act
    let response = upload(
        &client,
        &app.address,
        &admin_token,
        9999,
        "upload-question-image",
        "ghost.png",
        b"orphan bytes",
    )
    .await;

    // Assert
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(files_in(&app.upload_root.join("question_images")), 0);
}
