// src/images.rs
//
// Lifecycle of images attached to questions: upload, replace, clear,
// cascade cleanup, and public serving. All path conventions live here;
// handlers and the storage backend never compose image paths themselves.

use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::AppError;
use crate::models::question::Question;
use crate::storage::FileStore;

/// The public URL prefix under which stored images are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// The two image slots of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Question,
    Explanation,
}

impl ImageSlot {
    /// Database column backing this slot. Fixed identifiers, never input.
    fn column(self) -> &'static str {
        match self {
            ImageSlot::Question => "question_image",
            ImageSlot::Explanation => "explanation_image",
        }
    }

    fn dir(self, config: &UploadConfig) -> &str {
        match self {
            ImageSlot::Question => &config.question_image_dir,
            ImageSlot::Explanation => &config.explanation_image_dir,
        }
    }

    fn current(self, question: &Question) -> Option<&str> {
        match self {
            ImageSlot::Question => question.question_image.as_deref(),
            ImageSlot::Explanation => question.explanation_image.as_deref(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            ImageSlot::Question => "question image",
            ImageSlot::Explanation => "explanation image",
        }
    }
}

/// Owns the attachment lifecycle for question images.
///
/// Invariants upheld here:
/// - a non-empty slot always references a file that exists (file writes
///   precede record links; record unlinks precede file deletes);
/// - stored filenames are freshly generated per upload, so no two slots
///   ever share a file;
/// - replacing or clearing a slot releases the old file, best-effort.
#[derive(Clone)]
pub struct ImageManager {
    pool: SqlitePool,
    store: Arc<dyn FileStore>,
    config: UploadConfig,
}

impl ImageManager {
    pub fn new(pool: SqlitePool, store: Arc<dyn FileStore>, config: UploadConfig) -> Self {
        Self { pool, store, config }
    }

    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    /// Store an uploaded image into a slot, replacing any previous one.
    ///
    /// Ordering is load-bearing: validate, write the new file, link the
    /// record, then unlink the old file. A failure at any step leaves the
    /// slot either untouched or fully switched, never dangling.
    pub async fn attach(
        &self,
        question_id: i64,
        slot: ImageSlot,
        declared_filename: &str,
        data: &[u8],
    ) -> Result<Question, AppError> {
        let ext = validated_extension(declared_filename, &self.config.allowed_extensions)?;
        if data.len() > self.config.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the maximum size of {} bytes",
                self.config.max_bytes
            )));
        }

        let question = self.fetch(question_id).await?;
        let old_reference = slot.current(&question).map(str::to_string);

        // Fresh name per upload; never derived from the client filename.
        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        let dir = slot.dir(&self.config);
        self.store.write(&format!("{dir}/{filename}"), data).await?;

        let reference = format!("{PUBLIC_PREFIX}/{dir}/{filename}");
        let sql = format!("UPDATE questions SET {} = ? WHERE id = ?", slot.column());
        let result = sqlx::query(&sql)
            .bind(&reference)
            .bind(question_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            // The question was deleted while we were writing. Drop the
            // orphan; the record never pointed at it.
            self.discard_reference(&reference).await;
            return Err(AppError::NotFound("Question not found".to_string()));
        }

        if let Some(old) = old_reference {
            self.discard_reference(&old).await;
        }

        self.fetch(question_id).await
    }

    /// Clear a slot and release its file. NotFound when the slot is empty.
    pub async fn detach(&self, question_id: i64, slot: ImageSlot) -> Result<(), AppError> {
        let question = self.fetch(question_id).await?;
        let Some(old) = slot.current(&question).map(str::to_string) else {
            return Err(AppError::NotFound(format!(
                "Question has no {} to delete",
                slot.label()
            )));
        };

        let sql = format!("UPDATE questions SET {} = NULL WHERE id = ?", slot.column());
        sqlx::query(&sql)
            .bind(question_id)
            .execute(&self.pool)
            .await?;

        // Record first, file second: a crash in between orphans a file on
        // disk but never leaves a reference to a missing one.
        self.discard_reference(&old).await;
        Ok(())
    }

    /// Release the files behind both slots after their question row is
    /// gone. Best-effort by contract.
    pub async fn discard_attachments(&self, question: &Question) {
        for slot in [ImageSlot::Question, ImageSlot::Explanation] {
            if let Some(reference) = slot.current(question) {
                self.discard_reference(reference).await;
            }
        }
    }

    /// Resolve a public `/uploads/{dir}/{filename}` request and return the
    /// bytes with their content type. Unknown directories and names that
    /// could escape them are NotFound, indistinguishable from missing
    /// files.
    pub async fn open(&self, dir: &str, filename: &str) -> Result<(Vec<u8>, &'static str), AppError> {
        if dir != self.config.question_image_dir && dir != self.config.explanation_image_dir {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        reject_traversal(filename)?;

        let data = self.store.read(&format!("{dir}/{filename}")).await?;
        Ok((data, content_type_for(filename)))
    }

    async fn fetch(&self, question_id: i64) -> Result<Question, AppError> {
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
    }

    /// Delete the stored file behind a slot reference. Failures are logged
    /// and swallowed; cleanup never fails an already-committed operation.
    async fn discard_reference(&self, reference: &str) {
        let Some(relative) = self.storage_path_of(reference) else {
            tracing::warn!(reference = %reference, "skipping cleanup of unrecognized image reference");
            return;
        };
        if let Err(e) = self.store.delete(&relative).await {
            tracing::warn!(reference = %reference, error = %e, "failed to remove stored image");
        }
    }

    /// Map a stored public path back to its storage-relative path, if it
    /// parses as one of ours.
    fn storage_path_of(&self, reference: &str) -> Option<String> {
        let rest = reference.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        let (dir, filename) = rest.split_once('/')?;
        if dir != self.config.question_image_dir && dir != self.config.explanation_image_dir {
            return None;
        }
        reject_traversal(filename).ok()?;
        Some(format!("{dir}/{filename}"))
    }
}

/// Extract and check the extension of a client-declared filename.
fn validated_extension(declared: &str, allowed: &[String]) -> Result<String, AppError> {
    let ext = declared
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            AppError::UnsupportedMediaType("File has no extension".to_string())
        })?;

    if !allowed.iter().any(|a| a == &ext) {
        return Err(AppError::UnsupportedMediaType(format!(
            "File type '.{ext}' is not allowed"
        )));
    }
    Ok(ext)
}

/// Reject any name that could resolve outside its slot directory.
fn reject_traversal(filename: &str) -> Result<(), AppError> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(AppError::NotFound("File not found".to_string()));
    }
    Ok(())
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
