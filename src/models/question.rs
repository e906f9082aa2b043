// src/models/question.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Represents the 'questions' table in the database.
///
/// `question_image` and `explanation_image` are the two independent image
/// slots. Each holds either NULL or the public URL path of exactly one
/// stored file (`/uploads/{slot_dir}/{filename}`); the files behind them are
/// owned by this question alone.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub exam_type_id: i64,
    pub subject_id: i64,

    /// The text content of the question stem.
    pub question_text: String,

    /// Image slot illustrating the stem.
    pub question_image: Option<String>,

    /// Question type, e.g. 'multiple_choice'.
    pub question_type: String,

    /// Option key (letter) to option text.
    /// Stored as a JSON object in the database.
    pub options: Option<Json<HashMap<String, String>>>,

    /// The correct answer key or content.
    pub correct_answer: String,

    /// Explanation shown after answering.
    pub explanation: Option<String>,

    /// Image slot illustrating the explanation.
    pub explanation_image: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Delivery form of a question: what a candidate sees during a test.
/// Excludes the correct answer and everything that would reveal it.
#[derive(Debug, Serialize)]
pub struct QuestionForTest {
    pub id: i64,
    pub question_text: String,
    pub question_image: Option<String>,
    pub question_type: String,
    pub options: Option<Json<HashMap<String, String>>>,
}

impl From<Question> for QuestionForTest {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            question_text: q.question_text,
            question_image: q.question_image,
            question_type: q.question_type,
            options: q.options,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub exam_type_id: i64,
    pub subject_id: i64,
    #[validate(length(min = 1, max = 5000, message = "Question text is required."))]
    pub question_text: String,
    #[validate(length(min = 1, max = 50))]
    #[serde(default = "default_question_type")]
    pub question_type: String,
    #[validate(custom(function = validate_options))]
    pub options: Option<HashMap<String, String>>,
    #[validate(length(min = 1, max = 500, message = "Correct answer is required."))]
    pub correct_answer: String,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
}

fn default_question_type() -> String {
    "multiple_choice".to_string()
}

/// DTO for bulk-creating questions. All-or-nothing.
#[derive(Debug, Deserialize, Validate)]
pub struct BulkCreateQuestionsRequest {
    #[validate(length(min = 1, message = "At least one question is required."))]
    #[validate(nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

/// DTO for partially updating a question.
/// The image slots are never touched here; they have their own endpoints.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 5000))]
    pub question_text: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub question_type: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Option<HashMap<String, String>>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer: Option<String>,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
}

fn validate_options(options: &HashMap<String, String>) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for (key, text) in options {
        if key.is_empty() || key.len() > 10 {
            return Err(validator::ValidationError::new("option_key_invalid"));
        }
        if text.len() > 1000 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
