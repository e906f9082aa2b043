// src/utils/html.rs

/// Sanitize HTML in authored content (question stems, options, explanations).
///
/// Whitelist-based: safe formatting tags like <b> and <p> survive, while
/// <script>, <iframe>, event-handler attributes and the like are stripped.
/// Question banks are often imported from third-party dumps, so everything
/// authored goes through here before it reaches the database.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
