//! Input normalisation for questions, answers and replies.
//!
//! Everything here runs before any store call.

use std::collections::HashSet;

use uuid::Uuid;

use domains::errors::{DomainError, Result};
use domains::models::{QuestionCategory, TargetType};

pub const MAX_TAGS: usize = 3;
pub const MIN_TAG_CHARS: usize = 2;
pub const MAX_TAG_CHARS: usize = 24;
pub const MAX_IMAGES_PER_POST: usize = 4;
pub const MAX_IMAGE_PATH_CHARS: usize = 512;
pub const MAX_REPLY_CHARS: usize = 1000;

fn invalid(msg: impl Into<String>) -> DomainError {
    DomainError::InvalidInput(msg.into())
}

/// Lowercases, joins inner whitespace with `-`, drops out-of-range tags,
/// dedupes and keeps at most [`MAX_TAGS`].
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for raw in tags {
        let tag = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();
        let len = tag.chars().count();
        if !(MIN_TAG_CHARS..=MAX_TAG_CHARS).contains(&len) {
            continue;
        }
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
        if out.len() >= MAX_TAGS {
            break;
        }
    }
    out
}

/// Storage-relative object paths. Absolute paths and `..` are rejected.
pub fn normalize_image_paths(paths: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for raw in paths {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if value.chars().count() > MAX_IMAGE_PATH_CHARS
            || value.starts_with('/')
            || value.contains("..")
        {
            return Err(invalid("Invalid image path."));
        }
        if seen.insert(value.to_string()) {
            out.push(value.to_string());
        }
    }

    if out.len() > MAX_IMAGES_PER_POST {
        return Err(invalid(format!(
            "You can attach up to {MAX_IMAGES_PER_POST} images."
        )));
    }
    Ok(out)
}

pub fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| invalid(format!("Invalid {what} ID.")))
}

pub fn parse_target_type(raw: &str) -> Result<TargetType> {
    raw.trim()
        .parse()
        .map_err(|_| invalid("Invalid target type."))
}

pub fn parse_category(raw: &str) -> Result<QuestionCategory> {
    raw.trim()
        .parse()
        .map_err(|_| invalid("Invalid question category."))
}

/// Trimmed, non-empty text. `field` names it in the error message.
pub fn required_text(raw: &str, field: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("{field} cannot be empty.")));
    }
    Ok(trimmed.to_string())
}

pub fn reply_body(raw: &str) -> Result<String> {
    let body = required_text(raw, "Reply body")?;
    if body.chars().count() > MAX_REPLY_CHARS {
        return Err(invalid(format!(
            "Reply must be under {MAX_REPLY_CHARS} characters."
        )));
    }
    Ok(body)
}
