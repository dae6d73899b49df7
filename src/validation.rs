//! Input validation and sanitization for user-supplied content.
//!
//! Subjects and bodies arrive from the transport layer verbatim; everything
//! stored goes through here first so control characters never reach the
//! store and size limits hold regardless of which front end produced the
//! text. Truncation is UTF-8 safe (never splits a codepoint).

use thiserror::Error;

/// Hard caps, independent of configuration. Config may lower them.
pub const MAX_SUBJECT_BYTES: usize = 120;
pub const MAX_BODY_BYTES: usize = 65_536;
pub const MAX_CONFERENCE_NAME_BYTES: usize = 48;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("subject too long (max {max} bytes)")]
    SubjectTooLong { max: usize },

    #[error("message body is empty")]
    EmptyBody,

    #[error("message body too long (max {max} bytes)")]
    BodyTooLong { max: usize },

    #[error("conference name is empty")]
    EmptyName,

    #[error("conference name too long (max {max} bytes)")]
    NameTooLong { max: usize },

    #[error("conference name contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },
}

/// Truncate to at most `max_bytes` without splitting a codepoint.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn strip_control(s: &str, keep_newlines: bool) -> String {
    s.chars()
        .filter(|c| !c.is_control() || (keep_newlines && (*c == '\n' || *c == '\t')))
        .collect()
}

/// Clean a message subject: no control characters, trimmed, size-capped.
/// An empty subject is legal (replies often have none).
pub fn sanitize_subject(subject: &str) -> Result<String, ValidationError> {
    let cleaned = strip_control(subject, false);
    let trimmed = cleaned.trim();
    if trimmed.len() > MAX_SUBJECT_BYTES {
        return Err(ValidationError::SubjectTooLong {
            max: MAX_SUBJECT_BYTES,
        });
    }
    Ok(trimmed.to_string())
}

/// Clean a message body: newlines and tabs survive, other control characters
/// do not. Empty bodies are rejected, oversized ones refused rather than
/// silently truncated.
pub fn sanitize_body(body: &str) -> Result<String, ValidationError> {
    let cleaned = strip_control(&body.replace("\r\n", "\n"), true);
    if cleaned.trim().is_empty() {
        return Err(ValidationError::EmptyBody);
    }
    if cleaned.len() > MAX_BODY_BYTES {
        return Err(ValidationError::BodyTooLong {
            max: MAX_BODY_BYTES,
        });
    }
    Ok(cleaned)
}

/// Validate a conference name: ASCII alphanumerics plus `-`, `_` and `.`,
/// non-empty, size-capped. Returns the name unchanged on success.
pub fn validate_conference_name(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.len() > MAX_CONFERENCE_NAME_BYTES {
        return Err(ValidationError::NameTooLong {
            max: MAX_CONFERENCE_NAME_BYTES,
        });
    }
    let bad: String = name
        .chars()
        .filter(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .collect();
    if !bad.is_empty() {
        return Err(ValidationError::InvalidCharacters { chars: bad });
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo"; // 'é' is two bytes starting at index 1
        assert_eq!(truncate_utf8(s, 2), "h");
        assert_eq!(truncate_utf8(s, 3), "hé");
        assert_eq!(truncate_utf8(s, 100), s);
    }

    #[test]
    fn subject_strips_control_chars() {
        let cleaned = sanitize_subject("hello\x07 world\n").expect("valid");
        assert_eq!(cleaned, "hello world");
    }

    #[test]
    fn body_keeps_newlines_rejects_empty() {
        let cleaned = sanitize_body("line one\r\nline two").expect("valid");
        assert_eq!(cleaned, "line one\nline two");
        assert_eq!(sanitize_body("  \n "), Err(ValidationError::EmptyBody));
    }

    #[test]
    fn conference_names_are_restricted() {
        assert!(validate_conference_name("general-2").is_ok());
        assert!(matches!(
            validate_conference_name("no spaces"),
            Err(ValidationError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            validate_conference_name(""),
            Err(ValidationError::EmptyName)
        ));
    }
}
