//! Log sanitization helpers: chat lines and message subjects carry arbitrary
//! user text, so anything interpolated into a log line goes through here to
//! stay single-line and bounded.

/// Default preview cap for [`escape_log`].
const DEFAULT_PREVIEW: usize = 200;

/// Escape a string for single-line logging with the default preview cap.
pub fn escape_log(s: &str) -> String {
    escape_log_capped(s, DEFAULT_PREVIEW)
}

/// Escape a string for single-line logging:
/// newline, carriage return and tab become their two-character escapes,
/// backslash doubles, and any other control character is rendered as
/// `\u{..}`. Input longer than `max_chars` is cut with an ellipsis.
pub fn escape_log_capped(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 8);
    let mut count = 0usize;
    for ch in s.chars() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        count += 1;
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{{{:02x}}}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
