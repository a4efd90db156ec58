//! Small utility helpers used across modules.

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) { end -= 1; }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

/// Actual output that looks like JSON is re-serialized compactly; anything else is shown as is.
pub fn display_output(raw: &str) -> String {
  let t = raw.trim();
  if t.starts_with('[') || t.starts_with('{') {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(t) {
      return v.to_string();
    }
  }
  raw.to_string()
}

/// `m:ss`, as the challenge timer shows it.
pub fn format_mmss(total_secs: u64) -> String {
  format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// "advanced" -> "Advanced".
pub fn capitalize_first(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}
