//! Whitelist-based sanitization of tool arguments and results.
//!
//! Raw tool payloads can contain document bodies, credentials, or user
//! data. Only whitelisted fields per tool reach `args_summary`; everything
//! else is redacted. Unknown tools redact everything.

use serde_json::Value;

/// Safe argument fields per tool. Empty slice: the tool has no safe args.
const TOOL_ARG_WHITELIST: &[(&str, &[&str])] = &[
    ("search_corpus", &["query"]),
    ("web_search", &["query"]),
    ("get_file_content", &["file_id"]),
    ("read_file", &["file_path"]),
    ("write_file", &["file_path"]),
    ("edit_file", &["file_path"]),
    ("ls", &[]),
    ("write_todos", &[]),
    ("task", &["subagent_type"]),
];

const MAX_ARG_LEN: usize = 100;
const MAX_ERROR_LEN: usize = 200;

fn whitelist_for(tool_name: &str) -> Option<&'static [&'static str]> {
    TOOL_ARG_WHITELIST
        .iter()
        .find(|(name, _)| *name == tool_name)
        .map(|(_, fields)| *fields)
}

/// Compact, safe summary of tool arguments for streaming.
pub fn sanitize_tool_args(tool_name: &str, args: &Value) -> String {
    let Some(whitelist) = whitelist_for(tool_name) else {
        tracing::warn!(tool = %tool_name, "no arg whitelist for tool, redacting");
        return "(redacted)".to_string();
    };
    if whitelist.is_empty() {
        return "(no args)".to_string();
    }

    let mut parts = Vec::new();
    if let Some(map) = args.as_object() {
        for key in whitelist {
            let Some(value) = map.get(*key) else { continue };
            match value {
                Value::String(s) => {
                    let shown = if s.chars().count() > MAX_ARG_LEN {
                        let truncated: String = s.chars().take(MAX_ARG_LEN - 3).collect();
                        format!("{truncated}...")
                    } else {
                        s.clone()
                    };
                    parts.push(format!("{key}='{shown}'"));
                }
                other => parts.push(format!("{key}={other}")),
            }
        }
    }

    if parts.is_empty() {
        "(no args)".to_string()
    } else {
        parts.join(", ")
    }
}

/// Safe one-line summary of a tool result.
pub fn sanitize_tool_result(tool_name: &str, result: &str) -> String {
    if result.starts_with("Error:") {
        return "Failed".to_string();
    }

    match tool_name {
        "search_corpus" | "web_search" => {
            // Extract counts from phrases like "Found 3 sections".
            let words: Vec<&str> = result.split_whitespace().collect();
            for (i, word) in words.iter().enumerate() {
                if matches!(word.to_lowercase().as_str(), "found" | "identified") {
                    if let Some(n) = words.get(i + 1).filter(|w| w.parse::<u64>().is_ok()) {
                        return format!("Found {n} results");
                    }
                }
            }
            "Completed search".to_string()
        }
        "read_file" | "get_file_content" => {
            let lines = result.lines().count();
            if lines > 1 {
                format!("Read {lines} lines")
            } else {
                format!("Read {} words", result.split_whitespace().count())
            }
        }
        "write_file" | "edit_file" => "Updated file".to_string(),
        "ls" => format!("Listed {} items", result.lines().count()),
        _ => "Completed".to_string(),
    }
}

/// Scrub an error message before it reaches the stream: drop paths, keep
/// only the first line, cap the length.
pub fn sanitize_error_message(error: &str) -> String {
    let first_line = error.lines().next().unwrap_or("");
    let scrubbed = match first_line.rsplit('/').next() {
        Some(tail) if first_line.contains('/') => tail,
        _ => first_line,
    };
    if scrubbed.chars().count() > MAX_ERROR_LEN {
        let truncated: String = scrubbed.chars().take(MAX_ERROR_LEN - 3).collect();
        format!("{truncated}...")
    } else {
        scrubbed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_whitelisted_field_only() {
        let args = json!({"query": "GDPR retention rules", "api_key": "secret"});
        let summary = sanitize_tool_args("web_search", &args);
        assert_eq!(summary, "query='GDPR retention rules'");
        assert!(!summary.contains("secret"));
    }

    #[test]
    fn test_args_unknown_tool_redacted() {
        let args = json!({"anything": "sensitive"});
        assert_eq!(sanitize_tool_args("mystery_tool", &args), "(redacted)");
    }

    #[test]
    fn test_args_empty_whitelist() {
        assert_eq!(sanitize_tool_args("write_todos", &json!({"todos": []})), "(no args)");
    }

    #[test]
    fn test_args_long_string_truncated() {
        let long = "x".repeat(300);
        let args = json!({ "query": long });
        let summary = sanitize_tool_args("web_search", &args);
        assert!(summary.ends_with("...'"));
        assert!(summary.len() < 120);
    }

    #[test]
    fn test_result_error_marker() {
        assert_eq!(sanitize_tool_result("read_file", "Error: no such file"), "Failed");
    }

    #[test]
    fn test_result_search_count() {
        assert_eq!(
            sanitize_tool_result("search_corpus", "Found 3 relevant sections"),
            "Found 3 results"
        );
    }

    #[test]
    fn test_result_read_lines() {
        assert_eq!(sanitize_tool_result("read_file", "a\nb\nc"), "Read 3 lines");
    }

    #[test]
    fn test_error_message_scrubbed() {
        let scrubbed = sanitize_error_message("/home/user/secret/config.toml: parse failure\nstack frame 1\nstack frame 2");
        assert!(!scrubbed.contains("/home"));
        assert!(!scrubbed.contains("stack frame"));
        assert!(scrubbed.contains("config.toml"));
    }

    #[test]
    fn test_error_message_capped() {
        let long = "e".repeat(500);
        assert_eq!(sanitize_error_message(&long).chars().count(), MAX_ERROR_LEN);
    }
}
