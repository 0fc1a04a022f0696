//! Small text helpers shared by transcript parsing, prompts and the CLI

/// Collapse every run of whitespace to a single space and trim the ends
///
/// # Examples
///
/// ```
/// use ragpersona::text_utils::clean_text;
///
/// assert_eq!(clean_text("  hello \n\n  world\t"), "hello world");
/// ```
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_chars` characters, ending with "..." when cut
///
/// # Examples
///
/// ```
/// use ragpersona::text_utils::truncate_text;
///
/// assert_eq!(truncate_text("Wubba lubba dub dub", 10), "Wubba l...");
/// assert_eq!(truncate_text("short", 10), "short");
/// ```
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    const SUFFIX: &str = "...";

    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= SUFFIX.len() {
        return text.chars().take(max_chars).collect();
    }

    let mut truncated: String = text.chars().take(max_chars - SUFFIX.len()).collect();
    truncated.push_str(SUFFIX);
    truncated
}

/// Format a duration in whole seconds as `1h 2m 3s`, `2m 3s` or `3s`
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
