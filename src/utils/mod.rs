//! Small helpers shared across modules.

/// Maximum number of characters of untrusted input echoed into log messages.
const LOG_SNIPPET_MAX: usize = 200;

/// Strip control characters from untrusted request text before logging.
///
/// Log output must never contain raw newlines or terminal escapes coming from
/// a request, otherwise a crafted path can forge log lines. The result is
/// also truncated to a fixed length.
pub fn clean_for_logging(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .take(LOG_SNIPPET_MAX)
        .collect();
    if text.chars().count() > LOG_SNIPPET_MAX {
        format!("{cleaned}...")
    } else {
        cleaned
    }
}

/// Quote a SQL identifier (table or column name) with double quotes.
///
/// Identifiers come from the registry, never from request input, but quoting
/// keeps mixed-case names working on stores that fold unquoted identifiers.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
