use std::fmt;

use crate::utils::clean_for_logging;

/// A resource path failed to parse.
///
/// The caller-facing message is always the same; the triggering substring is
/// only written to the log, control-character-stripped, so request text can
/// never forge log lines or leak back out through error bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParseError;

impl PathParseError {
    pub(crate) fn log(path: &str, reason: &str) -> Self {
        log::error!(
            "Failed to parse path `{}`: {}",
            clean_for_logging(path),
            reason
        );
        PathParseError
    }
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path is not valid.")
    }
}

impl std::error::Error for PathParseError {}
