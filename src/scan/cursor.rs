use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("malformed cursor {0:?}: expected a base-10 unsigned integer")]
    Malformed(String),
}

/// What to do with a cursor value that is not a base-10 `u64`.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CursorPolicy {
    /// Treat it as `0` and start over.
    #[default]
    Restart,
    /// Refuse the request.
    Reject,
}

/// Parse a caller-supplied cursor. Absent or empty input is always `0`.
pub fn parse_cursor(raw: Option<&str>, policy: CursorPolicy) -> Result<u64, CursorError> {
    let raw = match raw {
        None | Some("") => return Ok(0),
        Some(r) => r,
    };
    // `str::parse` tolerates a leading '+', the wire format does not
    let parsed = if raw.starts_with('+') { None } else { raw.parse::<u64>().ok() };
    match parsed {
        Some(c) => Ok(c),
        None => match policy {
            CursorPolicy::Restart => {
                tracing::debug!(cursor = raw, "malformed cursor, restarting scan");
                Ok(0)
            }
            CursorPolicy::Reject => Err(CursorError::Malformed(raw.to_string())),
        },
    }
}
