use thiserror::Error;

/// Everything that can go wrong inside the engine.
///
/// Only the storage and I/O variants ever reach the binary; the remote
/// variants are turned into status lines by the engine and
/// `InputRejected` is swallowed.
#[derive(Debug, Error)]
pub enum Error {
    /// The persisted event log is not a JSON array.
    #[error("local event log is corrupt: {0}")]
    StorageCorrupt(String),

    /// Typed input is longer than the sentence being typed.
    #[error("input of {len} chars exceeds target of {target_len} chars")]
    InputRejected { len: usize, target_len: usize },

    /// No principal yet, or the remote call itself failed.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Anonymous sign-in was refused.
    #[error("anonymous sign-in failed: {0}")]
    AuthFailure(String),

    #[error("unknown sentence set: {0}")]
    UnknownSentenceSet(String),

    #[error("sentence set {0} has no usable sentences")]
    EmptySentenceSet(String),

    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short human text for the status line.
    pub fn status_text(&self) -> String {
        match self {
            Error::RemoteUnavailable(reason) | Error::AuthFailure(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_render_bare_reason() {
        let err = Error::RemoteUnavailable("no principal yet".into());
        assert_eq!(err.status_text(), "no principal yet");
        assert_eq!(err.to_string(), "remote unavailable: no principal yet");
    }

    #[test]
    fn input_rejected_mentions_both_lengths() {
        let err = Error::InputRejected {
            len: 5,
            target_len: 4,
        };
        assert_eq!(err.to_string(), "input of 5 chars exceeds target of 4 chars");
    }
}
