use uuid::Uuid;

/// Error taxonomy for the engine.
///
/// `Validation` and `NotFound` are surfaced straight to the caller.
/// `RemoteUnavailable` is caught inside the scheduler loops, logged, and
/// retried on the next cycle; it never stops a scheduler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("remote endpoint unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::RemoteUnavailable(format!("request timed out: {err}"))
        } else {
            Error::RemoteUnavailable(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_includes_id() {
        let id = Uuid::new_v4();
        let err = Error::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_validation_message() {
        let err = Error::Validation("quantity must be positive".to_string());
        assert_eq!(err.to_string(), "invalid input: quantity must be positive");
    }
}
