use std::time::Duration;

use thiserror::Error;

/// Document-store operation error.
///
/// - **Timeout**: the call did not finish before its deadline
/// - **Db**: the store answered, but not in a way the protocol accepts
///   (e.g. zero documents modified)
/// - **Backend**: the driver itself failed (connection, encoding, poisoning)
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{context} --> Timed out in {} seconds.", .deadline.as_secs_f64())]
    Timeout { context: String, deadline: Duration },

    #[error("database error: {0}")]
    Db(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn db(msg: impl Into<String>) -> Self {
        Self::Db(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_context_and_deadline() {
        let err = StoreError::Timeout {
            context: "Timed out while retrieving job".to_string(),
            deadline: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "Timed out while retrieving job --> Timed out in 1.5 seconds."
        );
        assert!(err.is_timeout());
    }
}
