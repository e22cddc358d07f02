use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Memory access out of bounds at address {address:#x} (len {len})")]
    OutOfBounds { address: u64, len: usize },

    #[error("Address {address:#x} is already owned by another hook")]
    HookConflict { address: u64 },

    #[error("Hook handle refers to a removed hook")]
    StaleHandle,

    #[error("Command '{0}' is already registered")]
    CommandExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.is_not_found());

        let other = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!Error::Io(other).is_not_found());
    }
}
