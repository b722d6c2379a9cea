//! Error taxonomy shared by the overlay core and its collaborators.
//!
//! Loading and initialisation paths return [`Result`] and let the caller
//! decide whether a failure is fatal (startup) or recoverable (hot reload
//! keeps the previous state). Steady-state animation and compositing never
//! produce errors.

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, OverlayError>;

#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    /// A pixel buffer or shared region could not be allocated.
    #[error("memory error: {0}")]
    Memory(String),

    /// An asset could not be read or decoded.
    #[error("file I/O error: {context}")]
    FileIo {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed geometry or an argument outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// The animation thread or the input capture process failed to start.
    #[error("thread error: {0}")]
    Thread(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("surface error: {0}")]
    Surface(String),
}

impl OverlayError {
    pub fn memory(msg: impl Into<String>) -> Self {
        Self::Memory(msg.into())
    }

    pub fn file_io(context: impl Into<String>) -> Self {
        Self::FileIo {
            context: context.into(),
            source: None,
        }
    }

    /// File error that keeps the underlying cause for `source()` chains.
    pub fn file_io_with(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::FileIo {
            context: format!("{}: {}", context.into(), source),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParam(msg.into())
    }

    pub fn thread(msg: impl Into<String>) -> Self {
        Self::Thread(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    /// Build an [`OverlayError::Input`] from the current `errno`.
    pub fn last_os_input(what: &str) -> Self {
        Self::Input(format!("{what}: {}", std::io::Error::last_os_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_prefixes_are_stable() {
        assert!(OverlayError::memory("x").to_string().starts_with("memory error:"));
        assert!(OverlayError::file_io("x").to_string().starts_with("file I/O error:"));
        assert!(
            OverlayError::invalid_param("x")
                .to_string()
                .starts_with("invalid parameter:")
        );
        assert!(OverlayError::thread("x").to_string().starts_with("thread error:"));
        assert!(OverlayError::config("x").to_string().starts_with("config error:"));
    }

    #[test]
    fn test_file_io_with_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = OverlayError::file_io_with("reading cat.png", base);
        assert!(err.to_string().contains("reading cat.png"));
        assert!(err.to_string().contains("boom"));
        assert!(err.source().is_some());
    }
}
