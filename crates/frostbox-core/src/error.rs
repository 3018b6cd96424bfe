use thiserror::Error;

pub type FbResult<T> = Result<T, FbError>;

/// Error taxonomy for the vault and per-object cryptography subsystem.
///
/// None of these are retried internally; every one surfaces to the
/// top-level caller, which wipes all live secure buffers before reporting
/// failure. `Auth` deliberately does not distinguish a wrong password from
/// tampered data — the two are cryptographically indistinguishable and
/// keeping them merged avoids an oracle.
#[derive(Debug, Error)]
pub enum FbError {
    #[error("secure memory unavailable: {0}")]
    Resource(String),

    #[error("malformed data: {0}")]
    Format(String),

    #[error("authentication failed: wrong password or corrupted data")]
    Auth,

    #[error("object does not belong to frostbox: {0}")]
    Foreign(String),

    #[error("stream framing violated: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FbError {
    /// Recover a typed error that was tunneled through `std::io::Error`.
    ///
    /// The streaming envelope types implement `std::io::Read`/`Write`, so
    /// their `Auth`/`Format`/`Integrity` failures travel wrapped in an
    /// `io::Error`. This unwraps them back into the taxonomy; a plain I/O
    /// failure stays `Io`.
    pub fn from_io(err: std::io::Error) -> Self {
        let is_fb = err.get_ref().map(|e| e.is::<FbError>()).unwrap_or(false);
        if is_fb {
            if let Some(inner) = err.into_inner() {
                if let Ok(fb) = inner.downcast::<FbError>() {
                    return *fb;
                }
            }
            // downcast cannot fail after the is::<FbError>() check
            FbError::Integrity("lost typed error while unwrapping".into())
        } else {
            FbError::Io(err)
        }
    }

    /// Tunnel this error through an `std::io::Error` boundary.
    pub fn into_io(self) -> std::io::Error {
        match self {
            FbError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
