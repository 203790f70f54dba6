use std::io;

use thiserror::Error;

/// Errors that could occur while writing points.
#[derive(Debug, Error)]
pub enum Error {
    /// The destination scheme does not map to any known transport.
    #[error("unsupported destination scheme '{scheme}'")]
    UnsupportedScheme {
        /// The scheme of the destination.
        scheme: String,
    },

    /// Connecting to, or writing to, the destination failed.
    #[error("failed to write to '{destination}': {source}")]
    Transport {
        /// The destination that was written to.
        destination: String,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn transport<D>(destination: &D, source: io::Error) -> Self
    where
        D: ToString + ?Sized,
    {
        Error::Transport { destination: destination.to_string(), source }
    }

    /// Returns `true` if this error came from the transport rather than from the destination configuration.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}
