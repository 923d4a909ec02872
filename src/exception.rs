// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use thiserror::Error;

/// Represents all kind of errors which can occur while talking to the motion service or while
/// resolving transforms from the frame tree.
#[derive(Error, Debug)]
pub enum TfCheckException {
    /// NetworkException is thrown if a connection to the motion service cannot be established,
    /// when a timeout occurs or when a message could not be decoded.
    #[error("{message}")]
    NetworkException { message: String },

    /// IncompatibleVersionException is thrown if the motion bridge does not support this version
    /// of the protocol.
    #[error("Incompatible library version: Motion bridge has version {server_version:?} and naotf has {library_version:?}")]
    IncompatibleLibraryVersionError {
        /// Protocol version of the motion bridge.
        server_version: u16,
        /// naotf protocol version.
        library_version: u16,
    },

    /// CommandException is thrown if the motion service rejects a request.
    #[error("{message}")]
    CommandException { message: String },

    /// LookupException is thrown if a frame is not known to the transform buffer.
    #[error("{message}")]
    LookupException { message: String },

    /// ConnectivityException is thrown if two frames are not part of the same tree.
    #[error("{message}")]
    ConnectivityException { message: String },

    /// ExtrapolationException is thrown if a transform is requested for a time outside of the
    /// buffered history.
    #[error("{message}")]
    ExtrapolationException { message: String },

    /// TimeoutException is thrown if a transform did not become available within the wait budget.
    #[error("{message}")]
    TimeoutException { message: String },

    /// InvalidArgument is thrown for chain, space or frame arguments that cannot be used.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// IoException is thrown if the report cannot be written.
    #[error("{0}")]
    IoException(#[from] std::io::Error),
}

impl TfCheckException {
    /// true for all errors raised by the transform buffer or listener.
    pub fn is_tf_error(&self) -> bool {
        matches!(
            self,
            TfCheckException::LookupException { .. }
                | TfCheckException::ConnectivityException { .. }
                | TfCheckException::ExtrapolationException { .. }
                | TfCheckException::TimeoutException { .. }
        )
    }
}

/// creates a NetworkException from anything that can be displayed
pub(crate) fn create_network_exception<E: std::fmt::Display>(error: E) -> TfCheckException {
    TfCheckException::NetworkException {
        message: error.to_string(),
    }
}

/// Result type which can have TfCheckException as Error
pub type TfCheckResult<T> = Result<T, TfCheckException>;

#[cfg(test)]
mod tests {
    use crate::exception::TfCheckException;

    #[test]
    fn only_frame_tree_errors_are_tf_errors() {
        let lookup = TfCheckException::LookupException {
            message: "frame does not exist".to_string(),
        };
        let timeout = TfCheckException::TimeoutException {
            message: "timed out".to_string(),
        };
        let network = TfCheckException::NetworkException {
            message: "connection refused".to_string(),
        };
        assert!(lookup.is_tf_error());
        assert!(timeout.is_tf_error());
        assert!(!network.is_tf_error());
        assert_eq!(network.to_string(), "connection refused");
    }
}
