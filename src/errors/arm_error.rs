use std::time::Duration;

use thiserror::Error;

use crate::ConnectionState;

/// Every failure the crate can surface. Expected failure modes come back as
/// variants of this enum; panics are reserved for bugs.
#[derive(Error, Debug)]
pub enum ArmError {
    /// Initial TCP connect exhausted its retries. Fatal to the session.
    #[error("connection to {addr} failed after {attempts} attempts: {source}")]
    Connection {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// A call was made while the session was not in the `Connected` state.
    #[error("not connected to the controller (state: {0:?})")]
    NotConnected(ConnectionState),

    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    Protocol(String),

    /// No frame matching the command arrived within the configured bound.
    #[error("no response for `{command}` within {timeout:?}")]
    CorrelationTimeout { command: String, timeout: Duration },

    /// The inverse solver ran out of iterations or was pinned at a joint
    /// limit before reaching the target pose.
    #[error("inverse kinematics failed: {0}")]
    Kinematics(String),

    /// Bad argument caught at the facade; nothing was sent to the controller.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// An outbound frame could not be written or queued.
    #[error("failed to send `{command}`: {reason}")]
    Send { command: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
