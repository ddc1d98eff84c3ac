use std::net::ToSocketAddrs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ArmError;

/// Connection and session parameters for one arm controller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArmDriverConfig {
    pub addr: String,
    pub port: u16,
    /// Initial connect attempts before giving up.
    pub connect_retries: u32,
    /// Fixed delay between connect attempts.
    pub retry_delay: Duration,
    /// Bound on every correlation wait.
    pub response_timeout: Duration,
    /// Depth of the outbound command queue.
    pub queue_depth: usize,
}

impl ArmDriverConfig {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self { addr: addr.into(), port, ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), ArmError> {
        if self.addr.is_empty() {
            return Err(ArmError::Validation("address cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(ArmError::Validation("port must be greater than 0".into()));
        }
        if self.connect_retries == 0 {
            return Err(ArmError::Validation("connect_retries must be at least 1".into()));
        }
        if self.queue_depth == 0 {
            return Err(ArmError::Validation("queue_depth must be greater than 0".into()));
        }
        if self.response_timeout.is_zero() {
            return Err(ArmError::Validation("response_timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn connection_url(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    /// Resolves the address to a socket address if possible.
    pub fn resolve(&self) -> Result<String, ArmError> {
        let url = self.connection_url();
        url.to_socket_addrs()
            .map_err(|_| ArmError::Validation(format!("invalid address `{url}`")))?
            .next()
            .map(|a| a.to_string())
            .ok_or_else(|| ArmError::Validation(format!("could not resolve `{url}`")))
    }
}

impl Default for ArmDriverConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1".to_string(),
            port: 1234,
            connect_retries: 3,
            retry_delay: Duration::from_millis(1000),
            response_timeout: Duration::from_secs(5),
            queue_depth: 100,
        }
    }
}
