//! Change notifications for the router's routing subscriber

use crate::profile::ChangeEvent;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Failed to publish to {channel}: {message}")]
    Send { channel: String, message: String },
}

/// Best-effort sink for change events
pub trait EventPublisher {
    fn publish(&self, event: &ChangeEvent) -> Result<(), PublishError>;
}

/// Publishes events on a Redis channel through `redis-cli`
pub struct RedisCliPublisher {
    program: String,
    args: Vec<String>,
    channel: String,
}

impl RedisCliPublisher {
    pub fn new(channel: impl Into<String>) -> Self {
        Self::with_program("redis-cli", channel)
    }

    /// Use a different client binary (for testing)
    pub fn with_program(program: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            channel: channel.into(),
        }
    }

    /// Client options placed before `PUBLISH`, e.g. `-h 127.0.0.1 -p 6379`
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl EventPublisher for RedisCliPublisher {
    fn publish(&self, event: &ChangeEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        debug!("PUBLISH {} {}", self.channel, event.kind);

        let output = Command::new(&self.program)
            .args(&self.args)
            .args(["PUBLISH", &self.channel, &payload])
            .output()
            .map_err(|e| PublishError::Send {
                channel: self.channel.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(PublishError::Send {
                channel: self.channel.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
