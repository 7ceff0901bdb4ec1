//! OTP delivery channels and the notifier seam.
//!
//! Transport (SMTP, an SMS gateway) is outside this crate. The OTP manager
//! only needs something that accepts `(identifier, code, channel)` and
//! either delivers or fails. A failed delivery is logged by the caller and
//! never rolls back an issued code.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Delivery channel for an OTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Phone,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Phone => "phone",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unsupported channel: {0}")]
pub struct UnsupportedChannel(pub String);

impl FromStr for Channel {
    type Err = UnsupportedChannel;

    /// Case-insensitive. `sms` is accepted as an alias for `phone`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "phone" | "sms" => Ok(Channel::Phone),
            other => Err(UnsupportedChannel(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Delivers a plaintext OTP to its identifier.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, identifier: &str, code: &str, channel: Channel) -> Result<(), NotifyError>;
}

/// Development notifier: writes the code to the log at debug level.
///
/// Never use it where debug logs leave the machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, identifier: &str, code: &str, channel: Channel) -> Result<(), NotifyError> {
        tracing::debug!(%channel, identifier, code, "OTP delivery (log notifier)");
        Ok(())
    }
}

/// A delivery captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub identifier: String,
    pub code: String,
    pub channel: Channel,
}

/// Keeps every delivery in memory. Tests read codes back out of it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentCode>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records and then reports failure.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().clone()
    }

    /// The most recent code sent to `identifier`.
    pub fn last_code_for(&self, identifier: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|s| s.identifier == identifier)
            .map(|s| s.code.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, identifier: &str, code: &str, channel: Channel) -> Result<(), NotifyError> {
        self.sent.lock().push(SentCode {
            identifier: identifier.to_string(),
            code: code.to_string(),
            channel,
        });
        if self.fail {
            return Err(NotifyError::DeliveryFailed("recording notifier set to fail".into()));
        }
        Ok(())
    }
}
