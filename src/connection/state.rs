//! # Connection State Model
//!
//! The shared vocabulary for the link lifecycle and the remote device.

use serde::Serialize;
use std::fmt;

/// Lifecycle of the single logical link.
///
/// Exactly one variant is current at any instant. Every state may move to
/// any other one, usually through `Error` or `Disconnected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session and no attempt in flight
    #[default]
    Disconnected,

    /// A session is being opened
    Connecting { device_label: String },

    /// A session is live
    Connected { device_label: String },

    /// A precondition or timeout failure that needs outside action
    Error { message: String },
}

impl ConnectionState {
    /// Build an `Error` state from anything printable
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// True for `Connecting` and `Connected`
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting { device_label } => write!(f, "Connecting to {}", device_label),
            Self::Connected { device_label } => write!(f, "Connected to {}", device_label),
            Self::Error { message } => write!(f, "Error: {}", message),
        }
    }
}

/// The remote telemetry device a session targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteDevice {
    /// Transport address (tty path for a bound RFCOMM channel)
    pub address: String,

    /// Human readable name, if the device advertised one
    pub name: Option<String>,
}

impl RemoteDevice {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Label shown to the user: the name when known, otherwise the address
    pub fn label(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.address,
        }
    }
}
