//! # Transport Module
//!
//! The seam between the session engine and the physical link.
//!
//! This module handles:
//! - The [`Transport`] trait: availability checks and opening a byte stream
//! - The [`LinkPermissions`] capability check supplied by the host
//! - [`Channel`], the split read/write halves of one opened stream
//! - [`SerialTransport`], an RFCOMM channel bound to a tty via `tokio-serial`

mod serial;

pub use serial::SerialTransport;

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::RemoteDevice;

/// Boxed read half of an opened stream
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of an opened stream
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One opened byte stream, split into independently owned halves
pub struct Channel {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

impl Channel {
    /// Split a bidirectional stream
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Build from halves that are already separate
    pub fn from_parts(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self { reader, writer }
    }

    pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

/// Physical link the session engine drives
#[async_trait]
pub trait Transport: Send + Sync {
    /// The link hardware exists on this host
    fn is_available(&self) -> bool;

    /// The link hardware is switched on and usable
    fn is_enabled(&self) -> bool;

    /// Stop any device discovery that would slow down connecting
    fn cancel_discovery(&self) {}

    /// Open a byte stream to `device`
    ///
    /// May block for as long as the remote takes to answer; callers bound it
    /// with a timeout.
    async fn open(&self, device: &RemoteDevice) -> io::Result<Channel>;
}

/// Capability grants owned by the host application
#[cfg_attr(test, mockall::automock)]
pub trait LinkPermissions: Send + Sync {
    /// Allowed to open and use a link
    fn can_connect(&self) -> bool;

    /// Allowed to scan for devices
    fn can_scan(&self) -> bool;
}

/// Permissions for hosts without a permission model
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantedPermissions;

impl LinkPermissions for GrantedPermissions {
    fn can_connect(&self) -> bool {
        true
    }

    fn can_scan(&self) -> bool {
        true
    }
}
