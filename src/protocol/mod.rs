//! # Line Protocol Module
//!
//! Implementation of the text protocol spoken by the survey device.
//!
//! This module handles:
//! - Splitting the inbound byte stream into newline-delimited frames
//! - Decoding frames into typed telemetry, acknowledgements and events
//! - Building and serialising outbound commands

pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod framer;

pub use decoder::{decode_frame, Ack, Frame, LifecycleState};
pub use encoder::Command;
pub use framer::LineFramer;
