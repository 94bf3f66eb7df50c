//! # Vibra Link Library
//!
//! Session engine for a road-survey telemetry logger reached over an RFCOMM
//! serial link.
//!
//! This library keeps one logical connection to the logger alive, speaks its
//! line protocol, and turns the inbound stream into a typed telemetry
//! snapshot while host commands are queued and paced onto the wire.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod reconnect;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use service::VibraLink;
