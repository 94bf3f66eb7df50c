//! # Connection Module
//!
//! Connection lifecycle vocabulary and the state machine that owns it.

pub mod machine;
pub mod state;

pub use machine::StateMachine;
pub use state::{ConnectionState, RemoteDevice};
