//! # Hookwire Protocol
//!
//! Envelope types, event codes and the hex frame codec spoken by hooked agents.

#![warn(missing_docs)]

/// Envelope and command message types
pub mod envelope;

/// Event code enumeration
pub mod event;

/// Frame header/body parsing and body encoding
pub mod frame;

/// Frame reader for async streams
pub mod codec;

/// Error types for protocol operations
pub mod error;

pub use envelope::{Command, Envelope};
pub use event::EventKind;
pub use frame::{decode, decode_body, encode, inbound_frame};
pub use codec::FrameReader;
pub use error::FrameError;
