//! # Hookwire
//!
//! Controller side of the hooked-agent protocol.
//!
//! Agents push events to an [`EventListener`] as hex frames; the controller
//! fans them out on an [`EventBus`], tracks live agents in an
//! [`AgentRegistry`], and answers correlated commands sent through a
//! [`CommandChannel`] via the [`CorrelationRegistry`]. [`Controller`] wires it
//! all together.

#![warn(missing_docs)]

pub use hookwire_proto as proto;
pub use hookwire_proto::{Command, Envelope, EventKind};

/// Error types for the hookwire library
pub mod error;

/// Controller configuration and builder
pub mod config;

/// Publish/subscribe registry keyed by event kind
pub mod bus;

/// Live agent connections
pub mod agents;

/// Trace id to waiting request correlation
pub mod correlation;

/// Inbound event socket server
pub mod listener;

/// Outbound command transport
pub mod channel;

/// External injector launcher
pub mod inject;

/// Facade composing all components
pub mod controller;

pub use error::HookwireError;
pub use config::{ControllerBuilder, ControllerConfig};
pub use bus::{EventBus, EventHandler, EventKey, SubscriptionId};
pub use agents::{AgentClient, AgentRegistry};
pub use correlation::{CorrelationRegistry, PendingRequest};
pub use listener::{Dispatcher, EventListener};
pub use channel::CommandChannel;
pub use inject::Injector;
pub use controller::Controller;

/// Result type alias for hookwire operations
pub type Result<T> = std::result::Result<T, HookwireError>;
