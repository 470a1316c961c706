//! # courier-core
//!
//! Room registry, presence tracking, and fan-out for the Courier
//! direct-messaging core.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Room** - One 1:1 conversation's set of live connections
//! - **RoomRegistry** - Maps room keys to rooms and fans events out
//! - **PresenceRegistry** - Process-wide online/offline group with
//!   reference-counted durable status
//! - **Gateway** - Seam to the durable store for messages and status
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   Session   │────▶│ RoomRegistry │────▶│    Room     │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!        │
//!        ▼
//! ┌──────────────────┐     ┌─────────────┐
//! │ PresenceRegistry │────▶│   Gateway   │
//! └──────────────────┘     └─────────────┘
//! ```

pub mod connection;
pub mod event;
pub mod gateway;
pub mod presence;
pub mod registry;
pub mod room;

pub use connection::ConnectionId;
pub use event::{ChatMessage, EventKind, RoomEvent};
pub use gateway::{Gateway, GatewayError, NewMessage};
pub use presence::{PresenceRegistry, StatusChange};
pub use registry::RoomRegistry;
pub use room::{Room, RoomKey};
