//! # courier-protocol
//!
//! Wire protocol definitions for the Courier direct-messaging core.
//!
//! This crate defines the JSON frames exchanged between clients and the
//! server over a persistent WebSocket connection.
//!
//! ## Frame Types
//!
//! Inbound (chat endpoint only):
//!
//! - `message` - Send a chat message to the counterpart
//! - `typing` - Toggle a typing indicator
//!
//! Outbound:
//!
//! - `message` - A persisted chat message, fanned out to the room
//! - `typing` - Typing indicator from another room member
//! - `status` - Online/offline transition for a user
//!
//! ## Example
//!
//! ```rust
//! use courier_protocol::{codec, ClientFrame, ServerFrame};
//!
//! // Omitting "type" defaults to a message frame.
//! let frame = codec::decode(r#"{"message":"hi"}"#).unwrap();
//! assert_eq!(frame, ClientFrame::Message { message: "hi".into() });
//!
//! let text = codec::encode(&ServerFrame::status(1, true)).unwrap();
//! assert!(text.contains(r#""status":"online""#));
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{ClientFrame, OnlineStatus, ServerFrame};
