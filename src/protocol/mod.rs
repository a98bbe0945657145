//! Protocol Module
//!
//! Message types and the wire codec shared by broker, nodes and clients.
//!
//! ## Messages
//! Every request is `{action, ...fields}`; the action travels as a string so
//! that receivers can tell a forbidden action from a malformed frame. Replies
//! are a closed enum; failures are `Reply::Error { code, message }`.
//!
//! ### Actions
//! - broker: register, unregister, ping, route, get, set, remove
//! - node:   get, set, remove, ping, snapshot
//!
//! ### Error Codes
//! - FORBIDDEN:       action outside the receiver's allow-list
//! - NOT_IMPLEMENTED: action allowed but without a handler
//! - ZERO_NODES:      broker has no registered nodes to route to
//! - NOT_REGISTERED:  node asked to serve data before it has registered
//! - UNKNOWN_ERROR:   anything else; details are in the receiver's log
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (4)  │ CRC (4)  │   Payload (bincode)         │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! Requests are capped at 16 MB, replies at 1 GB.

mod command;
mod response;
mod codec;

pub use command::{Action, Request};
pub use response::{ErrorCode, Reply};
pub use codec::{
    decode_payload, decode_reply, decode_request, encode_reply, encode_request, read_frame,
    read_reply, read_request, write_reply, write_reply_limited, write_request, HEADER_SIZE,
    MAX_PAYLOAD_SIZE, MAX_REPLY_SIZE,
};
