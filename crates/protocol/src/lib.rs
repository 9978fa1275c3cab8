//! The coinledger line protocol.
//!
//! One newline-terminated command per round trip: `<command> [<arg> ...]`.
//! Responses are plain text written verbatim.

pub mod codec;
pub mod command;
pub mod validator;

pub use codec::{decode, encode};
pub use command::*;
pub use validator::validate;
