//! Reverse TCP connections through a NAT by way of its SIP ALG.
//!
//! A host behind the NAT (the [`initiator`]) sends a REGISTER over TCP whose
//! `Contact` advertises a local listening port. A SIP-aware middlebox on the
//! path rewrites the exchange and the [`responder`] on the far side answers
//! with a 200 OK echoing the request's `Via` and `Contact`, then dials the
//! address found in `Contact`. That connect-back reaching the initiator's
//! listener is the proof the traversal worked.
//!
//! The crate targets exactly one dialog shape (one REGISTER, one 200 OK). It
//! is not a SIP stack.

pub mod config;
pub mod error;
pub mod framing;
pub mod initiator;
pub mod logging;
pub mod message;
pub mod responder;

#[cfg(test)]
mod tests;

pub use config::{InitiatorConfig, ResponderConfig, Role, Settings};
pub use error::{Error, Result};
pub use initiator::{CallbackReceipt, Initiator};
pub use message::{CallbackAddress, HeaderLine, MissingField};
pub use responder::{HandlerSettings, Responder};
