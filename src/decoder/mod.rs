//! Message Decode Registry
//!
//! Ledger messages arrive as JSON objects tagged with an `@type` identifier such as
//! `/hub.bridge.v1.MsgConfirmDeposit`. The registry picks a module from the identifier's namespace,
//! then a decoder from the message name, and falls back to a structural passthrough for anything it
//! does not know. Decoding is pure and never fails from the caller's point of view.
//!
//! - `registry`: dispatch table and the passthrough arm
//! - `fields`: declarative rename/coerce rules the decoders are written in
//! - `bridge`, `signer`, `zk`, `gov`: the per-module decoder sets
//! - `address`: participant address heuristic used for account tracking

pub mod address;
mod bridge;
mod fields;
mod gov;
mod registry;
mod signer;
mod types;
mod zk;

pub use address::extract_addresses;
pub use fields::{Coerce, FieldRule};
pub use registry::DecoderRegistry;
pub use types::*;
