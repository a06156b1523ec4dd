//! Prefix Router (PR) — see [`trie`] for the lookup structure and
//! [`handler`] for the pluggable-handler ABI.

pub mod handler;
pub mod trie;

pub use handler::{Handler, HandlerArgs, ParseMask};
pub use trie::{EntrySpec, Router, RouterEntry};
