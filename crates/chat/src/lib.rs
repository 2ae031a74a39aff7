//! Channel coordinator: the join/leave/send state machine sitting between
//! the broker gateway and the message sink.
//!
//! A join merges two delivery modes — a bounded historical replay and an
//! open-ended live subscription — into one ordered flow through a single
//! sink, so downstream rendering cannot tell them apart.

pub mod error;
pub mod session;
pub mod sink;

pub use {
    error::{Error, Result},
    natter_broker::MessageSink,
    session::{ChatSession, ReplaySettings},
    sink::{VecSink, format_line},
};
