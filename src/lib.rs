//! Asynchronous Binary Byzantine Agreement.
//!
//! N = 3f + 1 parties, up to f of them Byzantine, agree on a single bit over an
//! asynchronous network. Each round runs a BV-broadcast of estimates, an AUX (and
//! optionally CONF) exchange to confirm a set of values, and then consults a
//! common coin to either decide or pick the next estimate.
//!
//! [`Abba`] is the process local state machine and does no I/O. [`driver::run`]
//! hosts it against a [`Transport`] and a [`CommonCoin`].

pub mod abba;
pub mod broadcaster;
pub mod config;
pub mod driver;
pub mod error;
pub mod message;

pub use crate::abba::decision::{next_estimate, DecisionSink};
pub use crate::abba::{Abba, Progress, Step};
pub use crate::broadcaster::{Broadcaster, Outgoing};
pub use crate::config::{Config, RedundantVotePolicy};
pub use crate::driver::{run, CommonCoin, Transport};
pub use crate::error::{Error, Result};
pub use crate::message::{Action, Bundle, Message, ValueSet};

/// Index of a party, in `[0, N)`.
pub type NodeId = usize;
