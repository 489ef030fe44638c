//! BV-broadcast: turns EST votes into `bin_values`.
//!
//! A value seen from f + 1 senders is backed by at least one correct party, so we
//! relay it once. A value seen from 2f + 1 senders will be relayed by every correct
//! party, so it enters `bin_values`.

use super::tally::{idx, RoundState};
use crate::config::Config;

#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct BvStep {
    /// Relay EST for this value to everybody.
    pub relay: Option<bool>,
    /// The value was just added to `bin_values`.
    pub delivered: bool,
}

/// Reacts to the `count`-th distinct EST for `value`.
pub(super) fn on_est(state: &mut RoundState, value: bool, count: usize, config: &Config) -> BvStep {
    let mut step = BvStep::default();

    if count >= config.relay_threshold() && !state.est_sent[idx(value)] {
        state.est_sent[idx(value)] = true;
        step.relay = Some(value);
    }

    if count >= config.bv_threshold() {
        step.delivered = state.add_bin_value(value);
    }

    step
}
