//! Value confirmation.
//!
//! Both checks are re-run on every wake-up: `bin_values` keeps growing while
//! AUX and CONF votes arrive, and a vote that is useless now may count later.

use std::collections::BTreeSet;

use super::tally::{idx, RoundState};
use crate::message::ValueSet;
use crate::NodeId;

/// The set of values confirmed by `quorum` distinct AUX senders, each of them
/// voting for a member of our `bin_values`.
pub(super) fn aux_values(state: &RoundState, quorum: usize) -> Option<ValueSet> {
    let bin_values = state.bin_values;
    for v in [true, false] {
        if bin_values.contains(v) && state.aux_senders[idx(v)].len() >= quorum {
            return Some(ValueSet::single(v));
        }
    }

    let senders: BTreeSet<NodeId> = bin_values
        .iter()
        .flat_map(|v| state.aux_senders[idx(v)].iter().copied())
        .collect();

    (senders.len() >= quorum).then(|| bin_values)
}

/// The set of values confirmed by `quorum` distinct CONF senders, each of them
/// reporting a subset of our `bin_values`.
pub(super) fn conf_values(state: &RoundState, quorum: usize) -> Option<ValueSet> {
    let bin_values = state.bin_values;
    for v in [true, false] {
        let single = ValueSet::single(v);
        let count = state.conf_senders.get(&single).map_or(0, BTreeSet::len);
        if bin_values.contains(v) && count >= quorum {
            return Some(single);
        }
    }

    let senders: BTreeSet<NodeId> = state
        .conf_senders
        .iter()
        .filter(|(values, _)| values.is_subset(&bin_values))
        .flat_map(|(_, senders)| senders.iter().copied())
        .collect();

    (senders.len() >= quorum).then(|| bin_values)
}
