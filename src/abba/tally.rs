use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::message::{Action, Message, ValueSet};
use crate::NodeId;

pub(super) fn idx(value: bool) -> usize {
    value as usize
}

/// Everything we know about a single round.
#[derive(Debug, Default)]
pub(crate) struct RoundState {
    pub est_sent: [bool; 2],
    pub aux_sent: bool,
    pub conf_sent: BTreeSet<ValueSet>,
    pub est_senders: [BTreeSet<NodeId>; 2],
    pub aux_senders: [BTreeSet<NodeId>; 2],
    pub conf_senders: BTreeMap<ValueSet, BTreeSet<NodeId>>,
    /// Only grows within a round.
    pub bin_values: ValueSet,
    /// The value that entered `bin_values` first, our AUX vote.
    pub first_bin_value: Option<bool>,
}

impl RoundState {
    pub fn add_bin_value(&mut self, value: bool) -> bool {
        if !self.bin_values.insert(value) {
            return false;
        }
        self.first_bin_value.get_or_insert(value);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Recorded {
    /// The sender was added; number of distinct senders for this (round, tag, value).
    Counted(usize),
    /// The sender had already voted: same EST value, or any AUX / CONF of the round.
    Duplicate,
    /// The round has been evicted.
    Stale,
}

/// Round indexed vote bookkeeping. Rounds are created on first touch and
/// dropped by `evict_below`.
#[derive(Debug)]
pub(super) struct VoteTally {
    n: usize,
    rounds: BTreeMap<usize, RoundState>,
    horizon: usize,
}

impl VoteTally {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            rounds: BTreeMap::new(),
            horizon: 0,
        }
    }

    /// Records `sender`'s vote. EST is tracked per value, since a correct party
    /// may relay the value it did not start with. AUX and CONF allow a single vote
    /// per sender and round: a second one, for any value, is a `Duplicate`.
    pub fn record(&mut self, sender: NodeId, msg: &Message) -> Result<Recorded> {
        if sender >= self.n {
            return Err(Error::MalformedMessage(format!(
                "sender {} out of range [0, {})",
                sender, self.n
            )));
        }
        if let Action::Conf(values) = msg.action {
            if values.is_empty() {
                return Err(Error::MalformedMessage(format!(
                    "empty CONF subset in round {}",
                    msg.round
                )));
            }
        }
        if msg.round < self.horizon {
            return Ok(Recorded::Stale);
        }

        let state = self.round_mut(msg.round);
        let voted_already = match msg.action {
            Action::Est(_) => false,
            Action::Aux(v) => state.aux_senders[idx(!v)].contains(&sender),
            Action::Conf(values) => state
                .conf_senders
                .iter()
                .any(|(other, senders)| *other != values && senders.contains(&sender)),
        };
        if voted_already {
            return Ok(Recorded::Duplicate);
        }

        let senders = match msg.action {
            Action::Est(v) => &mut state.est_senders[idx(v)],
            Action::Aux(v) => &mut state.aux_senders[idx(v)],
            Action::Conf(values) => state.conf_senders.entry(values).or_default(),
        };

        if senders.insert(sender) {
            Ok(Recorded::Counted(senders.len()))
        } else {
            Ok(Recorded::Duplicate)
        }
    }

    pub fn round(&self, round: usize) -> Option<&RoundState> {
        self.rounds.get(&round)
    }

    pub fn round_mut(&mut self, round: usize) -> &mut RoundState {
        self.rounds.entry(round).or_default()
    }

    /// Drops every round below `round`. Votes for those rounds are stale from now on.
    pub fn evict_below(&mut self, round: usize) {
        if round <= self.horizon {
            return;
        }
        self.rounds = self.rounds.split_off(&round);
        self.horizon = round;
    }

    #[cfg(test)]
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    #[cfg(test)]
    pub fn retained_rounds(&self) -> usize {
        self.rounds.len()
    }
}
