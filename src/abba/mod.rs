mod bv;
mod confirm;
pub(crate) mod decision;
mod tally;

use log::{debug, info, trace, warn};

use self::decision::DecisionSink;
use self::tally::{Recorded, VoteTally};
use crate::broadcaster::Broadcaster;
use crate::config::{Config, RedundantVotePolicy};
use crate::error::{Error, Result};
use crate::message::{Action, Bundle, Message, ValueSet};
use crate::NodeId;

// Round steps
//
// +---------+     +----------------+     +---------+     +-------------------+     +-----------+
// | SendEst | --> | AwaitBinValues | --> | SendAux | --> | AwaitConfirmation | --> | QueryCoin |
// +---------+     +----------------+     +---------+     +-------------------+     +-----------+
//      ^                                                                                  |
//       \------------------------ apply_coin: decide / advance ------------------------- /
//
// Halted is entered from apply_coin once the decided bit has been confirmed
// `trailing_confirmations` more times.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Idle,
    SendEst,
    AwaitBinValues,
    SendAux,
    AwaitConfirmation,
    QueryCoin,
    Halted,
}

/// What the coordinator needs before it can make further progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Blocked on votes from the network. Call `step` again after the next message.
    Waiting,
    /// Blocked on the common coin for this round.
    NeedCoin(usize),
    /// The instance is done; inbound votes are dropped from now on.
    Halted,
}

/// The ABBA holds the process local state of one Asynchronous Binary Byzantine
/// Agreement instance.
///
/// It does no I/O: inbound votes go through `handle_bundle`, the round is driven by
/// `step` and `apply_coin`, and every outbound vote is pushed to the `Broadcaster`.
pub struct Abba {
    id: String,
    i: NodeId,
    config: Config,
    round: usize,
    est: bool,
    step: Step,
    // confirmed values of the current round, set once AUX confirms
    values: Option<ValueSet>,
    decided: Option<bool>,
    confirmations: usize,
    sink: Option<Box<dyn DecisionSink>>,
    tally: VoteTally,
}

impl Abba {
    pub fn new(
        id: impl Into<String>,
        i: NodeId,
        config: Config,
        sink: impl DecisionSink + 'static,
    ) -> Result<Self> {
        config.validate()?;
        if i >= config.n {
            return Err(Error::InvalidConfig(format!(
                "party {} out of range [0, {})",
                i, config.n
            )));
        }

        Ok(Self {
            id: id.into(),
            i,
            tally: VoteTally::new(config.n),
            config,
            round: 0,
            est: false,
            step: Step::Idle,
            values: None,
            decided: None,
            confirmations: 0,
            sink: Some(Box::new(sink)),
        })
    }

    /// Starts round 0 with our input bit.
    pub fn start(&mut self, input: bool, broadcaster: &mut Broadcaster) -> Result<Progress> {
        if self.step != Step::Idle {
            return Err(Error::AlreadyStarted);
        }
        debug!("[ABBA-{}] {} starting with input {}", self.i, self.id, input);
        self.est = input;
        self.step = Step::SendEst;
        self.step(broadcaster)
    }

    /// Processes a bundle received from `sender`.
    pub fn handle_bundle(
        &mut self,
        sender: NodeId,
        bundle: Bundle,
        broadcaster: &mut Broadcaster,
    ) -> Result<()> {
        if bundle.id != self.id {
            return Err(Error::MalformedMessage(format!(
                "invalid ID. expected: {}, got {}",
                self.id, bundle.id
            )));
        }
        self.handle_message(sender, bundle.message, broadcaster)
    }

    /// Records the vote `msg` from `sender`. EST votes may trigger a relay.
    pub fn handle_message(
        &mut self,
        sender: NodeId,
        msg: Message,
        broadcaster: &mut Broadcaster,
    ) -> Result<()> {
        if self.step == Step::Halted {
            trace!("[ABBA-{}] halted, dropping {:?} from {}", self.i, msg, sender);
            return Ok(());
        }

        debug!(
            "[ABBA-{}] received {} message: {:?} from {}",
            self.i,
            msg.action_str(),
            msg,
            sender
        );

        let count = match self.tally.record(sender, &msg)? {
            Recorded::Counted(count) => count,
            Recorded::Stale => {
                trace!("[ABBA-{}] dropping vote for evicted round {}", self.i, msg.round);
                return Ok(());
            }
            Recorded::Duplicate => match self.config.redundant_vote {
                RedundantVotePolicy::Reject => {
                    return Err(Error::RedundantVote {
                        sender,
                        message: msg,
                    })
                }
                RedundantVotePolicy::Ignore => {
                    warn!("[ABBA-{}] ignoring redundant {:?} from {}", self.i, msg, sender);
                    return Ok(());
                }
            },
        };

        if let Action::Est(v) = msg.action {
            let state = self.tally.round_mut(msg.round);
            let bv_step = bv::on_est(state, v, count, &self.config);
            if let Some(relay) = bv_step.relay {
                debug!("[ABBA-{}] relaying EST({}, {})", self.i, msg.round, relay);
                broadcaster.broadcast(Message::est(msg.round, relay));
            }
            if bv_step.delivered {
                debug!(
                    "[ABBA-{}] bin_values[{}] is now {}",
                    self.i, msg.round, state.bin_values
                );
            }
        }

        Ok(())
    }

    /// Drives the current round as far as the recorded votes allow.
    pub fn step(&mut self, broadcaster: &mut Broadcaster) -> Result<Progress> {
        loop {
            match self.step {
                Step::Idle => return Err(Error::NotStarted),
                Step::SendEst => {
                    let (round, est) = (self.round, self.est);
                    let state = self.tally.round_mut(round);
                    if !state.est_sent[tally::idx(est)] {
                        state.est_sent[tally::idx(est)] = true;
                        broadcaster.broadcast(Message::est(round, est));
                    }
                    self.step = Step::AwaitBinValues;
                }
                Step::AwaitBinValues => {
                    if self.bin_values(self.round).is_empty() {
                        return Ok(Progress::Waiting);
                    }
                    self.step = Step::SendAux;
                }
                Step::SendAux => {
                    let round = self.round;
                    let state = self.tally.round_mut(round);
                    if let Some(w) = state.first_bin_value {
                        if !state.aux_sent {
                            state.aux_sent = true;
                            debug!("[ABBA-{}] broadcasting AUX({}, {})", self.i, round, w);
                            broadcaster.broadcast(Message::aux(round, w));
                        }
                    }
                    self.step = Step::AwaitConfirmation;
                }
                Step::AwaitConfirmation => match self.confirm(broadcaster) {
                    Some(values) => {
                        debug!(
                            "[ABBA-{}] round {} confirmed values {}",
                            self.i, self.round, values
                        );
                        self.values = Some(values);
                        self.step = Step::QueryCoin;
                    }
                    None => return Ok(Progress::Waiting),
                },
                Step::QueryCoin => return Ok(Progress::NeedCoin(self.round)),
                Step::Halted => return Ok(Progress::Halted),
            }
        }
    }

    /// Applies the coin of `round`: decides if possible and moves to the next round
    /// or halts.
    ///
    /// A halted instance has retired its decision sink, so any further coin is
    /// `Error::AbandonedNode`. A coin for a round we are not querying is
    /// `Error::UnexpectedCoin`.
    pub fn apply_coin(&mut self, round: usize, s: bool) -> Result<()> {
        if self.step == Step::Halted {
            return Err(Error::AbandonedNode { round });
        }
        let values = match (self.step, self.values) {
            (Step::QueryCoin, Some(values)) if round == self.round => values,
            _ => {
                return Err(Error::UnexpectedCoin {
                    round,
                    current: self.round,
                    step: self.step,
                })
            }
        };
        debug!("[ABBA-{}] coin({}) = {}, values = {}", self.i, round, s, values);

        let reconfirmed = self.decided == Some(s) && values.as_single() == Some(s);
        let (est, decided) =
            decision::next_estimate(round, values, s, self.decided, self.sink.as_deref_mut())?;

        if decided != self.decided {
            info!("[ABBA-{}] {} decided {} in round {}", self.i, self.id, s, round);
            self.decided = decided;
        } else if reconfirmed {
            self.confirmations += 1;
            if self.confirmations >= self.config.trailing_confirmations {
                info!(
                    "[ABBA-{}] {} halting in round {} after {} confirmations",
                    self.i, self.id, round, self.confirmations
                );
                self.sink = None;
                self.values = None;
                self.step = Step::Halted;
                return Ok(());
            }
        }

        self.round += 1;
        self.est = est;
        self.values = None;
        self.step = Step::SendEst;

        if self.decided.is_some() && self.round > self.config.round_retention {
            self.tally
                .evict_below(self.round - self.config.round_retention);
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn self_id(&self) -> NodeId {
        self.i
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn estimate(&self) -> bool {
        self.est
    }

    pub fn current_step(&self) -> Step {
        self.step
    }

    pub fn decision(&self) -> Option<bool> {
        self.decided
    }

    pub fn is_halted(&self) -> bool {
        self.step == Step::Halted
    }

    pub fn bin_values(&self, round: usize) -> ValueSet {
        self.tally
            .round(round)
            .map(|state| state.bin_values)
            .unwrap_or_default()
    }

    // confirm returns the confirmed values of the current round, if any. With the
    // CONF phase on, our AUX confirmed values go out as a CONF vote first.
    fn confirm(&mut self, broadcaster: &mut Broadcaster) -> Option<ValueSet> {
        let round = self.round;
        let quorum = self.config.quorum();
        let state = self.tally.round_mut(round);

        let values = confirm::aux_values(state, quorum)?;
        if !self.config.conf_phase {
            return Some(values);
        }

        if state.conf_sent.is_empty() {
            state.conf_sent.insert(values);
            debug!("[ABBA-{}] broadcasting CONF({}, {})", self.i, round, values);
            broadcaster.broadcast(Message::conf(round, values));
        }
        confirm::conf_values(state, quorum)
    }
}


#[cfg(test)]
#[path = "./proptest.rs"]
mod proptest;
