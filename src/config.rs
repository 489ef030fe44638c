use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What to do when a sender votes twice for the same (round, tag, value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedundantVotePolicy {
    /// Fail the instance with `Error::RedundantVote`.
    Reject,
    /// Drop the duplicate and keep going. The sender is still counted once.
    Ignore,
}

/// Static parameters of one ABBA instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Number of parties, `N`.
    pub n: usize,
    /// Fault bound, `f`. Requires `N >= 3f + 1`.
    pub f: usize,
    /// Run the CONF phase between AUX confirmation and the coin.
    pub conf_phase: bool,
    pub redundant_vote: RedundantVotePolicy,
    /// Rounds, after our decision, in which the coin must confirm the decided
    /// bit again before we stop taking part in new rounds.
    pub trailing_confirmations: usize,
    /// Once decided, rounds older than `round - round_retention` are evicted.
    pub round_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n: 4,
            f: 1,
            conf_phase: true,
            redundant_vote: RedundantVotePolicy::Reject,
            trailing_confirmations: 1,
            round_retention: 2,
        }
    }
}

impl Config {
    /// Configuration for `n` parties tolerating the largest possible `f`.
    pub fn with_parties(n: usize) -> Self {
        Self {
            n,
            f: n.saturating_sub(1) / 3,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(Error::InvalidConfig("at least one party is required".into()));
        }
        if self.n < 3 * self.f + 1 {
            return Err(Error::InvalidConfig(format!(
                "{} parties can not tolerate {} faults, need at least {}",
                self.n,
                self.f,
                3 * self.f + 1
            )));
        }
        if self.trailing_confirmations == 0 {
            return Err(Error::InvalidConfig(
                "trailing_confirmations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// f + 1: at least one correct sender is behind the value.
    pub fn relay_threshold(&self) -> usize {
        self.f + 1
    }

    /// 2f + 1: enough correct senders that every correct party will relay.
    pub fn bv_threshold(&self) -> usize {
        2 * self.f + 1
    }

    /// N - f, which is 2f + 1 when N = 3f + 1.
    pub fn quorum(&self) -> usize {
        self.n - self.f
    }
}
