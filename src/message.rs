use core::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};

const BIT_ZERO: u8 = 0b01;
const BIT_ONE: u8 = 0b10;

#[derive(Error, Debug, Eq, PartialEq)]
#[error("invalid value set mask: {0:#04b}")]
pub struct InvalidValueSet(u8);

/// A subset of `{0, 1}`.
///
/// Used for `bin_values`, confirmed value sets and the payload of CONF votes.
/// On the wire it is a single byte bitmask; anything above `0b11` is rejected
/// while decoding.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct ValueSet(u8);

impl ValueSet {
    pub const EMPTY: ValueSet = ValueSet(0);
    pub const ZERO: ValueSet = ValueSet(BIT_ZERO);
    pub const ONE: ValueSet = ValueSet(BIT_ONE);
    pub const BOTH: ValueSet = ValueSet(BIT_ZERO | BIT_ONE);

    pub fn single(value: bool) -> Self {
        ValueSet(bit(value))
    }

    pub fn contains(&self, value: bool) -> bool {
        self.0 & bit(value) != 0
    }

    /// Inserts `value`, returning `true` if it was not present before.
    pub fn insert(&mut self, value: bool) -> bool {
        let fresh = !self.contains(value);
        self.0 |= bit(value);
        fresh
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_subset(&self, other: &ValueSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Returns the only member of a singleton set.
    pub fn as_single(&self) -> Option<bool> {
        match *self {
            ValueSet::ZERO => Some(false),
            ValueSet::ONE => Some(true),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        [false, true].into_iter().filter(move |v| self.contains(*v))
    }
}

fn bit(value: bool) -> u8 {
    if value {
        BIT_ONE
    } else {
        BIT_ZERO
    }
}

impl TryFrom<u8> for ValueSet {
    type Error = InvalidValueSet;

    fn try_from(mask: u8) -> std::result::Result<Self, Self::Error> {
        if mask > ValueSet::BOTH.0 {
            return Err(InvalidValueSet(mask));
        }
        Ok(ValueSet(mask))
    }
}

impl From<ValueSet> for u8 {
    fn from(set: ValueSet) -> Self {
        set.0
    }
}

impl FromIterator<bool> for ValueSet {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut set = ValueSet::EMPTY;
        for v in iter {
            set.insert(v);
        }
        set
    }
}

impl fmt::Debug for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<u8> = self.iter().map(u8::from).collect();
        write!(f, "{:?}", members)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum Action {
    /// BV-broadcast estimate.
    Est(bool),
    /// Auxiliary vote for one member of `bin_values`.
    Aux(bool),
    /// The set of values our AUX phase confirmed.
    Conf(ValueSet),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub round: usize,
    pub action: Action,
}

impl Message {
    pub fn est(round: usize, value: bool) -> Self {
        Self {
            round,
            action: Action::Est(value),
        }
    }

    pub fn aux(round: usize, value: bool) -> Self {
        Self {
            round,
            action: Action::Aux(value),
        }
    }

    pub fn conf(round: usize, values: ValueSet) -> Self {
        Self {
            round,
            action: Action::Conf(values),
        }
    }

    pub fn action_str(&self) -> &str {
        match self.action {
            Action::Est(_) => "EST",
            Action::Aux(_) => "AUX",
            Action::Conf(_) => "CONF",
        }
    }
}

/// Bundle is the wire envelope: the session the message belongs to and the
/// message itself. The sender is supplied by the transport, never by the bundle.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Session identifier, many ABBA instances run side by side.
    pub id: String,
    pub message: Message,
}

impl Bundle {
    pub fn new(id: impl Into<String>, message: Message) -> Self {
        Self {
            id: id.into(),
            message,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a bundle received from the transport. Any frame that does not
    /// decode is a malformed message rather than an encoding failure on our side.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|err| Error::MalformedMessage(format!("undecodable bundle: {}", err)))
    }
}
