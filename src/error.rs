use thiserror::Error;

use crate::abba::Step;
use crate::message::Message;
use crate::NodeId;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("redundant vote {message:?} from {sender}")]
    RedundantVote { sender: NodeId, message: Message },
    #[error("asked to decide in round {round} after the decision sink was retired")]
    AbandonedNode { round: usize },
    #[error("coin for round {round} while in {step:?} of round {current}")]
    UnexpectedCoin {
        round: usize,
        current: usize,
        step: Step,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("encoding/decoding error: {0}")]
    Encoding(String),
    #[error("transport closed before the instance halted")]
    TransportClosed,
    #[error("the instance has already been started")]
    AlreadyStarted,
    #[error("the instance has not been started yet")]
    NotStarted,
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Encoding(format!("{}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
