use crate::error::{Error, Result};
use crate::message::ValueSet;

/// Receives the decided bit. Called at most once per instance.
pub trait DecisionSink: Send {
    fn decide(&mut self, value: bool);
}

impl<F: FnMut(bool) + Send> DecisionSink for F {
    fn decide(&mut self, value: bool) {
        self(value)
    }
}

/// Computes the estimate for the next round and the new decision state from
/// the confirmed `values` and the coin `s` of `round`.
///
/// A singleton `{v}` carries `v` forward and decides it when `v == s`. Any other
/// set adopts the coin. A decision, once made, is never replaced, and the sink
/// is only called for the first one. Asking to decide without a sink means the
/// caller kept running rounds past its budget: `Error::AbandonedNode`.
pub fn next_estimate<S>(
    round: usize,
    values: ValueSet,
    s: bool,
    already_decided: Option<bool>,
    sink: Option<&mut S>,
) -> Result<(bool, Option<bool>)>
where
    S: DecisionSink + ?Sized,
{
    let v = match values.as_single() {
        Some(v) => v,
        None => return Ok((s, already_decided)),
    };

    if v != s {
        return Ok((v, already_decided));
    }

    match (already_decided, sink) {
        (_, None) if already_decided != Some(!v) => Err(Error::AbandonedNode { round }),
        (None, Some(sink)) => {
            sink.decide(v);
            Ok((v, Some(v)))
        }
        (decided, _) => Ok((v, decided)),
    }
}
