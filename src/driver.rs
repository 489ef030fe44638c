//! Runs an [`Abba`] instance against real collaborators.
//!
//! One task, two activities: the receive loop feeds inbound votes into the
//! instance and the coordinator drives the rounds. They share the instance behind
//! a mutex and a single [`Notify`]. The coordinator registers for a wake-up before
//! it looks at the tallies, so a vote recorded in between is never missed, and it
//! re-checks everything on each wake since one wake-up may stand for many votes.

use std::future::Future;

use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::abba::{Abba, Progress};
use crate::broadcaster::{Broadcaster, Outgoing};
use crate::error::{Error, Result};
use crate::message::Bundle;
use crate::NodeId;

/// The authenticated channel between the parties.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a bundle. `Outgoing::Gossip` goes to all N parties, ourselves included.
    async fn send(&self, outgoing: Outgoing) -> Result<()>;

    /// Waits for the next frame and the id of the party that sent it. `None` once
    /// the channel is closed.
    async fn receive(&self) -> Option<(NodeId, Vec<u8>)>;
}

/// A per-round shared random bit. Blocks until enough parties asked for it.
#[async_trait]
pub trait CommonCoin: Send + Sync {
    async fn coin(&self, round: usize) -> bool;
}

struct Shared {
    node: Mutex<(Abba, Broadcaster)>,
    wake: Notify,
}

impl Shared {
    // with runs `f` under the lock and hands back the messages it queued.
    fn with<R>(
        &self,
        f: impl FnOnce(&mut Abba, &mut Broadcaster) -> Result<R>,
    ) -> Result<(R, Vec<Outgoing>)> {
        let mut node = self.node.lock();
        let (abba, broadcaster) = &mut *node;
        let res = f(abba, broadcaster)?;
        Ok((res, broadcaster.take_outgoings()))
    }
}

/// Runs the instance to completion: receives and relays votes straight away,
/// starts round 0 once `input` resolves, and takes part in rounds until the
/// decided bit has been confirmed often enough to stop.
///
/// Returns the decided bit. Any error is fatal to this instance only.
pub async fn run<T, C>(
    abba: Abba,
    broadcaster: Broadcaster,
    transport: &T,
    coin: &C,
    input: impl Future<Output = bool>,
) -> Result<Option<bool>>
where
    T: Transport + ?Sized,
    C: CommonCoin + ?Sized,
{
    let shared = Shared {
        node: Mutex::new((abba, broadcaster)),
        wake: Notify::new(),
    };

    // Votes are tallied and relayed while the input is pending.
    tokio::select! {
        res = coordinate(&shared, transport, coin, input) => res,
        res = receive_loop(&shared, transport) => res,
    }
}

async fn coordinate<T, C>(
    shared: &Shared,
    transport: &T,
    coin: &C,
    input: impl Future<Output = bool>,
) -> Result<Option<bool>>
where
    T: Transport + ?Sized,
    C: CommonCoin + ?Sized,
{
    let est = input.await;
    let (_, outgoings) = shared.with(|abba, broadcaster| abba.start(est, broadcaster))?;
    flush(transport, outgoings).await?;

    loop {
        let notified = shared.wake.notified();
        let (progress, outgoings) = shared.with(|abba, broadcaster| abba.step(broadcaster))?;
        flush(transport, outgoings).await?;

        match progress {
            Progress::Waiting => notified.await,
            Progress::NeedCoin(round) => {
                debug!("waiting for coin({})", round);
                let s = coin.coin(round).await;
                shared.with(|abba, _| abba.apply_coin(round, s))?;
            }
            Progress::Halted => {
                let node = shared.node.lock();
                info!("[ABBA-{}] {} halted", node.0.self_id(), node.0.id());
                return Ok(node.0.decision());
            }
        }
    }
}

async fn receive_loop<T>(shared: &Shared, transport: &T) -> Result<Option<bool>>
where
    T: Transport + ?Sized,
{
    while let Some((sender, data)) = transport.receive().await {
        let bundle = Bundle::from_bytes(&data)?;
        let (_, outgoings) = shared.with(|abba, broadcaster| {
            abba.handle_bundle(sender, bundle, broadcaster)
        })?;
        flush(transport, outgoings).await?;
        shared.wake.notify_waiters();
    }
    Err(Error::TransportClosed)
}

async fn flush<T>(transport: &T, outgoings: Vec<Outgoing>) -> Result<()>
where
    T: Transport + ?Sized,
{
    for outgoing in outgoings {
        transport.send(outgoing).await?;
    }
    Ok(())
}
