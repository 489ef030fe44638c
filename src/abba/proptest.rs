use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

use super::{Abba, Progress};
use crate::broadcaster::{Broadcaster, Outgoing};
use crate::config::Config;
use crate::message::Bundle;
use crate::NodeId;

// Far beyond what a run needs with a fair coin.
const MAX_ROUNDS: usize = 200;

struct Node {
    abba: Abba,
    broadcaster: Broadcaster,
    decisions: Arc<Mutex<Vec<bool>>>,
}

struct Net {
    config: Config,
    coin_seed: u64,
    nodes: BTreeMap<NodeId, Node>,
    crashed: BTreeSet<NodeId>,
    queue: BTreeMap<NodeId, Vec<(NodeId, Bundle)>>,
    coin_requests: BTreeMap<usize, BTreeSet<NodeId>>,
}

impl Net {
    fn new(config: Config, coin_seed: u64) -> Self {
        let nodes = BTreeMap::from_iter((0..config.n).map(|id| {
            let decisions = Arc::new(Mutex::new(Vec::new()));
            let sink = {
                let decisions = decisions.clone();
                move |v: bool| decisions.lock().push(v)
            };
            let abba = Abba::new("test-net", id, config.clone(), sink).expect("Failed to create");
            let node = Node {
                abba,
                broadcaster: Broadcaster::new("test-net", id),
                decisions,
            };
            (id, node)
        }));

        Net {
            config,
            coin_seed,
            nodes,
            crashed: Default::default(),
            queue: Default::default(),
            coin_requests: Default::default(),
        }
    }

    // A crashed node never starts and silently drops everything sent to it.
    fn crash(&mut self, id: NodeId) {
        self.crashed.insert(id);
    }

    fn start(&mut self, inputs: &[bool]) {
        let ids = Vec::from_iter(self.nodes.keys().copied());
        for (id, input) in ids.into_iter().zip(inputs.iter().cycle()) {
            if self.crashed.contains(&id) {
                continue;
            }
            let node = self.node_mut(id);
            node.abba
                .start(*input, &mut node.broadcaster)
                .expect("Failed to start");
            self.enqueue_bundles_from(id);
        }
        self.drive_all();
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).unwrap()
    }

    // coin is a splitmix64 bit of (seed, round), handed out once f + 1 nodes asked.
    fn coin(&self, round: usize) -> bool {
        let mut z = self
            .coin_seed
            .wrapping_add((round as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        (z ^ (z >> 31)) & 1 == 1
    }

    fn enqueue_bundles_from(&mut self, id: NodeId) {
        let outgoings = self.node_mut(id).broadcaster.take_outgoings();
        for out in outgoings {
            match out {
                Outgoing::Gossip(bundle) => {
                    for recipient in self.nodes.keys() {
                        if self.crashed.contains(recipient) {
                            continue;
                        }
                        self.queue
                            .entry(*recipient)
                            .or_default()
                            .push((id, bundle.clone()));
                    }
                }
                Outgoing::Direct(recipient, bundle) => {
                    self.queue.entry(recipient).or_default().push((id, bundle));
                }
            }
        }
    }

    // drive steps a node until it waits on the network, returns true if a coin was applied.
    fn drive(&mut self, id: NodeId) -> bool {
        let mut progressed = false;
        loop {
            let node = self.node_mut(id);
            assert!(node.abba.round() <= MAX_ROUNDS, "node {} did not terminate", id);
            let progress = node.abba.step(&mut node.broadcaster).expect("Failed to step");

            match progress {
                Progress::NeedCoin(round) => {
                    let requests = self.coin_requests.entry(round).or_default();
                    requests.insert(id);
                    if requests.len() < self.config.relay_threshold() {
                        break;
                    }
                    let s = self.coin(round);
                    self.node_mut(id)
                        .abba
                        .apply_coin(round, s)
                        .expect("Failed to apply coin");
                    progressed = true;
                }
                Progress::Waiting | Progress::Halted => break,
            }
        }
        self.enqueue_bundles_from(id);
        progressed
    }

    fn drive_all(&mut self) {
        let ids = Vec::from_iter(self.nodes.keys().copied());
        loop {
            let mut progressed = false;
            for id in ids.iter().copied() {
                if !self.crashed.contains(&id) {
                    progressed |= self.drive(id);
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn handle(&mut self, recipient: NodeId, sender: NodeId, bundle: Bundle) {
        let node = self.node_mut(recipient);
        node.abba
            .handle_bundle(sender, bundle, &mut node.broadcaster)
            .expect("Failed to handle bundle");
    }

    fn drain_queue(&mut self) {
        while !self.queue.is_empty() {
            for (recipient, queue) in std::mem::take(&mut self.queue) {
                for (sender, bundle) in queue {
                    self.handle(recipient, sender, bundle);
                }
                self.enqueue_bundles_from(recipient);
            }
            self.drive_all();
        }
    }

    fn deliver(&mut self, recipient: NodeId, index: usize) {
        if let Some(msgs) = self.queue.get_mut(&recipient) {
            if msgs.is_empty() {
                return;
            }
            let index = index % msgs.len();
            let (sender, bundle) = msgs.swap_remove(index);

            self.handle(recipient, sender, bundle);
            self.enqueue_bundles_from(recipient);
            self.drive_all();
        }
    }

    fn decisions(&self) -> BTreeMap<NodeId, Vec<bool>> {
        self.nodes
            .iter()
            .filter(|(id, _)| !self.crashed.contains(id))
            .map(|(id, node)| (*id, node.decisions.lock().clone()))
            .collect()
    }
}

#[test]
fn test_net_happy_path() {
    let mut net = Net::new(Config::default(), 42);
    net.start(&[true]);
    net.drain_queue();

    for (id, decisions) in net.decisions() {
        assert_eq!(decisions, vec![true], "node {}", id);
    }
}

#[test]
fn test_net_mixed_inputs() {
    let mut net = Net::new(Config::with_parties(7), 7);
    net.start(&[true, false, false, true, false, true, true]);
    net.drain_queue();

    let decided: BTreeSet<Vec<bool>> = net.decisions().into_values().collect();
    assert_eq!(decided.len(), 1);
    assert_eq!(decided.into_iter().next().map(|d| d.len()), Some(1));
}

#[test]
fn test_net_with_crashed_party() {
    let mut net = Net::new(Config::default(), 3);
    net.crash(2);
    net.start(&[false, true]);
    net.drain_queue();

    let decided: BTreeSet<Vec<bool>> = net.decisions().into_values().collect();
    assert_eq!(decided.len(), 1);
    assert_eq!(net.decisions().len(), 3);
}

#[quickcheck]
fn prop_abba_agrees_under_randomized_msg_delivery(
    n: usize,
    inputs: Vec<bool>,
    coin_seed: u64,
    conf_phase: bool,
    crash_one: bool,
    msg_order: Vec<(NodeId, usize)>,
) -> TestResult {
    if inputs.is_empty() {
        return TestResult::discard();
    }
    let n = n % 7 + 1; // Large n is wasteful, and n must be > 0
    let config = Config {
        conf_phase,
        ..Config::with_parties(n)
    };
    let can_crash = config.f > 0 && crash_one;

    let mut net = Net::new(config, coin_seed);
    if can_crash {
        net.crash(n - 1);
    }
    net.start(&inputs);

    // Deliver the messages in the order chosen by quickcheck
    for (recipient, msg_index) in msg_order {
        net.deliver(recipient % n, msg_index);
    }

    // Then roll-out the simulation to completion.
    net.drain_queue();

    let decisions = net.decisions();

    // Integrity: every live node decided exactly once
    for (id, decided) in decisions.iter() {
        if decided.len() != 1 {
            return TestResult::error(format!("node {} decided {:?}", id, decided));
        }
    }

    // Agreement
    let decided = BTreeSet::from_iter(decisions.values().map(|d| d[0]));
    if decided.len() != 1 {
        return TestResult::error(format!("disagreement: {:?}", decisions));
    }

    // Validity: unanimous inputs must be decided
    let live_inputs = BTreeSet::from_iter(
        (0..n)
            .filter(|id| !(can_crash && *id == n - 1))
            .map(|id| inputs[id % inputs.len()]),
    );
    if live_inputs.len() == 1 && live_inputs != decided {
        return TestResult::error(format!(
            "inputs {:?} but decided {:?}",
            live_inputs, decided
        ));
    }

    TestResult::passed()
}
