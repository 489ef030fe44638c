use crate::message::{Bundle, Message};
use crate::NodeId;

/// Outgoing messages definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Send to all N parties, ourselves included.
    Gossip(Bundle),
    Direct(NodeId, Bundle),
}

// Broadcaster collects the messages an instance wants sent. The host drains
// them after every call into the instance and hands them to the transport.
#[derive(Debug)]
pub struct Broadcaster {
    id: String,
    self_id: NodeId,
    outgoings: Vec<Outgoing>,
}

impl Broadcaster {
    pub fn new(id: impl Into<String>, self_id: NodeId) -> Self {
        Self {
            id: id.into(),
            self_id,
            outgoings: Vec::new(),
        }
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    /// Queues `message` for `recipient` only. The rounds themselves always
    /// broadcast; this is the unicast half of the outgoing interface, for hosts
    /// that answer a single peer, e.g. replaying our votes to a reconnecting party.
    pub fn send_to(&mut self, message: Message, recipient: NodeId) {
        let bdl = self.make_bundle(message);
        self.outgoings.push(Outgoing::Direct(recipient, bdl));
    }

    pub fn broadcast(&mut self, message: Message) {
        let bdl = self.make_bundle(message);
        self.outgoings.push(Outgoing::Gossip(bdl));
    }

    fn make_bundle(&self, message: Message) -> Bundle {
        Bundle::new(self.id.clone(), message)
    }

    pub fn take_outgoings(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoings)
    }

    #[cfg(test)]
    pub fn has_gossip_message(&self, message: &Message) -> bool {
        self.outgoings
            .iter()
            .any(|out| matches!(out, Outgoing::Gossip(bdl) if bdl.message == *message))
    }

    #[cfg(test)]
    pub fn gossip_count(&self, message: &Message) -> usize {
        self.outgoings
            .iter()
            .filter(|out| matches!(out, Outgoing::Gossip(bdl) if bdl.message == *message))
            .count()
    }

    #[cfg(test)]
    pub fn clear(&mut self) {
        self.outgoings.clear();
    }
}
