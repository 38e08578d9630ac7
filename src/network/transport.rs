//! Transport Interface
//!
//! The sync layer never touches sockets. A [`Transport`] delivers
//! `(sender, bytes)` pairs, carries flushed frames, and reports turn
//! latency so a resync can wait for the authority peer.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, error};

use crate::protocol::PeerId;

use super::aggregator::Frame;

/// Why a peer left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Left on purpose.
    Exit,
    /// Dropped for a protocol violation or timeout.
    Drop,
    /// Game ended.
    EndGame,
}

/// Packet transport consumed by a sync session.
pub trait Transport {
    /// Next inbound delivery, if any.
    fn poll_inbound(&mut self) -> Option<(PeerId, Vec<u8>)>;

    /// Send a flushed frame to the peers it addresses.
    fn send(&mut self, frame: &Frame);

    /// Disconnect a peer.
    fn drop_peer(&mut self, peer: PeerId, reason: LeaveReason);

    /// Check if a peer is still connected.
    fn is_connected(&self, peer: PeerId) -> bool;

    /// Turns the game owner has queued for us.
    fn owner_turns_waiting(&self) -> u32;

    /// Turns currently in flight.
    fn turns_in_transit(&self) -> u32;

    /// Exchange pending turns without blocking.
    fn pump(&mut self);
}

// =============================================================================
// LOOPBACK
// =============================================================================

/// In-memory message hub shared by loopback transports.
#[derive(Debug, Default)]
pub struct LoopbackHub {
    inboxes: BTreeMap<PeerId, VecDeque<(PeerId, Vec<u8>)>>,
    connected: BTreeSet<PeerId>,
    dropped: Vec<(PeerId, PeerId, LeaveReason)>,
    owner_turns_waiting: u32,
    turns_in_transit: u32,
}

impl LoopbackHub {
    /// Create a shared hub.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Connect a peer and return its transport.
    pub fn connect(hub: &Rc<RefCell<Self>>, peer: PeerId) -> LoopbackTransport {
        {
            let mut inner = hub.borrow_mut();
            inner.connected.insert(peer);
            inner.inboxes.entry(peer).or_default();
        }
        LoopbackTransport {
            local: peer,
            hub: Rc::clone(hub),
        }
    }

    /// Disconnect a peer.
    pub fn disconnect(&mut self, peer: PeerId) {
        self.connected.remove(&peer);
        self.inboxes.remove(&peer);
    }

    /// Set the turn counters reported to every transport.
    pub fn set_turns(&mut self, owner_turns_waiting: u32, turns_in_transit: u32) {
        self.owner_turns_waiting = owner_turns_waiting;
        self.turns_in_transit = turns_in_transit;
    }

    /// Drops requested so far, as `(by, peer, reason)`.
    pub fn dropped(&self) -> &[(PeerId, PeerId, LeaveReason)] {
        &self.dropped
    }

    /// Deliveries waiting for a peer.
    pub fn pending(&self, peer: PeerId) -> usize {
        self.inboxes.get(&peer).map_or(0, VecDeque::len)
    }

    /// Inject raw bytes as if `from` had sent them to `to`.
    pub fn inject(&mut self, from: PeerId, to: PeerId, bytes: Vec<u8>) {
        if let Some(inbox) = self.inboxes.get_mut(&to) {
            inbox.push_back((from, bytes));
        }
    }
}

/// One peer's end of a [`LoopbackHub`].
#[derive(Debug)]
pub struct LoopbackTransport {
    local: PeerId,
    hub: Rc<RefCell<LoopbackHub>>,
}

impl LoopbackTransport {
    /// Local peer id.
    pub fn local(&self) -> PeerId {
        self.local
    }

    /// Shared hub.
    pub fn hub(&self) -> &Rc<RefCell<LoopbackHub>> {
        &self.hub
    }
}

impl Transport for LoopbackTransport {
    fn poll_inbound(&mut self) -> Option<(PeerId, Vec<u8>)> {
        self.hub.borrow_mut().inboxes.get_mut(&self.local)?.pop_front()
    }

    fn send(&mut self, frame: &Frame) {
        let mut hub = self.hub.borrow_mut();
        let peers: Vec<PeerId> = hub.connected.iter().copied().filter(|&p| p != self.local).collect();
        for peer in peers {
            match frame.bytes_for(peer) {
                Ok(bytes) if bytes.is_empty() => {}
                Ok(bytes) => hub.inject(self.local, peer, bytes),
                Err(err) => {
                    error!(from = self.local, %err, "Unroutable outbound frame");
                    return;
                }
            }
        }
    }

    fn drop_peer(&mut self, peer: PeerId, reason: LeaveReason) {
        debug!(by = self.local, peer, ?reason, "Loopback drop");
        let mut hub = self.hub.borrow_mut();
        hub.dropped.push((self.local, peer, reason));
        hub.disconnect(peer);
    }

    fn is_connected(&self, peer: PeerId) -> bool {
        self.hub.borrow().connected.contains(&peer)
    }

    fn owner_turns_waiting(&self) -> u32 {
        self.hub.borrow().owner_turns_waiting
    }

    fn turns_in_transit(&self) -> u32 {
        self.hub.borrow().turns_in_transit
    }

    fn pump(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tile::TilePosition;
    use crate::network::aggregator::OutboundAggregator;
    use crate::protocol::{encode, Command, Destination};

    #[test]
    fn test_routes_by_destination() {
        let hub = LoopbackHub::shared();
        let mut a = LoopbackHub::connect(&hub, 0);
        let mut b = LoopbackHub::connect(&hub, 1);
        let mut c = LoopbackHub::connect(&hub, 2);

        let walk = encode(&Command::walk(TilePosition::new(1, 2))).unwrap();
        let mut agg = OutboundAggregator::new(64);
        agg.enqueue(Destination::Broadcast, &walk).unwrap();
        agg.enqueue(Destination::Peer(2), &walk).unwrap();
        for frame in agg.flush() {
            a.send(&frame);
        }

        assert_eq!(b.poll_inbound(), Some((0, walk.clone())));
        assert_eq!(c.poll_inbound(), Some((0, [walk.clone(), walk].concat())));
        assert_eq!(a.poll_inbound(), None);
        assert_eq!(b.poll_inbound(), None);
    }

    #[test]
    fn test_drop_disconnects() {
        let hub = LoopbackHub::shared();
        let mut a = LoopbackHub::connect(&hub, 0);
        let _b = LoopbackHub::connect(&hub, 1);
        assert!(a.is_connected(1));
        a.drop_peer(1, LeaveReason::Drop);
        assert!(!a.is_connected(1));
        assert_eq!(hub.borrow().dropped(), &[(0, 1, LeaveReason::Drop)]);
    }
}
