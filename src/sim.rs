//! In-memory fakes of [`crate::transport`]'s collaborator traits, used by
//! the integration tests in `tests/`. Gated behind the `std` feature
//! since they use `std::collections::VecDeque`; no production code
//! depends on this module.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::transport::{Clock, RadioTransport, UdpTransport};
use crate::{CoreError, HwAddr};

/// A radio medium shared by every [`FakeRadio`] handle cloned from it:
/// broadcasts and unicasts fan out to every other handle's inbox.
/// Deliberately has no loss or reordering model — scenario tests control
/// timing by choosing which handle's `drain` they read from and when.
#[derive(Default)]
pub struct FakeRadio {
    own_addr: HwAddr,
    inboxes: Rc<RefCell<HashMap<HwAddr, VecDeque<Vec<u8>>>>>,
    peers: HashSet<HwAddr>,
}

impl FakeRadio {
    pub fn new(own_addr: HwAddr) -> Self {
        let inboxes: Rc<RefCell<HashMap<HwAddr, VecDeque<Vec<u8>>>>> = Default::default();
        inboxes.borrow_mut().entry(own_addr).or_default();
        Self {
            own_addr,
            inboxes,
            peers: Default::default(),
        }
    }

    /// Build a second handle onto the same shared medium, bound to a
    /// different address — the usual way to wire up a multi-node test.
    pub fn join(&self, own_addr: HwAddr) -> Self {
        self.inboxes.borrow_mut().entry(own_addr).or_default();
        Self {
            own_addr,
            inboxes: self.inboxes.clone(),
            peers: Default::default(),
        }
    }

    /// Pop the next frame addressed to this handle, if any.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.inboxes
            .borrow_mut()
            .get_mut(&self.own_addr)
            .and_then(|q| q.pop_front())
    }

    fn deliver_to_all_but_self(&self, frame: &[u8]) {
        let mut inboxes = self.inboxes.borrow_mut();
        for (addr, queue) in inboxes.iter_mut() {
            if *addr != self.own_addr {
                queue.push_back(frame.to_vec());
            }
        }
    }

    fn ensure_registered(&self) {
        self.inboxes
            .borrow_mut()
            .entry(self.own_addr)
            .or_default();
    }
}

impl RadioTransport for FakeRadio {
    fn broadcast(&mut self, frame: &[u8]) -> Result<(), CoreError> {
        self.ensure_registered();
        self.deliver_to_all_but_self(frame);
        Ok(())
    }

    fn unicast(&mut self, hw_addr: HwAddr, frame: &[u8]) -> Result<(), CoreError> {
        if !self.peers.contains(&hw_addr) {
            return Err(CoreError::PeerRegistrationFailed);
        }
        self.ensure_registered();
        self.inboxes
            .borrow_mut()
            .entry(hw_addr)
            .or_default()
            .push_back(frame.to_vec());
        Ok(())
    }

    fn register_peer(&mut self, hw_addr: HwAddr) -> Result<(), CoreError> {
        self.peers.insert(hw_addr);
        Ok(())
    }
}

/// A UDP link to a single virtual sink. `up` toggles under test control to
/// exercise upstream handoff / fallback transitions (spec §4.10).
pub struct FakeUdp {
    up: bool,
    sent: Vec<Vec<u8>>,
    inbox: VecDeque<Vec<u8>>,
}

impl Default for FakeUdp {
    fn default() -> Self {
        Self {
            up: true,
            sent: Vec::new(),
            inbox: VecDeque::new(),
        }
    }
}

impl FakeUdp {
    pub fn new(up: bool) -> Self {
        Self {
            up,
            ..Default::default()
        }
    }

    pub fn set_up(&mut self, up: bool) {
        self.up = up;
    }

    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn push_inbound(&mut self, frame: Vec<u8>) {
        self.inbox.push_back(frame);
    }
}

impl UdpTransport for FakeUdp {
    fn send(&mut self, frame: &[u8]) -> Result<(), CoreError> {
        if !self.up {
            return Err(CoreError::UpstreamDown);
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        let frame = self.inbox.pop_front()?;
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Some(n)
    }

    fn is_up(&self) -> bool {
        self.up
    }
}

/// A clock the test drives explicitly rather than reading real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeClock {
    pub now_ms: u32,
}

impl FakeClock {
    pub fn new(now_ms: u32) -> Self {
        Self { now_ms }
    }

    pub fn advance(&mut self, delta_ms: u32) {
        self.now_ms = self.now_ms.wrapping_add(delta_ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u32 {
        self.now_ms
    }

    fn wall_seconds(&self) -> i64 {
        self.now_ms as i64 / 1000
    }
}
