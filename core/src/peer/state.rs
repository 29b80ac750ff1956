//! Per-party round state: membership, blacklist and the current round's scratch data.

use std::collections::HashMap;
use std::time::Duration;

use crate::circuit::Circuit;
use crate::wire::Version;
use crate::PeerId;

/// Mirrors the reference `Party.START`/`AWAITING`/`SYNC`/`COMP`/`RES` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Start,
    Awaiting,
    Sync,
    Comp,
    Res,
}

/// A party's membership, blacklist, and the current round's scratch data.
pub struct PeerState {
    pub party_id: PeerId,
    pub master: bool,
    pub is_provider: bool,
    pub state: ProtocolState,
    pub known_parties: Vec<PeerId>,
    pub blacklist: Vec<PeerId>,
    pub shares: HashMap<PeerId, u64>,
    pub b_vectors: HashMap<PeerId, Vec<u64>>,
    pub circuit: Option<Circuit>,
    pub applicant: Option<PeerId>,
    pub k: usize,
    pub prime_p: u64,
    pub prime_g: Option<u64>,
    pub results: HashMap<PeerId, u64>,
    pub r_vect: HashMap<PeerId, u64>,
    pub final_result: Option<u64>,
    pub version: Version,
    pub stop_prot: bool,
    pub timeout: Duration,
}

impl PeerState {
    pub fn new(party_id: PeerId, master: bool, version: Version) -> Self {
        PeerState {
            party_id,
            master,
            is_provider: false,
            state: ProtocolState::Start,
            known_parties: vec![party_id],
            blacklist: Vec::new(),
            shares: HashMap::new(),
            b_vectors: HashMap::new(),
            circuit: None,
            applicant: None,
            k: 0,
            prime_p: 0,
            prime_g: None,
            results: HashMap::new(),
            r_vect: HashMap::new(),
            final_result: None,
            version,
            stop_prot: false,
            timeout: Duration::from_secs(10),
        }
    }

    /// Reset everything scoped to a single round; membership and blacklist survive.
    pub fn clean(&mut self) {
        self.state = ProtocolState::Awaiting;
        self.is_provider = false;
        self.shares.clear();
        self.b_vectors.clear();
        self.circuit = None;
        self.applicant = None;
        self.k = 0;
        self.prime_p = 0;
        self.prime_g = None;
        self.results.clear();
        self.r_vect.clear();
        self.final_result = None;
        self.stop_prot = false;
    }

    pub fn is_blacklisted(&self, id: PeerId) -> bool {
        self.blacklist.contains(&id)
    }

    /// Blacklist `id` and drop it from the known-parties set, idempotently.
    pub fn blacklist_party(&mut self, id: PeerId) {
        if !self.blacklist.contains(&id) {
            self.blacklist.push(id);
        }
        self.known_parties.retain(|p| *p != id);
    }

    /// Add `id` to the known-parties set if it is new and not blacklisted.
    /// Returns `true` if it was newly added.
    pub fn learn_party(&mut self, id: PeerId) -> bool {
        if self.is_blacklisted(id) {
            return false;
        }
        if self.known_parties.contains(&id) {
            return false;
        }
        self.known_parties.push(id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learn_party_is_idempotent_and_rejects_blacklisted() {
        let mut state = PeerState::new(1, false, Version::Pceps);
        assert!(state.learn_party(2));
        assert!(!state.learn_party(2));

        state.blacklist_party(3);
        assert!(!state.learn_party(3));
        assert_eq!(state.known_parties, vec![1, 2]);
    }

    #[test]
    fn clean_preserves_membership_and_blacklist() {
        let mut state = PeerState::new(1, true, Version::Pceas);
        state.learn_party(2);
        state.blacklist_party(4);
        state.k = 3;
        state.prime_p = 31;
        state.shares.insert(2, 9);
        state.state = ProtocolState::Comp;

        state.clean();

        assert_eq!(state.state, ProtocolState::Awaiting);
        assert_eq!(state.known_parties, vec![1, 2]);
        assert_eq!(state.blacklist, vec![4]);
        assert_eq!(state.k, 0);
        assert!(state.shares.is_empty());
    }
}
