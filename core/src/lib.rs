//! Core library for a decentralized multi-party computation network: Shamir secret
//! sharing and BGW-style circuit evaluation among peers discovered by UDP broadcast,
//! with an actively-secure variant (PCEAS) adding Feldman VSS commitments.

pub mod circuit;
pub mod error;
pub mod field;
pub mod peer;
pub mod shamir;
pub mod transport;
pub mod wire;

/// Identifier of a party in the network. Party id `0` is reserved and must never be
/// assigned (see [`shamir::create_shares`]).
pub type PeerId = u64;
