//! Peer state machine: membership/round state, Master-only round-opening logic, and the
//! driver that turns inbound frames into state transitions and outbound frames.

pub mod driver;
pub mod master;
pub mod state;

pub use driver::{Action, Driver};
pub use state::{PeerState, ProtocolState};
