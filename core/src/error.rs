//! Typed error taxonomy for the wire codec, the circuit model and the protocol driver.
//!
//! Every fallible operation in this crate returns one of these instead of panicking;
//! see spec.md/SPEC_FULL.md section 7 for the intended handling of each variant.

use thiserror::Error;

use crate::PeerId;

/// Errors raised while decoding a frame or an encoded circuit from raw bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown protocol version {0}")]
    UnknownVersion(u8),
    #[error("unknown frame type {0} for version {1:?}")]
    UnknownType(u8, crate::wire::Version),
    #[error("frame buffer truncated: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("integer payload body is {got} bytes, expected at most {expected}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("circuit translation failed: {0}")]
    Circuit(#[from] CircuitError),
}

/// Errors raised while decoding, constructing or evaluating a circuit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CircuitError {
    #[error("circuit is incomplete and cannot be translated")]
    Translation,
    #[error("unknown gate type byte 0x{0:02x}")]
    UnknownGate(u8),
    #[error("MUL gates are not supported by this port (interactive resharing is out of scope)")]
    MulUnsupported,
    #[error("gate expected {expected} inputs but got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("gate input has not been computed yet")]
    MissingInput,
    #[error("circuit is empty")]
    Empty,
    #[error("no share available for party {0}")]
    MissingShare(PeerId),
}

/// Errors raised while creating or reconstructing Shamir shares.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShamirError {
    #[error("party id 0 is reserved and must not appear in the id list")]
    ReservedZeroId,
    #[error("secret {secret} is not smaller than the field size {prime}")]
    SecretTooLarge { secret: u64, prime: u64 },
    #[error("threshold {k} must be lower than the number of parties {n}")]
    ThresholdTooHigh { k: usize, n: usize },
    #[error("recombination vector has {vector_len} entries but {results_len} results were given")]
    SizeMismatch { vector_len: usize, results_len: usize },
    #[error("party {0} has a result but no recombination coefficient")]
    UnknownParty(PeerId),
    #[error("share from party {0} failed its Feldman commitment check")]
    CommitmentFailed(PeerId),
}

/// Errors raised while driving the peer protocol state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("timed out waiting for {phase}")]
    Timeout { phase: &'static str },
    #[error("sanity check failed before computation")]
    SanityCheckFailed,
    #[error("share from party {0} failed VSS verification")]
    VssFailure(PeerId),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Shamir(#[from] ShamirError),
    #[error(transparent)]
    Circuit(#[from] CircuitError),
}
