//! Wire-format layer: minimal-length integer encoding, the circuit prefix-tree codec,
//! and the frame types built on top of both.

pub mod circuit;
pub mod frame;
pub mod integer;

pub use frame::{Frame, FrameType, Payload, Version};
