//! Bijective encoder/decoder between typed protocol messages and byte buffers.
//!
//! Layout (spec.md section 4.1):
//! ```text
//! byte 0        : (type << 4) | version
//! byte 1        : origin_len L_o
//! bytes 2..2+Lo : origin PID, little-endian unsigned
//! byte 2+Lo     : payload_len L_p
//! bytes ...     : payload (L_p bytes)
//! ```

use crate::circuit::Circuit;
use crate::error::FrameError;
use crate::wire::circuit as wire_circuit;
use crate::wire::integer::{encode_minimal, get_len, push_length_prefixed, read_length_prefixed};
use crate::PeerId;

/// Protocol version, encoded in the low nibble of the frame's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// Semi-honest BGW-style protocol.
    Pceps = 0,
    /// Actively-secure variant with Feldman commitments.
    Pceas = 1,
}

impl Version {
    fn from_nibble(n: u8) -> Result<Self, FrameError> {
        match n {
            0 => Ok(Version::Pceps),
            1 => Ok(Version::Pceas),
            other => Err(FrameError::UnknownVersion(other)),
        }
    }
}

/// Frame type, encoded in the high nibble of the frame's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Advert = 0,
    Share = 1,
    Mul = 2,
    Result = 3,
    Sync = 4,
    Request = 5,
    Leave = 6,
    Bvect = 7,
    Malicious = 8,
}

impl FrameType {
    fn from_nibble(n: u8) -> Result<Self, u8> {
        match n {
            0 => Ok(FrameType::Advert),
            1 => Ok(FrameType::Share),
            2 => Ok(FrameType::Mul),
            3 => Ok(FrameType::Result),
            4 => Ok(FrameType::Sync),
            5 => Ok(FrameType::Request),
            6 => Ok(FrameType::Leave),
            7 => Ok(FrameType::Bvect),
            8 => Ok(FrameType::Malicious),
            other => Err(other),
        }
    }
}

/// Decoded payload of a frame; shape depends on [`FrameType`] and [`Version`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// ADVERT / SHARE / MUL / RESULT / REQUEST / LEAVE: a single integer.
    Integer(u64),
    /// SYNC: the round's prime modulus, its PCEAS generator (if any), and the circuit.
    Sync {
        prime_p: u64,
        prime_g: Option<u64>,
        circuit: Circuit,
    },
    /// BVECT / MALICIOUS (PCEAS only): a sequence of integers.
    List(Vec<u64>),
}

/// A fully-decoded protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub version: Version,
    pub origin: PeerId,
    pub payload: Payload,
}

impl Frame {
    pub fn new(frame_type: FrameType, version: Version, origin: PeerId, payload: Payload) -> Self {
        Frame {
            frame_type,
            version,
            origin,
            payload,
        }
    }

    /// Convenience constructor for the common single-integer-payload frame types.
    pub fn with_integer(
        frame_type: FrameType,
        version: Version,
        origin: PeerId,
        value: u64,
    ) -> Self {
        Frame::new(frame_type, version, origin, Payload::Integer(value))
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::new();
        out.push(((self.frame_type as u8) << 4) | (self.version as u8));
        push_length_prefixed(&mut out, self.origin);

        match (&self.payload, self.frame_type) {
            (Payload::Integer(v), _) => {
                push_length_prefixed(&mut out, *v);
            }
            (Payload::Sync { prime_p, prime_g, circuit }, FrameType::Sync) => {
                let encoded_circuit =
                    wire_circuit::encode(circuit).map_err(FrameError::Circuit)?;
                let p_len = get_len(*prime_p);
                let body_len = match prime_g {
                    None => 1 + p_len + encoded_circuit.len(),
                    Some(g) => 1 + p_len + 1 + get_len(*g) + encoded_circuit.len(),
                };
                out.push(body_len as u8);
                out.push(p_len as u8);
                out.extend_from_slice(&encode_minimal(*prime_p));
                if let Some(g) = prime_g {
                    let g_len = get_len(*g);
                    out.push(g_len as u8);
                    out.extend_from_slice(&encode_minimal(*g));
                }
                out.extend_from_slice(&encoded_circuit);
            }
            (Payload::List(items), FrameType::Bvect | FrameType::Malicious)
                if self.version == Version::Pceas =>
            {
                let mut body = Vec::new();
                for item in items {
                    push_length_prefixed(&mut body, *item);
                }
                out.push(body.len() as u8);
                out.extend_from_slice(&body);
            }
            _ => return Err(FrameError::UnknownType(self.frame_type as u8, self.version)),
        }

        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let type_version = *buf
            .first()
            .ok_or(FrameError::Truncated { expected: 1, got: 0 })?;
        let version = Version::from_nibble(type_version & 0x0f)?;
        let frame_type = FrameType::from_nibble(type_version >> 4)
            .map_err(|t| FrameError::UnknownType(t, version))?;

        let (origin, offset) =
            read_length_prefixed(buf, 1).ok_or(FrameError::Truncated { expected: 2, got: buf.len() })?;

        let payload_len = *buf
            .get(offset)
            .ok_or(FrameError::Truncated { expected: offset + 1, got: buf.len() })? as usize;
        let body_start = offset + 1;
        let body = buf
            .get(body_start..body_start + payload_len)
            .ok_or(FrameError::Truncated { expected: body_start + payload_len, got: buf.len() })?;

        let payload = decode_payload(frame_type, version, body)?;

        Ok(Frame {
            frame_type,
            version,
            origin,
            payload,
        })
    }
}

fn decode_payload(frame_type: FrameType, version: Version, body: &[u8]) -> Result<Payload, FrameError> {
    use FrameType::*;
    match (frame_type, version) {
        (Advert | Share | Mul | Result | Request | Leave, _) => {
            if body.len() > 8 {
                return Err(FrameError::LengthMismatch { expected: 8, got: body.len() });
            }
            let mut padded = [0u8; 8];
            padded[..body.len()].copy_from_slice(body);
            Ok(Payload::Integer(u64::from_le_bytes(padded)))
        }
        (Sync, Version::Pceps) => {
            let (prime_p, off) = read_length_prefixed(body, 0)
                .ok_or(FrameError::Truncated { expected: 1, got: body.len() })?;
            let circuit = wire_circuit::decode(&body[off..]).map_err(FrameError::Circuit)?;
            Ok(Payload::Sync {
                prime_p,
                prime_g: None,
                circuit,
            })
        }
        (Sync, Version::Pceas) => {
            let (prime_p, off) = read_length_prefixed(body, 0)
                .ok_or(FrameError::Truncated { expected: 1, got: body.len() })?;
            let (prime_g, off) = read_length_prefixed(body, off)
                .ok_or(FrameError::Truncated { expected: off + 1, got: body.len() })?;
            let circuit = wire_circuit::decode(&body[off..]).map_err(FrameError::Circuit)?;
            Ok(Payload::Sync {
                prime_p,
                prime_g: Some(prime_g),
                circuit,
            })
        }
        (Bvect | Malicious, Version::Pceas) => {
            let mut items = Vec::new();
            let mut offset = 0;
            while offset < body.len() {
                let (value, next) = read_length_prefixed(body, offset)
                    .ok_or(FrameError::Truncated { expected: offset + 1, got: body.len() })?;
                items.push(value);
                offset = next;
            }
            Ok(Payload::List(items))
        }
        (Bvect | Malicious, Version::Pceps) => {
            Err(FrameError::UnknownType(frame_type as u8, version))
        }
    }
}
