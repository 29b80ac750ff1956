//! Prefix-tree binary encoding of a [`Circuit`], rooted at its output gate.
//!
//! Gate type bytes: `0x10` ADD, `0x11` MUL, `0x12` CMUL(len,val), `0x00` SHARE(len,val),
//! `0x01` CONST(len,val). ADD/MUL are followed by two recursively encoded operand
//! subtrees, CMUL by one. Decoding uses the stack-based algorithm from spec.md section
//! 4.1: a non-leaf is pushed with its expected arity, each decoded subtree becomes its
//! next input, and when a gate's arity is satisfied it is flushed into the circuit's
//! gate list -- yielding a sequence that is a topological order of the DAG.

use crate::circuit::{Circuit, Gate, GateId};
use crate::error::CircuitError;
use crate::wire::integer::encode_minimal;

const TAG_ADD: u8 = 0x10;
const TAG_MUL: u8 = 0x11;
const TAG_CMUL: u8 = 0x12;
const TAG_SHARE: u8 = 0x00;
const TAG_CONST: u8 = 0x01;

/// Encode `circuit`'s gate tree, rooted at its last (output) gate.
pub fn encode(circuit: &Circuit) -> Result<Vec<u8>, CircuitError> {
    let root = circuit.root().ok_or(CircuitError::Empty)?;
    let mut out = Vec::new();
    encode_gate(circuit, root, &mut out);
    Ok(out)
}

fn encode_gate(circuit: &Circuit, id: GateId, out: &mut Vec<u8>) {
    match circuit.gates()[id] {
        Gate::Add(a, b) => {
            out.push(TAG_ADD);
            encode_gate(circuit, a, out);
            encode_gate(circuit, b, out);
        }
        Gate::Mul(a, b) => {
            out.push(TAG_MUL);
            encode_gate(circuit, a, out);
            encode_gate(circuit, b, out);
        }
        Gate::CMul(c, a) => {
            out.push(TAG_CMUL);
            push_tagged_value(out, c);
            encode_gate(circuit, a, out);
        }
        Gate::Share(pid) => {
            out.push(TAG_SHARE);
            push_tagged_value(out, pid);
        }
        Gate::Const(v) => {
            out.push(TAG_CONST);
            push_tagged_value(out, v);
        }
    }
}

fn push_tagged_value(out: &mut Vec<u8>, v: u64) {
    let encoded = encode_minimal(v);
    out.push(encoded.len() as u8);
    out.extend_from_slice(&encoded);
}

/// A gate that still needs operands filled in before it can be flushed into the circuit.
struct Pending {
    gate_kind: PendingKind,
    inputs: Vec<GateId>,
}

enum PendingKind {
    Add,
    Mul,
    CMul(u64),
}

impl Pending {
    fn arity(&self) -> usize {
        match self.gate_kind {
            PendingKind::Add | PendingKind::Mul => 2,
            PendingKind::CMul(_) => 1,
        }
    }

    fn into_gate(self, inputs: [GateId; 2]) -> Gate {
        match self.gate_kind {
            PendingKind::Add => Gate::Add(inputs[0], inputs[1]),
            PendingKind::Mul => Gate::Mul(inputs[0], inputs[1]),
            PendingKind::CMul(c) => Gate::CMul(c, inputs[0]),
        }
    }
}

/// Decode a circuit from its prefix-tree encoding.
pub fn decode(mut bytes: &[u8]) -> Result<Circuit, CircuitError> {
    let mut circuit = Circuit::default();
    let mut stack: Vec<Pending> = Vec::new();

    while !bytes.is_empty() {
        let (leaf_id, rest) = decode_one(&mut circuit, bytes, &mut stack)?;
        bytes = rest;
        attach_child(&mut circuit, &mut stack, leaf_id);
    }

    if !stack.is_empty() {
        return Err(CircuitError::Translation);
    }

    Ok(circuit)
}

/// Decode exactly one gate tag (and, for leaves, its value) from the front of `bytes`.
/// Non-leaf gates are pushed onto `stack` and this returns `None` as their "id" --
/// instead the caller keeps consuming until the pushed gate's children are all decoded.
fn decode_one<'a>(
    circuit: &mut Circuit,
    bytes: &'a [u8],
    stack: &mut Vec<Pending>,
) -> Result<(Option<GateId>, &'a [u8]), CircuitError> {
    let tag = *bytes.first().ok_or(CircuitError::Translation)?;
    let rest = &bytes[1..];

    match tag {
        TAG_ADD => {
            stack.push(Pending {
                gate_kind: PendingKind::Add,
                inputs: Vec::new(),
            });
            Ok((None, rest))
        }
        TAG_MUL => {
            stack.push(Pending {
                gate_kind: PendingKind::Mul,
                inputs: Vec::new(),
            });
            Ok((None, rest))
        }
        TAG_CMUL => {
            let (value, rest) = read_tagged_value(rest)?;
            stack.push(Pending {
                gate_kind: PendingKind::CMul(value),
                inputs: Vec::new(),
            });
            Ok((None, rest))
        }
        TAG_SHARE => {
            let (value, rest) = read_tagged_value(rest)?;
            Ok((Some(circuit.push(Gate::Share(value))), rest))
        }
        TAG_CONST => {
            let (value, rest) = read_tagged_value(rest)?;
            Ok((Some(circuit.push(Gate::Const(value))), rest))
        }
        other => Err(CircuitError::UnknownGate(other)),
    }
}

fn read_tagged_value(bytes: &[u8]) -> Result<(u64, &[u8]), CircuitError> {
    let len = *bytes.first().ok_or(CircuitError::Translation)? as usize;
    let value_bytes = bytes.get(1..1 + len).ok_or(CircuitError::Translation)?;
    let mut padded = [0u8; 8];
    padded[..len].copy_from_slice(value_bytes);
    Ok((u64::from_le_bytes(padded), &bytes[1 + len..]))
}

/// Feed a freshly-decoded leaf (or `None` for a just-pushed internal node) to the gate on
/// top of the stack, flushing any gate whose arity is now satisfied -- possibly cascading
/// into its own parent.
fn attach_child(circuit: &mut Circuit, stack: &mut Vec<Pending>, leaf_id: Option<GateId>) {
    let mut child = leaf_id;
    loop {
        let Some(id) = child else { return };
        let Some(top) = stack.last_mut() else {
            return;
        };
        top.inputs.push(id);
        if top.inputs.len() == top.arity() {
            let pending = stack.pop().unwrap();
            let arity = pending.arity();
            let mut inputs = [0usize; 2];
            inputs[..arity].copy_from_slice(&pending.inputs);
            let gate = pending.into_gate(inputs);
            child = Some(circuit.push(gate));
        } else {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_circuit_encode() {
        // MUL(ADD(SHARE(1),SHARE(2)), CMUL(2,SHARE(2)))
        let mut circuit = Circuit::default();
        let s1 = circuit.push(Gate::Share(1));
        let s2 = circuit.push(Gate::Share(2));
        let add = circuit.push(Gate::Add(s1, s2));
        let s2b = circuit.push(Gate::Share(2));
        let cmul = circuit.push(Gate::CMul(2, s2b));
        circuit.push(Gate::Mul(add, cmul));

        let encoded = encode(&circuit).unwrap();
        assert_eq!(
            encoded,
            vec![
                0x11, 0x10, 0x00, 0x01, 0x01, 0x00, 0x01, 0x02, 0x12, 0x01, 0x02, 0x00, 0x01, 0x02
            ]
        );
    }

    #[test]
    fn roundtrip_sum_chain() {
        // Decoding reconstructs the gate arena in its own topological order (a flush on
        // arity-completion, not the original push order), so the roundtrip invariant is
        // "evaluates the same", not "identical gate list" -- confirm both.
        let circuit = Circuit::sum_chain(&[1, 2, 3, 4]).unwrap();
        let encoded = encode(&circuit).unwrap();
        let mut decoded = decode(&encoded).unwrap();
        assert_eq!(encode(&decoded).unwrap(), encoded);

        let mut shares = std::collections::HashMap::new();
        shares.insert(1u64, 5u64);
        shares.insert(2, 7);
        shares.insert(3, 11);
        shares.insert(4, 13);
        assert_eq!(decoded.evaluate(31, &shares).unwrap(), (5 + 7 + 11 + 13) % 31);
    }

    #[test]
    fn truncated_circuit_is_translation_error() {
        // ADD with only one child ever supplied.
        let bytes = vec![0x10u8, 0x00, 0x01, 0x01];
        assert_eq!(decode(&bytes), Err(CircuitError::Translation));
    }

    #[test]
    fn unknown_gate_tag_is_rejected() {
        let bytes = vec![0xffu8];
        assert_eq!(decode(&bytes), Err(CircuitError::UnknownGate(0xff)));
    }
}
