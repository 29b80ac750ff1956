//! Arithmetic-circuit data model: an arena of [`Gate`]s evaluated in topological order.
//!
//! The reference implementation represents gates as mutually-referencing objects and
//! overloads a SHARE gate's `value` field to mean "reserved party id" before evaluation
//! and "share value" after. Per SPEC_FULL.md section 9 this port instead stores gates in
//! a flat arena (`Vec<Gate>`), references as indices into it, and keeps the evaluator's
//! "substitute my share for this party id" step in a side map rather than inside the gate.

use std::collections::HashMap;

use crate::error::CircuitError;
use crate::field::{add_mod, mul_mod};
use crate::PeerId;

/// Index of a gate within a [`Circuit`]'s arena.
pub type GateId = usize;

/// A node in the arithmetic circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Input leaf carrying the id of the party whose share fills this slot.
    Share(PeerId),
    /// Public constant leaf.
    Const(u64),
    /// Sum of two gates, modulo the circuit's prime.
    Add(GateId, GateId),
    /// Product of two gates (interactive re-sharing step, refused by this port -- see
    /// SPEC_FULL.md section 9 / the MUL redesign flag).
    Mul(GateId, GateId),
    /// A gate's value multiplied by a public constant.
    CMul(u64, GateId),
}

impl Gate {
    /// Expected number of inputs for this gate's type (0 for leaves).
    pub fn arity(&self) -> usize {
        match self {
            Gate::Share(_) | Gate::Const(_) => 0,
            Gate::CMul(_, _) => 1,
            Gate::Add(_, _) | Gate::Mul(_, _) => 2,
        }
    }
}

/// An ordered, topologically-sorted arena of gates. The last gate is the circuit's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Circuit {
    gates: Vec<Gate>,
    /// Values computed so far, indexed like `gates`. `None` means "not yet evaluated" --
    /// the reference's `if not val` zero-is-missing bug (SPEC_FULL.md section 9) is fixed
    /// by using an explicit sentinel here instead.
    values: Vec<Option<u64>>,
    cursor: usize,
}

impl Circuit {
    /// Build a circuit from a flat, already topologically-sorted gate list.
    pub fn new(gates: Vec<Gate>) -> Self {
        let values = vec![None; gates.len()];
        Circuit {
            gates,
            values,
            cursor: 0,
        }
    }

    /// Append a gate, returning its id. Callers are responsible for only referencing
    /// earlier gate ids, which keeps the arena topologically sorted by construction.
    pub fn push(&mut self, gate: Gate) -> GateId {
        self.gates.push(gate);
        self.values.push(None);
        self.gates.len() - 1
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Id of the output (root) gate.
    pub fn root(&self) -> Option<GateId> {
        if self.gates.is_empty() {
            None
        } else {
            Some(self.gates.len() - 1)
        }
    }

    /// Party ids appearing as SHARE leaves anywhere in the circuit.
    pub fn input_ids(&self) -> Vec<PeerId> {
        let mut ids = Vec::new();
        for gate in &self.gates {
            if let Gate::Share(pid) = gate {
                if !ids.contains(pid) {
                    ids.push(*pid);
                }
            }
        }
        ids
    }

    /// Next unevaluated gate id, advancing the internal cursor, or `None` when exhausted.
    pub fn next_gate_id(&mut self) -> Option<GateId> {
        if self.cursor >= self.gates.len() {
            return None;
        }
        let id = self.cursor;
        self.cursor += 1;
        Some(id)
    }

    fn value_of(&self, id: GateId) -> Result<u64, CircuitError> {
        self.values[id].ok_or(CircuitError::MissingInput)
    }

    /// Compute gate `id`, substituting `shares[pid]` for SHARE leaves. Refuses MUL gates
    /// outright (see the MUL redesign flag) rather than silently producing a wrong value.
    pub fn compute_gate(
        &mut self,
        id: GateId,
        prime: u64,
        shares: &HashMap<PeerId, u64>,
    ) -> Result<u64, CircuitError> {
        let result = match &self.gates[id] {
            Gate::Const(v) => *v % prime,
            Gate::Share(pid) => *shares
                .get(pid)
                .ok_or(CircuitError::MissingShare(*pid))?
                % prime,
            Gate::Add(a, b) => add_mod(self.value_of(*a)?, self.value_of(*b)?, prime),
            Gate::Mul(_, _) => return Err(CircuitError::MulUnsupported),
            Gate::CMul(c, a) => mul_mod(*c % prime, self.value_of(*a)?, prime),
        };
        self.values[id] = Some(result);
        Ok(result)
    }

    /// Evaluate every gate in stored order, returning the root's result.
    ///
    /// `shares` must contain an entry for every party id in [`Circuit::input_ids`].
    pub fn evaluate(&mut self, prime: u64, shares: &HashMap<PeerId, u64>) -> Result<u64, CircuitError> {
        self.cursor = 0;
        let mut last = None;
        while let Some(id) = self.next_gate_id() {
            last = Some(self.compute_gate(id, prime, shares)?);
        }
        last.ok_or(CircuitError::Empty)
    }

    /// Build the left-folded chain `((s1+s2)+s3)+...` that the Master uses for a
    /// sum-of-providers' -secrets computation.
    pub fn sum_chain(providers: &[PeerId]) -> Result<Self, CircuitError> {
        if providers.len() < 2 {
            return Err(CircuitError::ArityMismatch {
                expected: 2,
                got: providers.len(),
            });
        }
        let mut circuit = Circuit::default();
        let leaves: Vec<GateId> = providers
            .iter()
            .map(|pid| circuit.push(Gate::Share(*pid)))
            .collect();

        let mut acc = circuit.push(Gate::Add(leaves[0], leaves[1]));
        for &leaf in &leaves[2..] {
            acc = circuit.push(Gate::Add(acc, leaf));
        }
        Ok(circuit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_chain_evaluates_linearly() {
        let mut circuit = Circuit::sum_chain(&[1, 2, 3]).unwrap();
        let mut shares = HashMap::new();
        shares.insert(1, 5);
        shares.insert(2, 7);
        shares.insert(3, 11);

        let result = circuit.evaluate(31, &shares).unwrap();
        assert_eq!(result, 5 + 7 + 11);
    }

    #[test]
    fn missing_share_is_an_error() {
        let mut circuit = Circuit::sum_chain(&[1, 2]).unwrap();
        let shares = HashMap::new();
        assert_eq!(
            circuit.evaluate(31, &shares),
            Err(CircuitError::MissingShare(1))
        );
    }

    #[test]
    fn mul_gate_is_refused() {
        let mut circuit = Circuit::default();
        let a = circuit.push(Gate::Share(1));
        let b = circuit.push(Gate::Share(2));
        circuit.push(Gate::Mul(a, b));

        let mut shares = HashMap::new();
        shares.insert(1, 3);
        shares.insert(2, 4);
        assert_eq!(circuit.evaluate(31, &shares), Err(CircuitError::MulUnsupported));
    }

    #[test]
    fn cmul_and_const_and_input_ids() {
        let mut circuit = Circuit::default();
        let share = circuit.push(Gate::Share(9));
        circuit.push(Gate::CMul(2, share));
        assert_eq!(circuit.input_ids(), vec![9]);

        let mut shares = HashMap::new();
        shares.insert(9, 10);
        assert_eq!(circuit.evaluate(31, &shares).unwrap(), 20);
    }
}
