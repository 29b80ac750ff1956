//! Round-opening logic only the Master performs: provider sampling, threshold choice,
//! and circuit construction.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::circuit::Circuit;
use crate::error::CircuitError;
use crate::PeerId;

/// Range the reference samples its round primes from: `[2^30, 2^31 - 1]`.
pub const PRIME_RANGE: (u64, u64) = (1 << 30, (1u64 << 31) - 1);

/// Minimum number of known parties (besides the Master) before a round can open.
pub const MIN_PARTIES_FOR_ROUND: usize = 3;

/// Pick `k` providers from `known_parties`, excluding `self_id`. Uses every other known
/// party when `k` equals the full membership, otherwise samples uniformly at random.
pub fn pick_providers(known_parties: &[PeerId], self_id: PeerId, k: usize) -> Vec<PeerId> {
    if known_parties.len() == k {
        return known_parties.to_vec();
    }
    let mut pool: Vec<PeerId> = known_parties
        .iter()
        .copied()
        .filter(|p| *p != self_id)
        .collect();
    pool.shuffle(&mut rand::thread_rng());
    pool.truncate(k);
    pool
}

/// Build the sum-of-providers circuit the Master broadcasts in its SYNC frame.
pub fn make_circuit(providers: &[PeerId]) -> Result<Circuit, CircuitError> {
    Circuit::sum_chain(providers)
}

/// Randomized threshold in `[2, max(2, n/2 - 1)]`.
pub fn choose_threshold(n: usize) -> usize {
    let tmax = (n / 2).saturating_sub(1);
    if tmax <= 2 {
        2
    } else {
        rand::thread_rng().gen_range(2..=tmax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_providers_uses_everyone_when_k_matches_membership() {
        let known = vec![1, 2, 3];
        let picked = pick_providers(&known, 1, 3);
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn pick_providers_samples_k_distinct_non_self_parties() {
        let known = vec![1, 2, 3, 4, 5];
        let picked = pick_providers(&known, 1, 2);
        assert_eq!(picked.len(), 2);
        assert!(!picked.contains(&1));
        let mut sorted = picked.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), picked.len());
    }

    #[test]
    fn choose_threshold_is_always_at_least_two() {
        for n in 0..20 {
            let t = choose_threshold(n);
            assert!(t >= 2);
        }
    }

    #[test]
    fn make_circuit_has_one_input_per_provider() {
        let circuit = make_circuit(&[1, 2, 3]).unwrap();
        assert_eq!(circuit.input_ids().len(), 3);
    }
}
