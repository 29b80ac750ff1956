//! Shamir secret sharing over a prime field, plus Feldman VSS commitments for PCEAS.
//!
//! Polynomial coefficients and per-party shares are plain `u64` residues mod `p`; the
//! Lagrange recombination coefficients use [`crate::field::mod_inverse`] rather than the
//! reference's real-number division truncated to an int (see SPEC_FULL.md's Redesign
//! Flags -- that version silently rounds and can reconstruct the wrong secret).

use std::collections::HashMap;

use rand::Rng;

use crate::error::ShamirError;
use crate::field::{add_mod, mod_inverse, mul_mod, pow_mod};
use crate::PeerId;

/// Output of [`create_shares`]: one share per party, plus a Feldman commitment vector
/// when a PCEAS generator was supplied.
#[derive(Debug)]
pub struct Sharing {
    pub shares: HashMap<PeerId, u64>,
    pub commitments: Option<Vec<u64>>,
}

/// Split `secret` into shares for `ids` using a random degree-`(k-1)` polynomial mod `p`.
///
/// When `pceas_g` is `Some(g)`, also returns the Feldman commitment vector
/// `B_j = coeff_j * g mod p`, which lets a recipient verify its share without learning
/// the secret (see [`verify_share`]).
pub fn create_shares(
    secret: u64,
    ids: &[PeerId],
    k: usize,
    p: u64,
    pceas_g: Option<u64>,
) -> Result<Sharing, ShamirError> {
    if ids.contains(&0) {
        return Err(ShamirError::ReservedZeroId);
    }
    if secret >= p {
        return Err(ShamirError::SecretTooLarge { secret, prime: p });
    }
    if ids.len() <= k {
        return Err(ShamirError::ThresholdTooHigh { k, n: ids.len() });
    }

    let mut rng = rand::thread_rng();
    let mut coeffs = Vec::with_capacity(k);
    coeffs.push(secret);
    for _ in 0..k - 1 {
        coeffs.push(rng.gen_range(0..p));
    }

    let shares = ids
        .iter()
        .map(|&id| (id, eval_polynomial(&coeffs, id, p)))
        .collect();

    let commitments = pceas_g.map(|g| coeffs.iter().map(|&c| mul_mod(c, g, p)).collect());

    Ok(Sharing { shares, commitments })
}

fn eval_polynomial(coeffs: &[u64], x: PeerId, p: u64) -> u64 {
    coeffs
        .iter()
        .enumerate()
        .fold(0u64, |acc, (j, &c)| add_mod(acc, mul_mod(c, pow_mod(x, j as u64, p), p), p))
}

/// Verify that `share` is consistent with Feldman commitment vector `commitments` for
/// party `id`: `share * g mod p == sum_j commitments[j] * id^j mod p`.
pub fn verify_share(id: PeerId, share: u64, commitments: &[u64], g: u64, p: u64) -> bool {
    let lhs = mul_mod(share, g, p);
    let rhs = commitments
        .iter()
        .enumerate()
        .fold(0u64, |acc, (j, &b)| add_mod(acc, mul_mod(b, pow_mod(id, j as u64, p), p), p));
    lhs == rhs
}

/// Lagrange coefficients for reconstructing the secret from shares at `parties_id`,
/// evaluated at `x = 0`: `delta_i = prod_{j != i} (-j / (i - j)) mod p`.
pub fn compute_recombination_vector(parties_id: &[PeerId], p: u64) -> HashMap<PeerId, u64> {
    parties_id
        .iter()
        .map(|&i| {
            let mut delta = 1u64;
            for &j in parties_id {
                if i == j {
                    continue;
                }
                let numerator = -(j as i64);
                let denominator = i as i64 - j as i64;
                let inv = mod_inverse(denominator, p).expect("distinct party ids share no factor of p");
                let term = mul_mod(numerator.rem_euclid(p as i64) as u64, inv, p);
                delta = mul_mod(delta, term, p);
            }
            (i, delta)
        })
        .collect()
}

/// Reconstruct the secret given each party's partial result and the recombination
/// vector produced by [`compute_recombination_vector`] over the same party set.
pub fn compute_mpc_result(
    recombination: &HashMap<PeerId, u64>,
    results: &HashMap<PeerId, u64>,
    p: u64,
) -> Result<u64, ShamirError> {
    if recombination.len() != results.len() {
        return Err(ShamirError::SizeMismatch {
            vector_len: recombination.len(),
            results_len: results.len(),
        });
    }
    let mut total = 0u64;
    for (&id, &result) in results {
        let coeff = *recombination
            .get(&id)
            .ok_or(ShamirError::UnknownParty(id))?;
        total = add_mod(total, mul_mod(result, coeff, p), p);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_recombination_vector() {
        let vector = compute_recombination_vector(&[1, 2, 3], 31);
        assert_eq!(vector[&1], 3);
        assert_eq!(vector[&2], 28);
        assert_eq!(vector[&3], 1);
    }

    #[test]
    fn create_shares_rejects_reserved_zero_id() {
        assert_eq!(
            create_shares(5, &[0, 1, 2, 3], 2, 31, None).unwrap_err(),
            ShamirError::ReservedZeroId
        );
    }

    #[test]
    fn create_shares_rejects_secret_too_large() {
        assert_eq!(
            create_shares(31, &[1, 2, 3], 2, 31, None).unwrap_err(),
            ShamirError::SecretTooLarge { secret: 31, prime: 31 }
        );
    }

    #[test]
    fn create_shares_rejects_threshold_too_high() {
        assert_eq!(
            create_shares(5, &[1, 2], 2, 31, None).unwrap_err(),
            ShamirError::ThresholdTooHigh { k: 2, n: 2 }
        );
    }

    #[test]
    fn shares_reconstruct_secret() {
        let p = 2147483659;
        let ids = [1u64, 2, 3, 4, 5];
        let k = 3;
        let secret = 123456;

        let sharing = create_shares(secret, &ids, k, p, None).unwrap();
        let subset = &ids[..k + 1];
        let vector = compute_recombination_vector(subset, p);
        let results: HashMap<PeerId, u64> = subset
            .iter()
            .map(|id| (*id, sharing.shares[id]))
            .collect();

        assert_eq!(compute_mpc_result(&vector, &results, p).unwrap(), secret);
    }

    #[test]
    fn any_threshold_plus_one_subset_reconstructs_the_same_secret() {
        let p = 2147483659;
        let ids = [1u64, 2, 3, 4, 5, 6];
        let k = 2;
        let secret = 77;
        let sharing = create_shares(secret, &ids, k, p, None).unwrap();

        for subset in [&ids[0..3], &ids[1..4], &ids[3..6]] {
            let vector = compute_recombination_vector(subset, p);
            let results: HashMap<PeerId, u64> =
                subset.iter().map(|id| (*id, sharing.shares[id])).collect();
            assert_eq!(compute_mpc_result(&vector, &results, p).unwrap(), secret);
        }
    }

    #[test]
    fn feldman_commitments_verify_genuine_shares_and_reject_tampering() {
        let p = 2147483659;
        let g = 1234567;
        let ids = [1u64, 2, 3, 4];
        let k = 2;
        let sharing = create_shares(999, &ids, k, p, Some(g)).unwrap();
        let commitments = sharing.commitments.unwrap();

        for &id in &ids {
            assert!(verify_share(id, sharing.shares[&id], &commitments, g, p));
        }
        assert!(!verify_share(1, sharing.shares[&1] + 1, &commitments, g, p));
    }

    #[test]
    fn linearity_of_evaluation_holds_share_by_share() {
        let p = 2147483659;
        let ids = [1u64, 2, 3, 4];
        let k = 2;
        let a = create_shares(10, &ids, k, p, None).unwrap();
        let b = create_shares(20, &ids, k, p, None).unwrap();

        let summed: HashMap<PeerId, u64> = ids
            .iter()
            .map(|id| (*id, add_mod(a.shares[id], b.shares[id], p)))
            .collect();
        let vector = compute_recombination_vector(&ids[..k + 1], p);
        let subset: HashMap<PeerId, u64> = ids[..k + 1]
            .iter()
            .map(|id| (*id, summed[id]))
            .collect();
        assert_eq!(compute_mpc_result(&vector, &subset, p).unwrap(), 30);
    }
}
