//! Finite-field primitives: primality testing, prime sampling and modular inverse.
//!
//! The modulus is not known at compile time -- the Master draws a fresh prime every
//! round -- so arithmetic here is plain `u64`/`u128` modular arithmetic rather than a
//! statically-derived `ff::PrimeField`.

use rand::Rng;

/// Number of Miller-Rabin witnesses to try before accepting `n` as prime.
const MILLER_RABIN_ROUNDS: u32 = 5;

/// Field element: a residue modulo some prime `p` known by the caller.
pub type FieldElement = u64;

/// Multiply two residues modulo `p` without overflowing `u64`.
pub fn mul_mod(a: u64, b: u64, p: u64) -> u64 {
    ((a as u128 * b as u128) % p as u128) as u64
}

/// Add two residues modulo `p`.
pub fn add_mod(a: u64, b: u64, p: u64) -> u64 {
    ((a as u128 + b as u128) % p as u128) as u64
}

/// `base^exp mod p` by repeated squaring.
pub fn pow_mod(mut base: u64, mut exp: u64, p: u64) -> u64 {
    let mut result = 1u64 % p;
    base %= p;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, p);
        }
        base = mul_mod(base, base, p);
        exp >>= 1;
    }
    result
}

/// Modular inverse of `a` modulo prime `p`, via Fermat's little theorem (`a^(p-2) mod p`).
///
/// Returns `None` if `a mod p == 0`, in which case no inverse exists.
pub fn mod_inverse(a: i64, p: u64) -> Option<u64> {
    let a_mod = a.rem_euclid(p as i64) as u64;
    if a_mod == 0 {
        return None;
    }
    Some(pow_mod(a_mod, p - 2, p))
}

/// Miller-Rabin primality test with [`MILLER_RABIN_ROUNDS`] random witnesses.
///
/// A `true` result is only probabilistic, but the false-positive rate is negligible
/// for the number of rounds used here. `n < 2` is rejected outright.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 {
        return true;
    }
    if n.is_multiple_of(2) {
        return false;
    }

    let mut d = n - 1;
    let mut s = 0u32;
    while d.is_multiple_of(2) {
        d /= 2;
        s += 1;
    }

    let mut rng = rand::thread_rng();
    'witness: for _ in 0..MILLER_RABIN_ROUNDS {
        let a = rng.gen_range(2..n);
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..s - 1 {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Draw a uniform random prime in the inclusive range `[a, b]` (bounds swapped if `b < a`).
///
/// Retries until a prime is found; callers should keep the range wide enough that this
/// terminates quickly (the reference uses 32-bit ranges).
pub fn random_prime_in_range(a: u64, b: u64) -> u64 {
    let (lo, hi) = if b < a { (b, a) } else { (a, b) };
    let mut rng = rand::thread_rng();
    loop {
        let candidate = rng.gen_range(lo..=hi);
        if is_prime(candidate) {
            return candidate;
        }
    }
}
