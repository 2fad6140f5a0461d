//! Cryptographically secure random integers and primes.

use std::time::{Duration, Instant};

use num_bigint_dig::prime::probably_prime;
use num_bigint_dig::{BigUint, RandBigInt, RandPrime};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand_core::CryptoRngCore;

/// Miller-Rabin iteration count for prime testing.
pub const MR_ITERATIONS: usize = 30;

/// safe prime search of {bits} bits exhausted its time budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, displaydoc::Display)]
pub struct BudgetExhausted {
    pub bits: usize,
}

impl std::error::Error for BudgetExhausted {}

/// A uniform random integer in `[1, bound)`.
pub fn random_positive_int(rng: &mut (impl CryptoRngCore + ?Sized), bound: &BigUint) -> BigUint {
    debug_assert!(bound > &BigUint::one());
    loop {
        let value = rng.gen_biguint_below(bound);
        if !value.is_zero() {
            return value;
        }
    }
}

/// A uniform random element of `(Z/n)*`.
pub fn random_coprime_int(rng: &mut (impl CryptoRngCore + ?Sized), n: &BigUint) -> BigUint {
    loop {
        let value = rng.gen_biguint_below(n);
        if !value.is_zero() && value.gcd(n).is_one() {
            return value;
        }
    }
}

/// A box of `len` random bytes, for commitment blinds and shared entropy.
pub fn random_bits(rng: &mut (impl CryptoRngCore + ?Sized), len: usize) -> Box<[u8]> {
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes.into_boxed_slice()
}

/// A random probable prime of exactly `bits` bits.
pub fn random_prime(rng: &mut (impl CryptoRngCore + ?Sized), bits: usize) -> BigUint {
    rng.gen_prime(bits)
}

/// A random probable prime `p ≡ 3 (mod 4)` of exactly `bits` bits, with the
/// top two bits set so that a product of two such primes always has the full
/// `2·bits` length.
///
/// Such primes keep the Blum-modulus proof applicable without paying for a
/// full safe-prime search; production key generation uses [`safe_prime`].
pub fn random_blum_prime(rng: &mut (impl CryptoRngCore + ?Sized), bits: usize) -> BigUint {
    loop {
        let p = rng.gen_prime(bits);
        if (&p >> (bits - 2)) == BigUint::from(3u32) && (&p % 4u32) == BigUint::from(3u32) {
            return p;
        }
    }
}

/// Small primes used to pre-sieve safe prime candidates.
const SIEVE_PRIMES: [u32; 46] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193,
    197, 199, 211,
];

fn passes_sieve(q: &BigUint) -> bool {
    // Sieve both q and p = 2q+1 at once: p mod s == (2 (q mod s) + 1) mod s.
    use num_traits::ToPrimitive;
    for s in SIEVE_PRIMES {
        let r = (q % s).to_u32().unwrap_or(0);
        if r == 0 || (2 * r + 1) % s == 0 {
            return false;
        }
    }
    true
}

/// A safe prime `p` (both `p` and `(p-1)/2` probably prime) of exactly `bits`
/// bits, or [`BudgetExhausted`] when the optional deadline passes first.
pub fn safe_prime(
    rng: &mut (impl CryptoRngCore + ?Sized),
    bits: usize,
    budget: Option<Duration>,
) -> Result<BigUint, BudgetExhausted> {
    let deadline = budget.map(|budget| Instant::now() + budget);
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() > deadline {
                return Err(BudgetExhausted { bits });
            }
        }

        // Candidate Sophie Germain prime q; the safe prime is p = 2q + 1.
        // The top two bits of q are forced so that a product of two
        // resulting safe primes always has the full `2·bits` length.
        let mut q = rng.gen_biguint(bits - 1);
        q |= BigUint::from(3u32) << (bits - 3);
        if q.is_even() {
            q += 1u32;
        }
        // q must be ≡ 1 (mod 2) and ≡ 2 (mod 3), otherwise 3 | p.
        if (&q % 3u32) != BigUint::from(2u32) {
            continue;
        }
        if !passes_sieve(&q) {
            continue;
        }
        if !probably_prime(&q, MR_ITERATIONS) {
            continue;
        }
        let p: BigUint = (&q << 1) + 1u32;
        if probably_prime(&p, MR_ITERATIONS) {
            return Ok(p);
        }
    }
}

/// Two distinct safe primes of `bits` bits each, searched on all available
/// cores. Runs on OS randomness since the workers need independent generators.
pub fn safe_primes_concurrent(
    bits: usize,
    budget: Option<Duration>,
) -> Result<(BigUint, BigUint), BudgetExhausted> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let (tx, rx) = std::sync::mpsc::channel::<BigUint>();
    let stop = std::sync::atomic::AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let stop = &stop;
            scope.spawn(move || {
                let mut rng = rand_core::OsRng;
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    // Search in small slices so workers notice the stop flag.
                    if let Ok(prime) = safe_prime(&mut rng, bits, Some(Duration::from_millis(250)))
                    {
                        let _ = tx.send(prime);
                    }
                }
            });
        }
        drop(tx);

        let deadline = budget.map(|budget| Instant::now() + budget);
        let mut found: Vec<BigUint> = Vec::new();
        let result = loop {
            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(remaining) => remaining,
                    None => break Err(BudgetExhausted { bits }),
                },
                None => Duration::from_secs(365 * 24 * 3600),
            };
            match rx.recv_timeout(remaining) {
                Ok(prime) => {
                    if !found.contains(&prime) {
                        found.push(prime);
                    }
                    if found.len() == 2 {
                        let second = found.pop().expect("two primes collected");
                        let first = found.pop().expect("two primes collected");
                        break Ok((first, second));
                    }
                }
                Err(_) => break Err(BudgetExhausted { bits }),
            }
        };
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        result
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use num_bigint_dig::prime::probably_prime;
    use num_bigint_dig::BigUint;
    use num_traits::One;
    use rand_core::OsRng;

    use super::*;

    #[test]
    fn positive_int_in_range() {
        let bound = BigUint::from(100u32);
        for _ in 0..200 {
            let x = random_positive_int(&mut OsRng, &bound);
            assert!(x >= BigUint::one() && x < bound);
        }
    }

    #[test]
    fn coprime_int_is_a_unit() {
        use num_integer::Integer;
        let n = BigUint::from(3u32 * 5 * 7);
        for _ in 0..50 {
            let x = random_coprime_int(&mut OsRng, &n);
            assert!(x.gcd(&n).is_one());
        }
    }

    #[test]
    fn blum_prime_has_residue_three() {
        let p = random_blum_prime(&mut OsRng, 64);
        assert_eq!((&p % 4u32), BigUint::from(3u32));
        assert!(probably_prime(&p, MR_ITERATIONS));
    }

    #[test]
    fn safe_prime_structure() {
        let p = safe_prime(&mut OsRng, 64, None).unwrap();
        assert_eq!(p.bits(), 64);
        assert!(probably_prime(&p, MR_ITERATIONS));
        let q: BigUint = (&p - 1u32) >> 1;
        assert!(probably_prime(&q, MR_ITERATIONS));
    }

    #[test]
    fn safe_prime_respects_budget() {
        // A budget of zero must fail rather than hang.
        let result = safe_prime(&mut OsRng, 1024, Some(Duration::ZERO));
        assert!(result.is_err());
    }
}
