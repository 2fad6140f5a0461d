//! Modular arithmetic over arbitrary-precision integers.

use num_bigint_dig::{BigInt, BigUint, ModInverse};
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Arithmetic helper bound to a fixed modulus. All results are reduced to `[0, m)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInt {
    modulus: BigUint,
}

impl ModInt {
    pub fn new(modulus: BigUint) -> Self {
        debug_assert!(!modulus.is_zero());
        Self { modulus }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn reduce(&self, x: &BigUint) -> BigUint {
        x % &self.modulus
    }

    pub fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + b) % &self.modulus
    }

    pub fn sub(&self, a: &BigUint, b: &BigUint) -> BigUint {
        let (a, b) = (a % &self.modulus, b % &self.modulus);
        if a >= b {
            a - b
        } else {
            &self.modulus - b + a
        }
    }

    pub fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.modulus
    }

    pub fn exp(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        base.modpow(exponent, &self.modulus)
    }

    /// Exponentiation with a possibly negative exponent. Fails when the base
    /// is not invertible and the exponent is negative.
    pub fn exp_signed(&self, base: &BigUint, exponent: &BigInt) -> Option<BigUint> {
        let magnitude = exponent.abs().to_biguint()?;
        if exponent.is_negative() {
            let inverted = self.inv(base)?;
            Some(self.exp(&inverted, &magnitude))
        } else {
            Some(self.exp(base, &magnitude))
        }
    }

    /// Modular inverse. `None` when the argument shares a factor with the modulus.
    pub fn inv(&self, a: &BigUint) -> Option<BigUint> {
        mod_inverse(a, &self.modulus)
    }

    /// Division via the modular inverse of the divisor.
    pub fn div(&self, a: &BigUint, b: &BigUint) -> Option<BigUint> {
        Some(self.mul(a, &self.inv(b)?))
    }
}

/// `a^{-1} mod m`, or `None` when `gcd(a, m) != 1`.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let inverse: BigInt = a.mod_inverse(m)?;
    inverse.mod_floor(&BigInt::from(m.clone())).to_biguint()
}

/// `true` iff `0 <= x < bound`. Violations on received values signal a malicious peer.
pub fn is_in_interval(x: &BigUint, bound: &BigUint) -> bool {
    x < bound
}

/// `base^exponent` over plain (non-modular) integers.
pub fn pow(base: &BigUint, exponent: u32) -> BigUint {
    let mut result = BigUint::one();
    for _ in 0..exponent {
        result *= base;
    }
    result
}

/// The Jacobi symbol `(a/n)` for odd `n`; one of `-1`, `0`, `1`.
pub fn jacobi(a: &BigUint, n: &BigUint) -> i8 {
    debug_assert!(n.is_odd());
    let mut a = a % n;
    let mut n = n.clone();
    let mut t: i8 = 1;
    while !a.is_zero() {
        while a.is_even() {
            a >>= 1;
            let r = (&n % 8u32).to_u32().unwrap_or(0);
            if r == 3 || r == 5 {
                t = -t;
            }
        }
        core::mem::swap(&mut a, &mut n);
        if (&a % 4u32).to_u32() == Some(3) && (&n % 4u32).to_u32() == Some(3) {
            t = -t;
        }
        a %= &n;
    }
    if n.is_one() {
        t
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use num_bigint_dig::BigUint;
    use num_traits::One;

    use super::{is_in_interval, jacobi, ModInt};

    fn uint(x: u64) -> BigUint {
        BigUint::from(x)
    }

    #[test]
    fn ops_reduce() {
        let m = ModInt::new(uint(17));
        assert_eq!(m.add(&uint(16), &uint(5)), uint(4));
        assert_eq!(m.sub(&uint(3), &uint(5)), uint(15));
        assert_eq!(m.mul(&uint(6), &uint(6)), uint(2));
        assert_eq!(m.exp(&uint(2), &uint(10)), uint(4));
    }

    #[test]
    fn inverse() {
        let m = ModInt::new(uint(17));
        let inv = m.inv(&uint(5)).unwrap();
        assert_eq!(m.mul(&uint(5), &inv), BigUint::one());
        assert_eq!(m.div(&uint(10), &uint(5)).unwrap(), uint(2));

        // 6 shares a factor with 18
        let m = ModInt::new(uint(18));
        assert!(m.inv(&uint(6)).is_none());
        assert!(m.div(&uint(3), &uint(6)).is_none());
    }

    #[test]
    fn signed_exponent() {
        let m = ModInt::new(uint(17));
        let e = num_bigint_dig::BigInt::from(-3);
        let x = m.exp_signed(&uint(2), &e).unwrap();
        // x * 2^3 == 1 mod 17
        assert_eq!(m.mul(&x, &uint(8)), BigUint::one());
    }

    #[test]
    fn intervals() {
        assert!(is_in_interval(&uint(0), &uint(5)));
        assert!(is_in_interval(&uint(4), &uint(5)));
        assert!(!is_in_interval(&uint(5), &uint(5)));
    }

    #[test]
    fn jacobi_symbols() {
        // (1/9) = 1, (2/9) = 1, (2/15) = 1, (7/15) = -1, (3/9) = 0
        assert_eq!(jacobi(&uint(1), &uint(9)), 1);
        assert_eq!(jacobi(&uint(2), &uint(15)), 1);
        assert_eq!(jacobi(&uint(7), &uint(15)), -1);
        assert_eq!(jacobi(&uint(3), &uint(9)), 0);
        // quadratic residues mod a prime always give 1
        for x in 1u64..11 {
            assert_eq!(jacobi(&uint(x * x % 11), &uint(11)), 1);
        }
    }
}
