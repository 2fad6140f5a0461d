//! Feldman verifiable secret sharing and Lagrange interpolation.

use rand_core::CryptoRngCore;

use crate::curve::{Curve, Point, Scalar};

/// sharing threshold is incompatible with the participant set
#[derive(Debug, Clone, Copy, PartialEq, Eq, displaydoc::Display)]
pub struct VssError;

impl std::error::Error for VssError {}

/// Splits `secret` with a degree-`threshold` polynomial, returning the
/// Feldman commitment vector (`threshold + 1` points, the first committing
/// the secret itself) and one share per x-coordinate in `xs`.
///
/// Any `threshold + 1` holders can reconstruct; `threshold` of them learn
/// nothing. The x-coordinates must be distinct and non-zero.
pub fn share<C: Curve>(
    rng: &mut (impl CryptoRngCore + ?Sized),
    threshold: usize,
    secret: &C::Scalar,
    xs: &[C::Scalar],
) -> Result<(Vec<C::Point>, Vec<C::Scalar>), VssError> {
    if xs.len() <= threshold {
        return Err(VssError);
    }
    for (i, x) in xs.iter().enumerate() {
        if x.is_zero() || xs[..i].contains(x) {
            return Err(VssError);
        }
    }

    let mut coefficients = Vec::with_capacity(threshold + 1);
    coefficients.push(*secret);
    for _ in 0..threshold {
        coefficients.push(C::Scalar::random(rng));
    }

    let commitments = coefficients
        .iter()
        .map(|coefficient| coefficient.mul_by_generator())
        .collect();
    let shares = xs
        .iter()
        .map(|x| evaluate_polynomial::<C>(&coefficients, x))
        .collect();
    Ok((commitments, shares))
}

fn evaluate_polynomial<C: Curve>(coefficients: &[C::Scalar], x: &C::Scalar) -> C::Scalar {
    // Horner's method.
    let mut result = *coefficients.last().expect("at least the constant term");
    for coefficient in coefficients.iter().rev().skip(1) {
        result = result * *x + *coefficient;
    }
    result
}

/// The committed polynomial evaluated in the exponent:
/// `Σ_j commitments[j] · x^j`.
pub fn commitment_eval<C: Curve>(commitments: &[C::Point], x: &C::Scalar) -> C::Point {
    let mut power = C::Scalar::one();
    let mut result = C::Point::identity();
    for commitment in commitments {
        result = result + commitment.mul(&power);
        power = power * *x;
    }
    result
}

/// Checks a received share against the dealer's commitment vector.
pub fn verify_share<C: Curve>(
    commitments: &[C::Point],
    x: &C::Scalar,
    share: &C::Scalar,
) -> bool {
    commitment_eval::<C>(commitments, x) == share.mul_by_generator()
}

/// The Lagrange coefficient at zero for `xs[index]` over the quorum `xs`.
/// `None` when the x-coordinates are not distinct (or contain zero).
pub fn lagrange_coefficient<C: Curve>(xs: &[C::Scalar], index: usize) -> Option<C::Scalar> {
    let x_i = xs[index];
    let mut numerator = C::Scalar::one();
    let mut denominator = C::Scalar::one();
    for (j, x_j) in xs.iter().enumerate() {
        if j == index {
            continue;
        }
        numerator = numerator * *x_j;
        denominator = denominator * (*x_j - x_i);
    }
    Some(numerator * denominator.invert()?)
}

/// Interpolates the sharing polynomial at zero, recovering the secret from
/// any `threshold + 1` (x, share) pairs.
pub fn reconstruct<C: Curve>(points: &[(C::Scalar, C::Scalar)]) -> Option<C::Scalar> {
    let xs: Vec<C::Scalar> = points.iter().map(|(x, _)| *x).collect();
    let mut secret = C::Scalar::zero();
    for (index, (_, share)) in points.iter().enumerate() {
        secret = secret + lagrange_coefficient::<C>(&xs, index)? * *share;
    }
    Some(secret)
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;
    use crate::curve::{Ed25519, Secp256k1};

    fn xs<C: Curve>(count: usize) -> Vec<C::Scalar> {
        (1..=count as u64)
            .map(|i| C::Scalar::from_biguint(&i.into()))
            .collect()
    }

    fn share_verify_reconstruct<C: Curve>() {
        let secret = C::Scalar::random(&mut OsRng);
        let xs = xs::<C>(5);
        let (commitments, shares) = share::<C>(&mut OsRng, 2, &secret, &xs).unwrap();
        assert_eq!(commitments.len(), 3);
        assert_eq!(commitments[0], secret.mul_by_generator());

        for (x, share) in xs.iter().zip(shares.iter()) {
            assert!(verify_share::<C>(&commitments, x, share));
        }

        // Any 3 of 5 recover the secret; different subsets agree.
        for subset in [[0usize, 1, 2], [1, 3, 4], [0, 2, 4]] {
            let points: Vec<_> = subset.iter().map(|&i| (xs[i], shares[i])).collect();
            assert_eq!(reconstruct::<C>(&points).unwrap(), secret);
        }

        // 2 of 5 reconstruct something else.
        let points: Vec<_> = [0usize, 1].iter().map(|&i| (xs[i], shares[i])).collect();
        assert_ne!(reconstruct::<C>(&points).unwrap(), secret);
    }

    #[test]
    fn secp256k1_sharing() {
        share_verify_reconstruct::<Secp256k1>();
    }

    #[test]
    fn ed25519_sharing() {
        share_verify_reconstruct::<Ed25519>();
    }

    #[test]
    fn tampered_share_rejected() {
        type C = Secp256k1;
        let secret = <C as Curve>::Scalar::random(&mut OsRng);
        let xs = xs::<C>(3);
        let (commitments, shares) = share::<C>(&mut OsRng, 1, &secret, &xs).unwrap();
        let tampered = shares[1] + <C as Curve>::Scalar::one();
        assert!(!verify_share::<C>(&commitments, &xs[1], &tampered));
    }

    #[test]
    fn zero_threshold_is_constant() {
        type C = Ed25519;
        let secret = <C as Curve>::Scalar::random(&mut OsRng);
        let xs = xs::<C>(1);
        let (commitments, shares) = share::<C>(&mut OsRng, 0, &secret, &xs).unwrap();
        assert_eq!(commitments.len(), 1);
        assert_eq!(shares[0], secret);
        assert_eq!(
            reconstruct::<C>(&[(xs[0], shares[0])]).unwrap(),
            secret
        );
    }

    #[test]
    fn bad_configurations_rejected() {
        type C = Secp256k1;
        let secret = <C as Curve>::Scalar::random(&mut OsRng);
        // Not enough holders for the threshold.
        assert!(share::<C>(&mut OsRng, 2, &secret, &xs::<C>(2)).is_err());
        // Duplicate x-coordinates.
        let mut dup = xs::<C>(3);
        dup[2] = dup[0];
        assert!(share::<C>(&mut OsRng, 1, &secret, &dup).is_err());
        // Zero x-coordinate.
        let zeroed = vec![<C as Curve>::Scalar::zero(), dup[1]];
        assert!(share::<C>(&mut OsRng, 1, &secret, &zeroed).is_err());
    }
}
