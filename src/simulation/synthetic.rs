//! Deterministic pseudo-random values.
//!
//! Values are derived from SHA-256 of (seed, key) so the same subject always
//! gets the same synthetic probability for a given project, across runs and
//! platforms.

use sha2::{Digest, Sha256};

/// Uniform value in [0, 1)
pub fn unit(seed: u64, key: &str, salt: u8) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(key.as_bytes());
    hasher.update([salt]);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let n = u64::from_le_bytes(bytes);

    // top 53 bits -> exactly representable f64 mantissa
    (n >> 11) as f64 / (1u64 << 53) as f64
}

/// Normally distributed value (Box-Muller)
pub fn gauss(seed: u64, key: &str, mean: f64, sd: f64) -> f64 {
    let u1 = unit(seed, key, 0).max(f64::MIN_POSITIVE);
    let u2 = unit(seed, key, 1);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + sd * z
}

/// Probability clamped to [0.01, 0.99], rounded to 3 decimals
pub fn probability(seed: u64, key: &str, mean: f64, sd: f64) -> f64 {
    let p = gauss(seed, key, mean, sd).clamp(0.01, 0.99);
    (p * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(unit(42, "SUBJ001", 0), unit(42, "SUBJ001", 0));
        assert_eq!(
            probability(43, "SUBJ002", 0.77, 0.15),
            probability(43, "SUBJ002", 0.77, 0.15)
        );
    }

    #[test]
    fn test_seed_and_key_matter() {
        assert_ne!(unit(42, "SUBJ001", 0), unit(43, "SUBJ001", 0));
        assert_ne!(unit(42, "SUBJ001", 0), unit(42, "SUBJ002", 0));
    }

    #[test]
    fn test_ranges() {
        for i in 0..200 {
            let key = format!("S{i}");
            let u = unit(7, &key, 0);
            assert!((0.0..1.0).contains(&u));

            let p = probability(7, &key, 0.5, 0.5);
            assert!((0.01..=0.99).contains(&p));
        }
    }
}
