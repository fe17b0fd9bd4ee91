use std::hash::Hasher;
use twox_hash::XxHash64;

/// Round to a fixed number of decimals (output presentation only)
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Stable 64-bit seed from a sequence of byte slices.
/// XxHash64 with a zero seed is stable across platforms and releases,
/// unlike `std::collections::hash_map::DefaultHasher`.
pub fn stable_seed(parts: &[&[u8]]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    for part in parts {
        hasher.write(part);
        // separator so ("ab", "c") and ("a", "bc") differ
        hasher.write_u8(0xff);
    }
    hasher.finish()
}

/// Clamp into the NDVI domain [-1, 1]; non-finite values become 0.0
pub fn clamp_ndvi(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Replace NaN / infinity with a default
pub fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(round_to(-0.004, 2), -0.0);
    }

    #[test]
    fn test_stable_seed_is_deterministic_and_separated() {
        let a = stable_seed(&[b"ab", b"c"]);
        let b = stable_seed(&[b"a", b"bc"]);
        assert_eq!(a, stable_seed(&[b"ab", b"c"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_clamp_ndvi() {
        assert_eq!(clamp_ndvi(1.4), 1.0);
        assert_eq!(clamp_ndvi(-3.0), -1.0);
        assert_eq!(clamp_ndvi(f64::NAN), 0.0);
        assert_eq!(finite_or(f64::INFINITY, 0.35), 0.35);
    }
}
