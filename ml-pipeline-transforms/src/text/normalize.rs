//! Per-row normalization of n-gram count vectors

use serde::{Deserialize, Serialize};

/// Norm applied to each produced feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VectorNormalizer {
    /// Raw counts
    None,
    /// Divide by the sum of absolute values
    L1,
    /// Divide by the Euclidean norm
    #[default]
    L2,
    /// Divide by the largest absolute value
    LInf,
    /// `ln(1 + count)` followed by L2 normalization
    LogChi2,
}

impl VectorNormalizer {
    /// Normalize `values` in place; all-zero vectors are left unchanged
    pub fn apply(self, values: &mut [f32]) {
        let norm = match self {
            VectorNormalizer::None => return,
            VectorNormalizer::L1 => values.iter().map(|v| v.abs()).sum::<f32>(),
            VectorNormalizer::L2 => l2_norm(values),
            VectorNormalizer::LInf => values.iter().fold(0.0f32, |acc, v| acc.max(v.abs())),
            VectorNormalizer::LogChi2 => {
                for value in values.iter_mut() {
                    *value = value.ln_1p();
                }
                l2_norm(values)
            }
        };

        if norm > 0.0 {
            for value in values.iter_mut() {
                *value /= norm;
            }
        }
    }
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(VectorNormalizer::None, &[3.0, 0.0, 4.0] ; "none")]
    #[test_case(VectorNormalizer::L1, &[3.0 / 7.0, 0.0, 4.0 / 7.0] ; "l1")]
    #[test_case(VectorNormalizer::L2, &[0.6, 0.0, 0.8] ; "l2")]
    #[test_case(VectorNormalizer::LInf, &[0.75, 0.0, 1.0] ; "linf")]
    fn test_normalizers(normalizer: VectorNormalizer, expected: &[f32]) {
        let mut values = [3.0, 0.0, 4.0];
        normalizer.apply(&mut values);
        for (actual, expected) in values.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-6, "{actual} != {expected}");
        }
    }

    #[test]
    fn test_log_chi2_has_unit_norm() {
        let mut values = [1.0, 3.0, 0.0];
        VectorNormalizer::LogChi2.apply(&mut values);
        assert!((l2_norm(&values) - 1.0).abs() < 1e-6);
        assert!(values[0] < values[1]);
        assert_eq!(values[2], 0.0);
    }

    #[test]
    fn test_zero_vector_is_unchanged() {
        let mut values = [0.0; 4];
        VectorNormalizer::L2.apply(&mut values);
        assert_eq!(values, [0.0; 4]);
    }

    proptest! {
        #[test]
        fn prop_l2_output_has_unit_norm(values in prop::collection::vec(-100.0f32..100.0, 1..32)) {
            prop_assume!(l2_norm(&values) > 1e-3);
            let mut normalized = values.clone();
            VectorNormalizer::L2.apply(&mut normalized);
            prop_assert!((l2_norm(&normalized) - 1.0).abs() < 1e-4);
        }
    }
}
