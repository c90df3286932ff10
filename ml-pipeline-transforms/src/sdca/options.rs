//! Options for the SDCA maximum entropy trainer

use ml_pipeline_core::{columns, Error, Result};
use serde::{Deserialize, Serialize};

/// Options for [`SdcaMaximumEntropy`](super::SdcaMaximumEntropy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdcaOptions {
    /// Float32 label column
    pub label_column: String,

    /// Numeric feature column
    pub feature_column: String,

    /// L2 regularization strength
    pub l2_regularization: f64,

    /// Training stops once the relative duality gap falls below this
    pub convergence_tolerance: f64,

    /// Maximum number of passes over the data
    pub max_iterations: usize,

    /// Visit examples in a shuffled order each epoch
    pub shuffle: bool,

    /// Shuffle seed; derived from the owning context when unset
    pub seed: Option<u64>,
}

impl Default for SdcaOptions {
    fn default() -> Self {
        Self {
            label_column: columns::LABEL.to_string(),
            feature_column: columns::FEATURES.to_string(),
            l2_regularization: 1e-3,
            convergence_tolerance: 0.01,
            max_iterations: 100,
            shuffle: true,
            seed: None,
        }
    }
}

impl SdcaOptions {
    /// Check that all numeric options are in range
    pub fn validate(&self) -> Result<()> {
        if !(self.l2_regularization.is_finite() && self.l2_regularization > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "l2_regularization must be positive, got {}",
                self.l2_regularization
            )));
        }
        if !(self.convergence_tolerance.is_finite() && self.convergence_tolerance > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "convergence_tolerance must be positive, got {}",
                self.convergence_tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidArgument("max_iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let options = SdcaOptions::default();
        assert_eq!(options.label_column, "Label");
        assert_eq!(options.feature_column, "Features");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: SdcaOptions = serde_json::from_str(r#"{"max_iterations": 5}"#).unwrap();
        assert_eq!(options.max_iterations, 5);
        assert_eq!(options.convergence_tolerance, 0.01);
    }

    #[test_case(SdcaOptions { l2_regularization: 0.0, ..SdcaOptions::default() } ; "zero l2")]
    #[test_case(SdcaOptions { l2_regularization: f64::NAN, ..SdcaOptions::default() } ; "nan l2")]
    #[test_case(SdcaOptions { convergence_tolerance: -1.0, ..SdcaOptions::default() } ; "negative tolerance")]
    #[test_case(SdcaOptions { max_iterations: 0, ..SdcaOptions::default() } ; "no iterations")]
    fn test_invalid_options(options: SdcaOptions) {
        assert!(matches!(options.validate(), Err(Error::InvalidArgument(_))));
    }
}
