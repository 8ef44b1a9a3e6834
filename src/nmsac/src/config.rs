//! Registration settings and their JSON representation.
//!
//! A configuration document is a flat JSON object with an optional nested
//! `qap` or `mc` block selecting the correspondence solver:
//!
//! ```json
//! {
//!     "random_seed": 11011,
//!     "points_per_sample": 12,
//!     "max_iter_icp": 100,
//!     "mc": { "epsilon": 0.05, "pairwise_dist_threshold": 0.1, "algo": "bnb_color" }
//! }
//! ```
//!
//! Keys are case-insensitive at every level, unknown keys are ignored and
//! missing keys keep their defaults. When both blocks are present `qap`
//! wins; with neither the QAP solver runs with default settings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::correspondences::{CorrespondenceConfig, MaxCliqueAlgorithm, McConfig, QapConfig};
use crate::error::{ConfigError, IcpError};
use crate::transforms::IcpConfig;

/// Settings for one consensus run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NmsacConfig {
    /// Seed for the sampling RNG.
    #[serde(deserialize_with = "count")]
    pub random_seed: u64,

    /// Report progress at `info` level instead of `debug`.
    pub print_status: bool,

    /// Desired probability that at least one sample is outlier free.
    pub ps: f64,

    /// Exponent of the inlier ratio in the adaptive trial bound.
    #[serde(deserialize_with = "count")]
    pub k: usize,

    /// Hard cap on completed trials.
    #[serde(deserialize_with = "count")]
    pub max_iter: usize,

    /// Completed trials required before the adaptive bound may stop the run.
    #[serde(deserialize_with = "count")]
    pub min_iter: usize,

    /// Points drawn from each cloud per sample.
    #[serde(deserialize_with = "count")]
    pub points_per_sample: usize,

    /// ICP refinement settings (`max_iter_icp`, `tol_icp`, `outlier_rej_icp`).
    #[serde(flatten)]
    pub icp: IcpConfig,

    /// Correspondence solver and its settings, read from the `qap` or `mc` block.
    #[serde(skip_deserializing)]
    pub algorithm: CorrespondenceConfig,
}

/// A configuration document: flat settings plus the solver blocks.
#[derive(Deserialize)]
struct ConfigDocument {
    #[serde(flatten)]
    settings: NmsacConfig,
    qap: Option<QapConfig>,
    mc: Option<McConfig>,
}

impl Default for NmsacConfig {
    fn default() -> Self {
        Self {
            random_seed: 11011,
            print_status: false,
            ps: 0.99,
            k: 4,
            max_iter: 10_000,
            min_iter: 5,
            points_per_sample: 12,
            icp: IcpConfig::default(),
            algorithm: CorrespondenceConfig::default(),
        }
    }
}

impl NmsacConfig {
    /// Parse a configuration document.
    ///
    /// # Errors
    /// [`ConfigError::Json`] when a present key has the wrong type and
    /// [`ConfigError::InvalidValue`] when the settings fail
    /// [`NmsacConfig::validate`].
    pub fn from_json(document: &Value) -> Result<Self, ConfigError> {
        let document: ConfigDocument = serde_json::from_value(lowercase_keys(document))?;
        let mut config = document.settings;
        config.algorithm = match (document.qap, document.mc) {
            (Some(qap), _) => CorrespondenceConfig::Qap(qap),
            (None, Some(mc)) => CorrespondenceConfig::Mc(mc),
            (None, None) => CorrespondenceConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document from a string.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let document: Value = serde_json::from_str(text)?;
        Self::from_json(&document)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ps > 0.0 && self.ps < 1.0) {
            return Err(ConfigError::invalid("ps", "must lie in (0, 1)"));
        }
        if self.k == 0 {
            return Err(ConfigError::invalid("k", "must be at least 1"));
        }
        if self.points_per_sample == 0 {
            return Err(ConfigError::invalid("points_per_sample", "must be at least 1"));
        }
        self.icp.validate().map_err(|e| match e {
            IcpError::InvalidTolerance(_) => ConfigError::invalid("tol_icp", e.to_string()),
            _ => ConfigError::invalid("outlier_rej_icp", e.to_string()),
        })?;

        let epsilon = self.algorithm.epsilon();
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(ConfigError::invalid("epsilon", "must be positive"));
        }
        let threshold = self.algorithm.pairwise_dist_threshold();
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(ConfigError::invalid(
                "pairwise_dist_threshold",
                "must be non-negative",
            ));
        }
        if let CorrespondenceConfig::Qap(qap) = &self.algorithm {
            if !(qap.corr_threshold > 0.0 && qap.corr_threshold <= 1.0) {
                return Err(ConfigError::invalid("corr_threshold", "must lie in (0, 1]"));
            }
            if qap.min_corr == 0 {
                return Err(ConfigError::invalid("min_corr", "must be at least 1"));
            }
        }
        Ok(())
    }

    /// Settings as `key -> value` strings, in key order.
    ///
    /// Floats are printed in scientific notation with 3 fractional digits and
    /// solver settings carry an `algo_config::` prefix.
    pub fn key_values(&self) -> BTreeMap<String, String> {
        let mut kv = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            kv.insert(key.to_string(), value);
        };

        put("random_seed", self.random_seed.to_string());
        put("print_status", self.print_status.to_string());
        put("ps", scientific(self.ps));
        put("k", self.k.to_string());
        put("max_iter", self.max_iter.to_string());
        put("min_iter", self.min_iter.to_string());
        put("points_per_sample", self.points_per_sample.to_string());
        put("max_iter_icp", self.icp.max_iterations.to_string());
        put("tol_icp", scientific(self.icp.tolerance));
        put("outlier_rej_icp", scientific(self.icp.reject_ratio));

        put("algorithm", self.algorithm.name().to_string());
        put("algo_config::epsilon", scientific(self.algorithm.epsilon()));
        put(
            "algo_config::pairwise_dist_threshold",
            scientific(self.algorithm.pairwise_dist_threshold()),
        );
        match &self.algorithm {
            CorrespondenceConfig::Qap(qap) => {
                put("algo_config::corr_threshold", scientific(qap.corr_threshold));
                put("algo_config::n_pair_threshold", qap.n_pair_threshold.to_string());
                put("algo_config::min_corr", qap.min_corr.to_string());
            }
            CorrespondenceConfig::Mc(mc) => {
                put("algo_config::algo", mc.algorithm.as_str().to_string());
            }
        }
        kv
    }
}

impl fmt::Display for NmsacConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.key_values() {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

/// `{:.3e}` with a signed, two-digit exponent: `0.99 -> 9.900e-01`.
fn scientific(value: f64) -> String {
    let formatted = format!("{value:.3e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exp.abs())
            }
            Err(_) => formatted,
        },
        None => formatted,
    }
}

/// Copy of `value` with every object key lowercased, recursively.
fn lowercase_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_lowercase(), lowercase_keys(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Counts accept integral floats such as `1e4`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Integer(u64),
    Float(f64),
}

pub(crate) fn count<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let wide = match Count::deserialize(deserializer)? {
        Count::Integer(v) => v,
        Count::Float(v) if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => v as u64,
        Count::Float(v) => {
            return Err(D::Error::custom(format!(
                "expected a non-negative integer, found {v}"
            )))
        }
    };
    T::try_from(wide).map_err(|_| D::Error::custom(format!("{wide} is out of range")))
}

/// Algorithm names are case-insensitive.
pub(crate) fn max_clique_algorithm<'de, D>(
    deserializer: D,
) -> Result<MaxCliqueAlgorithm, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    match name.to_lowercase().as_str() {
        "bnb_basic" => Ok(MaxCliqueAlgorithm::BnbBasic),
        "bnb_color" => Ok(MaxCliqueAlgorithm::BnbColor),
        _ => Err(D::Error::unknown_variant(&name, &["bnb_basic", "bnb_color"])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = NmsacConfig::default();
        assert_eq!(config.random_seed, 11011);
        assert_eq!(config.max_iter, 10_000);
        assert_eq!(config.points_per_sample, 12);
        assert_eq!(config.icp.max_iterations, 100);
        assert_eq!(config.algorithm.name(), "qap");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = NmsacConfig::from_json_str("{}").unwrap();
        assert_eq!(config, NmsacConfig::default());
    }

    #[test]
    fn test_top_level_keys() {
        let config = NmsacConfig::from_json(&json!({
            "Random_Seed": 7,
            "print_status": true,
            "PS": 0.95,
            "max_iter": 1e3,
            "points_per_sample": 8,
            "max_iter_icp": 50,
            "tol_icp": 1e-6,
            "outlier_rej_icp": 0.1,
            "unrelated": "ignored"
        }))
        .unwrap();
        assert_eq!(config.random_seed, 7);
        assert!(config.print_status);
        assert_eq!(config.ps, 0.95);
        assert_eq!(config.max_iter, 1000);
        assert_eq!(config.points_per_sample, 8);
        assert_eq!(config.icp.max_iterations, 50);
        assert_eq!(config.icp.tolerance, 1e-6);
        assert_eq!(config.icp.reject_ratio, 0.1);
        assert_eq!(config.min_iter, 5);
    }

    #[test]
    fn test_qap_block_is_case_insensitive() {
        let config = NmsacConfig::from_json(&json!({
            "qAp": { "EPSILON": 0.02, "min_corr": 4, "N_PAIR_THRESHOLD": 10 }
        }))
        .unwrap();
        match config.algorithm {
            CorrespondenceConfig::Qap(qap) => {
                assert_eq!(qap.epsilon, 0.02);
                assert_eq!(qap.min_corr, 4);
                assert_eq!(qap.n_pair_threshold, 10);
                assert_eq!(qap.corr_threshold, 0.9);
            }
            other => panic!("expected QAP, got {other:?}"),
        }
    }

    #[test]
    fn test_mc_block() {
        let config = NmsacConfig::from_json_str(
            r#"{ "mc": { "epsilon": 0.05, "pairwise_dist_threshold": 0.2, "algo": "BNB_BASIC" } }"#,
        )
        .unwrap();
        assert_eq!(
            config.algorithm,
            CorrespondenceConfig::Mc(McConfig {
                epsilon: 0.05,
                pairwise_dist_threshold: 0.2,
                algorithm: MaxCliqueAlgorithm::BnbBasic,
            })
        );
    }

    #[test]
    fn test_qap_preferred_over_mc() {
        let config = NmsacConfig::from_json(&json!({ "mc": {}, "qap": {} })).unwrap();
        assert_eq!(config.algorithm.name(), "qap");
    }

    #[test]
    fn test_rejects_bad_values() {
        let wrong_type = NmsacConfig::from_json(&json!({ "k": "four" }));
        assert!(matches!(wrong_type, Err(ConfigError::Json(_))));

        let fractional = NmsacConfig::from_json(&json!({ "max_iter": 2.5 }));
        assert!(matches!(fractional, Err(ConfigError::Json(_))));

        let negative = NmsacConfig::from_json(&json!({ "qap": { "min_corr": -3 } }));
        assert!(matches!(negative, Err(ConfigError::Json(_))));

        let not_bool = NmsacConfig::from_json(&json!({ "print_status": "yes" }));
        assert!(matches!(not_bool, Err(ConfigError::Json(_))));

        let bad_ps = NmsacConfig::from_json(&json!({ "ps": 1.0 }));
        assert!(matches!(bad_ps, Err(ConfigError::InvalidValue { ref key, .. }) if key == "ps"));

        let bad_algo = NmsacConfig::from_json(&json!({ "mc": { "algo": "greedy" } }));
        match bad_algo {
            Err(ConfigError::Json(e)) => assert!(e.to_string().contains("greedy")),
            other => panic!("expected a parse error, got {other:?}"),
        }

        let bad_icp = NmsacConfig::from_json(&json!({ "outlier_rej_icp": 1.5 }));
        assert!(matches!(
            bad_icp,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "outlier_rej_icp"
        ));

        assert!(matches!(
            NmsacConfig::from_json_str("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_nested_blocks_keep_defaults() {
        let config = NmsacConfig::from_json(&json!({
            "MC": { "Algo": "Bnb_Color" },
            "MAX_ITER_ICP": 2e1
        }))
        .unwrap();
        assert_eq!(config.algorithm, CorrespondenceConfig::Mc(McConfig::default()));
        assert_eq!(config.icp.max_iterations, 20);
        assert_eq!(config.icp.tolerance, 1e-8);

        let qap = NmsacConfig::from_json(&json!({ "qap": { "corr_threshold": 0.5 } })).unwrap();
        assert_eq!(
            qap.algorithm,
            CorrespondenceConfig::Qap(QapConfig {
                corr_threshold: 0.5,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_missing_file() {
        let result = NmsacConfig::from_file("/nonexistent/nmsac-config.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_scientific_format() {
        assert_eq!(scientific(0.99), "9.900e-01");
        assert_eq!(scientific(1e-8), "1.000e-08");
        assert_eq!(scientific(0.2), "2.000e-01");
        assert_eq!(scientific(150.0), "1.500e+02");
    }

    #[test]
    fn test_display_lists_sorted_keys() {
        let text = NmsacConfig::default().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "algo_config::corr_threshold: 9.000e-01");
        assert!(lines.contains(&"algorithm: qap"));
        assert!(lines.contains(&"ps: 9.900e-01"));
        assert!(lines.contains(&"random_seed: 11011"));
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);

        let mc = NmsacConfig {
            algorithm: CorrespondenceConfig::Mc(McConfig::default()),
            ..Default::default()
        };
        let kv = mc.key_values();
        assert_eq!(kv["algo_config::algo"], "bnb_color");
        assert!(!kv.contains_key("algo_config::min_corr"));
    }
}
