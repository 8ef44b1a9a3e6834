//! Per-trial records of a consensus run.
//!
//! Filled in by [`super::register_with_debug`]; every sample pair that was
//! drawn produces one [`TrialDebug`], whether or not it completed.

use serde::Serialize;

use crate::transforms::RigidTransform;

/// What happened to one sample pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    /// Correspondences, coarse fit and ICP all succeeded.
    Completed {
        correspondences: usize,
        icp_iterations: usize,
        icp_mean_error: f64,
        inliers: usize,
        /// Whether this trial became the best so far.
        improved: bool,
    },
    /// The correspondence solver found nothing usable.
    NoCorrespondences { reason: String },
    /// The coarse SVD fit was rejected.
    FitFailed { reason: String },
    /// ICP failed or did not converge.
    IcpFailed { reason: String },
}

impl TrialOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TrialOutcome::Completed { .. })
    }
}

/// One drawn sample pair.
#[derive(Debug, Clone, Serialize)]
pub struct TrialDebug {
    /// Index of the source draw this trial belongs to (0-indexed).
    pub source_draw: usize,

    /// Source points left in the working copy after the draw.
    pub source_remaining: usize,

    /// Target points left in the working copy after the draw.
    pub target_remaining: usize,

    pub outcome: TrialOutcome,

    /// Refined transform as a row-major 4x4 matrix, for completed trials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Vec<f64>>,

    /// Adaptive trial bound after this trial, when one has been set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_bound: Option<f64>,
}

impl TrialDebug {
    pub(crate) fn set_transform(&mut self, transform: &RigidTransform) {
        let h = transform.to_homogeneous();
        self.transform = Some(h.transpose().iter().copied().collect());
    }

    /// Format as a single log line.
    pub fn to_log_line(&self) -> String {
        let outcome = match &self.outcome {
            TrialOutcome::Completed {
                correspondences,
                icp_iterations,
                inliers,
                improved,
                ..
            } => format!(
                "completed corr={correspondences} icp_iters={icp_iterations} inliers={inliers}{}",
                if *improved { " *" } else { "" }
            ),
            TrialOutcome::NoCorrespondences { reason } => format!("no_correspondences ({reason})"),
            TrialOutcome::FitFailed { reason } => format!("fit_failed ({reason})"),
            TrialOutcome::IcpFailed { reason } => format!("icp_failed ({reason})"),
        };
        format!(
            "draw={} src_left={} tgt_left={} {outcome}",
            self.source_draw, self.source_remaining, self.target_remaining
        )
    }
}

/// Complete history of one registration call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrationDebug {
    /// Correspondence algorithm name.
    pub algorithm: String,

    pub num_source_points: usize,

    pub num_target_points: usize,

    /// Every drawn sample pair, in order.
    pub trials: Vec<TrialDebug>,

    /// Why the run ended.
    pub stop_reason: String,
}

impl RegistrationDebug {
    /// Number of trials that completed.
    pub fn completed_trials(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.outcome.is_completed())
            .count()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Format as a multi-line log.
    pub fn to_log(&self) -> String {
        let mut lines = Vec::with_capacity(self.trials.len() + 1);
        lines.push(format!(
            "=== NMSAC algorithm={} source={} target={} trials={} completed={} stop={} ===",
            self.algorithm,
            self.num_source_points,
            self.num_target_points,
            self.trials.len(),
            self.completed_trials(),
            self.stop_reason,
        ));
        for trial in &self.trials {
            lines.push(format!("  {}", trial.to_log_line()));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn trial(outcome: TrialOutcome) -> TrialDebug {
        TrialDebug {
            source_draw: 0,
            source_remaining: 4,
            target_remaining: 12,
            outcome,
            transform: None,
            trial_bound: None,
        }
    }

    #[test]
    fn test_completed_count_and_json() {
        let mut done = trial(TrialOutcome::Completed {
            correspondences: 6,
            icp_iterations: 3,
            icp_mean_error: 0.0,
            inliers: 20,
            improved: true,
        });
        done.set_transform(&RigidTransform::new(
            nalgebra::Matrix3::identity(),
            Vector3::new(1.0, 2.0, 3.0),
        ));
        let debug = RegistrationDebug {
            algorithm: "mc".to_string(),
            num_source_points: 20,
            num_target_points: 24,
            trials: vec![
                trial(TrialOutcome::NoCorrespondences {
                    reason: "none".to_string(),
                }),
                done,
            ],
            stop_reason: "source exhausted".to_string(),
        };

        assert_eq!(debug.completed_trials(), 1);
        let json = debug.to_json().unwrap();
        assert!(json.contains("\"status\":\"no_correspondences\""));
        assert!(json.contains("\"status\":\"completed\""));
        assert!(!json.contains("trial_bound"));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let transform = &value["trials"][1]["transform"];
        assert_eq!(transform[3], 1.0);
        assert_eq!(transform[7], 2.0);
        assert_eq!(transform[15], 1.0);
    }

    #[test]
    fn test_log_lines() {
        let line = trial(TrialOutcome::IcpFailed {
            reason: "did not converge".to_string(),
        })
        .to_log_line();
        assert!(line.contains("draw=0"));
        assert!(line.contains("icp_failed"));

        let debug = RegistrationDebug {
            algorithm: "qap".to_string(),
            ..Default::default()
        };
        assert!(debug.to_log().starts_with("=== NMSAC algorithm=qap"));
    }
}
