//! Data Sanitization
//!
//! Numerical stability utilities.
//!
//! Functions:
//! - Probability sanitization
//! - Post-fit parameter clamping
//! - Hidden-state relabelling (label switching)
//! - Parameter health diagnostics

use serde::{Deserialize, Serialize};

use crate::types::{BktParameters, ClampAdjustment, ParameterName};

/// 检查数组是否包含无效值 (NaN 或 Inf)
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// 将概率限制在 [0, 1]，NaN 视为 0
pub fn sanitize_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

// ==================== Parameter Bounds ====================

/// Closed interval a parameter is clamped into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    pub fn clamp(&self, v: f64) -> f64 {
        if v.is_nan() {
            self.min
        } else {
            v.clamp(self.min, self.max)
        }
    }
}

/// Plausible range of every parameter
///
/// Guards against EM degeneracies such as boundary collapse. The defaults
/// are calibration choices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub prior: Bound,
    pub learn: Bound,
    pub slip: Bound,
    pub guess: Bound,
    pub forget: Bound,
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            prior: Bound::new(0.01, 0.80),
            learn: Bound::new(0.01, 0.70),
            slip: Bound::new(0.05, 0.35),
            guess: Bound::new(0.10, 0.50),
            forget: Bound::new(0.00, 0.15),
        }
    }
}

impl ParameterBounds {
    pub fn bound(&self, name: ParameterName) -> Bound {
        match name {
            ParameterName::Prior => self.prior,
            ParameterName::Learn => self.learn,
            ParameterName::Forget => self.forget,
            ParameterName::Slip => self.slip,
            ParameterName::Guess => self.guess,
        }
    }

    /// Every bound is a non-empty sub-interval of [0, 1]
    pub fn is_valid(&self) -> bool {
        ParameterName::ALL.iter().all(|&name| {
            let b = self.bound(name);
            b.min.is_finite() && b.max.is_finite() && 0.0 <= b.min && b.min <= b.max && b.max <= 1.0
        })
    }

    /// Clamp every parameter, reporting the ones that moved
    pub fn clamp(&self, params: &BktParameters) -> (BktParameters, Vec<ClampAdjustment>) {
        let mut clamped = *params;
        let mut adjustments = Vec::new();

        for name in ParameterName::ALL {
            let raw = params.get(name);
            let value = self.bound(name).clamp(raw);
            if value != raw {
                adjustments.push(ClampAdjustment {
                    parameter: name,
                    raw,
                    clamped: value,
                });
                clamped.set(name, value);
            }
        }

        (clamped, adjustments)
    }
}

// ==================== Label Switching ====================

/// Swap the meaning of the two hidden states when `slip + guess > 1`
///
/// The swapped model assigns exactly the same likelihood to every sequence,
/// but its "known" state is the one that answers correctly more often.
pub fn normalize_labels(params: &BktParameters) -> (BktParameters, bool) {
    if params.slip + params.guess <= 1.0 {
        return (*params, false);
    }

    let swapped = BktParameters {
        prior: 1.0 - params.prior,
        learn: params.forget,
        forget: params.learn,
        slip: 1.0 - params.guess,
        guess: 1.0 - params.slip,
    };
    (swapped, true)
}

// ==================== Diagnostics ====================

/// Health report of a parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDiagnostic {
    pub is_healthy: bool,
    pub has_nan: bool,
    pub has_inf: bool,
    pub out_of_range: bool,
    pub degenerate: bool,
    pub message: String,
}

/// 诊断参数健康状态
pub fn diagnose_parameters(params: &BktParameters) -> ParameterDiagnostic {
    let values: Vec<f64> = ParameterName::ALL.iter().map(|&n| params.get(n)).collect();
    let has_nan = values.iter().any(|v| v.is_nan());
    let has_inf = values.iter().any(|v| v.is_infinite());
    let out_of_range = !has_nan && !has_inf && !params.is_valid();
    let degenerate = !has_nan && params.is_degenerate();

    let is_healthy = !has_nan && !has_inf && !out_of_range && !degenerate;

    let message = if is_healthy {
        "Parameters are healthy".to_string()
    } else if has_nan {
        "Parameters contain NaN values".to_string()
    } else if has_inf {
        "Parameters contain infinite values".to_string()
    } else if out_of_range {
        "Parameters fall outside [0, 1]".to_string()
    } else {
        format!(
            "Degenerate model: slip + guess = {:.3} >= 1",
            params.slip + params.guess
        )
    };

    ParameterDiagnostic {
        is_healthy,
        has_nan,
        has_inf,
        out_of_range,
        degenerate,
        message,
    }
}
