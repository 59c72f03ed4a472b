use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use danci_bkt::{
    BktParameters, Fidelity, FitterConfig, ParameterName, DEFAULT_MAX_RECORD_ATTEMPTS,
};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyzerError, Result};

/// Fitter settings that env, config file and CLI may each override
///
/// Later layers win: env < file < CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(default)]
    pub fidelity: Option<Fidelity>,
    #[serde(default)]
    pub min_responses: Option<usize>,
    #[serde(default)]
    pub min_users: Option<usize>,
    #[serde(default)]
    pub num_restarts: Option<usize>,
    #[serde(default)]
    pub parameter_seed: Option<u64>,
    /// Partial parameter set applied over the level defaults
    #[serde(default)]
    pub default_starting_params: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub max_restart_seconds: Option<f64>,
    /// Records with more attempts than this are rejected as malformed
    #[serde(default)]
    pub max_record_attempts: Option<usize>,
}

impl ConfigOverrides {
    /// Fields set in `other` replace the ones in `self`
    pub fn merge(mut self, other: ConfigOverrides) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            fidelity,
            min_responses,
            min_users,
            num_restarts,
            parameter_seed,
            default_starting_params,
            tolerance,
            max_iterations,
            max_restart_seconds,
            max_record_attempts
        );
        self
    }

    /// Load the JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AnalyzerError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| AnalyzerError::json(path, e))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub output_dir: PathBuf,
    pub workers: Option<usize>,
    pub overrides: ConfigOverrides,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unparsable values are ignored
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|value| value.trim().parse().ok());

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let output_dir = lookup("BKT_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let workers = parsed("BKT_WORKERS").filter(|&n: &usize| n > 0);

        let overrides = ConfigOverrides {
            fidelity: lookup("BKT_FIDELITY").and_then(|v| Fidelity::parse(&v)),
            min_responses: parsed("BKT_MIN_RESPONSES"),
            min_users: parsed("BKT_MIN_USERS"),
            num_restarts: parsed("BKT_NUM_RESTARTS"),
            parameter_seed: lookup("BKT_SEED").and_then(|v| v.trim().parse().ok()),
            max_record_attempts: parsed("BKT_MAX_RECORD_ATTEMPTS"),
            ..Default::default()
        };

        Self {
            log_level,
            output_dir,
            workers,
            overrides,
        }
    }

    /// Resolve the fitter configuration: fidelity preset, then overrides
    pub fn fitter_config(&self) -> Result<FitterConfig> {
        let o = &self.overrides;
        let mut config = FitterConfig::for_fidelity(o.fidelity.unwrap_or_default());

        if let Some(v) = o.min_responses {
            config.min_responses = v;
        }
        if let Some(v) = o.min_users {
            config.min_users = v;
        }
        if let Some(v) = o.num_restarts {
            if v == 0 {
                return Err(AnalyzerError::Config("numRestarts must be at least 1".into()));
            }
            config.num_restarts = v;
        }
        if let Some(v) = o.parameter_seed {
            config.seed = v;
        }
        if let Some(v) = o.tolerance {
            if !v.is_finite() || v < 0.0 {
                return Err(AnalyzerError::Config(format!("invalid tolerance {v}")));
            }
            config.tolerance = v;
        }
        if let Some(v) = o.max_iterations {
            config.max_iterations = v;
        }
        if let Some(v) = o.max_restart_seconds {
            if !v.is_finite() || v <= 0.0 {
                return Err(AnalyzerError::Config(format!("invalid maxRestartSeconds {v}")));
            }
            config.max_restart_duration = Duration::from_secs_f64(v);
        }
        if let Some(map) = &o.default_starting_params {
            let base = config.starting_params.unwrap_or_default();
            config.starting_params = Some(apply_parameter_overrides(base, map)?);
        }

        Ok(config)
    }

    /// Per-record attempt limit applied while loading exports
    pub fn max_record_attempts(&self) -> Result<usize> {
        match self.overrides.max_record_attempts {
            Some(0) => Err(AnalyzerError::Config("maxRecordAttempts must be at least 1".into())),
            Some(v) => Ok(v),
            None => Ok(DEFAULT_MAX_RECORD_ATTEMPTS),
        }
    }

    /// Parameters the fitted values are compared against in the summary
    pub fn comparison_defaults(&self) -> Result<BktParameters> {
        Ok(self.fitter_config()?.starting_params.unwrap_or_default())
    }
}

/// Apply `name -> value` overrides; unknown names and values outside [0, 1] are rejected
pub fn apply_parameter_overrides(
    mut params: BktParameters,
    overrides: &BTreeMap<String, f64>,
) -> Result<BktParameters> {
    for (name, &value) in overrides {
        let parameter = ParameterName::parse(name)
            .ok_or_else(|| AnalyzerError::Config(format!("unknown parameter '{name}'")))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalyzerError::Config(format!(
                "parameter '{name}' = {value} is outside [0, 1]"
            )));
        }
        params.set(parameter, value);
    }
    Ok(params)
}
