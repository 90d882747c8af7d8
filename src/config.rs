use crate::fem_problem::integration::DEFAULT_QUAD_ORDER_INCREASE;
use crate::fem_problem::linalg::{iterative::CgSettings, solver::SolverKind};
use json::JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Settings which control Galerkin assembly
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssemblyConfig {
    /// Number of threads in the assembly pool (`0` lets Rayon choose)
    pub num_threads: usize,
    /// Number of quadrature points (per direction) beyond `p + 1`
    pub quad_order_increase: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            quad_order_increase: DEFAULT_QUAD_ORDER_INCREASE,
        }
    }
}

impl AssemblyConfig {
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Default::default()
        }
    }
}

/// Settings which control a [LinearSolver](crate::fem_problem::linalg::solver::LinearSolver)
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct SolverConfig {
    pub solver: SolverKind,
    pub assembly: AssemblyConfig,
}

/// A single entry of a [NumericConfig]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Key-value store of numeric settings, read once and converted into explicit configuration structs
///
/// Recognized keys:
/// * `num_threads`: assembly threads (`0` = automatic)
/// * `quad_order_increase`: extra quadrature points per direction
/// * `solver`: `"sparse_cholesky"`, `"dense_cholesky"` or `"cg"`
/// * `max_iterations`: CG iteration budget
/// * `tolerance_exp`: CG relative tolerance as a power of ten (e.g. `-10`)
/// * `time_budget_ms`: CG wall-clock budget
/// * `verbosity`: log verbosity for drivers (`0` = warnings only)
/// * `schema_path`: path of an input schema for drivers
/// * `system_export_dir`: directory into which drivers write the assembled system as PETSc binary files
///
/// ```
/// use heat_fem_2d::config::NumericConfig;
///
/// let config = NumericConfig::from_json_str(r#"{ "num_threads": 2, "solver": "cg", "max_iterations": 50 }"#).unwrap();
/// assert_eq!(config.assembly_config().unwrap().num_threads, 2);
/// assert!(config.solver_config().is_ok());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumericConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl NumericConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Self::from_json(&json::parse(contents)?)
    }

    /// Read a flat JSON object of integers and strings
    pub fn from_json(config_json: &JsonValue) -> Result<Self, ConfigError> {
        if !config_json.is_object() {
            return Err(ConfigError::NotAnObject);
        }

        let mut config = Self::new();
        for (key, value) in config_json.entries() {
            let value = if let Some(s) = value.as_str() {
                ConfigValue::Str(s.to_string())
            } else if let Some(i) = value.as_i64() {
                ConfigValue::Int(i)
            } else {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("expected an integer or a string, found '{}'", value.dump()),
                });
            };
            config.values.insert(key.to_string(), value);
        }
        Ok(config)
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.values.insert(key.into(), ConfigValue::Int(value));
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), ConfigValue::Str(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ConfigValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ConfigValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(|k| k.as_str())
    }

    /// Log verbosity requested for drivers (defaults to `1`)
    pub fn verbosity(&self) -> Result<usize, ConfigError> {
        Ok(self.non_negative("verbosity")?.unwrap_or(1))
    }

    pub fn schema_path(&self) -> Option<&str> {
        self.get_str("schema_path")
    }

    pub fn system_export_dir(&self) -> Option<&str> {
        self.get_str("system_export_dir")
    }

    pub fn assembly_config(&self) -> Result<AssemblyConfig, ConfigError> {
        let defaults = AssemblyConfig::default();
        Ok(AssemblyConfig {
            num_threads: self.non_negative("num_threads")?.unwrap_or(defaults.num_threads),
            quad_order_increase: self
                .non_negative("quad_order_increase")?
                .unwrap_or(defaults.quad_order_increase),
        })
    }

    pub fn solver_config(&self) -> Result<SolverConfig, ConfigError> {
        let solver = match self.get("solver") {
            None => SolverKind::default(),
            Some(ConfigValue::Str(name)) => match name.as_str() {
                "sparse_cholesky" => SolverKind::SparseCholesky,
                "dense_cholesky" => SolverKind::DenseCholesky,
                "cg" => {
                    let defaults = CgSettings::default();
                    let tolerance = match self.get_int("tolerance_exp") {
                        Some(exp) if (-300..0).contains(&exp) => 10.0_f64.powi(exp as i32),
                        Some(exp) => {
                            return Err(ConfigError::InvalidValue {
                                key: "tolerance_exp".to_string(),
                                reason: format!("{} is not a negative power of ten", exp),
                            })
                        }
                        None => defaults.tolerance,
                    };
                    SolverKind::ConjugateGradient {
                        max_iterations: self
                            .non_negative("max_iterations")?
                            .unwrap_or(defaults.max_iterations),
                        tolerance,
                        time_budget: self
                            .non_negative("time_budget_ms")?
                            .map(|ms| Duration::from_millis(ms as u64)),
                    }
                }
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "solver".to_string(),
                        reason: format!("unknown solver '{}'", other),
                    })
                }
            },
            Some(value) => {
                return Err(ConfigError::InvalidValue {
                    key: "solver".to_string(),
                    reason: format!("expected a string, found {}", value),
                })
            }
        };

        Ok(SolverConfig {
            solver,
            assembly: self.assembly_config()?,
        })
    }

    fn non_negative(&self, key: &str) -> Result<Option<usize>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ConfigValue::Int(i)) if *i >= 0 => Ok(Some(*i as usize)),
            Some(value) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected a non-negative integer, found {}", value),
            }),
        }
    }
}

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration JSON: {0}")]
    Json(#[from] json::Error),
    #[error("Configuration must be a JSON object!")]
    NotAnObject,
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}
