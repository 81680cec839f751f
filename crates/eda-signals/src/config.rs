use serde::{Deserialize, Serialize};
use std::env::{self, VarError};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::decomposition::{CvxEdaParams, DecomposeParams, DecompositionMethod, HighpassParams, MedianParams};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] VarError),
}

/// Decomposition settings as read from `eda.toml`.
///
/// Every section is optional; missing keys take the library defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdaConfig {
    /// Samples per second of the input signal
    pub sampling_rate: u32,
    pub method: DecompositionMethod,
    pub cvxeda: CvxEdaParams,
    pub median: MedianParams,
    pub highpass: HighpassParams,
}

impl Default for EdaConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 1000,
            method: DecompositionMethod::default(),
            cvxeda: CvxEdaParams::default(),
            median: MedianParams::default(),
            highpass: HighpassParams::default(),
        }
    }
}

impl EdaConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EdaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    /// Environment variables are prefixed with EDA_
    /// Example: EDA_CVXEDA_TAU0=3.0
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `EDA_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| match env::var(key) {
            Ok(val) => Ok(Some(val)),
            Err(VarError::NotPresent) => Ok(None),
            Err(e) => Err(e.into()),
        })
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Result<Option<String>, ConfigError>,
    {
        override_from(&lookup, "EDA_SAMPLING_RATE", &mut self.sampling_rate)?;
        override_from(&lookup, "EDA_METHOD", &mut self.method)?;

        // cvxEDA overrides
        override_from(&lookup, "EDA_CVXEDA_TAU0", &mut self.cvxeda.tau0)?;
        override_from(&lookup, "EDA_CVXEDA_TAU1", &mut self.cvxeda.tau1)?;
        override_from(&lookup, "EDA_CVXEDA_DELTA_KNOT", &mut self.cvxeda.delta_knot)?;
        override_from(&lookup, "EDA_CVXEDA_ALPHA", &mut self.cvxeda.alpha)?;
        override_from(&lookup, "EDA_CVXEDA_GAMMA", &mut self.cvxeda.gamma)?;
        override_from(&lookup, "EDA_CVXEDA_RELTOL", &mut self.cvxeda.reltol)?;
        override_from(&lookup, "EDA_CVXEDA_SOLVER", &mut self.cvxeda.solver)?;
        override_from(&lookup, "EDA_CVXEDA_MAX_ITER", &mut self.cvxeda.max_iter)?;

        override_from(&lookup, "EDA_MEDIAN_SMOOTHING_FACTOR", &mut self.median.smoothing_factor)?;
        override_from(&lookup, "EDA_HIGHPASS_CUTOFF_HZ", &mut self.highpass.cutoff_hz)?;
        override_from(&lookup, "EDA_HIGHPASS_ORDER", &mut self.highpass.order)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_rate == 0 {
            return Err(ConfigError::Validation("sampling_rate must be > 0".to_string()));
        }

        self.cvxeda
            .validate()
            .map_err(|e| ConfigError::Validation(format!("cvxeda: {e}")))?;

        if !(self.median.smoothing_factor.is_finite() && self.median.smoothing_factor > 0.0) {
            return Err(ConfigError::Validation(
                "median.smoothing_factor must be positive".to_string(),
            ));
        }

        let nyquist = f64::from(self.sampling_rate) / 2.0;
        if !(self.highpass.cutoff_hz > 0.0 && self.highpass.cutoff_hz < nyquist) {
            return Err(ConfigError::Validation(format!(
                "highpass.cutoff_hz must be in (0, {nyquist})"
            )));
        }
        if self.highpass.order == 0 {
            return Err(ConfigError::Validation("highpass.order must be > 0".to_string()));
        }

        Ok(())
    }

    /// Parameters handed to the decomposer
    pub fn decompose_params(&self) -> DecomposeParams {
        DecomposeParams {
            cvxeda: self.cvxeda,
            median: self.median,
            highpass: self.highpass,
        }
    }

    /// Export configuration to TOML string
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self
            .to_toml_string()
            .map_err(|e| ConfigError::Validation(format!("TOML serialization error: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

fn override_from<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Result<Option<String>, ConfigError>,
    T: FromStr,
{
    if let Some(val) = lookup(key)? {
        *target = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("Invalid {key}: '{val}'")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::SolverVariant;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_in<'a>(vars: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Result<Option<String>, ConfigError> + 'a {
        move |key| Ok(vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_match_library() {
        let config = EdaConfig::default();
        assert_eq!(config.sampling_rate, 1000);
        assert_eq!(config.method, DecompositionMethod::Highpass);
        assert_eq!(config.decompose_params(), DecomposeParams::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EdaConfig::from_toml_str(
            r#"
            sampling_rate = 64
            method = "cvxeda"

            [cvxeda]
            tau0 = 3.0
            solver = "cone"
            "#,
        )
        .unwrap();
        assert_eq!(config.sampling_rate, 64);
        assert_eq!(config.method, DecompositionMethod::CvxEda);
        assert_eq!(config.cvxeda.tau0, 3.0);
        assert_eq!(config.cvxeda.tau1, 0.7);
        assert_eq!(config.cvxeda.solver, SolverVariant::ConeProgram);
        assert_eq!(config.median, MedianParams::default());
    }

    #[test]
    fn test_method_aliases_in_toml() {
        let config = EdaConfig::from_toml_str("method = \"biopac\"").unwrap();
        assert_eq!(config.method, DecompositionMethod::Highpass);
        let config = EdaConfig::from_toml_str("method = \"median\"").unwrap();
        assert_eq!(config.method, DecompositionMethod::SmoothMedian);
        let config = EdaConfig::from_toml_str("method = \"CVXEDA\"\n[cvxeda]\nsolver = \"Cone\"").unwrap();
        assert_eq!(config.method, DecompositionMethod::CvxEda);
        assert_eq!(config.cvxeda.solver, SolverVariant::ConeProgram);
        let config = EdaConfig::from_toml_str("method = \" AcqKnowledge \"").unwrap();
        assert_eq!(config.method, DecompositionMethod::Highpass);
        assert!(matches!(
            EdaConfig::from_toml_str("method = \"wavelet\""),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_validation_rejects_equal_time_constants() {
        let err = EdaConfig::from_toml_str("[cvxeda]\ntau0 = 1.0\ntau1 = 1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("tau")));
    }

    #[test]
    fn test_validation_rejects_cutoff_above_nyquist() {
        let mut config = EdaConfig::default();
        config.sampling_rate = 4;
        config.highpass.cutoff_hz = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("EDA_SAMPLING_RATE", "250"),
            ("EDA_METHOD", "CVXEDA"),
            ("EDA_CVXEDA_ALPHA", "0.002"),
            ("EDA_CVXEDA_SOLVER", "conelp"),
            ("EDA_HIGHPASS_ORDER", " 3 "),
        ]);
        let mut config = EdaConfig::default();
        config.apply_overrides(lookup_in(&vars)).unwrap();
        assert_eq!(config.sampling_rate, 250);
        assert_eq!(config.method, DecompositionMethod::CvxEda);
        assert_eq!(config.cvxeda.alpha, 0.002);
        assert_eq!(config.cvxeda.solver, SolverVariant::ConeProgram);
        assert_eq!(config.highpass.order, 3);
        assert_eq!(config.cvxeda.tau0, 2.0);
    }

    #[test]
    fn test_bad_override_names_the_variable() {
        let vars = HashMap::from([("EDA_CVXEDA_TAU1", "fast")]);
        let mut config = EdaConfig::default();
        let err = config.apply_overrides(lookup_in(&vars)).unwrap_err();
        assert!(err.to_string().contains("EDA_CVXEDA_TAU1"));
    }

    #[test]
    fn test_file_roundtrip() {
        let mut config = EdaConfig::default();
        config.method = DecompositionMethod::SmoothMedian;
        config.median.smoothing_factor = 2.5;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eda.toml");
        config.save_to_file(&path).unwrap();
        assert_eq!(EdaConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        assert!(matches!(
            EdaConfig::from_file("/nonexistent/eda.toml"),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sampling_rate = \"fast\"").unwrap();
        assert!(matches!(
            EdaConfig::from_file(file.path()),
            Err(ConfigError::TomlParse(_))
        ));
    }
}
