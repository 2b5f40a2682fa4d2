//! Flat `key: value` configuration reader.
//!
//! Calibration modules look up their histogram names and per-module settings
//! from a plain text file, one `Key: value` entry per line, `#` starting a
//! comment. Later entries override earlier ones. There is no hierarchy.

use std::{collections::BTreeMap, fs, path::Path};

use crate::CalibError;

/// Parsed configuration entries.
#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    entries: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Parse configuration text.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            };
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() {
                entries.insert(key.to_string(), value.to_string());
            }
        }
        Self { entries }
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, CalibError> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a key, failing with [`CalibError::ConfigMissing`] when absent.
    pub fn require(&self, key: &str) -> Result<&str, CalibError> {
        self.get(key).ok_or_else(|| CalibError::ConfigMissing {
            key: key.to_string(),
        })
    }

    /// Look up an integer value; `None` when absent or unparsable.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.parse().ok()
    }

    /// Look up a floating point value; `None` when absent or unparsable.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse().ok()
    }

    /// Insert or replace an entry (used by tests and programmatic setup).
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_comments_and_overrides() {
        let cfg = ConfigMap::parse(
            "# calibration config\n\
             CB.Energy.Histo.Fit.Name: CB_IM_Neutral\n\
             TAPS.Elements: 438   # current layout\n\
             TAPS.Elements: 384\n\
             \n\
             not a config line\n",
        );
        assert_eq!(cfg.get("CB.Energy.Histo.Fit.Name"), Some("CB_IM_Neutral"));
        assert_eq!(cfg.get_i64("TAPS.Elements"), Some(384));
        assert_eq!(cfg.get("missing"), None);
    }

    #[test]
    fn value_may_contain_colons() {
        let cfg = ConfigMap::parse("Key: a:b:c\n");
        assert_eq!(cfg.get("Key"), Some("a:b:c"));
    }

    #[test]
    fn require_reports_missing_key() {
        let cfg = ConfigMap::parse("");
        let err = cfg.require("CB.Energy.Histo.Fit.Name").unwrap_err();
        assert!(matches!(err, CalibError::ConfigMissing { .. }));
        assert!(err.to_string().contains("CB.Energy.Histo.Fit.Name"));
    }

    #[test]
    fn numeric_lookups() {
        let cfg = ConfigMap::parse("A: 3.5\nB: seven\n");
        assert_eq!(cfg.get_f64("A"), Some(3.5));
        assert_eq!(cfg.get_f64("B"), None);
        assert_eq!(cfg.get_i64("A"), None);
    }
}
