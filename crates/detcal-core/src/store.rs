//! Versioned parameter persistence.
//!
//! Calibration constants are stored as fixed-length arrays, one value per
//! detector element, addressed by `(parameter name, calibration identifier,
//! run set)`. [`MemoryStore`] backs tests; [`JsonStore`] persists the same
//! content as one JSON file with explicit `load`/`save`.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{CalibError, Real};

/// Key/value persistence of per-element parameter arrays.
pub trait ParameterStore {
    /// Read the array stored under `(param, calibration, run_set)`.
    ///
    /// Fails when the entry is absent or does not hold exactly `n` values.
    fn read(
        &self,
        param: &str,
        calibration: &str,
        run_set: u32,
        n: usize,
    ) -> Result<Vec<Real>, CalibError>;

    /// Write (insert or replace) the array under `(param, calibration, run_set)`.
    fn write(
        &mut self,
        param: &str,
        calibration: &str,
        run_set: u32,
        values: &[Real],
    ) -> Result<(), CalibError>;
}

fn entry_key(param: &str, calibration: &str, run_set: u32) -> String {
    format!("{calibration}/{param}/{run_set}")
}

/// In-memory parameter store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<Real>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored arrays.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no arrays.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ParameterStore for MemoryStore {
    fn read(
        &self,
        param: &str,
        calibration: &str,
        run_set: u32,
        n: usize,
    ) -> Result<Vec<Real>, CalibError> {
        let values = self
            .entries
            .get(&entry_key(param, calibration, run_set))
            .ok_or_else(|| CalibError::ParamsMissing {
                param: param.to_string(),
                calibration: calibration.to_string(),
                run_set,
            })?;
        if values.len() != n {
            return Err(CalibError::ParamCount {
                param: param.to_string(),
                expected: n,
                found: values.len(),
            });
        }
        Ok(values.clone())
    }

    fn write(
        &mut self,
        param: &str,
        calibration: &str,
        run_set: u32,
        values: &[Real],
    ) -> Result<(), CalibError> {
        self.entries
            .insert(entry_key(param, calibration, run_set), values.to_vec());
        Ok(())
    }
}

/// File-backed parameter store: a [`MemoryStore`] serialized as JSON.
#[derive(Debug, Default)]
pub struct JsonStore {
    inner: MemoryStore,
}

impl JsonStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON file; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, CalibError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path)?;
        let inner: MemoryStore = serde_json::from_str(&text)?;
        Ok(Self { inner })
    }

    /// Save the store to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), CalibError> {
        let text = serde_json::to_string_pretty(&self.inner)?;
        fs::write(path, text)?;
        Ok(())
    }
}

impl ParameterStore for JsonStore {
    fn read(
        &self,
        param: &str,
        calibration: &str,
        run_set: u32,
        n: usize,
    ) -> Result<Vec<Real>, CalibError> {
        self.inner.read(param, calibration, run_set, n)
    }

    fn write(
        &mut self,
        param: &str,
        calibration: &str,
        run_set: u32,
        values: &[Real],
    ) -> Result<(), CalibError> {
        self.inner.write(param, calibration, run_set, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryStore::new();
        store
            .write("Data.CB.Energy", "LH2_2024", 0, &[1.0, 2.0, 3.0])
            .unwrap();
        let values = store.read("Data.CB.Energy", "LH2_2024", 0, 3).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn missing_entry_is_an_error() {
        let store = MemoryStore::new();
        let err = store.read("Data.CB.Energy", "LH2_2024", 0, 3).unwrap_err();
        assert!(matches!(err, CalibError::ParamsMissing { .. }));
    }

    #[test]
    fn wrong_length_is_an_error() {
        let mut store = MemoryStore::new();
        store.write("p", "c", 1, &[1.0, 2.0]).unwrap();
        let err = store.read("p", "c", 1, 3).unwrap_err();
        assert!(matches!(
            err,
            CalibError::ParamCount {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn run_sets_are_independent() {
        let mut store = MemoryStore::new();
        store.write("p", "c", 0, &[1.0]).unwrap();
        store.write("p", "c", 1, &[2.0]).unwrap();
        assert_eq!(store.read("p", "c", 0, 1).unwrap(), vec![1.0]);
        assert_eq!(store.read("p", "c", 1, 1).unwrap(), vec![2.0]);
    }

    #[test]
    fn json_store_persists_across_load() {
        let file = NamedTempFile::new().unwrap();
        let mut store = JsonStore::new();
        store.write("p", "c", 0, &[4.0, 5.0]).unwrap();
        store.save(file.path()).unwrap();

        let restored = JsonStore::load(file.path()).unwrap();
        assert_eq!(restored.read("p", "c", 0, 2).unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::load(&dir.path().join("absent.json")).unwrap();
        assert!(store.read("p", "c", 0, 1).is_err());
    }
}
