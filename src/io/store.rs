//! Persistent storage of computed bases.

use crate::basis::Basis;
use std::{
    collections::HashMap,
    fmt, io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

#[cfg(feature = "persistence")]
use super::utils;
#[cfg(feature = "persistence")]
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Defines the properties of a store for bases, keyed by configuration fingerprint.
pub trait BasisStore: fmt::Debug + Send + Sync {
    /// Returns the stored basis for the given fingerprint, or `None` if there is none.
    fn load(&self, fingerprint: &str) -> io::Result<Option<Basis>>;

    /// Stores the basis under the given fingerprint, replacing any previous one.
    fn save(&self, fingerprint: &str, basis: &Basis) -> io::Result<()>;

    /// Records the given basis as the most recently used one.
    fn mark_current(&self, _fingerprint: &str, _basis: &Basis) -> io::Result<()> {
        Ok(())
    }
}

impl<S: BasisStore + ?Sized> BasisStore for Arc<S> {
    fn load(&self, fingerprint: &str) -> io::Result<Option<Basis>> {
        (**self).load(fingerprint)
    }

    fn save(&self, fingerprint: &str, basis: &Basis) -> io::Result<()> {
        (**self).save(fingerprint, basis)
    }

    fn mark_current(&self, fingerprint: &str, basis: &Basis) -> io::Result<()> {
        (**self).mark_current(fingerprint, basis)
    }
}

/// Store keeping bases in memory, counting how often it is accessed.
#[derive(Debug, Default)]
pub struct MemoryBasisStore {
    bases: Mutex<HashMap<String, Basis>>,
    current: Mutex<Option<String>>,
    n_loads: AtomicUsize,
    n_saves: AtomicUsize,
}

impl MemoryBasisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of load requests made so far.
    pub fn n_loads(&self) -> usize {
        self.n_loads.load(Ordering::SeqCst)
    }

    /// Returns the number of bases saved so far.
    pub fn n_saves(&self) -> usize {
        self.n_saves.load(Ordering::SeqCst)
    }

    /// Returns the fingerprint of the most recently used basis.
    pub fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BasisStore for MemoryBasisStore {
    fn load(&self, fingerprint: &str) -> io::Result<Option<Basis>> {
        self.n_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .bases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned())
    }

    fn save(&self, fingerprint: &str, basis: &Basis) -> io::Result<()> {
        self.n_saves.fetch_add(1, Ordering::SeqCst);
        self.bases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint.to_string(), basis.clone());
        Ok(())
    }

    fn mark_current(&self, fingerprint: &str, _basis: &Basis) -> io::Result<()> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(fingerprint.to_string());
        Ok(())
    }
}

/// Store keeping one JSON file per basis in a directory.
///
/// The most recently used basis is also written to `current_basis.json`.
#[cfg(feature = "persistence")]
#[derive(Clone, Debug)]
pub struct DiskBasisStore {
    directory: PathBuf,
}

#[cfg(feature = "persistence")]
impl DiskBasisStore {
    /// Name of the file holding the most recently used basis.
    pub const CURRENT_FILE_NAME: &'static str = "current_basis.json";

    /// Creates a store in the given directory, creating the directory if required.
    pub fn new<P: AsRef<Path>>(directory: P) -> io::Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the path of the file holding the basis with the given fingerprint.
    pub fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.directory.join(format!("{}.json", fingerprint))
    }

    /// Returns the path of the file holding the most recently used basis.
    pub fn current_path(&self) -> PathBuf {
        self.directory.join(Self::CURRENT_FILE_NAME)
    }
}

#[cfg(feature = "persistence")]
impl BasisStore for DiskBasisStore {
    fn load(&self, fingerprint: &str) -> io::Result<Option<Basis>> {
        let path = self.path_for(fingerprint);
        if !path.is_file() {
            return Ok(None);
        }
        utils::read_data_from_json(&path).map(Some)
    }

    fn save(&self, fingerprint: &str, basis: &Basis) -> io::Result<()> {
        utils::save_data_as_json_atomically(&self.path_for(fingerprint), basis)
    }

    fn mark_current(&self, _fingerprint: &str, basis: &Basis) -> io::Result<()> {
        utils::save_data_as_json_atomically(&self.current_path(), basis)
    }
}

#[cfg(all(test, feature = "persistence"))]
mod tests {

    use super::*;
    use crate::{config::CpabConfig, tessellation::Tessellation};

    fn basis_for(config: &CpabConfig) -> Basis {
        Basis::build(config, &Tessellation::new(config)).unwrap()
    }

    #[test]
    fn disk_store_round_trips_basis() {
        let directory = tempfile::tempdir().unwrap();
        let store = DiskBasisStore::new(directory.path().join("bases")).unwrap();
        let config = CpabConfig::new(&[2, 1]);
        let basis = basis_for(&config);

        assert!(store.load(&config.fingerprint()).unwrap().is_none());
        store.save(&config.fingerprint(), &basis).unwrap();
        assert!(store.path_for(&config.fingerprint()).is_file());

        let loaded = store.load(&config.fingerprint()).unwrap().unwrap();
        assert_eq!(loaded.dim(), basis.dim());
        assert_eq!(loaded.cell_counts(), basis.cell_counts());
        for (&a, &b) in loaded.basis().iter().zip(basis.basis().iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn disk_store_records_current_basis() {
        let directory = tempfile::tempdir().unwrap();
        let store = DiskBasisStore::new(directory.path()).unwrap();
        let config = CpabConfig::new(&[3]);
        let basis = basis_for(&config);

        store.mark_current(&config.fingerprint(), &basis).unwrap();
        let current: Basis = utils::read_data_from_json(&store.current_path()).unwrap();
        assert_eq!(current.dim(), basis.dim());

        // No temporary files are left behind
        let n_files = fs::read_dir(store.directory()).unwrap().count();
        assert_eq!(n_files, 1);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let directory = tempfile::tempdir().unwrap();
        let store = DiskBasisStore::new(directory.path()).unwrap();
        fs::write(store.path_for("broken"), "{ not json").unwrap();
        let err = store.load("broken").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
