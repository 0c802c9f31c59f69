//! Caching of bases across transformations with the same configuration.

use super::Basis;
use crate::{config::CpabConfig, error::Result, io::store::BasisStore, tessellation::Tessellation};
use lazy_static::lazy_static;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

lazy_static! {
    static ref SHARED_REGISTRY: BasisRegistry = BasisRegistry::new();
}

/// Slot holding the basis of one fingerprint once it has been produced.
type BasisSlot = Arc<Mutex<Option<Arc<Basis>>>>;

/// Cache of computed bases, keyed by configuration fingerprint.
///
/// Each distinct configuration is computed at most once per registry. An
/// optional store lets bases survive across process runs.
#[derive(Debug, Default)]
pub struct BasisRegistry {
    cache: Mutex<HashMap<String, BasisSlot>>,
    store: Option<Box<dyn BasisStore>>,
}

impl BasisRegistry {
    /// Creates a registry that only caches in memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry backed by the given persistent store.
    pub fn with_store<S: BasisStore + 'static>(store: S) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            store: Some(Box::new(store)),
        }
    }

    /// Returns the in-memory registry shared by the whole process.
    pub fn shared() -> &'static Self {
        &SHARED_REGISTRY
    }

    /// Returns a reference to the persistent store, if any.
    pub fn store(&self) -> Option<&dyn BasisStore> {
        self.store.as_deref()
    }

    /// Returns the number of bases held in memory.
    pub fn len(&self) -> usize {
        self.lock_cache()
            .values()
            .filter(|slot| lock_slot(slot).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a basis for the given fingerprint is held in memory.
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.lock_cache()
            .get(fingerprint)
            .is_some_and(|slot| lock_slot(slot).is_some())
    }

    /// Returns the basis for the given configuration, loading it from the
    /// store or computing it if it is not already cached.
    ///
    /// Only the slot of the requested fingerprint stays locked while the
    /// basis is produced. Concurrent callers with the same configuration wait
    /// for the first one and reuse its result, while other configurations
    /// proceed independently.
    pub fn load_or_build(
        &self,
        config: &CpabConfig,
        tessellation: &Tessellation,
    ) -> Result<Arc<Basis>> {
        let fingerprint = config.fingerprint();
        let verbose = config.verbosity.print_messages();

        let entry = Arc::clone(self.lock_cache().entry(fingerprint.clone()).or_default());
        let mut slot = lock_slot(&entry);
        if let Some(basis) = slot.as_ref() {
            if verbose {
                println!("Reusing cached basis {}", &fingerprint);
            }
            return Ok(Arc::clone(basis));
        }

        let stored = match &self.store {
            Some(store) => store.load(&fingerprint)?,
            None => None,
        };

        let basis = match stored {
            Some(basis) if basis.matches(config) => {
                if verbose {
                    println!("Loaded basis {} from store", &fingerprint);
                }
                basis
            }
            stale => {
                if verbose {
                    if stale.is_some() {
                        println!("Stored basis {} does not match configuration", &fingerprint);
                    }
                    println!("Computing basis {}", &fingerprint);
                }
                let basis = Basis::build(config, tessellation)?;
                if let Some(store) = &self.store {
                    store.save(&fingerprint, &basis)?;
                }
                if verbose {
                    println!(
                        "Basis {} has dimension {} of {} affine parameters",
                        &fingerprint,
                        basis.dim(),
                        basis.n_params()
                    );
                }
                basis
            }
        };

        if let Some(store) = &self.store {
            store.mark_current(&fingerprint, &basis)?;
        }

        let basis = Arc::new(basis);
        *slot = Some(Arc::clone(&basis));
        Ok(basis)
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, BasisSlot>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_slot(slot: &Mutex<Option<Arc<Basis>>>) -> MutexGuard<'_, Option<Arc<Basis>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
