//! Single-slot caches guarding exactly-once construction.

use std::any::TypeId;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use super::implementation::Constructor;
use super::types::{downcast, erase, AnyObject, ExtensionPoint};
use super::wrapper::panic_message;
use crate::error::{ExtensionError, Result};

/// A lazily populated cell.
///
/// The first caller of [`Holder::get_or_try_init`] runs the initializer while
/// concurrent callers block; afterwards reads are lock-free. A failed
/// initializer leaves the holder empty.
#[derive(Debug)]
pub struct Holder<V> {
    cell: OnceCell<V>,
}

impl<V> Holder<V> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Option<&V> {
        self.cell.get()
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get_or_init<F: FnOnce() -> V>(&self, init: F) -> &V {
        self.cell.get_or_init(init)
    }

    pub fn get_or_try_init<F, E>(&self, init: F) -> std::result::Result<&V, E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
    {
        self.cell.get_or_try_init(init)
    }
}

impl<V> Default for Holder<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Holders keyed by string, inserted on demand.
///
/// Lookups take the read lock; only the first request for a key takes the
/// write lock to insert an empty holder. Construction itself happens on the
/// holder, outside both locks.
#[derive(Debug)]
pub struct HolderMap<V> {
    holders: RwLock<HashMap<String, Arc<Holder<V>>>>,
}

impl<V> HolderMap<V> {
    pub fn new() -> Self {
        Self {
            holders: RwLock::new(HashMap::new()),
        }
    }

    pub fn holder(&self, key: &str) -> Arc<Holder<V>> {
        if let Some(holder) = self.holders.read().get(key) {
            return Arc::clone(holder);
        }
        let mut holders = self.holders.write();
        Arc::clone(holders.entry(key.to_string()).or_default())
    }

    pub fn get(&self, key: &str) -> Option<Arc<Holder<V>>> {
        self.holders.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Holder<V>>> {
        self.holders.write().remove(key)
    }

    /// Keys whose holder has been populated.
    pub fn populated_keys(&self) -> Vec<String> {
        self.holders
            .read()
            .iter()
            .filter(|(_, h)| h.is_set())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl<V> Default for HolderMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw, undecorated instances: one per (extension point, implementation class).
#[derive(Default)]
pub struct InstanceTable {
    instances: Mutex<HashMap<(TypeId, String), Arc<Holder<AnyObject>>>>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the raw instance of `class`.
    ///
    /// The holder is inserted under the table lock; the constructor runs on
    /// the holder so exactly one caller invokes it. A panicking constructor
    /// is reported as [`ExtensionError::Instantiation`] and may be retried.
    pub fn get_or_create<T: ExtensionPoint + ?Sized>(
        &self,
        name: &str,
        class: &str,
        constructor: &Constructor<T>,
    ) -> Result<Arc<T>> {
        let holder = {
            let mut instances = self.instances.lock();
            Arc::clone(
                instances
                    .entry((TypeId::of::<T>(), class.to_string()))
                    .or_default(),
            )
        };

        let object = holder.get_or_try_init(|| {
            tracing::debug!(extension = %T::NAME, class = %class, "Creating extension instance");
            catch_unwind(AssertUnwindSafe(|| constructor()))
                .map(erase)
                .map_err(|panic| ExtensionError::Instantiation {
                    extension: T::NAME.to_string(),
                    name: name.to_string(),
                    class: class.to_string(),
                    reason: panic_message(panic.as_ref()),
                })
        })?;

        downcast::<T>(object).ok_or_else(|| ExtensionError::Instantiation {
            extension: T::NAME.to_string(),
            name: name.to_string(),
            class: class.to_string(),
            reason: "cached instance has an unexpected type".to_string(),
        })
    }

    /// Number of raw instances created so far.
    pub fn len(&self) -> usize {
        self.instances.lock().values().filter(|h| h.is_set()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
