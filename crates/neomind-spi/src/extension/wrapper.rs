//! Wrapper chain construction.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::implementation::Implementation;
use super::types::ExtensionPoint;
use crate::error::{ExtensionError, Result};

/// Name filter deciding which extensions a wrapper decorates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapperFilter {
    matches: Vec<String>,
    mismatches: Vec<String>,
}

impl WrapperFilter {
    pub fn with_matches(mut self, names: &[&str]) -> Self {
        self.matches = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_mismatches(mut self, names: &[&str]) -> Self {
        self.mismatches = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn matches(&self) -> &[String] {
        &self.matches
    }

    pub fn mismatches(&self) -> &[String] {
        &self.mismatches
    }

    pub fn accepts(&self, name: &str) -> bool {
        (self.matches.is_empty() || self.matches.iter().any(|m| m == name))
            && !self.mismatches.iter().any(|m| m == name)
    }
}

/// Decorate `base` with every wrapper accepting `name`.
///
/// Wrappers are stably sorted by ascending priority and applied in reverse,
/// so the lowest priority value ends up outermost: with `w1` (priority 1) and
/// `w2` (priority 2) the result is `w1(w2(base))`. `prepare` runs on each new
/// wrapper right after construction.
pub(crate) fn decorate<T, F>(
    name: &str,
    base: Arc<T>,
    wrappers: &[Arc<Implementation<T>>],
    mut prepare: F,
) -> Result<Arc<T>>
where
    T: ExtensionPoint + ?Sized,
    F: FnMut(&Arc<T>),
{
    let mut ordered: Vec<&Arc<Implementation<T>>> = wrappers.iter().collect();
    ordered.sort_by_key(|w| w.priority());
    ordered.reverse();

    let mut instance = base;
    for wrapper in ordered {
        if !wrapper.filter().accepts(name) {
            continue;
        }
        let Some(constructor) = wrapper.wrapper_constructor() else {
            continue;
        };
        let inner = Arc::clone(&instance);
        instance = catch_unwind(AssertUnwindSafe(|| constructor(inner))).map_err(|panic| {
            ExtensionError::Instantiation {
                extension: T::NAME.to_string(),
                name: name.to_string(),
                class: wrapper.class().to_string(),
                reason: panic_message(panic.as_ref()),
            }
        })?;
        prepare(&instance);
        tracing::trace!(extension = %T::NAME, name = %name, wrapper = %wrapper.class(), "Applied wrapper");
    }
    Ok(instance)
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "constructor panicked".to_string()
    }
}
