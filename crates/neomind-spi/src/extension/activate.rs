//! Active extension selection.
//!
//! Extensions carrying an [`Activation`] join ordered subsets chosen by group
//! and by the keys present in a runtime context, which is how filter chains
//! and similar pipelines are assembled.

use std::collections::HashSet;
use std::sync::Arc;

use super::registry::ExtensionRegistry;
use super::types::ExtensionPoint;
use crate::error::Result;
use crate::url::Context;

/// Name prefix excluding an extension from the selection.
pub const REMOVE_VALUE_PREFIX: &str = "-";

/// Placeholder standing for all automatically activated extensions.
pub const DEFAULT_KEY: &str = "default";

/// Parameter values that leave a key disabled, compared case-insensitively.
const DISABLED_VALUES: [&str; 4] = ["false", "0", "null", "n/a"];

/// Whether a parameter value enables its key.
pub fn is_enabled_value(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !DISABLED_VALUES.iter().any(|d| value.eq_ignore_ascii_case(d))
}

/// Activation criteria of an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activation {
    groups: Vec<String>,
    keys: Vec<String>,
    order: i32,
}

impl Activation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups the extension is active in; empty means every group.
    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Context keys enabling the extension, as `key` or `key:value`.
    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Position within the selection; lower values come first.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn matches_group(&self, group: Option<&str>) -> bool {
        match group {
            None | Some("") => true,
            Some(group) => self.groups.is_empty() || self.groups.iter().any(|g| g == group),
        }
    }

    /// Whether at least one key is enabled in `context`.
    ///
    /// A plain key is enabled by a parameter named `key` or ending in
    /// `.key` whose value is not blank, `false`, `0`, `null` or `N/A`;
    /// `key:value` requires exactly that value instead.
    pub fn is_active(&self, context: &dyn Context) -> bool {
        if self.keys.is_empty() {
            return true;
        }
        let parameters = context.parameters();
        self.keys.iter().any(|key| {
            let (key, expected) = match key.split_once(':') {
                Some((k, v)) => (k, Some(v)),
                None => (key.as_str(), None),
            };
            let suffix = format!(".{}", key);
            parameters.iter().any(|(k, v)| {
                (*k == key || k.ends_with(&suffix))
                    && match expected {
                        Some(expected) => *v == expected,
                        None => is_enabled_value(v),
                    }
            })
        })
    }
}

/// An activatable extension as discovered from declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDescriptor {
    pub name: String,
    pub activation: Activation,
    /// Declaration order.
    pub seq: usize,
}

impl ActiveDescriptor {
    pub fn priority(&self) -> i32 {
        self.activation.order()
    }
}

/// Pick the descriptors active for `group` in `context`, ordered by ascending
/// priority then declaration order.
pub fn matching<'a>(
    descriptors: &'a [ActiveDescriptor],
    context: &dyn Context,
    group: Option<&str>,
) -> Vec<&'a ActiveDescriptor> {
    let mut matched: Vec<_> = descriptors
        .iter()
        .filter(|d| d.activation.matches_group(group) && d.activation.is_active(context))
        .collect();
    matched.sort_by_key(|d| (d.priority(), d.seq));
    matched
}

/// Build the active subset, honouring explicitly requested names.
///
/// `values` may name extensions to append in the given order, exclude them
/// with a `-` prefix, disable automatic activation with `-default`, or place
/// the automatically activated ones with `default`.
pub(crate) fn select<T: ExtensionPoint + ?Sized>(
    registry: &ExtensionRegistry<T>,
    descriptors: &[ActiveDescriptor],
    context: &dyn Context,
    values: &[&str],
    group: Option<&str>,
) -> Result<Vec<Arc<T>>> {
    let names: Vec<&str> = values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).collect();
    let requested: HashSet<&str> = names.iter().copied().collect();
    let removed = |name: &str| requested.contains(format!("{}{}", REMOVE_VALUE_PREFIX, name).as_str());

    let mut activated = Vec::new();
    if !removed(DEFAULT_KEY) {
        for descriptor in matching(descriptors, context, group) {
            let name = descriptor.name.as_str();
            if requested.contains(name) || removed(name) {
                continue;
            }
            activated.push(registry.get(name)?);
        }
    }

    let explicit = names
        .iter()
        .copied()
        .filter(|name| !name.starts_with(REMOVE_VALUE_PREFIX) && !removed(*name));

    if requested.contains(DEFAULT_KEY) {
        let mut result = Vec::with_capacity(activated.len() + names.len());
        for name in explicit {
            if name == DEFAULT_KEY {
                result.append(&mut activated);
            } else if registry.has_extension(name)? {
                result.push(registry.get(name)?);
            }
        }
        Ok(result)
    } else {
        for name in explicit {
            if registry.has_extension(name)? {
                activated.push(registry.get(name)?);
            }
        }
        Ok(activated)
    }
}
