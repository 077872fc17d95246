//! Feature-flag registry
//!
//! The engine's boolean settings are declared once as a static name list.
//! Each configuration variant resets every flag to enabled and then disables
//! an exact subset. The effective `FlagSet` is passed into the test's setup
//! factory by value; nothing here mutates process-wide state.

use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while resolving variant flag names against the registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlagError {
    /// A variant named a flag that is not in the known set.
    #[error("invalid setting option: {name} - valid options are {valid}")]
    Unknown {
        /// The unrecognized name as the operator spelled it.
        name: String,
        /// Comma-separated list of valid flag names.
        valid: String,
    },
}

/// The effective flag configuration for one (test, variant) pair.
///
/// Every known flag is enabled unless it appears in the disabled subset.
/// Names resolve case-insensitively to their canonical declared casing.
#[derive(Debug, Clone)]
pub struct FlagSet {
    known: &'static [&'static str],
    disabled: BTreeSet<&'static str>,
}

impl FlagSet {
    /// The baseline configuration: every known flag enabled.
    pub fn all_enabled(known: &'static [&'static str]) -> Self {
        Self {
            known,
            disabled: BTreeSet::new(),
        }
    }

    fn canonical(&self, name: &str) -> Option<&'static str> {
        self.known
            .iter()
            .copied()
            .find(|k| k.eq_ignore_ascii_case(name))
    }

    /// Derive a configuration with exactly the given flags forced off.
    /// Fails on the first unrecognized name, listing the valid options.
    pub fn with_disabled(&self, names: &[String]) -> Result<FlagSet, FlagError> {
        let mut disabled = BTreeSet::new();
        for name in names {
            match self.canonical(name) {
                Some(canonical) => {
                    disabled.insert(canonical);
                }
                None => {
                    return Err(FlagError::Unknown {
                        name: name.clone(),
                        valid: self.known.join(", "),
                    });
                }
            }
        }
        Ok(FlagSet {
            known: self.known,
            disabled,
        })
    }

    /// Whether a flag is enabled under this configuration. Names not in the
    /// known set report enabled, matching the default-on semantics.
    pub fn is_enabled(&self, name: &str) -> bool {
        match self.canonical(name) {
            Some(canonical) => !self.disabled.contains(canonical),
            None => true,
        }
    }

    /// Canonical names of the flags forced off, in sorted order.
    pub fn disabled_names(&self) -> Vec<String> {
        self.disabled.iter().map(|s| s.to_string()).collect()
    }

    /// The full set of known flag names.
    pub fn known(&self) -> &'static [&'static str] {
        self.known
    }
}

/// One `--unset` occurrence from the benchmark-process CLI: the flags to
/// force off for a single configuration variant. An empty occurrence is a
/// valid baseline variant that disables nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variant {
    /// Flag names exactly as the operator spelled them; resolved against the
    /// registry before any test executes.
    pub disabled: Vec<String>,
}

impl Variant {
    /// Parse a comma-separated `--unset` value. Empty entries are dropped,
    /// so `--unset=` and `--unset=,` both yield the baseline variant.
    pub fn parse(value: &str) -> Self {
        Variant {
            disabled: value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Whether this variant disables nothing.
    pub fn is_baseline(&self) -> bool {
        self.disabled.is_empty()
    }
}
