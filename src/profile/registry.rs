//! Named profile lookup built from one base profile plus overlays.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::settings::{AlgorithmOverlay, AlgorithmSettings, DeviceOverlay, DeviceSettings};
use crate::error::{Error, Result};

/// Fully resolved, validated settings selected by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub device: DeviceSettings,
    pub algorithm: AlgorithmSettings,
}

/// Partial profile merged onto the registry's base.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileOverlay {
    /// Display name; the registry key is used when absent.
    pub name: Option<String>,
    pub device: DeviceOverlay,
    pub algorithm: AlgorithmOverlay,
}

/// Base profile sections every registered profile derives from.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseProfile {
    pub device: DeviceSettings,
    pub algorithm: AlgorithmSettings,
}

/// Immutable mapping from profile name to overlay definition.
///
/// Built once at startup and shared read-only; every `resolve` derives a
/// fresh owned `Profile`, so callers can never observe each other's edits.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    base: BaseProfile,
    overlays: BTreeMap<String, ProfileOverlay>,
    aliases: BTreeMap<String, String>,
}

impl ProfileRegistry {
    pub fn new(base: BaseProfile) -> Self {
        Self {
            base,
            overlays: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Register `overlay` under `name`, replacing any earlier definition.
    pub fn define(mut self, name: impl Into<String>, overlay: ProfileOverlay) -> Self {
        let name = name.into();
        self.aliases.remove(&name);
        self.overlays.insert(name, overlay);
        self
    }

    /// Make `alias` resolve to whatever `target` resolves to.
    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    /// Register every overlay from `overlays`, e.g. the `profiles` table of a config file.
    pub fn with_overlays<I>(self, overlays: I) -> Self
    where
        I: IntoIterator<Item = (String, ProfileOverlay)>,
    {
        overlays
            .into_iter()
            .fold(self, |registry, (name, overlay)| registry.define(name, overlay))
    }

    pub fn base(&self) -> &BaseProfile {
        &self.base
    }

    pub fn contains(&self, name: &str) -> bool {
        self.overlays.contains_key(name) || self.aliases.contains_key(name)
    }

    /// Registered names, aliases included.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.overlays
            .keys()
            .chain(self.aliases.keys())
            .map(String::as_str)
    }

    /// Merge the named overlay onto a copy of the base and validate the result.
    pub fn resolve(&self, name: &str) -> Result<Profile> {
        let key = match self.aliases.get(name) {
            Some(target) => target.as_str(),
            None => name,
        };
        let overlay = self
            .overlays
            .get(key)
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))?;

        let profile = Profile {
            name: overlay.name.clone().unwrap_or_else(|| key.to_string()),
            device: self.base.device.overlay(&overlay.device),
            algorithm: self.base.algorithm.overlay(&overlay.algorithm),
        };
        profile.device.validate()?;
        profile.algorithm.validate()?;

        debug!(profile = %profile.name, requested = name, "Resolved profile");
        Ok(profile)
    }
}
