//! Ordered, queryable collections of key specifications.

use futures::future::try_join_all;
use serde_json::Value;

use crate::algorithm::{Algorithm, KeyOperation, KeyUse};
use crate::error::{KeyError, Result};
use crate::provider::ProviderRegistry;
use crate::spec::KeySpecification;

/// Named key specifications in insertion order.
///
/// Lookups go by `kid` once keys are loaded. Filters return new keychains
/// sharing the loaded material; the source keychain is never modified.
#[derive(Debug, Clone, Default)]
pub struct Keychain {
    entries: Vec<(String, KeySpecification)>,
}

impl Keychain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `{"<name>": <key specification>, ...}`.
    pub fn from_config(value: &Value, providers: &ProviderRegistry) -> Result<Self> {
        let Value::Object(members) = value else {
            return Err(KeyError::InvalidSpec(
                "keychain configuration must be an object".into(),
            ));
        };
        let mut keychain = Self::new();
        for (name, spec) in members {
            keychain.add(name.clone(), KeySpecification::parse(spec, providers)?)?;
        }
        Ok(keychain)
    }

    /// Add a key under `name`. Names, and the `kid`s of loaded keys, must be
    /// unique.
    pub fn add(&mut self, name: impl Into<String>, spec: KeySpecification) -> Result<()> {
        let name = name.into();
        if self.entries.iter().any(|(existing, _)| *existing == name) {
            return Err(KeyError::DuplicateKey(name));
        }
        if let Some(kid) = spec.kid() {
            if self.find(kid).is_some() {
                return Err(KeyError::DuplicateKey(kid.to_string()));
            }
        }
        self.entries.push((name, spec));
        Ok(())
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, name: impl Into<String>, spec: KeySpecification) -> Result<Self> {
        self.add(name, spec)?;
        Ok(self)
    }

    pub fn get(&self, kid: &str) -> Result<&KeySpecification> {
        self.find(kid)
            .ok_or_else(|| KeyError::KeyNotFound(kid.to_string()))
    }

    pub fn find(&self, kid: &str) -> Option<&KeySpecification> {
        self.iter().find(|spec| spec.kid() == Some(kid))
    }

    /// Lookup by configured name.
    pub fn by_name(&self, name: &str) -> Option<&KeySpecification> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, spec)| spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeySpecification> {
        self.entries.iter().map(|(_, spec)| spec)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys matching every supplied predicate. All keys must be loaded.
    pub fn filter(
        &self,
        algorithm: Option<Algorithm>,
        key_use: Option<KeyUse>,
        op: Option<KeyOperation>,
    ) -> Result<Self> {
        if self.iter().any(|spec| !spec.is_loaded()) {
            return Err(KeyError::NotLoaded);
        }
        Ok(self.retain(|spec| {
            algorithm.map_or(true, |alg| spec.algorithm() == alg)
                && key_use.map_or(true, |key_use| spec.key_use() == key_use)
                && op.map_or(true, |op| spec.can_perform(op))
        }))
    }

    /// Public projections of every asymmetric key. Symmetric keys are left
    /// out.
    pub fn public(&self) -> Result<Self> {
        let mut entries = Vec::new();
        for (name, spec) in &self.entries {
            if spec.is_symmetric() {
                continue;
            }
            entries.push((name.clone(), spec.as_public()?));
        }
        Ok(Self { entries })
    }

    /// Keys holding private or secret material.
    pub fn private(&self) -> Self {
        self.retain(|spec| !spec.is_public())
    }

    /// Keys carrying every tag in `tags`.
    pub fn tagged<S: AsRef<str>>(&self, tags: &[S]) -> Self {
        self.retain(|spec| tags.iter().all(|tag| spec.has_tag(tag.as_ref())))
    }

    /// Load every key concurrently. Any failure, including a duplicate
    /// derived `kid`, leaves the keychain as it was.
    pub async fn load(&mut self) -> Result<()> {
        let mut entries = self.entries.clone();
        try_join_all(entries.iter_mut().map(|(_, spec)| spec.load())).await?;

        check_unique_kids(&entries)?;

        self.entries = entries;
        tracing::debug!(count = self.entries.len(), "keychain loaded");
        Ok(())
    }

    pub async fn into_loaded(mut self) -> Result<Self> {
        self.load().await?;
        Ok(self)
    }

    fn retain(&self, keep: impl Fn(&KeySpecification) -> bool) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, spec)| keep(spec))
                .cloned()
                .collect(),
        }
    }
}

fn check_unique_kids(entries: &[(String, KeySpecification)]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for (_, spec) in entries {
        if let Some(kid) = spec.kid() {
            if !seen.insert(kid) {
                return Err(KeyError::DuplicateKey(kid.to_string()));
            }
        }
    }
    Ok(())
}
