//! Identifier-driven registries for pluggable units
//!
//! A [`Registry`] maps identifiers of the form `<namespace>.<Type>` to
//! factories and instantiates the units named by a configured list. The
//! loaded set is built at most once per load call, even when several
//! threads ask for it at the same time, and a failed load never leaves a
//! partial set behind.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info};

use crate::error::ConfigurationError;

pub type Factory<T, C> = Arc<dyn Fn(&C) -> Arc<T> + Send + Sync>;

pub struct Registry<T: ?Sized, C> {
    kind: &'static str,
    identifiers: Vec<String>,
    context: C,
    factories: HashMap<String, Factory<T, C>>,
    loaded: RwLock<Option<Arc<[Arc<T>]>>>,
}

impl<T: ?Sized, C> Registry<T, C> {
    pub fn new(kind: &'static str, identifiers: Vec<String>, context: C) -> Self {
        Self {
            kind,
            identifiers,
            context,
            factories: HashMap::new(),
            loaded: RwLock::new(None),
        }
    }

    /// Make `identifier` resolvable. Registering after the first load only
    /// takes effect on the next [`Registry::load`].
    pub fn register<F>(&mut self, identifier: &str, factory: F) -> &mut Self
    where
        F: Fn(&C) -> Arc<T> + Send + Sync + 'static,
    {
        self.factories
            .insert(identifier.to_string(), Arc::new(factory));
        self
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// (Re)build the configured set, replacing any previously loaded one.
    pub fn load(&self) -> Result<Arc<[Arc<T>]>, ConfigurationError> {
        let mut slot = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        let built = self.build()?;
        *slot = Some(Arc::clone(&built));
        Ok(built)
    }

    /// The loaded set, loading it on first access.
    pub fn items(&self) -> Result<Arc<[Arc<T>]>, ConfigurationError> {
        {
            let slot = self.loaded.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(items) = slot.as_ref() {
                return Ok(Arc::clone(items));
            }
        }

        let mut slot = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(items) = slot.as_ref() {
            return Ok(Arc::clone(items));
        }
        let built = self.build()?;
        *slot = Some(Arc::clone(&built));
        Ok(built)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn build(&self) -> Result<Arc<[Arc<T>]>, ConfigurationError> {
        let items = self
            .identifiers
            .iter()
            .map(|identifier| self.resolve(identifier).map(|factory| factory(&self.context)))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| error!("Failed to load {}s: {}", self.kind, e))?;

        info!("Loaded {} {}s: {:?}", items.len(), self.kind, self.identifiers);
        Ok(items.into())
    }

    fn resolve(&self, identifier: &str) -> Result<&Factory<T, C>, ConfigurationError> {
        let (namespace, name) = identifier
            .rsplit_once('.')
            .filter(|(namespace, name)| !namespace.is_empty() && !name.is_empty())
            .ok_or_else(|| ConfigurationError::MalformedIdentifier(identifier.to_string()))?;

        if let Some(factory) = self.factories.get(identifier) {
            return Ok(factory);
        }

        let prefix = format!("{}.", namespace);
        let namespace_known = self
            .factories
            .keys()
            .any(|key| key.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('.')));

        if namespace_known {
            Err(ConfigurationError::UnknownType {
                identifier: identifier.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        } else {
            Err(ConfigurationError::UnknownNamespace {
                identifier: identifier.to_string(),
                namespace: namespace.to_string(),
            })
        }
    }
}
