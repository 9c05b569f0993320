//! The instance registry.
//!
//! Each host-visible measure registers here on first contact and is
//! addressed by its [`InstanceId`] afterwards. Finalizing an instance tears
//! it down and removes it; no global state survives the last removal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rainode_host::HostApi;

use crate::errors::{BridgeError, Result};
use crate::instance::InstanceId;
use crate::measure::Measure;
use crate::BridgeSettings;

pub struct Registry {
    settings: BridgeSettings,
    next_id: AtomicU64,
    instances: Mutex<HashMap<u64, Arc<Measure>>>,
}

impl Registry {
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings,
            next_id: AtomicU64::new(1),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a fresh instance bound to a host boundary.
    pub fn register(&self, api: Arc<dyn HostApi>) -> Arc<Measure> {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let measure = Arc::new(Measure::new(id, api, self.settings.clone()));
        if let Ok(mut instances) = self.instances.lock() {
            instances.insert(id.as_u64(), Arc::clone(&measure));
        }
        measure
    }

    pub fn get(&self, id: InstanceId) -> Option<Arc<Measure>> {
        self.instances
            .lock()
            .ok()
            .and_then(|instances| instances.get(&id.as_u64()).cloned())
    }

    /// Tear an instance down and drop it from the registry.
    pub fn finalize(&self, id: InstanceId) -> Result<()> {
        let measure = self
            .instances
            .lock()
            .ok()
            .and_then(|mut instances| instances.remove(&id.as_u64()))
            .ok_or(BridgeError::UnknownInstance(id.as_u64()))?;
        measure.finalize();
        Ok(())
    }

    /// Tear down every registered instance, in no particular order.
    pub fn finalize_all(&self) {
        let drained: Vec<Arc<Measure>> = match self.instances.lock() {
            Ok(mut instances) => instances.drain().map(|(_, m)| m).collect(),
            Err(_) => return,
        };
        for measure in drained {
            measure.finalize();
        }
    }

    pub fn len(&self) -> usize {
        self.instances.lock().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rainode_host::{HostConfig, StaticHost};

    fn api() -> Arc<dyn HostApi> {
        Arc::new(StaticHost::new(HostConfig::default()))
    }

    #[test]
    fn registration_assigns_distinct_ids() {
        let registry = Registry::new(BridgeSettings::default());
        let a = registry.register(api());
        let b = registry.register(api());
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn finalize_removes_the_instance() {
        let registry = Registry::new(BridgeSettings::default());
        let measure = registry.register(api());
        let id = measure.id();

        assert!(registry.get(id).is_some());
        registry.finalize(id).unwrap();
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn finalizing_twice_reports_unknown_instance() {
        let registry = Registry::new(BridgeSettings::default());
        let id = registry.register(api()).id();
        registry.finalize(id).unwrap();
        assert!(matches!(
            registry.finalize(id),
            Err(BridgeError::UnknownInstance(_))
        ));
    }

    #[test]
    fn finalize_all_drains_the_registry() {
        let registry = Registry::new(BridgeSettings::default());
        registry.register(api());
        registry.register(api());
        registry.finalize_all();
        assert!(registry.is_empty());
    }
}
