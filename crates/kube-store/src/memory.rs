//! # In-Memory Store
//!
//! A namespaced object map implementing [`ResourceStore`].
//!
//! Besides normal CRUD it offers test hooks: one-shot error injection per
//! operation, raw event emission to open watches, closing every watch, and
//! a counter of store calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{Object, ObjectList, Options, ResourceDescriptor, WatchEvent};
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::watch::{Watch, WatchSender};
use crate::{ResourceStore, DEFAULT_WATCH_CAPACITY};

/// Store operation, for error injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Delete,
    Watch,
}

/// (descriptor, namespace, name)
type Key = (String, String, String);

struct Watcher {
    descriptor: ResourceDescriptor,
    sender: WatchSender,
}

#[derive(Default)]
struct Inner {
    objects: RwLock<BTreeMap<Key, Object>>,
    watchers: Mutex<Vec<Watcher>>,
    failures: Mutex<HashMap<StoreOp, StoreError>>,
    calls: AtomicUsize,
    resource_version: AtomicU64,
}

/// In-memory [`ResourceStore`]. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, without emitting a watch event.
    pub fn insert(&self, descriptor: &ResourceDescriptor, namespace: &str, object: Object) {
        let name = object.name().unwrap_or_default().to_string();
        self.inner
            .objects
            .write()
            .insert(key(descriptor, namespace, &name), object);
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.inner.failures.lock().insert(op, error);
    }

    /// Make the next `watch` call fail with `error`.
    pub fn fail_watch(&self, error: StoreError) {
        self.fail_next(StoreOp::Watch, error);
    }

    /// Push a raw event to every open watch on `descriptor`.
    ///
    /// Returns the number of watches that received it.
    pub fn emit(&self, descriptor: &ResourceDescriptor, event: WatchEvent) -> usize {
        let mut watchers = self.inner.watchers.lock();
        watchers.retain(|w| !w.sender.is_closed());
        watchers
            .iter()
            .filter(|w| &w.descriptor == descriptor)
            .filter(|w| w.sender.try_send(event.clone()).is_ok())
            .count()
    }

    /// End every open watch as if the source connection was lost.
    pub fn close_watches(&self) {
        let closed = std::mem::take(&mut *self.inner.watchers.lock());
        debug!(count = closed.len(), "Closed all watches");
    }

    /// Number of watches still held open by a consumer.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        let mut watchers = self.inner.watchers.lock();
        watchers.retain(|w| !w.sender.is_closed());
        watchers.len()
    }

    /// Total store calls made, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.objects.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count the call and take any injected failure for `op`.
    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        match self.inner.failures.lock().remove(&op) {
            Some(error) => {
                trace!(?op, %error, "Injected store failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn next_resource_version(&self) -> String {
        (self.inner.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

fn key(descriptor: &ResourceDescriptor, namespace: &str, name: &str) -> Key {
    (descriptor.to_string(), namespace.to_string(), name.to_string())
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
        _options: &Options,
        _subresources: &[String],
    ) -> Result<Object, StoreError> {
        self.enter(StoreOp::Get)?;
        self.inner
            .objects
            .read()
            .get(&key(descriptor, namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::not_found(descriptor, name))
    }

    async fn list(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        _options: &Options,
    ) -> Result<ObjectList, StoreError> {
        self.enter(StoreOp::List)?;
        let prefix = descriptor.to_string();
        let items = self
            .inner
            .objects
            .read()
            .iter()
            .filter(|((d, ns, _), _)| *d == prefix && (namespace.is_empty() || ns == namespace))
            .map(|(_, object)| object.clone())
            .collect();
        Ok(ObjectList::new(descriptor.api_version(), "List", items))
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        object: &Object,
        _options: &Options,
        _subresources: &[String],
    ) -> Result<Object, StoreError> {
        self.enter(StoreOp::Create)?;
        let name = match object.name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(StoreError::invalid(format!(
                    "{} is invalid: metadata.name: Required value: name is required",
                    descriptor.resource
                )));
            }
        };

        let mut stored = object.clone();
        if !namespace.is_empty() && stored.namespace().is_none() {
            stored.set_metadata("namespace", namespace);
        }

        {
            let mut objects = self.inner.objects.write();
            let key = key(descriptor, namespace, &name);
            if objects.contains_key(&key) {
                return Err(StoreError::already_exists(descriptor, &name));
            }
            stored.set_metadata("resourceVersion", self.next_resource_version());
            objects.insert(key, stored.clone());
        }

        self.emit(descriptor, WatchEvent::added(stored.clone()));
        Ok(stored)
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
        _options: Option<&Options>,
        _subresources: &[String],
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::Delete)?;
        let removed = self
            .inner
            .objects
            .write()
            .remove(&key(descriptor, namespace, name))
            .ok_or_else(|| StoreError::not_found(descriptor, name))?;
        self.emit(descriptor, WatchEvent::deleted(removed));
        Ok(())
    }

    async fn watch(
        &self,
        descriptor: &ResourceDescriptor,
        _options: &Options,
    ) -> Result<Watch, StoreError> {
        self.enter(StoreOp::Watch)?;
        let (sender, watch) = Watch::channel(descriptor.clone(), DEFAULT_WATCH_CAPACITY);
        self.inner.watchers.lock().push(Watcher {
            descriptor: descriptor.clone(),
            sender,
        });
        debug!(%descriptor, "Watch opened");
        Ok(watch)
    }
}
