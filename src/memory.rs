//! In-memory resource backend
//!
//! Stores resources in a map and records every call, so runs can be
//! inspected after the fact. Used by tests and dry runs.

use crate::context::Context;
use crate::mask::Field;
use crate::resource::{ApiError, ApiResult, ResourceApi};
use crate::value::{Resource, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

/// A backend call, as recorded by [`MemoryApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Create(String),
    Update { address: String, mask: Vec<Field> },
    Delete(String),
}

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<String, Resource>,
    calls: Vec<Call>,
    failing: BTreeSet<String>,
}

/// Thread-safe in-memory [`ResourceApi`]
///
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryApi {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a resource as if it already existed
    pub fn seed(&self, resource: Resource) {
        let resource = Resource {
            exists: true,
            ..resource
        };
        self.lock().resources.insert(resource.address(), resource);
    }

    /// Make every mutating call for `address` fail
    pub fn fail_on(&self, address: impl Into<String>) {
        self.lock().failing.insert(address.into());
    }

    /// Stored resource at `address`
    pub fn resource(&self, address: &str) -> Option<Resource> {
        self.lock().resources.get(address).cloned()
    }

    /// Addresses of every stored resource
    pub fn addresses(&self) -> Vec<String> {
        self.lock().resources.keys().cloned().collect()
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls other than reads
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Get(_)))
            .collect()
    }

    fn check_failing(inner: &Inner, address: &str) -> ApiResult<()> {
        if inner.failing.contains(address) {
            return Err(ApiError::Other(anyhow::anyhow!(
                "injected failure for {address}"
            )));
        }
        Ok(())
    }

    fn with_attrs(resource: &Resource) -> Resource {
        let mut stored = resource.clone();
        stored.exists = true;
        stored.attrs = Value::map([(
            "id",
            Value::from(format!(
                "{}/{}",
                resource.kind,
                resource.identifier_str().unwrap_or_default()
            )),
        )]);
        stored
    }
}

impl ResourceApi for MemoryApi {
    fn get_resource(&self, _ctx: &Context, resource: &Resource) -> ApiResult<Resource> {
        let address = resource.address();
        let mut inner = self.lock();
        inner.calls.push(Call::Get(address.clone()));
        inner
            .resources
            .get(&address)
            .cloned()
            .ok_or(ApiError::NotFound(address))
    }

    fn create_resource(&self, _ctx: &Context, resource: &Resource) -> ApiResult<Resource> {
        let address = resource.address();
        let mut inner = self.lock();
        inner.calls.push(Call::Create(address.clone()));
        Self::check_failing(&inner, &address)?;
        let stored = Self::with_attrs(resource);
        inner.resources.insert(address, stored.clone());
        Ok(stored)
    }

    fn update_resource(
        &self,
        _ctx: &Context,
        resource: &Resource,
        mask: &[Field],
    ) -> ApiResult<Resource> {
        let address = resource.address();
        let mut inner = self.lock();
        inner.calls.push(Call::Update {
            address: address.clone(),
            mask: mask.to_vec(),
        });
        Self::check_failing(&inner, &address)?;
        if !inner.resources.contains_key(&address) {
            return Err(ApiError::NotFound(address));
        }
        let stored = Self::with_attrs(resource);
        inner.resources.insert(address, stored.clone());
        Ok(stored)
    }

    fn delete_resource(&self, _ctx: &Context, resource: &Resource) -> ApiResult<()> {
        let address = resource.address();
        let mut inner = self.lock();
        inner.calls.push(Call::Delete(address.clone()));
        Self::check_failing(&inner, &address)?;
        inner
            .resources
            .remove(&address)
            .map(|_| ())
            .ok_or(ApiError::NotFound(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Provider;

    fn bucket() -> Resource {
        Resource::new(Provider::new("cloud"), "bucket", "assets")
    }

    #[test]
    fn test_create_then_get() {
        let api = MemoryApi::new();
        let ctx = Context::new();

        let created = api.create_resource(&ctx, &bucket()).unwrap();
        assert_eq!(created.attrs, Value::map([("id", Value::from("bucket/assets"))]));
        assert_eq!(api.get_resource(&ctx, &bucket()).unwrap(), created);
        assert_eq!(api.addresses(), vec!["cloud/bucket/assets".to_string()]);
    }

    #[test]
    fn test_missing_resource_is_not_found() {
        let api = MemoryApi::new();
        let err = api.get_resource(&Context::new(), &bucket()).unwrap_err();
        assert!(err.is_not_found());
        assert!(api.mutations().is_empty());
    }

    #[test]
    fn test_injected_failure() {
        let api = MemoryApi::new();
        api.fail_on("cloud/bucket/assets");

        assert!(api.create_resource(&Context::new(), &bucket()).is_err());
        assert!(api.resource("cloud/bucket/assets").is_none());
        assert_eq!(api.calls(), vec![Call::Create("cloud/bucket/assets".into())]);
    }
}
