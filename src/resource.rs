//! Backend trait for managed resources
//!
//! A `ResourceApi` is the only thing in the engine that touches real
//! infrastructure. Implementations live outside this crate (cloud
//! plugins, test doubles); the engine calls them without holding any lock,
//! so they may block on I/O and run concurrently.

use crate::context::Context;
use crate::mask::Field;
use crate::value::Resource;
use thiserror::Error;

/// Errors returned by a resource backend
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend has no such resource
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Any other backend failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// Whether this error means "does not exist" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for backend calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// CRUD operations on resources
///
/// # Example
///
/// ```ignore
/// use formation::{ApiResult, Context, Field, Resource, ResourceApi};
///
/// struct Noop;
///
/// impl ResourceApi for Noop {
///     fn get_resource(&self, _ctx: &Context, r: &Resource) -> ApiResult<Resource> {
///         Err(formation::ApiError::NotFound(r.address()))
///     }
///     fn create_resource(&self, _ctx: &Context, r: &Resource) -> ApiResult<Resource> {
///         Ok(r.clone())
///     }
///     fn update_resource(&self, _ctx: &Context, r: &Resource, _mask: &[Field]) -> ApiResult<Resource> {
///         Ok(r.clone())
///     }
///     fn delete_resource(&self, _ctx: &Context, _r: &Resource) -> ApiResult<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait ResourceApi: Send + Sync {
    /// Read the observed state of a resource
    ///
    /// Must return `ApiError::NotFound` when the resource does not exist;
    /// the engine maps that to `exists = false`.
    fn get_resource(&self, ctx: &Context, resource: &Resource) -> ApiResult<Resource>;

    /// Create the resource, returning it with backend attrs filled in
    fn create_resource(&self, ctx: &Context, resource: &Resource) -> ApiResult<Resource>;

    /// Apply the fields named in `mask` from `resource`
    fn update_resource(
        &self,
        ctx: &Context,
        resource: &Resource,
        mask: &[Field],
    ) -> ApiResult<Resource>;

    /// Remove the resource
    fn delete_resource(&self, ctx: &Context, resource: &Resource) -> ApiResult<()>;
}

impl<T: ResourceApi + ?Sized> ResourceApi for std::sync::Arc<T> {
    fn get_resource(&self, ctx: &Context, resource: &Resource) -> ApiResult<Resource> {
        (**self).get_resource(ctx, resource)
    }

    fn create_resource(&self, ctx: &Context, resource: &Resource) -> ApiResult<Resource> {
        (**self).create_resource(ctx, resource)
    }

    fn update_resource(
        &self,
        ctx: &Context,
        resource: &Resource,
        mask: &[Field],
    ) -> ApiResult<Resource> {
        (**self).update_resource(ctx, resource, mask)
    }

    fn delete_resource(&self, ctx: &Context, resource: &Resource) -> ApiResult<()> {
        (**self).delete_resource(ctx, resource)
    }
}
