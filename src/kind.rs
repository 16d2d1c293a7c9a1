//! Type-erased per-kind function table, and the [Payload] wrapper every cached value lives in.
//!
//! Handles of every kind live in one registry, so they carry their payloads as `Arc<dyn Any>` and reach back into the
//! concrete [Resource] implementation through the function pointers stored here.
use std::any::{Any, TypeId};
use std::ops::Deref;
use std::sync::Arc;

use crate::*;

/// A payload with its concrete type erased.  Always an `Arc<Payload<T>>` underneath.
pub type ErasedPayload = Arc<dyn Any + Send + Sync>;

/// A resource value owned by the cache.
///
/// Dropping the last reference calls [Resource::unload], whether that reference was held by a handle, by the
/// placeholder table, or by a caller who kept the result of [crate::Ptr::get].
#[derive(Debug)]
pub struct Payload<T: Resource> {
    value: Option<T>,
}

impl<T: Resource> Payload<T> {
    pub(crate) fn new(value: T) -> Payload<T> {
        Payload { value: Some(value) }
    }

    pub(crate) fn erased(value: T) -> ErasedPayload {
        Arc::new(Payload::new(value)) as ErasedPayload
    }
}

impl<T: Resource> Deref for Payload<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(x) => x,
            None => unreachable!("only emptied while dropping"),
        }
    }
}

impl<T: Resource> Drop for Payload<T> {
    fn drop(&mut self) {
        if let Some(x) = self.value.take() {
            x.unload();
        }
    }
}

#[derive(Copy, Clone)]
pub(crate) struct ResourceKind {
    id: TypeId,
    name: &'static str,
    decode: fn(&[u8]) -> Result<ErasedPayload, BoxError>,
}

fn decode_erased<T: Resource>(bytes: &[u8]) -> Result<ErasedPayload, BoxError> {
    match T::load(bytes) {
        Ok(x) => Ok(Payload::erased(x)),
        Err(e) => Err(Box::new(e) as BoxError),
    }
}

impl ResourceKind {
    pub(crate) fn of<T: Resource>() -> ResourceKind {
        ResourceKind {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            decode: decode_erased::<T>,
        }
    }

    pub(crate) fn id(&self) -> TypeId {
        self.id
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> Result<ErasedPayload, BoxError> {
        (self.decode)(bytes)
    }
}

impl std::fmt::Debug for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}
