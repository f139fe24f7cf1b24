//! Call-scoped table of application streams addressed by opaque handles.
//!
//! A registry lives on the stack of one encode/decode call. The engine only
//! ever sees [`HandleId`]s; callbacks turn them back into streams through
//! [`HandleRegistry::resolve`], which fails closed for ids that are unknown,
//! already released, or registered without the capability the callback
//! needs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::{Read, Seek, Write};

use bitflags::bitflags;
use log::{trace, warn};

use crate::engine::{HandleId, Status};

bitflags! {
    /// What a registered stream can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const SEEKABLE = 1 << 2;
    }
}

/// A readable, seekable stream.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// A borrowed application stream, tagged with its capabilities.
pub enum Stream<'s> {
    Reader(&'s mut dyn Read),
    SeekableReader(&'s mut dyn ReadSeek),
    Writer(&'s mut dyn Write),
}

impl Stream<'_> {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Stream::Reader(_) => Capabilities::READABLE,
            Stream::SeekableReader(_) => Capabilities::READABLE | Capabilities::SEEKABLE,
            Stream::Writer(_) => Capabilities::WRITABLE,
        }
    }
}

impl std::fmt::Debug for Stream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Stream").field(&self.capabilities()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("handle {0} is not registered")]
    InvalidHandle(HandleId),
    #[error("handle {id} lacks {missing:?}")]
    MissingCapability { id: HandleId, missing: Capabilities },
    #[error("handle {0} is already in use by an outer callback")]
    Busy(HandleId),
}

impl From<RegistryError> for Status {
    fn from(_: RegistryError) -> Self {
        Status::InvalidHandle
    }
}

pub struct HandleRegistry<'s> {
    entries: RefCell<HashMap<HandleId, Stream<'s>>>,
    next_id: Cell<u64>,
}

impl Default for HandleRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'s> HandleRegistry<'s> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Add a stream. Ids are never reused within one registry.
    pub fn register(&self, stream: Stream<'s>) -> HandleId {
        let id = HandleId::from_raw(self.next_id.get());
        self.next_id.set(id.into_raw() + 1);
        trace!("register {id}: {:?}", stream.capabilities());
        self.entries.borrow_mut().insert(id, stream);
        id
    }

    /// Register a stream and release it when the guard drops.
    pub fn acquire(&self, stream: Stream<'s>) -> HandleGuard<'_, 's> {
        HandleGuard {
            registry: self,
            id: self.register(stream),
        }
    }

    /// Run `f` on the stream behind `id`, provided it has every capability
    /// in `required`.
    pub fn resolve<T>(
        &self,
        id: HandleId,
        required: Capabilities,
        f: impl FnOnce(&mut Stream<'s>) -> T,
    ) -> Result<T, RegistryError> {
        let mut entries = self
            .entries
            .try_borrow_mut()
            .map_err(|_| RegistryError::Busy(id))?;
        let stream = entries
            .get_mut(&id)
            .ok_or(RegistryError::InvalidHandle(id))?;
        let missing = required - stream.capabilities();
        if !missing.is_empty() {
            return Err(RegistryError::MissingCapability { id, missing });
        }
        Ok(f(stream))
    }

    pub fn capabilities(&self, id: HandleId) -> Option<Capabilities> {
        self.entries.borrow().get(&id).map(Stream::capabilities)
    }

    /// Drop the entry for `id`. Releasing an id that is not live is an error.
    pub fn release(&self, id: HandleId) -> Result<(), RegistryError> {
        let mut entries = self
            .entries
            .try_borrow_mut()
            .map_err(|_| RegistryError::Busy(id))?;
        entries
            .remove(&id)
            .map(|_| trace!("release {id}"))
            .ok_or(RegistryError::InvalidHandle(id))
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// Releases its handle on drop, on every exit path.
#[must_use = "the handle is released as soon as the guard is dropped"]
pub struct HandleGuard<'r, 's> {
    registry: &'r HandleRegistry<'s>,
    id: HandleId,
}

impl HandleGuard<'_, '_> {
    pub fn id(&self) -> HandleId {
        self.id
    }
}

impl Drop for HandleGuard<'_, '_> {
    fn drop(&mut self) {
        if let Err(e) = self.registry.release(self.id) {
            warn!("releasing {}: {e}", self.id);
        }
    }
}
