//! Proto factory - type id registry.
//!
//! Ids are handed out sequentially from [`FIRST_USER_TYPE_ID`] in registration
//! order, so two peers that register the same types in the same order agree on
//! ids without negotiation. Peers that disagree are reconciled by name through
//! the negotiated [`ProtocolTable`].

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::message::{Message, Proto, RawData, TypedProto, RAW_DATA_NAME};
use super::{is_reserved_type_id, FIRST_USER_TYPE_ID, RAW_DATA_TYPE_ID};
use crate::error::{ChannelError, Result};
use crate::protocol::ProtocolTable;

/// Constructor of an empty message for a given type id.
pub type Creator = Arc<dyn Fn(i32) -> Box<dyn Proto> + Send + Sync>;

struct Entry {
    name: String,
    creator: Creator,
}

/// Registry of constructible message types.
///
/// Built once, then shared read-only (usually as `Arc<ProtoFactory>`) by every
/// client.
pub struct ProtoFactory {
    version: u32,
    entries: HashMap<i32, Entry>,
    by_name: HashMap<String, i32>,
    by_rust_type: HashMap<TypeId, i32>,
    next_type_id: i32,
}

impl ProtoFactory {
    /// Create a factory with the built-in messages registered.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        let mut factory = Self {
            version: Self::pack_version(major, minor, patch),
            entries: HashMap::new(),
            by_name: HashMap::new(),
            by_rust_type: HashMap::new(),
            next_type_id: FIRST_USER_TYPE_ID,
        };
        factory.register::<ProtocolTable>();
        factory.insert(
            RAW_DATA_TYPE_ID,
            RAW_DATA_NAME,
            Arc::new(|_| -> Box<dyn Proto> { Box::new(RawData::default()) }),
        );
        factory
    }

    /// Start a builder.
    pub fn builder(major: u32, minor: u32, patch: u32) -> ProtoFactoryBuilder {
        ProtoFactoryBuilder {
            factory: Self::new(major, minor, patch),
        }
    }

    /// Pack a semantic version into the factory version number.
    ///
    /// Each component keeps its low 8 bits: `major << 16 | minor << 8 | patch`.
    #[inline]
    pub fn pack_version(major: u32, minor: u32, patch: u32) -> u32 {
        ((major & 0xFF) << 16) | ((minor & 0xFF) << 8) | (patch & 0xFF)
    }

    /// Packed factory version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Register a [`Message`] type and return its id.
    ///
    /// Registering a name twice returns the existing id.
    pub fn register<T: Message>(&mut self) -> i32 {
        if let Some(&id) = self.by_name.get(T::NAME) {
            self.by_rust_type.entry(TypeId::of::<T>()).or_insert(id);
            return id;
        }
        let id = match T::TYPE_ID {
            Some(fixed) if !self.entries.contains_key(&fixed) => fixed,
            Some(fixed) => {
                tracing::warn!(
                    "type id {} of {} already taken by {}, assigning a new id",
                    fixed,
                    T::NAME,
                    self.name_of(fixed).unwrap_or_default()
                );
                self.next_free_id()
            }
            None => self.next_free_id(),
        };
        self.insert(
            id,
            T::NAME,
            Arc::new(|proto_type| -> Box<dyn Proto> {
                Box::new(TypedProto::new(proto_type, T::default()))
            }),
        );
        self.by_rust_type.insert(TypeId::of::<T>(), id);
        id
    }

    /// Register a hand-written [`Proto`] under `name` and return its id.
    ///
    /// `creator` receives the assigned id and must build an empty message
    /// reporting that id.
    pub fn register_with<F>(&mut self, name: &str, creator: F) -> i32
    where
        F: Fn(i32) -> Box<dyn Proto> + Send + Sync + 'static,
    {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.next_free_id();
        self.insert(id, name, Arc::new(creator));
        id
    }

    fn next_free_id(&mut self) -> i32 {
        while self.entries.contains_key(&self.next_type_id) {
            self.next_type_id += 1;
        }
        let id = self.next_type_id;
        self.next_type_id += 1;
        id
    }

    fn insert(&mut self, id: i32, name: &str, creator: Creator) {
        self.by_name.insert(name.to_string(), id);
        self.entries.insert(
            id,
            Entry {
                name: name.to_string(),
                creator,
            },
        );
    }

    /// Create an empty message by id.
    pub fn create(&self, type_id: i32) -> Option<Box<dyn Proto>> {
        self.entries
            .get(&type_id)
            .map(|entry| (entry.creator)(type_id))
    }

    /// Create an empty message by registered name.
    pub fn create_by_name(&self, name: &str) -> Option<Box<dyn Proto>> {
        self.type_id_by_name(name).and_then(|id| self.create(id))
    }

    /// Id of a registered [`Message`] type.
    pub fn type_id_of<T: Message>(&self) -> Option<i32> {
        self.by_rust_type.get(&TypeId::of::<T>()).copied()
    }

    /// Id registered under `name`.
    pub fn type_id_by_name(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    /// Name registered for `type_id`.
    pub fn name_of(&self, type_id: i32) -> Option<&str> {
        self.entries.get(&type_id).map(|e| e.name.as_str())
    }

    /// Check if an id is registered.
    #[inline]
    pub fn contains(&self, type_id: i32) -> bool {
        self.entries.contains_key(&type_id)
    }

    /// Create an empty message for a type id received from a peer.
    ///
    /// Reserved ids resolve locally. An id listed in the peer's table resolves
    /// through the peer's name for it; any other id is tried as a local id.
    pub fn resolve(&self, type_id: i32, peer: &ProtocolTable) -> Option<Box<dyn Proto>> {
        if is_reserved_type_id(type_id) {
            return self.create(type_id);
        }
        match peer.name_of(type_id) {
            Some(name) => self.create_by_name(name),
            None => self.create(type_id),
        }
    }

    /// Wrap a value of a registered type.
    ///
    /// Fails with `InvalidProtoType(-1)` if `T` was never registered.
    pub fn make<T: Message>(&self, value: T) -> Result<Box<dyn Proto>> {
        let id = self
            .type_id_of::<T>()
            .ok_or(ChannelError::InvalidProtoType(-1))?;
        Ok(Box::new(TypedProto::new(id, value)))
    }

    /// Snapshot of every user type as a protocol table.
    ///
    /// Reserved ids are left out.
    pub fn build_table(&self) -> ProtocolTable {
        let mut table = ProtocolTable::new(self.version);
        for (&id, entry) in &self.entries {
            if is_reserved_type_id(id) || id <= 0 {
                continue;
            }
            table.insert(id as u32, entry.name.clone());
        }
        table
    }

    /// Number of registered types, built-ins included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(id, name)` pairs.
    pub fn registered(&self) -> impl Iterator<Item = (i32, &str)> {
        self.entries.iter().map(|(&id, e)| (id, e.name.as_str()))
    }
}

impl Default for ProtoFactory {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl fmt::Debug for ProtoFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.registered().collect();
        types.sort_unstable();
        f.debug_struct("ProtoFactory")
            .field("version", &self.version)
            .field("types", &types)
            .finish()
    }
}

/// Chained registration ending in a shareable factory.
///
/// ```ignore
/// let factory = ProtoFactory::builder(1, 0, 0)
///     .register::<Login>()
///     .register::<Chat>()
///     .init();
/// ```
pub struct ProtoFactoryBuilder {
    factory: ProtoFactory,
}

impl ProtoFactoryBuilder {
    /// Register a [`Message`] type.
    pub fn register<T: Message>(mut self) -> Self {
        self.factory.register::<T>();
        self
    }

    /// Register a hand-written [`Proto`].
    pub fn register_with<F>(mut self, name: &str, creator: F) -> Self
    where
        F: Fn(i32) -> Box<dyn Proto> + Send + Sync + 'static,
    {
        self.factory.register_with(name, creator);
        self
    }

    /// Finish registration.
    pub fn init(self) -> Arc<ProtoFactory> {
        Arc::new(self.factory)
    }

    /// Finish registration without wrapping.
    pub fn build(self) -> ProtoFactory {
        self.factory
    }
}
