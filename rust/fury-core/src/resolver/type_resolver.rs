// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::error::Error;
use crate::meta::{EncodingPolicy, MetaString};
use crate::resolver::meta_string_resolver::MetaStringTable;
use crate::resolver::pool::Pool;
use crate::resolver::ref_resolver::ShareFn;
use crate::serializer::{self, Deserializer, Serializer, Value};
use crate::types::{TypeKind, WireTag};

type IdentityFn = fn(&dyn Any) -> Option<usize>;
type SerializerFactory = Box<dyn Fn() -> Box<dyn Serializer> + Send + Sync>;
type DeserializerFactory = Box<dyn Fn() -> Box<dyn Deserializer> + Send + Sync>;

/// Handle types whose clones point at one shared object.
///
/// Registering such a type with [`TypeRegistrationBuilder::shared`] makes its
/// values referenceable: the engine tracks them by identity and writes later
/// sightings as back-references.
pub trait SharedRef: Clone + 'static {
    /// Address of the shared allocation.
    fn ref_identity(&self) -> usize;
}

impl<T: ?Sized + 'static> SharedRef for Rc<T> {
    #[inline(always)]
    fn ref_identity(&self) -> usize {
        Rc::as_ptr(self) as *const () as usize
    }
}

impl<T: ?Sized + 'static> SharedRef for Arc<T> {
    #[inline(always)]
    fn ref_identity(&self) -> usize {
        Arc::as_ptr(self) as *const () as usize
    }
}

fn identity_of<T: SharedRef>(value: &dyn Any) -> Option<usize> {
    value.downcast_ref::<T>().map(T::ref_identity)
}

fn share_of<T: SharedRef>(value: &dyn Any) -> Option<Value> {
    value.downcast_ref::<T>().map(|v| Box::new(v.clone()) as Value)
}

#[derive(Clone, Copy)]
struct SharedHooks {
    identity: IdentityFn,
    share: ShareFn,
}

/// Payload size a codec declares up front.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SizeHint {
    /// The payload is always exactly this many bytes. The engine makes sure
    /// they are buffered before reading and that the output has room for
    /// them before writing, so the codec never observes a suspension.
    Fixed(usize),
    #[default]
    Variable,
}

/// Everything the engine knows about one registered Rust type.
pub struct TypeRegistration {
    rust_type: TypeId,
    type_name: &'static str,
    tag: WireTag,
    namespace: Option<Arc<MetaString>>,
    name: Option<Arc<MetaString>>,
    shared: Option<SharedHooks>,
    size_hint: SizeHint,
    serializers: Pool<Box<dyn Serializer>>,
    deserializers: Pool<Box<dyn Deserializer>>,
}

impl fmt::Debug for TypeRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistration")
            .field("type_name", &self.type_name)
            .field("tag", &self.tag)
            .field("namespace", &self.namespace.as_ref().map(|ms| &ms.original))
            .field("name", &self.name.as_ref().map(|ms| &ms.original))
            .field("shared", &self.shared.is_some())
            .finish()
    }
}

impl TypeRegistration {
    pub fn builder<T: 'static>() -> TypeRegistrationBuilder<T> {
        TypeRegistrationBuilder {
            id: None,
            name: None,
            kind: TypeKind::STRUCT,
            shared: None,
            size_hint: SizeHint::Variable,
            serializer: None,
            deserializer: None,
            _marker: PhantomData,
        }
    }

    /// A registration for a built-in kind, tagged with the bare kind.
    pub(crate) fn builtin<T, C>(kind: TypeKind, size_hint: SizeHint) -> TypeRegistration
    where
        T: 'static,
        C: Serializer + Deserializer + Default,
    {
        TypeRegistration::assemble::<T>(
            WireTag::of_kind(kind),
            None,
            None,
            None,
            size_hint,
            Box::new(|| Box::new(C::default())),
            Box::new(|| Box::new(C::default())),
        )
    }

    /// A built-in kind with separate codec types.
    pub(crate) fn builtin_with<T, S, D>(kind: TypeKind) -> TypeRegistration
    where
        T: 'static,
        S: Serializer + Default,
        D: Deserializer + Default,
    {
        TypeRegistration::assemble::<T>(
            WireTag::of_kind(kind),
            None,
            None,
            None,
            SizeHint::Variable,
            Box::new(|| Box::new(S::default())),
            Box::new(|| Box::new(D::default())),
        )
    }

    fn assemble<T: 'static>(
        tag: WireTag,
        namespace: Option<Arc<MetaString>>,
        name: Option<Arc<MetaString>>,
        shared: Option<SharedHooks>,
        size_hint: SizeHint,
        serializer: SerializerFactory,
        deserializer: DeserializerFactory,
    ) -> TypeRegistration {
        let type_name = std::any::type_name::<T>();
        TypeRegistration {
            rust_type: TypeId::of::<T>(),
            type_name,
            tag,
            namespace,
            name,
            shared,
            size_hint,
            serializers: Pool::new(type_name, serializer),
            deserializers: Pool::new(type_name, deserializer),
        }
    }

    #[inline(always)]
    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    #[inline(always)]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline(always)]
    pub fn tag(&self) -> WireTag {
        self.tag
    }

    pub fn namespace(&self) -> Option<&Arc<MetaString>> {
        self.namespace.as_ref()
    }

    pub fn name(&self) -> Option<&Arc<MetaString>> {
        self.name.as_ref()
    }

    #[inline(always)]
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    /// Whether values of this type carry identity and need ref tracking.
    #[inline(always)]
    pub fn needs_ref(&self) -> bool {
        self.shared.is_some()
    }

    /// Identity of `value` if this type is shared.
    #[inline(always)]
    pub fn identity(&self, value: &dyn Any) -> Option<usize> {
        self.shared.and_then(|hooks| (hooks.identity)(value))
    }

    #[inline(always)]
    pub fn share_fn(&self) -> Option<ShareFn> {
        self.shared.map(|hooks| hooks.share)
    }

    #[inline(always)]
    pub fn size_hint(&self) -> SizeHint {
        self.size_hint
    }

    pub fn rent_serializer(&self) -> Box<dyn Serializer> {
        self.serializers.rent()
    }

    pub fn restore_serializer(&self, mut codec: Box<dyn Serializer>) {
        codec.reset();
        self.serializers.restore(codec);
    }

    pub fn rent_deserializer(&self) -> Box<dyn Deserializer> {
        self.deserializers.rent()
    }

    pub fn restore_deserializer(&self, mut codec: Box<dyn Deserializer>) {
        codec.reset();
        self.deserializers.restore(codec);
    }

    /// Serializers ever created and currently idle.
    pub fn serializer_pool_stats(&self) -> (usize, usize) {
        (self.serializers.created(), self.serializers.idle())
    }

    /// Deserializers ever created and currently idle.
    pub fn deserializer_pool_stats(&self) -> (usize, usize) {
        (self.deserializers.created(), self.deserializers.idle())
    }
}

/// Describes a user type before it is registered.
///
/// ```rust
/// use std::any::Any;
/// use std::rc::Rc;
/// use std::task::Poll;
/// use fury_core::context::{DeserializationReader, SerializationWriter};
/// use fury_core::error::PollResult;
/// use fury_core::resolver::type_resolver::{SizeHint, TypeRegistration, TypeRegistry};
/// use fury_core::serializer::{downcast_value, Deserializer, Serializer, Value};
/// use fury_core::try_ready;
///
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// #[derive(Default)]
/// struct PointCodec;
///
/// impl Serializer for PointCodec {
///     fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
///         let p = downcast_value::<Rc<Point>>(value)?;
///         try_ready!(writer.write_i32(p.x));
///         writer.write_i32(p.y)
///     }
/// }
///
/// impl Deserializer for PointCodec {
///     fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
///         let x = try_ready!(reader.read_i32());
///         let y = try_ready!(reader.read_i32());
///         Ok(Poll::Ready(Box::new(Rc::new(Point { x, y }))))
///     }
/// }
///
/// let registry = TypeRegistry::default();
/// let registration = registry.register(
///     TypeRegistration::builder::<Rc<Point>>()
///         .id(7)
///         .codec::<PointCodec>()
///         .shared()
///         .size_hint(SizeHint::Fixed(8)),
/// )?;
/// assert_eq!(registration.tag().raw(), (7 << 8) | 15);
/// assert!(registration.needs_ref());
/// # Ok::<(), fury_core::error::Error>(())
/// ```
pub struct TypeRegistrationBuilder<T> {
    id: Option<u32>,
    name: Option<(String, String)>,
    kind: TypeKind,
    shared: Option<SharedHooks>,
    size_hint: SizeHint,
    serializer: Option<SerializerFactory>,
    deserializer: Option<DeserializerFactory>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> TypeRegistrationBuilder<T> {
    /// Addresses the type by a numeric id, tagged `(id << 8) | kind`.
    pub fn id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Addresses the type by namespace and name, written as meta strings.
    pub fn name(mut self, namespace: &str, name: &str) -> Self {
        self.name = Some((namespace.to_string(), name.to_string()));
        self
    }

    /// User kind of the type, `STRUCT` by default.
    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn size_hint(mut self, size_hint: SizeHint) -> Self {
        self.size_hint = size_hint;
        self
    }

    pub fn serializer<S, F>(mut self, factory: F) -> Self
    where
        S: Serializer,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.serializer = Some(Box::new(move || Box::new(factory())));
        self
    }

    pub fn deserializer<D, F>(mut self, factory: F) -> Self
    where
        D: Deserializer,
        F: Fn() -> D + Send + Sync + 'static,
    {
        self.deserializer = Some(Box::new(move || Box::new(factory())));
        self
    }

    /// Uses one `Default`-constructed type for both directions.
    pub fn codec<C>(self) -> Self
    where
        C: Serializer + Deserializer + Default,
    {
        self.serializer(C::default).deserializer(C::default)
    }
}

impl<T: SharedRef> TypeRegistrationBuilder<T> {
    /// Marks values as shared handles tracked by identity.
    pub fn shared(mut self) -> Self {
        self.shared = Some(SharedHooks {
            identity: identity_of::<T>,
            share: share_of::<T>,
        });
        self
    }
}

#[derive(Default)]
struct RegistryInner {
    by_type: HashMap<TypeId, Arc<TypeRegistration>>,
    by_tag: HashMap<WireTag, Arc<TypeRegistration>>,
    by_name: HashMap<(String, String), Arc<TypeRegistration>>,
    next_user_id: u32,
}

impl RegistryInner {
    /// Built-in kinds may be shared by several Rust types; the first one
    /// registered answers lookups by tag.
    fn insert_builtin(&mut self, registration: TypeRegistration) {
        let registration = Arc::new(registration);
        self.by_tag
            .entry(registration.tag)
            .or_insert_with(|| registration.clone());
        self.by_type.insert(registration.rust_type, registration);
    }

    fn insert<T: 'static>(
        &mut self,
        builder: TypeRegistrationBuilder<T>,
        meta_strings: &MetaStringTable,
    ) -> Result<Arc<TypeRegistration>, Error> {
        let type_name = std::any::type_name::<T>();
        if self.by_type.contains_key(&TypeId::of::<T>()) {
            return Err(Error::registration(format!("{type_name} is already registered")));
        }
        if !builder.kind.is_user_kind() {
            return Err(Error::registration(format!(
                "{:?} is not a user type kind",
                builder.kind
            )));
        }
        let (Some(serializer), Some(deserializer)) = (builder.serializer, builder.deserializer)
        else {
            return Err(Error::registration(format!(
                "{type_name} needs both a serializer and a deserializer"
            )));
        };
        let registration = match (builder.name, builder.id) {
            (Some(_), Some(_)) => {
                return Err(Error::registration(format!(
                    "{type_name} is registered by both id and name"
                )))
            }
            (Some((namespace, name)), None) => {
                if self.by_name.contains_key(&(namespace.clone(), name.clone())) {
                    return Err(Error::registration(format!(
                        "name {namespace}.{name} is already registered"
                    )));
                }
                let registration = Arc::new(TypeRegistration::assemble::<T>(
                    WireTag::of_kind(builder.kind.to_named()),
                    Some(meta_strings.encode(EncodingPolicy::Namespace, &namespace)?),
                    Some(meta_strings.encode(EncodingPolicy::Name, &name)?),
                    builder.shared,
                    builder.size_hint,
                    serializer,
                    deserializer,
                ));
                self.by_name.insert((namespace, name), registration.clone());
                registration
            }
            (None, id) => {
                let kind = builder.kind.to_unnamed();
                let id = match id {
                    Some(id) => {
                        if id == 0 || id > WireTag::MAX_USER_ID {
                            return Err(Error::registration(format!(
                                "type id {id} out of range 1..={}",
                                WireTag::MAX_USER_ID
                            )));
                        }
                        id
                    }
                    None => self.next_free_id(kind)?,
                };
                let tag = WireTag::of_user(id, kind);
                let registration = match self.by_tag.entry(tag) {
                    Entry::Occupied(existing) => {
                        return Err(Error::registration(format!(
                            "type id {id} of {type_name} conflicts with {}",
                            existing.get().type_name
                        )))
                    }
                    Entry::Vacant(slot) => slot
                        .insert(Arc::new(TypeRegistration::assemble::<T>(
                            tag,
                            None,
                            None,
                            builder.shared,
                            builder.size_hint,
                            serializer,
                            deserializer,
                        )))
                        .clone(),
                };
                self.next_user_id = self.next_user_id.max(id);
                registration
            }
        };
        self.by_type.insert(registration.rust_type, registration.clone());
        debug!(type_name, tag = ?registration.tag, "registered type");
        Ok(registration)
    }

    fn next_free_id(&self, kind: TypeKind) -> Result<u32, Error> {
        let mut id = self.next_user_id + 1;
        while self.by_tag.contains_key(&WireTag::of_user(id, kind)) {
            id += 1;
        }
        if id > WireTag::MAX_USER_ID {
            return Err(Error::registration("no type ids left"));
        }
        Ok(id)
    }
}

/// Process-wide map between Rust types and wire tags.
///
/// Lookups take a shared lock and proceed in parallel. Registration takes
/// the write lock, waiting at most the configured timeout so a stuck writer
/// cannot wedge every session; the wait fails with [`Error::Timeout`].
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
    meta_strings: MetaStringTable,
    lock_timeout_nanos: AtomicU64,
}

impl TypeRegistry {
    pub fn new(lock_timeout: Duration) -> Self {
        let mut inner = RegistryInner::default();
        for registration in serializer::builtin_registrations() {
            inner.insert_builtin(registration);
        }
        TypeRegistry {
            inner: RwLock::new(inner),
            meta_strings: MetaStringTable::new(),
            lock_timeout_nanos: AtomicU64::new(lock_timeout.as_nanos() as u64),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_nanos(self.lock_timeout_nanos.load(Ordering::Relaxed))
    }

    pub fn set_lock_timeout(&self, timeout: Duration) {
        self.lock_timeout_nanos
            .store(timeout.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn meta_strings(&self) -> &MetaStringTable {
        &self.meta_strings
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryInner>, Error> {
        let timeout = self.lock_timeout();
        self.inner.try_read_for(timeout).ok_or_else(|| {
            warn!(?timeout, "type registry read lock timed out");
            Error::timeout(timeout)
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryInner>, Error> {
        let timeout = self.lock_timeout();
        self.inner.try_write_for(timeout).ok_or_else(|| {
            warn!(?timeout, "type registry write lock timed out");
            Error::timeout(timeout)
        })
    }

    pub fn register<T: 'static>(
        &self,
        builder: TypeRegistrationBuilder<T>,
    ) -> Result<Arc<TypeRegistration>, Error> {
        let mut inner = self.write()?;
        inner.insert(builder, &self.meta_strings)
    }

    /// Registers several types under one acquisition of the write lock.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut RegistryTransaction<'_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut inner = self.write()?;
        let mut tx = RegistryTransaction {
            inner: &mut inner,
            meta_strings: &self.meta_strings,
        };
        f(&mut tx)
    }

    /// Returns the registration of `T`, creating it with `make` if absent.
    /// Concurrent callers only serialize when `T` is actually new.
    pub fn get_or_register<T: 'static>(
        &self,
        make: impl FnOnce() -> TypeRegistration,
    ) -> Result<Arc<TypeRegistration>, Error> {
        let timeout = self.lock_timeout();
        let guard = self.inner.try_upgradable_read_for(timeout).ok_or_else(|| {
            warn!(?timeout, "type registry upgradable lock timed out");
            Error::timeout(timeout)
        })?;
        if let Some(registration) = guard.by_type.get(&TypeId::of::<T>()) {
            return Ok(registration.clone());
        }
        let mut inner = RwLockUpgradableReadGuard::try_upgrade_for(guard, timeout).map_err(|_| {
            warn!(?timeout, "type registry lock upgrade timed out");
            Error::timeout(timeout)
        })?;
        let registration = make();
        debug_assert_eq!(registration.rust_type, TypeId::of::<T>());
        debug!(type_name = registration.type_name, tag = ?registration.tag, "registered type");
        inner.insert_builtin(registration);
        inner
            .by_type
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| Error::invalid_state("registration vanished under write lock"))
    }

    /// Makes `Vec<T>` serializable as a `LIST` of full `T` values.
    pub fn register_list<T: 'static>(&self) -> Result<Arc<TypeRegistration>, Error> {
        self.get_or_register::<Vec<T>>(serializer::list_registration::<T>)
    }

    pub fn resolve_type(&self, type_id: TypeId) -> Result<Arc<TypeRegistration>, Error> {
        self.read()?.by_type.get(&type_id).cloned().ok_or_else(|| {
            Error::type_error(format!(
                "{type_id:?} is not registered, register it before serializing"
            ))
        })
    }

    pub fn resolve_tag(&self, tag: WireTag) -> Result<Arc<TypeRegistration>, Error> {
        self.read()?
            .by_tag
            .get(&tag)
            .cloned()
            .ok_or_else(|| Error::bad_input(format!("unknown type tag {tag:?}")))
    }

    pub fn resolve_name(&self, namespace: &str, name: &str) -> Result<Arc<TypeRegistration>, Error> {
        self.read()?
            .by_name
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::bad_input(format!("unknown type name {namespace}.{name}")))
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.read()?.by_type.len())
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new(Duration::from_secs(1))
    }
}

/// Write access to the registry for the duration of
/// [`TypeRegistry::transaction`].
pub struct RegistryTransaction<'a> {
    inner: &'a mut RegistryInner,
    meta_strings: &'a MetaStringTable,
}

impl RegistryTransaction<'_> {
    pub fn register<T: 'static>(
        &mut self,
        builder: TypeRegistrationBuilder<T>,
    ) -> Result<Arc<TypeRegistration>, Error> {
        self.inner.insert(builder, self.meta_strings)
    }
}
