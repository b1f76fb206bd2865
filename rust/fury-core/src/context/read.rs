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

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::task::Poll;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::bail;
use crate::buffer::ByteCursor;
use crate::config::{Config, RefTracking};
use crate::context::frame::{FrameStack, FrameState};
use crate::context::header::HeaderReader;
use crate::error::{Error, PollResult};
use crate::meta::{EncodingPolicy, MetaString};
use crate::resolver::meta_string_resolver::MetaStringReader;
use crate::resolver::ref_resolver::{RefId, RefReader};
use crate::resolver::type_resolver::{SizeHint, TypeRegistration, TypeRegistry};
use crate::serializer::{cast_value, Deserializer, Value};
use crate::try_ready;
use crate::types::{Language, RefFlag, WireTag};
use crate::util::Cancellation;

/// Rust type the caller asked for.
#[derive(Clone, Copy)]
struct Expected {
    type_id: TypeId,
    type_name: &'static str,
}

impl Expected {
    fn of<T: 'static>() -> Self {
        Expected {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

#[derive(Default)]
struct ReadFrame {
    state: FrameState,
    flag: Option<RefFlag>,
    ref_id: Option<RefId>,
    tag: Option<WireTag>,
    namespace: Option<Arc<MetaString>>,
    registration: Option<Arc<TypeRegistration>>,
    codec: Option<Box<dyn Deserializer>>,
    instance: Option<Value>,
}

impl Drop for ReadFrame {
    fn drop(&mut self) {
        if let (Some(registration), Some(codec)) = (&self.registration, self.codec.take()) {
            registration.restore_deserializer(codec);
        }
    }
}

/// One decode session over a chunked input.
///
/// Input arrives through [`feed`](DeserializationReader::feed). A read that
/// runs out of bytes returns `Poll::Pending` with every partially decoded
/// value parked on the frame stack; feed more input and call the same read
/// again. [`finish`](DeserializationReader::finish) marks the end of input,
/// after which missing bytes are `BadInput`.
///
/// ```rust
/// use std::sync::Arc;
/// use std::task::Poll;
///
/// use fury_core::config::Config;
/// use fury_core::context::DeserializationReader;
/// use fury_core::resolver::type_resolver::TypeRegistry;
///
/// let mut reader = DeserializationReader::new(Config::default(), Arc::new(TypeRegistry::default()));
/// // header, NotNullValue, STRING tag, then `(3 << 2) | utf8`
/// reader.feed(vec![0x02, 0xff, 0x0c, 0x0e, b'a']);
/// assert!(reader.read::<String>().unwrap().is_pending());
/// reader.feed(&b"bc"[..]);
/// assert_eq!(reader.read::<String>().unwrap(), Poll::Ready("abc".to_string()));
/// ```
pub struct DeserializationReader {
    config: Config,
    registry: Arc<TypeRegistry>,
    cursor: ByteCursor,
    frames: FrameStack<ReadFrame>,
    refs: RefReader,
    meta_strings: MetaStringReader,
    header: HeaderReader,
    peer_language: Option<Language>,
    type_cache: HashMap<TypeId, Arc<TypeRegistration>>,
    tag_cache: HashMap<WireTag, Arc<TypeRegistration>>,
    cancellation: Option<Cancellation>,
    aborted: bool,
}

impl DeserializationReader {
    pub fn new(config: Config, registry: Arc<TypeRegistry>) -> Self {
        DeserializationReader {
            config,
            registry,
            cursor: ByteCursor::new(),
            frames: FrameStack::new(),
            refs: RefReader::new(),
            meta_strings: MetaStringReader::new(),
            header: HeaderReader::default(),
            peer_language: None,
            type_cache: HashMap::new(),
            tag_cache: HashMap::new(),
            cancellation: None,
            aborted: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn set_cancellation(&mut self, cancellation: Cancellation) {
        self.cancellation = Some(cancellation);
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.set_cancellation(cancellation);
        self
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Whether no message is partially decoded.
    pub fn is_idle(&self) -> bool {
        self.frames.is_empty() && self.header.is_pristine()
    }

    /// Language byte of the last cross-language message read.
    pub fn peer_language(&self) -> Option<Language> {
        self.peer_language
    }

    pub fn cursor(&self) -> &ByteCursor {
        &self.cursor
    }

    /// Queues more input.
    pub fn feed(&mut self, chunk: impl Into<Bytes>) {
        self.cursor.feed(chunk.into());
    }

    /// Marks the input complete.
    pub fn finish(&mut self) {
        self.cursor.finish();
    }

    /// Returns rented codecs, clears every table and drops buffered input.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.refs.clear();
        self.meta_strings.reset();
        self.header.reset();
        self.cursor.reset();
        self.aborted = false;
    }

    /// Reads one message whose root must be a non-null `T`.
    pub fn read<T: 'static>(&mut self) -> PollResult<T> {
        match try_ready!(self.read_option::<T>()) {
            Some(value) => Ok(Poll::Ready(value)),
            None => Err(Error::type_error(format!(
                "message root is null, expected {}",
                type_name::<T>()
            ))),
        }
    }

    pub fn read_option<T: 'static>(&mut self) -> PollResult<Option<T>> {
        let value = try_ready!(self
            .read_root(Some(Expected::of::<T>()))
            .map_err(Error::enhance_type_error::<T>));
        Ok(Poll::Ready(value.map(cast_value::<T>).transpose()?))
    }

    /// Reads one message of any registered type. Built-in kinds decode to
    /// their default Rust type, lists to `Vec<Value>`.
    pub fn read_any(&mut self) -> PollResult<Option<Value>> {
        self.read_root(None)
    }

    fn read_root(&mut self, expected: Option<Expected>) -> PollResult<Option<Value>> {
        self.check_usable()?;
        match self.read_message(expected) {
            Ok(Poll::Ready(value)) => {
                self.finish_message();
                Ok(Poll::Ready(value))
            }
            Ok(Poll::Pending) => Ok(Poll::Pending),
            Err(err) => Err(self.abort(err)),
        }
    }

    fn read_message(&mut self, expected: Option<Expected>) -> PollResult<Option<Value>> {
        if try_ready!(self.header.read(&mut self.cursor, &self.config)) {
            return Ok(Poll::Ready(None));
        }
        self.read_frame(expected)
    }

    fn check_usable(&mut self) -> Result<(), Error> {
        if self.aborted {
            return Err(Error::invalid_state(
                "deserialization session aborted by an earlier error, reset it first",
            ));
        }
        if self.cancellation.as_ref().is_some_and(Cancellation::is_cancelled) {
            return Err(self.abort(Error::cancelled()));
        }
        Ok(())
    }

    fn finish_message(&mut self) {
        debug_assert!(self.frames.is_empty());
        self.peer_language = self.header.language();
        self.refs.clear();
        self.meta_strings.reset();
        self.header.reset();
    }

    fn abort(&mut self, err: Error) -> Error {
        debug!(
            error = %err,
            depth = self.frames.len(),
            position = self.cursor.position(),
            "deserialization aborted"
        );
        self.frames.clear();
        self.refs.clear();
        self.meta_strings.reset();
        self.header.reset();
        self.aborted = true;
        err
    }

    /// Reads a nested non-null value with its ref and type header.
    pub fn read_value<T: 'static>(&mut self) -> PollResult<T> {
        match try_ready!(self.read_value_option::<T>()) {
            Some(value) => Ok(Poll::Ready(value)),
            None => Err(Error::bad_input(format!(
                "null where {} was expected",
                type_name::<T>()
            ))),
        }
    }

    pub fn read_value_option<T: 'static>(&mut self) -> PollResult<Option<T>> {
        let value = try_ready!(self
            .read_frame(Some(Expected::of::<T>()))
            .map_err(Error::enhance_type_error::<T>));
        Ok(Poll::Ready(value.map(cast_value::<T>).transpose()?))
    }

    pub fn read_value_any(&mut self) -> PollResult<Option<Value>> {
        self.read_frame(None)
    }

    fn read_frame(&mut self, expected: Option<Expected>) -> PollResult<Option<Value>> {
        let depth = self.frames.depth();
        if depth >= self.config.max_depth() as usize {
            bail!("value nesting exceeds max depth {}", self.config.max_depth());
        }
        let mut frame = self.frames.enter();
        match self.step(&mut frame, expected) {
            Ok(Poll::Ready(value)) => {
                if let (RefTracking::OnlyCircularDependency, Some(id)) =
                    (self.config.ref_tracking(), frame.ref_id)
                {
                    self.refs.pop(id);
                }
                self.frames.complete();
                Ok(Poll::Ready(value))
            }
            Ok(Poll::Pending) => {
                trace!(depth, state = ?frame.state, "read suspended");
                self.frames.park(frame);
                Ok(Poll::Pending)
            }
            Err(err) => {
                if let (RefTracking::OnlyCircularDependency, Some(id)) =
                    (self.config.ref_tracking(), frame.ref_id)
                {
                    self.refs.pop(id);
                }
                self.frames.discard();
                Err(err)
            }
        }
    }

    fn step(&mut self, frame: &mut ReadFrame, expected: Option<Expected>) -> PollResult<Option<Value>> {
        if frame.state == FrameState::AwaitingRefMeta {
            let flag = match frame.flag {
                Some(flag) => flag,
                None => {
                    let flag = RefFlag::from_byte(try_ready!(self.cursor.read_u8()))?;
                    *frame.flag.insert(flag)
                }
            };
            match flag {
                RefFlag::Null => {
                    frame.state = FrameState::Done;
                    return Ok(Poll::Ready(None));
                }
                RefFlag::Ref => {
                    self.ensure_tracking(flag)?;
                    let id = try_ready!(self.cursor.read_varuint32());
                    frame.state = FrameState::Done;
                    return Ok(Poll::Ready(Some(self.refs.resolve(id)?)));
                }
                RefFlag::RefValue => {
                    self.ensure_tracking(flag)?;
                    frame.ref_id = Some(self.refs.allocate());
                }
                RefFlag::NotNullValue => {}
            }
            frame.state = FrameState::AwaitingTypeMeta;
        }
        if frame.state == FrameState::AwaitingTypeMeta {
            let registration = try_ready!(self.read_type_meta(frame, expected));
            frame.codec = Some(registration.rent_deserializer());
            frame.registration = Some(registration);
            frame.state = FrameState::AwaitingPayload;
        }
        let Some(registration) = frame.registration.clone() else {
            return Err(Error::invalid_state("read frame resumed without a registration"));
        };
        if frame.instance.is_none() {
            if let SizeHint::Fixed(n) = registration.size_hint() {
                try_ready!(self.cursor.need(n));
            }
            let Some(codec) = frame.codec.as_mut() else {
                return Err(Error::invalid_state("read frame lost its deserializer"));
            };
            let instance = try_ready!(codec.create_instance(self));
            if let Some(id) = frame.ref_id {
                self.bind_ref(id, &registration, &instance)?;
            }
            frame.instance = Some(instance);
        }
        let (Some(codec), Some(instance)) = (frame.codec.as_mut(), frame.instance.as_mut()) else {
            return Err(Error::invalid_state("read frame lost its instance"));
        };
        try_ready!(codec.fill_instance(self, instance));
        frame.state = FrameState::Done;
        Ok(Poll::Ready(frame.instance.take()))
    }

    fn ensure_tracking(&self, flag: RefFlag) -> Result<(), Error> {
        if self.config.is_tracking_ref() {
            return Ok(());
        }
        Err(Error::bad_input(format!(
            "{flag:?} flag in a stream read without reference tracking"
        )))
    }

    /// Makes a freshly created shared object resolvable before its fields
    /// are filled.
    fn bind_ref(
        &mut self,
        id: RefId,
        registration: &TypeRegistration,
        instance: &Value,
    ) -> Result<(), Error> {
        let Some(share) = registration.share_fn() else {
            trace!(id, type_name = registration.type_name(), "ref value of an unshared type");
            return Ok(());
        };
        let handle = share(instance.as_ref()).ok_or_else(|| {
            Error::type_error(format!(
                "deserializer for {} created another type",
                registration.type_name()
            ))
        })?;
        self.refs.bind(id, handle, share)
    }

    fn read_type_meta(
        &mut self,
        frame: &mut ReadFrame,
        expected: Option<Expected>,
    ) -> PollResult<Arc<TypeRegistration>> {
        let tag = match frame.tag {
            Some(tag) => tag,
            None => {
                let tag = WireTag::new(try_ready!(self.cursor.read_varuint32()));
                *frame.tag.insert(tag)
            }
        };
        let registration = if tag.kind()?.is_named() {
            try_ready!(self.read_named_type(frame))
        } else {
            match expected {
                Some(expected) => {
                    let registration = self.registration_of(expected)?;
                    if registration.tag() != tag {
                        return Err(Error::type_error(format!(
                            "wire carries {tag:?} but {} is registered as {:?}",
                            expected.type_name,
                            registration.tag()
                        )));
                    }
                    registration
                }
                None => self.registration_by_tag(tag)?,
            }
        };
        if let Some(expected) = expected {
            if registration.rust_type() != expected.type_id {
                return Err(Error::type_error(format!(
                    "wire carries {} where {} was expected",
                    registration.type_name(),
                    expected.type_name
                )));
            }
        }
        Ok(Poll::Ready(registration))
    }

    fn read_named_type(&mut self, frame: &mut ReadFrame) -> PollResult<Arc<TypeRegistration>> {
        let namespace = match frame.namespace.clone() {
            Some(namespace) => namespace,
            None => {
                let namespace = try_ready!(self.meta_strings.read(
                    &mut self.cursor,
                    self.registry.meta_strings(),
                    EncodingPolicy::Namespace,
                ));
                frame.namespace.insert(namespace).clone()
            }
        };
        let name = try_ready!(self.meta_strings.read(
            &mut self.cursor,
            self.registry.meta_strings(),
            EncodingPolicy::Name,
        ));
        frame.namespace = None;
        let registration = self
            .registry
            .resolve_name(&namespace.original, &name.original)?;
        Ok(Poll::Ready(registration))
    }

    fn registration_of(&mut self, expected: Expected) -> Result<Arc<TypeRegistration>, Error> {
        if let Some(registration) = self.type_cache.get(&expected.type_id) {
            return Ok(registration.clone());
        }
        let registration = self.registry.resolve_type(expected.type_id)?;
        self.type_cache.insert(expected.type_id, registration.clone());
        Ok(registration)
    }

    fn registration_by_tag(&mut self, tag: WireTag) -> Result<Arc<TypeRegistration>, Error> {
        if let Some(registration) = self.tag_cache.get(&tag) {
            return Ok(registration.clone());
        }
        let registration = self.registry.resolve_tag(tag)?;
        self.tag_cache.insert(tag, registration.clone());
        Ok(registration)
    }

    /// Blocking driver: pulls chunks of `read_chunk_size` from `source`
    /// until one message is decoded.
    pub fn read_from<T: 'static, R: Read>(&mut self, mut source: R) -> Result<T, Error> {
        let mut chunk = vec![0u8; self.config.read_chunk_size()];
        loop {
            if let Poll::Ready(value) = self.read::<T>()? {
                return Ok(value);
            }
            if self.cursor.is_finished() {
                return Err(self.abort(Error::bad_input("decoder suspended after end of input")));
            }
            match source.read(&mut chunk) {
                Ok(0) => self.cursor.finish(),
                Ok(n) => self.cursor.feed(Bytes::copy_from_slice(&chunk[..n])),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(self.abort(err.into())),
            }
        }
    }

    /// Async driver, see [`read_from`](DeserializationReader::read_from).
    ///
    /// Dropping the returned future before it completes resets the session,
    /// so a half-read message never leaks into the next call.
    pub async fn read_from_async<T: 'static, R: AsyncRead + Unpin>(
        &mut self,
        source: &mut R,
    ) -> Result<T, Error> {
        let mut guard = SessionGuard {
            session: self,
            armed: true,
        };
        let result = guard.session.pump_async::<T, R>(source).await;
        guard.armed = false;
        result
    }

    async fn pump_async<T: 'static, R: AsyncRead + Unpin>(
        &mut self,
        source: &mut R,
    ) -> Result<T, Error> {
        let mut chunk = vec![0u8; self.config.read_chunk_size()];
        loop {
            if let Poll::Ready(value) = self.read::<T>()? {
                return Ok(value);
            }
            if self.cursor.is_finished() {
                return Err(self.abort(Error::bad_input("decoder suspended after end of input")));
            }
            match source.read(&mut chunk).await {
                Ok(0) => self.cursor.finish(),
                Ok(n) => self.cursor.feed(Bytes::copy_from_slice(&chunk[..n])),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(self.abort(err.into())),
            }
        }
    }
}

struct SessionGuard<'a> {
    session: &'a mut DeserializationReader,
    armed: bool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("async read dropped mid-message, resetting session");
            self.session.reset();
        }
    }
}

macro_rules! forward_reads {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        impl DeserializationReader {
            $(
                #[inline(always)]
                pub fn $name(&mut self) -> PollResult<$ty> {
                    self.cursor.$name()
                }
            )*
        }
    };
}

forward_reads!(
    read_bool -> bool,
    read_u8 -> u8,
    read_i8 -> i8,
    read_i16 -> i16,
    read_i32 -> i32,
    read_i64 -> i64,
    read_f32 -> f32,
    read_f64 -> f64,
    read_varint32 -> i32,
    read_varuint32 -> u32,
    read_varint64 -> i64,
    read_varuint64 -> u64,
);

impl DeserializationReader {
    /// Takes `n` raw bytes, all at once or not at all.
    #[inline(always)]
    pub fn read_bytes(&mut self, n: usize) -> PollResult<Bytes> {
        self.cursor.read_bytes(n)
    }
}
