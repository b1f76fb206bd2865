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
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::task::Poll;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::buffer::BufferWriter;
use crate::config::{Config, RefTracking};
use crate::context::frame::{FrameStack, FrameState};
use crate::context::header::write_header;
use crate::error::{Error, PollResult};
use crate::resolver::meta_string_resolver::MetaStringWriter;
use crate::resolver::ref_resolver::{RefId, RefState, RefWriter};
use crate::resolver::type_resolver::{SizeHint, TypeRegistration, TypeRegistry};
use crate::serializer::Serializer;
use crate::try_ready;
use crate::types::RefFlag;
use crate::util::Cancellation;
use crate::varint::varuint32_len;

#[derive(Default)]
struct WriteFrame {
    state: FrameState,
    registration: Option<Arc<TypeRegistration>>,
    identity: Option<usize>,
    codec: Option<Box<dyn Serializer>>,
}

impl Drop for WriteFrame {
    fn drop(&mut self) {
        if let (Some(registration), Some(codec)) = (&self.registration, self.codec.take()) {
            registration.restore_serializer(codec);
        }
    }
}

/// One encode session.
///
/// Writes go to an internal buffer. With a `write_buffer_limit`, a write that
/// would overflow it suspends with `Poll::Pending`; the caller drains the
/// buffer with [`flush`](SerializationWriter::flush) and calls the same
/// top-level write again with the same value. Codecs registered with the
/// registry drive nested values through [`write_value`] and friends.
///
/// [`write_value`]: SerializationWriter::write_value
pub struct SerializationWriter {
    config: Config,
    registry: Arc<TypeRegistry>,
    buffer: BufferWriter,
    frames: FrameStack<WriteFrame>,
    refs: RefWriter,
    meta_strings: MetaStringWriter,
    header_written: bool,
    type_cache: HashMap<TypeId, Arc<TypeRegistration>>,
    cancellation: Option<Cancellation>,
    aborted: bool,
}

impl SerializationWriter {
    pub fn new(config: Config, registry: Arc<TypeRegistry>) -> Self {
        SerializationWriter {
            buffer: BufferWriter::new(config.write_buffer_limit()),
            refs: RefWriter::new(config.ref_tracking()),
            config,
            registry,
            frames: FrameStack::new(),
            meta_strings: MetaStringWriter::new(),
            header_written: false,
            type_cache: HashMap::new(),
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

    /// Whether no message is in progress.
    pub fn is_idle(&self) -> bool {
        self.frames.is_empty() && !self.header_written
    }

    /// Bytes written and not yet flushed.
    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Hands over everything buffered so far.
    pub fn flush(&mut self) -> Bytes {
        self.buffer.flush()
    }

    /// Returns rented codecs and clears every table, making an aborted
    /// session usable again.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.refs.clear();
        self.meta_strings.reset();
        self.buffer.reset();
        self.header_written = false;
        self.aborted = false;
    }

    /// Writes one message rooted at `value`.
    pub fn write<T: 'static>(&mut self, value: &T) -> PollResult<()> {
        self.write_root(Some(value))
            .map_err(Error::enhance_type_error::<T>)
    }

    pub fn write_option<T: 'static>(&mut self, value: Option<&T>) -> PollResult<()> {
        self.write_root(value.map(|v| v as &dyn Any))
            .map_err(Error::enhance_type_error::<T>)
    }

    /// Writes one message rooted at a value whose type is only known at run
    /// time.
    pub fn write_any(&mut self, value: &dyn Any) -> PollResult<()> {
        self.write_root(Some(value))
    }

    fn write_root(&mut self, value: Option<&dyn Any>) -> PollResult<()> {
        self.check_usable()?;
        match self.write_message(value) {
            Ok(Poll::Ready(())) => {
                self.finish_message();
                Ok(Poll::Ready(()))
            }
            Ok(Poll::Pending) => Ok(Poll::Pending),
            Err(err) => Err(self.abort(err)),
        }
    }

    fn write_message(&mut self, value: Option<&dyn Any>) -> PollResult<()> {
        if !self.header_written {
            if write_header(&mut self.buffer, &self.config, value.is_none()).is_pending() {
                return Ok(Poll::Pending);
            }
            self.header_written = true;
        }
        match value {
            Some(value) => self.write_frame(value),
            None => Ok(Poll::Ready(())),
        }
    }

    fn check_usable(&mut self) -> Result<(), Error> {
        if self.aborted {
            return Err(Error::invalid_state(
                "serialization session aborted by an earlier error, reset it first",
            ));
        }
        if self.cancellation.as_ref().is_some_and(Cancellation::is_cancelled) {
            return Err(self.abort(Error::cancelled()));
        }
        Ok(())
    }

    fn finish_message(&mut self) {
        debug_assert!(self.frames.is_empty());
        self.refs.clear();
        self.meta_strings.reset();
        self.header_written = false;
    }

    fn abort(&mut self, err: Error) -> Error {
        debug!(error = %err, depth = self.frames.len(), "serialization aborted");
        self.frames.clear();
        self.refs.clear();
        self.meta_strings.reset();
        self.header_written = false;
        self.aborted = true;
        err
    }

    /// Writes a nested value with its ref and type header.
    pub fn write_value<T: 'static>(&mut self, value: &T) -> PollResult<()> {
        self.write_frame(value)
            .map_err(Error::enhance_type_error::<T>)
    }

    /// Writes a nested value or a null flag.
    pub fn write_value_option<T: 'static>(&mut self, value: Option<&T>) -> PollResult<()> {
        match value {
            Some(value) => self.write_value(value),
            None => Ok(self.buffer.write_i8(RefFlag::Null.into())),
        }
    }

    pub fn write_value_any(&mut self, value: &dyn Any) -> PollResult<()> {
        self.write_frame(value)
    }

    fn registration_of(&mut self, type_id: TypeId) -> Result<Arc<TypeRegistration>, Error> {
        if let Some(registration) = self.type_cache.get(&type_id) {
            return Ok(registration.clone());
        }
        let registration = self.registry.resolve_type(type_id)?;
        self.type_cache.insert(type_id, registration.clone());
        Ok(registration)
    }

    fn write_frame(&mut self, value: &dyn Any) -> PollResult<()> {
        let depth = self.frames.depth();
        if depth >= self.config.max_depth() as usize {
            return Err(Error::encode_error(format!(
                "value nesting exceeds max depth {}",
                self.config.max_depth()
            )));
        }
        let mut frame = self.frames.enter();
        match self.step(&mut frame, value) {
            Ok(Poll::Ready(())) => {
                frame.state = FrameState::Done;
                if let Some(identity) = frame.identity {
                    self.refs.complete(identity);
                }
                self.frames.complete();
                Ok(Poll::Ready(()))
            }
            Ok(Poll::Pending) => {
                trace!(depth, state = ?frame.state, "write suspended");
                self.frames.park(frame);
                Ok(Poll::Pending)
            }
            Err(err) => {
                if let Some(identity) = frame.identity {
                    if self.refs.policy() != RefTracking::Enabled {
                        self.refs.pop(identity);
                    }
                }
                self.frames.discard();
                Err(err)
            }
        }
    }

    fn step(&mut self, frame: &mut WriteFrame, value: &dyn Any) -> PollResult<()> {
        if frame.state == FrameState::AwaitingRefMeta {
            let registration = self.registration_of((*value).type_id())?;
            let identity = registration.identity(value);
            frame.registration = Some(registration);
            match identity {
                Some(identity) => {
                    if try_ready!(self.write_ref_meta(frame, identity)) {
                        frame.state = FrameState::Done;
                        return Ok(Poll::Ready(()));
                    }
                }
                None => try_ready!(self.write_flag(RefFlag::NotNullValue)),
            }
            frame.state = FrameState::AwaitingTypeMeta;
        }
        let Some(registration) = frame.registration.clone() else {
            return Err(Error::invalid_state("write frame resumed without a registration"));
        };
        if frame.state == FrameState::AwaitingTypeMeta {
            try_ready!(self.write_type_meta(&registration));
            frame.codec = Some(registration.rent_serializer());
            frame.state = FrameState::AwaitingPayload;
        }
        if let SizeHint::Fixed(n) = registration.size_hint() {
            try_ready!(self.claim(n));
        }
        let Some(codec) = frame.codec.as_mut() else {
            return Err(Error::invalid_state("write frame lost its serializer"));
        };
        codec.write_data(self, value)
    }

    /// Writes the ref flag of a shared object. Returns `true` when the object
    /// was written as a back-reference and no payload follows.
    fn write_ref_meta(&mut self, frame: &mut WriteFrame, identity: usize) -> PollResult<bool> {
        let seen = self.refs.lookup(identity);
        match (self.refs.policy(), seen) {
            (RefTracking::Disabled, Some(_)) => {
                let type_name = frame
                    .registration
                    .as_ref()
                    .map_or("<unknown>", |r| r.type_name());
                Err(Error::circular_dependency(format!(
                    "{type_name} at {identity:#x} references itself, enable reference tracking"
                )))
            }
            (RefTracking::Disabled, None) => {
                try_ready!(self.write_flag(RefFlag::NotNullValue));
                self.refs.get_or_assign(identity);
                frame.identity = Some(identity);
                Ok(Poll::Ready(false))
            }
            (RefTracking::Enabled, Some((id, _)))
            | (RefTracking::OnlyCircularDependency, Some((id, RefState::PartiallyProcessed))) => {
                try_ready!(self.write_back_ref(id));
                Ok(Poll::Ready(true))
            }
            (RefTracking::Enabled | RefTracking::OnlyCircularDependency, _) => {
                try_ready!(self.write_flag(RefFlag::RefValue));
                self.refs.get_or_assign(identity);
                frame.identity = Some(identity);
                Ok(Poll::Ready(false))
            }
        }
    }

    fn write_back_ref(&mut self, id: RefId) -> PollResult<()> {
        try_ready!(self.claim(1 + varuint32_len(id)));
        try_ready!(self.write_flag(RefFlag::Ref));
        self.write_varuint32(id)
    }

    #[inline(always)]
    fn write_flag(&mut self, flag: RefFlag) -> PollResult<()> {
        Ok(self.buffer.write_i8(flag.into()))
    }

    fn write_type_meta(&mut self, registration: &TypeRegistration) -> PollResult<()> {
        let tag = registration.tag().raw();
        let (Some(namespace), Some(name)) = (registration.namespace(), registration.name()) else {
            return self.write_varuint32(tag);
        };
        let len = varuint32_len(tag)
            + self.meta_strings.encoded_len(namespace)
            + self.meta_strings.encoded_len(name);
        try_ready!(self.claim(len));
        try_ready!(self.write_varuint32(tag));
        if self.meta_strings.write(&mut self.buffer, namespace).is_pending()
            || self.meta_strings.write(&mut self.buffer, name).is_pending()
        {
            return Err(Error::invalid_state("claimed type header did not fit"));
        }
        Ok(Poll::Ready(()))
    }

    /// Blocking driver: writes `value` into `sink`, draining the buffer
    /// whenever the write limit suspends encoding.
    pub fn write_to<T: 'static, W: Write>(&mut self, value: &T, mut sink: W) -> Result<(), Error> {
        loop {
            let status = self.write(value)?;
            let bytes = self.flush();
            if !bytes.is_empty() {
                if let Err(err) = sink.write_all(&bytes) {
                    return Err(self.abort(err.into()));
                }
            }
            if status.is_ready() {
                return sink.flush().map_err(Error::from);
            }
        }
    }

    /// Async driver, see [`write_to`](SerializationWriter::write_to).
    pub async fn write_to_async<T: 'static, W: AsyncWrite + Unpin>(
        &mut self,
        value: &T,
        sink: &mut W,
    ) -> Result<(), Error> {
        loop {
            let status = self.write(value)?;
            let bytes = self.flush();
            if !bytes.is_empty() {
                if let Err(err) = sink.write_all(&bytes).await {
                    return Err(self.abort(err.into()));
                }
            }
            if status.is_ready() {
                return sink.flush().await.map_err(Error::from);
            }
        }
    }
}

macro_rules! forward_writes {
    ($($name:ident($ty:ty)),* $(,)?) => {
        impl SerializationWriter {
            $(
                #[inline(always)]
                pub fn $name(&mut self, value: $ty) -> PollResult<()> {
                    Ok(self.buffer.$name(value))
                }
            )*
        }
    };
}

forward_writes!(
    write_bool(bool),
    write_u8(u8),
    write_i8(i8),
    write_i16(i16),
    write_i32(i32),
    write_i64(i64),
    write_f32(f32),
    write_f64(f64),
    write_varint32(i32),
    write_varuint32(u32),
    write_varint64(i64),
    write_varuint64(u64),
    write_bytes(&[u8]),
);

impl SerializationWriter {
    /// Reserves room for the next `n` bytes so a multi-field payload is
    /// written whole or not at all.
    #[inline(always)]
    pub fn claim(&mut self, n: usize) -> PollResult<()> {
        Ok(self.buffer.claim(n))
    }
}
