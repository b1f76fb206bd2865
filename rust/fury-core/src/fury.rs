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

use std::io::{Read, Write};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{Config, RefTracking};
use crate::context::{DeserializationReader, SerializationWriter};
use crate::error::Error;
use crate::resolver::type_resolver::{TypeRegistration, TypeRegistrationBuilder, TypeRegistry};
use crate::serializer::Value;

/// Entry point: configuration plus the type registry shared by every
/// session created from it.
///
/// `Fury` is cheap to clone and can be shared across threads. Each
/// serialize or deserialize call runs on its own session, so concurrent
/// calls only meet at the registry.
///
/// # Examples
///
/// ```rust
/// use fury_core::config::RefTracking;
/// use fury_core::fury::Fury;
///
/// let fury = Fury::default().ref_tracking(RefTracking::Enabled);
/// let bytes = fury.serialize(&vec![1i32, 2, 3]).unwrap();
/// let back: Vec<i32> = fury.deserialize(&bytes).unwrap();
/// assert_eq!(back, vec![1, 2, 3]);
/// ```
#[derive(Clone)]
pub struct Fury {
    config: Config,
    registry: Arc<TypeRegistry>,
}

impl Default for Fury {
    fn default() -> Self {
        Fury::new(Config::default())
    }
}

impl Fury {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(TypeRegistry::new(config.registry_lock_timeout()));
        Fury { config, registry }
    }

    /// Sets the reference tracking policy.
    ///
    /// # Arguments
    ///
    /// * `ref_tracking` - One of:
    ///   - `Disabled`: shared objects are written in full every time; a cycle
    ///     fails with `CircularDependency`.
    ///   - `Enabled`: repeated objects are written once and referenced by id.
    ///   - `OnlyCircularDependency`: only back-edges to an object still being
    ///     written become references.
    ///
    /// # Default
    ///
    /// `Disabled`. Both peers must use the same policy.
    pub fn ref_tracking(mut self, ref_tracking: RefTracking) -> Self {
        self.config.ref_tracking = ref_tracking;
        self
    }

    /// Enables the cross-language header: magic number and language byte.
    ///
    /// # Default
    ///
    /// `false`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fury_core::fury::Fury;
    ///
    /// let fury = Fury::default().xlang(true);
    /// let bytes = fury.serialize(&true).unwrap();
    /// assert_eq!(&bytes[..2], &0x62d4u16.to_le_bytes());
    /// ```
    pub fn xlang(mut self, xlang: bool) -> Self {
        self.config.xlang = xlang;
        self
    }

    /// Bounds the wait for the registry lock. Applies to every clone sharing
    /// this registry.
    pub fn registry_lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.registry_lock_timeout = timeout;
        self.registry.set_lock_timeout(timeout);
        self
    }

    /// Maximum nesting depth of one message. Deeper input fails with
    /// `BadInput` instead of growing the stack without bound.
    ///
    /// # Default
    ///
    /// `256`.
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Soft limit on buffered output. Once reached, encoding suspends until
    /// the buffer is drained to the sink.
    pub fn write_buffer_limit(mut self, limit: Option<usize>) -> Self {
        self.config.write_buffer_limit = limit;
        self
    }

    /// Bytes requested from the source per read in the blocking and async
    /// drivers.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Registers a user type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::any::Any;
    /// use std::task::Poll;
    ///
    /// use fury_core::context::{DeserializationReader, SerializationWriter};
    /// use fury_core::error::PollResult;
    /// use fury_core::fury::Fury;
    /// use fury_core::resolver::type_resolver::{SizeHint, TypeRegistration};
    /// use fury_core::serializer::{downcast_value, Deserializer, Serializer, Value};
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct Celsius(f64);
    ///
    /// #[derive(Default)]
    /// struct CelsiusCodec;
    ///
    /// impl Serializer for CelsiusCodec {
    ///     fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
    ///         writer.write_f64(downcast_value::<Celsius>(value)?.0)
    ///     }
    /// }
    ///
    /// impl Deserializer for CelsiusCodec {
    ///     fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
    ///         Ok(reader.read_f64()?.map(|v| Box::new(Celsius(v)) as Value))
    ///     }
    /// }
    ///
    /// let fury = Fury::default();
    /// fury.register(
    ///     TypeRegistration::builder::<Celsius>()
    ///         .id(3)
    ///         .size_hint(SizeHint::Fixed(8))
    ///         .codec::<CelsiusCodec>(),
    /// )
    /// .unwrap();
    /// let bytes = fury.serialize(&Celsius(21.5)).unwrap();
    /// assert_eq!(fury.deserialize::<Celsius>(&bytes).unwrap(), Celsius(21.5));
    /// ```
    pub fn register<T: 'static>(
        &self,
        builder: TypeRegistrationBuilder<T>,
    ) -> Result<Arc<TypeRegistration>, Error> {
        self.registry.register(builder)
    }

    /// Makes `Vec<T>` serializable for a registered `T`.
    pub fn register_list<T: 'static>(&self) -> Result<Arc<TypeRegistration>, Error> {
        self.registry.register_list::<T>()
    }

    /// A fresh encode session.
    pub fn writer(&self) -> SerializationWriter {
        SerializationWriter::new(self.config.clone(), self.registry.clone())
    }

    /// A fresh decode session.
    pub fn reader(&self) -> DeserializationReader {
        DeserializationReader::new(self.config.clone(), self.registry.clone())
    }

    pub fn serialize<T: 'static>(&self, value: &T) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.writer().write_to(value, &mut out)?;
        Ok(out)
    }

    pub fn serialize_to<T: 'static, W: Write>(&self, value: &T, sink: W) -> Result<(), Error> {
        self.writer().write_to(value, sink)
    }

    pub async fn serialize_async<T: 'static, W: AsyncWrite + Unpin>(
        &self,
        value: &T,
        sink: &mut W,
    ) -> Result<(), Error> {
        self.writer().write_to_async(value, sink).await
    }

    pub fn deserialize<T: 'static>(&self, bytes: &[u8]) -> Result<T, Error> {
        let mut reader = self.complete_input(bytes);
        match reader.read::<T>()? {
            Poll::Ready(value) => Ok(value),
            Poll::Pending => Err(Error::invalid_state("decoder suspended on complete input")),
        }
    }

    /// Decodes a message of any registered type.
    pub fn deserialize_any(&self, bytes: &[u8]) -> Result<Option<Value>, Error> {
        let mut reader = self.complete_input(bytes);
        match reader.read_any()? {
            Poll::Ready(value) => Ok(value),
            Poll::Pending => Err(Error::invalid_state("decoder suspended on complete input")),
        }
    }

    /// Decodes one message from a blocking source, reading it in chunks.
    pub fn deserialize_from<T: 'static, R: Read>(&self, source: R) -> Result<T, Error> {
        self.reader().read_from(source)
    }

    pub async fn deserialize_async<T: 'static, R: AsyncRead + Unpin>(
        &self,
        source: &mut R,
    ) -> Result<T, Error> {
        self.reader().read_from_async(source).await
    }

    fn complete_input(&self, bytes: &[u8]) -> DeserializationReader {
        let mut reader = self.reader();
        reader.feed(bytes::Bytes::copy_from_slice(bytes));
        reader.finish();
        reader
    }
}
