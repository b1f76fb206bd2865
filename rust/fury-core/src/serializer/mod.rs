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

//! Leaf codecs and the contract the engine drives them through.
//!
//! The engine writes and reads the ref flag and type header of every value
//! itself; a codec only ever sees the payload. Writing is a single call,
//! [`Serializer::write_data`]. Reading is split in two phases so that an
//! object exists, and can be referenced, before its fields are read:
//! [`Deserializer::create_instance`] then [`Deserializer::fill_instance`].
//!
//! Every method may return `Ok(Poll::Pending)` when the buffer cannot take
//! or supply the next bytes. The engine keeps the codec instance and the
//! partial value parked in the current frame and calls the same method again
//! once the caller resumes, so a codec that reads or writes more than one
//! item must remember how far it got. Codecs whose payload has a fixed size
//! can declare it with [`SizeHint::Fixed`](crate::resolver::type_resolver::SizeHint)
//! instead and never observe a suspension.

use std::any::Any;
use std::task::Poll;

use crate::context::{DeserializationReader, SerializationWriter};
use crate::error::{Error, PollResult};
use crate::resolver::type_resolver::{SizeHint, TypeRegistration};
use crate::types::TypeKind;

mod datetime;
mod list;
mod number;
mod string;

pub use datetime::{DurationCodec, NaiveDateCodec, NaiveDateTimeCodec};
pub use list::{AnyListDeserializer, AnyListSerializer, ListDeserializer, ListSerializer};
pub use number::{BoolCodec, F32Codec, F64Codec, I16Codec, I32Codec, I64Codec, I8Codec};
pub use string::{BinaryCodec, StringCodec};

/// A type-erased value moving through the engine.
pub type Value = Box<dyn Any>;

/// Writes the payload of one registered type.
pub trait Serializer: Send + 'static {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()>;

    /// Clears per-value progress before the instance goes back to its pool.
    fn reset(&mut self) {}
}

/// Reads the payload of one registered type.
pub trait Deserializer: Send + 'static {
    /// Builds the value, possibly empty. Shared values become resolvable by
    /// back-references as soon as this returns.
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value>;

    /// Completes the value created by `create_instance`.
    fn fill_instance(
        &mut self,
        _reader: &mut DeserializationReader,
        _instance: &mut Value,
    ) -> PollResult<()> {
        Ok(Poll::Ready(()))
    }

    fn reset(&mut self) {}
}

/// Borrows the concrete value a serializer was handed.
#[inline(always)]
pub fn downcast_value<T: 'static>(value: &dyn Any) -> Result<&T, Error> {
    value.downcast_ref::<T>().ok_or_else(|| {
        Error::type_error(format!(
            "serializer for {} was handed another type",
            std::any::type_name::<T>()
        ))
    })
}

/// Borrows the partially built instance a deserializer created.
#[inline(always)]
pub fn downcast_instance<T: 'static>(instance: &mut Value) -> Result<&mut T, Error> {
    instance.downcast_mut::<T>().ok_or_else(|| {
        Error::type_error(format!(
            "instance is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Unboxes a decoded value.
#[inline(always)]
pub fn cast_value<T: 'static>(value: Value) -> Result<T, Error> {
    value.downcast::<T>().map(|v| *v).map_err(|_| {
        Error::type_error(format!(
            "decoded value is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

pub(crate) fn builtin_registrations() -> Vec<TypeRegistration> {
    use chrono::{NaiveDate, NaiveDateTime};
    use std::time::Duration;

    vec![
        TypeRegistration::builtin::<bool, BoolCodec>(TypeKind::BOOL, SizeHint::Fixed(1)),
        TypeRegistration::builtin::<i8, I8Codec>(TypeKind::INT8, SizeHint::Fixed(1)),
        TypeRegistration::builtin::<i16, I16Codec>(TypeKind::INT16, SizeHint::Fixed(2)),
        TypeRegistration::builtin::<i32, I32Codec>(TypeKind::VAR_INT32, SizeHint::Variable),
        TypeRegistration::builtin::<i64, I64Codec>(TypeKind::VAR_INT64, SizeHint::Variable),
        TypeRegistration::builtin::<f32, F32Codec>(TypeKind::FLOAT32, SizeHint::Fixed(4)),
        TypeRegistration::builtin::<f64, F64Codec>(TypeKind::FLOAT64, SizeHint::Fixed(8)),
        TypeRegistration::builtin::<String, StringCodec>(TypeKind::STRING, SizeHint::Variable),
        TypeRegistration::builtin::<Vec<u8>, BinaryCodec>(TypeKind::BINARY, SizeHint::Variable),
        TypeRegistration::builtin::<NaiveDate, NaiveDateCodec>(
            TypeKind::LOCAL_DATE,
            SizeHint::Fixed(4),
        ),
        TypeRegistration::builtin::<NaiveDateTime, NaiveDateTimeCodec>(
            TypeKind::TIMESTAMP,
            SizeHint::Fixed(8),
        ),
        TypeRegistration::builtin::<Duration, DurationCodec>(
            TypeKind::DURATION,
            SizeHint::Variable,
        ),
        // First LIST registration answers tag lookups for untyped reads.
        TypeRegistration::builtin_with::<Vec<Value>, AnyListSerializer, AnyListDeserializer>(
            TypeKind::LIST,
        ),
        list_registration::<bool>(),
        list_registration::<i32>(),
        list_registration::<i64>(),
        list_registration::<f64>(),
        list_registration::<String>(),
    ]
}

/// Registration of `Vec<T>` as a `LIST` of full `T` values.
pub fn list_registration<T: 'static>() -> TypeRegistration {
    TypeRegistration::builtin_with::<Vec<T>, ListSerializer<T>, ListDeserializer<T>>(
        TypeKind::LIST,
    )
}
