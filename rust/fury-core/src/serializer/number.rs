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

use std::any::Any;

use crate::context::{DeserializationReader, SerializationWriter};
use crate::error::PollResult;
use crate::serializer::{downcast_value, Deserializer, Serializer, Value};

macro_rules! impl_primitive_codec {
    ($ty:ty, $name:ident, $wire:ident) => {
        paste::paste! {
            #[doc = concat!("Payload codec for `", stringify!($ty), "`.")]
            #[derive(Clone, Copy, Debug, Default)]
            pub struct [<$name Codec>];

            impl Serializer for [<$name Codec>] {
                #[inline(always)]
                fn write_data(
                    &mut self,
                    writer: &mut SerializationWriter,
                    value: &dyn Any,
                ) -> PollResult<()> {
                    let v = downcast_value::<$ty>(value)?;
                    writer.[<write_ $wire>](*v)
                }
            }

            impl Deserializer for [<$name Codec>] {
                #[inline(always)]
                fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
                    Ok(reader.[<read_ $wire>]()?.map(|v| Box::new(v) as Value))
                }
            }
        }
    };
}

impl_primitive_codec!(bool, Bool, bool);
impl_primitive_codec!(i8, I8, i8);
impl_primitive_codec!(i16, I16, i16);
impl_primitive_codec!(i32, I32, varint32);
impl_primitive_codec!(i64, I64, varint64);
impl_primitive_codec!(f32, F32, f32);
impl_primitive_codec!(f64, F64, f64);
