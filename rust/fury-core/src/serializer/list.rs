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
use std::fmt;
use std::marker::PhantomData;
use std::task::Poll;

use crate::bail;
use crate::context::{DeserializationReader, SerializationWriter};
use crate::error::{Error, PollResult};
use crate::serializer::{downcast_instance, downcast_value, Deserializer, Serializer, Value};
use crate::try_ready;

/// Elements preallocated for a list before any of them has been read.
const MAX_PREALLOCATED: usize = 1024;

fn list_len(len: usize) -> Result<u32, Error> {
    u32::try_from(len).map_err(|_| Error::encode_error(format!("list of {len} elements")))
}

/// Writes `Vec<T>` as a varuint32 count followed by each element as a full
/// value with its own ref flag and type header.
pub struct ListSerializer<T> {
    next: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for ListSerializer<T> {
    fn default() -> Self {
        ListSerializer {
            next: None,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ListSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListSerializer").field("next", &self.next).finish()
    }
}

impl<T: 'static> Serializer for ListSerializer<T> {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let list = downcast_value::<Vec<T>>(value)?;
        if self.next.is_none() {
            try_ready!(writer.write_varuint32(list_len(list.len())?));
            self.next = Some(0);
        }
        while let Some(i) = self.next.filter(|&i| i < list.len()) {
            try_ready!(writer.write_value(&list[i]));
            self.next = Some(i + 1);
        }
        self.next = None;
        Ok(Poll::Ready(()))
    }

    fn reset(&mut self) {
        self.next = None;
    }
}

pub struct ListDeserializer<T> {
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for ListDeserializer<T> {
    fn default() -> Self {
        ListDeserializer {
            len: 0,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Deserializer for ListDeserializer<T> {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        self.len = try_ready!(reader.read_varuint32()) as usize;
        let list: Vec<T> = Vec::with_capacity(self.len.min(MAX_PREALLOCATED));
        Ok(Poll::Ready(Box::new(list)))
    }

    fn fill_instance(
        &mut self,
        reader: &mut DeserializationReader,
        instance: &mut Value,
    ) -> PollResult<()> {
        let list = downcast_instance::<Vec<T>>(instance)?;
        while list.len() < self.len {
            list.push(try_ready!(reader.read_value::<T>()));
        }
        Ok(Poll::Ready(()))
    }

    fn reset(&mut self) {
        self.len = 0;
    }
}

/// Writes a heterogeneous `Vec<Box<dyn Any>>`; each element is dispatched on
/// its runtime type.
#[derive(Debug, Default)]
pub struct AnyListSerializer {
    next: Option<usize>,
}

impl Serializer for AnyListSerializer {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let list = downcast_value::<Vec<Value>>(value)?;
        if self.next.is_none() {
            try_ready!(writer.write_varuint32(list_len(list.len())?));
            self.next = Some(0);
        }
        while let Some(i) = self.next.filter(|&i| i < list.len()) {
            try_ready!(writer.write_value_any(list[i].as_ref()));
            self.next = Some(i + 1);
        }
        self.next = None;
        Ok(Poll::Ready(()))
    }

    fn reset(&mut self) {
        self.next = None;
    }
}

/// Reads any `LIST` into `Vec<Box<dyn Any>>`, resolving each element by its
/// wire tag.
#[derive(Debug, Default)]
pub struct AnyListDeserializer {
    len: usize,
}

impl Deserializer for AnyListDeserializer {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        self.len = try_ready!(reader.read_varuint32()) as usize;
        let list: Vec<Value> = Vec::with_capacity(self.len.min(MAX_PREALLOCATED));
        Ok(Poll::Ready(Box::new(list)))
    }

    fn fill_instance(
        &mut self,
        reader: &mut DeserializationReader,
        instance: &mut Value,
    ) -> PollResult<()> {
        let list = downcast_instance::<Vec<Value>>(instance)?;
        while list.len() < self.len {
            match try_ready!(reader.read_value_any()) {
                Some(value) => list.push(value),
                None => bail!("null element in an untyped list"),
            }
        }
        Ok(Poll::Ready(()))
    }

    fn reset(&mut self) {
        self.len = 0;
    }
}
