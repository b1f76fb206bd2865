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

#![allow(dead_code)]

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Poll;

use fury_core::context::{DeserializationReader, SerializationWriter};
use fury_core::error::PollResult;
use fury_core::fury::Fury;
use fury_core::resolver::type_resolver::{SizeHint, TypeRegistration};
use fury_core::serializer::{downcast_instance, downcast_value, Deserializer, Serializer, Value};
use fury_core::try_ready;

/// Installs a subscriber once so `RUST_LOG=fury_core=trace` shows engine logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Decodes `bytes` handing the reader `chunk` bytes at a time.
pub fn decode_in_chunks<T: 'static>(fury: &Fury, bytes: &[u8], chunk: usize) -> T {
    let mut reader = fury.reader();
    let mut chunks = bytes.chunks(chunk);
    loop {
        match reader.read::<T>().unwrap() {
            Poll::Ready(value) => {
                assert!(reader.is_idle());
                return value;
            }
            Poll::Pending => match chunks.next() {
                Some(c) => reader.feed(c.to_vec()),
                None => reader.finish(),
            },
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Default)]
pub struct PointCodec;

impl Serializer for PointCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let p = downcast_value::<Rc<Point>>(value)?;
        try_ready!(writer.write_i32(p.x));
        writer.write_i32(p.y)
    }
}

impl Deserializer for PointCodec {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        let x = try_ready!(reader.read_i32());
        let y = try_ready!(reader.read_i32());
        Ok(Poll::Ready(Box::new(Rc::new(Point { x, y }))))
    }
}

/// `Rc<Point>` as shared type 7 with an 8 byte payload, plus its list.
pub fn register_point(fury: &Fury) {
    fury.register(
        TypeRegistration::builder::<Rc<Point>>()
            .id(7)
            .shared()
            .size_hint(SizeHint::Fixed(8))
            .codec::<PointCodec>(),
    )
    .unwrap();
    fury.register_list::<Rc<Point>>().unwrap();
}

pub type NodeRef = Rc<RefCell<Node>>;

#[derive(Default)]
pub struct Node {
    pub id: i32,
    pub next: Option<NodeRef>,
}

pub fn node(id: i32) -> NodeRef {
    Rc::new(RefCell::new(Node { id, next: None }))
}

/// Writes the id, then the optional next node as a nested value.
#[derive(Default)]
pub struct NodeCodec {
    wrote_id: bool,
    id: Option<i32>,
}

impl Serializer for NodeCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let node = downcast_value::<NodeRef>(value)?.borrow();
        if !self.wrote_id {
            try_ready!(writer.write_varint32(node.id));
            self.wrote_id = true;
        }
        try_ready!(writer.write_value_option(node.next.as_ref()));
        self.wrote_id = false;
        Ok(Poll::Ready(()))
    }

    fn reset(&mut self) {
        self.wrote_id = false;
    }
}

impl Deserializer for NodeCodec {
    fn create_instance(&mut self, _reader: &mut DeserializationReader) -> PollResult<Value> {
        Ok(Poll::Ready(Box::new(node(0))))
    }

    fn fill_instance(
        &mut self,
        reader: &mut DeserializationReader,
        instance: &mut Value,
    ) -> PollResult<()> {
        if self.id.is_none() {
            self.id = Some(try_ready!(reader.read_varint32()));
        }
        let next = try_ready!(reader.read_value_option::<NodeRef>());
        let mut node = downcast_instance::<NodeRef>(instance)?.borrow_mut();
        node.id = self.id.take().unwrap_or_default();
        node.next = next;
        Ok(Poll::Ready(()))
    }

    fn reset(&mut self) {
        self.id = None;
    }
}

pub fn register_node(fury: &Fury) {
    fury.register(
        TypeRegistration::builder::<NodeRef>()
            .id(8)
            .shared()
            .codec::<NodeCodec>(),
    )
    .unwrap();
    fury.register_list::<NodeRef>().unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
}

/// Payload is a nested `String` value read inside `create_instance`.
#[derive(Default)]
pub struct LabelCodec;

impl Serializer for LabelCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        writer.write_value(&downcast_value::<Label>(value)?.text)
    }
}

impl Deserializer for LabelCodec {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        let text = try_ready!(reader.read_value::<String>());
        Ok(Poll::Ready(Box::new(Label { text })))
    }
}

pub fn register_label(fury: &Fury, namespace: &str, name: &str) {
    fury.register(
        TypeRegistration::builder::<Label>()
            .name(namespace, name)
            .codec::<LabelCodec>(),
    )
    .unwrap();
    fury.register_list::<Label>().unwrap();
}

/// A value type counting how many instances were ever created.
#[derive(Debug, PartialEq)]
pub struct Counted(pub i64);

pub static COUNTED_CREATED: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
pub struct CountedCodec;

impl Serializer for CountedCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        writer.write_varint64(downcast_value::<Counted>(value)?.0)
    }
}

impl Deserializer for CountedCodec {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        let v = try_ready!(reader.read_varint64());
        COUNTED_CREATED.fetch_add(1, Ordering::SeqCst);
        Ok(Poll::Ready(Box::new(Counted(v))))
    }
}
