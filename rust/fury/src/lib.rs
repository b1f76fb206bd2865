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

//! # Fury
//!
//! Reference-aware binary serialization for object graphs, with a decoder
//! that works on partial input.
//!
//! ## Key Features
//!
//! - **Incremental decoding**: feed bytes as they arrive; a read that runs
//!   dry returns `Poll::Pending` and resumes mid-value on the next call
//! - **Shared and cyclic graphs**: `Rc`/`Arc` handles keep their identity
//!   across a round trip under the `Enabled` and `OnlyCircularDependency`
//!   reference policies
//! - **Cross-language header**: optional magic number and language byte
//! - **Blocking and async drivers** over `std::io` and `tokio`
//!
//! ## Shared references
//!
//! ```rust
//! use std::any::Any;
//! use std::rc::Rc;
//! use std::task::Poll;
//!
//! use fury::{
//!     downcast_value, try_ready, DeserializationReader, Deserializer, Fury, PollResult,
//!     RefTracking, SerializationWriter, Serializer, SizeHint, TypeRegistration, Value,
//! };
//!
//! #[derive(Debug, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! #[derive(Default)]
//! struct PointCodec;
//!
//! impl Serializer for PointCodec {
//!     fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
//!         let p = downcast_value::<Rc<Point>>(value)?;
//!         try_ready!(writer.write_i32(p.x));
//!         writer.write_i32(p.y)
//!     }
//! }
//!
//! impl Deserializer for PointCodec {
//!     fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
//!         // SizeHint::Fixed(8) guarantees both fields are buffered.
//!         let x = try_ready!(reader.read_i32());
//!         let y = try_ready!(reader.read_i32());
//!         Ok(Poll::Ready(Box::new(Rc::new(Point { x, y }))))
//!     }
//! }
//!
//! # fn main() -> Result<(), fury::Error> {
//! let fury = Fury::default().ref_tracking(RefTracking::Enabled);
//! fury.register(
//!     TypeRegistration::builder::<Rc<Point>>()
//!         .id(7)
//!         .shared()
//!         .size_hint(SizeHint::Fixed(8))
//!         .codec::<PointCodec>(),
//! )?;
//! fury.register_list::<Rc<Point>>()?;
//!
//! let p = Rc::new(Point { x: 1, y: 2 });
//! let bytes = fury.serialize(&vec![p.clone(), p])?;
//! let back: Vec<Rc<Point>> = fury.deserialize(&bytes)?;
//! assert!(Rc::ptr_eq(&back[0], &back[1]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Incremental input
//!
//! ```rust
//! use std::task::Poll;
//! use fury::Fury;
//!
//! let fury = Fury::default();
//! let bytes = fury.serialize(&vec![10i64, -20, 30]).unwrap();
//! let (head, tail) = bytes.split_at(bytes.len() / 2);
//!
//! let mut reader = fury.reader();
//! reader.feed(head.to_vec());
//! assert_eq!(reader.read::<Vec<i64>>().unwrap(), Poll::Pending);
//! reader.feed(tail.to_vec());
//! reader.finish();
//! assert_eq!(reader.read::<Vec<i64>>().unwrap(), Poll::Ready(vec![10, -20, 30]));
//! ```

pub use fury_core::config::{Config, RefTracking};
pub use fury_core::context::{DeserializationReader, SerializationWriter};
pub use fury_core::error::{Error, PollResult};
pub use fury_core::fury::Fury;
pub use fury_core::resolver::type_resolver::{SizeHint, TypeRegistration, TypeRegistry};
pub use fury_core::serializer::{
    cast_value, downcast_instance, downcast_value, Deserializer, Serializer, Value,
};
pub use fury_core::types::{TypeKind, WireTag};
pub use fury_core::util::Cancellation;
pub use fury_core::{bail, ensure, try_ready};
