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

//! # Fury Core
//!
//! The engine behind the `fury` crate: a binary object-graph serializer
//! whose decoder can stop in the middle of any value when input runs out
//! and pick up exactly where it stopped once more bytes arrive.
//!
//! ## Architecture
//!
//! - **`fury`**: configuration and registry holder, one-call drivers
//! - **`context`**: encode/decode sessions and the resumable frame stack
//! - **`buffer`**: `ByteCursor` over chunked input, `BufferWriter` with a soft limit
//! - **`varint`**: LEB128 and zigzag codecs with a fast and a slow path
//! - **`meta`**: compact meta string encodings and murmurhash3
//! - **`resolver`**: type registry, reference tables, meta string tables, codec pools
//! - **`serializer`**: codec traits and the built-in codecs
//! - **`types`**: ref flags, type kinds and wire tags
//! - **`config`**, **`error`**, **`util`**
//!
//! ## Suspension
//!
//! Every step that touches the wire returns
//! [`PollResult<T>`](error::PollResult), i.e. `Result<Poll<T>, Error>`.
//! `Poll::Pending` means "not enough input yet" (or "output buffer full"
//! when encoding) and is not an error; [`try_ready!`] forwards it the way
//! `?` forwards errors. Partially decoded values stay parked on the
//! session's frame stack until the next call.
//!
//! ```rust
//! use std::task::Poll;
//! use fury_core::fury::Fury;
//!
//! let fury = Fury::default();
//! let bytes = fury.serialize(&"incremental".to_string()).unwrap();
//!
//! let mut reader = fury.reader();
//! let mut decoded = None;
//! for byte in bytes {
//!     reader.feed(vec![byte]);
//!     if let Poll::Ready(value) = reader.read::<String>().unwrap() {
//!         decoded = Some(value);
//!     }
//! }
//! assert_eq!(decoded.as_deref(), Some("incremental"));
//! ```

pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod fury;
pub mod meta;
pub mod resolver;
pub mod serializer;
pub mod types;
pub mod util;
pub mod varint;

pub use crate::config::{Config, RefTracking};
pub use crate::error::{Error, PollResult};
pub use crate::fury::Fury;
