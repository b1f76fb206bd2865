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

//! Encode and decode sessions.
//!
//! A session owns everything that lives for one stream: the byte buffer or
//! cursor, the frame stack, the reference table and the meta string ids.
//! Sessions are cheap to create from a [`Fury`](crate::fury::Fury) and are
//! not shared between threads; the [`TypeRegistry`] they point at is.
//!
//! [`TypeRegistry`]: crate::resolver::type_resolver::TypeRegistry

mod frame;
mod header;
mod read;
mod write;

pub use frame::{FrameStack, FrameState};
pub use read::DeserializationReader;
pub use write::SerializationWriter;
