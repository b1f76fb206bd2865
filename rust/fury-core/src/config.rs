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

use std::time::Duration;

/// How object identity is preserved across the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RefTracking {
    /// Every value is written in full with `NotNullValue`. Re-entering an
    /// object that is still being written fails with `CircularDependency`.
    #[default]
    Disabled,
    /// Every shared object gets a ref id on first sight; later sightings are
    /// written as `Ref`.
    Enabled,
    /// Only back-edges to objects that are still being written become `Ref`.
    /// Ids are scoped to the object's frame and released when it completes.
    OnlyCircularDependency,
}

/// Configuration for Fury serialization.
///
/// Shared by the [`Fury`](crate::fury::Fury) facade and every session it
/// creates. Both ends of a stream must agree on `ref_tracking` and `xlang`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Reference tracking policy.
    pub ref_tracking: RefTracking,
    /// Whether the stream header carries the magic number and language byte.
    pub xlang: bool,
    /// Bounded wait for the type registry write lock.
    pub registry_lock_timeout: Duration,
    /// Maximum nesting depth of values within one stream.
    pub max_depth: u32,
    /// Soft limit on buffered output; encoding suspends once it is reached
    /// until the caller drains the buffer.
    pub write_buffer_limit: Option<usize>,
    /// Chunk size used by the blocking and async drivers when pulling input.
    pub read_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ref_tracking: RefTracking::Disabled,
            xlang: false,
            registry_lock_timeout: Duration::from_secs(1),
            max_depth: 256,
            write_buffer_limit: None,
            read_chunk_size: 8 * 1024,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn ref_tracking(&self) -> RefTracking {
        self.ref_tracking
    }

    /// Whether shared objects are written with ref flags at all.
    #[inline(always)]
    pub fn is_tracking_ref(&self) -> bool {
        self.ref_tracking != RefTracking::Disabled
    }

    #[inline(always)]
    pub fn is_xlang(&self) -> bool {
        self.xlang
    }

    #[inline(always)]
    pub fn registry_lock_timeout(&self) -> Duration {
        self.registry_lock_timeout
    }

    #[inline(always)]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[inline(always)]
    pub fn write_buffer_limit(&self) -> Option<usize> {
        self.write_buffer_limit
    }

    #[inline(always)]
    pub fn read_chunk_size(&self) -> usize {
        self.read_chunk_size.max(1)
    }
}
