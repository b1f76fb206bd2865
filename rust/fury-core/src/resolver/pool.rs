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

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

/// Free lists per pool; threads are spread over them round-robin.
const NUM_SEGMENTS: usize = 16;

static NEXT_THREAD: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static THREAD_SEGMENT: Cell<usize> = Cell::new(
        (NEXT_THREAD.fetch_add(1, Ordering::Relaxed) as usize) % NUM_SEGMENTS
    );
}

struct Segment<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Segment<T> {
    fn new() -> Self {
        Segment {
            items: Mutex::new(Vec::new()),
        }
    }
}

/// A segmented free list of reusable codec instances.
///
/// Each thread is pinned to one segment, so sessions on different threads
/// rarely touch the same lock. Items are created on demand and never
/// dropped by the pool; the count is bounded by how many the callers hold at
/// once.
pub struct Pool<T> {
    segments: [Segment<T>; NUM_SEGMENTS],
    factory: Box<dyn Fn() -> T + Send + Sync>,
    created: AtomicUsize,
    label: &'static str,
}

impl<T> Pool<T> {
    pub fn new<F>(label: &'static str, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Pool {
            segments: std::array::from_fn(|_| Segment::new()),
            factory: Box::new(factory),
            created: AtomicUsize::new(0),
            label,
        }
    }

    #[inline(always)]
    fn segment(&self) -> &Segment<T> {
        &self.segments[THREAD_SEGMENT.with(Cell::get)]
    }

    /// Takes an item out of the pool, creating one if the segment is empty.
    #[inline(always)]
    pub fn rent(&self) -> T {
        if let Some(item) = self.segment().items.lock().pop() {
            return item;
        }
        let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(pool = self.label, created, "codec pool grew");
        (self.factory)()
    }

    /// Gives an item back. The caller resets it first.
    #[inline(always)]
    pub fn restore(&self, item: T) {
        self.segment().items.lock().push(item);
    }

    /// Number of items ever created by this pool.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of idle items across all segments.
    pub fn idle(&self) -> usize {
        self.segments.iter().map(|s| s.items.lock().len()).sum()
    }
}
