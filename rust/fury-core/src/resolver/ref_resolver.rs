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
use std::collections::HashMap;

use crate::config::RefTracking;
use crate::error::Error;

/// Dense per-session id of a referenceable object.
pub type RefId = u32;

/// Clones a type-erased shared handle (`Rc<T>`/`Arc<T>`) out of a value.
pub type ShareFn = fn(&dyn Any) -> Option<Box<dyn Any>>;

/// Progress of an object seen by [`RefWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefState {
    /// First sight; an id was just assigned.
    Unprocessed,
    /// Its payload is still being written.
    PartiallyProcessed,
    FullyProcessed,
}

/// Encode side of the reference table.
///
/// Objects are keyed by identity (the address of their shared allocation).
/// Under `Enabled` every id stays live until [`clear`](RefWriter::clear).
/// Under `Disabled` and `OnlyCircularDependency` an object is forgotten as
/// soon as its payload completes, so ids are handed out in stack order and
/// reused.
///
/// # Examples
///
/// ```rust
/// use fury_core::config::RefTracking;
/// use fury_core::resolver::ref_resolver::{RefState, RefWriter};
///
/// let mut refs = RefWriter::new(RefTracking::Enabled);
/// assert_eq!(refs.get_or_assign(0x1000), (0, RefState::Unprocessed));
/// assert_eq!(refs.get_or_assign(0x1000), (0, RefState::PartiallyProcessed));
/// refs.complete(0x1000);
/// assert_eq!(refs.get_or_assign(0x1000), (0, RefState::FullyProcessed));
/// ```
pub struct RefWriter {
    policy: RefTracking,
    refs: HashMap<usize, (RefId, RefState)>,
    next_id: RefId,
}

impl RefWriter {
    pub fn new(policy: RefTracking) -> Self {
        RefWriter {
            policy,
            refs: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn policy(&self) -> RefTracking {
        self.policy
    }

    /// Looks up an object without registering it.
    #[inline(always)]
    pub fn lookup(&self, identity: usize) -> Option<(RefId, RefState)> {
        self.refs.get(&identity).copied()
    }

    /// Returns the object's id and its state before this call. Unseen objects
    /// get the next id and are marked in progress.
    pub fn get_or_assign(&mut self, identity: usize) -> (RefId, RefState) {
        if let Some(&entry) = self.refs.get(&identity) {
            return entry;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.refs.insert(identity, (id, RefState::PartiallyProcessed));
        (id, RefState::Unprocessed)
    }

    #[inline(always)]
    pub fn mark_fully_processed(&mut self, identity: usize) {
        if let Some(entry) = self.refs.get_mut(&identity) {
            entry.1 = RefState::FullyProcessed;
        }
    }

    /// Forgets an object whose payload completed. Only the most recently
    /// assigned id can be popped, which keeps ids dense.
    pub fn pop(&mut self, identity: usize) {
        if let Some((id, _)) = self.refs.remove(&identity) {
            debug_assert_eq!(id + 1, self.next_id, "ref ids popped out of order");
            self.next_id = id;
        }
    }

    /// Called once the object's payload has been fully written.
    pub fn complete(&mut self, identity: usize) {
        match self.policy {
            RefTracking::Enabled => self.mark_fully_processed(identity),
            RefTracking::Disabled | RefTracking::OnlyCircularDependency => self.pop(identity),
        }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn clear(&mut self) {
        self.refs.clear();
        self.next_id = 0;
    }
}

struct Bound {
    value: Box<dyn Any>,
    share: ShareFn,
}

/// Decode side of the reference table.
///
/// A slot is reserved with [`allocate`](RefReader::allocate) as soon as a
/// `RefValue` flag is read and bound once the object exists, before its
/// fields are filled, so nested values can point back at it.
#[derive(Default)]
pub struct RefReader {
    slots: Vec<Option<Bound>>,
}

impl RefReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> RefId {
        self.slots.push(None);
        (self.slots.len() - 1) as RefId
    }

    /// Makes `id` resolvable. `value` must hold a shared handle `share` can
    /// clone.
    pub fn bind(&mut self, id: RefId, value: Box<dyn Any>, share: ShareFn) -> Result<(), Error> {
        match self.slots.get_mut(id as usize) {
            Some(slot) => {
                *slot = Some(Bound { value, share });
                Ok(())
            }
            None => Err(Error::bad_input(format!(
                "ref id {id} out of range, table size {}",
                self.slots.len()
            ))),
        }
    }

    /// Returns another handle to the object bound at `id`.
    pub fn resolve(&self, id: RefId) -> Result<Box<dyn Any>, Error> {
        let slot = self.slots.get(id as usize).ok_or_else(|| {
            Error::bad_input(format!(
                "ref id {id} out of range, table size {}",
                self.slots.len()
            ))
        })?;
        let bound = slot
            .as_ref()
            .ok_or_else(|| Error::bad_input(format!("ref id {id} is not bound to an object")))?;
        (bound.share)(bound.value.as_ref())
            .ok_or_else(|| Error::bad_input(format!("ref id {id} is not a shared object")))
    }

    /// Releases the most recent slot once its object completed.
    pub fn pop(&mut self, id: RefId) {
        debug_assert_eq!(id as usize + 1, self.slots.len(), "ref ids popped out of order");
        self.slots.truncate(id as usize);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
