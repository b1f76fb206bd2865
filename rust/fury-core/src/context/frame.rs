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

use std::mem;

use tracing::trace;

/// Progress of one value through the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    AwaitingRefMeta,
    AwaitingTypeMeta,
    AwaitingPayload,
    Done,
}

/// Stack of per-value frames for one session.
///
/// Recursion happens on the native call stack: a codec that needs a child
/// value calls back into the session, which enters the frame one level
/// deeper. The stack only keeps what must survive a suspension. When a step
/// reports `Poll::Pending`, every frame on the path parks itself at its own
/// depth and the whole call unwinds. The next call re-descends the same path
/// and each level picks up its parked frame with [`enter`](FrameStack::enter).
///
/// A frame is taken out of the stack while it runs, so the running code owns
/// it and can lend `&mut` access to the session at the same time.
///
/// ```rust
/// use fury_core::context::{FrameStack, FrameState};
///
/// #[derive(Default)]
/// struct Frame {
///     state: FrameState,
/// }
///
/// let mut stack = FrameStack::<Frame>::new();
/// let mut root = stack.enter();
/// root.state = FrameState::AwaitingPayload;
/// let child = stack.enter();
/// assert_eq!(stack.depth(), 2);
///
/// // The child ran out of input: park both levels.
/// stack.park(child);
/// stack.park(root);
/// assert_eq!(stack.depth(), 0);
/// assert_eq!(stack.len(), 2);
///
/// // Resume: the root comes back in the state it was parked in.
/// let root = stack.enter();
/// assert_eq!(root.state, FrameState::AwaitingPayload);
/// ```
pub struct FrameStack<F> {
    frames: Vec<F>,
    depth: usize,
}

impl<F: Default> FrameStack<F> {
    pub fn new() -> Self {
        FrameStack {
            frames: Vec::new(),
            depth: 0,
        }
    }

    /// Number of frames entered and not yet parked or completed.
    #[inline(always)]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of frames held, running or parked.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Takes the frame at the current depth, a parked one if a previous call
    /// suspended here, otherwise a fresh one.
    pub fn enter(&mut self) -> F {
        let frame = match self.frames.get_mut(self.depth) {
            Some(slot) => {
                trace!(depth = self.depth, "frame resumed");
                mem::take(slot)
            }
            None => {
                self.frames.push(F::default());
                F::default()
            }
        };
        self.depth += 1;
        frame
    }

    /// Puts a suspended frame back at its depth.
    pub fn park(&mut self, frame: F) {
        debug_assert!(self.depth > 0, "park without enter");
        self.depth -= 1;
        trace!(depth = self.depth, "frame parked");
        self.frames[self.depth] = frame;
    }

    /// Drops the finished frame's slot along with anything deeper.
    pub fn complete(&mut self) {
        debug_assert!(self.depth > 0, "complete without enter");
        self.depth -= 1;
        self.frames.truncate(self.depth);
    }

    /// Leaves a frame whose step failed. Its slot and anything parked deeper
    /// are dropped so the caller's frame sits at the top again.
    pub fn discard(&mut self) {
        debug_assert!(self.depth > 0, "discard without enter");
        self.depth -= 1;
        trace!(depth = self.depth, "frame discarded");
        self.frames.truncate(self.depth);
    }

    /// Drops every frame, returning their resources.
    pub fn clear(&mut self) {
        if !self.frames.is_empty() {
            trace!(frames = self.frames.len(), "frame stack cleared");
        }
        self.frames.clear();
        self.depth = 0;
    }
}

impl<F: Default> Default for FrameStack<F> {
    fn default() -> Self {
        Self::new()
    }
}
