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

use std::collections::VecDeque;
use std::task::Poll;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::{Error, PollResult};
use crate::varint;

/// Outcome of [`ByteCursor::try_read`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Availability {
    /// Bytes buffered past the consumed position.
    pub available: usize,
    /// No more bytes will ever arrive.
    pub is_final: bool,
}

/// Buffered reader over a chunked byte source.
///
/// Chunks supplied with [`feed`](ByteCursor::feed) wait in the source queue
/// and are moved into the readable window only when a read asks for more
/// bytes than the window holds. Reads are all-or-nothing: a read that cannot
/// be satisfied consumes nothing and reports `Poll::Pending`, or fails with
/// `BadInput` once the source is final.
#[derive(Default)]
pub struct ByteCursor {
    window: VecDeque<Bytes>,
    buffered: usize,
    source: VecDeque<Bytes>,
    finished: bool,
    position: u64,
    examined: usize,
}

impl ByteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a complete input.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let mut cursor = Self::default();
        cursor.feed(bytes.into());
        cursor.finish();
        cursor
    }

    /// Queues another chunk from the transport.
    pub fn feed(&mut self, chunk: Bytes) {
        debug_assert!(!self.finished, "feed after finish");
        if !chunk.is_empty() {
            self.source.push_back(chunk);
        }
    }

    /// Marks the source exhausted.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drops every buffered byte and reopens the source.
    pub fn reset(&mut self) {
        self.window.clear();
        self.source.clear();
        self.buffered = 0;
        self.finished = false;
        self.position = 0;
        self.examined = 0;
    }

    /// Absolute stream offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes readable without pulling from the source.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Whether the last read examined everything buffered and can only make
    /// progress once new bytes arrive.
    pub fn is_starved(&self) -> bool {
        self.examined >= self.buffered + self.queued() && !self.finished
    }

    fn queued(&self) -> usize {
        self.source.iter().map(Bytes::len).sum()
    }

    /// Makes at least `min_bytes` readable if the source holds them.
    pub fn try_read(&mut self, min_bytes: usize) -> Availability {
        while self.buffered < min_bytes {
            match self.source.pop_front() {
                Some(chunk) => {
                    trace!(len = chunk.len(), position = self.position, "cursor pulled chunk");
                    self.buffered += chunk.len();
                    self.window.push_back(chunk);
                }
                None => break,
            }
        }
        Availability {
            available: self.buffered,
            is_final: self.finished && self.source.is_empty(),
        }
    }

    /// Consumes `n` buffered bytes.
    pub fn advance(&mut self, mut n: usize) {
        debug_assert!(n <= self.buffered);
        n = n.min(self.buffered);
        self.buffered -= n;
        self.position += n as u64;
        self.examined = self.examined.saturating_sub(n);
        while n > 0 {
            let Some(front) = self.window.front_mut() else {
                break;
            };
            if front.len() > n {
                let _ = front.split_to(n);
                break;
            }
            n -= front.len();
            self.window.pop_front();
        }
    }

    /// Records how far past the consumed position a parser has looked.
    pub fn examined(&mut self, pos: usize) {
        self.examined = self.examined.max(pos);
    }

    /// The readable bytes of the first chunk in the window.
    #[inline(always)]
    pub fn contiguous(&self) -> &[u8] {
        self.window.front().map(|b| b.as_ref()).unwrap_or(&[])
    }

    /// Iterates over every readable byte, crossing chunk boundaries.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.window.iter().flat_map(|chunk| chunk.iter().copied())
    }

    /// Copies the first `dst.len()` readable bytes without consuming them.
    fn peek_into(&self, dst: &mut [u8]) {
        let mut filled = 0;
        for chunk in &self.window {
            if filled == dst.len() {
                break;
            }
            let n = chunk.len().min(dst.len() - filled);
            dst[filled..filled + n].copy_from_slice(&chunk[..n]);
            filled += n;
        }
        debug_assert_eq!(filled, dst.len());
    }

    /// Ensures `n` bytes are readable.
    #[inline(always)]
    pub fn need(&mut self, n: usize) -> PollResult<()> {
        if self.buffered >= n {
            return Ok(Poll::Ready(()));
        }
        let availability = self.try_read(n);
        if availability.available >= n {
            return Ok(Poll::Ready(()));
        }
        self.examined(availability.available);
        if availability.is_final {
            return Err(Error::truncated(n, availability.available));
        }
        Ok(Poll::Pending)
    }

    #[inline(always)]
    fn read_array<const N: usize>(&mut self) -> PollResult<[u8; N]> {
        crate::try_ready!(self.need(N));
        let mut out = [0u8; N];
        let front = self.contiguous();
        if front.len() >= N {
            out.copy_from_slice(&front[..N]);
        } else {
            self.peek_into(&mut out);
        }
        self.advance(N);
        Ok(Poll::Ready(out))
    }

    pub fn read_u8(&mut self) -> PollResult<u8> {
        Ok(self.read_array::<1>()?.map(|b| b[0]))
    }

    pub fn read_i8(&mut self) -> PollResult<i8> {
        Ok(self.read_u8()?.map(|b| b as i8))
    }

    pub fn read_bool(&mut self) -> PollResult<bool> {
        Ok(self.read_u8()?.map(|b| b != 0))
    }

    pub fn read_i16(&mut self) -> PollResult<i16> {
        Ok(self.read_array::<2>()?.map(|b| LittleEndian::read_i16(&b)))
    }

    pub fn read_u16(&mut self) -> PollResult<u16> {
        Ok(self.read_array::<2>()?.map(|b| LittleEndian::read_u16(&b)))
    }

    pub fn read_i32(&mut self) -> PollResult<i32> {
        Ok(self.read_array::<4>()?.map(|b| LittleEndian::read_i32(&b)))
    }

    pub fn read_i64(&mut self) -> PollResult<i64> {
        Ok(self.read_array::<8>()?.map(|b| LittleEndian::read_i64(&b)))
    }

    pub fn read_u64(&mut self) -> PollResult<u64> {
        Ok(self.read_array::<8>()?.map(|b| LittleEndian::read_u64(&b)))
    }

    pub fn read_f32(&mut self) -> PollResult<f32> {
        Ok(self.read_array::<4>()?.map(|b| LittleEndian::read_f32(&b)))
    }

    pub fn read_f64(&mut self) -> PollResult<f64> {
        Ok(self.read_array::<8>()?.map(|b| LittleEndian::read_f64(&b)))
    }

    pub fn read_varuint32(&mut self) -> PollResult<u32> {
        let availability = self.try_read(varint::MAX_VARUINT32_BYTES);
        let (value, consumed) = varint::decode_varuint32_fast(self.contiguous())?;
        if consumed > 0 {
            self.advance(consumed);
            return Ok(Poll::Ready(value));
        }
        match varint::decode_varuint32_slow(self.bytes())? {
            Some((value, consumed)) => {
                self.advance(consumed);
                Ok(Poll::Ready(value))
            }
            None => self.starve(availability, varint::MAX_VARUINT32_BYTES),
        }
    }

    pub fn read_varint32(&mut self) -> PollResult<i32> {
        Ok(self.read_varuint32()?.map(varint::zigzag_decode32))
    }

    pub fn read_varuint64(&mut self) -> PollResult<u64> {
        let availability = self.try_read(varint::MAX_VARUINT64_BYTES);
        let (value, consumed) = varint::decode_varuint64_fast(self.contiguous());
        if consumed > 0 {
            self.advance(consumed);
            return Ok(Poll::Ready(value));
        }
        match varint::decode_varuint64_slow(self.bytes()) {
            Some((value, consumed)) => {
                self.advance(consumed);
                Ok(Poll::Ready(value))
            }
            None => self.starve(availability, varint::MAX_VARUINT64_BYTES),
        }
    }

    pub fn read_varint64(&mut self) -> PollResult<i64> {
        Ok(self.read_varuint64()?.map(varint::zigzag_decode64))
    }

    fn starve<T>(&mut self, availability: Availability, wanted: usize) -> PollResult<T> {
        self.examined(availability.available);
        if availability.is_final {
            return Err(Error::truncated(wanted, availability.available));
        }
        Ok(Poll::Pending)
    }

    /// Takes `n` bytes. Zero-copy when they sit in a single chunk.
    pub fn read_bytes(&mut self, n: usize) -> PollResult<Bytes> {
        crate::try_ready!(self.need(n));
        let bytes = match self.window.front() {
            Some(front) if front.len() >= n => front.slice(..n),
            _ => {
                let mut joined = BytesMut::with_capacity(n);
                for chunk in &self.window {
                    let take = chunk.len().min(n - joined.len());
                    joined.extend_from_slice(&chunk[..take]);
                    if joined.len() == n {
                        break;
                    }
                }
                joined.freeze()
            }
        };
        self.advance(n);
        Ok(Poll::Ready(bytes))
    }
}
