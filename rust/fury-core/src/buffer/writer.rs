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

use std::task::Poll;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Bytes, BytesMut};

use crate::varint;

/// Output buffer with an optional soft limit.
///
/// Every write is all-or-nothing. Once the buffered length would exceed the
/// limit a write reports `Poll::Pending` and leaves the buffer untouched; the
/// caller drains it with [`flush`](BufferWriter::flush) and retries. A single
/// write larger than the limit is still accepted into an empty buffer.
#[derive(Default)]
pub struct BufferWriter {
    buf: BytesMut,
    limit: Option<usize>,
    reserved_at: Option<usize>,
    allowance: usize,
    flushed: u64,
}

impl BufferWriter {
    pub fn new(limit: Option<usize>) -> Self {
        BufferWriter {
            buf: BytesMut::with_capacity(limit.unwrap_or(256)),
            limit,
            reserved_at: None,
            allowance: 0,
            flushed: 0,
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.reserved_at = None;
        self.allowance = 0;
        self.flushed = 0;
    }

    /// Bytes written but not yet flushed.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total bytes written so far, flushed or not.
    pub fn position(&self) -> u64 {
        self.flushed + self.buf.len() as u64
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Whether `n` more bytes fit under the limit.
    #[inline(always)]
    pub fn has_room(&self, n: usize) -> bool {
        match self.limit {
            Some(limit) => self.buf.is_empty() || self.buf.len() + n <= limit,
            None => true,
        }
    }

    /// Grants room for the next `n` bytes as a unit, so a sequence of writes
    /// totalling at most `n` cannot suspend halfway.
    pub fn claim(&mut self, n: usize) -> Poll<()> {
        if self.allowance >= n {
            return Poll::Ready(());
        }
        if !self.has_room(n) {
            return Poll::Pending;
        }
        self.allowance = n;
        Poll::Ready(())
    }

    /// Returns a zeroed span of `n` writable bytes, to be committed with
    /// [`advance`](BufferWriter::advance).
    pub fn reserve(&mut self, n: usize) -> Poll<&mut [u8]> {
        if !self.has_room(n) {
            return Poll::Pending;
        }
        let start = self.buf.len();
        self.buf.resize(start + n, 0);
        self.reserved_at = Some(start);
        Poll::Ready(&mut self.buf[start..])
    }

    /// Commits the first `n` bytes of the last reservation and discards the
    /// rest of it.
    pub fn advance(&mut self, n: usize) {
        if let Some(start) = self.reserved_at.take() {
            debug_assert!(start + n <= self.buf.len());
            self.buf.truncate(start + n);
        }
    }

    /// Hands the buffered bytes to the caller.
    pub fn flush(&mut self) -> Bytes {
        self.reserved_at = None;
        self.allowance = 0;
        self.flushed += self.buf.len() as u64;
        self.buf.split().freeze()
    }

    #[inline(always)]
    pub fn write_bytes(&mut self, v: &[u8]) -> Poll<()> {
        if self.allowance >= v.len() {
            self.allowance -= v.len();
        } else if self.has_room(v.len()) {
            self.allowance = 0;
        } else {
            return Poll::Pending;
        }
        self.buf.extend_from_slice(v);
        Poll::Ready(())
    }

    #[inline(always)]
    pub fn write_u8(&mut self, value: u8) -> Poll<()> {
        self.write_bytes(&[value])
    }

    #[inline(always)]
    pub fn write_i8(&mut self, value: i8) -> Poll<()> {
        self.write_u8(value as u8)
    }

    #[inline(always)]
    pub fn write_bool(&mut self, value: bool) -> Poll<()> {
        self.write_u8(value as u8)
    }

    #[inline(always)]
    pub fn write_i16(&mut self, value: i16) -> Poll<()> {
        let mut b = [0u8; 2];
        LittleEndian::write_i16(&mut b, value);
        self.write_bytes(&b)
    }

    #[inline(always)]
    pub fn write_u16(&mut self, value: u16) -> Poll<()> {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, value);
        self.write_bytes(&b)
    }

    #[inline(always)]
    pub fn write_i32(&mut self, value: i32) -> Poll<()> {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, value);
        self.write_bytes(&b)
    }

    #[inline(always)]
    pub fn write_i64(&mut self, value: i64) -> Poll<()> {
        let mut b = [0u8; 8];
        LittleEndian::write_i64(&mut b, value);
        self.write_bytes(&b)
    }

    #[inline(always)]
    pub fn write_u64(&mut self, value: u64) -> Poll<()> {
        let mut b = [0u8; 8];
        LittleEndian::write_u64(&mut b, value);
        self.write_bytes(&b)
    }

    #[inline(always)]
    pub fn write_f32(&mut self, value: f32) -> Poll<()> {
        let mut b = [0u8; 4];
        LittleEndian::write_f32(&mut b, value);
        self.write_bytes(&b)
    }

    #[inline(always)]
    pub fn write_f64(&mut self, value: f64) -> Poll<()> {
        let mut b = [0u8; 8];
        LittleEndian::write_f64(&mut b, value);
        self.write_bytes(&b)
    }

    #[inline(always)]
    pub fn write_varuint32(&mut self, value: u32) -> Poll<()> {
        let mut b = [0u8; varint::MAX_VARUINT32_BYTES];
        let n = varint::encode_varuint32(value, &mut b);
        self.write_bytes(&b[..n])
    }

    #[inline(always)]
    pub fn write_varint32(&mut self, value: i32) -> Poll<()> {
        self.write_varuint32(varint::zigzag_encode32(value))
    }

    #[inline(always)]
    pub fn write_varuint64(&mut self, value: u64) -> Poll<()> {
        let mut b = [0u8; varint::MAX_VARUINT64_BYTES];
        let n = varint::encode_varuint64(value, &mut b);
        self.write_bytes(&b[..n])
    }

    #[inline(always)]
    pub fn write_varint64(&mut self, value: i64) -> Poll<()> {
        self.write_varuint64(varint::zigzag_encode64(value))
    }
}
