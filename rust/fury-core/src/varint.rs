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

//! 7-bit variable-length integers.
//!
//! Unsigned values are written seven low bits at a time, least significant
//! group first, with the high bit set on every byte but the last. Signed
//! values are zigzag mapped first. A 32-bit value takes at most 5 bytes and a
//! 64-bit value at most 9: the ninth byte carries a full 8 bits.
//!
//! Decoding has two paths. The fast path works on one contiguous slice and
//! gives up (`consumed == 0`) unless the slice holds the maximum encoded
//! length. The slow path walks bytes one at a time from any iterator, which
//! lets a value straddle chunk boundaries.

use crate::error::Error;

pub const MAX_VARUINT32_BYTES: usize = 5;
pub const MAX_VARUINT64_BYTES: usize = 9;

#[inline(always)]
pub fn zigzag_encode32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

#[inline(always)]
pub fn zigzag_decode32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

#[inline(always)]
pub fn zigzag_encode64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline(always)]
pub fn zigzag_decode64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Number of bytes `value` occupies on the wire.
#[inline(always)]
pub fn varuint32_len(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

#[inline(always)]
pub fn varuint64_len(value: u64) -> usize {
    if value >> 56 != 0 {
        return MAX_VARUINT64_BYTES;
    }
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Encodes `value` into `out`, returning the number of bytes used.
#[inline(always)]
pub fn encode_varuint32(mut value: u32, out: &mut [u8; MAX_VARUINT32_BYTES]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        out[i] = (value as u8 & 0x7f) | 0x80;
        value >>= 7;
        i += 1;
    }
    out[i] = value as u8;
    i + 1
}

#[inline(always)]
pub fn encode_varuint64(mut value: u64, out: &mut [u8; MAX_VARUINT64_BYTES]) -> usize {
    let mut i = 0;
    while value >= 0x80 && i < MAX_VARUINT64_BYTES - 1 {
        out[i] = (value as u8 & 0x7f) | 0x80;
        value >>= 7;
        i += 1;
    }
    // The ninth byte holds the remaining 8 bits verbatim.
    out[i] = value as u8;
    i + 1
}

#[cold]
fn overflow32(fifth: u8) -> Error {
    Error::bad_input(format!(
        "varuint32 overflow: fifth byte {fifth:#04x} has more than 4 significant bits"
    ))
}

/// Decodes a varuint32 from a contiguous slice.
///
/// Returns `(value, consumed)`; `consumed == 0` means the slice is shorter
/// than [`MAX_VARUINT32_BYTES`] and the caller must use
/// [`decode_varuint32_slow`].
#[inline(always)]
pub fn decode_varuint32_fast(buf: &[u8]) -> Result<(u32, usize), Error> {
    if buf.len() < MAX_VARUINT32_BYTES {
        return Ok((0, 0));
    }
    let b0 = buf[0] as u32;
    if b0 < 0x80 {
        return Ok((b0, 1));
    }
    let mut encoded = b0 & 0x7f;
    let b1 = buf[1] as u32;
    encoded |= (b1 & 0x7f) << 7;
    if b1 < 0x80 {
        return Ok((encoded, 2));
    }
    let b2 = buf[2] as u32;
    encoded |= (b2 & 0x7f) << 14;
    if b2 < 0x80 {
        return Ok((encoded, 3));
    }
    let b3 = buf[3] as u32;
    encoded |= (b3 & 0x7f) << 21;
    if b3 < 0x80 {
        return Ok((encoded, 4));
    }
    let b4 = buf[4];
    if b4 > 0x0f {
        return Err(overflow32(b4));
    }
    encoded |= (b4 as u32) << 28;
    Ok((encoded, 5))
}

/// Decodes a varuint64 from a contiguous slice; see [`decode_varuint32_fast`].
#[inline(always)]
pub fn decode_varuint64_fast(buf: &[u8]) -> (u64, usize) {
    if buf.len() < MAX_VARUINT64_BYTES {
        return (0, 0);
    }
    let mut result = 0u64;
    for (i, &b) in buf[..MAX_VARUINT64_BYTES - 1].iter().enumerate() {
        result |= ((b & 0x7f) as u64) << (7 * i);
        if b < 0x80 {
            return (result, i + 1);
        }
    }
    result |= (buf[MAX_VARUINT64_BYTES - 1] as u64) << 56;
    (result, MAX_VARUINT64_BYTES)
}

/// Decodes a varuint32 byte by byte.
///
/// Returns `Ok(None)` when the iterator ends before the value does.
pub fn decode_varuint32_slow<I>(bytes: I) -> Result<Option<(u32, usize)>, Error>
where
    I: IntoIterator<Item = u8>,
{
    let mut result = 0u32;
    for (i, b) in bytes.into_iter().take(MAX_VARUINT32_BYTES).enumerate() {
        if i == MAX_VARUINT32_BYTES - 1 {
            if b > 0x0f {
                return Err(overflow32(b));
            }
            result |= (b as u32) << 28;
            return Ok(Some((result, MAX_VARUINT32_BYTES)));
        }
        result |= ((b & 0x7f) as u32) << (7 * i);
        if b < 0x80 {
            return Ok(Some((result, i + 1)));
        }
    }
    Ok(None)
}

/// Decodes a varuint64 byte by byte. The ninth byte is taken whole, so no
/// overflow is possible.
pub fn decode_varuint64_slow<I>(bytes: I) -> Option<(u64, usize)>
where
    I: IntoIterator<Item = u8>,
{
    let mut result = 0u64;
    for (i, b) in bytes.into_iter().take(MAX_VARUINT64_BYTES).enumerate() {
        if i == MAX_VARUINT64_BYTES - 1 {
            result |= (b as u64) << 56;
            return Some((result, MAX_VARUINT64_BYTES));
        }
        result |= ((b & 0x7f) as u64) << (7 * i);
        if b < 0x80 {
            return Some((result, i + 1));
        }
    }
    None
}
