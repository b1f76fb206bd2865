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

use std::collections::HashMap;
use std::sync::Arc;
use std::task::Poll;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::RwLock;
use tracing::warn;

use crate::bail;
use crate::buffer::{BufferWriter, ByteCursor};
use crate::error::{Error, PollResult};
use crate::meta::{
    meta_string_hash, Encoding, EncodingPolicy, MetaString, SMALL_STRING_THRESHOLD,
};
use crate::try_ready;
use crate::varint::varuint32_len;

type SmallKey = (EncodingPolicy, Encoding, usize, u64, u64);

/// Process-wide intern table for meta strings, shared by every session of a
/// registry.
///
/// Encoded strings are cached by their original text, decoded strings by
/// content: big strings by hash, small strings by their packed bytes.
#[derive(Default)]
pub struct MetaStringTable {
    encoded: RwLock<HashMap<(EncodingPolicy, String), Arc<MetaString>>>,
    big: RwLock<HashMap<(EncodingPolicy, i64), Arc<MetaString>>>,
    small: RwLock<HashMap<SmallKey, Arc<MetaString>>>,
}

impl MetaStringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `input` under `policy`, reusing the cached result if any.
    pub fn encode(&self, policy: EncodingPolicy, input: &str) -> Result<Arc<MetaString>, Error> {
        if let Some(ms) = self.encoded.read().get(&(policy, input.to_string())) {
            return Ok(ms.clone());
        }
        let ms = Arc::new(policy.encoder().encode(input)?);
        Ok(self
            .encoded
            .write()
            .entry((policy, input.to_string()))
            .or_insert(ms)
            .clone())
    }

    /// Resolves a hash-addressed string. The hash is always recomputed from
    /// `bytes`, cached or not.
    pub fn decode_big(
        &self,
        policy: EncodingPolicy,
        claimed_hash: i64,
        bytes: &[u8],
    ) -> Result<Arc<MetaString>, Error> {
        let encoding = Encoding::try_from((claimed_hash & 0xff) as u8).map_err(|_| {
            Error::bad_input(format!(
                "unknown meta string encoding in hash {claimed_hash:#x}"
            ))
        })?;
        let actual = meta_string_hash(bytes, encoding);
        if actual != claimed_hash {
            warn!(claimed = claimed_hash, actual, "meta string hash mismatch");
            bail!("meta string hash mismatch: claimed {claimed_hash:#x}, computed {actual:#x}");
        }
        if let Some(ms) = self.big.read().get(&(policy, claimed_hash)) {
            if ms.bytes == bytes {
                return Ok(ms.clone());
            }
        }
        let ms = Arc::new(policy.decoder().decode(bytes, encoding)?);
        self.big.write().insert((policy, claimed_hash), ms.clone());
        Ok(ms)
    }

    /// Resolves a string short enough to be keyed by its bytes.
    pub fn decode_small(
        &self,
        policy: EncodingPolicy,
        encoding: Encoding,
        bytes: &[u8],
    ) -> Result<Arc<MetaString>, Error> {
        debug_assert!(bytes.len() <= SMALL_STRING_THRESHOLD);
        let mut padded = [0u8; SMALL_STRING_THRESHOLD];
        padded[..bytes.len()].copy_from_slice(bytes);
        let key = (
            policy,
            encoding,
            bytes.len(),
            LittleEndian::read_u64(&padded[..8]),
            LittleEndian::read_u64(&padded[8..]),
        );
        if let Some(ms) = self.small.read().get(&key) {
            return Ok(ms.clone());
        }
        let ms = Arc::new(policy.decoder().decode(bytes, encoding)?);
        Ok(self.small.write().entry(key).or_insert(ms).clone())
    }
}

/// Per-session record of which meta strings were already written, keyed to
/// their dynamic id.
#[derive(Default)]
pub struct MetaStringWriter {
    written: HashMap<Arc<MetaString>, u32>,
}

impl MetaStringWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes [`write`](MetaStringWriter::write) will emit for `ms` now.
    pub fn encoded_len(&self, ms: &MetaString) -> usize {
        match self.written.get(ms) {
            Some(&id) => varuint32_len(((id + 1) << 1) | 1),
            None => {
                let len = ms.bytes.len();
                let extra = if ms.is_big() { 8 } else { 1 };
                varuint32_len((len as u32) << 1) + extra + len
            }
        }
    }

    /// Writes `ms` in full on first use in this session and as a dynamic id
    /// back-reference afterwards. The id is assigned only once the full form
    /// was accepted by the buffer.
    pub fn write(&mut self, buf: &mut BufferWriter, ms: &Arc<MetaString>) -> Poll<()> {
        if let Some(&id) = self.written.get(ms.as_ref()) {
            return buf.write_varuint32(((id + 1) << 1) | 1);
        }
        if buf.claim(self.encoded_len(ms)).is_pending() {
            return Poll::Pending;
        }
        let len = ms.bytes.len();
        let _ = buf.write_varuint32((len as u32) << 1);
        if ms.is_big() {
            let _ = buf.write_i64(ms.hash);
        } else {
            let _ = buf.write_u8(ms.encoding.into());
        }
        let _ = buf.write_bytes(&ms.bytes);
        let id = self.written.len() as u32;
        self.written.insert(ms.clone(), id);
        Poll::Ready(())
    }

    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }

    pub fn reset(&mut self) {
        self.written.clear();
    }
}

#[derive(Default)]
struct Partial {
    header: Option<u32>,
    hash: Option<i64>,
    encoding: Option<Encoding>,
}

/// Per-session list of meta strings read so far, indexed by dynamic id.
///
/// Reading one string takes up to three cursor reads; the progress made
/// before a suspension is kept so a resumed read continues where it stopped.
#[derive(Default)]
pub struct MetaStringReader {
    strings: Vec<Arc<MetaString>>,
    partial: Partial,
}

impl MetaStringReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(
        &mut self,
        cursor: &mut ByteCursor,
        table: &MetaStringTable,
        policy: EncodingPolicy,
    ) -> PollResult<Arc<MetaString>> {
        let header = match self.partial.header {
            Some(header) => header,
            None => {
                let header = try_ready!(cursor.read_varuint32());
                self.partial.header = Some(header);
                header
            }
        };
        if header & 1 == 1 {
            self.partial = Partial::default();
            let id = (header >> 1) as usize;
            return match id.checked_sub(1).and_then(|idx| self.strings.get(idx)) {
                Some(ms) => Ok(Poll::Ready(ms.clone())),
                None => Err(Error::bad_input(format!(
                    "meta string dynamic id {id} not found, {} known",
                    self.strings.len()
                ))),
            };
        }
        let len = (header >> 1) as usize;
        if len > SMALL_STRING_THRESHOLD {
            if self.partial.hash.is_none() {
                self.partial.hash = Some(try_ready!(cursor.read_i64()));
            }
        } else if self.partial.encoding.is_none() {
            let byte = try_ready!(cursor.read_u8());
            let encoding = Encoding::try_from(byte)
                .map_err(|_| Error::bad_input(format!("unknown meta string encoding {byte}")))?;
            self.partial.encoding = Some(encoding);
        }
        let bytes = try_ready!(cursor.read_bytes(len));
        let partial = std::mem::take(&mut self.partial);
        let ms = match (partial.hash, partial.encoding) {
            (Some(hash), _) => table.decode_big(policy, hash, &bytes)?,
            (None, Some(encoding)) => table.decode_small(policy, encoding, &bytes)?,
            (None, None) => {
                return Err(Error::invalid_state(
                    "meta string header read without encoding or hash",
                ))
            }
        };
        self.strings.push(ms.clone());
        Ok(Poll::Ready(ms))
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn reset(&mut self) {
        self.strings.clear();
        self.partial = Partial::default();
    }
}
