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
use std::task::Poll;

use crate::bail;
use crate::context::{DeserializationReader, SerializationWriter};
use crate::error::{Error, PollResult};
use crate::serializer::{downcast_value, Deserializer, Serializer, Value};
use crate::try_ready;
use crate::varint::{varuint32_len, varuint64_len};

enum StrEncoding {
    Latin1 = 0,
    Utf16 = 1,
    Utf8 = 2,
}

/// `String` payload: varuint64 header `(byte_len << 2) | encoding`, then the
/// bytes. Always written as UTF-8; Latin-1 and UTF-16 are accepted on read.
#[derive(Debug, Default)]
pub struct StringCodec {
    header: Option<u64>,
}

impl Serializer for StringCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let s = downcast_value::<String>(value)?;
        let header = ((s.len() as u64) << 2) | StrEncoding::Utf8 as u64;
        try_ready!(writer.claim(varuint64_len(header) + s.len()));
        try_ready!(writer.write_varuint64(header));
        writer.write_bytes(s.as_bytes())
    }
}

impl Deserializer for StringCodec {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        let header = match self.header {
            Some(header) => header,
            None => *self.header.insert(try_ready!(reader.read_varuint64())),
        };
        let len = usize::try_from(header >> 2)
            .map_err(|_| Error::bad_input(format!("string length {} too large", header >> 2)))?;
        let bytes = try_ready!(reader.read_bytes(len));
        self.header = None;
        let s = match header & 0b11 {
            e if e == StrEncoding::Latin1 as u64 => bytes.iter().map(|&b| b as char).collect(),
            e if e == StrEncoding::Utf16 as u64 => {
                if len % 2 != 0 {
                    bail!("utf-16 string has odd byte length {len}");
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units)
                    .map_err(|e| Error::bad_input(format!("invalid utf-16 string: {e}")))?
            }
            e if e == StrEncoding::Utf8 as u64 => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::bad_input(format!("invalid utf-8 string: {e}")))?,
            other => bail!("unknown string encoding {other}"),
        };
        Ok(Poll::Ready(Box::new(s)))
    }

    fn reset(&mut self) {
        self.header = None;
    }
}

/// `Vec<u8>` payload: varuint32 length, then the bytes.
#[derive(Debug, Default)]
pub struct BinaryCodec {
    len: Option<u32>,
}

impl Serializer for BinaryCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let bytes = downcast_value::<Vec<u8>>(value)?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::encode_error(format!("binary of {} bytes", bytes.len())))?;
        try_ready!(writer.claim(varuint32_len(len) + bytes.len()));
        try_ready!(writer.write_varuint32(len));
        writer.write_bytes(bytes)
    }
}

impl Deserializer for BinaryCodec {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        let len = match self.len {
            Some(len) => len,
            None => *self.len.insert(try_ready!(reader.read_varuint32())),
        };
        let bytes = try_ready!(reader.read_bytes(len as usize));
        self.len = None;
        Ok(Poll::Ready(Box::new(bytes.to_vec())))
    }

    fn reset(&mut self) {
        self.len = None;
    }
}
