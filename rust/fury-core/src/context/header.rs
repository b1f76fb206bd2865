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

use crate::bail;
use crate::buffer::{BufferWriter, ByteCursor};
use crate::config::Config;
use crate::error::{Error, PollResult};
use crate::try_ready;
use crate::types::{config_flags, Language, MAGIC_NUMBER};

/// Writes the stream header as one unit.
pub(crate) fn write_header(buf: &mut BufferWriter, config: &Config, is_null: bool) -> Poll<()> {
    let xlang = config.is_xlang();
    let len = if xlang { 2 } else { 0 } + 1 + usize::from(xlang && !is_null);
    if buf.claim(len).is_pending() {
        return Poll::Pending;
    }
    let mut bitmap = config_flags::IS_LITTLE_ENDIAN_FLAG;
    if xlang {
        let _ = buf.write_u16(MAGIC_NUMBER);
        bitmap |= config_flags::IS_CROSS_LANGUAGE_FLAG;
    }
    if is_null {
        bitmap |= config_flags::IS_NULL_FLAG;
    }
    let _ = buf.write_u8(bitmap);
    if xlang && !is_null {
        let _ = buf.write_u8(Language::Rust.into());
    }
    Poll::Ready(())
}

/// Resumable reader for the stream header.
#[derive(Debug, Default)]
pub(crate) struct HeaderReader {
    magic_checked: bool,
    bitmap: Option<u8>,
    language: Option<Language>,
}

impl HeaderReader {
    /// Returns whether the root value is null.
    pub(crate) fn read(&mut self, cursor: &mut ByteCursor, config: &Config) -> PollResult<bool> {
        let xlang = config.is_xlang();
        if xlang && !self.magic_checked {
            let magic = try_ready!(cursor.read_u16());
            if magic != MAGIC_NUMBER {
                bail!("magic number {magic:#06x} does not match {MAGIC_NUMBER:#06x}");
            }
            self.magic_checked = true;
        }
        let bitmap = match self.bitmap {
            Some(bitmap) => bitmap,
            None => {
                let bitmap = try_ready!(cursor.read_u8());
                Self::check_bitmap(bitmap, xlang)?;
                *self.bitmap.insert(bitmap)
            }
        };
        let is_null = bitmap & config_flags::IS_NULL_FLAG != 0;
        if xlang && !is_null && self.language.is_none() {
            let byte = try_ready!(cursor.read_u8());
            let language = Language::try_from(byte)
                .map_err(|_| Error::bad_input(format!("unknown peer language {byte}")))?;
            self.language = Some(language);
        }
        Ok(Poll::Ready(is_null))
    }

    fn check_bitmap(bitmap: u8, xlang: bool) -> Result<(), Error> {
        if bitmap & config_flags::IS_LITTLE_ENDIAN_FLAG == 0 {
            bail!("big endian streams are not supported");
        }
        if (bitmap & config_flags::IS_CROSS_LANGUAGE_FLAG != 0) != xlang {
            bail!("stream cross-language flag disagrees with xlang={xlang}");
        }
        if bitmap & config_flags::IS_OUT_OF_BAND_FLAG != 0 {
            bail!("out-of-band buffers are not supported");
        }
        Ok(())
    }

    /// Whether no header byte of the current message was consumed yet.
    pub(crate) fn is_pristine(&self) -> bool {
        !self.magic_checked && self.bitmap.is_none()
    }

    /// Language byte of the last header, if the stream carried one.
    pub(crate) fn language(&self) -> Option<Language> {
        self.language
    }

    pub(crate) fn reset(&mut self) {
        *self = HeaderReader::default();
    }
}
