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
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::bail;
use crate::context::{DeserializationReader, SerializationWriter};
use crate::error::{Error, PollResult};
use crate::serializer::{downcast_value, Deserializer, Serializer, Value};
use crate::try_ready;
use crate::util::EPOCH;
use crate::varint::varuint64_len;

/// `NaiveDate` as days since the Unix epoch, i32.
#[derive(Debug, Default)]
pub struct NaiveDateCodec;

impl Serializer for NaiveDateCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let date = downcast_value::<NaiveDate>(value)?;
        let days = date.signed_duration_since(EPOCH).num_days();
        let days = i32::try_from(days)
            .map_err(|_| Error::encode_error(format!("date {date} out of range")))?;
        writer.write_i32(days)
    }
}

impl Deserializer for NaiveDateCodec {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        let days = try_ready!(reader.read_i32());
        let date = EPOCH
            .checked_add_signed(TimeDelta::days(days as i64))
            .ok_or_else(|| Error::bad_input(format!("date {days} days from epoch out of range")))?;
        Ok(Poll::Ready(Box::new(date)))
    }
}

/// `NaiveDateTime` as microseconds since the Unix epoch, i64.
#[derive(Debug, Default)]
pub struct NaiveDateTimeCodec;

impl Serializer for NaiveDateTimeCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let dt = downcast_value::<NaiveDateTime>(value)?.and_utc();
        let micros = dt.timestamp() * 1_000_000 + dt.timestamp_subsec_micros() as i64;
        writer.write_i64(micros)
    }
}

impl Deserializer for NaiveDateTimeCodec {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        let micros = try_ready!(reader.read_i64());
        let dt = chrono::DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| Error::bad_input(format!("timestamp {micros}us out of range")))?
            .naive_utc();
        Ok(Poll::Ready(Box::new(dt)))
    }
}

/// `std::time::Duration` as seconds (varint64) and nanoseconds (i32).
#[derive(Debug, Default)]
pub struct DurationCodec {
    secs: Option<i64>,
}

impl Serializer for DurationCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let duration = downcast_value::<Duration>(value)?;
        let secs = i64::try_from(duration.as_secs())
            .map_err(|_| Error::encode_error(format!("duration {duration:?} out of range")))?;
        let zigzag = crate::varint::zigzag_encode64(secs);
        try_ready!(writer.claim(varuint64_len(zigzag) + 4));
        try_ready!(writer.write_varint64(secs));
        writer.write_i32(duration.subsec_nanos() as i32)
    }
}

impl Deserializer for DurationCodec {
    fn create_instance(&mut self, reader: &mut DeserializationReader) -> PollResult<Value> {
        let secs = match self.secs {
            Some(secs) => secs,
            None => *self.secs.insert(try_ready!(reader.read_varint64())),
        };
        let nanos = try_ready!(reader.read_i32());
        self.secs = None;
        let secs = u64::try_from(secs)
            .map_err(|_| Error::bad_input(format!("negative duration of {secs}s")))?;
        if !(0..1_000_000_000).contains(&nanos) {
            bail!("duration nanos {nanos} out of range");
        }
        Ok(Poll::Ready(Box::new(Duration::new(secs, nanos as u32))))
    }

    fn reset(&mut self) {
        self.secs = None;
    }
}
