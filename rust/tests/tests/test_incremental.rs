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

mod test_helpers;

use std::sync::atomic::Ordering;
use std::task::Poll;

use fury_core::error::Error;
use fury_core::fury::Fury;
use fury_core::resolver::type_resolver::TypeRegistration;
use fury_core::util::Cancellation;
use test_helpers::{decode_in_chunks, init_tracing, Counted, CountedCodec, COUNTED_CREATED};

#[test]
fn test_every_chunk_size() {
    init_tracing();
    let fury = Fury::default();
    let numbers: Vec<i64> = vec![0, -1, 1 << 40, i64::MIN, i64::MAX, 300];
    let text = "incremental decoding of a string spanning chunks".to_string();
    let words: Vec<String> = vec!["alpha".into(), String::new(), "γάμμα".into()];

    let bytes = fury.serialize(&numbers).unwrap();
    for chunk in 1..=bytes.len() {
        assert_eq!(decode_in_chunks::<Vec<i64>>(&fury, &bytes, chunk), numbers);
    }
    let bytes = fury.serialize(&text).unwrap();
    for chunk in 1..=bytes.len() {
        assert_eq!(decode_in_chunks::<String>(&fury, &bytes, chunk), text);
    }
    let bytes = fury.serialize(&words).unwrap();
    for chunk in 1..=bytes.len() {
        assert_eq!(decode_in_chunks::<Vec<String>>(&fury, &bytes, chunk), words);
    }
}

#[test]
fn test_suspension_does_not_recreate_values() {
    let fury = Fury::default();
    fury.register(
        TypeRegistration::builder::<Counted>()
            .id(30)
            .codec::<CountedCodec>(),
    )
    .unwrap();
    fury.register_list::<Counted>().unwrap();
    let values: Vec<Counted> = (0..5).map(|i| Counted(i * 1_000_003)).collect();
    let bytes = fury.serialize(&values).unwrap();

    let before = COUNTED_CREATED.load(Ordering::SeqCst);
    let back: Vec<Counted> = decode_in_chunks(&fury, &bytes, 1);
    assert_eq!(back, values);
    assert_eq!(COUNTED_CREATED.load(Ordering::SeqCst) - before, values.len());
}

#[test]
fn test_write_limit_suspends_and_resumes() {
    let words: Vec<String> = (0..20).map(|i| format!("word-{i}")).collect();
    let expected = Fury::default().serialize(&words).unwrap();

    let fury = Fury::default().write_buffer_limit(Some(8));
    let mut writer = fury.writer();
    let mut out = Vec::new();
    let mut suspensions = 0;
    loop {
        let status = writer.write(&words).unwrap();
        assert!(writer.buffer().len() <= 8);
        out.extend_from_slice(&writer.flush());
        match status {
            Poll::Ready(()) => break,
            Poll::Pending => suspensions += 1,
        }
    }
    assert!(suspensions > 0);
    assert!(writer.is_idle());
    assert_eq!(out, expected);
}

#[test]
fn test_messages_share_one_stream() {
    let fury = Fury::default();
    let mut stream = fury.serialize(&"first".to_string()).unwrap();
    stream.extend(fury.serialize(&vec![1i32, 2, 3]).unwrap());
    stream.extend(fury.serialize(&"third".to_string()).unwrap());

    let mut reader = fury.reader();
    let mut input = stream.chunks(2);
    let mut next = |reader: &mut fury_core::context::DeserializationReader| match input.next() {
        Some(c) => reader.feed(c.to_vec()),
        None => reader.finish(),
    };
    let first = loop {
        match reader.read::<String>().unwrap() {
            Poll::Ready(v) => break v,
            Poll::Pending => next(&mut reader),
        }
    };
    let second = loop {
        match reader.read::<Vec<i32>>().unwrap() {
            Poll::Ready(v) => break v,
            Poll::Pending => next(&mut reader),
        }
    };
    let third = loop {
        match reader.read::<String>().unwrap() {
            Poll::Ready(v) => break v,
            Poll::Pending => next(&mut reader),
        }
    };
    assert_eq!(first, "first");
    assert_eq!(second, vec![1, 2, 3]);
    assert_eq!(third, "third");
    assert_eq!(reader.cursor().buffered(), 0);
}

#[test]
fn test_truncated_input_aborts_until_reset() {
    let fury = Fury::default();
    let value: Vec<String> = vec!["truncated".into(), "input".into()];
    let bytes = fury.serialize(&value).unwrap();

    let mut reader = fury.reader();
    reader.feed(bytes[..bytes.len() - 3].to_vec());
    assert!(reader.read::<Vec<String>>().unwrap().is_pending());
    reader.finish();
    assert!(matches!(reader.read::<Vec<String>>(), Err(Error::BadInput(_))));
    assert!(reader.is_aborted());
    assert!(reader.is_idle());
    assert!(matches!(reader.read::<Vec<String>>(), Err(Error::InvalidState(_))));

    reader.reset();
    reader.feed(bytes);
    assert_eq!(reader.read::<Vec<String>>().unwrap(), Poll::Ready(value));
}

#[test]
fn test_max_depth() {
    let fury = Fury::default();
    fury.register_list::<Vec<i32>>().unwrap();
    let nested = vec![vec![1i32, 2], vec![3]];
    let bytes = fury.serialize(&nested).unwrap();

    let shallow = fury.clone().max_depth(2);
    assert!(matches!(shallow.serialize(&nested), Err(Error::EncodeError(_))));
    assert!(matches!(
        shallow.deserialize::<Vec<Vec<i32>>>(&bytes),
        Err(Error::BadInput(_))
    ));
    // Depth counts nested values actually present.
    let empty: Vec<Vec<i32>> = vec![vec![]];
    let bytes = shallow.serialize(&empty).unwrap();
    assert_eq!(shallow.deserialize::<Vec<Vec<i32>>>(&bytes).unwrap(), empty);

    let exact = fury.clone().max_depth(3);
    let bytes = exact.serialize(&nested).unwrap();
    assert_eq!(exact.deserialize::<Vec<Vec<i32>>>(&bytes).unwrap(), nested);
}

#[test]
fn test_malformed_headers() {
    let fury = Fury::default();
    // Unknown user id 99 of kind STRUCT.
    let unknown_tag = [0x02, 0xff, 0x8f, 0xc6, 0x01];
    assert!(matches!(fury.deserialize_any(&unknown_tag), Err(Error::BadInput(_))));

    let invalid_flag = [0x02, 0x10];
    assert!(matches!(fury.deserialize_any(&invalid_flag), Err(Error::BadInput(_))));

    let invalid_kind = [0x02, 0xff, 0x7f];
    assert!(matches!(fury.deserialize_any(&invalid_kind), Err(Error::BadInput(_))));

    let string = fury.serialize(&"text".to_string()).unwrap();
    let err = fury.deserialize::<i64>(&string).unwrap_err();
    assert!(matches!(err, Error::TypeError(_)), "{err}");
    assert!(err.to_string().contains("i64"));
}

#[test]
fn test_failed_nested_read_unwinds_frame() {
    let fury = Fury::default().max_depth(1);
    let mut reader = fury.reader();
    reader.feed(vec![0x10]);
    let err = reader.read_value_any().unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "{err}");
    // Only message reads abort the session; a nested read leaves it usable.
    assert!(!reader.is_aborted());
    assert!(reader.is_idle());

    // A leftover frame would push this root past the depth limit.
    reader.feed(fury.serialize(&42i32).unwrap());
    reader.finish();
    assert_eq!(reader.read::<i32>().unwrap(), Poll::Ready(42));
}

#[test]
fn test_cancellation_aborts_session() {
    let fury = Fury::default();
    let value: Vec<i64> = (0..64).collect();
    let bytes = fury.serialize(&value).unwrap();

    let token = Cancellation::new();
    let mut reader = fury.reader().with_cancellation(token.clone());
    reader.feed(bytes[..10].to_vec());
    assert!(reader.read::<Vec<i64>>().unwrap().is_pending());
    assert!(token.cancel());
    assert!(matches!(reader.read::<Vec<i64>>(), Err(Error::Cancelled)));
    assert!(reader.is_aborted());
    assert!(matches!(reader.read::<Vec<i64>>(), Err(Error::InvalidState(_))));

    // The token stays cancelled across a reset.
    reader.reset();
    assert!(matches!(reader.read::<Vec<i64>>(), Err(Error::Cancelled)));
    reader.reset();
    reader.set_cancellation(Cancellation::new());
    reader.feed(bytes);
    assert_eq!(reader.read::<Vec<i64>>().unwrap(), Poll::Ready(value));

    let token = Cancellation::new();
    token.cancel();
    let mut writer = fury.writer().with_cancellation(token);
    assert!(matches!(writer.write(&1i64), Err(Error::Cancelled)));
    assert!(writer.is_aborted());
    assert!(writer.buffer().is_empty());
}
