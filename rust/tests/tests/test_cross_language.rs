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

use fury_core::error::Error;
use fury_core::fury::Fury;
use fury_core::serializer::Value;
use fury_core::types::Language;

#[test]
fn test_xlang_header() {
    let fury = Fury::default().xlang(true);
    let bytes = fury.serialize(&42i32).unwrap();
    assert_eq!(bytes, [0xd4, 0x62, 0x06, 0x06, 0xff, 0x05, 0x54]);
    assert_eq!(fury.deserialize::<i32>(&bytes).unwrap(), 42);

    let native = Fury::default();
    assert_eq!(native.serialize(&42i32).unwrap(), [0x02, 0xff, 0x05, 0x54]);
    assert!(matches!(native.deserialize::<i32>(&bytes), Err(Error::BadInput(_))));
    assert!(matches!(
        fury.deserialize::<i32>(&[0x02, 0xff, 0x05, 0x54]),
        Err(Error::BadInput(_))
    ));

    let mut bad_magic = bytes.clone();
    bad_magic[0] = 0xd5;
    assert!(matches!(fury.deserialize::<i32>(&bad_magic), Err(Error::BadInput(_))));
}

#[test]
fn test_null_root() {
    let native = Fury::default();
    let mut writer = native.writer();
    assert_eq!(writer.write_option::<String>(None).unwrap(), Poll::Ready(()));
    assert_eq!(writer.flush().as_ref(), [0x03]);
    assert!(native.deserialize_any(&[0x03]).unwrap().is_none());
    assert!(matches!(native.deserialize::<String>(&[0x03]), Err(Error::TypeError(_))));

    let mut reader = native.reader();
    reader.feed(vec![0x03]);
    assert_eq!(reader.read_option::<String>().unwrap(), Poll::Ready(None));

    let xlang = Fury::default().xlang(true);
    let mut writer = xlang.writer();
    assert!(writer.write_option::<String>(None).unwrap().is_ready());
    assert_eq!(writer.flush().as_ref(), [0xd4, 0x62, 0x07]);
}

#[test]
fn test_peer_language() {
    let fury = Fury::default().xlang(true);
    let mut reader = fury.reader();
    assert_eq!(reader.peer_language(), None);
    reader.feed(vec![0xd4, 0x62, 0x06, 0x01, 0xff, 0x05, 0x54]);
    assert_eq!(reader.read::<i32>().unwrap(), Poll::Ready(42));
    assert_eq!(reader.peer_language(), Some(Language::Java));

    reader.feed(vec![0xd4, 0x62, 0x06, 0x63]);
    assert!(matches!(reader.read::<i32>(), Err(Error::BadInput(_))));
}

#[test]
fn test_read_any() {
    let fury = Fury::default().xlang(true);
    let bytes = fury.serialize(&"hello".to_string()).unwrap();
    let value = fury.deserialize_any(&bytes).unwrap().unwrap();
    assert_eq!(value.downcast_ref::<String>().unwrap(), "hello");

    let bytes = fury.serialize(&vec![1i32, -2, 3]).unwrap();
    let value = fury.deserialize_any(&bytes).unwrap().unwrap();
    let list = value.downcast_ref::<Vec<Value>>().unwrap();
    let numbers: Vec<i32> = list
        .iter()
        .map(|v| *v.downcast_ref::<i32>().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, -2, 3]);
}

#[test]
fn test_heterogeneous_list() {
    let fury = Fury::default().xlang(true);
    let values: Vec<Value> = vec![
        Box::new(7i32),
        Box::new("mixed".to_string()),
        Box::new(2.5f64),
        Box::new(true),
        Box::new(vec![1i64, 2]),
    ];
    let bytes = fury.serialize(&values).unwrap();
    let back = fury.deserialize::<Vec<Value>>(&bytes).unwrap();
    assert_eq!(back.len(), values.len());
    assert_eq!(back[0].downcast_ref::<i32>(), Some(&7));
    assert_eq!(back[1].downcast_ref::<String>().unwrap(), "mixed");
    assert_eq!(back[2].downcast_ref::<f64>(), Some(&2.5));
    assert_eq!(back[3].downcast_ref::<bool>(), Some(&true));
    let nested = back[4].downcast_ref::<Vec<Value>>().unwrap();
    assert_eq!(nested[1].downcast_ref::<i64>(), Some(&2));
}
