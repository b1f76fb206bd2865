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

use fury_core::error::Error;
use fury_core::fury::Fury;
use fury_core::util::Cancellation;
use tokio::io::{duplex, AsyncWriteExt};

fn words() -> Vec<String> {
    (0..16).map(|i| format!("async-{i}")).collect()
}

#[tokio::test]
async fn test_round_trip_over_duplex() {
    let fury = Fury::default()
        .read_chunk_size(3)
        .write_buffer_limit(Some(8));
    let value = words();
    let (mut client, mut server) = duplex(16);

    let (written, read) = tokio::join!(
        fury.serialize_async(&value, &mut client),
        fury.deserialize_async::<Vec<String>, _>(&mut server),
    );
    written.unwrap();
    assert_eq!(read.unwrap(), value);
}

#[tokio::test]
async fn test_dropped_read_resets_session() {
    let fury = Fury::default();
    let value = words();
    let bytes = fury.serialize(&value).unwrap();
    let (mut client, mut server) = duplex(1024);
    let mut reader = fury.reader();

    client.write_all(&bytes[..5]).await.unwrap();
    tokio::select! {
        biased;
        _ = reader.read_from_async::<Vec<String>, _>(&mut server) => {
            panic!("five bytes cannot complete the message")
        }
        _ = tokio::task::yield_now() => {}
    }
    assert!(reader.is_idle());
    assert!(!reader.is_aborted());
    assert_eq!(reader.cursor().buffered(), 0);

    client.write_all(&bytes).await.unwrap();
    let back = reader
        .read_from_async::<Vec<String>, _>(&mut server)
        .await
        .unwrap();
    assert_eq!(back, value);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_input() {
    let fury = Fury::default();
    let bytes = fury.serialize(&words()).unwrap();
    let (mut client, mut server) = duplex(1024);
    let token = Cancellation::new();
    let mut reader = fury.reader().with_cancellation(token.clone());

    let feeder = async {
        client.write_all(&bytes[..4]).await.unwrap();
        tokio::task::yield_now().await;
        token.cancel();
        client.write_all(&bytes[4..]).await.unwrap();
    };
    let (read, ()) = tokio::join!(
        reader.read_from_async::<Vec<String>, _>(&mut server),
        feeder
    );
    assert!(matches!(read, Err(Error::Cancelled)));
    assert!(reader.is_aborted());
}

#[tokio::test]
async fn test_eof_mid_message() {
    let fury = Fury::default();
    let bytes = fury.serialize(&words()).unwrap();
    let (mut client, mut server) = duplex(1024);
    client.write_all(&bytes[..bytes.len() / 2]).await.unwrap();
    drop(client);

    let mut reader = fury.reader();
    let err = reader
        .read_from_async::<Vec<String>, _>(&mut server)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "{err}");
    assert!(reader.is_aborted());
}
