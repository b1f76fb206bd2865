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
use std::sync::{Arc, Barrier};
use std::task::Poll;
use std::thread;
use std::time::Duration;

use fury_core::context::{DeserializationReader, SerializationWriter};
use fury_core::error::{Error, PollResult};
use fury_core::fury::Fury;
use fury_core::resolver::type_resolver::{SizeHint, TypeRegistration};
use fury_core::serializer::{Deserializer, Serializer, Value};
use fury_core::try_ready;
use fury_core::types::TypeKind;

macro_rules! f64_newtype {
    ($name:ident, $codec:ident) => {
        #[derive(Debug, PartialEq)]
        struct $name(f64);

        #[derive(Default)]
        struct $codec;

        impl Serializer for $codec {
            fn write_data(
                &mut self,
                writer: &mut SerializationWriter,
                value: &dyn Any,
            ) -> PollResult<()> {
                writer.write_f64(fury_core::serializer::downcast_value::<$name>(value)?.0)
            }
        }

        impl Deserializer for $codec {
            fn create_instance(
                &mut self,
                reader: &mut DeserializationReader,
            ) -> PollResult<Value> {
                let v = try_ready!(reader.read_f64());
                Ok(Poll::Ready(Box::new($name(v))))
            }
        }
    };
}

f64_newtype!(Meters, MetersCodec);
f64_newtype!(Seconds, SecondsCodec);
f64_newtype!(Grams, GramsCodec);

fn meters() -> fury_core::resolver::type_resolver::TypeRegistrationBuilder<Meters> {
    TypeRegistration::builder::<Meters>()
        .size_hint(SizeHint::Fixed(8))
        .codec::<MetersCodec>()
}

fn is_registration_error<T: std::fmt::Debug>(result: Result<T, Error>) -> bool {
    matches!(result, Err(Error::Registration(_)))
}

#[test]
fn test_invalid_registrations() {
    let fury = Fury::default();
    fury.register(meters().id(5)).unwrap();
    assert!(is_registration_error(fury.register(meters().id(6))));

    assert!(is_registration_error(
        fury.register(
            TypeRegistration::builder::<Seconds>()
                .id(9)
                .name("units", "Seconds")
                .codec::<SecondsCodec>()
        )
    ));
    assert!(is_registration_error(fury.register(
        TypeRegistration::builder::<Seconds>()
            .id(9)
            .kind(TypeKind::STRING)
            .codec::<SecondsCodec>()
    )));
    assert!(is_registration_error(fury.register(
        TypeRegistration::builder::<Seconds>()
            .id(0)
            .codec::<SecondsCodec>()
    )));
    assert!(is_registration_error(fury.register(
        TypeRegistration::builder::<Seconds>()
            .id(5)
            .codec::<SecondsCodec>()
    )));
    assert!(is_registration_error(
        fury.register(TypeRegistration::builder::<Seconds>().id(10))
    ));
    assert!(is_registration_error(fury.register(
        TypeRegistration::builder::<Seconds>()
            .id(10)
            .serializer(SecondsCodec::default)
    )));

    // Same id under another kind is a different tag.
    let seconds = fury
        .register(
            TypeRegistration::builder::<Seconds>()
                .id(5)
                .kind(TypeKind::EXT)
                .codec::<SecondsCodec>(),
        )
        .unwrap();
    assert_eq!(seconds.tag().user_id(), 5);

    fury.register(
        TypeRegistration::builder::<Grams>()
            .name("units", "Grams")
            .codec::<GramsCodec>(),
    )
    .unwrap();
    let err = fury
        .registry()
        .transaction(|tx| {
            tx.register(
                TypeRegistration::builder::<Vec<Grams>>()
                    .name("units", "Grams")
                    .codec::<MetersCodec>(),
            )
        })
        .unwrap_err();
    assert!(matches!(err, Error::Registration(_)));
    assert!(!err.is_retryable());
}

#[test]
fn test_auto_ids_skip_taken_tags() {
    let fury = Fury::default();
    let grams = fury
        .register(TypeRegistration::builder::<Grams>().codec::<GramsCodec>())
        .unwrap();
    assert_eq!(grams.tag().user_id(), 1);
    fury.register(
        TypeRegistration::builder::<Seconds>()
            .id(2)
            .codec::<SecondsCodec>(),
    )
    .unwrap();
    let meters = fury.register(meters()).unwrap();
    assert_eq!(meters.tag().user_id(), 3);
    assert_eq!(meters.tag().kind().unwrap(), TypeKind::STRUCT);

    let bytes = fury.serialize(&Meters(1.5)).unwrap();
    assert_eq!(fury.deserialize::<Meters>(&bytes).unwrap(), Meters(1.5));
}

#[test]
fn test_transaction_registers_together() {
    let fury = Fury::default();
    let (a, b) = fury
        .registry()
        .transaction(|tx| {
            let a = tx.register(meters())?;
            let b = tx.register(
                TypeRegistration::builder::<Seconds>()
                    .name("units", "Seconds")
                    .codec::<SecondsCodec>(),
            )?;
            Ok((a, b))
        })
        .unwrap();
    assert!(Arc::ptr_eq(
        &a,
        &fury.registry().resolve_type(std::any::TypeId::of::<Meters>()).unwrap()
    ));
    assert!(Arc::ptr_eq(
        &b,
        &fury.registry().resolve_name("units", "Seconds").unwrap()
    ));
    assert!(b.is_named());
    assert_eq!(b.tag().kind().unwrap(), TypeKind::NAMED_STRUCT);
}

#[test]
fn test_lock_timeout() {
    let fury = Fury::default().registry_lock_timeout(Duration::from_millis(50));
    let barrier = Arc::new(Barrier::new(2));
    let holder = {
        let fury = fury.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            fury.registry()
                .transaction(|_| {
                    barrier.wait();
                    thread::sleep(Duration::from_millis(400));
                    Ok(())
                })
                .unwrap();
        })
    };
    barrier.wait();

    let err = fury.register(meters()).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err}");
    assert!(err.is_retryable());

    let mut writer = fury.writer();
    assert!(matches!(writer.write(&1i32), Err(Error::Timeout(_))));
    assert!(writer.is_aborted());

    holder.join().unwrap();
    fury.register(meters()).unwrap();
    writer.reset();
    assert!(writer.write(&Meters(2.0)).unwrap().is_ready());
}

#[test]
fn test_codecs_are_pooled() {
    let fury = Fury::default();
    let registration = fury.register(meters().id(11)).unwrap();
    for i in 0..3 {
        let bytes = fury.serialize(&Meters(i as f64)).unwrap();
        assert_eq!(fury.deserialize::<Meters>(&bytes).unwrap(), Meters(i as f64));
    }
    assert_eq!(registration.serializer_pool_stats(), (1, 1));
    assert_eq!(registration.deserializer_pool_stats(), (1, 1));

    // A failed read still returns its codec.
    let bytes = fury.serialize(&Meters(7.0)).unwrap();
    let mut reader = fury.reader();
    reader.feed(bytes[..bytes.len() - 1].to_vec());
    reader.finish();
    assert!(reader.read::<Meters>().is_err());
    assert_eq!(registration.deserializer_pool_stats(), (1, 1));
}

#[test]
fn test_unregistered_type() {
    let fury = Fury::default();
    let err = fury.serialize(&Grams(1.0)).unwrap_err();
    assert!(matches!(err, Error::TypeError(_)), "{err}");
    assert!(err.to_string().contains("Grams"));
}
