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

use std::any::Any;
use std::rc::Rc;

use fury_core::config::RefTracking;
use fury_core::context::{DeserializationReader, SerializationWriter};
use fury_core::error::{Error, PollResult};
use fury_core::fury::Fury;
use fury_core::resolver::type_resolver::TypeRegistration;
use fury_core::serializer::{downcast_value, Deserializer, Serializer, Value};
use test_helpers::{
    decode_in_chunks, node, register_label, register_node, register_point, Label, NodeRef, Point,
};

fn point_fury(ref_tracking: RefTracking) -> Fury {
    let fury = Fury::default().ref_tracking(ref_tracking);
    register_point(&fury);
    fury
}

fn node_fury(ref_tracking: RefTracking) -> Fury {
    let fury = Fury::default().ref_tracking(ref_tracking);
    register_node(&fury);
    fury
}

fn two_cycle() -> (NodeRef, NodeRef) {
    let a = node(1);
    let b = node(2);
    a.borrow_mut().next = Some(b.clone());
    b.borrow_mut().next = Some(a.clone());
    (a, b)
}

fn break_cycle(n: &NodeRef) {
    n.borrow_mut().next = None;
}

#[test]
fn test_shared_point_written_once() {
    let fury = point_fury(RefTracking::Enabled);
    let p = Rc::new(Point { x: 3, y: -4 });
    let bytes = fury.serialize(&vec![p.clone(), p]).unwrap();
    assert_eq!(
        bytes,
        vec![
            0x02, // little endian, not xlang
            0xff, 0x15, 0x02, // NotNullValue, LIST, two elements
            0x00, 0x8f, 0x0e, // RefValue, tag (7 << 8) | STRUCT
            3, 0, 0, 0, 0xfc, 0xff, 0xff, 0xff, // payload
            0xfe, 0x00, // Ref to id 0
        ]
    );
    let back: Vec<Rc<Point>> = fury.deserialize(&bytes).unwrap();
    assert_eq!(*back[0], Point { x: 3, y: -4 });
    assert!(Rc::ptr_eq(&back[0], &back[1]));
}

#[test]
fn test_disabled_writes_every_occurrence() {
    let fury = point_fury(RefTracking::Disabled);
    let p = Rc::new(Point { x: 1, y: 2 });
    let bytes = fury.serialize(&vec![p.clone(), p]).unwrap();
    assert_eq!(
        bytes,
        vec![
            0x02, 0xff, 0x15, 0x02, //
            0xff, 0x8f, 0x0e, 1, 0, 0, 0, 2, 0, 0, 0, //
            0xff, 0x8f, 0x0e, 1, 0, 0, 0, 2, 0, 0, 0,
        ]
    );
    let back: Vec<Rc<Point>> = fury.deserialize(&bytes).unwrap();
    assert_eq!(back[0], back[1]);
    assert!(!Rc::ptr_eq(&back[0], &back[1]));
}

#[test]
fn test_only_circular_rewrites_completed_objects() {
    let fury = point_fury(RefTracking::OnlyCircularDependency);
    let p = Rc::new(Point { x: 1, y: 2 });
    let bytes = fury.serialize(&vec![p.clone(), p]).unwrap();
    // Both occurrences are RefValue with id 0: the first id was released.
    assert_eq!(
        bytes,
        vec![
            0x02, 0xff, 0x15, 0x02, //
            0x00, 0x8f, 0x0e, 1, 0, 0, 0, 2, 0, 0, 0, //
            0x00, 0x8f, 0x0e, 1, 0, 0, 0, 2, 0, 0, 0,
        ]
    );
    let back: Vec<Rc<Point>> = fury.deserialize(&bytes).unwrap();
    assert_eq!(back[0], back[1]);
}

#[test]
fn test_disabled_cycle_is_circular_dependency() {
    let fury = node_fury(RefTracking::Disabled);
    let a = node(1);
    a.borrow_mut().next = Some(a.clone());
    let err = fury.serialize(&a).unwrap_err();
    assert!(matches!(err, Error::CircularDependency(_)), "{err}");
    break_cycle(&a);

    // A chain without cycles is fine.
    let head = node(1);
    head.borrow_mut().next = Some(node(2));
    let back: NodeRef = fury.deserialize(&fury.serialize(&head).unwrap()).unwrap();
    let next = back.borrow().next.clone().unwrap();
    assert_eq!(next.borrow().id, 2);
    assert!(next.borrow().next.is_none());
}

#[test]
fn test_cycle_round_trip() {
    for policy in [RefTracking::Enabled, RefTracking::OnlyCircularDependency] {
        let fury = node_fury(policy);
        let (a, b) = two_cycle();
        let bytes = fury.serialize(&a).unwrap();
        assert_eq!(
            bytes,
            vec![0x02, 0x00, 0x8f, 0x10, 0x02, 0x00, 0x8f, 0x10, 0x04, 0xfe, 0x00],
            "{policy:?}"
        );
        for chunk in 1..=bytes.len() {
            let back: NodeRef = decode_in_chunks(&fury, &bytes, chunk);
            let next = back.borrow().next.clone().unwrap();
            assert_eq!(back.borrow().id, 1);
            assert_eq!(next.borrow().id, 2);
            let again = next.borrow().next.clone().unwrap();
            assert!(Rc::ptr_eq(&again, &back));
            break_cycle(&back);
        }
        break_cycle(&a);
        drop(b);
    }
}

#[test]
fn test_self_reference() {
    let fury = node_fury(RefTracking::Enabled);
    let a = node(9);
    a.borrow_mut().next = Some(a.clone());
    let back: NodeRef = fury.deserialize(&fury.serialize(&a).unwrap()).unwrap();
    let next = back.borrow().next.clone().unwrap();
    assert!(Rc::ptr_eq(&next, &back));
    break_cycle(&back);
    break_cycle(&a);
}

#[test]
fn test_ref_flag_rejected_without_tracking() {
    let enabled = point_fury(RefTracking::Enabled);
    let p = Rc::new(Point { x: 1, y: 1 });
    let bytes = enabled.serialize(&p).unwrap();
    let disabled = point_fury(RefTracking::Disabled);
    assert!(matches!(
        disabled.deserialize::<Rc<Point>>(&bytes),
        Err(Error::BadInput(_))
    ));
}

#[test]
fn test_dangling_ref_id_is_bad_input() {
    let fury = point_fury(RefTracking::Enabled);
    // Ref to id 5 in an empty table.
    let err = fury.deserialize::<Rc<Point>>(&[0x02, 0xfe, 0x05]).unwrap_err();
    assert!(matches!(err, Error::BadInput(_)), "{err}");
}

/// Serializes `value` through a writer whose buffer is flushed whenever it
/// reaches `limit` bytes.
fn write_limited<T: 'static>(fury: &Fury, value: &T, limit: usize) -> Vec<u8> {
    let mut writer = fury.clone().write_buffer_limit(Some(limit)).writer();
    let mut out = Vec::new();
    for _ in 0..10_000 {
        let status = writer.write(value).unwrap();
        out.extend_from_slice(&writer.flush());
        if status.is_ready() {
            assert!(writer.is_idle());
            return out;
        }
    }
    panic!("writer made no progress with limit {limit}");
}

#[test]
fn test_write_limit_with_cycles_and_named_types() {
    for policy in [RefTracking::Enabled, RefTracking::OnlyCircularDependency] {
        let fury = node_fury(policy);
        register_label(&fury, "org.example", "Label");
        let (a, b) = two_cycle();
        let nodes = vec![a.clone(), b.clone(), a.clone()];
        let labels: Vec<Label> = ["left", "right", "left"]
            .iter()
            .map(|t| Label { text: t.to_string() })
            .collect();
        let node_bytes = fury.serialize(&nodes).unwrap();
        let label_bytes = fury.serialize(&labels).unwrap();

        for limit in 1..=5 {
            assert_eq!(
                write_limited(&fury, &nodes, limit),
                node_bytes,
                "{policy:?} limit {limit}"
            );
            assert_eq!(
                write_limited(&fury, &labels, limit),
                label_bytes,
                "{policy:?} limit {limit}"
            );
        }

        for chunk in 1..=node_bytes.len() {
            let back: Vec<NodeRef> = decode_in_chunks(&fury, &node_bytes, chunk);
            assert_eq!(back.len(), 3);
            let second = back[0].borrow().next.clone().unwrap();
            assert_eq!(second.borrow().id, 2);
            let first_again = second.borrow().next.clone().unwrap();
            assert!(Rc::ptr_eq(&first_again, &back[0]));
            assert_eq!(back[2].borrow().id, 1);
            // Completed objects are shared only when every reference is tracked.
            assert_eq!(
                Rc::ptr_eq(&back[0], &back[2]),
                policy == RefTracking::Enabled,
                "{policy:?}"
            );
            back.iter().for_each(break_cycle);
        }
        for chunk in 1..=label_bytes.len() {
            let back: Vec<Label> = decode_in_chunks(&fury, &label_bytes, chunk);
            assert_eq!(back, labels);
        }
        break_cycle(&a);
        drop(b);
    }
}

struct Broken;

struct Holder {
    part: Rc<Broken>,
}

/// Always fails to write, after its ref flag and type header went out.
#[derive(Default)]
struct BrokenCodec;

impl Serializer for BrokenCodec {
    fn write_data(&mut self, _writer: &mut SerializationWriter, _value: &dyn Any) -> PollResult<()> {
        Err(Error::encode_error("broken part"))
    }
}

impl Deserializer for BrokenCodec {
    fn create_instance(&mut self, _reader: &mut DeserializationReader) -> PollResult<Value> {
        Err(Error::bad_input("broken part"))
    }
}

/// Writes its part, falling back to a null when the part fails.
#[derive(Default)]
struct HolderCodec;

impl Serializer for HolderCodec {
    fn write_data(&mut self, writer: &mut SerializationWriter, value: &dyn Any) -> PollResult<()> {
        let holder = downcast_value::<Rc<Holder>>(value)?;
        match writer.write_value(&holder.part) {
            Err(Error::EncodeError(_)) => writer.write_value_option::<Rc<Broken>>(None),
            status => status,
        }
    }
}

impl Deserializer for HolderCodec {
    fn create_instance(&mut self, _reader: &mut DeserializationReader) -> PollResult<Value> {
        Err(Error::bad_input("holders are write only"))
    }
}

#[test]
fn test_recovered_child_error_releases_ref_and_frame() {
    for policy in [RefTracking::Disabled, RefTracking::OnlyCircularDependency] {
        let fury = Fury::default().ref_tracking(policy);
        fury.register(
            TypeRegistration::builder::<Rc<Broken>>()
                .id(40)
                .shared()
                .codec::<BrokenCodec>(),
        )
        .unwrap();
        fury.register(
            TypeRegistration::builder::<Rc<Holder>>()
                .id(41)
                .shared()
                .codec::<HolderCodec>(),
        )
        .unwrap();
        fury.register_list::<Rc<Holder>>().unwrap();

        // The second holder meets the same part again: it must fail the same
        // way instead of looking like a cycle.
        let part = Rc::new(Broken);
        let holders = vec![
            Rc::new(Holder { part: part.clone() }),
            Rc::new(Holder { part }),
        ];
        let mut writer = fury.writer();
        assert!(writer.write(&holders).unwrap().is_ready(), "{policy:?}");
        assert!(writer.is_idle());
        writer.flush();

        assert!(writer.write(&7i32).unwrap().is_ready());
        assert_eq!(writer.flush().to_vec(), fury.serialize(&7i32).unwrap());
    }
}
