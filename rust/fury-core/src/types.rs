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

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::Error;

/// Flag byte that precedes every value on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i8)]
pub enum RefFlag {
    Null = -3,
    // Already seen object; only a varint ref id follows.
    Ref = -2,
    // Non-null value that is not tracked.
    NotNullValue = -1,
    // Referenceable value seen for the first time.
    RefValue = 0,
}

impl RefFlag {
    #[inline(always)]
    pub fn from_byte(b: u8) -> Result<Self, Error> {
        RefFlag::try_from(b as i8)
            .map_err(|_| Error::bad_input(format!("invalid ref flag {}", b as i8)))
    }

    /// Whether a type header and payload follow the flag.
    #[inline(always)]
    pub fn has_payload(self) -> bool {
        matches!(self, RefFlag::RefValue | RefFlag::NotNullValue)
    }
}

/// Internal kind of a wire type tag. User types registered by numeric id are
/// tagged `(id << 8) | kind`; everything else is the bare kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[allow(non_camel_case_types)]
#[repr(u8)]
pub enum TypeKind {
    BOOL = 1,
    INT8 = 2,
    INT16 = 3,
    INT32 = 4,
    VAR_INT32 = 5,
    INT64 = 6,
    VAR_INT64 = 7,
    SLI_INT64 = 8,
    FLOAT16 = 9,
    FLOAT32 = 10,
    FLOAT64 = 11,
    STRING = 12,
    ENUM = 13,
    NAMED_ENUM = 14,
    STRUCT = 15,
    COMPATIBLE_STRUCT = 16,
    NAMED_STRUCT = 17,
    NAMED_COMPATIBLE_STRUCT = 18,
    EXT = 19,
    NAMED_EXT = 20,
    LIST = 21,
    SET = 22,
    MAP = 23,
    DURATION = 24,
    TIMESTAMP = 25,
    LOCAL_DATE = 26,
    DECIMAL = 27,
    BINARY = 28,
    ARRAY = 29,
    BOOL_ARRAY = 30,
    INT8_ARRAY = 31,
    INT16_ARRAY = 32,
    INT32_ARRAY = 33,
    INT64_ARRAY = 34,
    FLOAT16_ARRAY = 35,
    FLOAT32_ARRAY = 36,
    FLOAT64_ARRAY = 37,
    ARROW_RECORD_BATCH = 38,
    ARROW_TABLE = 39,
}

impl TypeKind {
    /// Kinds resolved by a transmitted namespace and name.
    #[inline(always)]
    pub fn is_named(self) -> bool {
        matches!(
            self,
            TypeKind::NAMED_ENUM
                | TypeKind::NAMED_STRUCT
                | TypeKind::NAMED_COMPATIBLE_STRUCT
                | TypeKind::NAMED_EXT
        )
    }

    /// Kinds that user registrations may carry.
    #[inline(always)]
    pub fn is_user_kind(self) -> bool {
        matches!(
            self,
            TypeKind::ENUM
                | TypeKind::NAMED_ENUM
                | TypeKind::STRUCT
                | TypeKind::COMPATIBLE_STRUCT
                | TypeKind::NAMED_STRUCT
                | TypeKind::NAMED_COMPATIBLE_STRUCT
                | TypeKind::EXT
                | TypeKind::NAMED_EXT
        )
    }

    pub fn is_struct(self) -> bool {
        matches!(
            self,
            TypeKind::STRUCT
                | TypeKind::COMPATIBLE_STRUCT
                | TypeKind::NAMED_STRUCT
                | TypeKind::NAMED_COMPATIBLE_STRUCT
        )
    }

    /// The named counterpart of a user kind; other kinds map to themselves.
    pub fn to_named(self) -> TypeKind {
        match self {
            TypeKind::ENUM => TypeKind::NAMED_ENUM,
            TypeKind::STRUCT => TypeKind::NAMED_STRUCT,
            TypeKind::COMPATIBLE_STRUCT => TypeKind::NAMED_COMPATIBLE_STRUCT,
            TypeKind::EXT => TypeKind::NAMED_EXT,
            other => other,
        }
    }

    /// The id-addressed counterpart of a named kind.
    pub fn to_unnamed(self) -> TypeKind {
        match self {
            TypeKind::NAMED_ENUM => TypeKind::ENUM,
            TypeKind::NAMED_STRUCT => TypeKind::STRUCT,
            TypeKind::NAMED_COMPATIBLE_STRUCT => TypeKind::COMPATIBLE_STRUCT,
            TypeKind::NAMED_EXT => TypeKind::EXT,
            other => other,
        }
    }
}

/// Numeric classification of a value's on-wire shape, written as a varuint32.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireTag(u32);

impl WireTag {
    /// Largest user id that still fits in a tag.
    pub const MAX_USER_ID: u32 = u32::MAX >> 8;

    #[inline(always)]
    pub const fn new(raw: u32) -> Self {
        WireTag(raw)
    }

    #[inline(always)]
    pub fn of_kind(kind: TypeKind) -> Self {
        WireTag(u8::from(kind) as u32)
    }

    #[inline(always)]
    pub fn of_user(id: u32, kind: TypeKind) -> Self {
        WireTag((id << 8) | u8::from(kind) as u32)
    }

    #[inline(always)]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Decodes the low byte of the tag.
    #[inline(always)]
    pub fn kind(self) -> Result<TypeKind, Error> {
        TypeKind::try_from((self.0 & 0xff) as u8)
            .map_err(|_| Error::bad_input(format!("unknown type kind in tag {:#x}", self.0)))
    }

    #[inline(always)]
    pub fn user_id(self) -> u32 {
        self.0 >> 8
    }

    #[inline(always)]
    pub fn is_named(self) -> bool {
        self.kind().map(TypeKind::is_named).unwrap_or(false)
    }
}

impl fmt::Debug for WireTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Ok(kind) if self.user_id() != 0 => write!(f, "WireTag({}|{:?})", self.user_id(), kind),
            Ok(kind) => write!(f, "WireTag({:?})", kind),
            Err(_) => write!(f, "WireTag({:#x})", self.0),
        }
    }
}

pub mod config_flags {
    pub const IS_NULL_FLAG: u8 = 1 << 0;
    pub const IS_LITTLE_ENDIAN_FLAG: u8 = 2;
    pub const IS_CROSS_LANGUAGE_FLAG: u8 = 4;
    pub const IS_OUT_OF_BAND_FLAG: u8 = 8;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Language {
    Xlang = 0,
    Java = 1,
    Python = 2,
    Cpp = 3,
    Go = 4,
    Javascript = 5,
    Rust = 6,
    Dart = 7,
}

pub const MAGIC_NUMBER: u16 = 0x62d4;
