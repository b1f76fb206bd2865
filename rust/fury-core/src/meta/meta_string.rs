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

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ensure;
use crate::error::Error;
use crate::meta::murmurhash3_x64_128;

/// Meta strings are at most this many bytes, exclusive.
pub const MAX_META_STRING_LEN: usize = 32767;

/// Encoded strings longer than this are addressed by hash on the wire.
pub const SMALL_STRING_THRESHOLD: usize = 16;

const HASH_SEED: u64 = 47;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Encoding {
    #[default]
    Utf8 = 0x00,
    LowerSpecial = 0x01,
    LowerUpperDigitSpecial = 0x02,
    FirstToLowerSpecial = 0x03,
    AllToLowerSpecial = 0x04,
}

/// Which identifier a meta string names. Each policy has its own special
/// characters and candidate encodings.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum EncodingPolicy {
    Namespace,
    Name,
    Field,
}

impl EncodingPolicy {
    pub const fn special_chars(self) -> (char, char) {
        match self {
            EncodingPolicy::Namespace => ('.', '_'),
            EncodingPolicy::Name | EncodingPolicy::Field => ('$', '_'),
        }
    }

    pub const fn candidates(self) -> &'static [Encoding] {
        match self {
            EncodingPolicy::Namespace => &[
                Encoding::Utf8,
                Encoding::AllToLowerSpecial,
                Encoding::LowerUpperDigitSpecial,
            ],
            EncodingPolicy::Name => &[
                Encoding::Utf8,
                Encoding::LowerUpperDigitSpecial,
                Encoding::FirstToLowerSpecial,
                Encoding::AllToLowerSpecial,
            ],
            EncodingPolicy::Field => &[
                Encoding::Utf8,
                Encoding::LowerUpperDigitSpecial,
                Encoding::AllToLowerSpecial,
            ],
        }
    }

    pub const fn encoder(self) -> MetaStringEncoder {
        MetaStringEncoder { policy: self }
    }

    pub const fn decoder(self) -> MetaStringDecoder {
        MetaStringDecoder { policy: self }
    }
}

/// Content hash of encoded meta string bytes with the encoding in the low
/// byte. Never zero.
pub fn meta_string_hash(bytes: &[u8], encoding: Encoding) -> i64 {
    let mut hash = (murmurhash3_x64_128(bytes, HASH_SEED).0 as i64).wrapping_abs();
    if hash == 0 {
        hash += 256;
    }
    ((hash as u64 & 0xffff_ffff_ffff_ff00) as i64) | u8::from(encoding) as i64
}

/// An identifier string with its chosen compact encoding.
#[derive(Debug, Clone)]
pub struct MetaString {
    pub original: String,
    pub encoding: Encoding,
    pub bytes: Vec<u8>,
    pub strip_last_char: bool,
    pub policy: EncodingPolicy,
    pub hash: i64,
}

impl PartialEq for MetaString {
    fn eq(&self, other: &Self) -> bool {
        self.policy == other.policy && self.encoding == other.encoding && self.bytes == other.bytes
    }
}

impl Eq for MetaString {}

impl std::hash::Hash for MetaString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl MetaString {
    pub fn new(
        original: String,
        encoding: Encoding,
        bytes: Vec<u8>,
        policy: EncodingPolicy,
    ) -> Result<Self, Error> {
        let strip_last_char = match encoding {
            Encoding::Utf8 => false,
            _ => {
                ensure!(
                    !bytes.is_empty(),
                    Error::encode_error("bit-packed meta string cannot be empty")
                );
                bytes[0] & 0x80 != 0
            }
        };
        let hash = meta_string_hash(&bytes, encoding);
        Ok(MetaString {
            original,
            encoding,
            bytes,
            strip_last_char,
            policy,
            hash,
        })
    }

    pub fn empty(policy: EncodingPolicy) -> Self {
        MetaString {
            original: String::new(),
            encoding: Encoding::Utf8,
            bytes: Vec::new(),
            strip_last_char: false,
            policy,
            hash: meta_string_hash(&[], Encoding::Utf8),
        }
    }

    /// Whether the wire form carries a hash instead of an encoding byte.
    #[inline(always)]
    pub fn is_big(&self) -> bool {
        self.bytes.len() > SMALL_STRING_THRESHOLD
    }
}

#[derive(Default)]
struct Statistics {
    digits: usize,
    uppers: usize,
    lower_special: bool,
    lower_upper_digit_special: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct MetaStringEncoder {
    policy: EncodingPolicy,
}

impl MetaStringEncoder {
    /// Encodes `input` with the most compact encoding among the policy's
    /// candidates that represents it losslessly.
    pub fn encode(&self, input: &str) -> Result<MetaString, Error> {
        ensure!(
            input.len() < MAX_META_STRING_LEN,
            Error::encode_error(format!(
                "meta string is too long, max:{MAX_META_STRING_LEN}, current:{}",
                input.len()
            ))
        );
        if input.is_empty() {
            return Ok(MetaString::empty(self.policy));
        }
        let encoding = if input.is_ascii() {
            self.select_encoding(input)
        } else {
            Encoding::Utf8
        };
        self.encode_with_encoding(input, encoding)
    }

    fn allows(&self, encoding: Encoding) -> bool {
        self.policy.candidates().contains(&encoding)
    }

    fn statistics(&self, input: &str) -> Statistics {
        let (sc1, sc2) = self.policy.special_chars();
        let mut stats = Statistics {
            lower_special: true,
            lower_upper_digit_special: true,
            ..Default::default()
        };
        for c in input.chars() {
            if stats.lower_upper_digit_special
                && !(c.is_ascii_alphanumeric() || c == sc1 || c == sc2)
            {
                stats.lower_upper_digit_special = false;
            }
            if stats.lower_special && !(c.is_ascii_lowercase() || matches!(c, '.' | '_' | '$' | '|'))
            {
                stats.lower_special = false;
            }
            if c.is_ascii_digit() {
                stats.digits += 1;
            }
            if c.is_ascii_uppercase() {
                stats.uppers += 1;
            }
        }
        stats
    }

    fn select_encoding(&self, input: &str) -> Encoding {
        let stats = self.statistics(input);
        if stats.lower_special && self.allows(Encoding::LowerSpecial) {
            return Encoding::LowerSpecial;
        }
        if !stats.lower_upper_digit_special {
            // '|' escapes uppercase letters in AllToLowerSpecial.
            return if stats.lower_special
                && !input.contains('|')
                && self.allows(Encoding::AllToLowerSpecial)
            {
                Encoding::AllToLowerSpecial
            } else {
                Encoding::Utf8
            };
        }
        if stats.digits != 0 {
            return if self.allows(Encoding::LowerUpperDigitSpecial) {
                Encoding::LowerUpperDigitSpecial
            } else {
                Encoding::Utf8
            };
        }
        let first_is_upper = input.starts_with(|c: char| c.is_ascii_uppercase());
        if stats.uppers == 1 && first_is_upper && self.allows(Encoding::FirstToLowerSpecial) {
            return Encoding::FirstToLowerSpecial;
        }
        if (input.len() + stats.uppers) * 5 < input.len() * 6
            && self.allows(Encoding::AllToLowerSpecial)
        {
            return Encoding::AllToLowerSpecial;
        }
        if self.allows(Encoding::LowerUpperDigitSpecial) {
            return Encoding::LowerUpperDigitSpecial;
        }
        Encoding::Utf8
    }

    pub fn encode_with_encoding(&self, input: &str, encoding: Encoding) -> Result<MetaString, Error> {
        if input.is_empty() {
            return Ok(MetaString::empty(self.policy));
        }
        ensure!(
            encoding == Encoding::Utf8 || input.is_ascii(),
            Error::encode_error("non-ASCII characters in a bit-packed meta string")
        );
        let bytes = match encoding {
            Encoding::Utf8 => input.as_bytes().to_vec(),
            Encoding::LowerSpecial => pack(&self.lower_special_values(input.chars())?, 5),
            Encoding::LowerUpperDigitSpecial => {
                let values = input
                    .chars()
                    .map(|c| self.lower_upper_digit_special_value(c))
                    .collect::<Result<Vec<_>, _>>()?;
                pack(&values, 6)
            }
            Encoding::FirstToLowerSpecial => {
                let mut chars = input.chars();
                let first = chars.next().map(|c| c.to_ascii_lowercase());
                pack(&self.lower_special_values(first.into_iter().chain(chars))?, 5)
            }
            Encoding::AllToLowerSpecial => {
                let escaped = input.chars().flat_map(|c| {
                    if c.is_ascii_uppercase() {
                        ['|', c.to_ascii_lowercase()].into_iter().take(2)
                    } else {
                        [c, c].into_iter().take(1)
                    }
                });
                pack(&self.lower_special_values(escaped)?, 5)
            }
        };
        MetaString::new(input.to_string(), encoding, bytes, self.policy)
    }

    fn lower_special_values(&self, chars: impl Iterator<Item = char>) -> Result<Vec<u8>, Error> {
        chars
            .map(|c| match c {
                'a'..='z' => Ok(c as u8 - b'a'),
                '.' => Ok(26),
                '_' => Ok(27),
                '$' => Ok(28),
                '|' => Ok(29),
                _ => Err(Error::encode_error(format!(
                    "unsupported character for LOWER_SPECIAL encoding: {c:?}"
                ))),
            })
            .collect()
    }

    fn lower_upper_digit_special_value(&self, c: char) -> Result<u8, Error> {
        let (sc1, sc2) = self.policy.special_chars();
        match c {
            'a'..='z' => Ok(c as u8 - b'a'),
            'A'..='Z' => Ok(c as u8 - b'A' + 26),
            '0'..='9' => Ok(c as u8 - b'0' + 52),
            _ if c == sc1 => Ok(62),
            _ if c == sc2 => Ok(63),
            _ => Err(Error::encode_error(format!(
                "unsupported character for LOWER_UPPER_DIGIT_SPECIAL encoding: {c:?}"
            ))),
        }
    }
}

/// Packs `bits`-wide values most significant bit first, after a leading flag
/// bit that records whether the final slot is padding.
fn pack(values: &[u8], bits: usize) -> Vec<u8> {
    let total_bits = values.len() * bits + 1;
    let mut out = vec![0u8; total_bits.div_ceil(8)];
    let mut pos = 1;
    for &v in values {
        for shift in (0..bits).rev() {
            if (v >> shift) & 1 == 1 {
                out[pos / 8] |= 0x80 >> (pos % 8);
            }
            pos += 1;
        }
    }
    if out.len() * 8 >= total_bits + bits {
        out[0] |= 0x80;
    }
    out
}

fn unpack(data: &[u8], bits: usize) -> Vec<u8> {
    let total_bits = data.len() * 8;
    let strip_last_char = data[0] & 0x80 != 0;
    let mut values = Vec::with_capacity(total_bits / bits);
    let mut pos = 1;
    while pos + bits <= total_bits && !(strip_last_char && pos + 2 * bits > total_bits) {
        let mut v = 0u8;
        for i in pos..pos + bits {
            v = (v << 1) | ((data[i / 8] >> (7 - i % 8)) & 1);
        }
        values.push(v);
        pos += bits;
    }
    values
}

#[derive(Clone, Copy, Debug)]
pub struct MetaStringDecoder {
    policy: EncodingPolicy,
}

impl MetaStringDecoder {
    pub fn decode(&self, bytes: &[u8], encoding: Encoding) -> Result<MetaString, Error> {
        if bytes.is_empty() {
            return Ok(MetaString::empty(self.policy));
        }
        let original = match encoding {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::bad_input(format!("meta string is not UTF-8: {e}")))?,
            Encoding::LowerSpecial => self.lower_special(bytes)?,
            Encoding::LowerUpperDigitSpecial => {
                let (sc1, sc2) = self.policy.special_chars();
                unpack(bytes, 6)
                    .into_iter()
                    .map(|v| match v {
                        0..=25 => Ok((b'a' + v) as char),
                        26..=51 => Ok((b'A' + v - 26) as char),
                        52..=61 => Ok((b'0' + v - 52) as char),
                        62 => Ok(sc1),
                        63 => Ok(sc2),
                        _ => Err(Error::bad_input(format!(
                            "invalid LOWER_UPPER_DIGIT_SPECIAL value {v}"
                        ))),
                    })
                    .collect::<Result<String, _>>()?
            }
            Encoding::FirstToLowerSpecial => {
                let lowered = self.lower_special(bytes)?;
                let mut chars = lowered.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => lowered,
                }
            }
            Encoding::AllToLowerSpecial => {
                let lowered = self.lower_special(bytes)?;
                let mut out = String::with_capacity(lowered.len());
                let mut chars = lowered.chars();
                while let Some(c) = chars.next() {
                    if c == '|' {
                        if let Some(next) = chars.next() {
                            out.push(next.to_ascii_uppercase());
                        }
                    } else {
                        out.push(c);
                    }
                }
                out
            }
        };
        MetaString::new(original, encoding, bytes.to_vec(), self.policy)
    }

    fn lower_special(&self, bytes: &[u8]) -> Result<String, Error> {
        unpack(bytes, 5)
            .into_iter()
            .map(|v| match v {
                0..=25 => Ok((b'a' + v) as char),
                26 => Ok('.'),
                27 => Ok('_'),
                28 => Ok('$'),
                29 => Ok('|'),
                _ => Err(Error::bad_input(format!("invalid LOWER_SPECIAL value {v}"))),
            })
            .collect()
    }
}
