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

//! Error type shared by every layer of the engine.
//!
//! Error constructors sit on the hot read/write paths even though they rarely
//! run, so they are all `#[cold]` and `#[track_caller]`. Keep it that way when
//! adding new ones.
//!
//! "Not enough bytes yet" is not an error. Suspendable operations return
//! `Result<Poll<T>, Error>` and signal it with `Poll::Pending`; see
//! [`try_ready!`](crate::try_ready).

use std::borrow::Cow;
use std::task::Poll;
use std::time::Duration;

use thiserror::Error;

/// Set `FURY_PANIC_ON_ERROR` at compile time to panic where an error is created.
pub const PANIC_ON_ERROR: bool = option_env!("FURY_PANIC_ON_ERROR").is_some();

#[inline(always)]
pub const fn should_panic_on_error() -> bool {
    PANIC_ON_ERROR
}

/// Result of an operation that may suspend until more bytes arrive.
pub type PollResult<T> = Result<Poll<T>, Error>;

/// Error type for Fury serialization and deserialization.
///
/// Always build errors through the static constructors ([`Error::bad_input`],
/// [`Error::timeout`], ...) instead of the variants, so that
/// `FURY_PANIC_ON_ERROR` can point at the creation site:
///
/// ```bash
/// RUST_BACKTRACE=1 FURY_PANIC_ON_ERROR=1 cargo test
/// ```
///
/// Any error raised inside a session aborts it, [`Error::Timeout`] included;
/// the session must be reset before reuse.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or truncated input: varint overflow, meta string hash
    /// mismatch, unknown wire tag, invalid ref flag or ref id.
    #[error("bad input: {0}")]
    BadInput(Cow<'static, str>),

    /// The registry write lock could not be acquired in time.
    #[error("timed out after {0:?} waiting for the type registry lock")]
    Timeout(Duration),

    /// An object was re-entered while still being written and the reference
    /// policy does not tolerate cycles.
    #[error("circular dependency detected: {0}")]
    CircularDependency(Cow<'static, str>),

    /// The session observed a cancellation request.
    #[error("operation cancelled")]
    Cancelled,

    /// The wire or the caller disagrees with a registered type.
    #[error("{0}")]
    TypeError(Cow<'static, str>),

    /// Invalid or conflicting type registration.
    #[error("{0}")]
    Registration(Cow<'static, str>),

    /// Encoding of a meta string or payload failed.
    #[error("{0}")]
    EncodeError(Cow<'static, str>),

    /// The session cannot accept the call in its current state.
    #[error("{0}")]
    InvalidState(Cow<'static, str>),

    /// Transport failure surfaced by a blocking or async driver.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn bad_input<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::BadInput(s.into());
        if PANIC_ON_ERROR {
            panic!("FURY_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    /// Creates an [`Error::BadInput`] for data that ended while `needed`
    /// more bytes were expected.
    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::bad_input(format!(
            "stream ended: needed {needed} bytes but only {available} remain"
        ))
    }

    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn timeout(waited: Duration) -> Self {
        let err = Error::Timeout(waited);
        if PANIC_ON_ERROR {
            panic!("FURY_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn circular_dependency<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::CircularDependency(s.into());
        if PANIC_ON_ERROR {
            panic!("FURY_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn cancelled() -> Self {
        let err = Error::Cancelled;
        if PANIC_ON_ERROR {
            panic!("FURY_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn type_error<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::TypeError(s.into());
        if PANIC_ON_ERROR {
            panic!("FURY_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn registration<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::Registration(s.into());
        if PANIC_ON_ERROR {
            panic!("FURY_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn encode_error<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::EncodeError(s.into());
        if PANIC_ON_ERROR {
            panic!("FURY_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn invalid_state<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::InvalidState(s.into());
        if PANIC_ON_ERROR {
            panic!("FURY_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    /// Appends the Rust type name to a [`Error::TypeError`] message.
    #[inline(never)]
    pub fn enhance_type_error<T: ?Sized + 'static>(err: Error) -> Error {
        if let Error::TypeError(s) = err {
            let mut msg = s.to_string();
            msg.push_str(" (type: ");
            msg.push_str(std::any::type_name::<T>());
            msg.push(')');
            Error::type_error(msg)
        } else {
            err
        }
    }

    /// Whether the operation may succeed if retried on a reset session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

/// Ensures a condition is true; otherwise returns an [`enum@Error`].
///
/// ```
/// use fury_core::ensure;
/// use fury_core::error::Error;
///
/// fn check_len(n: usize) -> Result<(), Error> {
///     ensure!(n < 16, Error::bad_input(format!("length {n} too large")));
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

/// Returns early with an [`Error::BadInput`].
///
/// ```
/// use fury_core::bail;
/// use fury_core::error::Error;
///
/// fn check_tag(tag: u8) -> Result<u8, Error> {
///     if tag > 0x7f {
///         bail!("tag {tag:#x} is reserved");
///     }
///     Ok(tag)
/// }
///
/// let err = check_tag(0x80).unwrap_err();
/// assert!(err.to_string().contains("tag 0x80 is reserved"));
/// ```
#[macro_export]
macro_rules! bail {
    ($msg:literal) => {
        return Err($crate::error::Error::bad_input(format!($msg)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::bad_input(format!($fmt, $($arg)*)))
    };
}

/// Unwraps a `Result<Poll<T>, Error>`, propagating both errors and
/// `Poll::Pending` to the caller.
///
/// ```
/// use std::task::Poll;
/// use fury_core::error::Error;
/// use fury_core::try_ready;
///
/// fn twice(p: Result<Poll<u32>, Error>) -> Result<Poll<u32>, Error> {
///     let v = try_ready!(p);
///     Ok(Poll::Ready(v * 2))
/// }
///
/// assert!(matches!(twice(Ok(Poll::Pending)), Ok(Poll::Pending)));
/// assert!(matches!(twice(Ok(Poll::Ready(2))), Ok(Poll::Ready(4))));
/// ```
#[macro_export]
macro_rules! try_ready {
    ($e:expr) => {
        match $e {
            Ok(::std::task::Poll::Ready(v)) => v,
            Ok(::std::task::Poll::Pending) => return Ok(::std::task::Poll::Pending),
            Err(e) => return Err(e),
        }
    };
}
