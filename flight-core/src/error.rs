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

//! Error type shared by the encoder and the decoder.
//!
//! Constructors are `#[cold]` and `#[track_caller]`: they sit on every row
//! parse and every render step, and keeping them out of line keeps the hot
//! paths small.

use std::borrow::Cow;

use thiserror::Error;

/// Global flag to check if FLIGHT_PANIC_ON_ERROR environment variable is set at compile time.
/// Set FLIGHT_PANIC_ON_ERROR=1 at compile time to enable panic on error.
pub const PANIC_ON_ERROR: bool = option_env!("FLIGHT_PANIC_ON_ERROR").is_some();

/// Check if FLIGHT_PANIC_ON_ERROR environment variable is set.
#[inline(always)]
pub const fn should_panic_on_error() -> bool {
    PANIC_ON_ERROR
}

/// Message used by the decoder when a server error row carries only a digest.
pub const OMITTED_MESSAGE: &str = "An error occurred in the Server Components render. \
The specific message is omitted in production builds to avoid leaking sensitive details. \
A digest property is included on this error instance which may provide additional details \
about the nature of the error.";

/// Error type for flight encoding and decoding operations.
///
/// # IMPORTANT: Always Use Static Constructor Functions
///
/// **DO NOT** construct error variants directly using the enum syntax.
/// **ALWAYS** use the provided static constructor functions instead.
///
/// ```rust
/// use flight_core::error::Error;
///
/// let err = Error::invalid_data("Invalid row id");
/// let err = Error::invalid_ref(format!("Unknown reference {}", 42));
/// ```
///
/// ## Available Constructor Functions
///
/// - [`Error::invalid_data`] - For malformed rows or payloads
/// - [`Error::invalid_ref`] - For references that cannot be resolved
/// - [`Error::type_error`] - For values the protocol cannot carry
/// - [`Error::not_allowed`] - For operations forbidden in the current state
/// - [`Error::connection_closed`] - For streams that ended without their rows
/// - [`Error::server`] - For error rows received from the encoder
/// - [`Error::unknown`] - For generic errors
///
/// ## Debug Mode: FLIGHT_PANIC_ON_ERROR
///
/// ```bash
/// RUST_BACKTRACE=1 FLIGHT_PANIC_ON_ERROR=1 cargo test
/// ```
///
/// When enabled, any error created via the static constructor functions panics
/// immediately, so the backtrace points at the place the error was created.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed row, framing or payload.
    ///
    /// Do not construct this variant directly; use [`Error::invalid_data`] instead.
    #[error("{0}")]
    InvalidData(Cow<'static, str>),

    /// A reference string or path that does not point at a value.
    ///
    /// Do not construct this variant directly; use [`Error::invalid_ref`] instead.
    #[error("{0}")]
    InvalidRef(Cow<'static, str>),

    /// A value the protocol cannot carry.
    ///
    /// Do not construct this variant directly; use [`Error::type_error`] instead.
    #[error("{0}")]
    TypeError(Cow<'static, str>),

    /// Operation not allowed in current context.
    ///
    /// Do not construct this variant directly; use [`Error::not_allowed`] instead.
    #[error("{0}")]
    NotAllowed(Cow<'static, str>),

    /// The transport ended before every referenced row arrived.
    ///
    /// Do not construct this variant directly; use [`Error::connection_closed`] instead.
    #[error("Connection closed.")]
    ConnectionClosed,

    /// An error row produced by the encoder.
    ///
    /// `message` and `stack` are only present when the encoder exposes error
    /// details; otherwise only the digest crosses the wire.
    ///
    /// Do not construct this variant directly; use [`Error::server`] instead.
    #[error("{message}")]
    Server {
        digest: String,
        message: Cow<'static, str>,
        stack: Option<String>,
    },

    /// Generic unknown error.
    ///
    /// Do not construct this variant directly; use [`Error::unknown`] instead.
    #[error("{0}")]
    Unknown(Cow<'static, str>),
}

impl Error {
    /// Creates a new [`Error::InvalidData`] from a string or static message.
    ///
    /// If `FLIGHT_PANIC_ON_ERROR` environment variable is set, this will panic with the error message.
    ///
    /// # Example
    /// ```
    /// use flight_core::error::Error;
    ///
    /// let err = Error::invalid_data("Invalid row framing");
    /// let err = Error::invalid_data(format!("Invalid row tag {}", 'Z'));
    /// ```
    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn invalid_data<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::InvalidData(s.into());
        if PANIC_ON_ERROR {
            panic!("FLIGHT_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    /// Creates a new [`Error::InvalidRef`] from a string or static message.
    ///
    /// If `FLIGHT_PANIC_ON_ERROR` environment variable is set, this will panic with the error message.
    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn invalid_ref<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::InvalidRef(s.into());
        if PANIC_ON_ERROR {
            panic!("FLIGHT_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    /// Creates a new [`Error::TypeError`] from a string or static message.
    ///
    /// If `FLIGHT_PANIC_ON_ERROR` environment variable is set, this will panic with the error message.
    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn type_error<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::TypeError(s.into());
        if PANIC_ON_ERROR {
            panic!("FLIGHT_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    /// Creates a new [`Error::NotAllowed`] from a string or static message.
    ///
    /// If `FLIGHT_PANIC_ON_ERROR` environment variable is set, this will panic with the error message.
    ///
    /// # Example
    /// ```
    /// use flight_core::error::Error;
    ///
    /// let err = Error::not_allowed("Stream is already being read");
    /// ```
    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn not_allowed<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::NotAllowed(s.into());
        if PANIC_ON_ERROR {
            panic!("FLIGHT_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    /// Creates a new [`Error::ConnectionClosed`].
    ///
    /// Never panics under `FLIGHT_PANIC_ON_ERROR`: closing a connection with
    /// pending chunks is an ordinary outcome for the decoder.
    #[inline(always)]
    #[cold]
    pub fn connection_closed() -> Self {
        Error::ConnectionClosed
    }

    /// Creates a new [`Error::Server`] from the fields of an error row.
    ///
    /// When the row carries no message the decoder substitutes
    /// [`OMITTED_MESSAGE`], mirroring what production encoders send.
    #[inline(always)]
    #[cold]
    pub fn server(digest: impl Into<String>, message: Option<String>, stack: Option<String>) -> Self {
        Error::Server {
            digest: digest.into(),
            message: message.map_or(Cow::Borrowed(OMITTED_MESSAGE), Cow::Owned),
            stack,
        }
    }

    /// Creates a new [`Error::Unknown`] from a string or static message.
    ///
    /// If `FLIGHT_PANIC_ON_ERROR` environment variable is set, this will panic with the error message.
    ///
    /// # Example
    /// ```
    /// use flight_core::error::Error;
    ///
    /// let err = Error::unknown("Something went wrong");
    /// let err = Error::unknown(format!("ID:{} not found", 1));
    /// ```
    #[inline(always)]
    #[cold]
    #[track_caller]
    pub fn unknown<S: Into<Cow<'static, str>>>(s: S) -> Self {
        let err = Error::Unknown(s.into());
        if PANIC_ON_ERROR {
            panic!("FLIGHT_PANIC_ON_ERROR: {}", err);
        }
        err
    }

    /// Returns the digest of a [`Error::Server`] error.
    pub fn digest(&self) -> Option<&str> {
        match self {
            Error::Server { digest, .. } => Some(digest),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    #[cold]
    fn from(err: serde_json::Error) -> Self {
        Error::invalid_data(format!("Invalid JSON payload: {err}"))
    }
}

/// Ensures a condition is true; otherwise returns an [`enum@Error`].
///
/// # Examples
/// ```
/// use flight_core::ensure;
/// use flight_core::error::Error;
///
/// fn check_value(n: i32) -> Result<(), Error> {
///     ensure!(n > 0, "value must be positive");
///     ensure!(n < 10, "value {} too large", n);
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:literal) => {
        if !$cond {
            return Err($crate::error::Error::unknown($msg));
        }
    };
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            return Err($crate::error::Error::unknown(format!($fmt, $($arg)*)));
        }
    };
}

/// Returns early with a [`Error::NotAllowed`].
///
/// # Examples
/// ```
/// use flight_core::not_allowed;
/// use flight_core::error::Error;
///
/// fn check_operation(busy: bool) -> Result<(), Error> {
///     if busy {
///         not_allowed!("renderer {} is busy", 1);
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! not_allowed {
    ($err:expr) => {
        return Err($crate::error::Error::not_allowed($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::not_allowed(format!($fmt, $($arg)*)))
    };
}
