// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The backend contract: a uniform query/update surface over heterogeneous
//! storage engines, plus the URI and plugin machinery that instantiates
//! them.
//!
//! Pinpointing exactly why an operation failed can be genuinely hard for
//! some engines. When a backend cannot map a failure to a precise error it
//! should call [`backend_error`], which records a short human-readable
//! explanation in a thread-local buffer and yields [`Error::Backend`]; the
//! message is only ever meant to be printed, never parsed.

use std::cell::RefCell;
use std::fmt;

mod contract;
pub use contract::{
    capabilities, generic_option, get_option, info, option_backend_id, option_id, set_option,
    Backend, BackendId, EntryStream, FilterRows, ValueStream, GENERIC, RESERVED_MAX,
};

mod options;
pub use options::{
    Accumulator, AccumulatorOp, FilterOptions, FilterOutput, Projection, SortSpec, ValuesSpec,
};

mod overlay;
pub use overlay::{filter_one, fsentry_from_path};

mod uri;
pub use uri::{is_uri, RawUri, Uri, UriSelector};

mod plugin;
pub use plugin::{
    from_uri, import_plugin, load_extension, register_extension, register_plugin, BackendPlugin,
    PluginExtension,
};

pub mod memory;

/// How large a backend error explanation may grow.
const ERROR_BUFFER_SIZE: usize = 512;

thread_local! {
    static LAST_BACKEND_ERROR: RefCell<String> = RefCell::new(String::new());
}

/// Error raised by backend operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// No entry matches the request.
    #[error("no such entry")]
    NotFound,

    /// The backend is missing the information needed to satisfy the
    /// request (e.g. an intermediate entry without an ID).
    #[error("missing information to resolve the request")]
    NoData,

    #[error("invalid argument: {0}")]
    Invalid(String),

    /// The option belongs to another backend.
    #[error("option {0:#x} does not belong to this backend")]
    ForeignOption(u32),

    /// The option looks like one of this backend's but is not recognized.
    #[error("unknown option {0:#x}")]
    UnknownOption(u32),

    #[error("buffer too small: {required} bytes required")]
    Overflow { required: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Filter(#[from] filter::Error),

    #[error(transparent)]
    Stream(#[from] iters::Error),

    #[error(transparent)]
    Model(#[from] fsentry::Error),

    /// An engine-specific failure; the message is the thread-local
    /// explanation recorded by [`backend_error`].
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }
}

/// Record an opaque backend failure and return the matching error.
pub fn backend_error(message: impl fmt::Display) -> Error {
    let mut message = message.to_string();
    message.truncate(ERROR_BUFFER_SIZE);
    LAST_BACKEND_ERROR.with(|buffer| buffer.borrow_mut().clone_from(&message));
    Error::Backend(message)
}

/// The explanation recorded by the last [`backend_error`] on this thread.
pub fn last_backend_error() -> String {
    LAST_BACKEND_ERROR.with(|buffer| buffer.borrow().clone())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backend_errors_are_recorded_thread_locally() {
        let error = backend_error("the engine is on fire");
        assert!(matches!(error, Error::Backend(_)));
        assert_eq!(last_backend_error(), "the engine is on fire");

        std::thread::spawn(|| assert_eq!(last_backend_error(), ""))
            .join()
            .unwrap();
    }

    #[test]
    fn backend_errors_are_bounded() {
        let long = "x".repeat(2 * ERROR_BUFFER_SIZE);
        backend_error(&long);
        assert_eq!(last_backend_error().len(), ERROR_BUFFER_SIZE);
    }
}
