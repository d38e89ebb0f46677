// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Fsevent sources.
//!
//! A source is a named stream of fsevents. The events a source produces may
//! be *partial*: instead of concrete payloads they carry enrichment hints
//! under the `rbh-fsevents` xattr, to be resolved downstream against the
//! live filesystem.

mod source;
pub use source::{hints, Source};

pub mod changelog;
pub use changelog::{ChangelogReader, ChangelogRecord, ChangelogSource, RecordType};

pub mod yaml;
pub use yaml::{emit_events, parse_events, YamlSource};

/// Error raised while producing or serializing fsevents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Model(#[from] fsentry::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }
}

// Streams surface source failures through the iterator error type.
impl From<Error> for iters::Error {
    fn from(error: Error) -> iters::Error {
        match error {
            Error::Io(io) => iters::Error::Io(io),
            other => iters::Error::Invalid(other.to_string()),
        }
    }
}
