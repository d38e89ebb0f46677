// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Turning partial fsevents into complete ones, and driving them into a
//! backend.
//!
//! Sources leave *enrichment hints* under the `rbh-fsevents` xattr of the
//! events they emit. The [`Enricher`] resolves those hints against the live
//! filesystem (statx, xattr and symlink reads through the mount the events
//! came from) and replaces them with concrete payloads. The [`no_partial`]
//! guard then refuses any event still carrying hints, and the
//! [`pipeline`] pushes batches into a backend.

pub mod posix;

mod enricher;
pub use enricher::{EnrichExtension, Enricher};

mod guard;
pub use guard::{no_partial, NoPartial};

mod pipeline;
pub use pipeline::run;

/// Error raised while enriching events or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Invalid(String),

    #[error("{0} is not supported")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Model(#[from] fsentry::Error),

    #[error(transparent)]
    Stream(#[from] iters::Error),

    #[error(transparent)]
    Sink(#[from] backend::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }
}

impl From<Error> for iters::Error {
    fn from(error: Error) -> iters::Error {
        match error {
            Error::Io(io) => iters::Error::Io(io),
            Error::Stream(inner) => inner,
            other => iters::Error::Invalid(other.to_string()),
        }
    }
}
