// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use fsentry::{Id, OwnedFsentry, OwnedFsevent, OwnedValue, Value};
use iters::Stream;

use crate::{Error, FilterOptions, FilterOutput, Projection};

/// A backend's numeric identity. First-party backends use IDs up to
/// [`RESERVED_MAX`]; user-defined backends pick IDs above it.
pub type BackendId = u8;

pub const GENERIC: BackendId = 0;
pub const RESERVED_MAX: BackendId = 127;

/// Capability bits advertised by [`Backend::capabilities`]. An operation
/// whose bit is unset fails with [`Error::Unsupported`].
pub mod capabilities {
    pub const FILTER: u32 = 0x1;
    pub const SYNC: u32 = 0x2;
    pub const UPDATE: u32 = 0x4;
    pub const BRANCH: u32 = 0x8;
}

/// Bits of the [`Backend::get_info`] request mask.
pub mod info {
    /// The chain of plugins and extensions backing this backend, as a
    /// `backend_source` sequence of maps.
    pub const BACKEND_SOURCE: u32 = 0x1;
}

/// Options are addressed as `backend_id << 8 | local_id`; the generic
/// option space uses backend 0.
pub const fn option_id(backend: BackendId, local: u8) -> u32 {
    (backend as u32) << 8 | local as u32
}

pub const fn option_backend_id(option: u32) -> BackendId {
    (option >> 8) as BackendId
}

/// The generic option space, understood by every backend.
pub mod generic_option {
    use super::{option_id, GENERIC};

    /// Backends remap retired options here; always unsupported.
    pub const DEPRECATED: u32 = option_id(GENERIC, 0);
    /// Garbage collection toggle, provided by the backend.
    pub const GC: u32 = option_id(GENERIC, 1);
    /// Operation timeout, honored by backends that can.
    pub const TIMEOUT: u32 = option_id(GENERIC, 2);
}

pub type EntryStream = Box<dyn Stream<Item = OwnedFsentry>>;
pub type ValueStream = Box<dyn Stream<Item = OwnedValue>>;

/// Rows returned by [`Backend::filter`]: fsentries under a projection
/// output, value maps under an aggregation output.
pub enum FilterRows {
    Entries(EntryStream),
    Values(ValueStream),
}

impl FilterRows {
    pub fn entries(self) -> Result<EntryStream, Error> {
        match self {
            FilterRows::Entries(entries) => Ok(entries),
            FilterRows::Values(_) => Err(Error::invalid("expected fsentry rows")),
        }
    }

    pub fn values(self) -> Result<ValueStream, Error> {
        match self {
            FilterRows::Values(values) => Ok(values),
            FilterRows::Entries(_) => Err(Error::invalid("expected aggregation rows")),
        }
    }
}

/// A storage engine holding a mirror of one filesystem.
///
/// Every operation has a default `Unsupported` implementation: a backend
/// implements what its capability bits advertise. A branched backend (see
/// [`Backend::branch`]) shares the parent's connection; destroying the
/// parent must not invalidate live branches.
pub trait Backend {
    fn id(&self) -> BackendId;
    fn name(&self) -> &str;
    fn capabilities(&self) -> u32;

    /// The backend half of [`get_option`]: `option` is known to address
    /// this backend (or to be a backend-provided generic option).
    fn backend_get_option(&self, option: u32, _data: &mut [u8]) -> Result<usize, Error> {
        Err(Error::UnknownOption(option))
    }

    /// The backend half of [`set_option`].
    fn backend_set_option(&mut self, option: u32, _data: &[u8]) -> Result<(), Error> {
        Err(Error::UnknownOption(option))
    }

    /// Apply a series of fsevents, in order. Returns the number of events
    /// applied; on failure, every event before the failing one has been
    /// applied.
    fn update(&mut self, _events: &mut dyn Stream<Item = OwnedFsevent>) -> Result<usize, Error> {
        Err(Error::Unsupported("update"))
    }

    /// A new backend scoped to the subtree rooted at `id` or `path`
    /// (exactly one must be provided).
    fn branch(&self, _id: Option<&Id>, _path: Option<&str>) -> Result<Box<dyn Backend>, Error> {
        Err(Error::Unsupported("branch"))
    }

    /// The fsentries matching `filter` (all of them when `filter` is
    /// `None`), shaped by `output`.
    fn filter(
        &self,
        _filter: Option<&filter::Filter<'_>>,
        _options: &FilterOptions,
        _output: &FilterOutput,
    ) -> Result<FilterRows, Error> {
        Err(Error::Unsupported("filter"))
    }

    /// The root fsentry of this backend's (possibly branched) scope.
    fn root(&self, _projection: &Projection) -> Result<OwnedFsentry, Error> {
        Err(Error::Unsupported("root"))
    }

    /// Capability and provenance description, keyed by [`info`] bits.
    fn get_info(&self, _info: u32) -> Result<OwnedValue, Error> {
        Err(Error::Unsupported("get_info"))
    }

    /// A plugin-defined named attribute (e.g. a striping description),
    /// returned as key/value pairs.
    fn get_attribute(
        &self,
        _name: &str,
        _arg: Option<&Value<'_>>,
    ) -> Result<Vec<(String, OwnedValue)>, Error> {
        Err(Error::Unsupported("get_attribute"))
    }
}

/// Get the value of a backend's option, routing the generic option space
/// and rejecting options of other backends.
///
/// On success returns the number of bytes written into `data`; when `data`
/// is too small, fails with [`Error::Overflow`] carrying the required size.
pub fn get_option(backend: &dyn Backend, option: u32, data: &mut [u8]) -> Result<usize, Error> {
    match option_backend_id(option) {
        GENERIC => match option {
            generic_option::DEPRECATED => Err(Error::Unsupported("deprecated option")),
            generic_option::GC | generic_option::TIMEOUT => {
                backend.backend_get_option(option, data)
            }
            _ => Err(Error::ForeignOption(option)),
        },
        id if id == backend.id() => backend.backend_get_option(option, data),
        _ => Err(Error::ForeignOption(option)),
    }
}

/// Set the value of a backend's option; routing as in [`get_option`].
pub fn set_option(backend: &mut dyn Backend, option: u32, data: &[u8]) -> Result<(), Error> {
    match option_backend_id(option) {
        GENERIC => match option {
            generic_option::DEPRECATED => Err(Error::Unsupported("deprecated option")),
            generic_option::GC | generic_option::TIMEOUT => {
                backend.backend_set_option(option, data)
            }
            _ => Err(Error::ForeignOption(option)),
        },
        id if id == backend.id() => backend.backend_set_option(option, data),
        _ => Err(Error::ForeignOption(option)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Bare;

    impl Backend for Bare {
        fn id(&self) -> BackendId {
            42
        }
        fn name(&self) -> &str {
            "bare"
        }
        fn capabilities(&self) -> u32 {
            0
        }
    }

    #[test]
    fn option_ids_encode_backend_and_local_halves() {
        let option = option_id(42, 7);
        assert_eq!(option, 42 << 8 | 7);
        assert_eq!(option_backend_id(option), 42);
    }

    #[test]
    fn deprecated_is_always_unsupported() {
        let mut buffer = [0u8; 8];
        let error = get_option(&Bare, generic_option::DEPRECATED, &mut buffer).unwrap_err();
        assert!(matches!(error, Error::Unsupported(_)));
    }

    #[test]
    fn options_of_other_backends_are_rejected() {
        let mut buffer = [0u8; 8];
        let error = get_option(&Bare, option_id(13, 0), &mut buffer).unwrap_err();
        assert!(matches!(error, Error::ForeignOption(_)));

        // An unknown option of this backend is a different error.
        let error = get_option(&Bare, option_id(42, 200), &mut buffer).unwrap_err();
        assert!(matches!(error, Error::UnknownOption(_)));
    }

    #[test]
    fn unimplemented_operations_are_unsupported() {
        let mut backend = Bare;
        assert!(matches!(
            backend.update(&mut iters::array(Vec::new())),
            Err(Error::Unsupported("update")),
        ));
        assert!(matches!(
            backend.branch(None, Some("/a")),
            Err(Error::Unsupported("branch")),
        ));
    }
}
