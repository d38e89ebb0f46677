// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Generic conveniences layered over the backend contract: single-entry
//! queries and path resolution by iterated parent/name lookup.

use filter::{ComparisonOp, Filter, FilterField, FsentryField, OwnedFilter};
use fsentry::{entry, Id, OwnedFsentry, Value};

use crate::{Backend, Error, FilterOptions, FilterOutput, Projection};

/// The first fsentry matching `filter`, or [`Error::NotFound`].
pub fn filter_one<B: Backend + ?Sized>(
    backend: &B,
    filter: Option<&Filter<'_>>,
    projection: &Projection,
) -> Result<OwnedFsentry, Error> {
    let rows = backend.filter(
        filter,
        &FilterOptions {
            limit: Some(1),
            ..Default::default()
        },
        &FilterOutput::Projection(*projection),
    )?;
    match rows.entries()?.next()? {
        Some(entry) => Ok(entry),
        None => Err(Error::NotFound),
    }
}

fn fsentry_from_parent_and_name<B: Backend + ?Sized>(
    backend: &B,
    parent_id: &Id,
    name: &str,
    projection: &Projection,
) -> Result<OwnedFsentry, Error> {
    let lookup = OwnedFilter::build(|alloc| {
        let parent = Filter::compare(
            alloc,
            ComparisonOp::Equal,
            FilterField::fsentry(FsentryField::ParentId),
            Value::Binary(parent_id.as_bytes()),
        )?;
        let name = Filter::compare(
            alloc,
            ComparisonOp::Equal,
            FilterField::fsentry(FsentryField::Name),
            Value::String(name),
        )?;
        Filter::and(alloc, &[&parent, &name])
    })?;
    filter_one(backend, Some(lookup.get()), projection)
}

/// Retrieve an fsentry by path, one namespace lookup per component.
///
/// An absolute path starts from the root namespace entry (the entry whose
/// parent is the empty ID and whose name is empty); a relative path starts
/// from the backend's (possibly branched) root. Repeated and trailing
/// slashes are ignored.
pub fn fsentry_from_path<B: Backend + ?Sized>(
    backend: &B,
    path: &str,
    projection: &Projection,
) -> Result<OwnedFsentry, Error> {
    let absolute = path.starts_with('/');
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut parent = match (absolute, segments.is_empty()) {
        (true, true) => {
            return fsentry_from_parent_and_name(backend, &Id::root_parent(), "", projection)
        }
        (false, true) => return backend.root(projection),
        (true, false) => {
            fsentry_from_parent_and_name(backend, &Id::root_parent(), "", &Projection::ID_ONLY)?
        }
        (false, false) => backend.root(&Projection::ID_ONLY)?,
    };

    let (last, intermediate) = segments.split_last().unwrap();
    for segment in intermediate {
        let parent_id = projected_id(&parent)?;
        parent = fsentry_from_parent_and_name(backend, &parent_id, segment, &Projection::ID_ONLY)?;
    }

    let parent_id = projected_id(&parent)?;
    fsentry_from_parent_and_name(backend, &parent_id, last, projection)
}

fn projected_id(entry: &OwnedFsentry) -> Result<Id, Error> {
    let entry = entry.get();
    if entry.mask & entry::mask::ID == 0 {
        return Err(Error::NoData);
    }
    Ok(entry.id.clone())
}
