// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use fsentry::OwnedFsevent;
use iters::Stream;

/// A named stream of fsevents.
///
/// End of stream is the stream's `Ok(None)`; any error is a real failure
/// and propagates to the pipeline.
pub trait Source: Stream<Item = OwnedFsevent> {
    fn name(&self) -> &str;
}

/// Builders for the enrichment-hint maps partial events carry under the
/// `rbh-fsevents` xattr.
pub mod hints {
    use fsentry::{Arena, Map, Value, ENRICH_XATTR};

    /// `{"rbh-fsevents": {<hint>: <payload>}}`
    pub fn enrich_map<'a>(alloc: &'a Arena, hint: &str, payload: Value<'_>) -> Map<'a> {
        let hints = Map::build(alloc, &[(hint, Some(payload))]);
        Map::build(alloc, &[(ENRICH_XATTR, Some(Value::Map(hints)))])
    }

    /// Ask for the statx fields of `mask` to be fetched.
    pub fn statx<'a>(alloc: &'a Arena, mask: u32) -> Map<'a> {
        enrich_map(alloc, "statx", Value::UInt32(mask))
    }

    /// Ask for these named xattrs to be fetched from the inode.
    pub fn xattrs<'a>(alloc: &'a Arena, names: &[&str]) -> Map<'a> {
        let names = alloc
            .alloc_slice_fill_iter(names.iter().map(|name| Value::String(alloc.alloc_str(name))));
        enrich_map(alloc, "xattrs", Value::Sequence(names))
    }

    /// Ask for the symlink target to be read.
    pub fn symlink<'a>(alloc: &'a Arena) -> Map<'a> {
        enrich_map(alloc, "symlink", Value::String("symlink"))
    }

    /// Delegate to the filesystem-specific enrichment extension.
    pub fn fs_extension<'a>(alloc: &'a Arena, name: &str) -> Map<'a> {
        enrich_map(alloc, name, Value::Map(Map::EMPTY))
    }

    /// Ask for the full path to be recomputed by parent traversal.
    pub fn path<'a>(alloc: &'a Arena) -> Map<'a> {
        enrich_map(alloc, "path", Value::Map(Map::EMPTY))
    }
}
