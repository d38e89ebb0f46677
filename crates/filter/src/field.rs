// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use fsentry::statx;

use crate::{Error, FilterField, FsentryField};

impl<'a> FilterField<'a> {
    /// Parse the user-facing field language:
    ///
    /// - `id`, `parent-id`, `name`, `symlink`
    /// - `ns-xattrs` or `ns-xattrs.<key>`
    /// - `xattrs` or `xattrs.<key>`
    /// - `statx` or `statx.<leaf>` where `<leaf>` is a statx field path
    ///   (`size`, `mtime.sec`, `rdev.major`, ...)
    ///
    /// The returned field borrows its xattr key from `string`.
    pub fn parse(string: &'a str) -> Result<FilterField<'a>, Error> {
        match string {
            "id" => return Ok(FilterField::fsentry(FsentryField::Id)),
            "parent-id" => return Ok(FilterField::fsentry(FsentryField::ParentId)),
            "name" => return Ok(FilterField::fsentry(FsentryField::Name)),
            "symlink" => return Ok(FilterField::fsentry(FsentryField::Symlink)),
            "ns-xattrs" => return Ok(FilterField::fsentry(FsentryField::NamespaceXattrs)),
            "xattrs" => return Ok(FilterField::fsentry(FsentryField::InodeXattrs)),
            "statx" => return Ok(FilterField::statx(statx::ALL)),
            _ => {}
        }

        if let Some(key) = string.strip_prefix("ns-xattrs.") {
            if !key.is_empty() {
                return Ok(FilterField::ns_xattr(key));
            }
        } else if let Some(key) = string.strip_prefix("xattrs.") {
            if !key.is_empty() {
                return Ok(FilterField::inode_xattr(key));
            }
        } else if let Some(leaf) = string.strip_prefix("statx.") {
            if let Some(mask) = statx::mask_from_path(leaf) {
                return Ok(FilterField::statx(mask));
            }
        }

        Err(Error::UnknownField(string.to_owned()))
    }
}
