// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::statx::{FileType, Statx, TYPE};
use crate::{Arena, Error, Id, Map, Value};

/// Bits of [`Fsentry::mask`], reporting which fields are populated.
pub mod mask {
    pub const ID: u32 = 0x0001;
    pub const PARENT_ID: u32 = 0x0002;
    pub const NAME: u32 = 0x0004;
    pub const STATX: u32 = 0x0008;
    pub const SYMLINK: u32 = 0x0010;
    pub const NAMESPACE_XATTRS: u32 = 0x0020;
    pub const INODE_XATTRS: u32 = 0x0040;
    pub const ALL: u32 = 0x007f;
}

/// Any filesystem entry (file, directory, symlink, ...), seen as a document.
///
/// An entry may legitimately appear under several `(parent_id, name)` pairs:
/// hardlinks give one inode many namespace entries, and eventually-consistent
/// backends may briefly do the same.
#[derive(Debug, Clone, PartialEq)]
pub struct Fsentry<'a> {
    /// Which of the fields below are populated; see [`mask`].
    pub mask: u32,
    pub id: Id,
    pub parent_id: Id,
    pub name: Option<&'a str>,
    pub statx: Option<Statx>,
    /// Extended attributes attached to this **namespace** entry.
    pub ns_xattrs: Map<'a>,
    /// Extended attributes attached to the inode itself.
    pub inode_xattrs: Map<'a>,
    pub symlink: Option<&'a str>,
}

/// Assembles an [`Fsentry`] in a target arena, copying each provided part.
pub struct FsentryBuilder<'a> {
    alloc: &'a Arena,
    entry: Fsentry<'a>,
}

impl<'a> FsentryBuilder<'a> {
    pub fn new(alloc: &'a Arena) -> FsentryBuilder<'a> {
        FsentryBuilder {
            alloc,
            entry: Fsentry {
                mask: 0,
                id: Id::root_parent(),
                parent_id: Id::root_parent(),
                name: None,
                statx: None,
                ns_xattrs: Map::EMPTY,
                inode_xattrs: Map::EMPTY,
                symlink: None,
            },
        }
    }

    pub fn id(mut self, id: &Id) -> Self {
        self.entry.id = id.clone();
        self.entry.mask |= mask::ID;
        self
    }

    pub fn parent_id(mut self, parent_id: &Id) -> Self {
        self.entry.parent_id = parent_id.clone();
        self.entry.mask |= mask::PARENT_ID;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.entry.name = Some(self.alloc.alloc_str(name));
        self.entry.mask |= mask::NAME;
        self
    }

    pub fn statx(mut self, statx: &Statx) -> Self {
        self.entry.statx = Some(*statx);
        self.entry.mask |= mask::STATX;
        self
    }

    pub fn ns_xattrs(mut self, xattrs: &Map<'_>) -> Self {
        self.entry.ns_xattrs = xattrs.clone_into(self.alloc);
        self.entry.mask |= mask::NAMESPACE_XATTRS;
        self
    }

    pub fn inode_xattrs(mut self, xattrs: &Map<'_>) -> Self {
        self.entry.inode_xattrs = xattrs.clone_into(self.alloc);
        self.entry.mask |= mask::INODE_XATTRS;
        self
    }

    pub fn symlink(mut self, symlink: &str) -> Self {
        self.entry.symlink = Some(self.alloc.alloc_str(symlink));
        self.entry.mask |= mask::SYMLINK;
        self
    }

    pub fn build(self) -> Result<Fsentry<'a>, Error> {
        let entry = self.entry;
        if entry.symlink.is_some() {
            if let Some(statx) = &entry.statx {
                if statx.mask & TYPE != 0 && statx.file_type() != Some(FileType::Symlink) {
                    return Err(Error::invalid("symlink content on a non-symlink entry"));
                }
            }
        }
        Ok(entry)
    }
}

impl<'a> Fsentry<'a> {
    pub fn builder(alloc: &'a Arena) -> FsentryBuilder<'a> {
        FsentryBuilder::new(alloc)
    }

    /// Deep-copy this entry into `alloc`.
    pub fn clone_into<'b>(&self, alloc: &'b Arena) -> Fsentry<'b> {
        Fsentry {
            mask: self.mask,
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            name: self.name.map(|name| &*alloc.alloc_str(name)),
            statx: self.statx,
            ns_xattrs: self.ns_xattrs.clone_into(alloc),
            inode_xattrs: self.inode_xattrs.clone_into(alloc),
            symlink: self.symlink.map(|symlink| &*alloc.alloc_str(symlink)),
        }
    }

    /// Look up an inode xattr by dot-separated path, traversing nested maps:
    /// `find_inode_xattr("user.a.b")` first tries the literal key, then
    /// `user.a` → `b`, then `user` → `a` → `b`.
    pub fn find_inode_xattr(&self, path: &str) -> Option<&Value<'a>> {
        fn lookup<'a>(map: &Map<'a>, path: &str) -> Option<&'a Value<'a>> {
            if let Some(value) = map.value(path) {
                return Some(value);
            }
            // Try every split point, longest prefix first.
            for (index, _) in path.char_indices().rev() {
                if path.as_bytes()[index] != b'.' {
                    continue;
                }
                let (prefix, rest) = (&path[..index], &path[index + 1..]);
                if let Some(Value::Map(nested)) = map.value(prefix) {
                    if let Some(value) = lookup(nested, rest) {
                        return Some(value);
                    }
                }
            }
            None
        }
        lookup(&self.inode_xattrs, path)
    }

    /// The entry's full path, when the namespace xattrs record one.
    pub fn path(&self) -> Option<&'a str> {
        self.ns_xattrs.value("path").and_then(Value::as_str)
    }
}
