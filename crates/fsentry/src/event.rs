// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::statx::{FileType, Statx, TYPE};
use crate::{Arena, Error, Id, Map, Value};

/// The xattr key under which sources leave enrichment hints.
///
/// Events carrying this key are *partial*: the enricher consumes the hint
/// map and replaces it with concrete payloads. A partial event must never
/// reach a backend.
pub const ENRICH_XATTR: &str = "rbh-fsevents";

/// An update to an fsentry.
#[derive(Debug, Clone, PartialEq)]
pub struct Fsevent<'a> {
    /// The inode the event applies to.
    pub id: Id,
    /// Untyped payload: plugin data and, on partial events, enrichment
    /// hints under [`ENRICH_XATTR`].
    pub xattrs: Map<'a>,
    pub kind: FseventKind<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FseventKind<'a> {
    /// Create or refresh the inode's metadata.
    Upsert {
        statx: Option<Statx>,
        symlink: Option<&'a str>,
    },
    /// Add a namespace entry for the inode.
    Link { parent_id: Id, name: &'a str },
    /// Remove a namespace entry of the inode.
    Unlink { parent_id: Id, name: &'a str },
    /// Remove the inode altogether.
    Delete,
    /// Patch extended attributes, either inode-scoped (`link` is None) or
    /// scoped to one namespace entry.
    Xattr { link: Option<(Id, &'a str)> },
}

impl<'a> Fsevent<'a> {
    pub fn upsert(
        alloc: &'a Arena,
        id: &Id,
        xattrs: &Map<'_>,
        statx: Option<&Statx>,
        symlink: Option<&str>,
    ) -> Result<Fsevent<'a>, Error> {
        if let (Some(statx), Some(_)) = (statx, symlink) {
            if statx.mask & TYPE != 0 && statx.file_type() != Some(FileType::Symlink) {
                return Err(Error::invalid("symlink content on a non-symlink upsert"));
            }
        }
        Ok(Fsevent {
            id: id.clone(),
            xattrs: xattrs.clone_into(alloc),
            kind: FseventKind::Upsert {
                statx: statx.copied(),
                symlink: symlink.map(|s| &*alloc.alloc_str(s)),
            },
        })
    }

    pub fn link(
        alloc: &'a Arena,
        id: &Id,
        xattrs: &Map<'_>,
        parent_id: &Id,
        name: &str,
    ) -> Fsevent<'a> {
        Fsevent {
            id: id.clone(),
            xattrs: xattrs.clone_into(alloc),
            kind: FseventKind::Link {
                parent_id: parent_id.clone(),
                name: alloc.alloc_str(name),
            },
        }
    }

    pub fn unlink(alloc: &'a Arena, id: &Id, parent_id: &Id, name: &str) -> Fsevent<'a> {
        Fsevent {
            id: id.clone(),
            xattrs: Map::EMPTY,
            kind: FseventKind::Unlink {
                parent_id: parent_id.clone(),
                name: alloc.alloc_str(name),
            },
        }
    }

    pub fn delete(id: &Id) -> Fsevent<'a> {
        Fsevent {
            id: id.clone(),
            xattrs: Map::EMPTY,
            kind: FseventKind::Delete,
        }
    }

    /// An inode-scoped xattr event.
    pub fn xattr(alloc: &'a Arena, id: &Id, xattrs: &Map<'_>) -> Fsevent<'a> {
        Fsevent {
            id: id.clone(),
            xattrs: xattrs.clone_into(alloc),
            kind: FseventKind::Xattr { link: None },
        }
    }

    /// An xattr event scoped to one namespace entry of the inode.
    pub fn ns_xattr(
        alloc: &'a Arena,
        id: &Id,
        xattrs: &Map<'_>,
        parent_id: &Id,
        name: &str,
    ) -> Fsevent<'a> {
        Fsevent {
            id: id.clone(),
            xattrs: xattrs.clone_into(alloc),
            kind: FseventKind::Xattr {
                link: Some((parent_id.clone(), &*alloc.alloc_str(name))),
            },
        }
    }

    /// Deep-copy this event into `alloc`.
    pub fn clone_into<'b>(&self, alloc: &'b Arena) -> Fsevent<'b> {
        Fsevent {
            id: self.id.clone(),
            xattrs: self.xattrs.clone_into(alloc),
            kind: match &self.kind {
                FseventKind::Upsert { statx, symlink } => FseventKind::Upsert {
                    statx: *statx,
                    symlink: symlink.map(|s| &*alloc.alloc_str(s)),
                },
                FseventKind::Link { parent_id, name } => FseventKind::Link {
                    parent_id: parent_id.clone(),
                    name: alloc.alloc_str(name),
                },
                FseventKind::Unlink { parent_id, name } => FseventKind::Unlink {
                    parent_id: parent_id.clone(),
                    name: alloc.alloc_str(name),
                },
                FseventKind::Delete => FseventKind::Delete,
                FseventKind::Xattr { link } => FseventKind::Xattr {
                    link: link
                        .as_ref()
                        .map(|(parent_id, name)| (parent_id.clone(), &*alloc.alloc_str(name))),
                },
            },
        }
    }

    /// The `path` xattr attached to this event.
    pub fn path(&self) -> Result<&'a str, Error> {
        match self.xattrs.value("path") {
            None => Err(Error::NoData("path")),
            Some(Value::String(path)) => Ok(path),
            Some(other) => Err(Error::invalid(format!(
                "'path' xattr is a {}, not a string",
                other.kind(),
            ))),
        }
    }

    /// Does this event still carry enrichment hints?
    pub fn is_partial(&self) -> bool {
        self.xattrs.get(ENRICH_XATTR).is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::statx;

    fn id(byte: u8) -> Id {
        Id::from_bytes(&[byte]).unwrap()
    }

    #[test]
    fn upsert_type_agreement() {
        let alloc = Arena::new();
        let symlink_statx = Statx {
            mask: statx::TYPE,
            mode: FileType::Symlink.to_mode(),
            ..Default::default()
        };
        let regular_statx = Statx {
            mask: statx::TYPE,
            mode: FileType::Regular.to_mode(),
            ..Default::default()
        };

        assert!(Fsevent::upsert(
            &alloc,
            &id(1),
            &Map::EMPTY,
            Some(&symlink_statx),
            Some("target"),
        )
        .is_ok());
        assert!(matches!(
            Fsevent::upsert(
                &alloc,
                &id(1),
                &Map::EMPTY,
                Some(&regular_statx),
                Some("target"),
            ),
            Err(Error::Invalid(_)),
        ));
        // A statx-less symlink upsert is a legitimate partial event.
        assert!(Fsevent::upsert(&alloc, &id(1), &Map::EMPTY, None, Some("target")).is_ok());
    }

    #[test]
    fn path_lookup() {
        let alloc = Arena::new();
        let xattrs = Map::build(&alloc, &[("path", Some(Value::String("/a/b")))]);
        let event = Fsevent::xattr(&alloc, &id(1), &xattrs);
        assert_eq!(event.path(), Ok("/a/b"));

        let event = Fsevent::delete(&id(1));
        assert_eq!(event.path(), Err(Error::NoData("path")));

        let xattrs = Map::build(&alloc, &[("path", Some(Value::UInt32(1)))]);
        let event = Fsevent::xattr(&alloc, &id(1), &xattrs);
        assert!(matches!(event.path(), Err(Error::Invalid(_))));
    }

    #[test]
    fn partial_events_are_flagged() {
        let alloc = Arena::new();
        let hints = Map::build(&alloc, &[("symlink", Some(Value::String("symlink")))]);
        let xattrs = Map::build(&alloc, &[(ENRICH_XATTR, Some(Value::Map(hints)))]);
        let event = Fsevent::xattr(&alloc, &id(1), &xattrs);
        assert!(event.is_partial());
        assert!(!Fsevent::delete(&id(1)).is_partial());
    }

    #[test]
    fn clone_preserves_structure() {
        let alloc = Arena::new();
        let xattrs = Map::build(&alloc, &[("fid", Some(Value::Binary(b"\x01\x02")))]);
        let event = Fsevent::link(&alloc, &id(1), &xattrs, &id(2), "name");

        let other = Arena::new();
        assert_eq!(event.clone_into(&other), event);
    }
}
