// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The Lustre changelog source.
//!
//! Only the record *shape* enters this crate: reading records from an MDT
//! is delegated to a [`ChangelogReader`], so no Lustre headers are needed
//! here. Each record expands into a deterministic batch of partial
//! fsevents; the source drains the batch before reading the next record.

use std::collections::VecDeque;

use fsentry::statx;
use fsentry::{Fsevent, Id, LuFid, Map, OwnedFsevent, Statx, Value};
use iters::Stream;

use crate::{hints, Error, Source};

/// The record types a changelog can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Mark,
    Create,
    Mkdir,
    Hardlink,
    Softlink,
    Mknod,
    Unlink,
    Rmdir,
    Rename,
    Ext,
    Open,
    Close,
    Layout,
    Trunc,
    Setattr,
    Setxattr,
    Hsm,
    Mtime,
    Ctime,
    Atime,
    Migrate,
    Flrw,
    Resync,
    GetXattr,
    DnOpen,
}

/// Flags of unlink/rmdir records.
pub const CLF_UNLINK_LAST: u32 = 0x0001;
pub const CLF_UNLINK_HSM_EXISTS: u32 = 0x0002;

/// Flags of rename records.
pub const CLF_RENAME_LAST: u32 = 0x0001;
pub const CLF_RENAME_LAST_EXISTS: u32 = 0x0002;

/// The rename/migrate extension: where the entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameExt {
    pub source_fid: LuFid,
    pub source_parent_fid: LuFid,
    pub source_name: String,
}

/// One changelog record, already decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogRecord {
    pub index: u64,
    pub rtype: RecordType,
    pub flags: u32,
    /// The target of the operation.
    pub tfid: LuFid,
    /// The parent of the target's namespace entry.
    pub pfid: LuFid,
    pub name: String,
    /// Present on rename and migrate records.
    pub rename: Option<RenameExt>,
    /// The uid/gid extra record, when the reader requested it.
    pub uidgid: Option<(u32, u32)>,
    /// The xattr-name extra record of setxattr.
    pub xattr: Option<String>,
    /// The job identifier extra record.
    pub jobid: Option<String>,
}

/// Reads raw records off a changelog, typically an MDT reader started at
/// record 0 with the uid/gid, jobid and xattr extra records enabled.
pub trait ChangelogReader {
    /// The next record; `Ok(None)` once the log is drained.
    fn next_record(&mut self) -> Result<Option<ChangelogRecord>, Error>;
}

/// A [`Source`] of partial fsevents over a [`ChangelogReader`].
pub struct ChangelogSource<R> {
    name: String,
    reader: R,
    pending: VecDeque<OwnedFsevent>,
}

impl<R: ChangelogReader> ChangelogSource<R> {
    /// Attach to the MDT named `mdtname` through `reader`.
    pub fn new(mdtname: &str, reader: R) -> ChangelogSource<R> {
        ChangelogSource {
            name: mdtname.to_owned(),
            reader,
            pending: VecDeque::new(),
        }
    }
}

impl<R: ChangelogReader> Stream for ChangelogSource<R> {
    type Item = OwnedFsevent;

    fn next(&mut self) -> Result<Option<OwnedFsevent>, iters::Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            match self.reader.next_record().map_err(iters::Error::from)? {
                None => return Ok(None),
                Some(record) => {
                    let batch = expand_record(&record).map_err(iters::Error::from)?;
                    if batch.is_empty() {
                        tracing::debug!(index = record.index, rtype = ?record.rtype,
                                        "skipping unhandled changelog record");
                        continue;
                    }
                    self.pending.extend(batch);
                }
            }
        }
    }
}

impl<R: ChangelogReader> Source for ChangelogSource<R> {
    fn name(&self) -> &str {
        &self.name
    }
}

fn fid_id(fid: &LuFid) -> Id {
    Id::from_lu_fid(fid)
}

/// A statx snapshot carrying just the changelog-provided uid/gid.
fn uidgid_statx(record: &ChangelogRecord) -> Option<Statx> {
    record.uidgid.map(|(uid, gid)| Statx {
        mask: statx::UID | statx::GID,
        uid,
        gid,
        ..Default::default()
    })
}

/// An upsert asking for `mask` to be fetched, optionally seeded with the
/// record's uid/gid.
fn statx_event(id: &Id, mask: u32, seed: Option<&Statx>) -> Result<OwnedFsevent, Error> {
    OwnedFsevent::build(|alloc| {
        let xattrs = hints::statx(alloc, mask);
        Fsevent::upsert(alloc, id, &xattrs, seed, None)
    })
    .map_err(Error::from)
}

/// A refresh of a parent's atime/ctime/mtime after a namespace change.
fn parent_acmtime_event(parent: &LuFid) -> Result<OwnedFsevent, Error> {
    statx_event(
        &fid_id(parent),
        statx::ATIME | statx::CTIME | statx::MTIME,
        None,
    )
}

/// A new namespace entry for the record's target, with a path
/// recomputation hint.
fn link_event(record: &ChangelogRecord, id: &Id) -> Result<OwnedFsevent, Error> {
    OwnedFsevent::build(|alloc| {
        let xattrs = hints::path(alloc);
        Ok(Fsevent::link(
            alloc,
            id,
            &xattrs,
            &fid_id(&record.pfid),
            &record.name,
        ))
    })
    .map_err(Error::from)
}

/// The statx refresh every inode mutation wants: everything except the
/// uid/gid, which the changelog itself provides.
fn statx_without_uidgid_event(record: &ChangelogRecord, id: &Id) -> Result<OwnedFsevent, Error> {
    statx_event(
        id,
        statx::ALL ^ statx::UID ^ statx::GID,
        uidgid_statx(record).as_ref(),
    )
}

/// An xattr event recording the entry's FID, optionally also marked for
/// filesystem-specific enrichment.
fn fid_xattr_event(record: &ChangelogRecord, id: &Id, lustre: bool) -> Result<OwnedFsevent, Error> {
    OwnedFsevent::build(|alloc| {
        let fid_bytes = alloc.alloc_slice_copy(fid_id(&record.tfid).as_bytes());
        let mut pairs: Vec<(&str, Option<Value<'_>>)> =
            vec![("fid", Some(Value::Binary(fid_bytes)))];
        if lustre {
            // Merge the enrichment key into the same xattr map.
            let lustre_map = hints::fs_extension(alloc, "lustre");
            pairs.extend(lustre_map.iter().map(|pair| (pair.key, pair.value)));
        }
        let xattrs = Map::build(alloc, &pairs);
        Ok(Fsevent::xattr(alloc, id, &xattrs))
    })
    .map_err(Error::from)
}

fn lustre_xattr_event(id: &Id) -> Result<OwnedFsevent, Error> {
    OwnedFsevent::build(|alloc| {
        let xattrs = hints::fs_extension(alloc, "lustre");
        Ok(Fsevent::xattr(alloc, id, &xattrs))
    })
    .map_err(Error::from)
}

fn fetch_xattrs_event(id: &Id, names: &[&str]) -> Result<OwnedFsevent, Error> {
    OwnedFsevent::build(|alloc| {
        let xattrs = hints::xattrs(alloc, names);
        Ok(Fsevent::xattr(alloc, id, &xattrs))
    })
    .map_err(Error::from)
}

fn symlink_enrich_event(id: &Id) -> Result<OwnedFsevent, Error> {
    OwnedFsevent::build(|alloc| {
        let xattrs = hints::symlink(alloc);
        Fsevent::upsert(alloc, id, &xattrs, None, None)
    })
    .map_err(Error::from)
}

/// The removal of one namespace entry: a delete when it was the entry's
/// last link and no archived copy remains, a plain unlink otherwise.
fn unlink_event(
    id: &Id,
    parent: &LuFid,
    name: &str,
    last_copy: bool,
) -> Result<OwnedFsevent, Error> {
    OwnedFsevent::build(|alloc| {
        if last_copy {
            return Ok(Fsevent::delete(id));
        }
        Ok(Fsevent::unlink(alloc, id, &fid_id(parent), name))
    })
    .map_err(Error::from)
}

fn expand_create(record: &ChangelogRecord, id: &Id) -> Result<Vec<OwnedFsevent>, Error> {
    Ok(vec![
        link_event(record, id)?,
        fid_xattr_event(record, id, true)?,
        statx_without_uidgid_event(record, id)?,
        parent_acmtime_event(&record.pfid)?,
    ])
}

fn expand_softlink(record: &ChangelogRecord, id: &Id) -> Result<Vec<OwnedFsevent>, Error> {
    Ok(vec![
        link_event(record, id)?,
        fid_xattr_event(record, id, false)?,
        statx_without_uidgid_event(record, id)?,
        parent_acmtime_event(&record.pfid)?,
        symlink_enrich_event(id)?,
    ])
}

fn expand_hardlink_or_mknod(record: &ChangelogRecord, id: &Id) -> Result<Vec<OwnedFsevent>, Error> {
    // No xattr fetch: a hardlink shares the target's xattrs, and special
    // files cannot carry any.
    Ok(vec![
        link_event(record, id)?,
        statx_without_uidgid_event(record, id)?,
        parent_acmtime_event(&record.pfid)?,
        lustre_xattr_event(id)?,
    ])
}

fn expand_setxattr(record: &ChangelogRecord, id: &Id) -> Result<Vec<OwnedFsevent>, Error> {
    let name = record.xattr.as_deref().ok_or_else(|| {
        Error::invalid(format!(
            "setxattr record {} without an xattr name",
            record.index,
        ))
    })?;
    Ok(vec![
        statx_event(id, statx::CTIME, None)?,
        fetch_xattrs_event(id, &[name])?,
    ])
}

fn expand_unlink(record: &ChangelogRecord, id: &Id) -> Result<Vec<OwnedFsevent>, Error> {
    let last_copy = record.flags & CLF_UNLINK_LAST != 0
        && record.flags & CLF_UNLINK_HSM_EXISTS == 0;
    Ok(vec![
        unlink_event(id, &record.pfid, &record.name, last_copy)?,
        parent_acmtime_event(&record.pfid)?,
    ])
}

/// A rename unlinks the source namespace entry and links the target one;
/// when the rename overwrote an entry, that entry is unlinked too.
fn expand_rename(record: &ChangelogRecord) -> Result<Vec<OwnedFsevent>, Error> {
    let rename = record.rename.as_ref().ok_or_else(|| {
        Error::invalid(format!(
            "rename record {} without a rename extension",
            record.index,
        ))
    })?;
    let source_id = fid_id(&rename.source_fid);
    let mut events = Vec::with_capacity(6);

    if !record.tfid.is_zero() {
        // The target fid is the overwritten entry.
        let last_copy = record.flags & CLF_RENAME_LAST != 0
            && record.flags & CLF_RENAME_LAST_EXISTS == 0;
        events.push(unlink_event(
            &fid_id(&record.tfid),
            &record.pfid,
            &record.name,
            last_copy,
        )?);
    }

    events.push(link_event(record, &source_id)?);
    events.push(statx_without_uidgid_event(record, &source_id)?);
    events.push(parent_acmtime_event(&record.pfid)?);
    events.push(unlink_event(
        &source_id,
        &rename.source_parent_fid,
        &rename.source_name,
        false,
    )?);
    events.push(parent_acmtime_event(&rename.source_parent_fid)?);

    Ok(events)
}

fn expand_hsm(id: &Id) -> Result<Vec<OwnedFsevent>, Error> {
    Ok(vec![
        statx_event(id, statx::BLOCKS, None)?,
        lustre_xattr_event(id)?,
        fetch_xattrs_event(id, &["trusted.lov"])?,
        fetch_xattrs_event(id, &["trusted.hsm"])?,
    ])
}

/// A metadata migration gives the entry a new FID: link the new one,
/// remove the old one, and refresh striping.
fn expand_migrate(record: &ChangelogRecord, id: &Id) -> Result<Vec<OwnedFsevent>, Error> {
    let migrate = record.rename.as_ref().ok_or_else(|| {
        Error::invalid(format!(
            "migrate record {} without a rename extension",
            record.index,
        ))
    })?;
    Ok(vec![
        link_event(record, id)?,
        statx_without_uidgid_event(record, id)?,
        parent_acmtime_event(&record.pfid)?,
        unlink_event(
            &fid_id(&migrate.source_fid),
            &migrate.source_parent_fid,
            &migrate.source_name,
            true,
        )?,
        parent_acmtime_event(&migrate.source_parent_fid)?,
        lustre_xattr_event(id)?,
    ])
}

/// Expand one record into its batch of partial fsevents. An empty batch
/// means the record type is not mirrored and the record is skipped.
pub fn expand_record(record: &ChangelogRecord) -> Result<Vec<OwnedFsevent>, Error> {
    let id = fid_id(&record.tfid);

    match record.rtype {
        RecordType::Create | RecordType::Mkdir => expand_create(record, &id),
        RecordType::Setxattr => expand_setxattr(record, &id),
        RecordType::Setattr => Ok(vec![statx_event(&id, statx::ALL, None)?]),
        RecordType::Close | RecordType::Mtime => Ok(vec![statx_event(
            &id,
            statx::MTIME | statx::SIZE | statx::BLOCKS | statx::CTIME | statx::ATIME,
            None,
        )?]),
        RecordType::Ctime => Ok(vec![statx_event(
            &id,
            statx::CTIME | statx::ATIME,
            None,
        )?]),
        RecordType::Atime => Ok(vec![statx_event(&id, statx::ATIME, None)?]),
        RecordType::Softlink => expand_softlink(record, &id),
        RecordType::Hardlink | RecordType::Mknod => expand_hardlink_or_mknod(record, &id),
        RecordType::Unlink | RecordType::Rmdir => expand_unlink(record, &id),
        RecordType::Rename => expand_rename(record),
        RecordType::Hsm => expand_hsm(&id),
        RecordType::Trunc => Ok(vec![statx_event(
            &id,
            statx::CTIME | statx::MTIME | statx::SIZE,
            None,
        )?]),
        RecordType::Layout => Ok(vec![
            statx_event(&id, statx::CTIME, None)?,
            lustre_xattr_event(&id)?,
        ]),
        RecordType::Flrw => Ok(vec![
            statx_event(
                &id,
                statx::CTIME | statx::MTIME | statx::BLOCKS | statx::SIZE,
                None,
            )?,
            lustre_xattr_event(&id)?,
        ]),
        RecordType::Resync => Ok(vec![
            statx_event(&id, statx::CTIME | statx::BLOCKS, None)?,
            lustre_xattr_event(&id)?,
        ]),
        RecordType::Migrate => expand_migrate(record, &id),
        // Not mirrored.
        RecordType::Mark
        | RecordType::Ext
        | RecordType::Open
        | RecordType::GetXattr
        | RecordType::DnOpen => Ok(Vec::new()),
    }
}
