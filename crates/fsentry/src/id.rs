// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::fmt;
use std::str::FromStr;

use tinyvec::TinyVec;

use crate::Error;

/// The largest identity a backend is required to store.
pub const MAX_ID_SIZE: usize = 128;

/// Opaque byte identity of an fsentry in a backend.
///
/// The empty Id is the root-parent sentinel: the namespace entry whose
/// parent is the empty Id (and whose name is empty) is the root.
///
/// While nothing mandates it, an Id is expected to have a very specific
/// format which allows it to be converted to and from a kernel file handle.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(TinyVec<[u8; 32]>);

impl Id {
    pub fn root_parent() -> Id {
        Id::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Id, Error> {
        if bytes.len() > MAX_ID_SIZE {
            return Err(Error::OutOfRange(format!("id of {} bytes", bytes.len())));
        }
        let mut data = TinyVec::new();
        data.extend_from_slice(bytes);
        Ok(Id(data))
    }

    /// Pack a kernel file handle: the handle type followed by the handle
    /// bytes, in native byte order.
    pub fn from_file_handle(handle_type: i32, handle: &[u8]) -> Result<Id, Error> {
        if handle.len() + 4 > MAX_ID_SIZE {
            return Err(Error::OutOfRange(format!(
                "file handle of {} bytes",
                handle.len()
            )));
        }
        let mut data = TinyVec::new();
        data.extend_from_slice(&handle_type.to_ne_bytes());
        data.extend_from_slice(handle);
        Ok(Id(data))
    }

    /// Recover the `(handle_type, handle_bytes)` of an Id built with
    /// [`Id::from_file_handle`].
    pub fn as_file_handle(&self) -> Option<(i32, &[u8])> {
        if self.0.len() < 4 {
            return None;
        }
        let (head, handle) = self.0.split_at(4);
        // Unwrap because `head` is exactly 4 bytes long.
        Some((i32::from_ne_bytes(head.try_into().unwrap()), handle))
    }

    /// Pack the 16-byte wire representation of a Lustre FID.
    pub fn from_lu_fid(fid: &LuFid) -> Id {
        let mut data = TinyVec::new();
        data.extend_from_slice(&fid.seq.to_le_bytes());
        data.extend_from_slice(&fid.oid.to_le_bytes());
        data.extend_from_slice(&fid.ver.to_le_bytes());
        Id(data)
    }

    pub fn as_lu_fid(&self) -> Option<LuFid> {
        let bytes: &[u8; 16] = self.0.as_slice().try_into().ok()?;
        Some(LuFid {
            seq: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            oid: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            ver: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Is this the root-parent sentinel?
    pub fn is_root_parent(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// A Lustre file identifier.
///
/// This mirrors the 16-byte on-wire layout so that RobinHood does not have
/// to depend on Lustre itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LuFid {
    pub seq: u64,
    pub oid: u32,
    pub ver: u32,
}

impl LuFid {
    pub fn new(seq: u64, oid: u32, ver: u32) -> LuFid {
        LuFid { seq, oid, ver }
    }

    pub fn is_zero(&self) -> bool {
        self.seq == 0 && self.oid == 0 && self.ver == 0
    }
}

fn parse_hex_part(part: &str, fid_string: &str) -> Result<u64, Error> {
    let digits = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X"));
    let digits = digits.unwrap_or(part);
    if digits.is_empty() {
        return Err(Error::invalid(format!("not a fid: '{fid_string}'")));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|_| Error::invalid(format!("not a fid: '{fid_string}'")))
}

impl FromStr for LuFid {
    type Err = Error;

    /// Parse the `0x<seq>:0x<oid>:0x<ver>` form (the `0x` prefixes are
    /// optional, brackets are not accepted).
    fn from_str(string: &str) -> Result<LuFid, Error> {
        let mut parts = string.split(':');
        let (seq, oid, ver) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(seq), Some(oid), Some(ver), None) => (seq, oid, ver),
            _ => return Err(Error::invalid(format!("not a fid: '{string}'"))),
        };

        let seq = parse_hex_part(seq, string)?;
        let oid = parse_hex_part(oid, string)?;
        let ver = parse_hex_part(ver, string)?;

        Ok(LuFid {
            seq,
            oid: u32::try_from(oid).map_err(|_| Error::OutOfRange(format!("fid oid '{oid:#x}'")))?,
            ver: u32::try_from(ver).map_err(|_| Error::OutOfRange(format!("fid ver '{ver:#x}'")))?,
        })
    }
}

impl fmt::Display for LuFid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}:0x{:x}:0x{:x}", self.seq, self.oid, self.ver)
    }
}
