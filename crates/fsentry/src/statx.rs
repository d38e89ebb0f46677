// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! A masked metadata snapshot.
//!
//! The layout mirrors the kernel's `struct statx`, with one twist: every
//! timestamp has separate presence bits for its seconds and nanoseconds, and
//! every device number for its major and minor half, so that a snapshot can
//! record exactly which halves a source provided.

/// Presence bits of a [`Statx`] mask.
pub const TYPE: u32 = 0x0000_0001;
pub const MODE: u32 = 0x0000_0002;
pub const NLINK: u32 = 0x0000_0004;
pub const UID: u32 = 0x0000_0008;
pub const GID: u32 = 0x0000_0010;
pub const ATIME_SEC: u32 = 0x0000_0020;
pub const MTIME_SEC: u32 = 0x0000_0040;
pub const CTIME_SEC: u32 = 0x0000_0080;
pub const INO: u32 = 0x0000_0100;
pub const SIZE: u32 = 0x0000_0200;
pub const BLOCKS: u32 = 0x0000_0400;
pub const BTIME_SEC: u32 = 0x0000_0800;
pub const MNT_ID: u32 = 0x0000_1000;
pub const BLKSIZE: u32 = 0x0000_2000;
pub const ATTRIBUTES: u32 = 0x0000_4000;
pub const ATIME_NSEC: u32 = 0x0000_8000;
pub const BTIME_NSEC: u32 = 0x0001_0000;
pub const CTIME_NSEC: u32 = 0x0002_0000;
pub const MTIME_NSEC: u32 = 0x0004_0000;
pub const RDEV_MAJOR: u32 = 0x0008_0000;
pub const RDEV_MINOR: u32 = 0x0010_0000;
pub const DEV_MAJOR: u32 = 0x0020_0000;
pub const DEV_MINOR: u32 = 0x0040_0000;

pub const ATIME: u32 = ATIME_SEC | ATIME_NSEC;
pub const BTIME: u32 = BTIME_SEC | BTIME_NSEC;
pub const CTIME: u32 = CTIME_SEC | CTIME_NSEC;
pub const MTIME: u32 = MTIME_SEC | MTIME_NSEC;
pub const RDEV: u32 = RDEV_MAJOR | RDEV_MINOR;
pub const DEV: u32 = DEV_MAJOR | DEV_MINOR;

/// The fields `stat(2)` can always provide.
pub const BASIC_STATS: u32 =
    TYPE | MODE | NLINK | UID | GID | ATIME | MTIME | CTIME | INO | SIZE | BLOCKS | BLKSIZE | RDEV
        | DEV;

pub const ALL: u32 = 0x007f_ffff;

/// Bits of [`Statx::attributes`] (a subset of the kernel's `STATX_ATTR_*`).
pub const ATTR_COMPRESSED: u64 = 0x0000_0004;
pub const ATTR_IMMUTABLE: u64 = 0x0000_0010;
pub const ATTR_APPEND: u64 = 0x0000_0020;
pub const ATTR_NODUMP: u64 = 0x0000_0040;
pub const ATTR_ENCRYPTED: u64 = 0x0000_0800;
pub const ATTR_AUTOMOUNT: u64 = 0x0000_1000;
pub const ATTR_MOUNT_ROOT: u64 = 0x0000_2000;
pub const ATTR_VERITY: u64 = 0x0010_0000;
pub const ATTR_DAX: u64 = 0x0020_0000;

/// The file-type half of a mode.
pub const S_IFMT: u16 = 0o170000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatxTimestamp {
    pub sec: i64,
    pub nsec: u32,
}

/// A metadata snapshot; only the fields whose bit is set in `mask` are
/// meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statx {
    pub mask: u32,
    pub blksize: u32,
    /// Attribute flags, further narrowed by `attributes_mask`: only the bits
    /// set in the mask carry information.
    pub attributes: u64,
    pub attributes_mask: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u16,
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: StatxTimestamp,
    pub btime: StatxTimestamp,
    pub ctime: StatxTimestamp,
    pub mtime: StatxTimestamp,
    pub rdev_major: u32,
    pub rdev_minor: u32,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub mnt_id: u64,
}

impl Statx {
    /// Copy into `self` every field whose presence bit is set in
    /// `override_.mask`, and accumulate the mask.
    ///
    /// The type and permission halves of `mode` merge independently, under
    /// their respective bits.
    pub fn merge(&mut self, override_: &Statx) {
        let mask = override_.mask;
        self.mask |= mask;

        if mask & TYPE != 0 {
            self.mode = (self.mode & !S_IFMT) | (override_.mode & S_IFMT);
        }
        if mask & MODE != 0 {
            self.mode = (self.mode & S_IFMT) | (override_.mode & !S_IFMT);
        }
        if mask & NLINK != 0 {
            self.nlink = override_.nlink;
        }
        if mask & UID != 0 {
            self.uid = override_.uid;
        }
        if mask & GID != 0 {
            self.gid = override_.gid;
        }
        if mask & ATIME_SEC != 0 {
            self.atime.sec = override_.atime.sec;
        }
        if mask & ATIME_NSEC != 0 {
            self.atime.nsec = override_.atime.nsec;
        }
        if mask & BTIME_SEC != 0 {
            self.btime.sec = override_.btime.sec;
        }
        if mask & BTIME_NSEC != 0 {
            self.btime.nsec = override_.btime.nsec;
        }
        if mask & CTIME_SEC != 0 {
            self.ctime.sec = override_.ctime.sec;
        }
        if mask & CTIME_NSEC != 0 {
            self.ctime.nsec = override_.ctime.nsec;
        }
        if mask & MTIME_SEC != 0 {
            self.mtime.sec = override_.mtime.sec;
        }
        if mask & MTIME_NSEC != 0 {
            self.mtime.nsec = override_.mtime.nsec;
        }
        if mask & INO != 0 {
            self.ino = override_.ino;
        }
        if mask & SIZE != 0 {
            self.size = override_.size;
        }
        if mask & BLOCKS != 0 {
            self.blocks = override_.blocks;
        }
        if mask & MNT_ID != 0 {
            self.mnt_id = override_.mnt_id;
        }
        if mask & BLKSIZE != 0 {
            self.blksize = override_.blksize;
        }
        if mask & ATTRIBUTES != 0 {
            self.attributes_mask = override_.attributes_mask;
            self.attributes = override_.attributes;
        }
        if mask & RDEV_MAJOR != 0 {
            self.rdev_major = override_.rdev_major;
        }
        if mask & RDEV_MINOR != 0 {
            self.rdev_minor = override_.rdev_minor;
        }
        if mask & DEV_MAJOR != 0 {
            self.dev_major = override_.dev_major;
        }
        if mask & DEV_MINOR != 0 {
            self.dev_minor = override_.dev_minor;
        }
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }
}

/// Map a field name (`atime`, `size`, ...) to its full presence mask.
pub fn field_mask(name: &str) -> Option<u32> {
    Some(match name {
        "type" => TYPE,
        "mode" => MODE,
        "nlink" => NLINK,
        "uid" => UID,
        "gid" => GID,
        "atime" => ATIME,
        "mtime" => MTIME,
        "ctime" => CTIME,
        "btime" => BTIME,
        "ino" => INO,
        "size" => SIZE,
        "blocks" => BLOCKS,
        "blksize" => BLKSIZE,
        "attributes" => ATTRIBUTES,
        "rdev" => RDEV,
        "dev" => DEV,
        "mnt-id" => MNT_ID,
        _ => return None,
    })
}

/// Map a sub-field of a timestamp (`sec` / `nsec`) to its bit.
pub fn timestamp_mask(field: &str, sub: &str) -> Option<u32> {
    let (sec, nsec) = match field {
        "atime" => (ATIME_SEC, ATIME_NSEC),
        "btime" => (BTIME_SEC, BTIME_NSEC),
        "ctime" => (CTIME_SEC, CTIME_NSEC),
        "mtime" => (MTIME_SEC, MTIME_NSEC),
        _ => return None,
    };
    match sub {
        "sec" => Some(sec),
        "nsec" => Some(nsec),
        _ => None,
    }
}

/// Map a sub-field of a device number (`major` / `minor`) to its bit.
pub fn device_mask(field: &str, sub: &str) -> Option<u32> {
    let (major, minor) = match field {
        "rdev" => (RDEV_MAJOR, RDEV_MINOR),
        "dev" => (DEV_MAJOR, DEV_MINOR),
        _ => return None,
    };
    match sub {
        "major" => Some(major),
        "minor" => Some(minor),
        _ => None,
    }
}

/// Map a dotted field path (`mtime`, `mtime.sec`, `rdev.major`, ...) to its
/// presence mask.
pub fn mask_from_path(path: &str) -> Option<u32> {
    match path.split_once('.') {
        None => field_mask(path),
        Some((field, sub)) => timestamp_mask(field, sub).or_else(|| device_mask(field, sub)),
    }
}

/// The file type carried in the `TYPE` half of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Socket,
    Symlink,
    Regular,
    BlockDevice,
    Directory,
    CharacterDevice,
    Fifo,
}

impl FileType {
    pub fn from_mode(mode: u16) -> Option<FileType> {
        Some(match mode & S_IFMT {
            0o140000 => FileType::Socket,
            0o120000 => FileType::Symlink,
            0o100000 => FileType::Regular,
            0o060000 => FileType::BlockDevice,
            0o040000 => FileType::Directory,
            0o020000 => FileType::CharacterDevice,
            0o010000 => FileType::Fifo,
            _ => return None,
        })
    }

    pub fn to_mode(self) -> u16 {
        match self {
            FileType::Socket => 0o140000,
            FileType::Symlink => 0o120000,
            FileType::Regular => 0o100000,
            FileType::BlockDevice => 0o060000,
            FileType::Directory => 0o040000,
            FileType::CharacterDevice => 0o020000,
            FileType::Fifo => 0o010000,
        }
    }

    /// The name used on the YAML wire and in filter values.
    pub fn name(self) -> &'static str {
        match self {
            FileType::Socket => "socket",
            FileType::Symlink => "link",
            FileType::Regular => "file",
            FileType::BlockDevice => "blockdev",
            FileType::Directory => "directory",
            FileType::CharacterDevice => "chardev",
            FileType::Fifo => "fifo",
        }
    }

    pub fn from_name(name: &str) -> Option<FileType> {
        Some(match name {
            "socket" => FileType::Socket,
            "link" => FileType::Symlink,
            "file" => FileType::Regular,
            "blockdev" => FileType::BlockDevice,
            "directory" => FileType::Directory,
            "chardev" => FileType::CharacterDevice,
            "fifo" => FileType::Fifo,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Statx {
        Statx {
            mask: SIZE | MTIME_SEC | TYPE | MODE,
            size: 10,
            mtime: StatxTimestamp { sec: 42, nsec: 0 },
            mode: FileType::Regular.to_mode() | 0o644,
            ..Default::default()
        }
    }

    #[test]
    fn merge_is_field_wise() {
        let mut stored = Statx {
            mask: SIZE,
            size: 3,
            ..Default::default()
        };
        stored.merge(&sample());

        assert_eq!(stored.mask, SIZE | MTIME_SEC | TYPE | MODE);
        assert_eq!(stored.size, 10);
        assert_eq!(stored.mtime.sec, 42);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut statx = sample();
        statx.merge(&sample());
        assert_eq!(statx, sample());
    }

    #[test]
    fn merge_splits_type_and_permissions() {
        let mut statx = Statx {
            mask: TYPE,
            mode: FileType::Directory.to_mode(),
            ..Default::default()
        };
        statx.merge(&Statx {
            mask: MODE,
            mode: 0o755,
            ..Default::default()
        });

        assert_eq!(statx.file_type(), Some(FileType::Directory));
        assert_eq!(statx.mode & !S_IFMT, 0o755);
    }

    #[test]
    fn masks_parse_from_paths() {
        assert_eq!(mask_from_path("size"), Some(SIZE));
        assert_eq!(mask_from_path("atime"), Some(ATIME_SEC | ATIME_NSEC));
        assert_eq!(mask_from_path("mtime.sec"), Some(MTIME_SEC));
        assert_eq!(mask_from_path("rdev.major"), Some(RDEV_MAJOR));
        assert_eq!(mask_from_path("mtime.major"), None);
        assert_eq!(mask_from_path("nope"), None);
        assert_eq!(mask_from_path("size.sec"), None);
    }

    #[test]
    fn file_types_round_trip() {
        for name in ["socket", "link", "file", "blockdev", "directory", "chardev", "fifo"] {
            let filetype = FileType::from_name(name).unwrap();
            assert_eq!(filetype.name(), name);
            assert_eq!(FileType::from_mode(filetype.to_mode()), Some(filetype));
        }
        assert_eq!(FileType::from_mode(0), None);
    }
}
