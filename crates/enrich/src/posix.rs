// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Raw filesystem access for the enricher: opening inodes by identity and
//! reading their metadata, xattrs and symlink targets.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use fsentry::statx::{self, StatxTimestamp};
use fsentry::{Id, Statx};

/// The Linux VFS does not allow xattr values of more than 64KiB.
pub const XATTR_VALUE_MAX: usize = 1 << 16;

/// Nor symlinks longer than that.
pub const SYMLINK_MAX: usize = 1 << 16;

/// Open an inode through the mount it lives under.
///
/// The id is expected to be a packed kernel file handle; when the kernel
/// refuses handle-based opens (insufficient privilege, or a filesystem
/// without handles), `path` — when known — is used as a fallback, resolved
/// relative to the mount.
pub fn open_by_id(
    mount: &File,
    id: &Id,
    path: Option<&str>,
    flags: libc::c_int,
) -> io::Result<File> {
    let by_handle = open_by_handle(mount, id, flags);
    match by_handle {
        Ok(file) => Ok(file),
        Err(error) => match path {
            Some(path) => open_by_path(mount, path, flags),
            None => Err(error),
        },
    }
}

#[cfg(target_os = "linux")]
fn open_by_handle(mount: &File, id: &Id, flags: libc::c_int) -> io::Result<File> {
    let Some((handle_type, handle_bytes)) = id.as_file_handle() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "id is not a file handle",
        ));
    };

    // struct file_handle { u32 handle_bytes; i32 handle_type; u8 f_handle[]; }
    let mut handle = Vec::with_capacity(8 + handle_bytes.len());
    handle.extend_from_slice(&(handle_bytes.len() as u32).to_ne_bytes());
    handle.extend_from_slice(&handle_type.to_ne_bytes());
    handle.extend_from_slice(handle_bytes);

    let fd = unsafe {
        libc::syscall(
            libc::SYS_open_by_handle_at,
            mount.as_raw_fd(),
            handle.as_ptr(),
            flags,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { File::from_raw_fd(fd as RawFd) })
}

#[cfg(not(target_os = "linux"))]
fn open_by_handle(_mount: &File, _id: &Id, _flags: libc::c_int) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "handle-based opens are not available",
    ))
}

fn open_by_path(mount: &File, path: &str, flags: libc::c_int) -> io::Result<File> {
    let path = CString::new(path.trim_start_matches('/'))
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path holds a NUL byte"))?;
    let fd = unsafe { libc::openat(mount.as_raw_fd(), path.as_ptr(), flags) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Fetch the metadata of an already-opened inode.
///
/// On a statx-capable kernel this is a single call honoring `force_sync`;
/// elsewhere the snapshot is synthesized from `fstat` and `force_sync`
/// is refused.
#[cfg(target_os = "linux")]
pub fn statx_fd(file: &File, mask: u32, force_sync: bool) -> io::Result<Statx> {
    let mut flags = libc::AT_EMPTY_PATH | libc::AT_NO_AUTOMOUNT | libc::AT_SYMLINK_NOFOLLOW;
    if force_sync {
        flags |= libc::AT_STATX_FORCE_SYNC;
    }

    // The kernel only knows the low mask bits; nanosecond and device-half
    // requests widen to their whole field.
    const KERNEL_MASK: u32 = 0x1fff;
    let mut out = unsafe { std::mem::zeroed::<libc::statx>() };
    let empty = [0 as libc::c_char];
    let rc = unsafe {
        libc::statx(
            file.as_raw_fd(),
            empty.as_ptr(),
            flags,
            (mask & KERNEL_MASK) | kernel_extra_bits(mask),
            &mut out,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(statx_from_kernel(&out))
}

#[cfg(not(target_os = "linux"))]
pub fn statx_fd(file: &File, _mask: u32, force_sync: bool) -> io::Result<Statx> {
    use std::os::unix::fs::MetadataExt;

    if force_sync {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "force-sync requires statx",
        ));
    }

    let meta = file.metadata()?;
    let mut statxbuf = Statx {
        mask: statx::BASIC_STATS,
        blksize: meta.blksize() as u32,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        mode: meta.mode() as u16,
        ino: meta.ino(),
        size: meta.size(),
        blocks: meta.blocks(),
        atime: StatxTimestamp {
            sec: meta.atime(),
            nsec: meta.atime_nsec() as u32,
        },
        mtime: StatxTimestamp {
            sec: meta.mtime(),
            nsec: meta.mtime_nsec() as u32,
        },
        ctime: StatxTimestamp {
            sec: meta.ctime(),
            nsec: meta.ctime_nsec() as u32,
        },
        ..Default::default()
    };
    statxbuf.rdev_major = (meta.rdev() >> 8) as u32;
    statxbuf.rdev_minor = (meta.rdev() & 0xff) as u32;
    statxbuf.dev_major = (meta.dev() >> 8) as u32;
    statxbuf.dev_minor = (meta.dev() & 0xff) as u32;
    Ok(statxbuf)
}

#[cfg(target_os = "linux")]
fn kernel_extra_bits(mask: u32) -> u32 {
    // The kernel has no separate nanosecond or device-half bits; asking for
    // any half asks for the whole field.
    let mut kernel = 0;
    if mask & statx::ATIME != 0 {
        kernel |= statx::ATIME_SEC;
    }
    if mask & statx::BTIME != 0 {
        kernel |= statx::BTIME_SEC;
    }
    if mask & statx::CTIME != 0 {
        kernel |= statx::CTIME_SEC;
    }
    if mask & statx::MTIME != 0 {
        kernel |= statx::MTIME_SEC;
    }
    kernel
}

/// Widen the kernel's mask to this crate's: blksize, attributes and device
/// numbers are always filled, and a present timestamp has both halves.
#[cfg(target_os = "linux")]
fn statx_from_kernel(out: &libc::statx) -> Statx {
    let mut mask =
        out.stx_mask | statx::ATTRIBUTES | statx::BLKSIZE | statx::RDEV | statx::DEV;
    for (sec, nsec) in [
        (statx::ATIME_SEC, statx::ATIME_NSEC),
        (statx::BTIME_SEC, statx::BTIME_NSEC),
        (statx::CTIME_SEC, statx::CTIME_NSEC),
        (statx::MTIME_SEC, statx::MTIME_NSEC),
    ] {
        if mask & sec != 0 {
            mask |= nsec;
        }
    }

    Statx {
        mask,
        blksize: out.stx_blksize,
        attributes: out.stx_attributes,
        attributes_mask: out.stx_attributes_mask,
        nlink: out.stx_nlink,
        uid: out.stx_uid,
        gid: out.stx_gid,
        mode: out.stx_mode,
        ino: out.stx_ino,
        size: out.stx_size,
        blocks: out.stx_blocks,
        atime: StatxTimestamp {
            sec: out.stx_atime.tv_sec,
            nsec: out.stx_atime.tv_nsec,
        },
        btime: StatxTimestamp {
            sec: out.stx_btime.tv_sec,
            nsec: out.stx_btime.tv_nsec,
        },
        ctime: StatxTimestamp {
            sec: out.stx_ctime.tv_sec,
            nsec: out.stx_ctime.tv_nsec,
        },
        mtime: StatxTimestamp {
            sec: out.stx_mtime.tv_sec,
            nsec: out.stx_mtime.tv_nsec,
        },
        rdev_major: out.stx_rdev_major,
        rdev_minor: out.stx_rdev_minor,
        dev_major: out.stx_dev_major,
        dev_minor: out.stx_dev_minor,
        mnt_id: 0,
    }
}

/// Read the value of one xattr into `buffer`, returning the value's length.
pub fn get_xattr(file: &File, name: &str, buffer: &mut [u8]) -> io::Result<usize> {
    let name = CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "xattr name holds a NUL"))?;
    let length = unsafe {
        libc::fgetxattr(
            file.as_raw_fd(),
            name.as_ptr(),
            buffer.as_mut_ptr().cast(),
            buffer.len(),
        )
    };
    if length < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(length as usize)
}

/// Read the target of an already-opened symlink.
pub fn read_link(file: &File) -> io::Result<String> {
    let mut buffer = vec![0u8; SYMLINK_MAX];
    let empty = [0 as libc::c_char];
    let length = unsafe {
        libc::readlinkat(
            file.as_raw_fd(),
            empty.as_ptr(),
            buffer.as_mut_ptr().cast(),
            buffer.len(),
        )
    };
    if length < 0 {
        return Err(io::Error::last_os_error());
    }
    buffer.truncate(length as usize);
    String::from_utf8(buffer)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "symlink target is not UTF-8"))
}
