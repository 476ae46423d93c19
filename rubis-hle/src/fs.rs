// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Virtual filesystem.
//!
//! Guest path prefixes (`/app0`, `/hostapp`, ...) map to host directories.
//! Resolution picks the longest matching mount and rejects any path whose
//! normalized form escapes the mount's host root. Descriptors start at 10
//! and are never reused; 0..9 are reserved for the standard streams.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, info, warn};
use parking_lot::Mutex;

use rubis_common::error::{
    SCE_KERNEL_ERROR_EACCES, SCE_KERNEL_ERROR_EBADF, SCE_KERNEL_ERROR_EINVAL,
    SCE_KERNEL_ERROR_ENOENT, SCE_KERNEL_ERROR_ENOSPC, SCE_OK,
};

/// POSIX-style open flags (FreeBSD values).
pub mod open_flags {
    pub const O_RDONLY: u32 = 0x0000;
    pub const O_WRONLY: u32 = 0x0001;
    pub const O_RDWR: u32 = 0x0002;
    pub const O_ACCMODE: u32 = 0x0003;
    pub const O_NONBLOCK: u32 = 0x0004;
    pub const O_APPEND: u32 = 0x0008;
    pub const O_CREAT: u32 = 0x0200;
    pub const O_TRUNC: u32 = 0x0400;
    pub const O_DIRECTORY: u32 = 0x0002_0000;
}

/// First descriptor handed out; 0..9 belong to the standard streams.
const FIRST_FD: i32 = 10;

/// Stat fields in the guest's packed layout order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStat {
    pub st_dev: u32,
    pub st_ino: u32,
    pub st_mode: u16,
    pub st_nlink: u16,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u32,
    pub st_size: i64,
    pub st_atime: i64,
    pub st_mtime: i64,
    pub st_ctime: i64,
    pub st_blksize: i64,
    pub st_blocks: i64,
}

/// One open file or directory.
struct FileHandle {
    host_path: PathBuf,
    flags: u32,
    is_directory: bool,
    file: Option<File>,
    /// Directory listing snapshot for getdents, taken on first read.
    dir_entries: Option<Vec<(String, bool)>>,
    dir_pos: usize,
}

struct VfsInner {
    mounts: HashMap<String, PathBuf>,
    open_files: HashMap<i32, FileHandle>,
    next_fd: i32,
    total_bytes_read: u64,
    total_bytes_written: u64,
}

/// The mount table and open-file table, mutex-guarded.
pub struct Vfs {
    inner: Mutex<VfsInner>,
}

impl Vfs {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VfsInner {
                mounts: HashMap::new(),
                open_files: HashMap::new(),
                next_fd: FIRST_FD,
                total_bytes_read: 0,
                total_bytes_written: 0,
            }),
        }
    }

    // -- Mount management ---------------------------------------------------

    /// Mount a guest prefix onto an existing host directory.
    pub fn mount(&self, guest_prefix: &str, host_path: &Path) -> bool {
        if !host_path.is_dir() {
            warn!(
                "mount failed: host path is not a directory: {}",
                host_path.display()
            );
            return false;
        }
        let canonical = match host_path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                warn!("mount failed: cannot canonicalize {}: {}", host_path.display(), e);
                return false;
            }
        };

        let normalized = Self::normalize_path(guest_prefix);
        info!("mounted {} -> {}", normalized, canonical.display());
        self.inner.lock().mounts.insert(normalized, canonical);
        true
    }

    pub fn unmount(&self, guest_prefix: &str) {
        let normalized = Self::normalize_path(guest_prefix);
        self.inner.lock().mounts.remove(&normalized);
    }

    pub fn clear_mounts(&self) {
        self.inner.lock().mounts.clear();
    }

    pub fn mount_count(&self) -> usize {
        self.inner.lock().mounts.len()
    }

    pub fn open_file_count(&self) -> usize {
        self.inner.lock().open_files.len()
    }

    // -- Path resolution ----------------------------------------------------

    /// Normalize a guest path: forward slashes, leading `/`, no trailing `/`.
    pub fn normalize_path(path: &str) -> String {
        let mut result: String = path.replace('\\', "/");
        while result.ends_with('/') {
            result.pop();
        }
        if !result.starts_with('/') {
            result.insert(0, '/');
        }
        result
    }

    /// Resolve a guest path to a host path, or None when no mount matches or
    /// the path escapes its mount root.
    pub fn resolve(&self, guest_path: &str) -> Option<PathBuf> {
        let normalized = Self::normalize_path(guest_path);
        let inner = self.inner.lock();

        // Longest-prefix mount match.
        let (prefix, host_root) = inner
            .mounts
            .iter()
            .filter(|(prefix, _)| normalized.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())?;

        let remainder = normalized[prefix.len()..].trim_start_matches('/');
        let joined = host_root.join(remainder);
        let host_root = host_root.clone();
        drop(inner);

        // Escape check: normalize away dot segments, then require the mount
        // root to remain a prefix; re-check through symlinks when the target
        // exists.
        let lexical = lexical_normalize(&joined)?;
        if !lexical.starts_with(&host_root) {
            warn!("path escape attempt blocked: {}", guest_path);
            return None;
        }
        if lexical.exists() {
            let canonical = lexical.canonicalize().ok()?;
            if !canonical.starts_with(&host_root) {
                warn!("symlink escape attempt blocked: {}", guest_path);
                return None;
            }
            return Some(canonical);
        }
        Some(lexical)
    }

    pub fn exists(&self, guest_path: &str) -> bool {
        self.resolve(guest_path).is_some_and(|p| p.exists())
    }

    // -- File operations ----------------------------------------------------

    /// Open a file or directory; returns the new fd or a negative SCE error.
    pub fn open(&self, guest_path: &str, flags: u32, _mode: u32) -> i32 {
        use open_flags::*;

        let host_path = match self.resolve(guest_path) {
            Some(p) => p,
            None => {
                debug!("open failed: cannot resolve {}", guest_path);
                return SCE_KERNEL_ERROR_ENOENT;
            }
        };

        if flags & O_DIRECTORY != 0 {
            if !host_path.is_dir() {
                return SCE_KERNEL_ERROR_ENOENT;
            }
            let fd = self.insert_handle(FileHandle {
                host_path,
                flags,
                is_directory: true,
                file: None,
                dir_entries: None,
                dir_pos: 0,
            });
            debug!("opened directory {} -> fd={}", guest_path, fd);
            return fd;
        }

        if flags & O_CREAT == 0 && !host_path.exists() {
            return SCE_KERNEL_ERROR_ENOENT;
        }

        let mut options = OpenOptions::new();
        match flags & O_ACCMODE {
            O_RDWR => {
                options.read(true).write(true);
            }
            O_WRONLY => {
                options.write(true);
            }
            _ => {
                options.read(true);
            }
        }
        if flags & O_CREAT != 0 {
            options.write(true).create(true);
        }
        if flags & O_TRUNC != 0 {
            options.write(true).truncate(true);
        }
        if flags & O_APPEND != 0 {
            options.append(true);
        }

        let file = match options.open(&host_path) {
            Ok(f) => f,
            Err(e) => {
                debug!("open failed for {}: {}", guest_path, e);
                return SCE_KERNEL_ERROR_EACCES;
            }
        };

        let fd = self.insert_handle(FileHandle {
            host_path,
            flags,
            is_directory: false,
            file: Some(file),
            dir_entries: None,
            dir_pos: 0,
        });
        debug!("opened {} -> fd={}", guest_path, fd);
        fd
    }

    pub fn open_directory(&self, guest_path: &str) -> i32 {
        self.open(
            guest_path,
            open_flags::O_RDONLY | open_flags::O_DIRECTORY,
            0,
        )
    }

    fn insert_handle(&self, handle: FileHandle) -> i32 {
        let mut inner = self.inner.lock();
        let fd = inner.next_fd;
        inner.next_fd += 1;
        inner.open_files.insert(fd, handle);
        fd
    }

    pub fn close(&self, fd: i32) -> i32 {
        match self.inner.lock().open_files.remove(&fd) {
            Some(_) => SCE_OK,
            None => SCE_KERNEL_ERROR_EBADF,
        }
    }

    /// Read into `buf`; returns bytes read or a negative SCE error.
    pub fn read(&self, fd: i32, buf: &mut [u8]) -> i64 {
        let mut inner = self.inner.lock();
        let handle = match inner.open_files.get_mut(&fd) {
            Some(h) => h,
            None => return SCE_KERNEL_ERROR_EBADF as i64,
        };
        if handle.is_directory {
            return SCE_KERNEL_ERROR_EBADF as i64;
        }
        let file = match handle.file.as_mut() {
            Some(f) => f,
            None => return SCE_KERNEL_ERROR_EBADF as i64,
        };
        match file.read(buf) {
            Ok(n) => {
                inner.total_bytes_read += n as u64;
                n as i64
            }
            Err(_) => SCE_KERNEL_ERROR_EBADF as i64,
        }
    }

    /// Write `buf`; returns bytes written or a negative SCE error.
    pub fn write(&self, fd: i32, buf: &[u8]) -> i64 {
        let mut inner = self.inner.lock();
        let handle = match inner.open_files.get_mut(&fd) {
            Some(h) => h,
            None => return SCE_KERNEL_ERROR_EBADF as i64,
        };
        if handle.is_directory {
            return SCE_KERNEL_ERROR_EBADF as i64;
        }
        let file = match handle.file.as_mut() {
            Some(f) => f,
            None => return SCE_KERNEL_ERROR_EBADF as i64,
        };
        match file.write_all(buf) {
            Ok(()) => {
                inner.total_bytes_written += buf.len() as u64;
                buf.len() as i64
            }
            Err(_) => SCE_KERNEL_ERROR_ENOSPC as i64,
        }
    }

    /// Seek; whence 0 = SET, 1 = CUR, 2 = END. Returns the new position.
    pub fn seek(&self, fd: i32, offset: i64, whence: u32) -> i64 {
        let mut inner = self.inner.lock();
        let handle = match inner.open_files.get_mut(&fd) {
            Some(h) => h,
            None => return SCE_KERNEL_ERROR_EBADF as i64,
        };
        if handle.is_directory {
            return SCE_KERNEL_ERROR_EBADF as i64;
        }
        let file = match handle.file.as_mut() {
            Some(f) => f,
            None => return SCE_KERNEL_ERROR_EBADF as i64,
        };
        let pos = match whence {
            0 => SeekFrom::Start(offset as u64),
            1 => SeekFrom::Current(offset),
            2 => SeekFrom::End(offset),
            _ => return SCE_KERNEL_ERROR_EINVAL as i64,
        };
        match file.seek(pos) {
            Ok(p) => p as i64,
            Err(_) => SCE_KERNEL_ERROR_EINVAL as i64,
        }
    }

    /// Stat an open descriptor.
    pub fn stat_fd(&self, fd: i32) -> Result<FileStat, i32> {
        let inner = self.inner.lock();
        let handle = inner.open_files.get(&fd).ok_or(SCE_KERNEL_ERROR_EBADF)?;
        stat_host_path(&handle.host_path, handle.is_directory)
    }

    /// Stat a guest path.
    pub fn stat_path(&self, guest_path: &str) -> Result<FileStat, i32> {
        let host_path = self.resolve(guest_path).ok_or(SCE_KERNEL_ERROR_ENOENT)?;
        if !host_path.exists() {
            return Err(SCE_KERNEL_ERROR_ENOENT);
        }
        stat_host_path(&host_path, host_path.is_dir())
    }

    /// Remove a file.
    pub fn unlink(&self, guest_path: &str) -> i32 {
        let host_path = match self.resolve(guest_path) {
            Some(p) => p,
            None => return SCE_KERNEL_ERROR_ENOENT,
        };
        if !host_path.exists() {
            return SCE_KERNEL_ERROR_ENOENT;
        }
        match std::fs::remove_file(&host_path) {
            Ok(()) => SCE_OK,
            Err(_) => SCE_KERNEL_ERROR_EACCES,
        }
    }

    /// Produce up to `max_bytes` of BSD dirent records for a directory fd.
    /// The listing position persists across calls; an empty result means the
    /// listing is exhausted.
    pub fn read_dirents(&self, fd: i32, max_bytes: usize) -> Result<Vec<u8>, i32> {
        let mut inner = self.inner.lock();
        let handle = inner
            .open_files
            .get_mut(&fd)
            .ok_or(SCE_KERNEL_ERROR_EBADF)?;
        if !handle.is_directory {
            return Err(SCE_KERNEL_ERROR_EBADF);
        }

        if handle.dir_entries.is_none() {
            let mut entries = Vec::new();
            let listing =
                std::fs::read_dir(&handle.host_path).map_err(|_| SCE_KERNEL_ERROR_ENOENT)?;
            for item in listing.flatten() {
                let name = item.file_name().to_string_lossy().into_owned();
                let is_dir = item.file_type().map(|t| t.is_dir()).unwrap_or(false);
                entries.push((name, is_dir));
            }
            handle.dir_entries = Some(entries);
        }

        let entries = handle.dir_entries.as_deref().unwrap_or(&[]);
        let mut out = Vec::new();
        let mut pos = handle.dir_pos;
        let mut fileno = pos as u32 + 1;

        while pos < entries.len() {
            let (name, is_dir) = &entries[pos];
            let record = encode_dirent(fileno, name, *is_dir);
            if out.len() + record.len() > max_bytes {
                break;
            }
            out.extend_from_slice(&record);
            pos += 1;
            fileno += 1;
        }

        handle.dir_pos = pos;
        Ok(out)
    }

    pub fn total_bytes_read(&self) -> u64 {
        self.inner.lock().total_bytes_read
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.inner.lock().total_bytes_written
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
/// Returns None when `..` would climb above the path's root.
fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    return None;
                }
            }
            other => result.push(other),
        }
    }
    Some(result)
}

/// Classic 4.4BSD dirent: fileno u32, reclen u16, type u8, namlen u8, name.
/// Records are padded to 4-byte alignment.
fn encode_dirent(fileno: u32, name: &str, is_dir: bool) -> Vec<u8> {
    const DT_DIR: u8 = 4;
    const DT_REG: u8 = 8;

    let name_bytes = name.as_bytes();
    let namlen = name_bytes.len().min(255);
    let reclen = (8 + namlen + 1 + 3) & !3;

    let mut record = Vec::with_capacity(reclen);
    record.extend_from_slice(&fileno.to_le_bytes());
    record.extend_from_slice(&(reclen as u16).to_le_bytes());
    record.push(if is_dir { DT_DIR } else { DT_REG });
    record.push(namlen as u8);
    record.extend_from_slice(&name_bytes[..namlen]);
    record.resize(reclen, 0);
    record
}

fn stat_host_path(path: &Path, is_directory: bool) -> Result<FileStat, i32> {
    let metadata = std::fs::metadata(path).map_err(|_| SCE_KERNEL_ERROR_ENOENT)?;

    let mut stat = FileStat::default();
    if is_directory {
        stat.st_mode = 0o040755;
        stat.st_size = 0;
    } else {
        stat.st_mode = 0o100644;
        stat.st_size = metadata.len() as i64;
    }

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    stat.st_mtime = mtime;
    stat.st_atime = mtime;
    stat.st_ctime = mtime;
    stat.st_blksize = 4096;
    stat.st_blocks = (stat.st_size + 511) / 512;
    stat.st_nlink = 1;

    Ok(stat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    /// Per-test scratch directory, removed on drop.
    struct ScratchDir {
        path: PathBuf,
    }

    impl ScratchDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!(
                "rubis-vfs-test-{}-{}",
                std::process::id(),
                DIR_SEQ.fetch_add(1, Ordering::Relaxed)
            ));
            std::fs::create_dir_all(&path).expect("create scratch dir");
            Self { path }
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    fn mounted_vfs(dir: &ScratchDir) -> Vfs {
        let vfs = Vfs::new();
        assert!(vfs.mount("/app0", &dir.path));
        vfs
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(Vfs::normalize_path("/app0/"), "/app0");
        assert_eq!(Vfs::normalize_path("app0"), "/app0");
        assert_eq!(Vfs::normalize_path("\\app0\\data"), "/app0/data");
        assert_eq!(Vfs::normalize_path("/app0/data///"), "/app0/data");
    }

    #[test]
    fn test_mount_requires_existing_dir() {
        let vfs = Vfs::new();
        assert!(!vfs.mount("/app0", Path::new("/nonexistent/rubis/dir")));
        assert_eq!(vfs.mount_count(), 0);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let outer = ScratchDir::new();
        let inner = ScratchDir::new();
        std::fs::write(inner.path.join("probe.txt"), b"inner").unwrap();

        let vfs = Vfs::new();
        assert!(vfs.mount("/app0", &outer.path));
        assert!(vfs.mount("/app0/deep", &inner.path));

        let resolved = vfs.resolve("/app0/deep/probe.txt").expect("resolve");
        assert!(resolved.starts_with(inner.path.canonicalize().unwrap()));
    }

    #[test]
    fn test_escape_attempt_blocked() {
        let dir = ScratchDir::new();
        let vfs = mounted_vfs(&dir);
        assert!(vfs.resolve("/app0/../../etc/passwd").is_none());
        assert!(vfs.resolve("/app0/sub/../../../etc/passwd").is_none());
        // A dotdot that stays inside the mount is fine.
        assert!(vfs.resolve("/app0/sub/../file.bin").is_some());
    }

    #[test]
    fn test_open_missing_file_is_enoent() {
        let dir = ScratchDir::new();
        let vfs = mounted_vfs(&dir);
        let fd = vfs.open("/app0/missing.bin", open_flags::O_RDONLY, 0);
        assert_eq!(fd, SCE_KERNEL_ERROR_ENOENT);
        assert_eq!(vfs.open_file_count(), 0);
    }

    #[test]
    fn test_open_escape_allocates_no_fd() {
        let dir = ScratchDir::new();
        let vfs = mounted_vfs(&dir);
        let fd = vfs.open("/app0/../../etc/passwd", open_flags::O_RDONLY, 0);
        assert_eq!(fd, SCE_KERNEL_ERROR_ENOENT);
        assert_eq!(vfs.open_file_count(), 0);
    }

    #[test]
    fn test_write_seek_read_roundtrip() {
        let dir = ScratchDir::new();
        let vfs = mounted_vfs(&dir);

        let fd = vfs.open(
            "/app0/save.dat",
            open_flags::O_RDWR | open_flags::O_CREAT,
            0o644,
        );
        assert!(fd >= FIRST_FD);

        assert_eq!(vfs.write(fd, b"hello world"), 11);
        assert_eq!(vfs.seek(fd, 0, 0), 0);

        let mut buf = [0u8; 11];
        assert_eq!(vfs.read(fd, &mut buf), 11);
        assert_eq!(&buf, b"hello world");

        assert_eq!(vfs.seek(fd, 6, 0), 6);
        let mut tail = [0u8; 5];
        assert_eq!(vfs.read(fd, &mut tail), 5);
        assert_eq!(&tail, b"world");

        assert_eq!(vfs.close(fd), SCE_OK);
    }

    #[test]
    fn test_fd_lifecycle_and_ebadf() {
        let dir = ScratchDir::new();
        std::fs::write(dir.path.join("a.bin"), b"abc").unwrap();
        let vfs = mounted_vfs(&dir);

        let fd = vfs.open("/app0/a.bin", open_flags::O_RDONLY, 0);
        assert!(fd >= FIRST_FD);
        assert_eq!(vfs.close(fd), SCE_OK);

        // Closed fd must answer EBADF everywhere.
        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(fd, &mut buf), SCE_KERNEL_ERROR_EBADF as i64);
        assert_eq!(vfs.write(fd, b"x"), SCE_KERNEL_ERROR_EBADF as i64);
        assert_eq!(vfs.seek(fd, 0, 0), SCE_KERNEL_ERROR_EBADF as i64);
        assert!(vfs.stat_fd(fd).is_err());
        assert_eq!(vfs.close(fd), SCE_KERNEL_ERROR_EBADF);
    }

    #[test]
    fn test_fds_are_monotonic_and_never_reused() {
        let dir = ScratchDir::new();
        std::fs::write(dir.path.join("a.bin"), b"a").unwrap();
        let vfs = mounted_vfs(&dir);

        let fd1 = vfs.open("/app0/a.bin", open_flags::O_RDONLY, 0);
        assert_eq!(fd1, FIRST_FD);
        vfs.close(fd1);
        let fd2 = vfs.open("/app0/a.bin", open_flags::O_RDONLY, 0);
        assert_eq!(fd2, FIRST_FD + 1);
    }

    #[test]
    fn test_stat_fields() {
        let dir = ScratchDir::new();
        std::fs::write(dir.path.join("data.bin"), vec![0u8; 1500]).unwrap();
        let vfs = mounted_vfs(&dir);

        let stat = vfs.stat_path("/app0/data.bin").expect("stat");
        assert_eq!(stat.st_mode, 0o100644);
        assert_eq!(stat.st_size, 1500);
        assert_eq!(stat.st_blksize, 4096);
        assert_eq!(stat.st_blocks, 3); // ceil(1500 / 512)
        assert_eq!(stat.st_nlink, 1);
        assert!(stat.st_mtime > 0);

        let dstat = vfs.stat_path("/app0").expect("stat dir");
        assert_eq!(dstat.st_mode, 0o040755);
        assert_eq!(dstat.st_size, 0);
    }

    #[test]
    fn test_directory_listing() {
        let dir = ScratchDir::new();
        std::fs::write(dir.path.join("one.bin"), b"1").unwrap();
        std::fs::write(dir.path.join("two.bin"), b"2").unwrap();
        std::fs::create_dir(dir.path.join("sub")).unwrap();
        let vfs = mounted_vfs(&dir);

        let fd = vfs.open_directory("/app0");
        assert!(fd >= FIRST_FD);

        let bytes = vfs.read_dirents(fd, 4096).expect("dirents");
        assert!(!bytes.is_empty());

        // Walk the records and collect names.
        let mut names = Vec::new();
        let mut off = 0usize;
        while off < bytes.len() {
            let reclen = u16::from_le_bytes([bytes[off + 4], bytes[off + 5]]) as usize;
            let namlen = bytes[off + 7] as usize;
            names.push(String::from_utf8_lossy(&bytes[off + 8..off + 8 + namlen]).into_owned());
            off += reclen;
        }
        names.sort();
        assert_eq!(names, vec!["one.bin", "sub", "two.bin"]);

        // Listing is exhausted afterwards.
        assert!(vfs.read_dirents(fd, 4096).unwrap().is_empty());
    }

    #[test]
    fn test_unlink() {
        let dir = ScratchDir::new();
        std::fs::write(dir.path.join("victim.bin"), b"x").unwrap();
        let vfs = mounted_vfs(&dir);

        assert!(vfs.exists("/app0/victim.bin"));
        assert_eq!(vfs.unlink("/app0/victim.bin"), SCE_OK);
        assert!(!vfs.exists("/app0/victim.bin"));
        assert_eq!(vfs.unlink("/app0/victim.bin"), SCE_KERNEL_ERROR_ENOENT);
    }

    #[test]
    fn test_trunc_resets_contents() {
        let dir = ScratchDir::new();
        std::fs::write(dir.path.join("t.bin"), b"old contents").unwrap();
        let vfs = mounted_vfs(&dir);

        let fd = vfs.open(
            "/app0/t.bin",
            open_flags::O_WRONLY | open_flags::O_TRUNC,
            0,
        );
        assert!(fd >= FIRST_FD);
        assert_eq!(vfs.write(fd, b"new"), 3);
        vfs.close(fd);

        assert_eq!(std::fs::read(dir.path.join("t.bin")).unwrap(), b"new");
    }
}
