//! USTAR tar archive parser and read-only VFS backend.
//!
//! Parses a POSIX.1-2001 (USTAR) tar archive loaded into memory from the
//! boot ramdisk module. `TarIter`/`find_file` are the low-level walking
//! primitives; `UstarFs` builds a fixed-size index over them once at
//! mount time and exposes it as a `FileSystem` backend.

use khal::ramdisk::RamDisk;

use super::{FileSystem, Handle, Target, VfsError};
use crate::sync::spinlock::SpinLock;

/// Size of a single tar block (header or data padding unit).
const BLOCK: usize = 512;

/// Offset and size of the `magic` field in a USTAR header.
const MAGIC_OFFSET: usize = 257;
const MAGIC_LEN: usize = 5; // "ustar" (without trailing NUL variant byte)

/// Maximum number of regular files the archive index can hold.
const MAX_FILES: usize = 64;

/// Maximum number of simultaneously open archive handles.
const MAX_HANDLES: usize = 32;

/// A parsed TAR entry header.
#[derive(Debug)]
pub struct TarEntry<'a> {
    /// File name (NUL-terminated in the archive, trimmed here).
    pub name: &'a str,
    /// File size in bytes (decoded from the octal `size` field).
    pub size: usize,
    /// Type flag character (e.g. `b'0'` = regular file, `b'5'` = directory).
    pub typeflag: u8,
    /// Byte slice of the file contents (may be empty for directories).
    pub data: &'a [u8],
}

/// Iterator over the entries of a USTAR tar archive.
pub struct TarIter<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> TarIter<'a> {
    /// Create a new TAR iterator from a `RamDisk`.
    ///
    /// # Safety
    /// The `RamDisk`'s backing memory must be valid for the returned lifetime.
    pub unsafe fn new(disk: &'a RamDisk) -> Self {
        Self {
            buf: unsafe { disk.as_slice() },
            offset: 0,
        }
    }

    /// Create a TAR iterator directly from a byte slice.
    pub fn from_bytes(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }
}

impl<'a> Iterator for TarIter<'a> {
    type Item = TarEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Need at least one full header block.
            if self.offset + BLOCK > self.buf.len() {
                return None;
            }

            let header = &self.buf[self.offset..self.offset + BLOCK];

            // Two consecutive zero blocks mark the end of archive.
            if header.iter().all(|&b| b == 0) {
                return None;
            }

            // Validate USTAR magic ("ustar").
            let magic = &header[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC_LEN];
            if magic != b"ustar" {
                // Not a valid header — skip this block and try the next.
                self.offset += BLOCK;
                continue;
            }

            // ── Parse name (bytes 0..100) ───────────────────────
            let name_bytes = &header[0..100];
            let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(100);
            let name = core::str::from_utf8(&name_bytes[..name_end]).unwrap_or("<invalid>");

            // ── Parse size (bytes 124..136, octal ASCII) ────────
            let size = parse_octal(&header[124..136]);

            // ── Type flag (byte 156) ────────────────────────────
            let typeflag = header[156];

            // Data immediately follows the header, rounded up to BLOCK.
            let data_start = self.offset + BLOCK;
            let data_end = data_start + size;

            let data = if size > 0 && data_end <= self.buf.len() {
                &self.buf[data_start..data_end]
            } else {
                &[]
            };

            // Advance past header + data (data padded to BLOCK boundary).
            let data_blocks = size.div_ceil(BLOCK);
            self.offset += BLOCK + data_blocks * BLOCK;

            return Some(TarEntry {
                name,
                size,
                typeflag,
                data,
            });
        }
    }
}

/// Parse an octal ASCII string (with possible NUL/space padding) into `usize`.
fn parse_octal(field: &[u8]) -> usize {
    let mut value: usize = 0;
    for &b in field {
        if b == 0 || b == b' ' {
            break;
        }
        if b.is_ascii_digit() && b <= b'7' {
            value = value * 8 + (b - b'0') as usize;
        }
    }
    value
}

/// Find a file by name in the tar archive and return its entry.
pub fn find_file<'a>(disk: &'a RamDisk, name: &str) -> Option<TarEntry<'a>> {
    let iter = unsafe { TarIter::new(disk) };
    find_in_iter(iter, name)
}

fn find_in_iter<'a>(iter: TarIter<'a>, name: &str) -> Option<TarEntry<'a>> {
    let search_name = name.strip_prefix("./").unwrap_or(name);
    for entry in iter {
        let entry_name = entry.name.strip_prefix("./").unwrap_or(entry.name);
        if entry_name == search_name {
            return Some(entry);
        }
    }
    None
}

// =============================================================================
// VFS backend
// =============================================================================

#[derive(Clone, Copy)]
struct IndexEntry {
    name: &'static str,
    data: &'static [u8],
    is_dir: bool,
}

#[derive(Clone, Copy)]
struct OpenFile {
    entry: usize,
    offset: usize,
}

/// Read-only USTAR archive backend, mountable at any VFS path.
///
/// `init` walks the archive once and builds a fixed-size index (capped at
/// [`MAX_FILES`] entries); `open`/`read`/`close` then work purely off that
/// index, never re-parsing headers.
pub struct UstarFs {
    entries: SpinLock<([Option<IndexEntry>; MAX_FILES], usize)>,
    handles: SpinLock<[Option<OpenFile>; MAX_HANDLES]>,
}

impl UstarFs {
    pub const fn new() -> Self {
        Self {
            entries: SpinLock::new(([None; MAX_FILES], 0)),
            handles: SpinLock::new([None; MAX_HANDLES]),
        }
    }

    /// Indexes a USTAR archive from `disk`. Must be called exactly once,
    /// before any `open`/`read`, with a ramdisk blob that outlives the
    /// kernel (the boot ramdisk module is never freed).
    pub fn init(&self, disk: &'static RamDisk) {
        let buf = unsafe { disk.as_slice() };
        self.init_from_bytes(buf);
    }

    fn init_from_bytes(&self, buf: &'static [u8]) {
        let mut guard = self.entries.lock();
        let (entries, count) = &mut *guard;
        for entry in TarIter::from_bytes(buf) {
            if *count >= MAX_FILES {
                klog::warn!("ustar: archive has more than {MAX_FILES} files, truncating index");
                break;
            }
            entries[*count] = Some(IndexEntry {
                name: entry.name,
                data: entry.data,
                is_dir: entry.typeflag == b'5',
            });
            *count += 1;
        }
        klog::info!("ustar: indexed {} archive entries", *count);
    }

    fn find(&self, path: &str) -> Option<usize> {
        let path = path.strip_prefix("./").unwrap_or(path);
        let guard = self.entries.lock();
        let (entries, count) = &*guard;
        entries[..*count].iter().position(|e| match e {
            Some(e) if !e.is_dir => e.name.strip_prefix("./").unwrap_or(e.name) == path,
            _ => false,
        })
    }
}

impl Default for UstarFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for UstarFs {
    fn open(&self, path: &str) -> Result<Handle, VfsError> {
        let entry = self.find(path).ok_or(VfsError::NotFound)?;
        let mut handles = self.handles.lock();
        let slot = handles
            .iter()
            .position(|h| h.is_none())
            .ok_or(VfsError::TableFull)?;
        handles[slot] = Some(OpenFile { entry, offset: 0 });
        Ok(Handle(slot as u32))
    }

    fn close(&self, handle: Handle) -> Result<(), VfsError> {
        let mut handles = self.handles.lock();
        let slot = handle.0 as usize;
        if slot >= MAX_HANDLES || handles[slot].is_none() {
            return Err(VfsError::NotFound);
        }
        handles[slot] = None;
        Ok(())
    }

    fn read(&self, target: Target, buf: &mut [u8]) -> Result<usize, VfsError> {
        match target {
            Target::Handle(h) => {
                let mut handles = self.handles.lock();
                let slot = h.0 as usize;
                let open = handles
                    .get_mut(slot)
                    .and_then(|s| s.as_mut())
                    .ok_or(VfsError::NotFound)?;

                let entries = self.entries.lock();
                let entry = entries.0[open.entry].ok_or(VfsError::NotFound)?;
                if open.offset >= entry.data.len() {
                    return Ok(0);
                }
                let n = buf.len().min(entry.data.len() - open.offset);
                buf[..n].copy_from_slice(&entry.data[open.offset..open.offset + n]);
                open.offset += n;
                Ok(n)
            }
            Target::Path(path) => {
                let idx = self.find(path).ok_or(VfsError::NotFound)?;
                let entries = self.entries.lock();
                let entry = entries.0[idx].ok_or(VfsError::NotFound)?;
                let n = buf.len().min(entry.data.len());
                buf[..n].copy_from_slice(&entry.data[..n]);
                Ok(n)
            }
        }
    }
}

/// The global archive backend, mounted at `/rootfs` (or wherever bring-up
/// chooses) once the ramdisk module has been indexed.
pub static USTAR: UstarFs = UstarFs::new();

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn pad_block(v: &mut Vec<u8>) {
        let rem = v.len() % BLOCK;
        if rem != 0 {
            v.resize(v.len() + (BLOCK - rem), 0);
        }
    }

    fn write_octal(field: &mut [u8], mut value: usize) {
        for i in (0..field.len() - 1).rev() {
            field[i] = b'0' + (value % 8) as u8;
            value /= 8;
        }
    }

    fn push_entry(buf: &mut Vec<u8>, name: &str, data: &[u8], typeflag: u8) {
        let mut header = [0u8; BLOCK];
        header[..name.len()].copy_from_slice(name.as_bytes());
        write_octal(&mut header[124..136], data.len());
        header[156] = typeflag;
        header[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC_LEN].copy_from_slice(b"ustar");
        buf.extend_from_slice(&header);
        buf.extend_from_slice(data);
        pad_block(buf);
    }

    fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (name, data) in files {
            push_entry(&mut buf, name, data, b'0');
        }
        buf.extend_from_slice(&[0u8; BLOCK * 2]);
        buf
    }

    #[test]
    fn tar_iter_walks_every_entry() {
        let archive = build_archive(&[("./a.txt", b"hello"), ("./b.txt", b"world!!")]);
        let names: Vec<_> = TarIter::from_bytes(&archive).map(|e| e.name).collect();
        assert_eq!(names, ["./a.txt", "./b.txt"]);
    }

    #[test]
    fn find_file_strips_dot_slash_prefix() {
        let archive = build_archive(&[("./dir/file.txt", b"payload")]);
        let iter = TarIter::from_bytes(&archive);
        let found = find_in_iter(iter, "dir/file.txt").unwrap();
        assert_eq!(found.data, b"payload");
    }

    #[test]
    fn ustar_fs_open_read_close_cycle() {
        let archive: &'static [u8] = build_archive(&[("./readme.txt", b"hi there")]).leak();
        let fs = UstarFs::new();
        fs.init_from_bytes(archive);

        let handle = fs.open("readme.txt").unwrap();
        let mut buf = [0u8; 4];
        let n1 = fs.read(Target::Handle(handle), &mut buf).unwrap();
        assert_eq!(&buf[..n1], b"hi t");
        let n2 = fs.read(Target::Handle(handle), &mut buf).unwrap();
        assert_eq!(&buf[..n2], b"here");
        let n3 = fs.read(Target::Handle(handle), &mut buf).unwrap();
        assert_eq!(n3, 0);

        fs.close(handle).unwrap();
        assert_eq!(fs.read(Target::Handle(handle), &mut buf), Err(VfsError::NotFound));
    }

    #[test]
    fn ustar_fs_open_of_missing_file_fails() {
        let archive: &'static [u8] = build_archive(&[("./a.txt", b"x")]).leak();
        let fs = UstarFs::new();
        fs.init_from_bytes(archive);
        assert_eq!(fs.open("missing.txt"), Err(VfsError::NotFound));
    }

    #[test]
    fn archive_index_caps_at_max_files() {
        let mut files: Vec<(alloc::string::String, &[u8])> = Vec::new();
        for i in 0..(MAX_FILES + 5) {
            files.push((alloc::format!("./f{i}.txt"), b"x" as &[u8]));
        }
        let refs: Vec<(&str, &[u8])> = files.iter().map(|(n, d)| (n.as_str(), *d)).collect();
        let archive: &'static [u8] = build_archive(&refs).leak();
        let fs = UstarFs::new();
        fs.init_from_bytes(archive);
        let guard = fs.entries.lock();
        assert_eq!(guard.1, MAX_FILES);
    }
}
