//! Uniform file I/O surface over pluggable filesystem backends.
//!
//! The distilled design's raw function-pointer vtable is replaced with a
//! `FileSystem` trait object per mount: each backend (the read-only USTAR
//! archive, the device-node registry) implements it, and the VFS mount
//! table holds `&'static dyn FileSystem` references rather than owning
//! backends by value, since both are process-lifetime singletons.

pub mod devfs;
pub mod ramdisk;
pub mod tar;
pub mod vfs;

/// Opaque handle to an open file. Its meaning is entirely backend-specific;
/// the VFS dispatcher never inspects the value, only routes it back to
/// whichever backend handed it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(pub u32);

/// What a `read`/`write` call addresses: a bare path, resolved fresh by the
/// backend on every call (devfs' style), or an already-open handle carrying
/// its own read cursor (the archive backend's style).
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Path(&'a str),
    Handle(Handle),
}

/// Error taxonomy shared by every mounted backend and the dispatcher itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    /// No mounted backend's path is a prefix of the request.
    NoSuchMount,
    /// The backend has no node at the requested path.
    NotFound,
    /// A fixed-size table (mount list, open-handle table, archive index)
    /// has no room left.
    TableFull,
    /// Read past the end of the underlying data.
    Eof,
    /// The backend does not implement this operation.
    Unsupported,
    /// Backend-specific failure, opaque to the dispatcher.
    Backend(i32),
}

/// Per-mount file-operations surface.
///
/// `open`/`close` are optional — a backend that only ever serves
/// name-addressed reads (devfs) can leave them at their default
/// `Unsupported`/no-op implementations.
pub trait FileSystem: Sync {
    fn open(&self, path: &str) -> Result<Handle, VfsError> {
        let _ = path;
        Err(VfsError::Unsupported)
    }

    fn close(&self, handle: Handle) -> Result<(), VfsError> {
        let _ = handle;
        Ok(())
    }

    fn read(&self, target: Target, buf: &mut [u8]) -> Result<usize, VfsError>;

    fn write(&self, path: &str, buf: &[u8]) -> Result<usize, VfsError> {
        let _ = (path, buf);
        Err(VfsError::Unsupported)
    }
}

/// A fixed-capacity inline string.
///
/// Used wherever the distilled design's raw fixed-size name buffer would
/// otherwise invite an unchecked `kstrcpy`-style overflow (devfs node
/// names in particular). `N` is a compile-time capacity, not a runtime
/// buffer length to be trusted blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineName<const N: usize> {
    bytes: [u8; N],
    len: u8,
}

impl<const N: usize> InlineName<N> {
    pub fn new(s: &str) -> Option<Self> {
        if s.len() > N || s.len() > u8::MAX as usize {
            return None;
        }
        let mut bytes = [0u8; N];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Some(Self { bytes, len: s.len() as u8 })
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_name_rejects_overlong_strings() {
        assert!(InlineName::<4>::new("abcd").is_some());
        assert!(InlineName::<4>::new("abcde").is_none());
    }

    #[test]
    fn inline_name_roundtrips() {
        let n = InlineName::<12>::new("console").unwrap();
        assert_eq!(n.as_str(), "console");
    }
}
