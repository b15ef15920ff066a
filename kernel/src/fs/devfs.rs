//! Device-node registry: the `/dev` VFS backend.
//!
//! Canonical devices (`kbd`, `console`, `random`) are registered once
//! during bring-up by the code in `crate::drivers` that owns each
//! device's actual state. This module only routes a relative path to the
//! matching [`Device`] trait object; a device closes over whatever state
//! it needs rather than receiving it as a separate opaque parameter, so
//! `read`/`write` here only ever take the relative path and a buffer.

use super::{FileSystem, Target, VfsError};
use crate::sync::spinlock::SpinLock;

/// Per-device operations. Implemented by whatever owns the device's
/// actual state (the keyboard ring buffer, the console, the RNG stream).
pub trait Device: Sync {
    fn read(&self, buf: &mut [u8]) -> Result<usize, VfsError> {
        let _ = buf;
        Err(VfsError::Unsupported)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, VfsError> {
        let _ = buf;
        Err(VfsError::Unsupported)
    }
}

const MAX_NAME: usize = 12;
const MAX_DEVICES: usize = 16;

type Name = super::InlineName<MAX_NAME>;

#[derive(Clone, Copy)]
struct Node {
    name: Name,
    device: &'static dyn Device,
}

/// The device-node registry itself.
pub struct DevFs {
    nodes: SpinLock<([Option<Node>; MAX_DEVICES], usize)>,
}

impl DevFs {
    pub const fn new() -> Self {
        Self {
            nodes: SpinLock::new(([None; MAX_DEVICES], 0)),
        }
    }

    /// Registers `device` under `name`. Panics if `name` exceeds the
    /// inline-name capacity or the node table is full — both are
    /// programmer errors fixed at bring-up time, not runtime conditions.
    pub fn register(&self, name: &str, device: &'static dyn Device) {
        let name = Name::new(name).expect("devfs device name exceeds capacity");
        let mut guard = self.nodes.lock();
        let (nodes, count) = &mut *guard;
        assert!(*count < MAX_DEVICES, "devfs node table full");
        nodes[*count] = Some(Node { name, device });
        *count += 1;
    }

    fn lookup(&self, name: &str) -> Option<&'static dyn Device> {
        let guard = self.nodes.lock();
        let (nodes, count) = &*guard;
        nodes[..*count]
            .iter()
            .flatten()
            .find(|n| n.name.as_str() == name)
            .map(|n| n.device)
    }
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for DevFs {
    fn read(&self, target: Target, buf: &mut [u8]) -> Result<usize, VfsError> {
        let name = match target {
            Target::Path(p) => p,
            Target::Handle(_) => return Err(VfsError::Unsupported),
        };
        self.lookup(name).ok_or(VfsError::NotFound)?.read(buf)
    }

    fn write(&self, path: &str, buf: &[u8]) -> Result<usize, VfsError> {
        self.lookup(path).ok_or(VfsError::NotFound)?.write(buf)
    }
}

/// The global device registry, mounted at `/dev` during bring-up.
pub static DEVFS: DevFs = DevFs::new();

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl Device for Echo {
        fn read(&self, buf: &mut [u8]) -> Result<usize, VfsError> {
            let n = buf.len().min(3);
            buf[..n].copy_from_slice(&[b'h', b'i', b'!'][..n]);
            Ok(n)
        }
    }
    static ECHO: Echo = Echo;

    #[test]
    fn register_then_lookup_by_name() {
        let fs = DevFs::new();
        fs.register("echo", &ECHO);
        let mut buf = [0u8; 8];
        let n = fs.read(Target::Path("echo"), &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi!");
    }

    #[test]
    fn lookup_of_unknown_name_fails() {
        let fs = DevFs::new();
        fs.register("echo", &ECHO);
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(Target::Path("nope"), &mut buf), Err(VfsError::NotFound));
    }

    #[test]
    fn handle_target_is_unsupported() {
        let fs = DevFs::new();
        fs.register("echo", &ECHO);
        let mut buf = [0u8; 8];
        assert_eq!(
            fs.read(Target::Handle(super::super::Handle(0)), &mut buf),
            Err(VfsError::Unsupported)
        );
    }
}
