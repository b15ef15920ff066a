//! `random` devfs node: a xorshift64* pseudo-random byte stream.
//!
//! Not cryptographically secure — there's no hardware RNG source wired
//! up yet (see `rdrand`/`rdseed` on the TODO list) — just enough entropy
//! spread to unblock code that wants non-deterministic bytes at boot.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::fs::devfs::Device;
use crate::fs::VfsError;

static STATE: AtomicU64 = AtomicU64::new(0x9E3779B97F4A7C15);

/// Seeds the generator. Call once at bring-up with a value that varies
/// run to run (the current tick count, a boot-time TSC read, ...); an
/// all-zero seed would produce an all-zero stream forever.
pub fn seed(value: u64) {
    STATE.store(value | 1, Ordering::Relaxed);
}

fn next_u64() -> u64 {
    let mut x = STATE.load(Ordering::Relaxed);
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    STATE.store(x, Ordering::Relaxed);
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

pub struct RandomDevice;

impl Device for RandomDevice {
    fn read(&self, buf: &mut [u8]) -> Result<usize, VfsError> {
        let mut filled = 0;
        while filled < buf.len() {
            let bytes = next_u64().to_le_bytes();
            let take = (buf.len() - filled).min(bytes.len());
            buf[filled..filled + take].copy_from_slice(&bytes[..take]);
            filled += take;
        }
        Ok(filled)
    }
}

pub static RANDOM_DEVICE: RandomDevice = RandomDevice;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_buffer_completely() {
        seed(12345);
        let mut buf = [0u8; 37];
        let n = RANDOM_DEVICE.read(&mut buf).unwrap();
        assert_eq!(n, 37);
    }

    #[test]
    fn distinct_reads_differ() {
        seed(1);
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        RANDOM_DEVICE.read(&mut a).unwrap();
        RANDOM_DEVICE.read(&mut b).unwrap();
        assert_ne!(a, b);
    }
}
