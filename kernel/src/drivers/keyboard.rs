//! Keyboard ring buffer: the `kbd` devfs node.
//!
//! The IRQ handler only ever pushes decoded bytes into a fixed 256-entry
//! ring; it never touches the heap or blocks. Readers (the `kbd` device's
//! `read`) pop bytes off the same ring, spinning with interrupts enabled
//! until data shows up.

use crate::fs::devfs::Device;
use crate::fs::VfsError;
use crate::sync::spinlock::SpinLock;
use khal::keyboard::{KeyKind, KeyState};

const RING_CAPACITY: usize = 256;

struct Ring {
    buf: [u8; RING_CAPACITY],
    start: usize,
    end: usize,
}

impl Ring {
    const fn new() -> Self {
        Self {
            buf: [0; RING_CAPACITY],
            start: 0,
            end: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Pushes a byte, dropping the newest byte if the ring is full
    /// (`(end + 1) % CAPACITY == start`) rather than overwriting unread
    /// data or growing from IRQ context.
    fn push(&mut self, byte: u8) {
        let next = (self.end + 1) % RING_CAPACITY;
        if next == self.start {
            return;
        }
        self.buf[self.end] = byte;
        self.end = next;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[self.start];
        self.start = (self.start + 1) % RING_CAPACITY;
        Some(byte)
    }
}

static RING: SpinLock<Ring> = SpinLock::new(Ring::new());

/// Called from the keyboard IRQ handler with the raw scancode byte just
/// read off the PS/2 data port. Decodes it through `khal::keyboard` and,
/// on a printable key press, pushes the resulting byte into the ring.
pub fn on_scancode(scancode: u8) {
    if let Some(event) = khal::keyboard::handle_scancode_event(scancode) {
        if event.state != KeyState::Pressed {
            return;
        }
        if let KeyKind::Char(c) = event.key {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                RING.lock().push(byte);
            }
        }
    }
}

/// The `kbd` devfs node. `read` blocks (spinning with interrupts enabled
/// so the IRQ can keep producing) until at least one byte is available,
/// then fills as much of `buf` as the ring currently holds.
pub struct KeyboardDevice;

impl Device for KeyboardDevice {
    fn read(&self, buf: &mut [u8]) -> Result<usize, VfsError> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let mut ring = RING.lock();
            if !ring.is_empty() {
                let mut n = 0;
                while n < buf.len() {
                    match ring.pop() {
                        Some(byte) => {
                            buf[n] = byte;
                            n += 1;
                        }
                        None => break,
                    }
                }
                return Ok(n);
            }
            drop(ring);
            core::hint::spin_loop();
        }
    }
}

pub static KEYBOARD_DEVICE: KeyboardDevice = KeyboardDevice;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_round_trips_without_loss() {
        let mut ring = Ring::new();
        for b in 0..200u8 {
            ring.push(b);
        }
        for b in 0..200u8 {
            assert_eq!(ring.pop(), Some(b));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn ring_drops_newest_byte_on_overflow() {
        let mut ring = Ring::new();
        for b in 0..255u8 {
            ring.push(b);
        }
        // Ring is now full (255 entries leaves exactly one slot open as
        // the sentinel between start and end); one more push is dropped.
        ring.push(0xFF);
        assert_eq!(ring.pop(), Some(0));
    }
}
