//! Minimal I/O-port access used by the early-boot log backend.
//!
//! The concrete serial/VGA console driver is out of scope for this kernel
//! (design §1); this module only supplies the COM1 fallback path that
//! `klog` uses before any real console backend registers itself.

use x86_64::instructions::port::Port;

pub const COM1: u16 = 0x3F8;

/// Write `bytes` to the given serial port one byte at a time.
///
/// # Safety
/// Caller must ensure `port` names a UART data register that has already
/// been initialised (line control, baud divisor). The early-boot fallback
/// tolerates an uninitialised UART since QEMU's default 16550 resets to a
/// usable state.
pub unsafe fn serial_write_bytes(port: u16, bytes: &[u8]) {
    let mut data_port: Port<u8> = Port::new(port);
    for &b in bytes {
        unsafe {
            data_port.write(b);
        }
    }
}
