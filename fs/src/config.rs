//! Kernel-wide FD/VFS tunables (design §5 "Resource ceilings").
//!
//! Named constants instead of magic numbers, in the teacher's
//! `memory_layout_defs.rs` style.

/// Maximum payload size of one Unix-socket message (design §4.9, §3).
pub const SOCK_MAX_MESSAGE_BYTES: usize = 1500;

/// Maximum number of in-flight FD mappings attached to one message.
pub const SOCK_MAX_FDS_PER_MESSAGE: usize = 20;

/// Maximum number of queued messages per receive queue.
pub const SOCK_MAX_QUEUED_MESSAGES: usize = 20;

/// Maximum total queued bytes per receive queue, whichever binds first
/// against `SOCK_MAX_QUEUED_MESSAGES`.
pub const SOCK_MAX_QUEUED_BYTES: usize = 30 * 1024;

/// Maximum payload size of one pseudo-FD request/response.
pub const PSEUDO_MAX_MESSAGE_BYTES: usize = 1500;

/// Maximum path length accepted by the initrd filesystem (ustar `name` field).
pub const INITRD_MAX_PATH_LEN: usize = 100;

/// Terminal output token buffer, matching `original_source/term/terminal.hpp`.
pub const TERMINAL_OUTPUT_BUFFER_LEN: usize = 64;

/// Terminal keystroke buffer, matching `original_source/term/terminal.hpp`.
pub const TERMINAL_KEYSTROKE_BUFFER_LEN: usize = 128;

/// Maximum depth of symlink resolution before `traverse` fails `loop`.
pub const MAX_SYMLINK_DEPTH: usize = 8;

/// Block/sector size assumed throughout the block layer (design §9 open
/// question: partitions always inherit this rather than the underlying
/// device's own sector size — see DESIGN.md).
pub const SECTOR_SIZE: u64 = 512;

/// Size of a raw `ustar` header block.
pub const USTAR_BLOCK_LEN: usize = 512;
