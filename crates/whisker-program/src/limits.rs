//! Process-wide engine limits.

/// Maximum depth of the loader's parsing stack, of section nesting within a
/// single template, and of the VM's section stack (excluding the two
/// bookkeeping frames the VM itself adds).
pub const MAX_NESTING: usize = 96;

/// Delimiter buffer size. Usable delimiter length is `MAX_DELIM - 1`.
pub const MAX_DELIM: usize = 11;

/// Template file names must be shorter than this.
pub const MAX_FILENAME: usize = 8192;

/// Per-program instruction count must stay below 2^31.
pub const MAX_INSTRUCTIONS: usize = i32::MAX as usize;

/// A single template file must be smaller than 2^31 bytes.
pub const MAX_FILE_SIZE: u64 = i32::MAX as u64;

/// The data blob must fit in 32-bit offsets.
pub const MAX_BLOB: u64 = u32::MAX as u64;
