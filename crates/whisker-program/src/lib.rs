//! Compiled template artifact shared by the whisker loader and VM.
//!
//! A [`Program`] is produced once by `whisker-loader` and rendered many
//! times by `whisker-vm`. It is a flat, cache-friendly encoding of one or
//! more templates: a fixed-width instruction array plus a single data blob
//! holding template directory segments interleaved with raw source bytes.

pub mod dump;
pub mod error;
pub mod instruction;
pub mod limits;
pub mod program;
pub mod segment;

pub use dump::Dump;
pub use error::{Error, Result};
pub use instruction::{Instruction, SectionData};
pub use program::{Program, Templates};
pub use segment::Segment;
