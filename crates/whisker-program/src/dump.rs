//! Human-readable program listing.
//!
//! One instruction per line plus the template directory, exposed through
//! [`core::fmt::Display`] so tooling can print a compiled program without
//! re-deriving the layout.

use core::fmt;

use crate::instruction::Instruction;
use crate::program::Program;

/// Display adapter for a [`Program`] listing.
///
/// ```text
/// templates:
///   "page.mustache" inst=0 dir=""
/// instructions:
///   0000 section-start    end=3
///   0001 text             "Hello "
///   0002 arg              name="name" escape
/// ```
pub struct Dump<'a>(pub &'a Program);

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = self.0;
        writeln!(f, "templates:")?;
        for seg in program.templates() {
            writeln!(
                f,
                "  \"{}\" inst={} dir=\"{}\"",
                Preview(seg.filename),
                seg.inst_start,
                Preview(seg.dir()),
            )?;
        }
        writeln!(f, "instructions:")?;
        for (i, inst) in program.instructions().iter().enumerate() {
            write!(f, "  {i:04} ")?;
            match *inst {
                Instruction::Text { pos, len } => {
                    writeln!(
                        f,
                        "text             \"{}\"",
                        Preview(program.slice(pos, len as usize))
                    )?;
                }
                Instruction::Arg { name_pos, name_len } => {
                    writeln!(
                        f,
                        "arg              name=\"{}\" escape",
                        Preview(program.slice(name_pos, name_len as usize))
                    )?;
                }
                Instruction::ArgRaw { name_pos, name_len } => {
                    writeln!(
                        f,
                        "arg-raw          name=\"{}\"",
                        Preview(program.slice(name_pos, name_len as usize))
                    )?;
                }
                Instruction::SectionStart(d) | Instruction::SectionStartInv(d) => {
                    let mnemonic = if matches!(inst, Instruction::SectionStart(_)) {
                        "section-start    "
                    } else {
                        "section-start-inv"
                    };
                    if d.name_pos == 0 {
                        writeln!(f, "{mnemonic} end={}", d.end)?;
                    } else {
                        writeln!(
                            f,
                            "{mnemonic} name=\"{}\" end={} body-len={}",
                            Preview(program.slice(d.name_pos, d.name_len as usize)),
                            d.end,
                            d.len,
                        )?;
                    }
                }
                Instruction::SectionEnd(d) => {
                    if d.name_pos == 0 {
                        writeln!(f, "section-end")?;
                    } else {
                        writeln!(
                            f,
                            "section-end      name=\"{}\"",
                            Preview(program.slice(d.name_pos, d.name_len as usize))
                        )?;
                    }
                }
                Instruction::SectionGoto { target, resume } => {
                    writeln!(f, "section-goto     target={target} resume={resume}")?;
                }
            }
        }
        Ok(())
    }
}

/// Escaped, truncated byte-string preview.
struct Preview<'a>(&'a [u8]);

const PREVIEW_MAX: usize = 40;

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut written = 0usize;
        for &b in self.0 {
            if written >= PREVIEW_MAX {
                write!(f, "…")?;
                break;
            }
            match b {
                b'"' => write!(f, "\\\"")?,
                b'\\' => write!(f, "\\\\")?,
                b'\n' => write!(f, "\\n")?,
                b'\r' => write!(f, "\\r")?,
                b'\t' => write!(f, "\\t")?,
                0x20..=0x7e => write!(f, "{}", b as char)?,
                _ => write!(f, "\\x{b:02x}")?,
            }
            written += 1;
        }
        Ok(())
    }
}
