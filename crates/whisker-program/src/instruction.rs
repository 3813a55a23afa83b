//! Instruction set for compiled templates.
//!
//! Flat, fixed-width instruction encoding. What looks like a tree in the
//! template source is flattened to a linear program with jump fields; the
//! VM never rebuilds an AST.

/// Operand block for section instructions.
///
/// A `SectionEnd` carries a copy of its matching start's operands so the VM
/// can service either side without a lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionData {
    /// Instruction index of the matching [`Instruction::SectionEnd`].
    pub end: u32,
    /// Byte length of the section body in the data blob.
    pub len: u32,
    /// Absolute blob offset of the section name. Zero marks an unnamed
    /// template-level wrapper (offset zero is always inside a directory
    /// segment header, never a name).
    pub name_pos: u32,
    /// Name length in bytes.
    pub name_len: u16,
    /// Distance from the name start to the body start (the byte after the
    /// opening tag's close delimiter).
    pub offset: u16,
}

/// One compiled template instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Emit raw bytes `blob[pos..pos + len]`.
    ///
    /// Source runs longer than `u16::MAX` are compiled as a chain of `Text`
    /// instructions so the length always fits the 16-bit field.
    Text { pos: u32, len: u16 },

    /// Emit the named value, HTML-escaped by the host.
    Arg { name_pos: u32, name_len: u16 },

    /// Emit the named value verbatim.
    ArgRaw { name_pos: u32, name_len: u16 },

    /// Begin a normal section.
    SectionStart(SectionData),

    /// Begin an inverted section.
    SectionStartInv(SectionData),

    /// Terminate a section body.
    SectionEnd(SectionData),

    /// Enter another template's instruction range at `target`.
    ///
    /// `resume` is this instruction's own index; the frame pushed for the
    /// jump exits here and the VM's step advance moves past it.
    SectionGoto { target: u32, resume: u32 },
}

impl Instruction {
    /// The name slice location for section entry instructions, or `None`
    /// for unnamed wrappers and jumps.
    #[must_use]
    pub fn section_name(&self) -> Option<(u32, u16)> {
        match self {
            Instruction::SectionStart(d) | Instruction::SectionStartInv(d) if d.name_pos != 0 => {
                Some((d.name_pos, d.name_len))
            }
            _ => None,
        }
    }

    /// True for instructions the VM enters a frame for.
    #[must_use]
    pub fn is_section_entry(&self) -> bool {
        matches!(
            self,
            Instruction::SectionStart(_)
                | Instruction::SectionStartInv(_)
                | Instruction::SectionGoto { .. }
        )
    }

    /// Patch the `end` / `len` fields of a section start once its closing
    /// tag is reached.
    ///
    /// # Panics
    ///
    /// Panics when applied to anything but a section start; the loader only
    /// patches instructions it located by scanning for starts.
    pub fn patch_section(&mut self, end: u32, len: u32) -> SectionData {
        match self {
            Instruction::SectionStart(d) | Instruction::SectionStartInv(d) => {
                d.end = end;
                d.len = len;
                *d
            }
            _ => panic!("attempted to patch a non-section instruction"),
        }
    }
}
