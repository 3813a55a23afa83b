//! Template compiler.
//!
//! Flattens one or more Mustache sources (the root template plus every
//! transitively referenced partial) into a single [`Program`]: a linear
//! instruction array over one data blob. Parsing is a stack of per-template
//! frames rather than recursion; partials push a frame and the scan resumes
//! the parent when the child is exhausted.
//!
//! Section bodies become `SectionStart .. SectionEnd` instruction ranges,
//! repeated partial references become jumps to the already-compiled range,
//! and the raw source bytes stay in the blob so instructions only carry
//! offsets.

mod frame;
mod partial;

use memchr::memmem;
use tracing::debug;

use whisker_program::instruction::{Instruction, SectionData};
use whisker_program::limits::{MAX_BLOB, MAX_FILENAME, MAX_INSTRUCTIONS, MAX_NESTING};
use whisker_program::segment;
pub use whisker_program::{Error, Program, Result};

use crate::frame::ParseFrame;

/// Compile a template file and everything it references.
///
/// The file name is resolved like a partial: tried verbatim against the
/// current directory, then with a `.mustache` extension.
pub fn load_file(filename: &str) -> Result<Program> {
    let mut loader = Loader::new();
    loader.load_partial(filename.as_bytes())?;
    loader.parse()?;
    Ok(loader.finish())
}

/// Compile inline source registered under `filename`.
///
/// The name still matters: it provides the directory partials resolve
/// against, and a partial naming it exactly compiles to a jump back to this
/// root (the "virtual template" self-reference).
pub fn load_source(filename: &str, source: &[u8]) -> Result<Program> {
    if filename.is_empty() {
        return Err(Error::FileNameTooShort);
    }
    if filename.len() >= MAX_FILENAME {
        return Err(Error::FileNameTooLong);
    }
    let mut loader = Loader::new();
    loader.register(filename.as_bytes(), source)?;
    loader.parse()?;
    Ok(loader.finish())
}

/// Compiler state: the growing program plus the parsing-frame stack.
struct Loader {
    instructions: Vec<Instruction>,
    blob: Vec<u8>,
    frames: Vec<ParseFrame>,
}

impl Loader {
    fn new() -> Self {
        Self {
            instructions: Vec::with_capacity(32),
            blob: Vec::new(),
            frames: Vec::new(),
        }
    }

    fn finish(self) -> Program {
        Program::new(self.instructions, self.blob)
    }

    fn push_instruction(&mut self, inst: Instruction) -> Result<()> {
        if self.instructions.len() >= MAX_INSTRUCTIONS {
            return Err(Error::TooDeep);
        }
        self.instructions.push(inst);
        Ok(())
    }

    /// Append a template to the blob behind a fresh directory segment and
    /// push its parsing frame.
    ///
    /// Emits the template's unnamed wrapper `SectionStart`; its `end` field
    /// is patched when the frame is exhausted.
    fn register(&mut self, name: &[u8], source: &[u8]) -> Result<()> {
        let old_len = self.blob.len();
        let seg_len = segment::encoded_len(name.len());
        if old_len + seg_len + source.len() > MAX_BLOB as usize {
            return Err(Error::TooDeep);
        }
        let next = (old_len + seg_len + source.len()) as u32;
        segment::write(
            &mut self.blob,
            name,
            self.instructions.len() as u32,
            next,
            segment::split_path(name),
        );
        self.blob.extend_from_slice(source);

        self.push_instruction(Instruction::SectionStart(SectionData::default()))?;

        if self.frames.len() >= MAX_NESTING {
            return Err(Error::TooDeep);
        }
        self.frames.push(ParseFrame::new(
            old_len as u32,
            (old_len + seg_len) as u32,
            next,
        ));
        debug!(
            "registered template \"{}\" ({} bytes)",
            String::from_utf8_lossy(name),
            source.len()
        );
        Ok(())
    }

    /// Drive the frame stack until every template is consumed.
    fn parse(&mut self) -> Result<()> {
        while let Some(&top) = self.frames.last() {
            if top.data_pos < top.data_end {
                self.step()?;
                continue;
            }
            // template exhausted: every section must be closed
            if top.open_sections != 0 {
                return Err(Error::ClosureMismatch);
            }
            // patch the wrapper's exit and terminate the range
            let seg = segment::read(&self.blob, top.data_start as usize);
            let end = self.instructions.len() as u32;
            self.instructions[seg.inst_start as usize].patch_section(end, 0);
            self.push_instruction(Instruction::SectionEnd(SectionData::default()))?;
            self.frames.pop();
        }
        Ok(())
    }

    /// Consume one literal run and one tag from the top frame.
    fn step(&mut self) -> Result<()> {
        let top = *self.frames.last().expect("step() requires a frame");
        let data_pos = top.data_pos as usize;
        let data_end = top.data_end as usize;

        let Some(rel) = memmem::find(&self.blob[data_pos..data_end], top.open.as_bytes()) else {
            // no tags left, only text
            self.emit_text(data_pos, data_end - data_pos)?;
            self.top_mut().data_pos = data_end as u32;
            return Ok(());
        };
        let tag_open = data_pos + rel;
        if rel > 0 {
            self.emit_text(data_pos, rel)?;
        }

        let inner_start = tag_open + top.open.len();
        let Some(rel_close) = memmem::find(&self.blob[inner_start..data_end], top.close.as_bytes())
        else {
            return Err(Error::ClosureMismatch);
        };
        let inner_end = inner_start + rel_close;
        let after_tag = inner_end + top.close.len();
        self.top_mut().data_pos = after_tag as u32;

        if inner_start == inner_end {
            // degenerate `{{}}`: an empty escaped reference
            return self.emit_arg(inner_start, inner_end, true);
        }
        match self.blob[inner_start] {
            b'!' => Ok(()),
            b'=' => self.change_delimiters(inner_start + 1, inner_end),
            b'#' => self.open_section(false, inner_start + 1, inner_end, after_tag),
            b'^' => self.open_section(true, inner_start + 1, inner_end, after_tag),
            b'/' => self.close_section(inner_start + 1, inner_end, tag_open),
            b'>' => {
                let (ns, ne) = self.trim(inner_start + 1, inner_end);
                let name = self.blob[ns..ne].to_vec();
                self.load_partial(&name)
            }
            b'{' => {
                // `{{{name}}}`: the close delimiter matched one `}` short
                if top.close.first() == b'}'
                    && top.close.last() == b'}'
                    && after_tag < data_end
                    && self.blob[after_tag] == b'}'
                {
                    self.top_mut().data_pos += 1;
                }
                self.emit_arg(inner_start + 1, inner_end, false)
            }
            b'&' => self.emit_arg(inner_start + 1, inner_end, false),
            // pass-through tag types: one prefix byte, plain reference
            b':' | b'<' => self.emit_arg(inner_start + 1, inner_end, true),
            _ => self.emit_arg(inner_start, inner_end, true),
        }
    }

    /// Emit a literal run, chained so each length fits the 16-bit field.
    fn emit_text(&mut self, mut pos: usize, mut len: usize) -> Result<()> {
        while len > u16::MAX as usize {
            self.push_instruction(Instruction::Text { pos: pos as u32, len: u16::MAX })?;
            pos += u16::MAX as usize;
            len -= u16::MAX as usize;
        }
        if len > 0 {
            self.push_instruction(Instruction::Text { pos: pos as u32, len: len as u16 })?;
        }
        Ok(())
    }

    fn emit_arg(&mut self, from: usize, to: usize, escape: bool) -> Result<()> {
        let (ns, ne) = self.trim(from, to);
        let name_pos = ns as u32;
        let name_len = u16::try_from(ne - ns).map_err(|_| Error::NameTooLong)?;
        self.push_instruction(if escape {
            Instruction::Arg { name_pos, name_len }
        } else {
            Instruction::ArgRaw { name_pos, name_len }
        })
    }

    fn open_section(
        &mut self,
        inverted: bool,
        from: usize,
        to: usize,
        body_start: usize,
    ) -> Result<()> {
        let (ns, ne) = self.trim(from, to);
        {
            let top = self.frames.last_mut().expect("open_section requires a frame");
            top.open_sections += 1;
            if top.open_sections as usize > MAX_NESTING {
                return Err(Error::TooDeep);
            }
        }
        let data = SectionData {
            end: 0,
            len: 0,
            name_pos: ns as u32,
            name_len: u16::try_from(ne - ns).map_err(|_| Error::NameTooLong)?,
            offset: u16::try_from(body_start - ns).map_err(|_| Error::NameTooLong)?,
        };
        self.push_instruction(if inverted {
            Instruction::SectionStartInv(data)
        } else {
            Instruction::SectionStart(data)
        })
    }

    /// Close the nearest still-open section whose name matches, patching its
    /// start and mirroring the operands onto the emitted `SectionEnd`.
    fn close_section(&mut self, from: usize, to: usize, tag_open: usize) -> Result<()> {
        let (ns, ne) = self.trim(from, to);
        if self.frames.last().expect("close_section requires a frame").open_sections == 0 {
            return Err(Error::ClosureMismatch);
        }
        let mut nested = 0u32;
        let mut idx = self.instructions.len();
        while idx > 0 {
            idx -= 1;
            match self.instructions[idx] {
                Instruction::SectionEnd(_) => nested += 1,
                Instruction::SectionStart(d) | Instruction::SectionStartInv(d) => {
                    if nested > 0 {
                        nested -= 1;
                        continue;
                    }
                    let name = &self.blob[d.name_pos as usize..][..d.name_len as usize];
                    if name.len() != ne - ns || *name != self.blob[ns..ne] {
                        return Err(Error::ClosureMismatch);
                    }
                    let end = self.instructions.len() as u32;
                    let body_len = tag_open as u32 - (d.name_pos + u32::from(d.offset));
                    let data = self.instructions[idx].patch_section(end, body_len);
                    self.push_instruction(Instruction::SectionEnd(data))?;
                    self.frames
                        .last_mut()
                        .expect("close_section requires a frame")
                        .open_sections -= 1;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(Error::ClosureMismatch)
    }

    /// Handle `{{=<new-open> <new-close>=}}` for the top frame only.
    fn change_delimiters(&mut self, from: usize, to: usize) -> Result<()> {
        if from == to || self.blob[to - 1] != b'=' {
            return Err(Error::ClosureMismatch);
        }
        let (s, e) = self.trim(from, to - 1);
        if s == e {
            return Err(Error::ClosureMismatch);
        }
        let Some(div) = self.blob[s..e].iter().position(|&b| is_space(b)).map(|i| s + i) else {
            return Err(Error::ClosureMismatch);
        };
        let mut rest = div + 1;
        while rest < e && is_space(self.blob[rest]) {
            rest += 1;
        }
        if rest == e {
            return Err(Error::ClosureMismatch);
        }
        let top = self.frames.last_mut().expect("change_delimiters requires a frame");
        top.open.set(&self.blob[s..div])?;
        top.close.set(&self.blob[rest..e])?;
        Ok(())
    }

    fn top_mut(&mut self) -> &mut ParseFrame {
        self.frames.last_mut().expect("loader frame stack is empty")
    }

    /// Trim the C `isspace` set from both ends of a blob range.
    fn trim(&self, mut from: usize, mut to: usize) -> (usize, usize) {
        while from < to && is_space(self.blob[from]) {
            from += 1;
        }
        while to > from && is_space(self.blob[to - 1]) {
            to -= 1;
        }
        (from, to)
    }
}

/// The C `isspace` set; `u8::is_ascii_whitespace` lacks vertical tab.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}
