//! Template evaluator.
//!
//! Walks a compiled [`Program`] instruction by instruction and drives the
//! host's [`Render`] callbacks in strict document order. Section nesting is
//! handled with a bounded frame stack instead of recursion, so cyclic
//! partial jumps cannot overflow the call stack; recursion terminates when
//! the host's section test returns zero (or the stack limit trips).
//!
//! Rendering never mutates the program: any number of threads may evaluate
//! the same `Program` concurrently, each with its own handler and scope.

mod section;

use tracing::trace;

use whisker_program::limits::MAX_NESTING;
use whisker_program::Instruction;
pub use whisker_program::{Error, Program, Result};

pub use crate::section::Section;
use crate::section::Frame;

/// Abort marker returned by callbacks to cancel rendering.
///
/// The VM reports [`Error::User`] and unwinds immediately; partial output
/// cleanup happens in [`Render::on_render_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt;

/// Host-side rendering callbacks.
///
/// `Scope` carries the host's data context; every section frame holds one,
/// children start with their parent's value, and
/// [`Section::set_scope`] rebinds the current frame (typically from
/// [`on_section_start`](Render::on_section_start) to the element at the
/// iteration index).
pub trait Render {
    type Scope: Clone + PartialEq;

    /// Emit raw template bytes.
    fn on_text(&mut self, section: &Section<'_, Self::Scope>, text: &[u8]) -> Result<(), Halt>;

    /// Resolve `name` against the current scope (walking ancestors as
    /// needed) and emit it, HTML-escaping when `escape` is set. Missing
    /// names are equivalent to an empty string.
    fn on_arg(
        &mut self,
        section: &Section<'_, Self::Scope>,
        name: &[u8],
        escape: bool,
    ) -> Result<(), Halt>;

    /// Report how many times the section body should run: a collection's
    /// length, `1` for a truthy scalar, `0` for falsy or missing.
    ///
    /// `callable` is set for normal sections; a host that resolves `name`
    /// to a function may invoke it (see [`Section::body_text`]) and return
    /// `0` to suppress default rendering. Inverted sections get the
    /// returned count inverted to `0` or `1` by the VM.
    fn on_section_test(
        &mut self,
        section: &mut Section<'_, Self::Scope>,
        name: &[u8],
        callable: bool,
    ) -> Result<u32, Halt>;

    /// Fires at the start of each iteration, after the test; `index` is
    /// zero-based. The expected reaction is rebinding the section scope to
    /// the element at `index`.
    fn on_section_start(
        &mut self,
        _section: &mut Section<'_, Self::Scope>,
        _name: &[u8],
        _index: u32,
    ) -> Result<(), Halt> {
        Ok(())
    }

    /// Cleanup hook invoked once when rendering fails for any reason,
    /// with the root scope. Hosts typically discard partial output here.
    fn on_render_error(&mut self, _scope: &Self::Scope) {}
}

/// Render `program` through `handler`, rooting the scope chain at `scope`.
///
/// Callbacks fire in document order; a section's body is fully delivered
/// once per iteration before the walk moves past its end. On any failure
/// [`Render::on_render_error`] runs and the error is returned.
pub fn render<R: Render>(program: &Program, handler: &mut R, scope: R::Scope) -> Result<()> {
    let Some(first) = program.instructions().first() else {
        return Ok(());
    };
    let root_end = match *first {
        Instruction::SectionStart(d) | Instruction::SectionStartInv(d) => d.end,
        _ => 0,
    };
    let mut frames: Vec<Frame<R::Scope>> = Vec::with_capacity(MAX_NESTING + 2);
    frames.push(Frame { scope, start: 0, end: root_end, index: 0, count: 0 });

    let result = run(program, handler, &mut frames);
    if result.is_err() {
        handler.on_render_error(&frames[0].scope);
    }
    result
}

fn run<R: Render>(
    program: &Program,
    handler: &mut R,
    frames: &mut Vec<Frame<R::Scope>>,
) -> Result<()> {
    let instructions = program.instructions();
    let mut pos: u32 = 0;

    while (pos as usize) < instructions.len() {
        let inst = instructions[pos as usize];
        match inst {
            Instruction::Text { pos: text_pos, len } => {
                let text = program.slice(text_pos, len as usize);
                let section = Section::new(program, frames, pos);
                handler.on_text(&section, text).map_err(|_| Error::User)?;
            }

            Instruction::Arg { name_pos, name_len } | Instruction::ArgRaw { name_pos, name_len } => {
                let escape = matches!(inst, Instruction::Arg { .. });
                let name = program.slice(name_pos, name_len as usize);
                let section = Section::new(program, frames, pos);
                handler
                    .on_arg(&section, name, escape)
                    .map_err(|_| Error::User)?;
            }

            Instruction::SectionStart(_)
            | Instruction::SectionStartInv(_)
            | Instruction::SectionGoto { .. } => {
                // the two bookkeeping frames (root pseudo-frame and template
                // wrapper) don't count against the host-visible depth
                if frames.len() >= MAX_NESTING + 2 {
                    return Err(Error::TooDeep);
                }
                let inherited = frames.last().expect("root frame always present").scope.clone();
                let (start, end) = match inst {
                    Instruction::SectionGoto { target, resume } => (target, resume),
                    Instruction::SectionStart(d) | Instruction::SectionStartInv(d) => (pos, d.end),
                    _ => unreachable!(),
                };
                frames.push(Frame { scope: inherited, start, end, index: 0, count: 1 });

                if let Some((name_pos, name_len)) = inst.section_name() {
                    let name = program.slice(name_pos, name_len as usize);
                    let callable = matches!(inst, Instruction::SectionStart(_));
                    let mut section = Section::new(program, frames, pos);
                    let raw = handler
                        .on_section_test(&mut section, name, callable)
                        .map_err(|_| Error::User)?;
                    let count = if matches!(inst, Instruction::SectionStartInv(_)) {
                        u32::from(raw == 0)
                    } else {
                        raw
                    };
                    trace!(
                        "section \"{}\" count={count}",
                        String::from_utf8_lossy(name)
                    );
                    frames.last_mut().expect("frame pushed above").count = count;
                }
                pos = step_section(program, handler, frames)?;
            }

            Instruction::SectionEnd(_) => {
                pos = step_section(program, handler, frames)?;
            }
        }
        pos += 1;
    }
    Ok(())
}

/// Iterate or exit the top frame; returns the position the walk continues
/// from (one short of the next instruction, the caller advances).
fn step_section<R: Render>(
    program: &Program,
    handler: &mut R,
    frames: &mut Vec<Frame<R::Scope>>,
) -> Result<u32> {
    if frames.len() < 2 {
        // a SectionEnd with no open section: corrupt instruction stream
        return Err(Error::Unknown);
    }
    let top = frames.last().expect("length checked above");
    let (index, count, start, end) = (top.index, top.count, top.start, top.end);

    if index < count {
        // (re)enter the body for iteration `index`
        let inherited = frames[frames.len() - 2].scope.clone();
        frames.last_mut().expect("length checked above").scope = inherited;
        let entry = program
            .instructions()
            .get(start as usize)
            .ok_or(Error::Unknown)?;
        if let Some((name_pos, name_len)) = entry.section_name() {
            let name = program.slice(name_pos, name_len as usize);
            let mut section = Section::new(program, frames, start);
            handler
                .on_section_start(&mut section, name, index)
                .map_err(|_| Error::User)?;
        }
        frames.last_mut().expect("length checked above").index += 1;
        Ok(start)
    } else {
        frames.pop();
        Ok(end)
    }
}
