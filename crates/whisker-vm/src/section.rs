//! The section handle passed to render callbacks.

use whisker_program::{Instruction, Program};

/// One active section iteration.
#[derive(Debug)]
pub(crate) struct Frame<S> {
    /// Host scope, inherited from the parent frame and re-inherited at the
    /// start of every iteration.
    pub scope: S,
    /// Instruction index re-entered on each iteration.
    pub start: u32,
    /// Instruction index executed after the final iteration.
    pub end: u32,
    /// Zero-based iteration counter.
    pub index: u32,
    /// Iterations requested by the host's section test.
    pub count: u32,
}

/// Callback view of the current section.
///
/// The handle pairs the program with the active slice of the section stack,
/// so callbacks can rebind the current scope, look outward for an enclosing
/// data context, and read the raw body of the section being tested.
pub struct Section<'a, S> {
    program: &'a Program,
    frames: &'a mut [Frame<S>],
    pos: u32,
}

impl<'a, S: Clone + PartialEq> Section<'a, S> {
    pub(crate) fn new(program: &'a Program, frames: &'a mut [Frame<S>], pos: u32) -> Self {
        debug_assert!(!frames.is_empty());
        Self { program, frames, pos }
    }

    /// The current frame's scope.
    #[must_use]
    pub fn scope(&self) -> &S {
        &self.frames.last().expect("section stack is never empty").scope
    }

    /// Rebind the current frame's scope.
    ///
    /// Children inherit the new value; parent frames are unaffected.
    pub fn set_scope(&mut self, scope: S) {
        self.frames.last_mut().expect("section stack is never empty").scope = scope;
    }

    /// The nearest ancestor frame whose scope differs from the current one.
    ///
    /// Frames that merely inherited their parent's context are passed
    /// through; `None` means every enclosing frame shares this scope.
    #[must_use]
    pub fn parent_scope(&self) -> Option<&S> {
        self.ancestors().next()
    }

    /// Enclosing data contexts, nearest first.
    ///
    /// Walks the section stack outward, yielding each frame whose scope
    /// differs from the one yielded before it (starting from the current
    /// scope). Hosts resolve names against the current scope first and then
    /// along this chain.
    pub fn ancestors(&self) -> impl Iterator<Item = &S> + '_ {
        let mut last = self.scope();
        self.frames[..self.frames.len() - 1]
            .iter()
            .rev()
            .filter_map(move |f| {
                if f.scope != *last {
                    last = &f.scope;
                    Some(&f.scope)
                } else {
                    None
                }
            })
    }

    /// The unparsed body of the section currently being entered.
    ///
    /// Only meaningful while the VM is executing a named normal section
    /// start (section test or iteration start); anywhere else the body is
    /// not addressable and `None` is returned. Lambda-style hosts use this
    /// to emit or transform the literal source.
    #[must_use]
    pub fn body_text(&self) -> Option<&'a [u8]> {
        match self.program.instructions().get(self.pos as usize)? {
            Instruction::SectionStart(d) if d.name_pos != 0 => Some(
                self.program
                    .slice(d.name_pos + u32::from(d.offset), d.len as usize),
            ),
            _ => None,
        }
    }
}
