//! Partial resolution.
//!
//! A `{{>name}}` tag resolves against the directories of the templates on
//! the parsing stack, innermost first, trying `name` verbatim and then with
//! a `.mustache` extension. A hit on an already-loaded file compiles to a
//! jump into the existing instruction range instead of a second copy; a
//! miss that names the virtual root template jumps back to instruction 0.

use std::fs;

use tracing::{debug, trace};

use whisker_program::instruction::Instruction;
use whisker_program::limits::{MAX_FILENAME, MAX_FILE_SIZE};
use whisker_program::segment;
use whisker_program::{Error, Result};

use crate::Loader;

impl Loader {
    /// Resolve `name` and either jump to a cached template or register a
    /// freshly read file and push its parsing frame.
    pub(crate) fn load_partial(&mut self, name: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::FileNameTooShort);
        }
        if name.len() >= MAX_FILENAME {
            return Err(Error::FileNameTooLong);
        }

        let Some((path, size)) = self.resolve(name) else {
            // a partial naming the root template is a self-reference even
            // when no such file exists (the root may be inline source)
            if !self.blob.is_empty() && segment::read(&self.blob, 0).filename == name {
                trace!("partial \"{}\" is a root self-reference", String::from_utf8_lossy(name));
                let resume = self.instructions.len() as u32;
                return self.push_instruction(Instruction::SectionGoto { target: 0, resume });
            }
            return Err(Error::FileNotFound);
        };

        if size >= MAX_FILE_SIZE {
            return Err(Error::FileTooBig);
        }
        if let Some(target) = self.lookup(&path) {
            trace!(
                "partial cache hit for \"{}\" -> instruction {}",
                String::from_utf8_lossy(&path),
                target
            );
            let resume = self.instructions.len() as u32;
            return self.push_instruction(Instruction::SectionGoto { target, resume });
        }

        let text = std::str::from_utf8(&path).expect("resolved paths are valid UTF-8");
        let bytes = fs::read(text).map_err(|_| Error::Unknown)?;
        debug!("loading partial \"{text}\"");
        self.register(&path, &bytes)
    }

    /// Walk the parsing stack's template directories for a readable file.
    ///
    /// Directories equal to the one just tried are skipped, and a
    /// CWD-rooted frame (empty directory) ends the walk. With no frames at
    /// all (the root load) only the current directory is tried.
    fn resolve(&self, name: &[u8]) -> Option<(Vec<u8>, u64)> {
        let mut dirs: Vec<Vec<u8>> = Vec::new();
        if self.frames.is_empty() {
            dirs.push(Vec::new());
        } else {
            for frame in self.frames.iter().rev() {
                let dir = segment::read(&self.blob, frame.data_start as usize).dir();
                if dirs.last().map(Vec::as_slice) == Some(dir) {
                    continue;
                }
                dirs.push(dir.to_vec());
                if dir.is_empty() {
                    break;
                }
            }
        }

        for dir in &dirs {
            let mut candidate = Vec::with_capacity(dir.len() + name.len() + 9);
            candidate.extend_from_slice(dir);
            candidate.extend_from_slice(name);
            if let Some(size) = stat_file(&candidate) {
                return Some((candidate, size));
            }
            candidate.extend_from_slice(b".mustache");
            if let Some(size) = stat_file(&candidate) {
                return Some((candidate, size));
            }
        }
        None
    }

    /// Scan the directory chain for an already-loaded file.
    fn lookup(&self, path: &[u8]) -> Option<u32> {
        let mut at = 0usize;
        while at < self.blob.len() {
            let seg = segment::read(&self.blob, at);
            if seg.filename == path {
                return Some(seg.inst_start);
            }
            at = seg.next as usize;
        }
        None
    }
}

/// Size of `candidate` when it names a regular file.
///
/// Non-UTF-8 candidates cannot reach the filesystem API and count as
/// missing.
fn stat_file(candidate: &[u8]) -> Option<u64> {
    let path = std::str::from_utf8(candidate).ok()?;
    let meta = fs::metadata(path).ok()?;
    meta.is_file().then(|| meta.len())
}
