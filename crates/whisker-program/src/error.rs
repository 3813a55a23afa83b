//! Engine errors.
//!
//! One flat taxonomy shared by the loader and the VM. No error is recovered
//! internally: every failure aborts the enclosing load or render call.

use thiserror::Error;

/// Engine result type.
///
/// The error parameter defaults to the engine taxonomy; callback seams
/// substitute their own marker (e.g. the VM's `Halt`).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Engine errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Stack depth, section nesting, or program size limits exceeded.
    #[error("nesting or program size limit exceeded")]
    TooDeep,

    /// Unterminated tag, mismatched section close, or malformed delimiter tag.
    #[error("tag closure mismatch")]
    ClosureMismatch,

    /// A partial could not be resolved to a readable file.
    #[error("template file not found")]
    FileNotFound,

    /// Template file size is 2^31 bytes or more.
    #[error("template file too big")]
    FileTooBig,

    /// Template file name is 8192 bytes or longer.
    #[error("template file name too long")]
    FileNameTooLong,

    /// Template file name is empty.
    #[error("template file name too short")]
    FileNameTooShort,

    /// Reserved: the template resolved to no content.
    #[error("empty template")]
    EmptyTemplate,

    /// A delimiter tag set a delimiter longer than the engine supports.
    #[error("delimiter too long")]
    DelimiterTooLong,

    /// A tag name does not fit the 16-bit instruction fields.
    #[error("tag name too long")]
    NameTooLong,

    /// Invalid instruction stream (corrupt or hand-built program).
    #[error("unknown instruction")]
    Unknown,

    /// A render callback aborted processing.
    #[error("render callback aborted")]
    User,
}
