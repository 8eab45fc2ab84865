//! Error taxonomy for the encoder and the surrounding assembler pipeline.

use thiserror::Error;

/// Errors raised while encoding a single instruction.
///
/// Most of these are reported once per offending instruction and the
/// assembler moves on to the next node; [`EncodingError::InvalidHighRegisterWithRex`]
/// is the one variant that aborts the whole run (see [`AssembleError`]).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EncodingError {
    /// Two operands disagree on bit width.
    #[error("width mismatch: {0} vs {1}")]
    WidthMismatch(&'static str, &'static str),

    /// A memory operand lacks an explicit size and its pair can't supply one.
    #[error("ambiguous operand size")]
    AmbiguousSize,

    /// Register name not present in the catalog.
    #[error("unknown register: {0}")]
    UnknownRegister(String),

    /// Mnemonic valid but this operand-kind tuple has no encoder.
    #[error("unsupported form: {mnemonic} with {operands} operand(s)")]
    UnsupportedForm { mnemonic: String, operands: usize },

    /// A high-byte register (%ah/%ch/%dh/%bh) was required in a form that
    /// also needs a REX prefix.
    #[error("high-byte register {0} cannot be combined with a REX prefix")]
    InvalidHighRegisterWithRex(String),
}

/// Errors that can abort an assembly run outright.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// Pass 2 found a label reference with no matching definition.
    #[error("unresolved label: {0}")]
    UnresolvedLabel(String),

    /// A high-byte register was combined with a REX prefix; fatal by policy.
    /// (The only [`EncodingError`] variant that is not swallowed per-instruction.)
    #[error(transparent)]
    Encoding(EncodingError),

    /// The source failed to lex/parse into a `Program`.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Filesystem or ELF-write failure.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

/// Errors raised while turning source text into a [`crate::ast::Program`].
///
/// Out of scope per `spec.md` §1 (the lexer/parser is an "external
/// collaborator"), but the crate builds one anyway so it is actually
/// runnable end to end; a parse failure still needs somewhere to go.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("line {line}: unexpected character {ch:?}")]
    UnexpectedChar { line: u32, ch: char },

    #[error("line {line}: expected an operand")]
    ExpectedOperand { line: u32 },

    #[error("line {line}: expected {expected}")]
    Expected { line: u32, expected: &'static str },

    #[error("line {line}: invalid integer literal {text:?}")]
    InvalidInteger { line: u32, text: String },

    #[error("line {line}: invalid scale {scale} (must be 1, 2, 4, or 8)")]
    InvalidScale { line: u32, scale: i64 },
}
