//! A two-pass assembler for a subset of x86-64 written in AT&T syntax.
//!
//! The crate consumes assembly source text and produces either a raw
//! binary image of the code section or a relocatable ELF64 object file
//! with separate code/data sections, a symbol table, and relocation
//! entries.
//!
//! The core is the encoder ([`encoder`]): operand-addressing and
//! instruction-encoding tables, the two-pass layout pipeline
//! ([`layout`]) that resolves label addresses and generates relocations,
//! and the ELF64 object-file writer ([`elf`]) that consumes the
//! encoder's output. The lexer ([`lexer`]) and parser ([`parser`]) turn
//! assembly text into the [`ast::Program`] the layout engine walks; the
//! command-line surface lives in `src/main.rs`.
//!
//! ```rust
//! use attasm::encoder::OutputFormat;
//! use attasm::{layout, parser};
//!
//! let program = parser::parse("mov $1, %rax\nsyscall\n").unwrap();
//! let (result, _labels, _relocs) = layout::assemble(&program, OutputFormat::Binary).unwrap();
//! assert_eq!(result.code, vec![0x48, 0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00, 0x0F, 0x05]);
//! ```

pub mod ast;
pub mod elf;
pub mod encoder;
pub mod error;
pub mod label;
pub mod lexer;
pub mod layout;
pub mod operand;
pub mod parser;
pub mod reg;
pub mod reloc;
