//! The two-pass layout engine (`spec.md` §4.6): pass 1 sizes every node and
//! records label addresses by invoking encoders in dry-run mode; pass 2
//! re-invokes them with the completed label table to emit final bytes and
//! record relocations.
//!
//! The shared current-section/cursor/label-table/reloc-table/pass state
//! that the original assembler kept as process globals is gathered here
//! into a single [`Context`] value threaded explicitly through both
//! passes (`SPEC_FULL.md` §5), making two independent assemblies in one
//! process trivially safe.

use crate::ast::{Directive, Node, Program};
use crate::encoder::insn;
use crate::encoder::{EncodeEnv, OutputFormat};
use crate::error::{AssembleError, EncodingError};
use crate::label::{LabelTable, Section};
use crate::operand::Operand;
use crate::reloc::{RelocEntry, RelocTable};

/// Output of a completed assembly: the raw bytes of each section.
///
/// Byte lengths equal their section's cursor at the end of pass 2, per
/// `spec.md` §3, as long as no directive seeks a section's cursor
/// backwards past the final emitted byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembleResult {
    pub code: Vec<u8>,
    pub data: Vec<u8>,
}

/// The assembly-context value threaded through both passes: current
/// section and per-section cursors. Reset at the start of each pass; which
/// pass is running is implicit in whether `run_pass1`/`run_pass2` (and
/// hence `EncodeEnv::labels`, `None` vs `Some`) is the caller.
struct Context {
    section: Section,
    code_cursor: u32,
    data_cursor: u32,
}

impl Context {
    fn new() -> Self {
        Context {
            section: Section::Code,
            code_cursor: 0,
            data_cursor: 0,
        }
    }

    fn cursor(&self) -> u32 {
        match self.section {
            Section::Code => self.code_cursor,
            Section::Data => self.data_cursor,
        }
    }

    fn set_cursor(&mut self, value: u32) {
        match self.section {
            Section::Code => self.code_cursor = value,
            Section::Data => self.data_cursor = value,
        }
    }

    fn advance(&mut self, len: u32) {
        self.set_cursor(self.cursor() + len);
    }
}

/// Parse a `.org` argument (or any other directive's bare integer
/// argument): decimal, or `0x`/`0X`-prefixed hex, matching
/// [`crate::parser::Parser::parse_integer`]'s number grammar.
fn parse_arg_integer(text: &str) -> Option<u32> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        text.parse::<u32>()
    };
    parsed.ok()
}

/// Write `bytes` at `cursor` into `buf`, zero-padding `buf` first if
/// `cursor` lies past its current end (the case after a forward `.org`
/// seek). A `cursor` inside the existing buffer patches in place, which is
/// what lets `.org` seek backward and overwrite already-emitted bytes.
fn emit_at(buf: &mut Vec<u8>, cursor: u32, bytes: &[u8]) {
    let start = cursor as usize;
    let end = start + bytes.len();
    if buf.len() < end {
        buf.resize(end, 0);
    }
    buf[start..end].copy_from_slice(bytes);
}

/// Directive sizes/effects shared by both passes. Returns the byte length
/// this directive contributes to the active section's cursor (0 for
/// `.code`/`.data`/`.org`/unknown directives, `text.len() + 1` for
/// `.string`).
fn directive_len(dir: &Directive) -> u32 {
    match dir.name.as_str() {
        ".string" => dir.args.first().map(|s| s.len() as u32 + 1).unwrap_or(1),
        _ => 0,
    }
}

/// Apply a directive's section/cursor side effect (everything but actually
/// emitting bytes, which `run_pass2` does separately for `.string` before
/// calling this).
fn apply_directive(ctx: &mut Context, dir: &Directive) {
    match dir.name.as_str() {
        ".code" => ctx.section = Section::Code,
        ".data" => ctx.section = Section::Data,
        ".org" => {
            if let Some(addr) = dir.args.first().and_then(|a| parse_arg_integer(a)) {
                ctx.set_cursor(addr);
            } else {
                log::warn!(".org with a missing or invalid address argument, ignored");
            }
        }
        ".string" => ctx.advance(directive_len(dir)),
        _ => log::debug!("skipping unknown directive {:?}", dir.name),
    }
}

/// Every `LabelRef` operand an instruction references, in operand order.
fn label_refs(operands: &[Operand]) -> impl Iterator<Item = &str> {
    operands.iter().filter_map(|op| op.as_label())
}

/// Run pass 1: walk the program once, recording every label's (name,
/// section, address) and leaving the label table read-only for pass 2.
/// Per-instruction encoding errors other than
/// [`EncodingError::InvalidHighRegisterWithRex`] are logged and the
/// offending node contributes zero bytes, matching pass 2's behavior for
/// the same node (see [`run_pass2`]) so the two passes stay consistent.
fn run_pass1(program: &Program, format: OutputFormat) -> Result<LabelTable, AssembleError> {
    let mut ctx = Context::new();
    let mut labels = LabelTable::new();

    for node in &program.nodes {
        match node {
            Node::Label(name) => {
                if labels.contains(name) {
                    log::warn!("duplicate label {name:?}, keeping its first definition");
                } else {
                    labels.push(name.clone(), ctx.cursor(), ctx.section);
                }
            }
            Node::Directive(dir) => apply_directive(&mut ctx, dir),
            Node::Instruction(insn_node) => {
                let env = EncodeEnv {
                    here: ctx.cursor(),
                    section: ctx.section,
                    labels: None,
                    format,
                };
                match insn::encode(&insn_node.mnemonic, &insn_node.operands, &env) {
                    Ok(encoded) => ctx.advance(encoded.bytes.len() as u32),
                    Err(EncodingError::InvalidHighRegisterWithRex(reg)) => {
                        return Err(AssembleError::Encoding(
                            EncodingError::InvalidHighRegisterWithRex(reg),
                        ))
                    }
                    Err(err) => {
                        log::error!("{}: {err}", insn_node.mnemonic);
                    }
                }
            }
        }
    }

    Ok(labels)
}

/// Run pass 2: walk the program again with the completed label table,
/// emitting final bytes into the matching section buffer and recording
/// relocations at their patch sites.
fn run_pass2(
    program: &Program,
    format: OutputFormat,
    labels: &LabelTable,
) -> Result<(AssembleResult, RelocTable), AssembleError> {
    let mut ctx = Context::new();
    let mut result = AssembleResult::default();
    let mut relocs = RelocTable::new();

    for node in &program.nodes {
        match node {
            Node::Label(_) => {}
            Node::Directive(dir) => {
                if dir.name == ".string" {
                    let text = dir.args.first().map(|s| s.as_str()).unwrap_or("");
                    let mut bytes = text.as_bytes().to_vec();
                    bytes.push(0);
                    let buf = match ctx.section {
                        Section::Code => &mut result.code,
                        Section::Data => &mut result.data,
                    };
                    emit_at(buf, ctx.cursor(), &bytes);
                }
                apply_directive(&mut ctx, dir);
            }
            Node::Instruction(insn_node) => {
                for target in label_refs(&insn_node.operands) {
                    if !labels.contains(target) {
                        return Err(AssembleError::UnresolvedLabel(target.to_string()));
                    }
                }

                let env = EncodeEnv {
                    here: ctx.cursor(),
                    section: ctx.section,
                    labels: Some(labels),
                    format,
                };
                match insn::encode(&insn_node.mnemonic, &insn_node.operands, &env) {
                    Ok(encoded) => {
                        let here = ctx.cursor();
                        let buf = match ctx.section {
                            Section::Code => &mut result.code,
                            Section::Data => &mut result.data,
                        };
                        emit_at(buf, here, &encoded.bytes);
                        if let Some(reloc) = encoded.reloc {
                            relocs.push(RelocEntry {
                                target: reloc.target,
                                offset: here + reloc.byte_offset,
                                section: ctx.section,
                                kind: reloc.kind,
                            });
                        }
                        ctx.advance(encoded.bytes.len() as u32);
                    }
                    Err(EncodingError::InvalidHighRegisterWithRex(reg)) => {
                        return Err(AssembleError::Encoding(
                            EncodingError::InvalidHighRegisterWithRex(reg),
                        ))
                    }
                    Err(err) => {
                        log::error!("{}: {err}", insn_node.mnemonic);
                    }
                }
            }
        }
    }

    Ok((result, relocs))
}

/// Assemble a parsed [`Program`] into code/data bytes plus the label and
/// relocation tables the caller's output writer (raw binary or ELF) needs.
pub fn assemble(
    program: &Program,
    format: OutputFormat,
) -> Result<(AssembleResult, LabelTable, RelocTable), AssembleError> {
    let labels = run_pass1(program, format)?;
    log::debug!("pass 1 complete: {} label(s)", labels.len());
    let (result, relocs) = run_pass2(program, format, &labels)?;
    log::debug!(
        "pass 2 complete: {} code byte(s), {} data byte(s), {} relocation(s)",
        result.code.len(),
        result.data.len(),
        relocs.len()
    );
    Ok((result, labels, relocs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn assemble_src(src: &str) -> AssembleResult {
        let program = parse(src).unwrap();
        let (result, _labels, _relocs) = assemble(&program, OutputFormat::Binary).unwrap();
        result
    }

    #[test]
    fn scenario_mov_imm_syscall() {
        let result = assemble_src("mov $1, %rax\nsyscall\n");
        assert_eq!(
            result.code,
            vec![0x48, 0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00, 0x0F, 0x05]
        );
    }

    #[test]
    fn scenario_mov_reg_reg() {
        let result = assemble_src("mov %rsp, %rbp\n");
        assert_eq!(result.code, vec![0x48, 0x89, 0xE5]);
    }

    #[test]
    fn scenario_mov_mem_reg_needs_sib() {
        let result = assemble_src("mov (%rsp), %rax\n");
        assert_eq!(result.code, vec![0x48, 0x8B, 0x04, 0x24]);
    }

    #[test]
    fn scenario_add_short_form() {
        let result = assemble_src("add $5, %al\n");
        assert_eq!(result.code, vec![0x04, 0x05]);
    }

    #[test]
    fn scenario_jmp_self_backward_disp() {
        let result = assemble_src("L: jmp L\n");
        assert_eq!(result.code, vec![0xE9, 0xFB, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn scenario_je_forward() {
        let result = assemble_src("je L\nL:\n");
        assert_eq!(result.code, vec![0x0F, 0x84, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn scenario_int3_and_int80() {
        let result = assemble_src("int $3\nint $0x80\n");
        assert_eq!(result.code, vec![0xCC, 0xCD, 0x80]);
    }

    #[test]
    fn unresolved_label_aborts() {
        let program = parse("jmp missing\n").unwrap();
        let err = assemble(&program, OutputFormat::Binary).unwrap_err();
        assert!(matches!(err, AssembleError::UnresolvedLabel(name) if name == "missing"));
    }

    #[test]
    fn bad_instruction_is_skipped_not_fatal() {
        // Width mismatch: %al is 8-bit, %eax is 32-bit.
        let result = assemble_src("mov %al, %eax\nmov %rax, %rbx\n");
        assert_eq!(result.code, vec![0x48, 0x89, 0xC3]);
    }

    #[test]
    fn base_less_sib_form_gets_mandatory_disp32() {
        // `(,%rax,4)`: mod=00, SIB.base=101 is the "disp32, no base" special
        // case, so a zeroed 4-byte displacement must follow the SIB byte.
        let result = assemble_src("mov (,%rax,4), %rcx\n");
        assert_eq!(
            result.code,
            vec![0x48, 0x8B, 0x0C, 0x85, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn string_directive_emits_bytes_and_terminator() {
        let result = assemble_src(".data\nmsg: .string \"hi\"\n");
        assert_eq!(result.data, vec![b'h', b'i', 0]);
    }
}
