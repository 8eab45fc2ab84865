//! Encoder primitives: REX/ModR/M/SIB byte construction, operand-size and
//! address-size prefixes, and the handful of parameterized emitters shared
//! by every per-mnemonic encoder in `insn/`.
//!
//! Callers resolve operand kinds at runtime (from a parsed [`Operand`])
//! rather than through a compile-time `Reg`/`Imm`/`Mem` trait, since the
//! mnemonic and operand kinds here come from an assembly source file, not
//! from Rust call sites chosen at compile time.

pub mod insn;

use crate::error::EncodingError;
use crate::label::{LabelTable, Section};
use crate::operand::{MemOperand, Operand};
use crate::reg::{Register, Width};
use crate::reloc::RelocKind;

/// Whether the assembler is targeting a raw binary image or an ELF64
/// object. Only affects how `mov reg, labelref` is realized (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Binary,
    Elf,
}

/// Everything a per-mnemonic encoder needs to know about *where* it is
/// being invoked from. During pass 1 (sizing) `labels` is `None`: encoders
/// must still produce a byte sequence of the correct length without
/// knowing any label address, which holds because every label-referencing
/// form here is fixed-size (rel32 jumps, `C7 /0 imm32` for `mov`).
pub struct EncodeEnv<'a> {
    pub here: u32,
    pub section: Section,
    pub labels: Option<&'a LabelTable>,
    pub format: OutputFormat,
}

/// A relocation an encoder asks the layout engine to record, expressed as
/// an offset into the bytes *it just returned* (the layout engine adds its
/// own `here` to get the final section-relative patch site).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReloc {
    pub byte_offset: u32,
    pub target: String,
    pub kind: RelocKind,
}

/// The result of encoding one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub reloc: Option<PendingReloc>,
}

impl Encoded {
    fn bytes(bytes: Vec<u8>) -> Self {
        Encoded {
            bytes,
            reloc: None,
        }
    }
}

/// Encode the `REX` byte. `r`/`x`/`b` are full register encoding numbers;
/// only their top bit is consulted.
pub(crate) const fn rex(w: bool, r: u8, x: u8, b: u8) -> u8 {
    let w = if w { 1 } else { 0 };
    let r = (r >> 3) & 1;
    let x = (x >> 3) & 1;
    let b = (b >> 3) & 1;
    0b0100_0000 | ((w & 1) << 3) | (r << 2) | (x << 1) | b
}

/// Encode the `ModR/M` byte.
pub(crate) const fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    ((mode & 0b11) << 6) | ((reg & 0b111) << 3) | (rm & 0b111)
}

/// Encode the `SIB` byte. `scale` is already log2-encoded (0..=3).
pub(crate) const fn sib(scale: u8, index: u8, base: u8) -> u8 {
    ((scale & 0b11) << 6) | ((index & 0b111) << 3) | (base & 0b111)
}

fn scale_log2(scale: u8) -> u8 {
    match scale {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => unreachable!("parser guarantees scale is a power of two in {{1,2,4,8}}"),
    }
}

/// `0x66` operand-size override: every form here defaults to 32-bit
/// operand size, so a 16-bit operand always needs this prefix.
fn operand_size_prefix(width: Width) -> Option<u8> {
    matches!(width, Width::W16).then_some(0x66)
}

/// `0x67` address-size override: emitted when the effective address
/// register (base, or index if there's no base) is 32-bit.
fn address_size_prefix(mem: &MemOperand) -> Option<u8> {
    let addr_reg = mem.base.or(mem.index);
    addr_reg
        .map(|r| r.width() == Width::W32)
        .unwrap_or(false)
        .then_some(0x67)
}

/// Build the REX byte (if any) for a set of operand registers, checking
/// the high-byte/REX conflict along the way.
///
/// `w` is the REX.W bit; `r_reg`/`x_reg`/`b_reg` are the registers (if any)
/// feeding the REX.R/X/B extension bits; `all_regs` is every register
/// operand touched by the instruction, used only to decide whether a
/// new-low-byte register forces an (possibly empty) REX prefix and whether
/// a high-byte register is present at all.
pub(crate) fn build_rex(
    w: bool,
    r_reg: Option<Register>,
    x_reg: Option<Register>,
    b_reg: Option<Register>,
    all_regs: &[Register],
) -> Result<Option<u8>, EncodingError> {
    let needs_rex = w
        || r_reg.map(|r| r.is_extended()).unwrap_or(false)
        || x_reg.map(|r| r.is_extended()).unwrap_or(false)
        || b_reg.map(|r| r.is_extended()).unwrap_or(false)
        || all_regs.iter().any(|r| r.is_new_low_byte());

    if let Some(bad) = all_regs.iter().find(|r| r.is_high_byte()) {
        if needs_rex {
            return Err(EncodingError::InvalidHighRegisterWithRex(
                bad.name().to_string(),
            ));
        }
    }

    if !needs_rex {
        return Ok(None);
    }
    Ok(Some(rex(
        w,
        r_reg.map(|r| r.code()).unwrap_or(0),
        x_reg.map(|r| r.code()).unwrap_or(0),
        b_reg.map(|r| r.code()).unwrap_or(0),
    )))
}

/// Write `value` truncated (or sign-extended, for the reader's purposes --
/// we only ever truncate here since `value` already carries the sign) to
/// `width` bits, little-endian.
fn write_imm(buf: &mut Vec<u8>, value: i64, width: Width) {
    match width {
        Width::W8 => buf.push(value as u8),
        Width::W16 => buf.extend_from_slice(&(value as i16).to_le_bytes()),
        Width::W32 => buf.extend_from_slice(&(value as i32).to_le_bytes()),
        Width::W64 => buf.extend_from_slice(&value.to_le_bytes()),
    }
}

/// The `mod`/`rm` fields plus any SIB byte and displacement bytes for a
/// memory operand, built per §4.2's SIB/RIP-sensitive-base rules.
pub(crate) struct MemEncoding {
    pub mode: u8,
    pub rm: u8,
    pub sib: Option<u8>,
    pub disp: Vec<u8>,
    pub rex_x: Option<Register>,
    pub rex_b: Option<Register>,
}

pub(crate) fn encode_mem_addressing(mem: &MemOperand) -> Result<MemEncoding, EncodingError> {
    let needs_sib = mem.needs_sib();
    let rip_sensitive = mem.is_rip_sensitive_base();

    let (mode, explicit_disp): (u8, Option<i64>) = if mem.has_disp {
        (0b10, Some(mem.disp))
    } else if rip_sensitive {
        (0b01, Some(0))
    } else {
        (0b00, None)
    };

    let disp_width = match mode {
        0b00 => None,
        0b01 => Some(1usize),
        0b10 => Some(4usize),
        _ => unreachable!(),
    };

    let mut disp = Vec::new();
    if let (Some(v), Some(w)) = (explicit_disp, disp_width) {
        if w == 1 {
            disp.push(v as i8 as u8);
        } else {
            disp.extend_from_slice(&(v as i32).to_le_bytes());
        }
    }

    if needs_sib {
        let base = mem.base;
        let index = mem.index;
        let base_low3 = base.map(|b| b.low3()).unwrap_or(0b101);
        let index_low3 = index.map(|i| i.low3()).unwrap_or(0b100);
        let sib_byte = sib(scale_log2(mem.scale), index_low3, base_low3);
        // `mod=00`/`SIB.base=101` (base-less index form, e.g. `(,%rax,4)`)
        // is the "disp32, no base" special case: a trailing 4-byte
        // displacement is mandatory even when the source gave none.
        if base.is_none() && disp.is_empty() {
            disp = (mem.disp as i32).to_le_bytes().to_vec();
        }
        Ok(MemEncoding {
            mode: if base.is_none() { 0b00 } else { mode },
            rm: 0b100,
            sib: Some(sib_byte),
            disp,
            rex_x: index,
            rex_b: base,
        })
    } else {
        let base = mem.base.ok_or_else(|| EncodingError::UnsupportedForm {
            mnemonic: "<mem>".to_string(),
            operands: 0,
        })?;
        Ok(MemEncoding {
            mode,
            rm: base.low3(),
            sib: None,
            disp,
            rex_x: None,
            rex_b: Some(base),
        })
    }
}

/// `r/m, r` and `r, r/m` register-register forms (ModR/M `mod=11`).
/// `dst` lands in ModR/M.rm, `src` in ModR/M.reg, matching the opcode's
/// MR direction (this covers both rows of the table for the reg/reg case,
/// since the two opcode bytes chosen by the caller already encode which
/// form applies).
pub(crate) fn reg_reg(
    opcode8: u8,
    opcode_wide: u8,
    dst: Register,
    src: Register,
) -> Result<Encoded, EncodingError> {
    if dst.width() != src.width() {
        return Err(EncodingError::WidthMismatch(dst.width().name(), src.width().name()));
    }
    let width = dst.width();
    let mut bytes = Vec::with_capacity(4);
    if let Some(p) = operand_size_prefix(width) {
        bytes.push(p);
    }
    if let Some(r) = build_rex(width == Width::W64, Some(src), None, Some(dst), &[dst, src])? {
        bytes.push(r);
    }
    let opcode = if width == Width::W8 { opcode8 } else { opcode_wide };
    bytes.push(opcode);
    bytes.push(modrm(0b11, src.low3(), dst.low3()));
    Ok(Encoded::bytes(bytes))
}

/// `reg, r/m` or `r/m, reg` memory forms. `mem_is_dst` only affects nothing
/// here (direction is already baked into the opcode the caller chose); the
/// register operand always lands in ModR/M.reg and the memory operand in
/// ModR/M.rm (+ SIB/disp).
pub(crate) fn reg_mem(
    opcode8: u8,
    opcode_wide: u8,
    reg_operand: Register,
    mem: &MemOperand,
) -> Result<Encoded, EncodingError> {
    if let Some(hint) = mem.size_hint {
        if hint != reg_operand.width() {
            return Err(EncodingError::WidthMismatch(
                reg_operand.width().name(),
                hint.name(),
            ));
        }
    }
    let width = reg_operand.width();
    let addressing = encode_mem_addressing(mem)?;

    let mut bytes = Vec::with_capacity(8);
    if let Some(p) = address_size_prefix(mem) {
        bytes.push(p);
    }
    if let Some(p) = operand_size_prefix(width) {
        bytes.push(p);
    }
    let all_regs: Vec<Register> = [Some(reg_operand), mem.base, mem.index]
        .into_iter()
        .flatten()
        .collect();
    if let Some(r) = build_rex(
        width == Width::W64,
        Some(reg_operand),
        addressing.rex_x,
        addressing.rex_b,
        &all_regs,
    )? {
        bytes.push(r);
    }
    let opcode = if width == Width::W8 { opcode8 } else { opcode_wide };
    bytes.push(opcode);
    bytes.push(modrm(addressing.mode, reg_operand.low3(), addressing.rm));
    if let Some(s) = addressing.sib {
        bytes.push(s);
    }
    bytes.extend_from_slice(&addressing.disp);
    Ok(Encoded::bytes(bytes))
}

/// `r/m, imm` forms: `opcode_ext` is the ModR/M.reg opcode-extension digit
/// (`/0`, `/5`, `/7`, ...) used by add/sub/cmp; `mov` passes the C6/C7
/// opcodes, which don't use the reg field as an extension in the same
/// sense but happen to always need `/0` too.
pub(crate) fn rm_imm(
    opcode8: u8,
    opcode_wide: u8,
    opcode_ext: u8,
    dst: &Operand,
    imm: i64,
) -> Result<Encoded, EncodingError> {
    match dst {
        Operand::Register(reg) => {
            let width = reg.width();
            let mut bytes = Vec::with_capacity(8);
            if let Some(p) = operand_size_prefix(width) {
                bytes.push(p);
            }
            if let Some(r) = build_rex(width == Width::W64, None, None, Some(*reg), &[*reg])? {
                bytes.push(r);
            }
            let opcode = if width == Width::W8 { opcode8 } else { opcode_wide };
            bytes.push(opcode);
            bytes.push(modrm(0b11, opcode_ext, reg.low3()));
            let imm_width = if width == Width::W64 { Width::W32 } else { width };
            write_imm(&mut bytes, imm, imm_width);
            Ok(Encoded::bytes(bytes))
        }
        Operand::Memory(mem) => {
            let width = mem.size_hint.ok_or(EncodingError::AmbiguousSize)?;
            let addressing = encode_mem_addressing(mem)?;
            let mut bytes = Vec::with_capacity(10);
            if let Some(p) = address_size_prefix(mem) {
                bytes.push(p);
            }
            if let Some(p) = operand_size_prefix(width) {
                bytes.push(p);
            }
            let all_regs: Vec<Register> = [mem.base, mem.index].into_iter().flatten().collect();
            if let Some(r) = build_rex(
                width == Width::W64,
                None,
                addressing.rex_x,
                addressing.rex_b,
                &all_regs,
            )? {
                bytes.push(r);
            }
            let opcode = if width == Width::W8 { opcode8 } else { opcode_wide };
            bytes.push(opcode);
            bytes.push(modrm(addressing.mode, opcode_ext, addressing.rm));
            if let Some(s) = addressing.sib {
                bytes.push(s);
            }
            bytes.extend_from_slice(&addressing.disp);
            let imm_width = if width == Width::W64 { Width::W32 } else { width };
            write_imm(&mut bytes, imm, imm_width);
            Ok(Encoded::bytes(bytes))
        }
        _ => unreachable!("dispatcher only routes register/memory destinations here"),
    }
}

/// `AL/AX/EAX/RAX, imm` short accumulator form (add/sub/cmp only).
pub(crate) fn accum_imm(opcode8: u8, opcode_wide: u8, dst: Register, imm: i64) -> Encoded {
    let width = dst.width();
    let mut bytes = Vec::with_capacity(6);
    if let Some(p) = operand_size_prefix(width) {
        bytes.push(p);
    }
    if width == Width::W64 {
        bytes.push(rex(true, 0, 0, 0));
    }
    let opcode = if width == Width::W8 { opcode8 } else { opcode_wide };
    bytes.push(opcode);
    let imm_width = if width == Width::W64 { Width::W32 } else { width };
    write_imm(&mut bytes, imm, imm_width);
    Encoded::bytes(bytes)
}

/// `reg, imm` short move form: `B0+r` (8-bit) / `B8+r` (16/32/64-bit), the
/// only immediate-to-register form `mov` ever uses.
pub(crate) fn oi(base_opcode: u8, dst: Register, imm: i64) -> Result<Encoded, EncodingError> {
    let width = dst.width();
    let mut bytes = Vec::with_capacity(10);
    if let Some(p) = operand_size_prefix(width) {
        bytes.push(p);
    }
    if let Some(r) = build_rex(width == Width::W64, None, None, Some(dst), &[dst])? {
        bytes.push(r);
    }
    bytes.push(base_opcode + dst.low3());
    write_imm(&mut bytes, imm, width);
    Ok(Encoded::bytes(bytes))
}
