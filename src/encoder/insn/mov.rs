//! `mov`: the one mnemonic with a label-reference form, and the one whose
//! immediate-to-register case can pick between the `C6`/`C7 /0` r/m-form
//! and the `B0+r`/`B8+r` short form depending on whether the immediate
//! fits the destination width.

use crate::encoder::{oi, reg_mem, reg_reg, rm_imm, EncodeEnv, Encoded, OutputFormat, PendingReloc};
use crate::error::EncodingError;
use crate::operand::{MemOperand, Operand};
use crate::reg::{Register, Width};
use crate::reloc::RelocKind;

pub(crate) fn encode_rr(dst: Register, src: Register) -> Result<Encoded, EncodingError> {
    reg_reg(0x88, 0x89, dst, src)
}

pub(crate) fn encode_store(dst: &MemOperand, src: Register) -> Result<Encoded, EncodingError> {
    reg_mem(0x88, 0x89, src, dst)
}

pub(crate) fn encode_load(dst: Register, src: &MemOperand) -> Result<Encoded, EncodingError> {
    reg_mem(0x8A, 0x8B, dst, src)
}

pub(crate) fn encode_imm_mem(dst: &MemOperand, imm: i64) -> Result<Encoded, EncodingError> {
    rm_imm(0xC6, 0xC7, 0, &Operand::Memory(*dst), imm)
}

/// `imm, reg`. A 64-bit destination whose immediate doesn't fit a signed
/// 32-bit value needs the full-width `B8+r` form; every other case uses
/// the `C6`/`C7 /0` r/m form (e.g. `mov $1, %rax` encodes as
/// `48 C7 C0 01 00 00 00`, not a `B8+r` encoding).
pub(crate) fn encode_imm_reg(dst: Register, imm: i64) -> Result<Encoded, EncodingError> {
    if dst.width() == Width::W64 && i32::try_from(imm).is_err() {
        oi(0xB8, dst, imm)
    } else {
        rm_imm(0xC6, 0xC7, 0, &Operand::Register(dst), imm)
    }
}

/// `mov $label, %reg` / `mov label, %reg`: in binary mode the label's
/// resolved address is substituted as the immediate of a `C7 /0 imm32`;
/// in ELF mode the immediate is a zeroed placeholder and a relocation is
/// recorded against it.
pub(crate) fn encode_labelref(
    env: &EncodeEnv,
    dst: Register,
    label: &str,
) -> Result<Encoded, EncodingError> {
    let addr = match env.labels {
        Some(table) => table.get(label).map(|e| e.address).unwrap_or(0),
        None => 0,
    };
    let mut encoded = rm_imm(0xC6, 0xC7, 0, &Operand::Register(dst), addr as i64)?;
    if env.format == OutputFormat::Elf {
        let byte_offset = (encoded.bytes.len() - 4) as u32;
        encoded.reloc = Some(PendingReloc {
            byte_offset,
            target: label.to_string(),
            kind: RelocKind::Abs32InCode,
        });
    }
    Ok(encoded)
}
