//! `jmp` and the conditional-jump family. Only the 32-bit relative form is
//! emitted for label targets; register and memory targets go through the
//! `FF /4` absolute-indirect form, which only `jmp` itself (not the
//! conditional family) accepts.

use crate::encoder::{build_rex, encode_mem_addressing, modrm, EncodeEnv, Encoded};
use crate::error::EncodingError;
use crate::operand::MemOperand;
use crate::reg::Register;

/// Maps a canonicalized conditional-jump mnemonic (after synonym
/// resolution) to its `0F 8x` condition code. `None` for unconditional
/// `jmp`, which uses the single-byte-opcode `E9` form instead.
pub(crate) fn condition_code(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "jo" => 0x80,
        "jno" => 0x81,
        "jb" | "jc" | "jnae" => 0x82,
        "jae" | "jnb" | "jnc" => 0x83,
        "je" | "jz" => 0x84,
        "jne" | "jnz" => 0x85,
        "jbe" | "jna" => 0x86,
        "ja" | "jnbe" => 0x87,
        "js" => 0x88,
        "jns" => 0x89,
        "jp" | "jpe" => 0x8A,
        "jnp" | "jpo" => 0x8B,
        "jl" | "jnge" => 0x8C,
        "jge" | "jnl" => 0x8D,
        "jle" | "jng" => 0x8E,
        "jg" | "jnle" => 0x8F,
        _ => return None,
    })
}

/// `jmp`/`jcc label`: `rel32 = target - (here + insn_len)`, computed at
/// pass 2 once `labels` is populated; pass 1 substitutes 0 and relies on
/// every form here being fixed-size (5 bytes unconditional, 6 conditional).
pub(crate) fn encode_branch(
    env: &EncodeEnv,
    cc: Option<u8>,
    label: &str,
) -> Result<Encoded, EncodingError> {
    let mut bytes = Vec::with_capacity(6);
    match cc {
        None => bytes.push(0xE9),
        Some(cc) => {
            bytes.push(0x0F);
            bytes.push(cc);
        }
    }
    let insn_len = bytes.len() + 4;
    let disp = match env.labels {
        Some(table) => {
            let target = table
                .get(label)
                .ok_or_else(|| EncodingError::UnsupportedForm {
                    mnemonic: format!("<unresolved label {label}>"),
                    operands: 1,
                })?
                .address;
            target as i64 - (env.here as i64 + insn_len as i64)
        }
        None => 0,
    };
    bytes.extend_from_slice(&(disp as i32).to_le_bytes());
    Ok(Encoded { bytes, reloc: None })
}

/// `jmp *%reg` / `jmp *mem`: `FF /4` absolute indirect.
pub(crate) fn encode_indirect_reg(reg: Register) -> Result<Encoded, EncodingError> {
    let mut bytes = Vec::with_capacity(3);
    if let Some(r) = build_rex(false, None, None, Some(reg), &[reg])? {
        bytes.push(r);
    }
    bytes.push(0xFF);
    bytes.push(modrm(0b11, 4, reg.low3()));
    Ok(Encoded { bytes, reloc: None })
}

pub(crate) fn encode_indirect_mem(mem: &MemOperand) -> Result<Encoded, EncodingError> {
    let addressing = encode_mem_addressing(mem)?;
    let mut bytes = Vec::with_capacity(6);
    let all_regs: Vec<Register> = [mem.base, mem.index].into_iter().flatten().collect();
    if let Some(r) = build_rex(false, None, addressing.rex_x, addressing.rex_b, &all_regs)? {
        bytes.push(r);
    }
    bytes.push(0xFF);
    bytes.push(modrm(addressing.mode, 4, addressing.rm));
    if let Some(s) = addressing.sib {
        bytes.push(s);
    }
    bytes.extend_from_slice(&addressing.disp);
    Ok(Encoded { bytes, reloc: None })
}
