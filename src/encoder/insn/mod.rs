//! Instruction dispatcher: canonicalizes the mnemonic, then selects the
//! per-form encoder by matching on `(mnemonic, operand kinds)`. Each
//! per-mnemonic module below owns the actual byte layout; this module only
//! routes.

pub(crate) mod arith;
pub(crate) mod jmp;
pub(crate) mod misc;
pub(crate) mod mov;

use crate::encoder::{EncodeEnv, Encoded};
use crate::error::EncodingError;
use crate::operand::Operand;

/// Every mnemonic this assembler knows the base (unsuffixed) spelling of.
/// Used by [`canonicalize`] to decide whether a trailing `b`/`w`/`l`/`q`
/// is a genuine AT&T size suffix or part of the mnemonic itself.
fn is_known_mnemonic(name: &str) -> bool {
    matches!(
        name,
        "mov" | "add"
            | "sub"
            | "cmp"
            | "jmp"
            | "int"
            | "syscall"
    ) || jmp::condition_code(name).is_some()
}

/// Strip a trailing `b`/`w`/`l`/`q` AT&T size suffix, but only when the
/// remainder is itself a known mnemonic. This keeps `sub`/`syscall` (whose
/// own spelling ends in a suffix-shaped letter) from being mis-stripped.
pub(crate) fn canonicalize(mnemonic: &str) -> &str {
    if mnemonic.len() > 1 {
        if let Some(last) = mnemonic.chars().last() {
            if matches!(last, 'b' | 'w' | 'l' | 'q') {
                let stripped = &mnemonic[..mnemonic.len() - 1];
                if is_known_mnemonic(stripped) {
                    return stripped;
                }
            }
        }
    }
    mnemonic
}

/// The operand width a genuine AT&T size suffix implies (`movl` -> 32-bit),
/// or `None` if the mnemonic carries no such suffix. Shares
/// [`is_known_mnemonic`] with [`canonicalize`] so a memory operand's
/// inferred size always agrees with which suffix the dispatcher actually
/// stripped.
///
/// The parser calls this to fill in a memory operand's `size_hint` when
/// nothing else (a paired register operand) can supply one -- e.g.
/// `movl $0, (%rax)` has no register operand to borrow a width from, so the
/// `l` suffix is the only source of its size.
pub fn mnemonic_size_suffix(mnemonic: &str) -> Option<crate::reg::Width> {
    use crate::reg::Width;
    if mnemonic.len() <= 1 {
        return None;
    }
    let last = mnemonic.chars().last()?;
    let width = match last {
        'b' => Width::W8,
        'w' => Width::W16,
        'l' => Width::W32,
        'q' => Width::W64,
        _ => return None,
    };
    let stripped = &mnemonic[..mnemonic.len() - 1];
    is_known_mnemonic(stripped).then_some(width)
}

/// Dispatch one instruction to its encoder. `env.here`/`env.labels` carry
/// the layout engine's current position and (pass-2-only) completed label
/// table; see [`crate::encoder::EncodeEnv`].
pub fn encode(
    mnemonic: &str,
    operands: &[Operand],
    env: &EncodeEnv,
) -> Result<Encoded, EncodingError> {
    let mnemonic = canonicalize(mnemonic);

    let unsupported = || EncodingError::UnsupportedForm {
        mnemonic: mnemonic.to_string(),
        operands: operands.len(),
    };

    match mnemonic {
        "mov" if matches!(operands, [Operand::LabelRef(_), Operand::Register(_)]) => {
            let (label, dst) = match operands {
                [Operand::LabelRef(label), Operand::Register(dst)] => (label, *dst),
                _ => unreachable!(),
            };
            dispatch_mov_labelref(env, dst, label)
        }
        "mov" | "add" | "sub" | "cmp" => dispatch_two_operand(mnemonic, operands),
        "jmp" => dispatch_jmp(None, operands, env),
        _ if jmp::condition_code(mnemonic).is_some() => {
            dispatch_jmp(jmp::condition_code(mnemonic), operands, env)
        }
        "int" => match operands {
            [Operand::Immediate(imm)] => Ok(misc::encode_int(*imm)),
            _ => Err(unsupported()),
        },
        "syscall" => match operands {
            [] => Ok(misc::encode_syscall()),
            _ => Err(unsupported()),
        },
        _ => Err(unsupported()),
    }
}

/// `mov`/`add`/`sub`/`cmp`: the reg/reg, imm/reg, imm/mem, reg/mem,
/// mem/reg forms shared by all four (plus `mov`'s labelref/reg form).
/// AT&T order: `operands[0]` is source, `operands[1]` is destination.
fn dispatch_two_operand(mnemonic: &str, operands: &[Operand]) -> Result<Encoded, EncodingError> {
    let unsupported = || EncodingError::UnsupportedForm {
        mnemonic: mnemonic.to_string(),
        operands: operands.len(),
    };

    let opc = match mnemonic {
        "add" => Some(&arith::ADD),
        "sub" => Some(&arith::SUB),
        "cmp" => Some(&arith::CMP),
        _ => None,
    };

    match operands {
        [Operand::Register(src), Operand::Register(dst)] => match opc {
            Some(opc) => arith::encode_rr(opc, *dst, *src),
            None => mov::encode_rr(*dst, *src),
        },
        [Operand::Register(src), Operand::Memory(dst)] => match opc {
            Some(opc) => arith::encode_store(opc, dst, *src),
            None => mov::encode_store(dst, *src),
        },
        [Operand::Memory(src), Operand::Register(dst)] => match opc {
            Some(opc) => arith::encode_load(opc, *dst, src),
            None => mov::encode_load(*dst, src),
        },
        [Operand::Immediate(imm), Operand::Register(dst)] => match opc {
            // The short accumulator form (add/sub/cmp only) applies only
            // when the destination *is* AL/AX/EAX/RAX (encoding 0), not
            // just any register of the right width.
            Some(opc) if arith::is_accumulator(*dst) => Ok(arith::encode_accum(opc, *dst, *imm)),
            Some(opc) => arith::encode_imm(opc, &Operand::Register(*dst), *imm),
            None => mov::encode_imm_reg(*dst, *imm),
        },
        [Operand::Immediate(imm), Operand::Memory(dst)] => match opc {
            Some(opc) => arith::encode_imm(opc, &Operand::Memory(*dst), *imm),
            None => mov::encode_imm_mem(dst, *imm),
        },
        _ => Err(unsupported()),
    }
}

/// `mov $label, %reg` needs the layout-engine environment (to resolve the
/// label address / record a relocation), so it's routed separately from
/// the other two-operand forms above.
pub(crate) fn dispatch_mov_labelref(
    env: &EncodeEnv,
    dst: crate::reg::Register,
    label: &str,
) -> Result<Encoded, EncodingError> {
    mov::encode_labelref(env, dst, label)
}

/// `jmp`/conditional-jump forms: label, register, or memory targets.
/// Only unconditional `jmp` (`cc.is_none()`) accepts a register or memory
/// target (`FF /4` absolute indirect); the conditional family is
/// label-only.
fn dispatch_jmp(
    cc: Option<u8>,
    operands: &[Operand],
    env: &EncodeEnv,
) -> Result<Encoded, EncodingError> {
    let mnemonic_name = || {
        cc.map(|_| "jcc".to_string())
            .unwrap_or_else(|| "jmp".to_string())
    };
    match operands {
        [Operand::LabelRef(label)] => jmp::encode_branch(env, cc, label),
        [Operand::Register(reg)] if cc.is_none() => jmp::encode_indirect_reg(*reg),
        [Operand::Memory(mem)] if cc.is_none() => jmp::encode_indirect_mem(mem),
        _ => Err(EncodingError::UnsupportedForm {
            mnemonic: mnemonic_name(),
            operands: operands.len(),
        }),
    }
}
