//! `int` and `syscall`: the two zero/one-operand forms that don't fit the
//! arith/mov/jmp shapes (`spec.md` §4.3).

use crate::encoder::Encoded;

/// `int $3` -> `CC`, `int $1` -> `F1`, otherwise `CD imm8`.
pub(crate) fn encode_int(imm: i64) -> Encoded {
    let bytes = match imm {
        3 => vec![0xCC],
        1 => vec![0xF1],
        _ => vec![0xCD, imm as u8],
    };
    Encoded { bytes, reloc: None }
}

/// `syscall`: always `0F 05`, no operands.
pub(crate) fn encode_syscall() -> Encoded {
    Encoded {
        bytes: vec![0x0F, 0x05],
        reloc: None,
    }
}
