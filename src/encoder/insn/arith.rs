//! `add`/`sub`/`cmp`: identical operand shapes, differing only in which
//! opcode bytes and `/digit` ModR/M extension each uses (`spec.md` §4.3's
//! opcode table). One parameterized emitter per form, selected by mnemonic
//! in `super::dispatch_two_operand`.

use crate::encoder::{accum_imm, reg_mem, reg_reg, rm_imm, Encoded};
use crate::error::EncodingError;
use crate::operand::MemOperand;
use crate::reg::Register;

/// The four opcode pairs that distinguish add/sub/cmp from one another.
pub(crate) struct ArithOpcodes {
    /// `r/m, r` (register source stored into a register-or-memory `rm`).
    pub rm_r: (u8, u8),
    /// `r, r/m` (register destination loaded from a register-or-memory `rm`).
    pub r_rm: (u8, u8),
    /// `/digit` used with the shared `80`/`81` immediate-group opcode.
    pub imm_ext: u8,
    /// `AL/AX/EAX/RAX, imm` short accumulator form.
    pub accum: (u8, u8),
}

pub(crate) const ADD: ArithOpcodes = ArithOpcodes {
    rm_r: (0x00, 0x01),
    r_rm: (0x02, 0x03),
    imm_ext: 0,
    accum: (0x04, 0x05),
};

pub(crate) const SUB: ArithOpcodes = ArithOpcodes {
    rm_r: (0x28, 0x29),
    r_rm: (0x2A, 0x2B),
    imm_ext: 5,
    accum: (0x2C, 0x2D),
};

pub(crate) const CMP: ArithOpcodes = ArithOpcodes {
    rm_r: (0x38, 0x39),
    r_rm: (0x3A, 0x3B),
    imm_ext: 7,
    accum: (0x3C, 0x3D),
};

pub(crate) fn encode_rr(
    opc: &ArithOpcodes,
    dst: Register,
    src: Register,
) -> Result<Encoded, EncodingError> {
    reg_reg(opc.rm_r.0, opc.rm_r.1, dst, src)
}

/// `src` (register) stored into `dst` (memory): the `r/m, r` column.
pub(crate) fn encode_store(
    opc: &ArithOpcodes,
    dst: &MemOperand,
    src: Register,
) -> Result<Encoded, EncodingError> {
    reg_mem(opc.rm_r.0, opc.rm_r.1, src, dst)
}

/// `src` (memory) loaded into `dst` (register): the `r, r/m` column.
pub(crate) fn encode_load(
    opc: &ArithOpcodes,
    dst: Register,
    src: &MemOperand,
) -> Result<Encoded, EncodingError> {
    reg_mem(opc.r_rm.0, opc.r_rm.1, dst, src)
}

/// `dst, imm`, `dst` a register or memory location.
pub(crate) fn encode_imm(
    opc: &ArithOpcodes,
    dst: &crate::operand::Operand,
    imm: i64,
) -> Result<Encoded, EncodingError> {
    rm_imm(0x80, 0x81, opc.imm_ext, dst, imm)
}

/// The `AL/AX/EAX/RAX, imm` short form, used only when `dst` is literally
/// the accumulator register of its width (encoding number 0, not one of
/// the extended `r8`-family aliases that share the same low 3 bits).
pub(crate) fn is_accumulator(reg: Register) -> bool {
    reg.code() == 0
}

pub(crate) fn encode_accum(opc: &ArithOpcodes, dst: Register, imm: i64) -> Encoded {
    accum_imm(opc.accum.0, opc.accum.1, dst, imm)
}
