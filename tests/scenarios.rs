use attasm::encoder::OutputFormat;
use attasm::error::AssembleError;
use attasm::{layout, parser};

fn assemble(src: &str) -> Vec<u8> {
    let program = parser::parse(src).unwrap();
    let (result, _labels, _relocs) = layout::assemble(&program, OutputFormat::Binary).unwrap();
    result.code
}

#[test]
fn mov_imm_then_syscall() {
    assert_eq!(
        assemble("mov $1, %rax\nsyscall\n"),
        [0x48, 0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00, 0x0F, 0x05]
    );
}

#[test]
fn arith_reg_reg_and_suffix_stripping() {
    // "addq" should canonicalize to "add" and encode identically.
    assert_eq!(assemble("add %rbx, %rax\n"), assemble("addq %rbx, %rax\n"));
}

#[test]
fn cmp_mem_operand_needs_sib() {
    let code = assemble("cmp (%rsp), %rax\n");
    // 0x3B is CMP r64, r/m64; SIB required because %rsp is the base.
    assert_eq!(code, [0x48, 0x3B, 0x04, 0x24]);
}

#[test]
fn forward_and_backward_jumps_in_one_program() {
    let code = assemble("top: jmp down\ndown: jmp top\n");
    assert_eq!(code.len(), 10);
    assert_eq!(&code[0..5], [0xE9, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(&code[5..10], [0xE9, 0xF6, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn conditional_jump_to_undefined_label_is_unresolved() {
    let program = parser::parse("jne nowhere\n").unwrap();
    let err = layout::assemble(&program, OutputFormat::Binary).unwrap_err();
    assert!(matches!(err, AssembleError::UnresolvedLabel(name) if name == "nowhere"));
}

#[test]
fn org_directive_seeks_the_cursor() {
    let code = assemble(".org 0x10\nint $3\n");
    assert_eq!(code.len(), 0x11);
    assert_eq!(code[0x10], 0xCC);
    assert!(code[..0x10].iter().all(|&b| b == 0));
}

#[test]
fn suffixed_mnemonic_supplies_bare_memory_operand_size() {
    // No register operand to borrow a width from; the `l` suffix on `movl`
    // is the only source of the memory operand's size.
    let code = assemble("movl $0, (%rax)\n");
    assert_eq!(code, [0xC7, 0x00, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn data_section_round_trips_through_both_sections() {
    let program = parser::parse(".code\nmov $1, %rax\n.data\nmsg: .string \"ok\"\n").unwrap();
    let (result, labels, _relocs) = layout::assemble(&program, OutputFormat::Binary).unwrap();
    assert_eq!(result.data, [b'o', b'k', 0]);
    assert!(labels.contains("msg"));
}
