//! End-to-end ELF64 object generation: source text all the way through to
//! an object file's section headers, symbol table, and relocation entries.

use attasm::encoder::OutputFormat;
use attasm::{elf, layout, parser};

fn u16_at(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap())
}

fn u64_at(bytes: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap())
}

#[test]
fn start_and_msg_produce_one_relocation_and_two_globals() {
    let src = "\
_start: mov $msg, %rax
syscall
.data
msg: .string \"hi\"
";
    let program = parser::parse(src).unwrap();
    let (result, labels, relocs) = layout::assemble(&program, OutputFormat::Elf).unwrap();

    assert_eq!(result.data, [b'h', b'i', 0]);
    assert_eq!(labels.len(), 2);
    assert!(labels.contains("_start"));
    assert!(labels.contains("msg"));

    assert_eq!(relocs.len(), 1);
    let reloc = relocs.iter().next().unwrap();
    assert_eq!(reloc.target, "msg");
    // mov $msg, %rax is REX.W C7 /0 + a 4-byte imm32 patched with msg's
    // address; the patch site is 3 bytes into the instruction (after the
    // REX prefix and the two opcode/ModRM bytes).
    assert_eq!(reloc.offset, 3);

    let bytes = elf::build_elf64(&result, &labels, &relocs);

    assert_eq!(&bytes[0..4], &[0x7f, b'E', b'L', b'F']);
    assert_eq!(bytes[4], 2); // ELFCLASS64
    assert_eq!(bytes[5], 1); // ELFDATA2LSB
    assert_eq!(u16_at(&bytes, 16), 1); // ET_REL
    assert_eq!(u16_at(&bytes, 18), 62); // EM_X86_64
    assert_eq!(u16_at(&bytes, 60), 8); // e_shnum: eight fixed sections
    assert_eq!(u16_at(&bytes, 62), 5); // e_shstrndx: .shstrtab

    let e_shoff = u64_at(&bytes, 40) as usize;
    assert!(e_shoff < bytes.len());
    assert_eq!(bytes.len(), e_shoff + 8 * 64);
}

#[test]
fn program_with_no_labels_has_empty_relocation_sections() {
    let src = "mov $1, %rax\nsyscall\n";
    let program = parser::parse(src).unwrap();
    let (result, labels, relocs) = layout::assemble(&program, OutputFormat::Elf).unwrap();
    assert!(labels.is_empty());
    assert!(relocs.is_empty());

    let bytes = elf::build_elf64(&result, &labels, &relocs);
    assert_eq!(u16_at(&bytes, 60), 8);
}
