//! Property tests for the two-pass layout engine's invariants: assembling
//! twice is deterministic, and a forward jump's relative displacement
//! always equals the byte distance pass 2 actually lays the bytes out at,
//! regardless of how much filler sits between the jump and its target.

use proptest::prelude::*;

use attasm::encoder::OutputFormat;
use attasm::{layout, parser};

/// `mov $1, %rax` encodes to a fixed 7 bytes, so repeating it `n` times is a
/// filler of known, exact size for displacement math.
const FILLER: &str = "mov $1, %rax\n";
const FILLER_LEN: i64 = 7;

fn assemble_src(src: &str) -> Vec<u8> {
    let program = parser::parse(src).unwrap();
    let (result, _labels, _relocs) = layout::assemble(&program, OutputFormat::Binary).unwrap();
    result.code
}

proptest! {
    #[test]
    fn assembling_is_deterministic(n in 0usize..20) {
        let mut src = String::new();
        for _ in 0..n {
            src.push_str(FILLER);
        }
        src.push_str("done:\n");

        let program = parser::parse(&src).unwrap();
        let (first, labels_a, relocs_a) = layout::assemble(&program, OutputFormat::Binary).unwrap();
        let (second, labels_b, relocs_b) = layout::assemble(&program, OutputFormat::Binary).unwrap();

        prop_assert_eq!(first.code, second.code);
        prop_assert_eq!(first.data, second.data);
        prop_assert_eq!(labels_a.len(), labels_b.len());
        prop_assert_eq!(relocs_a.len(), relocs_b.len());
    }

    #[test]
    fn forward_jump_displacement_matches_filler_distance(n in 0usize..50) {
        let mut src = String::from("jmp target\n");
        for _ in 0..n {
            src.push_str(FILLER);
        }
        src.push_str("target:\n");

        let code = assemble_src(&src);
        // E9 rel32, then n * FILLER_LEN bytes of filler before "target".
        let disp = i32::from_le_bytes(code[1..5].try_into().unwrap());
        prop_assert_eq!(disp as i64, n as i64 * FILLER_LEN);
    }

    #[test]
    fn backward_jump_displacement_matches_filler_distance(n in 0usize..50) {
        let mut src = String::from("target:\n");
        for _ in 0..n {
            src.push_str(FILLER);
        }
        src.push_str("jmp target\n");

        let code = assemble_src(&src);
        let jmp_at = code.len() - 5;
        let disp = i32::from_le_bytes(code[jmp_at + 1..jmp_at + 5].try_into().unwrap());
        // target is at offset 0; the jmp instruction starts at n*FILLER_LEN
        // and is 5 bytes long, so disp = 0 - (n*FILLER_LEN + 5).
        prop_assert_eq!(disp as i64, -(n as i64 * FILLER_LEN + 5));
    }
}
