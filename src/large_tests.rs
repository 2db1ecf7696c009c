#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;

    use rstest::rstest;

    use crate::block::Termination;
    use crate::format::{BlockFormatter, OutputFormat};
    use crate::image::MappedImage;
    use crate::ir::Stmt;
    use crate::render::NoSymbols;
    use crate::session::Session;
    use crate::task::lift_region_parallel;
    use crate::testkit::{self, TestDecoder, TestTranslator};
    use crate::{ArchKind, ArchProfile};

    fn toy_session(bytes: Vec<u8>) -> Session {
        Session::with_parts(
            MappedImage::new(0x1000, bytes),
            testkit::profile(),
            Arc::new(TestDecoder),
            Arc::new(TestTranslator),
        )
    }

    fn x86_session(bits: u16, bytes: Vec<u8>) -> Session {
        let arch = if bits == 64 {
            ArchKind::X86_64
        } else {
            ArchKind::X86_32
        };
        Session::new(MappedImage::new(0x1000, bytes), ArchProfile::new(arch))
            .expect("capstone handle")
    }

    #[test]
    fn test_single_jump_block() {
        // one 4-byte unconditional jump: the block is exactly that
        // instruction and its IR transfers control
        let mut session = toy_session(vec![0x20, 0x00, 0x20, 0x00]);
        let lifted = session.lift_block(0x1000);

        assert_eq!(lifted.termination, Termination::Complete);
        assert_eq!(lifted.insns.len(), 1);
        assert_eq!(lifted.insns[0].branch_target(), Some(0x2000));
        assert!(lifted.stmts.iter().any(Stmt::is_control));
        assert_eq!(lifted.next, 0x1004);
    }

    #[test]
    fn test_undecodable_buffer_yields_empty_truncated_block() {
        let mut session = toy_session(vec![0x00; 8]);
        let lifted = session.lift_block(0x1000);

        assert!(lifted.insns.is_empty());
        assert!(lifted.stmts.is_empty());
        assert_eq!(lifted.termination, Termination::Truncated { fault: 0x1000 });
    }

    #[test]
    fn test_partial_block_before_garbage() {
        // two 2-byte instructions decode, then the bad byte truncates
        let mut session = toy_session(vec![0x10, 0x01, 0x10, 0x02, 0xff, 0xff]);
        let block = session.decode_block(0x1000);

        assert_eq!(block.insns.len(), 2);
        assert_eq!(block.len_bytes(), 4);
        assert_eq!(block.termination, Termination::Truncated { fault: 0x1004 });
        for pair in block.insns.windows(2) {
            assert_eq!(pair[0].end_address(), pair[1].addr);
        }
    }

    #[test]
    fn test_truncation_next_respects_alignment() {
        // fixed-width ISA: the continuation address after a fault is
        // word-aligned, not byte-aligned
        let profile = ArchProfile::new(ArchKind::Mips32);
        let mut session = Session::with_parts(
            MappedImage::new(0x1000, vec![0xff; 8]),
            profile,
            Arc::new(TestDecoder),
            Arc::new(TestTranslator),
        );
        let block = session.decode_block(0x1000);
        assert_eq!(block.termination, Termination::Truncated { fault: 0x1000 });
        assert_eq!(block.next, 0x1004);
    }

    #[test]
    fn test_disasm_is_repeatable() {
        let session = toy_session(vec![0x10, 0x07, 0x50]);
        let first = session.disasm_block(0x1000, true, &NoSymbols);
        let second = session.disasm_block(0x1000, true, &NoSymbols);
        assert_eq!(first, second);
        assert_eq!(first.lines.len(), 2);
        assert!(first.lines[0].starts_with("0x00001000: li"));

        // symbols annotate static targets
        let mut symbols = HashMap::new();
        symbols.insert(0x2000u64, "loop_top".to_string());
        let session = toy_session(vec![0x20, 0x00, 0x20, 0x00]);
        let rendered = session.disasm_block(0x1000, false, &symbols);
        assert_eq!(rendered.lines[0], "jmp        0x2000 <loop_top>");
    }

    #[test]
    fn test_ir_bounded_block_stops_inside_decode_block() {
        // csel then more code: decode-level assembly would keep going,
        // the IR-bounded walk ends at the csel's branch
        let mut session = toy_session(vec![0x30, 0x05, 0x10, 0x01, 0x50]);
        let decode_block = session.decode_block(0x1000);
        assert_eq!(decode_block.insns.len(), 3);

        let mut session = toy_session(vec![0x30, 0x05, 0x10, 0x01, 0x50]);
        let ir_block = session.lift_block_ir_bounded(0x1000);
        assert_eq!(ir_block.pairs.len(), 1);
        assert_eq!(ir_block.next, 0x1002);
    }

    #[test]
    fn test_string_and_integer_reads() {
        let session = toy_session(vec![0x41, 0x42, 0x00, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(session.read_ascii_string(0x1000, 16).unwrap(), "AB");
        assert_eq!(session.read_uint(0x1003, 4).unwrap(), 0x12345678);
        assert!(session.read_uint(0x1003, 3).is_err());
    }

    #[test]
    fn test_region_lift_parallel_end_to_end() {
        // four blocks: li+ret, ret, jmp, li+ret
        let mut session = toy_session(vec![
            0x10, 0x01, 0x50, // 0x1000
            0x50, // 0x1003
            0x20, 0x00, 0x20, 0x00, // 0x1004
            0x10, 0x02, 0x50, // 0x1008
        ]);
        let outcomes = lift_region_parallel(&mut session, 0x1000, 0x100b, true);

        assert_eq!(outcomes.len(), 4);
        assert_eq!(
            outcomes.iter().map(|o| o.start).collect::<Vec<_>>(),
            vec![0x1000, 0x1003, 0x1004, 0x1008]
        );
        assert!(outcomes.iter().all(|o| o.completed_cleanly));
        assert!(outcomes
            .iter()
            .all(|o| o.stmts.iter().any(Stmt::is_control)));
    }

    #[rstest]
    #[case(OutputFormat::Text, "Block at 0x00001000")]
    #[case(OutputFormat::Json, "\"termination\": \"complete\"")]
    #[case(OutputFormat::JsonLines, "\"type\":\"block\"")]
    #[case(OutputFormat::Csv, "block_address,termination")]
    fn test_output_formats(#[case] format: OutputFormat, #[case] needle: &str) {
        let mut session = toy_session(vec![0x10, 0x01, 0x50]);
        let block = session.decode_block(0x1000);
        let output = format.get_formatter().format(&block).unwrap();
        assert!(
            output.contains(needle),
            "{} output missing {:?}:\n{}",
            format,
            needle,
            output
        );
    }

    #[test]
    fn test_raw_image_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x10, 0x2a, 0x50]).unwrap();

        let image = MappedImage::from_file(0x400000, file.path()).unwrap();
        assert_eq!(image.base(), 0x400000);
        assert_eq!(image.len(), 3);

        let mut session = Session::with_parts(
            image,
            testkit::profile(),
            Arc::new(TestDecoder),
            Arc::new(TestTranslator),
        );
        let lifted = session.lift_block(0x400000);
        assert_eq!(lifted.termination, Termination::Complete);
        assert_eq!(lifted.insns.len(), 2);
    }

    // The remaining tests exercise the real Capstone decoder on fixed
    // x86 encodings.

    #[test]
    fn test_capstone_x86_prologue() {
        // push ebp; mov ebp, esp; ret
        let mut session = x86_session(32, vec![0x55, 0x89, 0xe5, 0xc3]);
        let block = session.decode_block(0x1000);

        assert_eq!(block.termination, Termination::Complete);
        let mnemonics: Vec<&str> =
            block.insns.iter().map(|i| i.mnemonic.as_str()).collect();
        assert_eq!(mnemonics, vec!["push", "mov", "ret"]);
        assert_eq!(block.next, 0x1004);
    }

    #[test]
    fn test_capstone_x86_relative_jump_target() {
        // e9 10 00 00 00 = jmp 0x1015 (relative to end of instruction)
        let mut session = x86_session(64, vec![0xe9, 0x10, 0x00, 0x00, 0x00]);
        let insn = session.decode_instruction_at(0x1000).unwrap();
        assert_eq!(insn.mnemonic, "jmp");
        assert_eq!(insn.branch_target(), Some(0x1015));
    }

    #[test]
    fn test_capstone_x86_lift_mov_imm() {
        // b8 2a 00 00 00 = mov eax, 0x2a; c3 = ret
        let mut session = x86_session(64, vec![0xb8, 0x2a, 0x00, 0x00, 0x00, 0xc3]);
        let lifted = session.lift_block(0x1000);

        assert_eq!(lifted.termination, Termination::Complete);
        assert!(lifted.stmts.iter().any(
            |s| matches!(s, Stmt::Assign { dst, .. } if dst.name == "eax")
        ));
        assert_eq!(lifted.stmts.last(), Some(&Stmt::Return));
    }

    #[test]
    fn test_capstone_x86_invalid_byte_truncates() {
        // 0x06 is invalid in 64-bit mode
        let mut session = x86_session(64, vec![0x55, 0x06, 0xc3]);
        let block = session.decode_block(0x1000);

        assert_eq!(block.insns.len(), 1);
        assert_eq!(block.termination, Termination::Truncated { fault: 0x1001 });
        assert_eq!(block.next, 0x1002);
    }
}
