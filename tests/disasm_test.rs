//! The disassembler and the interpreter must agree on instruction length
//! for the whole opcode space, prefixes included. The interpreter reports
//! how many instruction-stream bytes a step fetched; the disassembler
//! decodes the same memory.
use retro80::bus::PlainRam;
use retro80::disasm::disassemble;
use retro80::Z80;

const ORIGIN: u16 = 0x0100;

/// Step one instruction assembled from `head` plus filler operands and
/// compare the consumed byte count against the disassembler.
fn check_length(head: &[u8]) {
    let mut ram = PlainRam::new();
    ram.load(ORIGIN, head);
    // Filler operand bytes behind the head.
    for offs in head.len()..6 {
        ram.mem[(ORIGIN as usize) + offs] = 0x21 + offs as u8;
    }
    let mut cpu = Z80::new();
    cpu.set_pc(ORIGIN);
    cpu.set_sp(0x8000);
    cpu.step(&mut ram);
    let decoded = disassemble(ORIGIN, |addr| ram.mem[addr as usize]);
    assert_eq!(
        decoded.len(),
        cpu.last_instruction_len(),
        "length mismatch for {:02X?} ({})",
        head,
        decoded.text()
    );
}

#[test]
fn lengths_agree_for_all_single_opcodes() {
    for op in 0..=0xFFu8 {
        check_length(&[op]);
    }
}

#[test]
fn lengths_agree_for_all_cb_opcodes() {
    for op in 0..=0xFFu8 {
        check_length(&[0xCB, op]);
    }
}

#[test]
fn lengths_agree_for_all_ed_opcodes() {
    for op in 0..=0xFFu8 {
        check_length(&[0xED, op]);
    }
}

#[test]
fn lengths_agree_for_all_dd_fd_opcodes() {
    for prefix in [0xDDu8, 0xFD] {
        for op in 0..=0xFFu8 {
            check_length(&[prefix, op]);
        }
    }
}

#[test]
fn lengths_agree_for_all_ddcb_opcodes() {
    for prefix in [0xDDu8, 0xFD] {
        for op in 0..=0xFFu8 {
            check_length(&[prefix, 0xCB, 0x05, op]);
        }
    }
}

#[test]
fn lengths_agree_for_chained_prefixes() {
    check_length(&[0xDD, 0xFD, 0x21]);
    check_length(&[0xFD, 0xDD, 0x7E]);
    check_length(&[0xDD, 0xDD, 0xCB, 0x01, 0x46]);
    check_length(&[0xFD, 0xED, 0x44]);
}

#[test]
fn disassembly_round_trips_through_next_addr() {
    // Walking a stream instruction by instruction covers every byte once.
    let mut ram = PlainRam::new();
    let program: &[u8] = &[
        0x3E, 0x55, // LD A,$55
        0xDD, 0x21, 0x00, 0x20, // LD IX,$2000
        0xDD, 0xCB, 0x05, 0x06, // RLC (IX+5)
        0xED, 0xB0, // LDIR
        0xCB, 0x41, // BIT 0,C
        0x76, // HALT
    ];
    ram.load(0, program);
    let mut at = 0u16;
    let mut seen = 0usize;
    while (at as usize) < program.len() {
        let instr = disassemble(at, |addr| ram.mem[addr as usize]);
        seen += usize::from(instr.len());
        at = instr.next_addr();
    }
    assert_eq!(seen, program.len());
}
