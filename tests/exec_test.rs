//! Instruction-level tests: semantics, T-state accounting and the
//! interrupt machinery, driven as little machine-code programs against a
//! plain RAM bus.
use rand::prelude::*;

use retro80::bus::PlainRam;
use retro80::{CpuFlags, InterruptMode, Z80};

fn machine_with(program: &[u8]) -> (Z80, PlainRam) {
    let mut ram = PlainRam::new();
    ram.load(0, program);
    (Z80::new(), ram)
}

fn run_to_halt(cpu: &mut Z80, ram: &mut PlainRam) {
    while !cpu.is_halted() {
        cpu.step(ram);
    }
}

#[test]
fn push_pop_round_trips() {
    // LD BC,0xBEEF ; PUSH BC ; POP DE ; HALT
    let (mut cpu, mut ram) = machine_with(&[0x01, 0xEF, 0xBE, 0xC5, 0xD1, 0x76]);
    cpu.set_sp(0x8000);
    run_to_halt(&mut cpu, &mut ram);
    assert_eq!(cpu.de(), 0xBEEF);
    assert_eq!(cpu.sp(), 0x8000);
}

#[test]
fn sixteen_bit_wrap_is_silent() {
    // LD HL,0xFFFF ; INC HL ; LD SP,HL ; HALT
    let (mut cpu, mut ram) = machine_with(&[0x21, 0xFF, 0xFF, 0x23, 0xF9, 0x76]);
    run_to_halt(&mut cpu, &mut ram);
    assert_eq!(cpu.hl(), 0);
    assert_eq!(cpu.sp(), 0);
}

#[test]
fn basic_cycle_counts() {
    // One instruction per case, stepped from reset.
    let cases: &[(&[u8], u32)] = &[
        (&[0x00], 4),                      // NOP
        (&[0x3E, 0x12], 7),                // LD A,n
        (&[0x21, 0x00, 0x40], 10),         // LD HL,nn
        (&[0x34], 11),                     // INC (HL)
        (&[0x36, 0x7F], 10),               // LD (HL),n
        (&[0xC3, 0x00, 0x10], 10),         // JP nn
        (&[0xCD, 0x00, 0x10], 17),         // CALL nn
        (&[0x18, 0x02], 12),               // JR e
        (&[0xD3, 0x80], 11),               // OUT (n),A
        (&[0xDB, 0x80], 11),               // IN A,(n)
        (&[0xE3], 19),                     // EX (SP),HL
        (&[0x09], 11),                     // ADD HL,BC
        (&[0xCB, 0x00], 8),                // RLC B
        (&[0xCB, 0x06], 15),               // RLC (HL)
        (&[0xCB, 0x46], 12),               // BIT 0,(HL)
        (&[0xED, 0x44], 8),                // NEG
        (&[0xED, 0x56], 8),                // IM 1
        (&[0xED, 0x57], 9),                // LD A,I
        (&[0xED, 0x6F], 18),               // RLD
        (&[0xED, 0x43, 0x00, 0x40], 20),   // LD (nn),BC
        (&[0xED, 0x78], 12),               // IN A,(C)
        (&[0xED, 0xA0], 16),               // LDI (BC=0 after dec: no repeat)
        (&[0xED, 0xFF], 8),                // ED hole: two-byte NOP
        (&[0xDD, 0x21, 0x00, 0x40], 14),   // LD IX,nn
        (&[0xDD, 0xE5], 15),               // PUSH IX
        (&[0xDD, 0x34, 0x05], 23),         // INC (IX+5)
        (&[0xDD, 0x86, 0x05], 19),         // ADD A,(IX+5)
        (&[0xDD, 0x36, 0x05, 0x42], 19),   // LD (IX+5),n
        (&[0xDD, 0x66, 0x05], 19),         // LD H,(IX+5)
        (&[0xDD, 0xE9], 8),                // JP (IX)
        (&[0xDD, 0x24], 8),                // INC IXH
        (&[0xDD, 0xCB, 0x05, 0x46], 20),   // BIT 0,(IX+5)
        (&[0xDD, 0xCB, 0x05, 0x06], 23),   // RLC (IX+5)
        (&[0x76], 4),                      // HALT
    ];
    for &(code, expected) in cases {
        let (mut cpu, mut ram) = machine_with(code);
        cpu.set_sp(0x8000);
        assert_eq!(cpu.step(&mut ram), expected, "cycles of {:02X?}", code);
        assert_eq!(
            u16::from(cpu.last_instruction_len()),
            code.len() as u16,
            "length of {:02X?}",
            code
        );
    }
}

#[test]
fn conditional_cycle_counts() {
    // JR NZ taken and not taken.
    let (mut cpu, mut ram) = machine_with(&[0x20, 0x02]);
    assert_eq!(cpu.step(&mut ram), 12);
    let (mut cpu, mut ram) = machine_with(&[0x20, 0x02]);
    cpu.set_af(u16::from(CpuFlags::Z.bits()));
    assert_eq!(cpu.step(&mut ram), 7);
    // RET cc.
    let (mut cpu, mut ram) = machine_with(&[0xC0]);
    cpu.set_sp(0x8000);
    assert_eq!(cpu.step(&mut ram), 11);
    let (mut cpu, mut ram) = machine_with(&[0xC8]);
    assert_eq!(cpu.step(&mut ram), 5);
    // CALL cc.
    let (mut cpu, mut ram) = machine_with(&[0xC4, 0x00, 0x10]);
    cpu.set_sp(0x8000);
    assert_eq!(cpu.step(&mut ram), 17);
    let (mut cpu, mut ram) = machine_with(&[0xCC, 0x00, 0x10]);
    assert_eq!(cpu.step(&mut ram), 10);
    // DJNZ.
    let (mut cpu, mut ram) = machine_with(&[0x10, 0xFE]);
    cpu.set_bc(0x0200);
    assert_eq!(cpu.step(&mut ram), 13);
    let (mut cpu, mut ram) = machine_with(&[0x10, 0xFE]);
    cpu.set_bc(0x0100);
    assert_eq!(cpu.step(&mut ram), 8);
}

#[test]
fn ldir_copies_a_kilobyte() {
    // LD HL,0x4000 ; LD DE,0x8000 ; LD BC,0x0400 ; LDIR ; HALT
    let (mut cpu, mut ram) = machine_with(&[
        0x21, 0x00, 0x40, 0x11, 0x00, 0x80, 0x01, 0x00, 0x04, 0xED, 0xB0, 0x76,
    ]);
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for addr in 0x4000..0x4400u16 {
        ram.mem[addr as usize] = rng.gen();
    }
    let before = cpu.cycles();
    run_to_halt(&mut cpu, &mut ram);
    for addr in 0x4000..0x4400u16 {
        assert_eq!(ram.mem[addr as usize], ram.mem[(addr + 0x4000) as usize]);
    }
    assert_eq!(cpu.bc(), 0);
    assert_eq!(cpu.hl(), 0x4400);
    assert_eq!(cpu.de(), 0x8400);
    // Three loads, the block copy, and the HALT.
    let ldir = 21 * 1023 + 16;
    assert_eq!(cpu.cycles() - before, 10 + 10 + 10 + ldir + 4);
}

#[test]
fn cpir_stops_on_match() {
    // "ABC\0" at 0x4000, A = 'B', BC = 4: CPIR stops past the match.
    let (mut cpu, mut ram) = machine_with(&[0xED, 0xB1]);
    ram.load(0x4000, b"ABC\0");
    cpu.set_af(u16::from(b'B') << 8);
    cpu.set_hl(0x4000);
    cpu.set_bc(4);
    while cpu.pc() != 0x0002 {
        cpu.step(&mut ram);
    }
    assert_eq!(cpu.hl(), 0x4002);
    assert_eq!(cpu.bc(), 2);
    assert!(cpu.flags().contains(CpuFlags::Z));
    assert!(cpu.flags().contains(CpuFlags::PV));
}

#[test]
fn ddcb_also_stores_into_the_register() {
    // RLC (IX+5),B: memory and B both get the rotated value.
    let (mut cpu, mut ram) = machine_with(&[0xDD, 0xCB, 0x05, 0x00]);
    ram.mem[0x2005] = 0x01;
    cpu.set_ix(0x2000);
    cpu.step(&mut ram);
    assert_eq!(ram.mem[0x2005], 0x02);
    assert_eq!(cpu.bc() >> 8, 0x02);
}

#[test]
fn ddcb_bit_takes_xy_from_the_address() {
    // BIT 7,(IX+5) with IX+5 = 0x2A05: X/Y come from the high address byte.
    let (mut cpu, mut ram) = machine_with(&[0xDD, 0xCB, 0x05, 0x7E]);
    ram.mem[0x2A05] = 0x80;
    cpu.set_ix(0x2A00);
    cpu.step(&mut ram);
    let flags = cpu.flags();
    assert!(flags.contains(CpuFlags::S));
    assert!(flags.contains(CpuFlags::H));
    assert!(flags.contains(CpuFlags::X)); // bit 3 of 0x2A
    assert!(flags.contains(CpuFlags::Y)); // bit 5 of 0x2A
    assert!(!flags.contains(CpuFlags::Z));
}

#[test]
fn bit_hl_leaks_the_address_latch() {
    // LD A,(0x2927) leaves WZ = 0x2928; BIT 7,(HL) then copies X/Y from 0x29.
    let (mut cpu, mut ram) = machine_with(&[0x3A, 0x27, 0x29, 0xCB, 0x7E, 0x76]);
    cpu.set_hl(0x4000);
    run_to_halt(&mut cpu, &mut ram);
    let flags = cpu.flags();
    assert!(flags.contains(CpuFlags::Z));
    assert!(flags.contains(CpuFlags::X));
    assert!(flags.contains(CpuFlags::Y));
}

#[test]
fn undocumented_index_halves() {
    // LD IXH,0x12 ; LD IXL,0x34 ; LD A,IXH ; ADD A,IXL ; HALT
    let (mut cpu, mut ram) = machine_with(&[
        0xDD, 0x26, 0x12, 0xDD, 0x2E, 0x34, 0xDD, 0x7C, 0xDD, 0x85, 0x76,
    ]);
    run_to_halt(&mut cpu, &mut ram);
    assert_eq!(cpu.ix(), 0x1234);
    assert_eq!(cpu.af() >> 8, 0x46);
}

#[test]
fn index_load_keeps_real_h() {
    // LD H,(IX+1): the destination is the real H, not IXH.
    let (mut cpu, mut ram) = machine_with(&[0xDD, 0x66, 0x01]);
    ram.mem[0x2001] = 0x99;
    cpu.set_ix(0x2000);
    cpu.set_hl(0x1234);
    cpu.step(&mut ram);
    assert_eq!(cpu.hl(), 0x9934);
    assert_eq!(cpu.ix(), 0x2000);
}

#[test]
fn exchange_banks() {
    // EX AF,AF' ; EXX swap whole banks.
    let (mut cpu, mut ram) = machine_with(&[0x08, 0xD9, 0x76]);
    cpu.set_af(0x1111);
    cpu.set_bc(0x2222);
    cpu.set_de(0x3333);
    cpu.set_hl(0x4444);
    run_to_halt(&mut cpu, &mut ram);
    assert_eq!(cpu.af(), 0);
    assert_eq!(cpu.bc(), 0);
    assert_eq!(cpu.de(), 0);
    assert_eq!(cpu.hl(), 0);
    // Swapping back restores the originals.
    let (mut cpu2, mut ram2) = machine_with(&[0x08, 0xD9, 0x08, 0xD9, 0x76]);
    cpu2.set_af(0x1111);
    cpu2.set_bc(0x2222);
    run_to_halt(&mut cpu2, &mut ram2);
    assert_eq!(cpu2.af(), 0x1111);
    assert_eq!(cpu2.bc(), 0x2222);
}

#[test]
fn ei_di_is_atomic_for_interrupts() {
    // EI ; DI ; NOP ; HALT with an interrupt pending the whole time:
    // it must never be accepted.
    let (mut cpu, mut ram) = machine_with(&[0xFB, 0xF3, 0x00, 0x76]);
    cpu.set_sp(0x8000);
    cpu.request_int(0xFF);
    for _ in 0..4 {
        cpu.step(&mut ram);
    }
    assert!(cpu.is_halted());
    assert_eq!(cpu.sp(), 0x8000);
    assert_eq!(cpu.pc(), 4);
}

#[test]
fn ei_shadow_lasts_exactly_one_instruction() {
    // IM 1 ; EI ; NOP ; NOP with a pending interrupt: exactly one
    // instruction retires after EI before acceptance.
    let (mut cpu, mut ram) = machine_with(&[0xED, 0x56, 0xFB, 0x00, 0x00]);
    cpu.set_sp(0x8000);
    cpu.request_int(0xFF);
    cpu.step(&mut ram); // IM 1
    cpu.step(&mut ram); // EI
    cpu.step(&mut ram); // NOP: still shadowed
    assert_eq!(cpu.pc(), 4);
    assert_eq!(cpu.sp(), 0x8000);
    let cycles = cpu.step(&mut ram); // acceptance
    assert_eq!(cpu.pc(), 0x0038);
    assert_eq!(cpu.sp(), 0x7FFE);
    assert_eq!(cycles, 13);
    assert!(!cpu.iff1());
    assert!(!cpu.iff2());
}

#[test]
fn interrupt_mode_2_uses_the_vector_table() {
    // IM 2 ; EI ; NOP, I = 0x20, table entry at 0x20FE -> 0x4000.
    let (mut cpu, mut ram) = machine_with(&[0xED, 0x5E, 0xFB, 0x00, 0x00]);
    ram.load(0x20FE, &[0x00, 0x40]);
    cpu.set_sp(0x8000);
    // Load I through its own instruction first.
    let mut boot = PlainRam::new();
    boot.load(0, &[0x3E, 0x20, 0xED, 0x47]); // LD A,0x20 ; LD I,A
    cpu.step(&mut boot);
    cpu.step(&mut boot);
    assert_eq!(cpu.i(), 0x20);
    cpu.set_pc(0);
    cpu.step(&mut ram); // IM 2
    assert_eq!(cpu.interrupt_mode(), InterruptMode::Mode2);
    cpu.step(&mut ram); // EI
    cpu.step(&mut ram); // NOP
    cpu.request_int(0xFF);
    let cycles = cpu.step(&mut ram);
    assert_eq!(cycles, 19);
    assert_eq!(cpu.pc(), 0x4000);
    // The pushed return address is the instruction after the last NOP.
    assert_eq!(ram.mem[0x7FFE], 0x04);
    assert_eq!(ram.mem[0x7FFF], 0x00);
}

#[test]
fn nmi_preserves_iff2() {
    let (mut cpu, mut ram) = machine_with(&[0xFB, 0x00, 0x76]);
    cpu.set_sp(0x8000);
    cpu.step(&mut ram); // EI
    cpu.step(&mut ram); // NOP
    assert!(cpu.iff1() && cpu.iff2());
    cpu.request_nmi();
    let cycles = cpu.step(&mut ram);
    assert_eq!(cycles, 11);
    assert_eq!(cpu.pc(), 0x0066);
    assert!(!cpu.iff1());
    assert!(cpu.iff2());
    // RETN restores IFF1 from IFF2.
    ram.load(0x66, &[0xED, 0x45]);
    cpu.step(&mut ram);
    assert!(cpu.iff1());
    assert_eq!(cpu.pc(), 0x0002);
}

#[test]
fn nmi_wakes_a_halted_cpu() {
    let (mut cpu, mut ram) = machine_with(&[0x76]);
    cpu.set_sp(0x8000);
    cpu.step(&mut ram);
    assert!(cpu.is_halted());
    cpu.request_nmi();
    cpu.step(&mut ram);
    assert!(!cpu.is_halted());
    assert_eq!(cpu.pc(), 0x0066);
    // The pushed address points past the HALT.
    assert_eq!(ram.mem[0x7FFE], 0x01);
}

#[test]
fn block_copy_is_interruptible() {
    // EI ; LDIR ; HALT. The default IM 0 vector 0xFF executes RST 38h.
    let (mut cpu, mut ram) = machine_with(&[0xFB, 0xED, 0xB0, 0x76]);
    ram.load(0x38, &[0xFB, 0xED, 0x4D]); // ISR: EI ; RETI
    ram.load(0x4000, b"0123456789");
    cpu.set_sp(0x8000);
    cpu.set_hl(0x4000);
    cpu.set_de(0x9000);
    cpu.set_bc(10);
    cpu.step(&mut ram); // EI
    cpu.step(&mut ram); // first LDIR iteration
    cpu.step(&mut ram); // second
    assert_eq!(cpu.bc(), 8);
    // An interrupt lands between iterations and returns to the LDIR.
    cpu.request_int(0xFF);
    cpu.step(&mut ram);
    assert_eq!(cpu.pc(), 0x0038);
    while !cpu.is_halted() {
        cpu.step(&mut ram);
    }
    assert_eq!(&ram.mem[0x9000..0x900A], b"0123456789");
    assert_eq!(cpu.bc(), 0);
}

#[test]
fn halted_cpu_keeps_counting_cycles() {
    let (mut cpu, mut ram) = machine_with(&[0x76]);
    cpu.step(&mut ram);
    let before = cpu.cycles();
    for _ in 0..10 {
        assert_eq!(cpu.step(&mut ram), 4);
    }
    assert_eq!(cpu.cycles() - before, 40);
}

#[test]
fn daa_adjusts_bcd_addition() {
    // LD A,0x15 ; ADD A,0x27 ; DAA ; HALT -> BCD 42.
    let (mut cpu, mut ram) = machine_with(&[0x3E, 0x15, 0xC6, 0x27, 0x27, 0x76]);
    run_to_halt(&mut cpu, &mut ram);
    assert_eq!(cpu.af() >> 8, 0x42);
}

#[test]
fn rst_pushes_and_vectors() {
    let (mut cpu, mut ram) = machine_with(&[0xEF]); // RST 28h
    cpu.set_sp(0x8000);
    let cycles = cpu.step(&mut ram);
    assert_eq!(cycles, 11);
    assert_eq!(cpu.pc(), 0x0028);
    assert_eq!(ram.mem[0x7FFE], 0x01);
    assert_eq!(ram.mem[0x7FFF], 0x00);
}
