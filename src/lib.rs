/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    retro80 is free software: you can redistribute it and/or modify it under
    the terms of the GNU Lesser General Public License (LGPL) as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    retro80 is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
/*! # retro80

`retro80` emulates a RetroShield-class Z80 single-board computer on a modern
host, so firmware ROMs written for that hardware - monitors, BASIC, Forth,
Pascal, MINT - run, print and accept input without the board.

```text
          ┌─────────┐   step    ┌───────────────────────────────┐
          │   Z80   │ <-------> │           SystemBus           │
          │  (cpu)  │  4 call-  │  memory   acia  usart   sd    │
          └─────────┘  backs    └───────────────────────────────┘
               ^                      |              |
          request_int            ByteSink        Storage
               └──── scheduler ────┘ (stdout)    (SD dir)
```

The pieces compose through small traits:

* [bus::Bus] - the four memory/port callbacks the CPU core drives.
* [machine::ByteSink] - where transmitted serial bytes go.
* [storage::Storage] - the directory of files behind the SD device.

[machine::Machine] wires a [Z80] to the production [machine::SystemBus]
(64 KiB memory with a write-protected ROM floor, a 6850-style ACIA at
`0x80`/`0x81`, an 8251-style USART at `0x00`/`0x01` and the SD device at
`0x10`..`0x15`) and runs the input interrupt scheduler between steps.
The CPU core is freestanding though - give it any [bus::Bus]:

```
use retro80::{Z80, bus::PlainRam};

let mut ram = PlainRam::new();
ram.load(0, &[
    0x21, 0x00, 0x00, // LD   HL, 0x0000
    0x11, 0x01, 0x00, // LD   DE, 0x0001
    0xEB,             // EX   DE, HL
    0x19,             // ADD  HL, DE
    0x10, 0xFC,       // DJNZ 0x0006
    0x76,             // HALT
]);
let mut cpu = Z80::new();
cpu.set_bc(24 << 8); // B counts the iterations
while !cpu.is_halted() {
    cpu.step(&mut ram);
}
// the 24th Fibonacci number
assert_eq!(cpu.hl(), 46368);
assert_eq!(cpu.cycles(), 10 + 10 + 24 * (4 + 11 + 13) as u64 - 5 + 4);
```

The interpreter covers the documented instruction set and the undocumented
corners the exerciser ROMs probe: the `X`/`Y` flag copies, `DD CB`
register-copy side effects, `IXH`/`IXL` forms, MEMPTR leakage into
`BIT n,(HL)`, and ED-page holes as two-byte NOPs. [disasm::disassemble]
decodes the same opcode space and always agrees with the interpreter on
instruction length, which is what the debugger front ends lean on.
*/
pub mod acia;
pub mod bus;
pub mod cpu;
pub mod disasm;
pub mod machine;
pub mod memory;
pub mod sdcard;
pub mod storage;
pub mod usart;

pub use cpu::flags::CpuFlags;
pub use cpu::registers::{Condition, InterruptMode, Prefix};
pub use cpu::{Z80, INT_RESTART, NMI_RESTART};
pub use machine::{Machine, StdoutSink, SystemBus};
pub use memory::{Memory, ROM_CEILING_DEFAULT, ROM_CEILING_SMALL};
pub use storage::{FsStorage, MemStorage};
