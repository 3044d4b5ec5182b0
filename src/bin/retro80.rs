/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Headless passthrough front end: the firmware's serial console on stdin
//! and stdout. Terminal raw mode, if wanted, is the shell's business
//! (`stty raw -echo`).
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use retro80::{FsStorage, Machine, StdoutSink, ROM_CEILING_DEFAULT, ROM_CEILING_SMALL};

/// T-states per outer-loop frame, then a short sleep.
const FRAME_CYCLES: u64 = 50_000;
const FRAME_SLEEP: Duration = Duration::from_millis(10);

fn main() -> io::Result<()> {
    let matches = Command::new("retro80")
        .about("RetroShield Z80 single-board computer emulator")
        .arg(
            Arg::new("rom")
                .value_name("ROM")
                .required(true)
                .help("ROM image mapped at address 0"),
        )
        .arg(
            Arg::new("rom-ceiling")
                .long("rom-ceiling")
                .value_name("HEX")
                .help("write-protect addresses below this hex value (default per ROM name)"),
        )
        .arg(
            Arg::new("max-cycles")
                .long("max-cycles")
                .value_name("N")
                .help("stop after N T-states (0 = run until halt)"),
        )
        .arg(
            Arg::new("sd-dir")
                .long("sd-dir")
                .value_name("DIR")
                .default_value(".")
                .help("host directory backing the SD card"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("increase log verbosity (repeat for trace)"),
        )
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let rom_path = matches.get_one::<String>("rom").expect("rom is required");
    let rom_ceiling = match matches.get_one::<String>("rom-ceiling") {
        Some(text) => parse_hex(text)?,
        None => default_rom_ceiling(rom_path),
    };
    let max_cycles: u64 = match matches.get_one::<String>("max-cycles") {
        Some(text) => text
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("bad cycle count: {e}")))?,
        None => 0,
    };
    let sd_dir = matches.get_one::<String>("sd-dir").expect("has a default");

    let image = fs::read(rom_path)?;
    info!(
        "loaded {} bytes from {}, ROM ceiling {:#06x}",
        image.len(),
        rom_path,
        rom_ceiling
    );

    let mut machine = Machine::new(rom_ceiling, FsStorage::new(sd_dir.as_str()), StdoutSink);
    machine.load_rom(&image);
    // Grant's BASIC cold start loops on DEC D until zero; the real chip
    // powers up with garbage in D, so give it a value that terminates.
    machine.cpu_mut().set_de(0x0100);

    let keys = spawn_stdin_reader();
    let mut total = 0u64;
    loop {
        while let Ok(byte) = keys.try_recv() {
            machine.push_key(if byte == b'\n' { b'\r' } else { byte });
        }
        total += machine.run(FRAME_CYCLES);
        if machine.halted() && !machine.cpu().iff1() {
            info!(
                "CPU halted at {:#06x} after {} T-states",
                machine.cpu().pc(),
                machine.cpu().cycles()
            );
            break;
        }
        if max_cycles > 0 && total >= max_cycles {
            info!("cycle limit reached after {} T-states", total);
            break;
        }
        thread::sleep(FRAME_SLEEP);
    }
    Ok(())
}

fn parse_hex(text: &str) -> io::Result<u16> {
    let digits = text.trim_start_matches("0x").trim_start_matches('$');
    u16::from_str_radix(digits, 16)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("bad ceiling: {e}")))
}

/// Small-ROM firmwares keep most of the map as RAM; everything else gets
/// the standard 8 KiB ROM floor.
fn default_rom_ceiling(rom_path: &str) -> u16 {
    let name = Path::new(rom_path)
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.contains("mint") {
        ROM_CEILING_SMALL
    } else {
        ROM_CEILING_DEFAULT
    }
}

/// Keystrokes arrive on their own thread; the emulation loop drains the
/// channel between frames.
fn spawn_stdin_reader() -> mpsc::Receiver<u8> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for byte in io::stdin().bytes() {
            match byte {
                Ok(byte) => {
                    if tx.send(byte).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}
