/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The SD block device on ports `0x10`..`0x15`.
//!
//! Firmwares drive it with an ASCII protocol: the filename is streamed one
//! byte at a time into a bounded latch (a zero byte finalises it), a command
//! byte selects the operation, and file or directory contents move through
//! the data port. Host-side failures only ever surface as the status
//! register's error bit.
//!
//! Command bytes, in the order the firmwares learned them:
//! `0x01` open-for-read, `0x02` create (truncating), `0x03` open-for-append,
//! `0x04` seek-to-start, `0x05` close, `0x06` list-directory,
//! `0x07` open-for-read-write, `0x08` seek-to-byte.
use std::collections::VecDeque;
use std::io;
use std::vec;

use arrayvec::ArrayVec;
use bitflags::bitflags;
use log::{debug, warn};

use crate::storage::{Storage, StorageFile};

/// Capacity of the filename latch; longer names are silently truncated.
const FNAME_CAP: usize = 64;

bitflags! {
    /// Status register bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct SdStatus: u8 {
        /// The device is present and accepting commands.
        const READY = 0x01;
        /// The last open or seek failed.
        const ERROR = 0x02;
        /// The open file or directory can still yield a byte.
        const DATA = 0x04;
    }
}

/// Commands accepted at the command port.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum SdCommand {
    OpenRead = 0x01,
    Create = 0x02,
    OpenAppend = 0x03,
    SeekStart = 0x04,
    Close = 0x05,
    ListDir = 0x06,
    OpenReadWrite = 0x07,
    SeekTo = 0x08,
}

impl SdCommand {
    pub fn from_byte(byte: u8) -> Option<SdCommand> {
        Some(match byte {
            0x01 => SdCommand::OpenRead,
            0x02 => SdCommand::Create,
            0x03 => SdCommand::OpenAppend,
            0x04 => SdCommand::SeekStart,
            0x05 => SdCommand::Close,
            0x06 => SdCommand::ListDir,
            0x07 => SdCommand::OpenReadWrite,
            0x08 => SdCommand::SeekTo,
            _ => return None,
        })
    }
}

/// An open file with one byte of read-ahead so "data available" can be
/// reported without consuming anything.
struct OpenFile<F: StorageFile> {
    handle: F,
    /// The next unread offset. Only meaningful while `readable`.
    pos: u64,
    peek: Option<u8>,
    readable: bool,
    writable: bool,
}

impl<F: StorageFile> OpenFile<F> {
    fn new(handle: F, readable: bool, writable: bool) -> Self {
        let mut file = OpenFile {
            handle,
            pos: 0,
            peek: None,
            readable,
            writable,
        };
        if readable {
            file.probe();
        }
        file
    }

    /// Pull the read-ahead byte; afterwards the underlying position is one
    /// past `pos` whenever `peek` is occupied.
    fn probe(&mut self) {
        self.peek = match self.handle.read_byte() {
            Ok(byte) => byte,
            Err(e) => {
                warn!("sd: read failed: {}", e);
                None
            }
        };
    }

    fn has_byte(&self) -> bool {
        self.peek.is_some()
    }

    fn read(&mut self) -> Option<u8> {
        let byte = self.peek.take()?;
        self.pos += 1;
        self.probe();
        Some(byte)
    }

    fn write(&mut self, byte: u8) -> io::Result<()> {
        if self.peek.is_some() {
            // The read-ahead advanced the underlying position; step back.
            self.handle.seek(self.pos)?;
            self.peek = None;
        }
        self.handle.write_byte(byte)?;
        if self.readable {
            self.pos += 1;
            self.probe();
        }
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.handle.seek(pos)?;
        self.pos = pos;
        self.peek = None;
        if self.readable {
            self.probe();
        }
        Ok(())
    }
}

/// A directory listing streamed entry by entry as `name CR LF`.
struct DirStream {
    entries: vec::IntoIter<String>,
    pending: VecDeque<u8>,
}

impl DirStream {
    fn new(names: Vec<String>) -> Self {
        let entries: Vec<String> = names
            .into_iter()
            .filter(|name| name != "." && name != "..")
            .collect();
        DirStream {
            entries: entries.into_iter(),
            pending: VecDeque::new(),
        }
    }

    fn has_byte(&self) -> bool {
        !self.pending.is_empty() || !self.entries.as_slice().is_empty()
    }

    fn next_byte(&mut self) -> Option<u8> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Some(byte);
            }
            let name = self.entries.next()?;
            self.pending.extend(name.bytes());
            self.pending.extend([b'\r', b'\n']);
        }
    }
}

/// The SD peripheral proper.
pub struct SdCard<S: Storage> {
    storage: S,
    fname: ArrayVec<u8, FNAME_CAP>,
    fname_done: bool,
    seek_lo: u8,
    seek_hi: u8,
    file: Option<OpenFile<S::File>>,
    dir: Option<DirStream>,
    error: bool,
}

impl<S: Storage> SdCard<S> {
    pub fn new(storage: S) -> Self {
        SdCard {
            storage,
            fname: ArrayVec::new(),
            fname_done: false,
            seek_lo: 0,
            seek_hi: 0,
            file: None,
            dir: None,
            error: false,
        }
    }

    /// The latched filename as text.
    fn name(&self) -> String {
        String::from_utf8_lossy(&self.fname).into_owned()
    }

    /// Append to the filename latch; a zero byte finalises the name, a byte
    /// after that starts a fresh one. Overflow truncates.
    pub fn write_fname(&mut self, byte: u8) {
        if byte == 0 {
            self.fname_done = true;
            return;
        }
        if self.fname_done {
            self.fname.clear();
            self.fname_done = false;
        }
        if self.fname.len() < FNAME_CAP - 1 {
            self.fname.push(byte);
        }
    }

    pub fn write_seek_lo(&mut self, byte: u8) {
        self.seek_lo = byte;
    }

    pub fn write_seek_hi(&mut self, byte: u8) {
        self.seek_hi = byte;
    }

    fn seek_pos(&self) -> u16 {
        u16::from_le_bytes([self.seek_lo, self.seek_hi])
    }

    /// Read the status register.
    pub fn read_status(&self) -> u8 {
        let mut status = SdStatus::READY;
        if self.error {
            status |= SdStatus::ERROR;
        }
        let data = match (&self.file, &self.dir) {
            (Some(file), _) => file.has_byte(),
            (_, Some(dir)) => dir.has_byte(),
            _ => false,
        };
        if data {
            status |= SdStatus::DATA;
        }
        status.bits()
    }

    /// Read the data port: the next byte of the open file or directory
    /// stream. An exhausted stream closes itself and reads as zero.
    pub fn read_data(&mut self) -> u8 {
        if let Some(file) = self.file.as_mut() {
            match file.read() {
                Some(byte) => byte,
                None => {
                    self.file = None;
                    0
                }
            }
        } else if let Some(dir) = self.dir.as_mut() {
            match dir.next_byte() {
                Some(byte) => byte,
                None => {
                    self.dir = None;
                    0
                }
            }
        } else {
            0
        }
    }

    /// Write the data port: the next byte of a file open for writing.
    pub fn write_data(&mut self, byte: u8) {
        if let Some(file) = self.file.as_mut() {
            if file.writable {
                if let Err(e) = file.write(byte) {
                    warn!("sd: write failed: {}", e);
                    self.error = true;
                }
            }
        }
    }

    /// Write the command port.
    pub fn write_command(&mut self, byte: u8) {
        let Some(cmd) = SdCommand::from_byte(byte) else {
            warn!("sd: unknown command {:02x}", byte);
            return;
        };
        debug!("sd: command {:?} name {:?}", cmd, self.name());
        match cmd {
            SdCommand::OpenRead => self.open_with(Storage::open_read, true, false),
            SdCommand::Create => self.open_with(Storage::open_write_trunc, false, true),
            SdCommand::OpenAppend => self.open_with(Storage::open_append, false, true),
            SdCommand::OpenReadWrite => self.open_with(Storage::open_read_write, true, true),
            SdCommand::SeekStart => self.seek(0),
            SdCommand::SeekTo => self.seek(u64::from(self.seek_pos())),
            SdCommand::Close => {
                self.file = None;
                self.dir = None;
            }
            SdCommand::ListDir => {
                self.file = None;
                self.dir = None;
                match self.storage.list() {
                    Ok(names) => {
                        self.dir = Some(DirStream::new(names));
                        self.error = false;
                    }
                    Err(e) => {
                        warn!("sd: list failed: {}", e);
                        self.error = true;
                    }
                }
            }
        }
    }

    fn open_with<F>(&mut self, open: F, readable: bool, writable: bool)
    where
        F: FnOnce(&mut S, &str) -> io::Result<S::File>,
    {
        self.file = None;
        self.dir = None;
        let name = self.name();
        match open(&mut self.storage, &name) {
            Ok(handle) => {
                self.file = Some(OpenFile::new(handle, readable, writable));
                self.error = false;
            }
            Err(e) => {
                warn!("sd: open {:?} failed: {}", name, e);
                self.error = true;
            }
        }
    }

    fn seek(&mut self, pos: u64) {
        match self.file.as_mut() {
            Some(file) => match file.seek(pos) {
                Ok(()) => self.error = false,
                Err(e) => {
                    warn!("sd: seek failed: {}", e);
                    self.error = true;
                }
            },
            None => self.error = true,
        }
    }

    /// Direct access to the backend, for the front end.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}
