/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The storage backend behind the SD peripheral.
//!
//! [Storage] abstracts a flat directory of named byte files so the SD state
//! machine can be driven against the real filesystem ([FsStorage]) or an
//! in-memory map ([MemStorage]) in tests. Closing a handle is dropping it.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::rc::Rc;

#[allow(unused_imports)]
use log::{debug, warn};

/// A directory of named files.
pub trait Storage {
    type File: StorageFile;

    /// Open an existing file for reading.
    fn open_read(&mut self, name: &str) -> io::Result<Self::File>;
    /// Create or truncate a file for writing.
    fn open_write_trunc(&mut self, name: &str) -> io::Result<Self::File>;
    /// Open a file for reading and writing without truncation, creating it
    /// when missing.
    fn open_read_write(&mut self, name: &str) -> io::Result<Self::File>;
    /// Open a file for appending; the write position starts at the end.
    fn open_append(&mut self, name: &str) -> io::Result<Self::File>;
    /// The names of all files, in backend iteration order.
    fn list(&mut self) -> io::Result<Vec<String>>;
}

/// An open file handle.
pub trait StorageFile {
    /// Read the byte at the current position, `None` at end of file.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    /// Write a byte at the current position.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;
    /// Move the position to `pos` bytes from the start.
    fn seek(&mut self, pos: u64) -> io::Result<()>;
}

/// A directory on the host filesystem.
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        FsStorage { root: root.into() }
    }

    /// Refuse names that would escape the backing directory.
    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            warn!("rejecting storage name {:?}", name);
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad file name"));
        }
        Ok(self.root.join(name))
    }
}

/// A file on the host filesystem.
pub struct FsFile {
    file: fs::File,
}

impl Storage for FsStorage {
    type File = FsFile;

    fn open_read(&mut self, name: &str) -> io::Result<FsFile> {
        let file = fs::File::open(self.resolve(name)?)?;
        Ok(FsFile { file })
    }

    fn open_write_trunc(&mut self, name: &str) -> io::Result<FsFile> {
        let file = fs::File::create(self.resolve(name)?)?;
        Ok(FsFile { file })
    }

    fn open_read_write(&mut self, name: &str) -> io::Result<FsFile> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.resolve(name)?)?;
        Ok(FsFile { file })
    }

    fn open_append(&mut self, name: &str) -> io::Result<FsFile> {
        let file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.resolve(name)?)?;
        Ok(FsFile { file })
    }

    fn list(&mut self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

impl StorageFile for FsFile {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.file.write_all(&[byte])
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos)).map(|_| ())
    }
}

type SharedBytes = Rc<RefCell<Vec<u8>>>;

/// An in-memory storage backend. Handles opened from the same name share
/// their contents, like files on a disk do.
#[derive(Default)]
pub struct MemStorage {
    files: BTreeMap<String, SharedBytes>,
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage::default()
    }

    /// Pre-populate a file, replacing any previous contents.
    pub fn insert(&mut self, name: &str, contents: &[u8]) {
        self.files
            .insert(name.to_string(), Rc::new(RefCell::new(contents.to_vec())));
    }

    /// A copy of a file's contents, if it exists.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).map(|data| data.borrow().clone())
    }

    fn shared(&mut self, name: &str, create: bool) -> io::Result<SharedBytes> {
        if let Some(data) = self.files.get(name) {
            return Ok(data.clone());
        }
        if create {
            let data: SharedBytes = Rc::default();
            self.files.insert(name.to_string(), data.clone());
            Ok(data)
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }
}

/// A handle into a [MemStorage] file.
pub struct MemFile {
    data: SharedBytes,
    pos: usize,
}

impl Storage for MemStorage {
    type File = MemFile;

    fn open_read(&mut self, name: &str) -> io::Result<MemFile> {
        let data = self.shared(name, false)?;
        Ok(MemFile { data, pos: 0 })
    }

    fn open_write_trunc(&mut self, name: &str) -> io::Result<MemFile> {
        let data = self.shared(name, true)?;
        data.borrow_mut().clear();
        Ok(MemFile { data, pos: 0 })
    }

    fn open_read_write(&mut self, name: &str) -> io::Result<MemFile> {
        let data = self.shared(name, true)?;
        Ok(MemFile { data, pos: 0 })
    }

    fn open_append(&mut self, name: &str) -> io::Result<MemFile> {
        let data = self.shared(name, true)?;
        let pos = data.borrow().len();
        Ok(MemFile { data, pos })
    }

    fn list(&mut self) -> io::Result<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }
}

impl StorageFile for MemFile {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.data.borrow().get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let mut data = self.data.borrow_mut();
        if self.pos < data.len() {
            data[self.pos] = byte;
        } else {
            data.resize(self.pos, 0);
            data.push(byte);
        }
        self.pos += 1;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_storage_round_trips() {
        let mut storage = MemStorage::new();
        let mut f = storage.open_write_trunc("HELLO").unwrap();
        for &b in b"HELLO, WORLD" {
            f.write_byte(b).unwrap();
        }
        drop(f);
        let mut f = storage.open_read("HELLO").unwrap();
        let mut out = Vec::new();
        while let Some(b) = f.read_byte().unwrap() {
            out.push(b);
        }
        assert_eq!(out, b"HELLO, WORLD");
        f.seek(7).unwrap();
        assert_eq!(f.read_byte().unwrap(), Some(b'W'));
    }

    #[test]
    fn mem_storage_append_and_overwrite() {
        let mut storage = MemStorage::new();
        storage.insert("LOG", b"AB");
        let mut f = storage.open_append("LOG").unwrap();
        f.write_byte(b'C').unwrap();
        drop(f);
        assert_eq!(storage.contents("LOG").unwrap(), b"ABC");
        let mut f = storage.open_read_write("LOG").unwrap();
        f.seek(1).unwrap();
        f.write_byte(b'X').unwrap();
        drop(f);
        assert_eq!(storage.contents("LOG").unwrap(), b"AXC");
    }

    #[test]
    fn missing_files_do_not_open_for_read() {
        let mut storage = MemStorage::new();
        assert!(storage.open_read("NOPE").is_err());
    }

    #[test]
    fn listing_names_files() {
        let mut storage = MemStorage::new();
        storage.insert("FOO", b"");
        storage.insert("BAR", b"");
        assert_eq!(storage.list().unwrap(), vec!["BAR", "FOO"]);
    }
}
