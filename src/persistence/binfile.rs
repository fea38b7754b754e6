//! Little-endian binary files with null-terminated strings (spec §6),
//! addressed by small integer handles the way the bytecode's
//! open/close/seek/read/write intrinsics expect.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

/// Handles never get reused within a process, so a stale handle a script
/// forgot to close fails loudly instead of silently aliasing a new file.
#[derive(Default)]
pub struct BinFileTable {
    next_handle: i64,
    open: HashMap<i64, File>,
}

impl BinFileTable {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            open: HashMap::new(),
        }
    }

    pub fn open(&mut self, path: impl AsRef<Path>, mode: OpenMode) -> Result<i64> {
        let mut opts = OpenOptions::new();
        match mode {
            OpenMode::Read => {
                opts.read(true);
            }
            OpenMode::Write => {
                opts.write(true).create(true).truncate(false);
            }
            OpenMode::ReadWrite => {
                opts.read(true).write(true).create(true);
            }
        }
        let file = opts.open(path.as_ref()).with_context(|| {
            format!("opening binary file {}", path.as_ref().display())
        })?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.open.insert(handle, file);
        Ok(handle)
    }

    pub fn close(&mut self, handle: i64) -> Result<()> {
        self.open
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("close on unknown file handle {handle}"))
    }

    fn file_mut(&mut self, handle: i64) -> Result<&mut File> {
        self.open
            .get_mut(&handle)
            .ok_or_else(|| anyhow::anyhow!("unknown file handle {handle}"))
    }

    pub fn seek(&mut self, handle: i64, pos: u64) -> Result<()> {
        self.file_mut(handle)?.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Reads `nbytes` (1..=4) as an unsigned little-endian integer.
    pub fn read_int(&mut self, handle: i64, nbytes: u8) -> Result<i64> {
        if !(1..=4).contains(&nbytes) {
            bail!("read_int: nbytes must be 1..=4, got {nbytes}");
        }
        let file = self.file_mut(handle)?;
        let mut buf = [0u8; 4];
        file.read_exact(&mut buf[..nbytes as usize])?;
        let mut value: i64 = 0;
        for i in 0..nbytes as usize {
            value |= (buf[i] as i64) << (8 * i);
        }
        Ok(value)
    }

    pub fn write_int(&mut self, handle: i64, value: i64, nbytes: u8) -> Result<()> {
        if !(1..=4).contains(&nbytes) {
            bail!("write_int: nbytes must be 1..=4, got {nbytes}");
        }
        let file = self.file_mut(handle)?;
        let bytes = (value as u32).to_le_bytes();
        file.write_all(&bytes[..nbytes as usize])?;
        Ok(())
    }

    pub fn read_cstr(&mut self, handle: i64) -> Result<String> {
        let file = self.file_mut(handle)?;
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = file.read(&mut byte)?;
            if n == 0 || byte[0] == 0 {
                break;
            }
            bytes.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn write_cstr(&mut self, handle: i64, s: &str) -> Result<()> {
        let file = self.file_mut(handle)?;
        file.write_all(s.as_bytes())?;
        file.write_all(&[0u8])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_reads_back_a_mixed_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("save.bin");
        let mut table = BinFileTable::new();
        let h = table.open(&path, OpenMode::ReadWrite).unwrap();
        table.write_int(h, 0x1234, 2).unwrap();
        table.write_cstr(h, "hello").unwrap();
        table.close(h).unwrap();

        let h = table.open(&path, OpenMode::Read).unwrap();
        assert_eq!(table.read_int(h, 2).unwrap(), 0x1234);
        assert_eq!(table.read_cstr(h).unwrap(), "hello");
    }

    #[test]
    fn operations_on_an_unknown_handle_fail() {
        let mut table = BinFileTable::new();
        assert!(table.seek(99, 0).is_err());
        assert!(table.close(99).is_err());
    }

    #[test]
    fn seek_repositions_before_a_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("save.bin");
        let mut table = BinFileTable::new();
        let h = table.open(&path, OpenMode::ReadWrite).unwrap();
        table.write_int(h, 1, 1).unwrap();
        table.write_int(h, 2, 1).unwrap();
        table.write_int(h, 3, 1).unwrap();
        table.seek(h, 1).unwrap();
        assert_eq!(table.read_int(h, 1).unwrap(), 2);
    }
}
