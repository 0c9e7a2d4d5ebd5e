use log::debug;
use object::{File, Object, ObjectSegment, ObjectSymbol, SymbolKind};
use serde_derive::Serialize;
use std::fmt::{Display, Formatter, Result as DisplayResult};

use crate::error::ReplayError;

/// Mapped bytes. `start + data.len()` never wraps, `MemoryImage::map` checks it.
pub struct Segment {
    pub start: u64,
    pub data: Vec<u8>,
    end: u64,
}

impl Segment {
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        write!(f, "{:016x}-{:016x}", self.start, self.end())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub start: u64,
    pub end: u64,
    pub name: String,
}

/// Memory of the replayed process: code and data segments plus function bounds.
#[derive(Default)]
pub struct MemoryImage {
    segments: Vec<Segment>,
    functions: Vec<Function>,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A raw blob mapped at `base`.
    pub fn flat(base: u64, data: Vec<u8>) -> Result<Self, ReplayError> {
        let mut image = Self::new();
        image.map(base, data)?;
        Ok(image)
    }

    /// Loadable segments and function symbols of an ELF file.
    pub fn from_elf(data: &[u8]) -> Result<Self, ReplayError> {
        let binfile = File::parse(data)?;
        let mut image = Self::new();

        for segment in binfile.segments() {
            let bytes = segment.data()?;
            if !bytes.is_empty() {
                image.map(segment.address(), bytes.to_vec())?;
            }
        }

        for symbol in binfile.symbols() {
            if symbol.kind() != SymbolKind::Text || symbol.size() == 0 {
                continue;
            }
            let end = match symbol.address().checked_add(symbol.size()) {
                Some(end) => end,
                None => {
                    debug!(
                        "skipping symbol at 0x{:x} wrapping the address space",
                        symbol.address()
                    );
                    continue;
                }
            };
            if let Ok(name) = symbol.name() {
                image.add_function(symbol.address(), end, name);
            }
        }

        if image.segments.is_empty() {
            return Err(ReplayError::EmptyImage);
        }
        Ok(image)
    }

    pub fn map(&mut self, start: u64, data: Vec<u8>) -> Result<(), ReplayError> {
        let end = start
            .checked_add(data.len() as u64)
            .ok_or(ReplayError::Wrap {
                start,
                len: data.len(),
            })?;
        self.segments.push(Segment { start, data, end });
        Ok(())
    }

    pub fn add_function(&mut self, start: u64, end: u64, name: &str) {
        self.functions.push(Function {
            start,
            end,
            name: name.to_string(),
        });
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn function_at(&self, address: u64) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| address >= f.start && address < f.end)
    }

    /// Copy as many bytes as are mapped contiguously from `address`.
    pub fn read(&self, address: u64, buf: &mut [u8]) -> usize {
        let segment = match self.segments.iter().find(|s| s.contains(address)) {
            Some(segment) => segment,
            None => return 0,
        };
        let offset = (address - segment.start) as usize;
        let n = buf.len().min(segment.data.len() - offset);
        buf[..n].copy_from_slice(&segment.data[offset..offset + n]);
        n
    }

    pub fn write(&mut self, address: u64, bytes: &[u8]) -> usize {
        let segment = match self.segments.iter_mut().find(|s| s.contains(address)) {
            Some(segment) => segment,
            None => return 0,
        };
        let offset = (address - segment.start) as usize;
        let n = bytes.len().min(segment.data.len() - offset);
        segment.data[offset..offset + n].copy_from_slice(&bytes[..n]);
        n
    }
}
