//! PDF cross-reference table implementation

use std::collections::BTreeMap;
use log::trace;

use crate::error::PDFToolkitResult;
use super::{ByteSink, ObjectId, GENERATION};

/// Generation written for free entries; these ids are never reused
const FREE_GENERATION: u16 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    InUse { offset: u64 },
    Free,
}

/// PDF cross-reference table
#[derive(Debug, Default)]
pub struct XRefTable {
    entries: BTreeMap<u32, u64>,
    size: u32,
}

impl XRefTable {
    /// Create a table covering ids `0..size`
    pub fn new(size: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            size,
        }
    }

    /// Build from `(id, offset)` pairs; ids up to `last_id` without an offset are free
    pub fn from_offsets(offsets: &[(ObjectId, u64)], last_id: ObjectId) -> Self {
        let mut table = Self::new(last_id.get().saturating_add(1));
        for &(id, offset) in offsets {
            table.add_entry(id, offset);
        }
        table
    }

    /// Record an in-use object
    pub fn add_entry(&mut self, id: ObjectId, offset: u64) {
        self.entries.insert(id.get(), offset);
        self.size = self.size.max(id.get().saturating_add(1));
    }

    /// Number of entries including the head of the free list
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn entry(&self, id: u32) -> XRefEntry {
        match self.entries.get(&id) {
            Some(&offset) if id != 0 => XRefEntry::InUse { offset },
            _ => XRefEntry::Free,
        }
    }

    /// Free ids in ascending order, excluding 0
    pub fn free_ids(&self) -> Vec<u32> {
        (1..self.size).filter(|id| !self.entries.contains_key(id)).collect()
    }

    /// Write the `xref` section; every entry line is exactly 20 bytes
    pub fn write_to(&self, sink: &mut dyn ByteSink) -> PDFToolkitResult<()> {
        let free = self.free_ids();
        trace!("Writing xref with {} entries, {} free", self.size, free.len());

        sink.put_string(&format!("xref\r\n0 {}\r\n", self.size))?;

        // Entry 0 heads the free list; each free entry links to the next
        let mut next_free = free.iter().copied();
        let mut link = next_free.next().unwrap_or(0);
        sink.put_string(&format!("{:010} {:05} f\r\n", link, FREE_GENERATION))?;

        for id in 1..self.size {
            match self.entry(id) {
                XRefEntry::InUse { offset } => {
                    sink.put_string(&format!("{:010} {:05} n\r\n", offset, GENERATION))?;
                }
                XRefEntry::Free => {
                    link = next_free.next().unwrap_or(0);
                    sink.put_string(&format!("{:010} {:05} f\r\n", link, FREE_GENERATION))?;
                }
            }
        }
        Ok(())
    }
}
