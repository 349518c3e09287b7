//! A program image made of non-overlapping sections.
//!
//! Loaders place file contents here; `block::sweep` reads executable bytes
//! back through `CodeMemory`.

use crate::memory::{CodeMemory, MemoryPermissions};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound::Included;

/// Contiguous bytes sharing one set of permissions.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Section {
    data: Vec<u8>,
    permissions: MemoryPermissions,
}

impl Section {
    pub fn new(data: Vec<u8>, permissions: MemoryPermissions) -> Section {
        Section { data, permissions }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn permissions(&self) -> MemoryPermissions {
        self.permissions
    }

    fn end(&self, address: u64) -> u64 {
        address + self.data.len() as u64
    }
}

/// Sections keyed by their start address.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Memory {
    sections: BTreeMap<u64, Section>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }

    pub fn sections(&self) -> &BTreeMap<u64, Section> {
        &self.sections
    }

    pub fn permissions(&self, address: u64) -> Option<MemoryPermissions> {
        self.section(address)
            .map(|(_, section)| section.permissions())
    }

    pub fn read_u8(&self, address: u64) -> Option<u8> {
        self.section(address).and_then(|(section_address, section)| {
            section.data().get((address - section_address) as usize).copied()
        })
    }

    /// Map `data` at `address`. Whatever was mapped there before is cut away:
    /// older sections are truncated, split around the new one, or dropped.
    ///
    /// Mapping no bytes changes nothing. Data running past the end of the
    /// address space is an error.
    pub fn map(&mut self, address: u64, data: Vec<u8>, permissions: MemoryPermissions) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        let end = address.checked_add(data.len() as u64).ok_or_else(|| {
            Error::Custom(format!(
                "Mapping 0x{:x} bytes at 0x{:x} overflows the address space",
                data.len(),
                address
            ))
        })?;

        let overlapping = self
            .sections
            .iter()
            .filter(|(a, section)| **a < end && section.end(**a) > address)
            .map(|(a, _)| *a)
            .collect::<Vec<u64>>();

        for a in overlapping {
            let mut section = match self.sections.remove(&a) {
                Some(section) => section,
                None => continue,
            };
            if section.end(a) > end {
                let tail = section.data.split_off((end - a) as usize);
                self.sections.insert(end, Section::new(tail, section.permissions));
            }
            if a < address {
                section.data.truncate((address - a) as usize);
                self.sections.insert(a, section);
            }
        }

        self.sections.insert(address, Section { data, permissions });
        Ok(())
    }

    fn section(&self, address: u64) -> Option<(u64, &Section)> {
        self.sections
            .range((Included(0), Included(address)))
            .next_back()
            .filter(|(section_address, section)| section.end(**section_address) > address)
            .map(|(section_address, section)| (*section_address, section))
    }
}

impl CodeMemory for Memory {
    fn get_u8(&self, address: u64) -> Option<u8> {
        self.read_u8(address)
    }

    fn permissions(&self, address: u64) -> Option<MemoryPermissions> {
        self.permissions(address)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn get_bytes_stops_at_non_executable() {
        let mut memory = Memory::new();
        memory.map(0x1000, vec![0x90, 0x90, 0xc3], MemoryPermissions::ALL).unwrap();
        memory.map(0x1003, vec![0xcc, 0xcc], MemoryPermissions::READ).unwrap();

        assert_eq!(memory.get_bytes(0x1000, 16), vec![0x90, 0x90, 0xc3]);
        assert_eq!(memory.get_bytes(0x1003, 16), Vec::<u8>::new());
        assert_eq!(memory.get_bytes(0x2000, 16), Vec::<u8>::new());
    }

    #[test]
    fn overlapping_sections_split() {
        let mut memory = Memory::new();
        memory.map(0x1000, vec![0; 16], MemoryPermissions::READ).unwrap();
        memory.map(0x1004, vec![1, 2, 3, 4], MemoryPermissions::ALL).unwrap();

        assert_eq!(memory.sections().len(), 3);
        assert_eq!(memory.read_u8(0x1003), Some(0));
        assert_eq!(memory.read_u8(0x1004), Some(1));
        assert_eq!(memory.read_u8(0x1008), Some(0));
        assert_eq!(memory.permissions(0x1005), Some(MemoryPermissions::ALL));
        assert_eq!(memory.permissions(0x100f), Some(MemoryPermissions::READ));
        assert_eq!(memory.read_u8(0x1010), None);
    }

    #[test]
    fn map_ignores_empty_data() {
        let mut memory = Memory::new();
        memory.map(0x1000, vec![0x90, 0xc3], MemoryPermissions::ALL).unwrap();
        memory.map(0x1000, Vec::new(), MemoryPermissions::READ).unwrap();

        assert_eq!(memory.sections().len(), 1);
        assert_eq!(memory.read_u8(0x1001), Some(0xc3));
        assert_eq!(memory.permissions(0x1000), Some(MemoryPermissions::ALL));
    }

    #[test]
    fn map_rejects_overflow() {
        let mut memory = Memory::new();
        assert!(memory.map(u64::MAX - 1, vec![0; 4], MemoryPermissions::ALL).is_err());
        assert!(memory.sections().is_empty());

        memory.map(u64::MAX - 4, vec![0xcc; 4], MemoryPermissions::ALL).unwrap();
        assert_eq!(memory.read_u8(u64::MAX - 1), Some(0xcc));
        assert_eq!(memory.read_u8(u64::MAX), None);
    }
}
