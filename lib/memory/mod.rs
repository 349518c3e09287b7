//! Byte images of code, used as the source of bytes for decoding.
//!
//! Kestrel does not parse binary formats. Whatever loads a program places its
//! sections into a `backing::Memory`, or implements `CodeMemory` over its own
//! representation.

pub mod backing;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// RWX permissions for memory.
    #[derive(Deserialize, Serialize)]
    pub struct MemoryPermissions: u32 {
        const NONE    = 0b000;
        const READ    = 0b001;
        const WRITE   = 0b010;
        const EXECUTE = 0b100;
        const ALL     = 0b111;
    }
}

/// A source of instruction bytes.
pub trait CodeMemory {
    fn permissions(&self, address: u64) -> Option<MemoryPermissions>;

    fn get_u8(&self, address: u64) -> Option<u8>;

    /// Up to `length` executable bytes starting at `address`. The window stops
    /// early at the first byte which is unmapped or not executable.
    fn get_bytes(&self, address: u64, length: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(length);
        for i in 0..length as u64 {
            let address = address.wrapping_add(i);
            match self.permissions(address) {
                Some(permissions) if permissions.contains(MemoryPermissions::EXECUTE) => {}
                _ => break,
            }
            match self.get_u8(address) {
                Some(byte) => bytes.push(byte),
                None => break,
            }
        }
        bytes
    }
}
