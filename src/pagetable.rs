// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Memory attributes handed to the platform's translation table code.

pub use aarch64_paging::paging::PAGE_SIZE;
use bitflags::bitflags;

bitflags! {
    /// Attributes of a region of memory mapped in the secure partition's translation regime.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct MemoryAttributes: u32 {
        /// Normal memory, as opposed to device memory.
        const MEMORY = 1 << 0;
        /// Secure physical address space.
        const SECURE = 1 << 1;
        /// Writable. Read-only if absent.
        const RW = 1 << 2;
        /// Instruction fetches are not permitted.
        const EXECUTE_NEVER = 1 << 3;
    }
}

impl MemoryAttributes {
    /// Normal secure memory, read-only and executable.
    pub const MT_SECURE_MEMORY: Self = Self::MEMORY.union(Self::SECURE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_kib_granule() {
        assert_eq!(PAGE_SIZE, 4096);
    }
}
