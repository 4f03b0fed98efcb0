// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Decoding of the attributes argument of `SP_MEMORY_ATTRIBUTES_SET_AARCH64`.

use crate::pagetable::MemoryAttributes;
use num_enum::TryFromPrimitive;

const ACCESS_MASK: u64 = 0b11;
const NON_EXECUTABLE: u64 = 1 << 2;

/// Data access permission requested by the secure partition.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessPermission {
    NoAccess = 0,
    ReadWrite = 1,
    Reserved = 2,
    ReadOnly = 3,
}

/// The attributes argument as the secure partition encodes it.
///
/// Bits [1:0] hold the access permission, bit 2 is set for non-executable memory. All other bits
/// are ignored.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RequestedAttributes {
    pub access: AccessPermission,
    pub execute_never: bool,
}

impl From<u64> for RequestedAttributes {
    fn from(value: u64) -> Self {
        // The mask leaves only values covered by `AccessPermission`.
        let access = AccessPermission::try_from((value & ACCESS_MASK) as u8)
            .unwrap_or(AccessPermission::Reserved);
        Self {
            access,
            execute_never: value & NON_EXECUTABLE != 0,
        }
    }
}

impl From<RequestedAttributes> for MemoryAttributes {
    fn from(requested: RequestedAttributes) -> Self {
        let mut attributes = MemoryAttributes::MT_SECURE_MEMORY;
        if requested.access == AccessPermission::ReadWrite {
            attributes |= MemoryAttributes::RW;
        }
        if requested.execute_never {
            attributes |= MemoryAttributes::EXECUTE_NEVER;
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_all_masks() {
        let base = MemoryAttributes::MEMORY | MemoryAttributes::SECURE;
        let rw = MemoryAttributes::RW;
        let xn = MemoryAttributes::EXECUTE_NEVER;
        let expected = [
            base,
            base | rw,
            base,
            base,
            base | xn,
            base | rw | xn,
            base | xn,
            base | xn,
        ];

        for (mask, expected) in expected.into_iter().enumerate() {
            assert_eq!(
                MemoryAttributes::from(RequestedAttributes::from(mask as u64)),
                expected,
                "mask {mask:#b}"
            );
        }
    }

    #[test]
    fn upper_bits_ignored() {
        assert_eq!(
            RequestedAttributes::from(0xffff_fff0 | 0b101),
            RequestedAttributes {
                access: AccessPermission::ReadWrite,
                execute_never: true,
            }
        );
        assert_eq!(
            RequestedAttributes::from(0b11).access,
            AccessPermission::ReadOnly
        );
    }
}
