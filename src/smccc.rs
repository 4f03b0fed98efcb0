// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Types and helpers related to the SMC Calling Convention.

use core::fmt::{self, Debug, Display, Formatter};

const FAST_CALL: u32 = 0x8000_0000;
const SMC64: u32 = 0x4000_0000;
const OEN_MASK: u32 = 0x3f00_0000;
const OEN_SHIFT: u8 = 24;
const SVE_HINT: u32 = 1 << 16;
const RESERVED_BITS: u32 = 0x7f << 17;

/// The call is not supported by the implementation.
pub const NOT_SUPPORTED: i32 = -1;

/// One of the call parameters has a non-supported value.
pub const INVALID_PARAMETER: i32 = -3;

/// The type of an SMCCC call: whether it is a fast call or yielding call, and which calling
/// convention it uses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SmcccCallType {
    /// An SMC32/HVC32 fast call.
    Fast32,
    /// An SMC64/HVC64 fast call.
    Fast64,
    /// A yielding call.
    Yielding,
}

/// Owning Entity Number (OEN)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OwningEntityNumber(pub u8);

impl OwningEntityNumber {
    /// Standard Secure Service calls.
    pub const STANDARD_SECURE: Self = Self(4);
}

impl Display for OwningEntityNumber {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An SMCCC function ID.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Creates a new `FunctionId` from its components.
    pub const fn new(call_type: SmcccCallType, oen: OwningEntityNumber, number: u16) -> Self {
        let type_bits = match call_type {
            SmcccCallType::Fast32 => FAST_CALL,
            SmcccCallType::Fast64 => FAST_CALL | SMC64,
            SmcccCallType::Yielding => 0,
        };
        Self(type_bits | (((oen.0 as u32) << OEN_SHIFT) & OEN_MASK) | (number as u32))
    }

    /// Returns the Owning Entity Number of the function ID.
    pub fn oen(self) -> OwningEntityNumber {
        OwningEntityNumber(((self.0 & OEN_MASK) >> OEN_SHIFT) as u8)
    }

    /// Returns the lower 16 bits of the function ID.
    pub fn number(self) -> u16 {
        self.0 as u16
    }

    /// Returns what type of call this is.
    pub fn call_type(self) -> SmcccCallType {
        if self.0 & FAST_CALL != 0 {
            if self.0 & SMC64 != 0 {
                SmcccCallType::Fast64
            } else {
                SmcccCallType::Fast32
            }
        } else {
            SmcccCallType::Yielding
        }
    }

    /// Sets the SVE hint bit.
    #[cfg(test)]
    pub fn set_sve_hint(&mut self) {
        self.0 |= SVE_HINT
    }

    /// Clears the SVE hint bit.
    ///
    /// SMCCC v1.3+ requires the hint to be disregarded for the purpose of function identification.
    pub fn clear_sve_hint(&mut self) {
        self.0 &= !SVE_HINT
    }

    /// Returns false if this is a fast call but has any of bits 17-23 set.
    ///
    /// They are reserved for future use and should always be 0.
    pub fn valid(self) -> bool {
        self.call_type() == SmcccCallType::Yielding || self.0 & RESERVED_BITS == 0
    }
}

impl Display for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Debug for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:#010x} ({:?} OEN {})",
            self.0,
            self.call_type(),
            self.oen(),
        )
    }
}

/// A value which can be returned from an SMC call by writing to the caller's registers.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct SmcReturn {
    /// The number of elements from `values` that are actually used for this return.
    used: usize,
    values: [u64; Self::MAX_VALUES],
}

impl SmcReturn {
    /// The maximum number of registers an SMC can return.
    pub const MAX_VALUES: usize = 18;

    /// A return which leaves all of the caller's registers untouched.
    pub const EMPTY: Self = Self {
        used: 0,
        values: [0; 18],
    };

    /// Returns a slice containing the used values.
    pub fn values(&self) -> &[u64] {
        &self.values[0..self.used]
    }

    /// Returns true if no values are used.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }
}

impl Debug for SmcReturn {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "SmcReturn([")?;
        let values = self.values();
        if let Some(first) = values.first() {
            write!(f, "{first:#x}")?;
            for value in &values[1..] {
                write!(f, ", {value:#x}")?;
            }
        }
        write!(f, "])")?;
        Ok(())
    }
}

impl From<()> for SmcReturn {
    fn from(_: ()) -> Self {
        Self::EMPTY
    }
}

impl From<u64> for SmcReturn {
    fn from(value: u64) -> Self {
        Self::from([value])
    }
}

impl From<i64> for SmcReturn {
    fn from(value: i64) -> Self {
        Self::from(value as u64)
    }
}

impl From<i32> for SmcReturn {
    fn from(value: i32) -> Self {
        // Negative status codes are sign-extended to the full register width.
        Self::from(i64::from(value))
    }
}

macro_rules! smc_return_from_array {
    ($length:literal) => {
        impl From<[u64; $length]> for SmcReturn {
            fn from(value: [u64; $length]) -> Self {
                let mut values = [0; Self::MAX_VALUES];
                values[..$length].copy_from_slice(&value);
                Self {
                    used: $length,
                    values,
                }
            }
        }
    };
}

smc_return_from_array!(1);
smc_return_from_array!(2);
smc_return_from_array!(3);
smc_return_from_array!(4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_id_fields() {
        let function = FunctionId(0xC400_0061);
        assert_eq!(function.call_type(), SmcccCallType::Fast64);
        assert_eq!(function.oen(), OwningEntityNumber::STANDARD_SECURE);
        assert_eq!(function.number(), 0x61);
        assert!(function.valid());

        let function = FunctionId(0x8400_0041);
        assert_eq!(function.call_type(), SmcccCallType::Fast32);
        assert_eq!(function.number(), 0x41);
    }

    #[test]
    fn function_id_new_matches_raw() {
        assert_eq!(
            FunctionId::new(
                SmcccCallType::Fast64,
                OwningEntityNumber::STANDARD_SECURE,
                0x65
            ),
            FunctionId(0xC400_0065)
        );
        assert_eq!(
            FunctionId::new(
                SmcccCallType::Fast32,
                OwningEntityNumber::STANDARD_SECURE,
                0x41
            ),
            FunctionId(0x8400_0041)
        );
    }

    #[test]
    fn reserved_bits_invalidate_fast_calls() {
        assert!(!FunctionId(0xC400_0061 | (1 << 17)).valid());
        // Yielding calls don't reserve those bits.
        assert!(FunctionId(0x0402_0061).valid());
    }

    #[test]
    fn sve_hint_is_cleared() {
        let mut function = FunctionId(0xC400_0041);
        function.set_sve_hint();
        assert_ne!(function, FunctionId(0xC400_0041));
        function.clear_sve_hint();
        assert_eq!(function, FunctionId(0xC400_0041));
    }

    #[test]
    fn not_supported_is_sign_extended() {
        assert_eq!(SmcReturn::from(NOT_SUPPORTED).values(), [u64::MAX]);
        assert_eq!(SmcReturn::from(0i32).values(), [0]);
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", SmcReturn::EMPTY), "SmcReturn([])");
        assert_eq!(
            format!("{:?}", SmcReturn::from([1, 0x20])),
            "SmcReturn([0x1, 0x20])"
        );
        assert_eq!(
            format!("{:?}", FunctionId(0xC400_0041)),
            "0xc4000041 (Fast64 OEN 4)"
        );
    }
}
