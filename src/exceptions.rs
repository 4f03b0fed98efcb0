// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The seam between EL3 and the lower ELs: live system register access and world entry.

use crate::context::{CpuContext, El1Sysregs, World};
#[cfg(any(test, target_arch = "aarch64"))]
use arm_sysregs::read_sctlr_el3;

/// SCTLR_EL3.EE: endianness of data accesses at EL3.
#[cfg(any(test, target_arch = "aarch64"))]
const SCTLR_EL3_EE: u64 = 1 << 25;

/// Describes the reason why execution returned to EL3 after running a lower EL.
#[derive(Debug, Eq, PartialEq)]
pub enum RunResult {
    /// A lower EL has executed an SMC instruction. The arguments are in the general purpose
    /// registers of the world's context.
    Smc,
    /// An IRQ or FIQ routed to EL3 has been triggered while running in a lower EL.
    Interrupt,
}

impl RunResult {
    /// Value of the return reason register for [`RunResult::Smc`].
    pub const SMC: u64 = 0;
    /// Value of the return reason register for [`RunResult::Interrupt`].
    pub const INTERRUPT: u64 = 1;

    /// Decodes the return reason reported by the exception return trampoline.
    pub fn from_reason(reason: u64) -> Self {
        match reason {
            Self::SMC => Self::Smc,
            Self::INTERRUPT => Self::Interrupt,
            r => panic!("unhandled enter world result: {r}"),
        }
    }
}

/// Access to the lower EL of the current core.
///
/// The lower EL system registers hold the state of at most one world at a time; callers are
/// responsible for saving and restoring them around world switches.
pub trait LowerEl {
    /// Reads the live lower EL system registers into `regs`.
    fn save_el1_sysregs(&mut self, regs: &mut El1Sysregs);

    /// Writes `regs` to the live lower EL system registers.
    fn restore_el1_sysregs(&mut self, regs: &El1Sysregs);

    /// Returns whether EL3 data accesses are big-endian.
    fn el3_big_endian(&self) -> bool;

    /// Enters a lower EL in the specified world.
    ///
    /// Exits EL3 by ERET using the EL3 state and general purpose registers from `context`. After
    /// execution returns to EL3 by any exception, the general purpose registers of the lower EL are
    /// written back to `context` and the reason for returning is reported.
    fn enter_world(&mut self, world: World, context: &mut CpuContext) -> RunResult;
}

/// Implementation of the system register parts of [`LowerEl`] on real hardware.
///
/// Platforms delegate to this and provide the exception return trampoline themselves.
#[cfg(any(test, target_arch = "aarch64"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct LiveSysregs;

#[cfg(any(test, target_arch = "aarch64"))]
impl LiveSysregs {
    /// Reads the live lower EL system registers into `regs`.
    pub fn save_el1_sysregs(self, regs: &mut El1Sysregs) {
        regs.save();
    }

    /// Writes `regs` to the live lower EL system registers.
    pub fn restore_el1_sysregs(self, regs: &El1Sysregs) {
        regs.restore();
    }

    /// Returns whether SCTLR_EL3.EE is set.
    pub fn el3_big_endian(self) -> bool {
        read_sctlr_el3().bits() & SCTLR_EL3_EE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arm_sysregs::{SctlrEl3, fake::SYSREGS};

    #[test]
    fn run_result_from_reason() {
        assert_eq!(RunResult::from_reason(RunResult::SMC), RunResult::Smc);
        assert_eq!(
            RunResult::from_reason(RunResult::INTERRUPT),
            RunResult::Interrupt
        );
    }

    #[test]
    #[should_panic(expected = "unhandled enter world result: 7")]
    fn run_result_unknown_reason() {
        RunResult::from_reason(7);
    }

    #[test]
    fn live_endianness() {
        SYSREGS.lock().unwrap().sctlr_el3 = SctlrEl3::from_bits_retain(SCTLR_EL3_EE);
        assert!(LiveSysregs.el3_big_endian());
        SYSREGS.lock().unwrap().sctlr_el3 = SctlrEl3::empty();
        assert!(!LiveSysregs.el3_big_endian());
    }
}
