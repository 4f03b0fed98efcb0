// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Saved lower EL state for each world, and the bookkeeping of which world's state is currently
//! live in the hardware registers.

use crate::{exceptions::LowerEl, smccc::SmcReturn};
#[cfg(any(test, target_arch = "aarch64"))]
use arm_sysregs::{
    read_actlr_el1, read_afsr0_el1, read_afsr1_el1, read_amair_el1, read_contextidr_el1,
    read_cpacr_el1, read_csselr_el1, read_elr_el1, read_esr_el1, read_far_el1, read_mair_el1,
    read_mdccint_el1, read_mdscr_el1, read_par_el1, read_sctlr_el1, read_sp_el1, read_spsr_el1,
    read_tcr_el1, read_tpidr_el0, read_tpidr_el1, read_tpidrro_el0, read_ttbr0_el1, read_ttbr1_el1,
    read_vbar_el1, write_actlr_el1, write_afsr0_el1, write_afsr1_el1, write_amair_el1,
    write_contextidr_el1, write_cpacr_el1, write_csselr_el1, write_elr_el1, write_esr_el1,
    write_far_el1, write_mair_el1, write_mdccint_el1, write_mdscr_el1, write_par_el1,
    write_sctlr_el1, write_sp_el1, write_spsr_el1, write_tcr_el1, write_tpidr_el0, write_tpidr_el1,
    write_tpidrro_el0, write_ttbr0_el1, write_ttbr1_el1, write_vbar_el1,
};
use arm_sysregs::{Esr, ScrEl3, SctlrEl1, Spsr};
use bitflags::bitflags;
use core::ops::{Index, IndexMut};
use log::trace;

/// The number of contexts kept by the store, one per security state.
const CONTEXT_NUM: usize = 2;

/// SCTLR_EL1.EE: endianness of data accesses at EL1.
pub(crate) const SCTLR_EL1_EE: u64 = 1 << 25;
/// SCTLR_EL1.E0E: endianness of data accesses at EL0.
pub(crate) const SCTLR_EL1_E0E: u64 = 1 << 24;

/// A security state which a lower EL can run in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum World {
    /// Secure world, where the secure partition runs.
    Secure = 0,
    /// Normal world.
    NonSecure = 1,
}

impl World {
    fn index(self) -> usize {
        self as usize
    }
}

/// An array with one `T` for each world.
#[derive(Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct PerWorld<T>([T; CONTEXT_NUM]);

impl<T> Index<World> for PerWorld<T> {
    type Output = T;

    fn index(&self, world: World) -> &Self::Output {
        &self.0[world.index()]
    }
}

impl<T> IndexMut<World> for PerWorld<T> {
    fn index_mut(&mut self, world: World) -> &mut Self::Output {
        &mut self.0[world.index()]
    }
}

/// The state of a core at the next lower EL in a given security state.
#[derive(Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct CpuContext {
    /// General purpose registers, as they were when the lower EL trapped to EL3.
    pub gpregs: GpRegs,
    /// Registers programmed by EL3 for the exception return into this world.
    pub el3_state: El3State,
    /// The lower EL system registers, valid whenever the world is not resident.
    pub el1_sysregs: El1Sysregs,
}

impl CpuContext {
    const EMPTY: Self = Self {
        gpregs: GpRegs::EMPTY,
        el3_state: El3State::EMPTY,
        el1_sysregs: El1Sysregs::EMPTY,
    };
}

/// AArch64 general purpose register context structure. Usually x0-x18 and lr are saved as the
/// compiler is expected to preserve the remaining callee saved registers if needed and the assembly
/// code does not touch the remaining. But in case of world switch during exception handling,
/// we need to save the callee registers too.
#[derive(Clone, Debug, Eq, PartialEq)]
#[repr(C, align(16))]
pub struct GpRegs {
    /// x0-x30 followed by SP_EL0.
    pub registers: [u64; Self::COUNT],
}

impl GpRegs {
    /// The number of (64-bit) registers included in `GpRegs`.
    pub const COUNT: usize = 32;

    const EMPTY: Self = Self {
        registers: [0; Self::COUNT],
    };

    /// Writes the given return value to the general-purpose registers.
    pub fn write_return_value(&mut self, value: &SmcReturn) {
        for (i, value) in value.values().iter().enumerate() {
            self.registers[i] = *value;
        }
    }
}

/// Registers used by EL3 firmware for the exception return into a lower EL.
#[derive(Clone, Debug, Eq, PartialEq)]
#[repr(C, align(16))]
pub struct El3State {
    /// Secure configuration to use while the world runs.
    pub scr_el3: ScrEl3,
    /// PSTATE to restore on exception return.
    pub spsr_el3: Spsr,
    /// Address to return to.
    pub elr_el3: usize,
}

impl El3State {
    const EMPTY: Self = Self {
        scr_el3: ScrEl3::empty(),
        spsr_el3: Spsr::empty(),
        elr_el3: 0,
    };
}

/// AArch64 EL1 system register context structure for preserving the architectural state during
/// world switches.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub struct El1Sysregs {
    pub spsr_el1: Spsr,
    pub elr_el1: usize,
    pub sctlr_el1: SctlrEl1,
    pub tcr_el1: u64,
    pub cpacr_el1: u64,
    pub csselr_el1: u64,
    pub sp_el1: u64,
    pub esr_el1: Esr,
    pub ttbr0_el1: u64,
    pub ttbr1_el1: u64,
    pub mair_el1: u64,
    pub amair_el1: u64,
    pub actlr_el1: u64,
    pub tpidr_el1: u64,
    pub tpidr_el0: u64,
    pub tpidrro_el0: u64,
    pub par_el1: u64,
    pub far_el1: u64,
    pub afsr0_el1: u64,
    pub afsr1_el1: u64,
    pub contextidr_el1: u64,
    pub vbar_el1: usize,
    pub mdccint_el1: u64,
    pub mdscr_el1: u64,
}

impl Default for El1Sysregs {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl El1Sysregs {
    /// All registers zeroed.
    pub const EMPTY: Self = Self {
        spsr_el1: Spsr::empty(),
        elr_el1: 0,
        sctlr_el1: SctlrEl1::empty(),
        tcr_el1: 0,
        cpacr_el1: 0,
        csselr_el1: 0,
        sp_el1: 0,
        esr_el1: Esr::empty(),
        ttbr0_el1: 0,
        ttbr1_el1: 0,
        mair_el1: 0,
        amair_el1: 0,
        actlr_el1: 0,
        tpidr_el1: 0,
        tpidr_el0: 0,
        tpidrro_el0: 0,
        par_el1: 0,
        far_el1: 0,
        afsr0_el1: 0,
        afsr1_el1: 0,
        contextidr_el1: 0,
        vbar_el1: 0,
        mdccint_el1: 0,
        mdscr_el1: 0,
    };

    /// Reads the current values from the system registers to save them.
    #[cfg(any(test, target_arch = "aarch64"))]
    pub fn save(&mut self) {
        self.spsr_el1 = read_spsr_el1();
        self.elr_el1 = read_elr_el1();
        self.sctlr_el1 = read_sctlr_el1();
        self.tcr_el1 = read_tcr_el1();
        self.cpacr_el1 = read_cpacr_el1();
        self.csselr_el1 = read_csselr_el1();
        self.sp_el1 = read_sp_el1();
        self.esr_el1 = read_esr_el1();
        self.ttbr0_el1 = read_ttbr0_el1();
        self.ttbr1_el1 = read_ttbr1_el1();
        self.mair_el1 = read_mair_el1();
        self.amair_el1 = read_amair_el1();
        self.actlr_el1 = read_actlr_el1();
        self.tpidr_el1 = read_tpidr_el1();
        self.tpidr_el0 = read_tpidr_el0();
        self.tpidrro_el0 = read_tpidrro_el0();
        self.par_el1 = read_par_el1();
        self.far_el1 = read_far_el1();
        self.afsr0_el1 = read_afsr0_el1();
        self.afsr1_el1 = read_afsr1_el1();
        self.contextidr_el1 = read_contextidr_el1();
        self.vbar_el1 = read_vbar_el1();
        self.mdccint_el1 = read_mdccint_el1();
        self.mdscr_el1 = read_mdscr_el1();
    }

    /// Writes the saved register values to the system registers.
    #[cfg(any(test, target_arch = "aarch64"))]
    pub fn restore(&self) {
        write_spsr_el1(self.spsr_el1);
        write_elr_el1(self.elr_el1);
        write_sctlr_el1(self.sctlr_el1);
        write_tcr_el1(self.tcr_el1);
        write_cpacr_el1(self.cpacr_el1);
        write_csselr_el1(self.csselr_el1);
        write_sp_el1(self.sp_el1);
        write_esr_el1(self.esr_el1);
        write_ttbr0_el1(self.ttbr0_el1);
        write_ttbr1_el1(self.ttbr1_el1);
        write_mair_el1(self.mair_el1);
        write_amair_el1(self.amair_el1);
        write_actlr_el1(self.actlr_el1);
        write_tpidr_el1(self.tpidr_el1);
        write_tpidr_el0(self.tpidr_el0);
        write_tpidrro_el0(self.tpidrro_el0);
        write_par_el1(self.par_el1);
        write_far_el1(self.far_el1);
        write_afsr0_el1(self.afsr0_el1);
        write_afsr1_el1(self.afsr1_el1);
        write_contextidr_el1(self.contextidr_el1);
        write_vbar_el1(self.vbar_el1);
        write_mdccint_el1(self.mdccint_el1);
        write_mdscr_el1(self.mdscr_el1);
    }
}

bitflags! {
    /// Attributes of an entry point, as passed between boot stages.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct EntryPointAttributes: u32 {
        /// The image runs in Non-secure state. Absent for Secure images.
        const NON_SECURE = 1 << 0;
        /// Data accesses of the image are big-endian.
        const EE_BIG = 1 << 1;
        /// The image may access the secure timer registers.
        const ST_ENABLE = 1 << 2;
    }
}

impl EntryPointAttributes {
    /// Attributes for a Secure image.
    pub const SECURE: Self = Self::empty();

    /// Returns the world the image runs in.
    pub fn security_state(self) -> World {
        if self.contains(Self::NON_SECURE) {
            World::NonSecure
        } else {
            World::Secure
        }
    }
}

/// Information about the entry point for a lower EL image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryPointInfo {
    /// The entry point address.
    pub pc: usize,
    /// The `spsr_el3` value to set before `eret`, to set the appropriate PSTATE.
    pub spsr: Spsr,
    /// Security state, endianness and timer access of the image.
    pub attributes: EntryPointAttributes,
    /// Boot arguments to pass in `x0`-`x7`.
    pub args: [u64; 8],
}

/// Identifies the context registered for a world when the handle was taken.
///
/// Re-initialising a world's context invalidates any handles taken before.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ContextHandle {
    world: World,
    generation: u32,
}

impl ContextHandle {
    /// Returns the world whose context this refers to.
    pub fn world(self) -> World {
        self.world
    }
}

/// The saved state of both worlds on this core.
///
/// At most one world's lower EL system registers are live in hardware at a time. A world's context
/// must be saved before another world's context is restored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContextStore {
    contexts: PerWorld<CpuContext>,
    generations: PerWorld<u32>,
    resident: Option<World>,
    next_eret: Option<World>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    /// Creates a store with empty contexts and no world resident.
    pub const fn new() -> Self {
        Self {
            contexts: PerWorld([CpuContext::EMPTY, CpuContext::EMPTY]),
            generations: PerWorld([0, 0]),
            resident: None,
            next_eret: None,
        }
    }

    /// Returns a handle to the context currently registered for the given world.
    pub fn handle(&self, world: World) -> ContextHandle {
        ContextHandle {
            world,
            generation: self.generations[world],
        }
    }

    /// Returns the saved context of the given world.
    pub fn context(&self, world: World) -> &CpuContext {
        &self.contexts[world]
    }

    /// Returns the saved context of the given world, for modification.
    pub fn context_mut(&mut self, world: World) -> &mut CpuContext {
        &mut self.contexts[world]
    }

    /// Returns the world whose lower EL system registers are currently live, if any.
    pub fn resident(&self) -> Option<World> {
        self.resident
    }

    /// Initialises the context for the world the entry point targets, ready for its first entry.
    ///
    /// This registers a new context for the world, so previously taken handles for it become
    /// stale.
    pub fn init_context(&mut self, entry_point: &EntryPointInfo) -> ContextHandle {
        let world = entry_point.attributes.security_state();
        let context = &mut self.contexts[world];
        *context = CpuContext::EMPTY;

        context.el3_state.elr_el3 = entry_point.pc;
        context.el3_state.spsr_el3 = entry_point.spsr;
        context.gpregs.registers[..entry_point.args.len()].copy_from_slice(&entry_point.args);

        // SCR_EL3.SIF: Set to one to disable instruction fetches from Non-secure memory.
        // SCR_EL3.EA: Set to one to route External Aborts and SError Interrupts to EL3.
        // SCR_EL3.RW: The next lower EL is AArch64.
        context.el3_state.scr_el3 = ScrEl3::RES1 | ScrEl3::EA | ScrEl3::SIF | ScrEl3::RW;
        match world {
            World::NonSecure => context.el3_state.scr_el3 |= ScrEl3::NS | ScrEl3::HCE,
            World::Secure => {}
        }
        if entry_point.attributes.contains(EntryPointAttributes::ST_ENABLE) {
            // Enable lower EL access to the secure timer registers. Otherwise they would be
            // accessible only at EL3.
            context.el3_state.scr_el3 |= ScrEl3::ST;
        }

        context.el1_sysregs.sctlr_el1 = SctlrEl1::RES1;
        if entry_point.attributes.contains(EntryPointAttributes::EE_BIG) {
            context.el1_sysregs.sctlr_el1 |=
                SctlrEl1::from_bits_retain(SCTLR_EL1_EE | SCTLR_EL1_E0E);
        }

        self.generations[world] = self.generations[world].wrapping_add(1);
        trace!("Initialised {world:?} context, entry point {:#x}", entry_point.pc);
        self.handle(world)
    }

    fn check_handle(&self, handle: ContextHandle) {
        assert_eq!(
            handle,
            self.handle(handle.world),
            "Stale context handle for {:?}",
            handle.world
        );
    }

    /// Saves the live lower EL system registers into the context the handle refers to.
    ///
    /// Panics if the handle is stale or the world isn't resident.
    pub fn save(&mut self, handle: ContextHandle, lower_el: &mut impl LowerEl) {
        self.check_handle(handle);
        let world = handle.world;
        assert_eq!(
            self.resident,
            Some(world),
            "Saving {world:?} context which is not resident"
        );
        lower_el.save_el1_sysregs(&mut self.contexts[world].el1_sysregs);
        self.resident = None;
    }

    /// Installs the saved lower EL system registers of the context the handle refers to.
    ///
    /// Panics if the handle is stale or another world is still resident.
    pub fn restore(&mut self, handle: ContextHandle, lower_el: &mut impl LowerEl) {
        self.check_handle(handle);
        let world = handle.world;
        assert_eq!(
            self.resident, None,
            "Restoring {world:?} context over a resident context"
        );
        lower_el.restore_el1_sysregs(&self.contexts[world].el1_sysregs);
        self.resident = Some(world);
    }

    /// Saves lower EL system registers of one world and restores those of the other, which is
    /// then the one to resume on the next exception return.
    pub fn switch_world(
        &mut self,
        from: ContextHandle,
        to: ContextHandle,
        lower_el: &mut impl LowerEl,
    ) {
        assert_ne!(from.world, to.world);
        self.save(from, lower_el);
        self.restore(to, lower_el);
        self.set_next_eret_context(to.world);
    }

    /// Marks the world to be entered on the next exception return.
    pub fn set_next_eret_context(&mut self, world: World) {
        self.next_eret = Some(world);
    }

    /// Returns the world to be entered on the next exception return, if one has been chosen.
    pub fn next_eret_context(&self) -> Option<World> {
        self.next_eret
    }

    /// Sets the return address and PSTATE for the next exception return into the given world.
    pub fn set_elr_spsr_el3(&mut self, world: World, elr: usize, spsr: Spsr) {
        let el3_state = &mut self.contexts[world].el3_state;
        el3_state.elr_el3 = elr;
        el3_state.spsr_el3 = spsr;
    }
}
