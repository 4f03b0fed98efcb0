// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

pub mod spm;

use crate::{
    context::{ContextHandle, ContextStore, World},
    exceptions::RunResult,
    platform::Platform,
    smccc::{FunctionId, NOT_SUPPORTED, SmcReturn},
};
use log::{debug, info, trace, warn};

/// Helper macro to define the range of SMC function ID values covered by a service
macro_rules! owns {
    // service handles the entire Owning Entity Number (OEN)
    ($owning_entity:expr) => {
        #[inline(always)]
        fn owns(&self, function: $crate::smccc::FunctionId) -> bool {
            function.oen() == $owning_entity
                && matches!(
                    function.call_type(),
                    $crate::smccc::SmcccCallType::Fast32 | $crate::smccc::SmcccCallType::Fast64
                )
        }
    };
    // service handles a sub-range of the OEN
    // range refers to the lower 16 bits [15:0] of the SMC FunctionId
    ($owning_entity:expr, $range:expr) => {
        #[inline(always)]
        fn owns(&self, function: $crate::smccc::FunctionId) -> bool {
            function.oen() == $owning_entity
                && $range.contains(&function.number())
                && matches!(
                    function.call_type(),
                    $crate::smccc::SmcccCallType::Fast32 | $crate::smccc::SmcccCallType::Fast64
                )
        }
    };
}
pub(crate) use owns;

/// An SMC trapped from a lower EL, decoded from the caller's saved registers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SmcCall {
    /// The world which made the call.
    pub origin: World,
    /// The function ID from `x0`, with the SVE hint cleared.
    pub function: FunctionId,
    /// Arguments from `x1`-`x4`.
    pub args: [u64; 4],
    /// The context the caller's registers were saved into.
    pub frame: ContextHandle,
}

/// What to do after an SMC has been handled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resume {
    /// Write the return value to the given world's registers, and enter it next. The world must
    /// already have been chosen for the next exception return.
    World(World, SmcReturn),
    /// Return the value to the EL3 code blocked in a synchronous entry into a lower EL.
    SynchronousCaller(u64),
}

/// A service which handles some range of SMC calls.
///
/// According to SMCCC v1.3+ the implementation must disregard the SVE hint bit in the function ID
/// and consider it to be 0 for the purpose of function identification.
pub trait Service {
    /// Returns whether this service is intended to handle the given function ID.
    fn owns(&self, function: FunctionId) -> bool;

    /// Handles the given SMC call from Normal World.
    fn handle_non_secure_smc(
        &mut self,
        _call: &SmcCall,
        _store: &mut ContextStore,
        _platform: &mut impl Platform,
    ) -> Resume {
        Resume::World(World::NonSecure, NOT_SUPPORTED.into())
    }

    /// Handles the given SMC call from Secure World.
    fn handle_secure_smc(
        &mut self,
        _call: &SmcCall,
        _store: &mut ContextStore,
        _platform: &mut impl Platform,
    ) -> Resume {
        Resume::World(World::Secure, NOT_SUPPORTED.into())
    }
}

/// The EL3 runtime: the saved state of both worlds, and the services which handle their SMCs.
pub struct Services<P: Platform> {
    platform: P,
    store: ContextStore,
    /// Absent if there is no usable secure partition.
    spm: Option<spm::Spm>,
    /// Run once from [`Services::boot`], before Normal World is entered.
    bl32_init: Option<fn(&mut Self) -> i32>,
}

impl<P: Platform> Services<P> {
    /// Creates the runtime with the Normal World context initialised from the platform's entry
    /// point.
    pub fn new(platform: P) -> Self {
        let mut store = ContextStore::new();
        let non_secure_entry_point = platform.non_secure_entry_point();
        let handle = store.init_context(&non_secure_entry_point);
        assert_eq!(
            handle.world(),
            World::NonSecure,
            "Normal World entry point is not Non-secure"
        );

        Self {
            platform,
            store,
            spm: None,
            bl32_init: None,
        }
    }

    /// Sets up the runtime services.
    ///
    /// If the secure partition can't be set up the runtime carries on without it, and all SPM calls
    /// are reported as not supported.
    pub fn init(&mut self) -> Result<(), spm::SetupError> {
        spm::setup(self).inspect_err(|e| warn!("{e}"))
    }

    /// Returns the platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns the saved state of both worlds.
    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Registers the function which initialises the secure payload.
    fn register_bl32_init(&mut self, init: fn(&mut Self) -> i32) {
        self.bl32_init = Some(init);
    }

    /// Runs the deferred secure payload initialisation, then prepares Normal World for its first
    /// entry.
    pub fn boot(&mut self) {
        if let Some(bl32_init) = self.bl32_init.take() {
            info!("Initialising BL32");
            let rc = bl32_init(self);
            debug!("BL32 initialisation returned {rc}");
        }

        info!("Preparing for Normal World entry");
        let non_secure = self.store.handle(World::NonSecure);
        self.store.restore(non_secure, &mut self.platform);
        self.store.set_next_eret_context(World::NonSecure);
    }

    fn handle_smc(&mut self, world: World) -> Resume {
        let regs = &self.store.context(world).gpregs.registers;
        let mut function = FunctionId(regs[0] as u32);
        function.clear_sve_hint();
        let call = SmcCall {
            origin: world,
            function,
            args: [regs[1], regs[2], regs[3], regs[4]],
            frame: self.store.handle(world),
        };

        if !function.valid() {
            warn!("Invalid SMC function ID {function:?} from {world:?}");
            return Resume::World(world, NOT_SUPPORTED.into());
        }

        match &mut self.spm {
            Some(spm) if spm.owns(function) => match world {
                World::NonSecure => {
                    spm.handle_non_secure_smc(&call, &mut self.store, &mut self.platform)
                }
                World::Secure => spm.handle_secure_smc(&call, &mut self.store, &mut self.platform),
            },
            _ => {
                warn!("Unknown SMC {function:?} from {world:?}");
                Resume::World(world, NOT_SUPPORTED.into())
            }
        }
    }

    /// Enters the world chosen for the next exception return once, and handles the reason it
    /// returned to EL3.
    ///
    /// Returns the completion value if a handler took the synchronous exit path.
    fn step(&mut self) -> Option<u64> {
        let Some(world) = self.store.next_eret_context() else {
            panic!("No world chosen for the next exception return");
        };
        assert_eq!(
            self.store.resident(),
            Some(world),
            "Entering {world:?} without its context installed"
        );

        let resume = match self
            .platform
            .enter_world(world, self.store.context_mut(world))
        {
            RunResult::Smc => self.handle_smc(world),
            RunResult::Interrupt => {
                // No interrupts are routed to EL3 for handling, so resume where we came from.
                debug!("Spurious interrupt from {world:?}");
                Resume::World(world, SmcReturn::EMPTY)
            }
        };

        match resume {
            Resume::World(next_world, regs) => {
                assert_eq!(
                    self.store.next_eret_context(),
                    Some(next_world),
                    "Returning to {next_world:?} which isn't next to run"
                );
                trace!("Returning {regs:?} to {next_world:?}");
                self.store
                    .context_mut(next_world)
                    .gpregs
                    .write_return_value(&regs);
                None
            }
            Resume::SynchronousCaller(value) => Some(value),
        }
    }

    /// The main runtime loop.
    ///
    /// Continuously enters the lower EL chosen for the next exception return and processes the
    /// results when it returns to EL3. This should be called after [`Services::boot`], as the last
    /// step of the boot process.
    pub fn run_loop(&mut self) -> ! {
        info!("Booting Normal World");
        loop {
            if let Some(value) = self.step() {
                panic!("Synchronous exit with {value:#x} but no caller is waiting");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pagetable::PAGE_SIZE,
        platform::test::{LowerElExit, NON_SECURE_ENTRY_POINT, TestPlatform, init_logger},
        services::spm::SpmFunction,
        smccc::{OwningEntityNumber, SmcccCallType},
    };

    const COMMUNICATE: u64 = SpmFunction::CommunicateAarch64 as u64;
    const COMPLETE: u64 = SpmFunction::EventCompleteAarch64 as u64;
    const MEMORY_ATTRIBUTES_SET: u64 = SpmFunction::MemoryAttributesSetAarch64 as u64;

    fn without_partition() -> Services<TestPlatform> {
        init_logger();
        let mut platform = TestPlatform::new();
        platform.secure_partition = None;
        let mut services = Services::new(platform);
        assert_eq!(services.init().unwrap_err().status(), 1);
        services.boot();
        services
    }

    #[test]
    fn boot_without_partition_enters_normal_world() {
        let services = without_partition();

        assert_eq!(services.store().next_eret_context(), Some(World::NonSecure));
        assert_eq!(services.store().resident(), Some(World::NonSecure));
        assert!(services.platform().entries.is_empty());
        assert_eq!(
            services.store().context(World::NonSecure).el3_state.elr_el3,
            NON_SECURE_ENTRY_POINT
        );
    }

    #[test]
    fn all_spm_calls_unknown_without_partition() {
        let mut services = without_partition();
        let calls = [
            [COMMUNICATE, 0, 5, 9, 0],
            [COMPLETE, 0, 0, 0, 0],
            [MEMORY_ATTRIBUTES_SET, 0x4000_0000, 4, 0b101, 0],
        ];
        for regs in calls {
            services.platform.push_non_secure_smc(regs);
        }

        for _ in calls {
            assert_eq!(services.step(), None);
            assert_eq!(services.store.next_eret_context(), Some(World::NonSecure));
            assert_eq!(
                services.store.context(World::NonSecure).gpregs.registers[0],
                NOT_SUPPORTED as i64 as u64
            );
        }
        assert!(services.platform.mem_attribute_requests.is_empty());
        assert!(
            services
                .platform
                .entries
                .iter()
                .all(|entry| entry.world == World::NonSecure)
        );
    }

    fn booted() -> Services<TestPlatform> {
        init_logger();
        let mut services = Services::new(TestPlatform::new());
        services.init().unwrap();
        services.platform.push_secure_smc([COMPLETE, 0, 0, 0, 0]);
        services.boot();
        services
    }

    #[test]
    fn unknown_function_ids() {
        let mut services = booted();

        for function in [
            // Not owned by the SPM.
            0x8400_0000,
            0xC500_0041,
            FunctionId::new(
                SmcccCallType::Yielding,
                OwningEntityNumber::STANDARD_SECURE,
                0x41,
            )
            .0,
            // Reserved bits set.
            0xC400_0041 | (1 << 20),
            // Owned by the SPM but not implemented.
            0xC400_0050,
        ] {
            services.store.context_mut(World::NonSecure).gpregs.registers[..4]
                .copy_from_slice(&[u64::from(function), 1, 2, 3]);
            let store_before = services.store.clone();

            assert_eq!(
                services.handle_smc(World::NonSecure),
                Resume::World(World::NonSecure, NOT_SUPPORTED.into())
            );
            assert_eq!(services.store, store_before);
        }
    }

    #[test]
    fn sve_hint_is_ignored() {
        let mut services = booted();

        let mut function = FunctionId(COMMUNICATE as u32);
        function.set_sve_hint();
        services
            .platform
            .push_non_secure_smc([function.0.into(), 0, 3, 4, 0]);

        assert_eq!(services.step(), None);
        assert_eq!(services.store.next_eret_context(), Some(World::Secure));
        assert_eq!(
            services.store.context(World::Secure).gpregs.registers[..3],
            [COMMUNICATE, 3, 4]
        );
    }

    #[test]
    fn interrupt_resumes_same_world() {
        let mut services = without_partition();
        services.platform.push(LowerElExit::Interrupt {
            world: World::NonSecure,
        });
        let store_before = services.store.clone();

        assert_eq!(services.step(), None);
        assert_eq!(services.store, store_before);
    }

    #[test]
    fn full_round_trip() {
        let mut services = booted();
        services.platform.core = 1;
        services
            .platform
            .push_non_secure_smc([COMMUNICATE, 0, 0x10, 0x20, 0]);
        services
            .platform
            .push_secure_smc([MEMORY_ATTRIBUTES_SET, 0x4030_0000, 1, 0b011, 0]);
        services.platform.push_secure_smc([COMPLETE, 7, 0, 0, 0]);
        for _ in 0..3 {
            assert_eq!(services.step(), None);
        }

        let entries = &services.platform.entries;
        // Bootstrap, then Normal World, then the partition twice.
        assert_eq!(
            entries.iter().map(|entry| entry.world).collect::<Vec<_>>(),
            [
                World::Secure,
                World::NonSecure,
                World::Secure,
                World::Secure
            ]
        );
        assert_eq!(entries[2].regs, [COMMUNICATE, 0x10, 0x20, 1]);
        assert_eq!(entries[3].regs[0], 0);
        assert_eq!(
            services.platform.mem_attribute_requests[0].1,
            PAGE_SIZE
        );
        assert_eq!(services.store.next_eret_context(), Some(World::NonSecure));
        assert_eq!(
            services.store.context(World::NonSecure).gpregs.registers[0],
            7
        );
    }

    #[test]
    #[should_panic(expected = "No world chosen for the next exception return")]
    fn step_before_boot_panics() {
        init_logger();
        let mut services = Services::new(TestPlatform::new());
        services.step();
    }
}
