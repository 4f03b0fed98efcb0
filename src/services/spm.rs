// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Secure Partition Manager dispatcher for a single S-EL0 secure partition.

mod bridge;
mod memory_attributes;

use bridge::SyncBridge;
use memory_attributes::RequestedAttributes;

use crate::{
    context::{ContextHandle, ContextStore, EntryPointAttributes, EntryPointInfo, World},
    pagetable::{MemoryAttributes, PAGE_SIZE},
    platform::Platform,
    services::{Resume, Service, Services, SmcCall, owns},
    smccc::{INVALID_PARAMETER, NOT_SUPPORTED, OwningEntityNumber},
};
use arm_sysregs::Spsr;
use log::{debug, info, trace, warn};
use num_enum::TryFromPrimitive;
use thiserror::Error;

const FUNCTION_NUMBER_MIN: u16 = 0x0040;
const FUNCTION_NUMBER_MAX: u16 = 0x007F;

/// PSTATE for the first entry into the partition: AArch64 EL0 using SP_EL0, with debug, SError,
/// IRQ and FIQ exceptions masked.
const SECURE_PARTITION_SPSR: Spsr = Spsr::D.union(Spsr::A).union(Spsr::I).union(Spsr::F);

/// Function IDs handled by the SPM.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum SpmFunction {
    /// Normal world request to the partition, SMC32 calling convention.
    CommunicateAarch32 = 0x8400_0041,
    /// Normal world request to the partition, SMC64 calling convention.
    CommunicateAarch64 = 0xC400_0041,
    /// The partition has finished handling the current event.
    EventCompleteAarch64 = 0xC400_0061,
    /// The partition asks to change the attributes of part of its address space.
    MemoryAttributesSetAarch64 = 0xC400_0065,
}

/// Reasons why the secure partition can't be set up. SPM calls are not supported afterwards.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SetupError {
    /// The boot loader didn't provide an entry point for the secure partition.
    #[error(
        "No SPM provided by the boot loader, booting without SPM. SPM calls will return NOT_SUPPORTED"
    )]
    MissingEntryPoint,
    /// The secure partition's entry point address is zero.
    #[error("Secure partition entry point is null, booting without SPM")]
    NullEntryPoint,
}

impl SetupError {
    /// Returns the status reported to the runtime service framework.
    pub fn status(self) -> i32 {
        match self {
            Self::MissingEntryPoint | Self::NullEntryPoint => 1,
        }
    }
}

/// State of the SPM dispatcher.
#[derive(Debug)]
pub struct Spm {
    /// The context registered for the partition during setup.
    secure_context: ContextHandle,
    bridge: SyncBridge,
    init_in_progress: bool,
}

impl Spm {
    fn new(secure_context: ContextHandle) -> Self {
        Self {
            secure_context,
            bridge: SyncBridge::new(),
            init_in_progress: false,
        }
    }

    /// Returns whether the partition's bootstrap entry is still running.
    pub fn init_in_progress(&self) -> bool {
        self.init_in_progress
    }

    /// Replaces the S-EL1 re-entry information in the partition's context with S-EL0 re-entry
    /// information, so that the next entry resumes just after the SMC the partition made.
    fn setup_next_eret_into_sel0(&self, store: &mut ContextStore) {
        assert_eq!(store.handle(World::Secure), self.secure_context);
        let el1_sysregs = &store.context(World::Secure).el1_sysregs;
        let (elr_el1, spsr_el1) = (el1_sysregs.elr_el1, el1_sysregs.spsr_el1);
        store.set_elr_spsr_el3(World::Secure, elr_el1, spsr_el1);
    }

    fn event_complete(
        &mut self,
        call: &SmcCall,
        store: &mut ContextStore,
        platform: &mut impl Platform,
    ) -> Resume {
        assert_eq!(
            call.frame, self.secure_context,
            "Completion signalled from a context other than the secure partition's"
        );
        let value = call.args[0];

        let resume = if self.init_in_progress {
            self.init_in_progress = false;
            self.bridge.exit(store, platform, value)
        } else {
            let non_secure = store.handle(World::NonSecure);
            store.switch_world(self.secure_context, non_secure, platform);
            Resume::World(World::NonSecure, value.into())
        };
        self.setup_next_eret_into_sel0(store);
        resume
    }

    fn memory_attributes_set(&self, call: &SmcCall, platform: &mut impl Platform) -> Resume {
        let [base_va, page_count, raw_attributes, _] = call.args;
        let requested = RequestedAttributes::from(raw_attributes);
        let attributes = MemoryAttributes::from(requested);

        info!("Received SP_MEMORY_ATTRIBUTES_SET_AARCH64 SMC");
        info!("  Start address  : {base_va:#x}");
        info!("  Number of pages: {page_count}");
        info!("  Attributes     : {raw_attributes:#x} ({requested:?})");
        debug!("  Translated to  : {attributes:?}");

        let Some(size) = usize::try_from(page_count)
            .ok()
            .and_then(|pages| pages.checked_mul(PAGE_SIZE))
        else {
            warn!("Memory attribute change for {page_count} pages is out of range");
            return Resume::World(World::Secure, INVALID_PARAMETER.into());
        };

        debug!("  Size in bytes  : {size:#x}");

        let status = platform.change_mem_attributes(base_va as usize, size, attributes);
        Resume::World(World::Secure, status.into())
    }

    fn communicate(
        &self,
        call: &SmcCall,
        store: &mut ContextStore,
        platform: &mut impl Platform,
    ) -> Resume {
        assert_eq!(
            store.handle(World::Secure),
            self.secure_context,
            "Secure context registered for the core is not the secure partition's"
        );
        assert!(
            self.bridge.is_idle(),
            "Request from Normal World during a synchronous call"
        );

        store.switch_world(call.frame, self.secure_context, platform);

        Resume::World(
            World::Secure,
            [
                u64::from(call.function.0),
                call.args[1],
                call.args[2],
                platform.core_position() as u64,
            ]
            .into(),
        )
    }
}

impl Service for Spm {
    owns!(
        OwningEntityNumber::STANDARD_SECURE,
        FUNCTION_NUMBER_MIN..=FUNCTION_NUMBER_MAX
    );

    fn handle_non_secure_smc(
        &mut self,
        call: &SmcCall,
        store: &mut ContextStore,
        platform: &mut impl Platform,
    ) -> Resume {
        match SpmFunction::try_from(call.function.0) {
            Ok(SpmFunction::CommunicateAarch32 | SpmFunction::CommunicateAarch64) => {
                trace!("SP_COMMUNICATE {:#x} {:#x}", call.args[1], call.args[2]);
                self.communicate(call, store, platform)
            }
            _ => {
                warn!("Unsupported SPM call {:?} from Normal World", call.function);
                Resume::World(World::NonSecure, NOT_SUPPORTED.into())
            }
        }
    }

    fn handle_secure_smc(
        &mut self,
        call: &SmcCall,
        store: &mut ContextStore,
        platform: &mut impl Platform,
    ) -> Resume {
        match SpmFunction::try_from(call.function.0) {
            Ok(SpmFunction::EventCompleteAarch64) => self.event_complete(call, store, platform),
            Ok(SpmFunction::MemoryAttributesSetAarch64) => {
                self.memory_attributes_set(call, platform)
            }
            _ => {
                warn!("Unsupported SPM call {:?} from Secure World", call.function);
                Resume::World(World::Secure, NOT_SUPPORTED.into())
            }
        }
    }
}

/// Prepares the secure partition's context and registers its bootstrap entry as the deferred
/// BL32 initialisation.
pub fn setup<P: Platform>(services: &mut Services<P>) -> Result<(), SetupError> {
    debug!("Setting up the secure partition");

    let Some(provided) = services.platform.secure_partition_entry_point() else {
        return Err(SetupError::MissingEntryPoint);
    };
    if provided.pc == 0 {
        return Err(SetupError::NullEntryPoint);
    }

    let mut attributes = EntryPointAttributes::SECURE | EntryPointAttributes::ST_ENABLE;
    // The partition uses the same endianness as EL3.
    if services.platform.el3_big_endian() {
        attributes |= EntryPointAttributes::EE_BIG;
    }
    let entry_point = EntryPointInfo {
        pc: provided.pc,
        spsr: SECURE_PARTITION_SPSR,
        attributes,
        args: [0; 8],
    };

    let secure_context = services.store.init_context(&entry_point);
    services
        .platform
        .secure_partition_setup(services.store.context_mut(World::Secure));

    services.spm = Some(Spm::new(secure_context));
    services.register_bl32_init(init);

    debug!("Secure partition entry point {:#x}", entry_point.pc);
    Ok(())
}

/// Runs the partition until it signals that its initialisation is complete.
///
/// Panics if the partition reports a failure.
fn init<P: Platform>(services: &mut Services<P>) -> i32 {
    let Some(spm) = services.spm.as_mut() else {
        panic!("Secure partition initialisation without a secure partition");
    };
    info!("Initialising the secure partition");
    spm.init_in_progress = true;

    let rc = synchronous_sp_entry(services);
    assert_eq!(rc, 0, "Secure partition initialisation failed");
    assert!(
        services
            .spm
            .as_ref()
            .is_some_and(|spm| !spm.init_in_progress()),
        "Secure partition initialisation still in progress"
    );

    info!("Secure partition initialised");
    rc as i32
}

/// Enters the secure partition and blocks until it takes the synchronous exit path.
fn synchronous_sp_entry<P: Platform>(services: &mut Services<P>) -> u64 {
    let Some(spm) = services.spm.as_mut() else {
        panic!("Synchronous entry without a secure partition");
    };
    spm.bridge
        .enter(spm.secure_context, &mut services.store, &mut services.platform);

    loop {
        if let Some(value) = services.step() {
            break value;
        }
    }
}
