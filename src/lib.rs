// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! EL3 dispatcher for a single S-EL0 secure partition.
//!
//! [`Services`] owns the saved state of the Secure and Normal worlds on the calling core and routes
//! the SMCs they make. Normal World requests are forwarded to the secure partition, which signals
//! completion with an SMC of its own; the partition's first run happens synchronously during boot.
//! The platform provides the world entry trampoline and the other hooks in [`Platform`].

#![cfg_attr(not(test), no_std)]

mod context;
mod debug;
mod exceptions;
pub mod logger;
mod pagetable;
mod platform;
mod services;
mod smccc;

pub use context::{
    ContextHandle, ContextStore, CpuContext, El1Sysregs, El3State, EntryPointAttributes,
    EntryPointInfo, GpRegs, World,
};
#[cfg(any(test, target_arch = "aarch64"))]
pub use exceptions::LiveSysregs;
pub use exceptions::{LowerEl, RunResult};
pub use pagetable::{MemoryAttributes, PAGE_SIZE};
pub use platform::Platform;
pub use services::{
    Resume, Service, Services, SmcCall,
    spm::{SetupError, SpmFunction},
};
pub use smccc::{FunctionId, NOT_SUPPORTED, SmcReturn};
