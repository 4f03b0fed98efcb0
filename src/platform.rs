// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause


use crate::{
    context::{CpuContext, EntryPointInfo},
    exceptions::LowerEl,
    pagetable::MemoryAttributes,
};

/// The hooks that a platform must implement to host the secure partition dispatcher.
pub trait Platform: LowerEl {
    /// Returns the linear index of the calling core.
    fn core_position(&self) -> usize;

    /// Returns the entry point of the Normal World image.
    fn non_secure_entry_point(&self) -> EntryPointInfo;

    /// Returns the entry point of the secure partition image as loaded by the boot loader, if there
    /// is one.
    ///
    /// Only the entry address is used.
    fn secure_partition_entry_point(&self) -> Option<EntryPointInfo>;

    /// Prepares the secure partition's address space, and writes the S-EL1 system register values
    /// it needs (translation table base, MMU configuration, vector base and so on) into its
    /// context.
    fn secure_partition_setup(&mut self, context: &mut CpuContext);

    /// Changes the attributes of `size` bytes of the secure partition's address space starting at
    /// `base_va`.
    ///
    /// Returns an SMCCC status code, which is passed back to the partition unchanged.
    fn change_mem_attributes(
        &mut self,
        base_va: usize,
        size: usize,
        attributes: MemoryAttributes,
    ) -> i32;
}
