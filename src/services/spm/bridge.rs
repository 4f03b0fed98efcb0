// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use crate::{
    context::{ContextHandle, ContextStore},
    exceptions::LowerEl,
    services::Resume,
};
use log::trace;

/// A caller suspended until the world it entered signals completion.
#[derive(Debug, Eq, PartialEq)]
struct PendingCall {
    callee: ContextHandle,
}

/// Blocking calls into a lower EL world.
///
/// Entry installs the callee's context and records the suspended caller; the run loop then keeps
/// entering lower ELs until a handler takes the exit path, which hands the completion value back to
/// the caller. At most one call can be in flight.
#[derive(Debug, Default)]
pub struct SyncBridge {
    pending: Option<PendingCall>,
}

impl SyncBridge {
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Returns whether no synchronous call is in flight.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Restores the callee's context and marks it as the next world to run.
    pub fn enter(
        &mut self,
        callee: ContextHandle,
        store: &mut ContextStore,
        lower_el: &mut impl LowerEl,
    ) {
        assert!(
            self.pending.is_none(),
            "Synchronous entry into {:?} while another call is in flight",
            callee.world()
        );
        store.restore(callee, lower_el);
        store.set_next_eret_context(callee.world());
        self.pending = Some(PendingCall { callee });
        trace!("Synchronous entry into {:?}", callee.world());
    }

    /// Saves the callee's context and resumes the suspended caller with `value`.
    pub fn exit(
        &mut self,
        store: &mut ContextStore,
        lower_el: &mut impl LowerEl,
        value: u64,
    ) -> Resume {
        let Some(pending) = self.pending.take() else {
            panic!("Synchronous exit without a matching entry");
        };
        store.save(pending.callee, lower_el);
        trace!(
            "Synchronous exit from {:?} with {value:#x}",
            pending.callee.world()
        );
        Resume::SynchronousCaller(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::World, platform::test::TestPlatform};

    #[test]
    fn entry_then_exit() {
        let mut platform = TestPlatform::new();
        let mut store = ContextStore::new();
        let mut bridge = SyncBridge::new();
        let secure = store.handle(World::Secure);

        bridge.enter(secure, &mut store, &mut platform);
        assert!(!bridge.is_idle());
        assert_eq!(store.resident(), Some(World::Secure));
        assert_eq!(store.next_eret_context(), Some(World::Secure));

        platform.live.tpidr_el1 = 77;
        assert_eq!(
            bridge.exit(&mut store, &mut platform, 5),
            Resume::SynchronousCaller(5)
        );
        assert!(bridge.is_idle());
        assert_eq!(store.resident(), None);
        assert_eq!(store.context(World::Secure).el1_sysregs.tpidr_el1, 77);
    }

    #[test]
    #[should_panic(expected = "while another call is in flight")]
    fn reentrant_entry_panics() {
        let mut platform = TestPlatform::new();
        let mut store = ContextStore::new();
        let mut bridge = SyncBridge::new();
        let secure = store.handle(World::Secure);

        bridge.enter(secure, &mut store, &mut platform);
        bridge.enter(secure, &mut store, &mut platform);
    }

    #[test]
    #[should_panic(expected = "Synchronous exit without a matching entry")]
    fn exit_without_entry_panics() {
        let mut platform = TestPlatform::new();
        let mut store = ContextStore::new();
        let mut bridge = SyncBridge::new();

        bridge.exit(&mut store, &mut platform, 0);
    }
}
