//! Process-wide memoized service constructors.
//!
//! Each `provide_*` function lazily initialises a single instance on first
//! call and hands the same one back afterwards; later calls ignore their
//! configuration argument. The services still require their `hydrate` step
//! before use.
//!
//! The memoization is a convenience for hosts that want Go-style service
//! lookup; every service is equally constructible directly for dependency
//! injection and tests.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::events::Relay;
use crate::net::{TransferConfig, TransferSvc};
use crate::updater::{UpdaterConfig, UpdaterSvc};

static RELAY: OnceCell<Arc<Relay>> = OnceCell::new();
static TRANSFER: OnceCell<Arc<TransferSvc>> = OnceCell::new();
static UPDATER: OnceCell<Arc<UpdaterSvc>> = OnceCell::new();

/// The process-wide relay, created with the tracing sink on first call.
pub fn provide_relay() -> Arc<Relay> {
    RELAY.get_or_init(|| Arc::new(Relay::with_tracing())).clone()
}

/// The process-wide transfer service.
pub fn provide_transfer_svc(cfg: TransferConfig) -> Arc<TransferSvc> {
    TRANSFER.get_or_init(|| Arc::new(TransferSvc::new(cfg, provide_relay()))).clone()
}

/// The process-wide updater, built over the shared relay and transfer
/// service.
pub fn provide_updater_svc(cfg: UpdaterConfig) -> Arc<UpdaterSvc> {
    UPDATER
        .get_or_init(|| {
            let relay = provide_relay();
            let transfer = provide_transfer_svc(TransferConfig::default());
            UpdaterSvc::with_services(cfg, relay, transfer)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_providers_memoize() {
        let a = provide_relay();
        let b = provide_relay();
        assert!(Arc::ptr_eq(&a, &b));

        let t1 = provide_transfer_svc(TransferConfig::default());
        let t2 = provide_transfer_svc(TransferConfig::default());
        assert!(Arc::ptr_eq(&t1, &t2));
    }
}
