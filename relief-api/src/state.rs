//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use relief_core::{Clock, SystemClock, UserDirectory};
use relief_storage::RecordStore;

use crate::broadcaster::{Broadcaster, InboundRouter};
use crate::services::UpstreamServices;

/// Record store shared by every handler.
pub type SharedRecords = Arc<dyn RecordStore>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub records: SharedRecords,
    /// Cache-integrated upstream calls. Handlers never reach a provider
    /// any other way.
    pub services: UpstreamServices,
    pub broadcaster: Broadcaster,
    /// Handlers for inbound event-channel frames.
    pub inbound: Arc<InboundRouter>,
    pub users: Arc<UserDirectory>,
    /// Source of record and audit timestamps.
    pub clock: Arc<dyn Clock>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        records: SharedRecords,
        services: UpstreamServices,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            records,
            services,
            broadcaster,
            inbound: Arc::new(InboundRouter::standard()),
            users: Arc::new(UserDirectory::builtin()),
            clock: Arc::new(SystemClock),
            start_time: Instant::now(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_users(mut self, users: UserDirectory) -> Self {
        self.users = Arc::new(users);
        self
    }

    pub fn with_inbound(mut self, inbound: InboundRouter) -> Self {
        self.inbound = Arc::new(inbound);
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("records", &self.records.backend_name())
            .field("services", &self.services)
            .field("broadcaster", &self.broadcaster)
            .finish()
    }
}

crate::impl_from_ref!(SharedRecords, records);
crate::impl_from_ref!(UpstreamServices, services);
crate::impl_from_ref!(Broadcaster, broadcaster);
crate::impl_from_ref!(Arc<InboundRouter>, inbound);
crate::impl_from_ref!(Arc<UserDirectory>, users);
crate::impl_from_ref!(Arc<dyn Clock>, clock);
crate::impl_from_ref!(Instant, start_time);
