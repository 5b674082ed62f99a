//! Tracks the set of in-flight `Coordinator`s so the `CoordinatorExecService` RPC
//! handler can route an inbound `UpdateFragmentExecStatus` to the right one. The
//! `Coordinator` core itself is single-query; this registry is purely a server-side
//! routing concern, analogous to the query-id-keyed coordinator map the reference
//! frontend keeps for its distributed scheduler sessions.

use std::sync::Arc;

use coord_common::QueryId;
use coordinator::Coordinator;
use dashmap::DashMap;

#[derive(Default)]
pub struct CoordinatorRegistry {
    coordinators: DashMap<QueryId, Arc<Coordinator>>,
}

impl CoordinatorRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, coordinator: Arc<Coordinator>) {
        self.coordinators.insert(coordinator.query_id(), coordinator);
    }

    pub fn get(&self, query_id: QueryId) -> Option<Arc<Coordinator>> {
        self.coordinators.get(&query_id).map(|e| e.clone())
    }

    pub fn unregister(&self, query_id: QueryId) {
        self.coordinators.remove(&query_id);
    }
}
