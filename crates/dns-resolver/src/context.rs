//! Bundles the Local Store, Cache Engine, Stats Hooks, and Upstream
//! Client behind one handle threaded through a single question's
//! resolution, the way the original `Context<'a, CT>` bundled zones,
//! cache, and per-question metrics. `CT` here is the Upstream Client
//! implementation, generic so tests can substitute a fake one.

use std::sync::Arc;

use crate::cache::SharedCache;
use crate::client::UpstreamClient;
use crate::stats::Stats;
use crate::store::LocalStore;

pub struct Context<CT> {
    pub client: CT,
    pub store: LocalStore,
    pub cache: SharedCache,
    pub stats: Arc<Stats>,
}

impl<CT: UpstreamClient> Context<CT> {
    pub fn new(client: CT, store: LocalStore, cache: SharedCache, stats: Arc<Stats>) -> Self {
        Context {
            client,
            store,
            cache,
            stats,
        }
    }
}
