//! HTTP integration: a middleware that profiles each request and the
//! endpoints the in-page widget talks to.

pub mod layer;
pub mod resources;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use miniprof_core::access::AccessPolicy;
use miniprof_core::aggregate::ResultAggregator;
use miniprof_core::config::Config;
use miniprof_core::error::Result;
use miniprof_core::ids::{IdGenerator, RequestId};
use miniprof_core::stats::StatsSource;
use miniprof_core::store::ResultStore;

pub use layer::ProfileContext;
pub use resources::ResourceLoader;

/// Shared state of the middleware and the viewer endpoints.
#[derive(Clone)]
pub struct Profiler {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    store: Arc<dyn ResultStore>,
    ids: IdGenerator,
    policy: AccessPolicy,
    resources: ResourceLoader,
    aggregator: ResultAggregator,
}

impl Profiler {
    pub fn new(
        config: Config,
        store: Arc<dyn ResultStore>,
        stats: Option<Arc<dyn StatsSource>>,
    ) -> Result<Self> {
        let policy = AccessPolicy::from_config(&config)?;
        let resources = ResourceLoader::new(&config.base_path, &config.html_id_prefix);
        let mut aggregator = ResultAggregator::new(Arc::clone(&store));
        if let Some(source) = stats {
            aggregator = aggregator.with_stats(source, config.max_stack_frames);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                ids: IdGenerator::new(config.id_strategy),
                config,
                store,
                policy,
                resources,
                aggregator,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn resources(&self) -> &ResourceLoader {
        &self.inner.resources
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.inner.aggregator
    }

    pub(crate) fn policy(&self) -> &AccessPolicy {
        &self.inner.policy
    }

    pub(crate) fn store(&self) -> &dyn ResultStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn next_id(&self) -> RequestId {
        self.inner.ids.next_id()
    }

    /// Mounts the viewer endpoints on `app` and profiles every other route.
    pub fn attach(&self, app: Router) -> Router {
        app.merge(routes::router(self.clone())).layer(middleware::from_fn_with_state(
            self.clone(),
            layer::profile_request,
        ))
    }
}
