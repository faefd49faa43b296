mod config;
mod events;
mod hub;
mod playback;
mod provider;
mod queuing;
mod rooms;
mod store;
mod util;

use std::sync::Arc;

use dashmap::DashMap;

pub use config::*;
pub use events::*;
pub use hub::*;
pub use playback::*;
pub use provider::*;
pub use queuing::*;
pub use rooms::*;
pub use store::*;
pub use util::*;

// Reduces verbosity
type Store<Id, T> = Arc<DashMap<Id, Arc<T>>>;

/// The syncopate core, facilitating synchronized room playback.
///
/// Components are constructed eagerly in dependency order; a deployment
/// builds exactly one of these at startup and hands it to the serving layer.
pub struct Syncopate {
    context: SyncopateContext,

    pub rooms: RoomRegistry,
}

/// A type passed to the components of the core, to access shared state,
/// configuration, and the subscriber hub.
#[derive(Clone)]
pub struct SyncopateContext {
    pub config: Config,
    pub providers: Arc<ProviderRegistry>,
    pub store: Arc<dyn RoomStore>,
    pub hub: Arc<SubscriberHub>,

    pub rooms: Store<String, Room>,
}

impl Syncopate {
    /// Builds the core and starts its background upkeep tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S>(config: Config, providers: ProviderRegistry, store: S) -> Self
    where
        S: RoomStore,
    {
        let context = SyncopateContext {
            config: config.clone(),
            providers: Arc::new(providers),
            store: Arc::new(store),
            hub: SubscriberHub::new(),

            rooms: Default::default(),
        };

        spawn_keepalive_task(
            context.hub.clone(),
            config.keepalive_interval,
            config.liveness_grace(),
        );
        spawn_idle_sweeper(&context);

        Self {
            rooms: RoomRegistry::new(&context),
            context,
        }
    }

    pub fn context(&self) -> &SyncopateContext {
        &self.context
    }

    pub fn hub(&self) -> &Arc<SubscriberHub> {
        &self.context.hub
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }
}
