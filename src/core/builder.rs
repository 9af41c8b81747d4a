use std::sync::Arc;

use crate::{
    core::{Config, coordinator::Coordinator},
    events::Bus,
    random::{Entropy, OsEntropy},
    subscribers::Subscribe,
};

/// Builder for a [`Coordinator`].
pub struct CoordinatorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    entropy: Option<Arc<dyn Entropy>>,
}

impl CoordinatorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            entropy: None,
        }
    }

    /// Sets event subscribers (trace writers, collectors).
    ///
    /// Subscribers receive every run event through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the source of every random draw (defaults to [`OsEntropy`]).
    pub fn with_entropy(mut self, entropy: Arc<dyn Entropy>) -> Self {
        self.entropy = Some(entropy);
        self
    }

    /// Builds the coordinator and its event bus.
    pub fn build(self) -> Coordinator {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let entropy = self
            .entropy
            .unwrap_or_else(|| Arc::new(OsEntropy) as Arc<dyn Entropy>);
        Coordinator::new_internal(self.cfg, bus, self.subscribers, entropy)
    }
}
