//! Node contract used by the pipeline graph.
//!
//! A node declares what it consumes and what it provides so the graph can
//! route requests. The graph itself lives outside this crate; it drives a
//! node through [`BatchFilter::setup`], then [`prepare`](BatchFilter::prepare)
//! and [`process`](BatchFilter::process) once per request, and finally
//! [`teardown`](BatchFilter::teardown).

use crate::array_key::ArrayKey;
use crate::array_spec::ArraySpec;
use crate::batch::Batch;
use crate::request::Request;
use std::collections::BTreeMap;

/// The arrays a node (or everything upstream of it) can provide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderSpec {
    specs: BTreeMap<ArrayKey, ArraySpec>,
}

impl ProviderSpec {
    /// Provides nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` with `spec`, builder style.
    pub fn with(mut self, key: ArrayKey, spec: ArraySpec) -> Self {
        self.insert(key, spec);
        self
    }

    /// Sets the spec for `key`, returning the previous one.
    pub fn insert(&mut self, key: ArrayKey, spec: ArraySpec) -> Option<ArraySpec> {
        self.specs.insert(key, spec)
    }

    /// Advertised spec for `key`.
    pub fn get(&self, key: &ArrayKey) -> Option<&ArraySpec> {
        self.specs.get(key)
    }

    /// Whether `key` is provided.
    pub fn contains(&self, key: &ArrayKey) -> bool {
        self.specs.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.specs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &ArraySpec)> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// A pipeline node that transforms batches on their way downstream.
pub trait BatchFilter: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Called once before the first request. `upstream` is what the nodes
    /// above this one provide.
    fn setup(&mut self, upstream: &ProviderSpec) -> Result<(), Self::Error>;

    /// Keys this node reads from the batch.
    fn consumes(&self) -> Vec<ArrayKey>;

    /// Keys this node writes, with the specs it advertises for them.
    /// Only meaningful after [`setup`](Self::setup).
    fn provides(&self) -> ProviderSpec;

    /// The request to send upstream so that `request` can be satisfied.
    fn prepare(&self, request: &Request) -> Result<Request, Self::Error>;

    /// Fills in this node's outputs for `request`.
    fn process(&mut self, batch: Batch, request: &Request) -> Result<Batch, Self::Error>;

    /// Releases resources. Must be safe to call more than once.
    fn teardown(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
