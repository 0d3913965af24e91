//! Turns raw watch events into add/update/delete/generic notifications and
//! decides which of them should trigger a reconciliation on this node.

use std::collections::HashMap;

use futures::{stream, Stream, StreamExt};
use kube::{
    runtime::watcher::{self, Event},
    Resource, ResourceExt,
};
use log::warn;
use nodeipam_core::{
    crd::{
        multitenantnetworkcontainer::MultiTenantNetworkContainer,
        nodenetworkconfig::NodeNetworkConfig,
    },
    helpers::namespaced_key,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent<K> {
    Add(K),
    /// `old_generation` is the generation last observed for the same object
    Update {
        old_generation: Option<i64>,
        object: K,
    },
    Delete(K),
    /// the object was seen again on relist without a known change
    Generic(K),
}

impl<K> ObjectEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            Self::Add(object)
            | Self::Update { object, .. }
            | Self::Delete(object)
            | Self::Generic(object) => object,
        }
    }

    pub fn into_object(self) -> K {
        match self {
            Self::Add(object)
            | Self::Update { object, .. }
            | Self::Delete(object)
            | Self::Generic(object) => object,
        }
    }
}

/// Remembers the last generation seen per object, which is what tells an
/// add from an update and a spec change from a status-only change.
#[derive(Debug, Default)]
pub struct EventClassifier {
    generations: HashMap<String, Option<i64>>,
}

impl EventClassifier {
    pub fn classify<K: Resource>(&mut self, event: Event<K>) -> Vec<ObjectEvent<K>> {
        match event {
            Event::Applied(object) => {
                let generation = object.meta().generation;

                match self.generations.insert(object_key(&object), generation) {
                    Some(old_generation) => vec![ObjectEvent::Update {
                        old_generation,
                        object,
                    }],
                    None => vec![ObjectEvent::Add(object)],
                }
            }
            Event::Deleted(object) => {
                self.generations.remove(&object_key(&object));

                vec![ObjectEvent::Delete(object)]
            }
            Event::Restarted(objects) => {
                let mut previous = std::mem::take(&mut self.generations);
                let mut events = Vec::with_capacity(objects.len());

                for object in objects {
                    let key = object_key(&object);
                    let generation = object.meta().generation;

                    events.push(match previous.remove(&key) {
                        Some(old_generation) if old_generation == generation => {
                            ObjectEvent::Generic(object)
                        }
                        Some(old_generation) => ObjectEvent::Update {
                            old_generation,
                            object,
                        },
                        None => ObjectEvent::Add(object),
                    });

                    self.generations.insert(key, generation);
                }

                // objects gone while the watch was down never got a deleted event
                if !previous.is_empty() {
                    warn!(
                        "{} object(s) disappeared while the watch was restarting: {:?}",
                        previous.len(),
                        previous.keys().collect::<Vec<_>>()
                    );
                }

                events
            }
        }
    }
}

fn object_key<K: Resource>(object: &K) -> String {
    namespaced_key(&object.name_any(), object.meta().namespace.as_deref())
}

pub trait EventFilter<K>: Send + 'static {
    fn accept(&self, event: &ObjectEvent<K>) -> bool;
}

/// Passes events for the node's own `NodeNetworkConfig`. Updates pass only
/// when the generation is unchanged, since generation bumps come from the
/// agent's own spec writes. Deletes are never acted upon.
pub struct NodeNetworkConfigFilter {
    node_name: String,
}

impl NodeNetworkConfigFilter {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }
}

impl EventFilter<NodeNetworkConfig> for NodeNetworkConfigFilter {
    fn accept(&self, event: &ObjectEvent<NodeNetworkConfig>) -> bool {
        let object = event.object();

        if object.meta().name.as_deref() != Some(self.node_name.as_str()) {
            return false;
        }

        match event {
            ObjectEvent::Add(_) | ObjectEvent::Generic(_) => true,
            ObjectEvent::Update {
                old_generation,
                object,
            } => *old_generation == object.meta().generation,
            ObjectEvent::Delete(_) => {
                warn!(
                    "NodeNetworkConfig '{}' was deleted! The IPAM state is left as is",
                    self.node_name
                );
                false
            }
        }
    }
}

/// Passes every event for containers scheduled on this node, deletes included.
pub struct MultiTenantNetworkContainerFilter {
    node_name: String,
}

impl MultiTenantNetworkContainerFilter {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }
}

impl EventFilter<MultiTenantNetworkContainer> for MultiTenantNetworkContainerFilter {
    fn accept(&self, event: &ObjectEvent<MultiTenantNetworkContainer>) -> bool {
        event.object().is_scheduled_on(&self.node_name)
    }
}

/// Classifies `events` and keeps the objects `filter` accepts, yielding a
/// stream suitable as a controller trigger. Watch errors are passed through.
pub fn filtered_trigger_stream<K, S, F>(
    events: S,
    filter: F,
) -> impl Stream<Item = Result<K, watcher::Error>> + Send
where
    K: Resource + Send + 'static,
    S: Stream<Item = Result<Event<K>, watcher::Error>> + Send,
    F: EventFilter<K>,
{
    let mut classifier = EventClassifier::default();

    events.flat_map(move |event| {
        let triggers: Vec<_> = match event {
            Ok(event) => classifier
                .classify(event)
                .into_iter()
                .filter(|event| filter.accept(event))
                .map(|event| Ok(event.into_object()))
                .collect(),
            Err(error) => vec![Err(error)],
        };

        stream::iter(triggers)
    })
}
