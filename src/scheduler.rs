//! The scheduler resolves the run order of systems from their before/after declarations.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::id::{EventId, SystemId};

mod topology;


/// The registration data of a system.
///
/// `S` is the runtime state the owner attaches to the system, such as its callback.
#[derive(Debug)]
pub struct SystemDescription<S> {
    /// The identity of the system, hashed from `name`.
    pub id:        SystemId,
    /// The unique name of the system.
    pub name:      String,
    /// The events the system is subscribed to.
    pub on_events: Vec<EventId>,
    /// Names of the systems this system must run before.
    pub before:    Vec<String>,
    /// Names of the systems this system must run after.
    pub after:     Vec<String>,
    /// The runtime state of the system.
    pub state:     S,
}

impl<S> SystemDescription<S> {
    /// Creates a description without constraints or subscriptions.
    ///
    /// # Panics
    /// Panics if `name` is empty.
    pub fn new(name: impl Into<String>, state: S) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "System name must not be empty");

        Self {
            id: SystemId::of(&name),
            name,
            on_events: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            state,
        }
    }

    /// Whether the system is subscribed to the event type.
    pub fn is_subscribed(&self, event: EventId) -> bool { self.on_events.contains(&event) }
}

/// The direction of an ordering constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The system runs before the other one.
    Before,
    /// The system runs after the other one.
    After,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
        }
    }
}

/// A recoverable problem found while ordering systems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingIssue {
    /// A constraint names a system that is not registered. The constraint is ignored.
    UndeclaredDependency {
        /// The system declaring the constraint.
        system:   String,
        /// The unknown system.
        other:    String,
        /// The declared relation of `system` to `other`.
        relation: Relation,
    },
    /// The constraints of a system close a dependency cycle.
    /// The system is still ordered, but its position relative to the cycle is arbitrary.
    Cycle {
        /// The system whose constraint closes the cycle.
        system: String,
    },
}

impl fmt::Display for OrderingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndeclaredDependency { system, other, relation } => write!(
                f,
                "System <{system}> is supposed to run {relation} system <{other}>, which is \
                 undeclared"
            ),
            Self::Cycle { system } => {
                write!(f, "System <{system}> causes the dependency graph to become cyclic")
            }
        }
    }
}

/// Stores the registered systems and their resolved run order.
pub struct SystemStorage<S> {
    descriptions: IndexMap<SystemId, SystemDescription<S>>,
    order:        Vec<SystemId>,
    dirty:        bool,
}

impl<S> Default for SystemStorage<S> {
    fn default() -> Self { Self { descriptions: IndexMap::new(), order: Vec::new(), dirty: false } }
}

impl<S> SystemStorage<S> {
    /// Registers a system.
    ///
    /// If a system with the same name exists, an error is logged,
    /// the existing system is kept and `false` is returned.
    pub fn push(&mut self, description: SystemDescription<S>) -> bool {
        if self.descriptions.contains_key(&description.id) {
            log::error!("System <{}> is already registered", description.name);
            return false;
        }

        log::trace!("Registered system <{}>", description.name);
        self.descriptions.insert(description.id, description);
        self.dirty = true;
        true
    }

    /// Whether a system was registered since the last ordering.
    pub fn is_dirty(&self) -> bool { self.dirty }

    /// The number of registered systems.
    pub fn len(&self) -> usize { self.descriptions.len() }

    /// Whether no system is registered.
    pub fn is_empty(&self) -> bool { self.descriptions.is_empty() }

    /// Gets a system by id.
    pub fn get(&self, id: SystemId) -> Option<&SystemDescription<S>> { self.descriptions.get(&id) }

    /// The systems in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemDescription<S>> + '_ {
        self.descriptions.values()
    }

    /// The systems in their resolved run order.
    ///
    /// Systems registered after the last [`SystemStorage::register_deferred`] call are omitted.
    pub fn ordered(&self) -> impl Iterator<Item = &SystemDescription<S>> + '_ {
        self.order.iter().filter_map(|id| self.descriptions.get(id))
    }

    /// Recomputes the run order if a system was registered since the last call.
    ///
    /// Systems are first sorted by the hash of their name
    /// so that the result does not depend on registration order.
    /// Undeclared dependencies and cycles are logged and returned,
    /// but every system is always placed exactly once.
    pub fn register_deferred(&mut self) -> Vec<OrderingIssue> {
        if !self.dirty {
            return Vec::new();
        }

        let nodes: Vec<SystemId> = self.descriptions.keys().copied().sorted().collect();
        let node_index: HashMap<SystemId, usize> =
            nodes.iter().enumerate().map(|(index, &id)| (id, index)).collect();

        let mut issues = Vec::new();
        // `dependencies[a]` lists the nodes that must run before `a`.
        let mut dependencies = vec![Vec::new(); nodes.len()];
        for (node, id) in nodes.iter().enumerate() {
            let description = self.descriptions.get(id).expect("nodes are collected from keys");

            let constraints = description
                .before
                .iter()
                .map(|other| (Relation::Before, other))
                .chain(description.after.iter().map(|other| (Relation::After, other)));
            for (relation, other) in constraints {
                let Some(&other_node) = node_index.get(&SystemId::of(other)) else {
                    issues.push(OrderingIssue::UndeclaredDependency {
                        system: description.name.clone(),
                        other: other.clone(),
                        relation,
                    });
                    continue;
                };

                match relation {
                    Relation::Before => dependencies[other_node].push(node),
                    Relation::After => dependencies[node].push(other_node),
                }
            }
        }

        let sorted = topology::sort(&dependencies);
        for &node in &sorted.cyclic {
            let description = self.descriptions.get(&nodes[node]).expect("valid node");
            issues.push(OrderingIssue::Cycle { system: description.name.clone() });
        }

        for issue in &issues {
            log::error!("{issue}");
        }

        self.order = sorted.order.into_iter().map(|node| nodes[node]).collect();
        self.dirty = false;

        log::debug!(
            "Resolved system order: {}",
            self.ordered().map(|description| description.name.as_str()).join(", ")
        );
        issues
    }
}
