//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random object graphs and snapshot
//! pairs whose expected diff statuses are known up front.

use crate::fixtures::{high_node, low_node, uid, SnapshotPair};
use proptest::prelude::*;
use tandem_core::{DiffStatus, Entity, EntityKind, Snapshot, Uid, Value};

/// Strategy for generating identities.
pub fn uid_strategy() -> impl Strategy<Value = Uid> {
    any::<u128>().prop_map(Uid::from_u128)
}

/// Strategy for generating entity kinds.
pub fn kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

/// Strategy for generating attribute values, nested up to three levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-z]{0,8}".prop_map(Value::Text),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for generating an entity of any kind with random attributes.
pub fn entity_strategy() -> impl Strategy<Value = Entity> {
    (
        uid_strategy(),
        kind_strategy(),
        1u32..8,
        prop::collection::btree_map("[a-z_]{1,10}", value_strategy(), 0..6),
    )
        .prop_map(|(id, kind, version, attributes)| Entity {
            id: id.into(),
            kind,
            version,
            attributes,
        })
}

/// Where a generated object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Only on the low side.
    Low,
    /// Only on the high side.
    High,
    /// On both sides, identical.
    Both,
    /// On both sides, with a tracked attribute changed.
    Changed,
}

impl Presence {
    /// Status the object's diff must have.
    pub fn expected_status(self) -> DiffStatus {
        match self {
            Presence::Low | Presence::High => DiffStatus::New,
            Presence::Both => DiffStatus::Same,
            Presence::Changed => DiffStatus::Diff,
        }
    }
}

/// Strategy for generating presences.
pub fn presence_strategy() -> impl Strategy<Value = Presence> {
    prop_oneof![
        Just(Presence::Low),
        Just(Presence::High),
        Just(Presence::Both),
        Just(Presence::Changed),
    ]
}

/// A generated object graph.
///
/// Node `i` has identity `uid(i + 1)`. Edges may form cycles, self-loops
/// and repeats; snapshot construction normalizes them.
#[derive(Debug, Clone)]
pub struct GraphSpec {
    /// Kind and presence of each node.
    pub nodes: Vec<(EntityKind, Presence)>,
    /// `(parent, child)` node indices.
    pub edges: Vec<(usize, usize)>,
}

impl GraphSpec {
    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if there are no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identity of node `index`.
    pub fn uid(&self, index: usize) -> Uid {
        uid(index as u128 + 1)
    }

    /// Builds the low and high snapshots described by this graph.
    ///
    /// Both sides declare every edge; edges touching an object a side does
    /// not hold are dropped by that side's builder.
    pub fn snapshots(&self) -> SnapshotPair {
        let mut low = Snapshot::builder(low_node());
        let mut high = Snapshot::builder(high_node());

        for (i, (kind, presence)) in self.nodes.iter().enumerate() {
            let id = self.uid(i);
            match presence {
                Presence::Low => low = low.object(revision(id, *kind, 1)),
                Presence::High => high = high.object(revision(id, *kind, 1)),
                Presence::Both => {
                    low = low.object(revision(id, *kind, 1));
                    high = high.object(revision(id, *kind, 1));
                }
                Presence::Changed => {
                    low = low.object(revision(id, *kind, 1));
                    high = high.object(revision(id, *kind, 2));
                }
            }
        }
        for (parent, child) in &self.edges {
            low = low.depends(self.uid(*parent), self.uid(*child));
            high = high.depends(self.uid(*parent), self.uid(*child));
        }

        SnapshotPair::new(low.build(), high.build())
    }
}

/// An entity whose tracked attribute encodes `revision`.
///
/// Different revisions always compare as DIFF under the standard registry.
pub fn revision(id: Uid, kind: EntityKind, revision: i64) -> Entity {
    let entity = Entity::new(id, kind);
    match kind {
        EntityKind::Request => entity.with_attr("status", format!("r{revision}")),
        EntityKind::Code => entity.with_attr("raw_code", format!("# revision {revision}")),
        EntityKind::CodeStatus => {
            entity.with_attr("status_dict", Value::map([("low", format!("r{revision}"))]))
        }
        EntityKind::Job => entity.with_attr("progress", revision),
        EntityKind::Log => entity.with_attr("stdout", format!("line {revision}")),
        EntityKind::Output => entity.with_attr("executing_user", format!("user{revision}")),
        EntityKind::ActionResult => entity.with_attr("payload", revision),
    }
}

/// Strategy for generating graphs of up to `max_nodes` nodes.
pub fn graph_strategy(max_nodes: usize) -> impl Strategy<Value = GraphSpec> {
    (1..=max_nodes.max(1))
        .prop_flat_map(|n| {
            (
                prop::collection::vec((kind_strategy(), presence_strategy()), n),
                prop::collection::vec((0..n, 0..n), 0..=n * 2),
            )
        })
        .prop_map(|(nodes, edges)| GraphSpec { nodes, edges })
}

/// Strategy for generating snapshot pairs together with their graph.
pub fn snapshot_pair_strategy(max_nodes: usize) -> impl Strategy<Value = (GraphSpec, SnapshotPair)> {
    graph_strategy(max_nodes).prop_map(|graph| {
        let pair = graph.snapshots();
        (graph, pair)
    })
}

/// Case count and graph size for a property run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphBudget {
    /// Number of generated cases.
    pub cases: u32,
    /// Largest graph handed to [`graph_strategy`].
    pub max_nodes: usize,
}

impl GraphBudget {
    /// Small graphs, few cases.
    pub const QUICK: Self = Self {
        cases: 32,
        max_nodes: 16,
    };

    /// Larger graphs for soak runs.
    pub const THOROUGH: Self = Self {
        cases: 1024,
        max_nodes: 64,
    };

    /// Graph strategy sized to this budget.
    pub fn graphs(&self) -> impl Strategy<Value = GraphSpec> {
        graph_strategy(self.max_nodes)
    }

    /// Snapshot pair strategy sized to this budget.
    pub fn snapshot_pairs(&self) -> impl Strategy<Value = (GraphSpec, SnapshotPair)> {
        snapshot_pair_strategy(self.max_nodes)
    }

    /// Proptest configuration with this case count.
    #[must_use]
    pub fn config(&self) -> ProptestConfig {
        ProptestConfig::with_cases(self.cases)
    }
}
