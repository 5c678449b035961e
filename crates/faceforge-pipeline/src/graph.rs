//! Dependency graph over effect ids.
//!
//! Nodes live in a `petgraph` arena indexed by [`NodeIndex`]; a side
//! table maps each [`EffectId`] to its node. An edge points from a
//! dependency to its dependent, so "what becomes stale if X changes" is a
//! forward walk and a topological order lists dependencies first.
//!
//! The ordering itself is Kahn's algorithm restricted to the requested
//! subset. Ties are broken by id so the same subset always yields the
//! same order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::effect::{EffectId, EffectLayer};
use crate::types::PipelineError;

/// Directed "depends on" relation between effects.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<EffectId, ()>,
    index: HashMap<EffectId, NodeIndex>,
}

impl DependencyGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in domain rules.
    ///
    /// Skin-tone-conditioned makeup depends on foundation, eyeliner sits
    /// on eyeshadow, and every makeup region that a geometry effect can
    /// reshape depends on that geometry effect. Foundation covers the
    /// whole face and therefore depends on every geometry effect.
    #[must_use]
    pub fn with_default_rules() -> Self {
        let mut graph = Self::new();
        for makeup in [EffectId::EYESHADOW, EffectId::LIPSTICK, EffectId::BLUSH] {
            graph.add_dependency(makeup, EffectId::FOUNDATION);
        }
        graph.add_dependency(EffectId::EYELINER, EffectId::EYESHADOW);

        graph.add_dependency(EffectId::EYESHADOW, EffectId::EYE_SURGERY);
        graph.add_dependency(EffectId::EYELINER, EffectId::EYE_SURGERY);
        graph.add_dependency(EffectId::LIPSTICK, EffectId::JAWLINE_SURGERY);
        graph.add_dependency(EffectId::BLUSH, EffectId::CHEEKBONE_SURGERY);

        for surgery in [
            EffectId::NOSE_SURGERY,
            EffectId::EYE_SURGERY,
            EffectId::JAWLINE_SURGERY,
            EffectId::CHEEKBONE_SURGERY,
        ] {
            graph.add_dependency(EffectId::FOUNDATION, surgery);
        }
        graph
    }

    fn node(&mut self, id: EffectId) -> NodeIndex {
        if let Some(&node) = self.index.get(&id) {
            return node;
        }
        let node = self.graph.add_node(id.clone());
        self.index.insert(id, node);
        node
    }

    /// Record that `dependent` depends on `dependency`.
    ///
    /// Recording the same edge twice is a no-op. Cycles are not rejected
    /// here; they surface from [`update_order`](Self::update_order) and
    /// [`validate`](Self::validate).
    pub fn add_dependency(&mut self, dependent: EffectId, dependency: EffectId) {
        let to = self.node(dependent);
        let from = self.node(dependency);
        self.graph.update_edge(from, to, ());
    }

    /// Forget that `dependent` depends on `dependency`.
    ///
    /// Returns `true` if the edge existed.
    pub fn remove_dependency(&mut self, dependent: &EffectId, dependency: &EffectId) -> bool {
        let (Some(&to), Some(&from)) = (self.index.get(dependent), self.index.get(dependency)) else {
            return false;
        };
        self.graph
            .find_edge(from, to)
            .and_then(|edge| self.graph.remove_edge(edge))
            .is_some()
    }

    /// Returns `true` if `id` appears in any recorded edge.
    #[must_use]
    pub fn contains(&self, id: &EffectId) -> bool {
        self.index.contains_key(id)
    }

    /// Every id that appears in a recorded edge.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<EffectId> {
        self.index.keys().cloned().collect()
    }

    fn neighbors(&self, id: &EffectId, direction: Direction) -> impl Iterator<Item = &EffectId> + '_ {
        self.index
            .get(id)
            .into_iter()
            .flat_map(move |&node| self.graph.neighbors_directed(node, direction))
            .map(move |n| &self.graph[n])
    }

    /// Effects `id` directly depends on, in no particular order.
    pub fn dependencies(&self, id: &EffectId) -> impl Iterator<Item = &EffectId> + '_ {
        self.neighbors(id, Direction::Incoming)
    }

    /// Effects that directly depend on `id`, in no particular order.
    pub fn dependents(&self, id: &EffectId) -> impl Iterator<Item = &EffectId> + '_ {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Every effect reachable from `id` through dependent edges, not
    /// including `id` itself.
    #[must_use]
    pub fn transitive_dependents(&self, id: &EffectId) -> BTreeSet<EffectId> {
        let Some(&start) = self.index.get(id) else {
            return BTreeSet::new();
        };
        let mut out = BTreeSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                out.insert(self.graph[node].clone());
            }
        }
        out
    }

    /// A linear order over exactly `ids` in which every dependency comes
    /// before its dependents.
    ///
    /// Edges with an endpoint outside `ids` are ignored. Ids the graph
    /// has never seen are unconstrained.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CyclicDependency`] listing the ids that
    /// could not be ordered if the subset contains a cycle.
    pub fn update_order(&self, ids: &BTreeSet<EffectId>) -> Result<Vec<EffectId>, PipelineError> {
        let mut in_degree: BTreeMap<&EffectId, usize> = ids.iter().map(|id| (id, 0)).collect();
        for id in ids {
            let Some(&node) = self.index.get(id) else {
                continue;
            };
            for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(count) = in_degree.get_mut(&self.graph[dependent]) {
                    *count += 1;
                }
            }
        }

        let mut ready: BTreeSet<&EffectId> = in_degree
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(ids.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            in_degree.remove(id);
            let Some(&node) = self.index.get(id) else {
                continue;
            };
            for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let dependent = &self.graph[dependent];
                if let Some(count) = in_degree.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if in_degree.is_empty() {
            Ok(order)
        } else {
            Err(PipelineError::CyclicDependency {
                effects: in_degree.into_keys().cloned().collect(),
            })
        }
    }

    /// Check the whole graph for cycles.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CyclicDependency`] if any cycle exists.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.update_order(&self.ids()).map(|_| ())
    }

    /// Check that no edge points from a later layer back to an earlier
    /// one. Ids without a known layer are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] naming the first
    /// offending edge.
    pub fn check_layers(
        &self,
        layer_of: impl Fn(&EffectId) -> Option<EffectLayer>,
    ) -> Result<(), PipelineError> {
        for edge in self.graph.raw_edges() {
            let dependency = &self.graph[edge.source()];
            let dependent = &self.graph[edge.target()];
            if let (Some(from), Some(to)) = (layer_of(dependency), layer_of(dependent))
                && from > to
            {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "`{dependent}` ({to}) cannot depend on `{dependency}` ({from}) in a later layer"
                )));
            }
        }
        Ok(())
    }
}
