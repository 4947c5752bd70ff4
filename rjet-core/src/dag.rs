//! The job graph: named vertices connected by routed edges.
//!
//! A [`Dag`] is immutable once built. Both traversal orders are computed at
//! build time, so walking them never touches the underlying graph again.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use daggy::{NodeIndex, Walker};

use crate::error::{JetError, Result};
use crate::processor::ProcessorSupplier;

/// Position of a vertex in insertion order
pub type VertexIndex = usize;

/// How records of one producer instance are spread over consumer instances
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
pub enum Routing {
    RoundRobin,
    /// by murmur3 of the record key, key-less records fall back to round robin
    Partitioned,
    Broadcast,
    /// every record goes to consumer instance 0
    AllToOne,
}

impl Default for Routing {
    fn default() -> Self {
        Routing::RoundRobin
    }
}

#[derive(Clone)]
pub struct Vertex {
    name: String,
    local_parallelism: Option<u32>,
    supplier: Arc<dyn ProcessorSupplier>,
}

impl Vertex {
    pub fn new<S>(name: &str, supplier: S) -> Self
    where
        S: ProcessorSupplier + 'static,
    {
        Vertex::with_supplier(name, Arc::new(supplier))
    }

    pub fn with_supplier(name: &str, supplier: Arc<dyn ProcessorSupplier>) -> Self {
        Vertex {
            name: name.to_string(),
            local_parallelism: None,
            supplier,
        }
    }

    pub fn local_parallelism(mut self, local_parallelism: u32) -> Self {
        self.local_parallelism = Some(local_parallelism);
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Declared parallelism, `default_parallelism` when none was declared
    pub fn parallelism_or(&self, default_parallelism: u32) -> u32 {
        self.local_parallelism.unwrap_or(default_parallelism)
    }

    pub fn supplier(&self) -> Arc<dyn ProcessorSupplier> {
        self.supplier.clone()
    }
}

impl std::fmt::Debug for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vertex")
            .field("name", &self.name)
            .field("local_parallelism", &self.local_parallelism)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub routing: Routing,
    /// outbox bucket on the producer side, assigned in insertion order
    pub source_ordinal: usize,
    /// inbox ordinal on the consumer side, assigned in insertion order
    pub target_ordinal: usize,
}

impl Edge {
    pub fn between(source: &str, target: &str) -> Self {
        Edge {
            source: source.to_string(),
            target: target.to_string(),
            routing: Routing::RoundRobin,
            source_ordinal: 0,
            target_ordinal: 0,
        }
    }

    pub fn partitioned(mut self) -> Self {
        self.routing = Routing::Partitioned;
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.routing = Routing::Broadcast;
        self
    }

    pub fn all_to_one(mut self) -> Self {
        self.routing = Routing::AllToOne;
        self
    }

    pub fn name(&self) -> String {
        format!("{}[{}]->{}[{}]", self.source, self.source_ordinal, self.target, self.target_ordinal)
    }
}

#[derive(Debug, Default)]
pub struct DagBuilder {
    name: String,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl DagBuilder {
    pub fn new(name: &str) -> Self {
        DagBuilder {
            name: name.to_string(),
            vertices: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn vertex(&mut self, vertex: Vertex) -> &mut Self {
        self.vertices.push(vertex);
        self
    }

    pub fn edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    pub fn build(&self) -> Result<Dag> {
        if self.vertices.is_empty() {
            return Err(JetError::Dag(format!("`{}` has no vertices", self.name)));
        }

        let mut dag = daggy::Dag::new();
        let mut names = HashMap::new();
        for vertex in &self.vertices {
            if vertex.local_parallelism == Some(0) {
                return Err(JetError::Dag(format!(
                    "vertex `{}` has zero parallelism",
                    vertex.name
                )));
            }
            if names.contains_key(vertex.name()) {
                return Err(JetError::Dag(format!(
                    "duplicate vertex name `{}`",
                    vertex.name
                )));
            }

            let node_index = dag.add_node(vertex.clone());
            names.insert(vertex.name.clone(), node_index.index());
        }

        let mut source_ordinals = vec![0usize; self.vertices.len()];
        let mut target_ordinals = vec![0usize; self.vertices.len()];
        for edge in &self.edges {
            let source = *names.get(edge.source.as_str()).ok_or_else(|| {
                JetError::Dag(format!("edge source `{}` not found", edge.source))
            })?;
            let target = *names.get(edge.target.as_str()).ok_or_else(|| {
                JetError::Dag(format!("edge target `{}` not found", edge.target))
            })?;
            if source == target {
                return Err(JetError::Dag(format!("self loop on `{}`", edge.source)));
            }

            let mut edge = edge.clone();
            edge.source_ordinal = source_ordinals[source];
            edge.target_ordinal = target_ordinals[target];
            source_ordinals[source] += 1;
            target_ordinals[target] += 1;

            let edge_name = edge.name();
            dag.add_edge(NodeIndex::new(source), NodeIndex::new(target), edge)
                .map_err(|_e| JetError::Dag(format!("edge {} would cycle", edge_name)))?;
        }

        let topological = topological_sort(&dag);
        let mut reverse_topological = topological.clone();
        reverse_topological.reverse();

        Ok(Dag {
            name: self.name.clone(),
            dag,
            names,
            topological,
            reverse_topological,
        })
    }
}

/// Kahn's algorithm, always picking the lowest ready index so the order is stable
fn topological_sort(dag: &daggy::Dag<Vertex, Edge>) -> Vec<VertexIndex> {
    let node_count = dag.node_count();
    let mut in_degree: Vec<usize> = (0..node_count)
        .map(|i| dag.parents(NodeIndex::new(i)).iter(dag).count())
        .collect();

    let mut ready: BTreeSet<VertexIndex> =
        (0..node_count).filter(|i| in_degree[*i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);
    while let Some(index) = ready.iter().next().cloned() {
        ready.remove(&index);
        order.push(index);

        for (_edge_index, child) in dag.children(NodeIndex::new(index)).iter(dag) {
            let child = child.index();
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    order
}

pub struct Dag {
    name: String,
    dag: daggy::Dag<Vertex, Edge>,
    names: HashMap<String, VertexIndex>,
    topological: Vec<VertexIndex>,
    reverse_topological: Vec<VertexIndex>,
}

impl Dag {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn len(&self) -> usize {
        self.dag.node_count()
    }

    pub fn vertex(&self, index: VertexIndex) -> &Vertex {
        &self.dag[NodeIndex::new(index)]
    }

    pub fn vertex_by_name(&self, name: &str) -> Option<VertexIndex> {
        self.names.get(name).cloned()
    }

    /// Producers before consumers
    pub fn topological_order(&self) -> &[VertexIndex] {
        self.topological.as_slice()
    }

    /// Consumers before producers, the container start order
    pub fn reverse_topological_order(&self) -> &[VertexIndex] {
        self.reverse_topological.as_slice()
    }

    /// Inbound edges with the producer index, by target ordinal
    pub fn inbound_edges(&self, index: VertexIndex) -> Vec<(VertexIndex, &Edge)> {
        let mut edges: Vec<(VertexIndex, &Edge)> = self
            .dag
            .parents(NodeIndex::new(index))
            .iter(&self.dag)
            .map(|(edge_index, parent)| (parent.index(), &self.dag[edge_index]))
            .collect();
        edges.sort_by_key(|(_, edge)| edge.target_ordinal);
        edges
    }

    /// Outbound edges with the consumer index, by source ordinal
    pub fn outbound_edges(&self, index: VertexIndex) -> Vec<(VertexIndex, &Edge)> {
        let mut edges: Vec<(VertexIndex, &Edge)> = self
            .dag
            .children(NodeIndex::new(index))
            .iter(&self.dag)
            .map(|(edge_index, child)| (child.index(), &self.dag[edge_index]))
            .collect();
        edges.sort_by_key(|(_, edge)| edge.source_ordinal);
        edges
    }
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let vertices: Vec<&str> = self
            .topological
            .iter()
            .map(|index| self.vertex(*index).name())
            .collect();
        f.debug_struct("Dag")
            .field("name", &self.name)
            .field("vertices", &vertices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::dag::{DagBuilder, Edge, Routing, Vertex};
    use crate::functions::noop;
    use crate::processor::Processor;

    fn vertex(name: &str) -> Vertex {
        Vertex::new(name, || -> Box<dyn Processor> { noop() })
    }

    #[test]
    pub fn ordinals_test() {
        let mut builder = DagBuilder::new("ordinals");
        builder
            .vertex(vertex("a"))
            .vertex(vertex("b"))
            .vertex(vertex("c"))
            .edge(Edge::between("a", "c"))
            .edge(Edge::between("b", "c").partitioned())
            .edge(Edge::between("a", "b"));
        let dag = builder.build().unwrap();

        let c = dag.vertex_by_name("c").unwrap();
        let inbound = dag.inbound_edges(c);
        assert_eq!(inbound.len(), 2);
        assert_eq!(inbound[0].1.source, "a");
        assert_eq!(inbound[1].1.source, "b");
        assert_eq!(inbound[1].1.target_ordinal, 1);
        assert_eq!(inbound[1].1.routing, Routing::Partitioned);

        let a = dag.vertex_by_name("a").unwrap();
        let outbound = dag.outbound_edges(a);
        assert_eq!(outbound[0].1.target, "c");
        assert_eq!(outbound[1].1.target, "b");
        assert_eq!(outbound[1].1.source_ordinal, 1);

        assert_eq!(dag.topological_order(), &[0, 1, 2]);
        assert_eq!(dag.reverse_topological_order(), &[2, 1, 0]);
    }

    #[test]
    pub fn invalid_dag_test() {
        let mut builder = DagBuilder::new("dup");
        builder.vertex(vertex("a")).vertex(vertex("a"));
        assert!(builder.build().is_err());

        let mut builder = DagBuilder::new("unknown");
        builder.vertex(vertex("a")).edge(Edge::between("a", "x"));
        assert!(builder.build().is_err());

        let mut builder = DagBuilder::new("cycle");
        builder
            .vertex(vertex("a"))
            .vertex(vertex("b"))
            .edge(Edge::between("a", "b"))
            .edge(Edge::between("b", "a"));
        assert!(builder.build().is_err());

        let mut builder = DagBuilder::new("zero");
        builder.vertex(vertex("a").local_parallelism(0));
        assert!(builder.build().is_err());

        assert!(DagBuilder::new("empty").build().is_err());
    }

    #[test]
    pub fn random_reverse_topological_test() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let n = rng.gen_range(1..12usize);
            let mut builder = DagBuilder::new("random");
            // shuffled names so insertion order is not a topological order
            let mut ranks: Vec<usize> = (0..n).collect();
            for i in (1..n).rev() {
                ranks.swap(i, rng.gen_range(0..=i));
            }
            for i in 0..n {
                builder.vertex(vertex(format!("v{}", ranks[i]).as_str()));
            }
            let mut edges = Vec::new();
            for a in 0..n {
                for b in (a + 1)..n {
                    if rng.gen_bool(0.3) {
                        builder.edge(Edge::between(
                            format!("v{}", a).as_str(),
                            format!("v{}", b).as_str(),
                        ));
                        edges.push((a, b));
                    }
                }
            }

            let dag = builder.build().unwrap();
            let order = dag.reverse_topological_order();
            assert_eq!(order.len(), n);

            let position = |name: String| {
                let index = dag.vertex_by_name(name.as_str()).unwrap();
                order.iter().position(|x| *x == index).unwrap()
            };
            for (a, b) in edges {
                assert!(position(format!("v{}", b)) < position(format!("v{}", a)));
            }
        }
    }
}
