use crate::pass::PassDescriptor;
use crate::{
    CommandList, FrameGraphError, PassBuilder, PassCollectConfig, PassContext, PassId, PassKind,
    PostProcessPassBuilder, QueueId, ResourceHandle, Result,
};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Why one pass must run before another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependencyKind {
    Explicit,
    Attachment,
    Resource(ResourceHandle),
}

/// Declarative list of passes compiled into a deterministic execution order.
///
/// Passes are nodes in insertion order, so a node index doubles as the
/// pass's [`PassId`]. Edges are rebuilt from the declarations on every
/// `compile`.
#[derive(Default)]
pub struct FrameGraph {
    graph: DiGraph<PassDescriptor, DependencyKind>,
    execution_order: Vec<NodeIndex>,
    execution_positions: Vec<usize>,
    compiled: bool,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn descriptor(&self, id: PassId) -> &PassDescriptor {
        &self.graph[NodeIndex::new(id.0)]
    }

    pub(crate) fn descriptor_mut(&mut self, id: PassId) -> &mut PassDescriptor {
        &mut self.graph[NodeIndex::new(id.0)]
    }

    fn invalidate(&mut self) {
        self.compiled = false;
        self.execution_order.clear();
        self.execution_positions.clear();
    }

    /// Adds a scene pass.
    pub fn add_pass(&mut self, name: &str) -> PassBuilder<'_> {
        self.add_pass_of_kind(name, PassKind::Scene)
    }

    pub fn add_pass_of_kind(&mut self, name: &str, kind: PassKind) -> PassBuilder<'_> {
        self.invalidate();
        let node = self.graph.add_node(PassDescriptor::new(name, kind));
        PassBuilder::new(self, PassId(node.index()))
    }

    pub fn add_scene_pass(&mut self, name: &str) -> PassBuilder<'_> {
        self.add_pass_of_kind(name, PassKind::Scene)
    }

    pub fn add_light_pass(&mut self, name: &str) -> PassBuilder<'_> {
        self.add_pass_of_kind(name, PassKind::Light)
    }

    pub fn add_effect_pass(&mut self, name: &str) -> PassBuilder<'_> {
        self.add_pass_of_kind(name, PassKind::Effect)
    }

    pub fn add_post_process_pass(&mut self, name: &str) -> PostProcessPassBuilder<'_> {
        PostProcessPassBuilder::new(self.add_pass_of_kind(name, PassKind::PostProcess))
    }

    /// Discards every pass and the published order.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.invalidate();
    }

    pub fn declared_pass_count(&self) -> usize {
        self.graph.node_count()
    }

    fn build_dependency_edges(&mut self) {
        let pass_count = self.graph.node_count();
        let node_indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        let mut edges_to_add: Vec<(usize, NodeIndex, DependencyKind)> = Vec::new();
        let mut resource_writers: HashMap<ResourceHandle, Vec<NodeIndex>> = HashMap::new();

        for &node_index in &node_indices {
            let pass = &self.graph[node_index];

            for dependency in &pass.dependencies {
                edges_to_add.push((dependency.0, node_index, DependencyKind::Explicit));
            }

            let attachments = pass
                .color_attachments
                .iter()
                .chain(pass.depth_stencil_attachment.iter());
            for source in attachments.filter_map(|attachment| attachment.source) {
                edges_to_add.push((source.pass.0, node_index, DependencyKind::Attachment));
            }

            for &resource in &pass.writes {
                resource_writers.entry(resource).or_default().push(node_index);
            }
        }

        for &node_index in &node_indices {
            for &resource in &self.graph[node_index].reads {
                if let Some(writers) = resource_writers.get(&resource) {
                    for writer in writers {
                        edges_to_add.push((
                            writer.index(),
                            node_index,
                            DependencyKind::Resource(resource),
                        ));
                    }
                }
            }
        }

        for (from, to, kind) in edges_to_add {
            if from >= pass_count || from == to.index() {
                log::trace!("Ignoring dependency {from} -> {} ({kind:?})", to.index());
                continue;
            }
            let from = NodeIndex::new(from);
            if self.graph.find_edge(from, to).is_none() {
                self.graph.add_edge(from, to, kind);
            }
        }
    }

    /// Kahn's algorithm; among ready passes the earliest inserted goes first.
    fn topological_order(&self) -> Vec<NodeIndex> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(index)) = ready.pop() {
            let node = NodeIndex::new(index);
            order.push(node);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }
        order
    }

    fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<NodeIndex> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flatten()
            .collect();
        members.sort();
        members
            .into_iter()
            .map(|node| self.graph[node].name.clone())
            .collect()
    }

    /// Derives dependencies from the declarations and publishes the
    /// execution order. On a cycle no order is published.
    pub fn compile(&mut self) -> Result<()> {
        self.invalidate();
        self.graph.clear_edges();
        self.build_dependency_edges();

        let order = self.topological_order();
        if order.len() != self.graph.node_count() {
            let passes = self.cycle_members();
            log::debug!("Frame graph compile failed, cycle through {passes:?}");
            return Err(FrameGraphError::CyclicDependency { passes });
        }

        let mut positions = vec![0; order.len()];
        for (position, node) in order.iter().enumerate() {
            positions[node.index()] = position;
        }
        self.execution_positions = positions;
        self.execution_order = order;
        self.compiled = true;

        log::debug!(
            "Frame graph compiled: {} passes, {} edges",
            self.execution_order.len(),
            self.graph.edge_count()
        );
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Number of passes in the compiled order, 0 before a successful compile.
    pub fn pass_count(&self) -> usize {
        self.execution_order.len()
    }

    pub fn execution_order(&self) -> Vec<PassId> {
        self.execution_order
            .iter()
            .map(|node| PassId(node.index()))
            .collect()
    }

    fn compiled_pass(&self, execution_index: usize) -> Option<&PassDescriptor> {
        self.execution_order
            .get(execution_index)
            .map(|&node| &self.graph[node])
    }

    pub fn pass_id(&self, execution_index: usize) -> Option<PassId> {
        self.execution_order
            .get(execution_index)
            .map(|node| PassId(node.index()))
    }

    pub fn pass_name(&self, execution_index: usize) -> Option<&str> {
        self.compiled_pass(execution_index)
            .map(|pass| pass.name.as_str())
    }

    pub fn pass_queue(&self, execution_index: usize) -> Option<QueueId> {
        self.compiled_pass(execution_index).map(|pass| pass.queue)
    }

    pub fn pass_reads(&self, execution_index: usize) -> &[ResourceHandle] {
        self.compiled_pass(execution_index)
            .map(|pass| pass.reads.as_slice())
            .unwrap_or(&[])
    }

    pub fn pass_writes(&self, execution_index: usize) -> &[ResourceHandle] {
        self.compiled_pass(execution_index)
            .map(|pass| pass.writes.as_slice())
            .unwrap_or(&[])
    }

    pub fn pass_touches_back_buffer(&self, execution_index: usize) -> bool {
        self.compiled_pass(execution_index)
            .is_some_and(|pass| pass.touches_back_buffer)
    }

    /// Execution indices of the passes that must run before this one, ascending.
    pub fn pass_dependencies(&self, execution_index: usize) -> Vec<usize> {
        let Some(&node) = self.execution_order.get(execution_index) else {
            return Vec::new();
        };
        let mut dependencies: Vec<usize> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|producer| self.execution_positions[producer.index()])
            .collect();
        dependencies.sort_unstable();
        dependencies
    }

    pub fn pass_collect_config(&self, execution_index: usize) -> Option<PassCollectConfig> {
        self.compiled_pass(execution_index)
            .map(PassDescriptor::collect_config)
    }

    /// Runs the execute callback of the pass at `execution_index`. Passes
    /// without a callback record nothing.
    pub fn execute_pass(
        &mut self,
        execution_index: usize,
        context: &PassContext<'_>,
        command_list: &mut CommandList,
    ) -> Result<()> {
        if !self.compiled {
            return Err(FrameGraphError::NotCompiled);
        }
        let node = *self.execution_order.get(execution_index).ok_or(
            FrameGraphError::PassOutOfRange {
                index: execution_index,
                count: self.execution_order.len(),
            },
        )?;
        let pass = &mut self.graph[node];
        match pass.executor.as_mut() {
            Some(executor) => executor.execute(context, command_list),
            None => {
                log::trace!("Pass '{}' has no execute callback", pass.name);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RawCommandList, ResourceHandle};

    fn names(graph: &FrameGraph) -> Vec<&str> {
        (0..graph.pass_count())
            .filter_map(|index| graph.pass_name(index))
            .collect()
    }

    #[test]
    fn empty_graph_compiles() {
        let mut graph = FrameGraph::new();
        graph.compile().unwrap();
        assert_eq!(graph.pass_count(), 0);
        assert!(graph.is_compiled());
    }

    #[test]
    fn producer_precedes_consumer() {
        let mut graph = FrameGraph::new();
        let color = ResourceHandle::texture(1);
        graph.add_pass("consumer").declare_read(color);
        graph.add_pass("producer").declare_write(color);
        graph.compile().unwrap();

        assert_eq!(names(&graph), vec!["producer", "consumer"]);
        assert_eq!(graph.pass_dependencies(1), vec![0]);
    }

    #[test]
    fn independent_passes_keep_insertion_order() {
        let mut graph = FrameGraph::new();
        for name in ["c", "a", "b"] {
            graph.add_pass(name);
        }
        graph.compile().unwrap();
        assert_eq!(names(&graph), vec!["c", "a", "b"]);
    }

    #[test]
    fn smallest_ready_index_goes_first() {
        let mut graph = FrameGraph::new();
        let late = graph.add_pass("late").id();
        graph.add_pass("early");
        graph.add_pass("after_late").depends_on(late);
        graph.compile().unwrap();
        assert_eq!(names(&graph), vec!["late", "early", "after_late"]);
    }

    #[test]
    fn explicit_dependency_orders_passes() {
        let mut graph = FrameGraph::new();
        graph.add_pass("second").depends_on(PassId(1));
        graph.add_pass("first");
        graph.compile().unwrap();
        assert_eq!(names(&graph), vec!["first", "second"]);
    }

    #[test]
    fn self_and_out_of_range_dependencies_are_ignored() {
        let mut graph = FrameGraph::new();
        graph
            .add_pass("only")
            .depends_on(PassId(0))
            .depends_on(PassId(42));
        graph.compile().unwrap();
        assert_eq!(graph.pass_count(), 1);
    }

    #[test]
    fn read_write_same_resource_has_no_self_edge() {
        let mut graph = FrameGraph::new();
        let accumulation = ResourceHandle::texture(3);
        graph
            .add_pass("accumulate")
            .declare_read(accumulation)
            .declare_write(accumulation);
        graph.compile().unwrap();
        assert_eq!(graph.pass_count(), 1);
    }

    #[test]
    fn attachment_source_adds_edge() {
        let mut graph = FrameGraph::new();
        let target = ResourceHandle::texture(1);
        graph.add_pass("overlay").add_color_attachment(
            crate::PassAttachmentDesc::color(target)
                .with_load_op(crate::AttachmentLoadOp::Load)
                .from_pass(PassId(1), 0),
        );
        graph
            .add_pass("base")
            .add_color_attachment(crate::PassAttachmentDesc::color(target));
        graph.compile().unwrap();
        assert_eq!(names(&graph), vec!["base", "overlay"]);
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let mut graph = FrameGraph::new();
        let a = graph.add_pass("a").id();
        let b = graph.add_pass("b").depends_on(a).id();
        graph.add_pass("c");
        graph.descriptor_mut(a).dependencies.push(b);

        match graph.compile() {
            Err(FrameGraphError::CyclicDependency { passes }) => {
                assert_eq!(passes, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
        assert_eq!(graph.pass_count(), 0);
        assert!(!graph.is_compiled());
    }

    #[test]
    fn adding_a_pass_unpublishes_order() {
        let mut graph = FrameGraph::new();
        graph.add_pass("a");
        graph.compile().unwrap();
        graph.add_pass("b");
        assert_eq!(graph.pass_count(), 0);
        assert_eq!(graph.declared_pass_count(), 2);
    }

    #[test]
    fn execute_pass_runs_callback() {
        let mut graph = FrameGraph::new();
        graph
            .add_pass("draw")
            .set_execute_callback(|context: &PassContext<'_>, command_list: &mut CommandList| {
                command_list.draw(3, context.execution_index() as u32 + 1);
                Ok(())
            });

        let mut command_list = CommandList::new(RawCommandList(1), QueueId::Graphics);
        let context = PassContext::new(0);
        assert!(matches!(
            graph.execute_pass(0, &context, &mut command_list),
            Err(FrameGraphError::NotCompiled)
        ));

        graph.compile().unwrap();
        graph.execute_pass(0, &context, &mut command_list).unwrap();
        assert_eq!(command_list.len(), 1);
        assert!(matches!(
            graph.execute_pass(1, &context, &mut command_list),
            Err(FrameGraphError::PassOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn clear_discards_passes() {
        let mut graph = FrameGraph::new();
        graph.add_pass("a");
        graph.compile().unwrap();
        graph.clear();
        assert_eq!(graph.declared_pass_count(), 0);
        assert_eq!(graph.pass_count(), 0);
    }
}
