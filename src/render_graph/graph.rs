//! Render graph definition and compilation

use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("pass '{pass}' reads {target:?} before any pass has written it")]
    ReadBeforeWrite { pass: String, target: TargetId },
    #[error("render graph has a dependency cycle through '{pass}'")]
    Cycle { pass: String },
    #[error("unknown pass id {0:?}")]
    UnknownPass(PassId),
}

/// The frame's passes and the data dependencies between them.
///
/// `P` is whatever the caller executes per node; the graph only looks at the declared
/// [`PassUsage`]. Dependencies are derived from declaration order: a pass that touches a
/// target depends on the last earlier pass that wrote it (read-after-write, write-after-write),
/// and a writer depends on every earlier reader since the previous write (write-after-read).
pub struct RenderGraph<P> {
    passes: Vec<P>,
    pass_nodes: Vec<PassNode>,
    explicit: Vec<(PassId, PassId)>,
}

impl<P> RenderGraph<P> {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            pass_nodes: Vec::new(),
            explicit: Vec::new(),
        }
    }

    /// Add a pass to the graph
    pub fn add_pass(&mut self, name: &str, stage: FrameStage, usage: PassUsage, pass: P) -> PassId {
        let id = PassId(self.pass_nodes.len() as u32);
        self.passes.push(pass);
        self.pass_nodes.push(PassNode {
            id,
            name: name.to_string(),
            stage,
            usage,
        });
        id
    }

    /// Force `after` to run after `before` regardless of declared usage
    pub fn add_dependency(&mut self, before: PassId, after: PassId) -> Result<(), GraphError> {
        for id in [before, after] {
            if id.index() >= self.pass_nodes.len() {
                return Err(GraphError::UnknownPass(id));
            }
        }
        self.explicit.push((before, after));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pass_nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pass_nodes.is_empty()
    }

    pub fn pass(&self, id: PassId) -> Option<&P> {
        self.passes.get(id.index())
    }

    pub fn pass_node(&self, id: PassId) -> Option<&PassNode> {
        self.pass_nodes.get(id.index())
    }

    pub fn pass_nodes(&self) -> &[PassNode] {
        &self.pass_nodes
    }

    /// Passes in execution order together with their metadata
    pub fn ordered<'a>(
        &'a self,
        compiled: &'a CompiledGraph,
    ) -> impl Iterator<Item = (&'a PassNode, &'a P)> + 'a {
        compiled
            .pass_order
            .iter()
            .map(move |id| (&self.pass_nodes[id.index()], &self.passes[id.index()]))
    }

    /// Derive hazard edges and sort the passes topologically.
    ///
    /// Among passes that are ready at the same time, the earliest declared runs first, so a
    /// graph declared in a valid order executes in exactly that order.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        let count = self.pass_nodes.len();
        let mut dependencies: Vec<BTreeSet<PassId>> = vec![BTreeSet::new(); count];

        let mut last_writer: HashMap<TargetId, PassId> = HashMap::new();
        let mut readers: HashMap<TargetId, Vec<PassId>> = HashMap::new();

        for node in &self.pass_nodes {
            let deps = &mut dependencies[node.id.index()];

            for input in &node.usage.reads {
                match last_writer.get(&input.target) {
                    Some(&writer) => {
                        deps.insert(writer);
                    }
                    None => {
                        return Err(GraphError::ReadBeforeWrite {
                            pass: node.name.clone(),
                            target: input.target,
                        })
                    }
                }
                readers.entry(input.target).or_default().push(node.id);
            }

            for output in node.usage.writes.iter().chain(node.usage.releases.iter()) {
                if let Some(&writer) = last_writer.get(&output.target) {
                    if writer != node.id {
                        deps.insert(writer);
                    }
                }
                if let Some(previous) = readers.remove(&output.target) {
                    deps.extend(previous.into_iter().filter(|&r| r != node.id));
                }
                last_writer.insert(output.target, node.id);
            }
        }

        for &(before, after) in &self.explicit {
            dependencies[after.index()].insert(before);
        }

        // Kahn's algorithm; the min-heap keeps declaration order as the tie-break
        let mut in_degree: Vec<usize> = dependencies.iter().map(|d| d.len()).collect();
        let mut dependents: Vec<Vec<PassId>> = vec![Vec::new(); count];
        for (index, deps) in dependencies.iter().enumerate() {
            for dep in deps {
                dependents[dep.index()].push(PassId(index as u32));
            }
        }

        let mut ready: BinaryHeap<Reverse<PassId>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(index, _)| Reverse(PassId(index as u32)))
            .collect();

        let mut pass_order = Vec::with_capacity(count);
        while let Some(Reverse(pass_id)) = ready.pop() {
            pass_order.push(pass_id);
            for &dependent in &dependents[pass_id.index()] {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if pass_order.len() != count {
            let stuck = in_degree
                .iter()
                .position(|&deg| deg > 0)
                .map(|index| self.pass_nodes[index].name.clone())
                .unwrap_or_default();
            return Err(GraphError::Cycle { pass: stuck });
        }

        Ok(CompiledGraph {
            pass_order,
            dependencies,
        })
    }
}

impl<P> Default for RenderGraph<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiled render graph with execution order
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub pass_order: Vec<PassId>,
    dependencies: Vec<BTreeSet<PassId>>,
}

impl CompiledGraph {
    /// Whether `pass` has a direct edge from `on`
    pub fn depends_on(&self, pass: PassId, on: PassId) -> bool {
        self.dependencies
            .get(pass.index())
            .map_or(false, |deps| deps.contains(&on))
    }

    pub fn dependencies(&self, pass: PassId) -> impl Iterator<Item = PassId> + '_ {
        self.dependencies
            .get(pass.index())
            .into_iter()
            .flat_map(|deps| deps.iter().copied())
    }

    /// Position of `pass` in the execution order
    pub fn position(&self, pass: PassId) -> Option<usize> {
        self.pass_order.iter().position(|&p| p == pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ImageAccess;

    fn frame_graph(levels: u32) -> (RenderGraph<&'static str>, Vec<PassId>) {
        let mut graph = RenderGraph::new();
        let mut ids = Vec::new();

        ids.push(graph.add_pass(
            "shadow",
            FrameStage::Shadow,
            PassUsage::new()
                .write(TargetId::ShadowMap, ImageAccess::DepthAttachmentWrite)
                .release(TargetId::ShadowMap, ImageAccess::FragmentShaderRead),
            "shadow",
        ));
        ids.push(graph.add_pass(
            "main",
            FrameStage::Main,
            PassUsage::new()
                .read(TargetId::ShadowMap, ImageAccess::FragmentShaderRead)
                .write(TargetId::SceneColorMsaa, ImageAccess::ColorAttachmentWrite)
                .write(TargetId::SceneDepthMsaa, ImageAccess::DepthAttachmentWrite)
                .write(TargetId::SceneResolve, ImageAccess::ColorAttachmentWrite),
            "main",
        ));
        ids.push(graph.add_pass(
            "prefilter",
            FrameStage::BloomDownsample,
            PassUsage::new()
                .read(TargetId::SceneResolve, ImageAccess::FragmentShaderRead)
                .write(TargetId::Bloom(0), ImageAccess::ColorAttachmentWrite),
            "prefilter",
        ));
        for level in 1..levels {
            ids.push(graph.add_pass(
                "down",
                FrameStage::BloomDownsample,
                PassUsage::new()
                    .read(TargetId::Bloom(level - 1), ImageAccess::FragmentShaderRead)
                    .write(TargetId::Bloom(level), ImageAccess::ColorAttachmentWrite),
                "down",
            ));
        }
        for level in (0..levels - 1).rev() {
            ids.push(graph.add_pass(
                "up",
                FrameStage::BloomUpsample,
                PassUsage::new()
                    .read(TargetId::Bloom(level + 1), ImageAccess::FragmentShaderRead)
                    .write(TargetId::Bloom(level), ImageAccess::ColorAttachmentReadWrite),
                "up",
            ));
        }
        ids.push(graph.add_pass(
            "composite",
            FrameStage::Composite,
            PassUsage::new()
                .read(TargetId::SceneResolve, ImageAccess::FragmentShaderRead)
                .read(TargetId::Bloom(0), ImageAccess::FragmentShaderRead)
                .write(TargetId::Swapchain, ImageAccess::ColorAttachmentWrite),
            "composite",
        ));
        ids.push(graph.add_pass(
            "overlay",
            FrameStage::Overlay,
            PassUsage::new()
                .write(TargetId::Swapchain, ImageAccess::ColorAttachmentReadWrite)
                .release(TargetId::Swapchain, ImageAccess::Present),
            "overlay",
        ));
        (graph, ids)
    }

    #[test]
    fn test_frame_graph_keeps_declaration_order() {
        let (graph, ids) = frame_graph(5);
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order, ids);

        let stages: Vec<FrameStage> = graph.ordered(&compiled).map(|(node, _)| node.stage).collect();
        let mut sorted = stages.clone();
        sorted.sort();
        assert_eq!(stages, sorted);
    }

    #[test]
    fn test_hazard_edges() {
        let (graph, ids) = frame_graph(3);
        let compiled = graph.compile().unwrap();
        // ids: shadow, main, prefilter, down1, down2, up1, up0, composite, overlay
        let (shadow, main, prefilter, down1, down2, up1, up0, composite, overlay) = (
            ids[0], ids[1], ids[2], ids[3], ids[4], ids[5], ids[6], ids[7], ids[8],
        );

        assert!(compiled.depends_on(main, shadow));
        assert!(compiled.depends_on(prefilter, main));
        assert!(compiled.depends_on(down2, down1));
        // up1 reads bloom 2 written by down2 and overwrites bloom 1 read by down2
        assert!(compiled.depends_on(up1, down2));
        assert!(compiled.depends_on(up1, down1));
        assert!(compiled.depends_on(up0, up1));
        assert!(compiled.depends_on(up0, prefilter));
        assert!(compiled.depends_on(composite, up0));
        assert!(compiled.depends_on(overlay, composite));
        assert!(!compiled.depends_on(shadow, main));
    }

    #[test]
    fn test_out_of_order_declaration_is_sorted() {
        let mut graph = RenderGraph::new();
        let a = graph.add_pass(
            "a",
            FrameStage::Main,
            PassUsage::new().write(TargetId::SceneResolve, ImageAccess::ColorAttachmentWrite),
            'a',
        );
        let b = graph.add_pass(
            "b",
            FrameStage::Shadow,
            PassUsage::new().write(TargetId::ShadowMap, ImageAccess::DepthAttachmentWrite),
            'b',
        );
        graph.add_dependency(b, a).unwrap();

        let compiled = graph.compile().unwrap();
        let names: Vec<char> = graph.ordered(&compiled).map(|(_, p)| *p).collect();
        assert_eq!(names, vec!['b', 'a']);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = RenderGraph::new();
        let a = graph.add_pass(
            "a",
            FrameStage::Main,
            PassUsage::new().write(TargetId::SceneResolve, ImageAccess::ColorAttachmentWrite),
            (),
        );
        let b = graph.add_pass(
            "b",
            FrameStage::Composite,
            PassUsage::new().read(TargetId::SceneResolve, ImageAccess::FragmentShaderRead),
            (),
        );
        graph.add_dependency(b, a).unwrap();

        assert!(matches!(graph.compile(), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_read_before_write_rejected() {
        let mut graph = RenderGraph::new();
        graph.add_pass(
            "composite",
            FrameStage::Composite,
            PassUsage::new().read(TargetId::Bloom(0), ImageAccess::FragmentShaderRead),
            (),
        );
        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::ReadBeforeWrite {
                pass: "composite".to_string(),
                target: TargetId::Bloom(0),
            }
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph: RenderGraph<()> = RenderGraph::new();
        assert_eq!(
            graph.add_dependency(PassId(0), PassId(1)),
            Err(GraphError::UnknownPass(PassId(0)))
        );
    }
}
