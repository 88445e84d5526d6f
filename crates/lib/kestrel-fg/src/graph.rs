use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use wyhash::WyHash;

use kestrel_rhi::backend::CommandBuffer;

use crate::compiled_frame::{build_compiled_frame, CompiledFrame};
use crate::resource::{
    BufferCreateDescription, BufferReadDescription, GraphId, ImageCreateDescription,
    ImageReadDescription, ImageWriteDescription, INVALID_ID,
};
use crate::task::{ErasedExecuteFn, GraphTaskBuilder, TaskInfo, TaskNode, TaskPayload};

/// One vertex of the description DAG.
///
/// Reads and writes are modelled as intermediate nodes so that every
/// task <-> image relationship goes through a description carrying the
/// access details (the two-level DAG).
pub(crate) enum GraphNode {
    Task(TaskNode),
    ImageCreate {
        desc: ImageCreateDescription,
        creator: GraphId,
    },
    BufferCreate {
        desc: BufferCreateDescription,
        creator: GraphId,
    },
    ImageRead {
        desc: ImageReadDescription,
        task: GraphId,
    },
    ImageWrite {
        desc: ImageWriteDescription,
        task: GraphId,
    },
    BufferRead {
        desc: BufferReadDescription,
        task: GraphId,
    },
}

/// The description-level frame graph: a registry of task and resource
/// nodes populated by the user's frame builder callback each tick, baked
/// into an ordered, culled plan before execution.
pub struct FrameGraph {
    pub(crate) nodes: Vec<GraphNode>,
    /// Task node ids in insertion order.
    pub(crate) tasks: Vec<GraphId>,
    pub(crate) payloads: HashMap<GraphId, TaskPayload>,
    pub(crate) backbuffer: GraphId,
    pub(crate) compiled: Option<CompiledFrame>,
}

impl Default for FrameGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            tasks: Vec::new(),
            payloads: HashMap::new(),
            backbuffer: INVALID_ID,
            compiled: None,
        }
    }

    /// Throw away all descriptions and the plan; ids start over.
    /// Called before the user callback repopulates the registry.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.tasks.clear();
        self.payloads.clear();
        self.backbuffer = INVALID_ID;
        self.compiled = None;
    }

    pub fn baked(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn compiled(&self) -> Option<&CompiledFrame> {
        self.compiled.as_ref()
    }

    pub fn fingerprint(&self) -> Option<u64> {
        self.compiled.as_ref().map(|compiled| compiled.fingerprint)
    }

    pub fn set_backbuffer(&mut self, image: GraphId) {
        self.backbuffer = image;
    }

    pub fn add_raster_task<D, SetupFn, ExecFn>(
        &mut self,
        name: &str,
        on_setup: SetupFn,
        on_execute: ExecFn,
    ) -> GraphId
    where
        D: Default + Send + 'static,
        SetupFn: FnOnce(&mut D, &mut GraphTaskBuilder<'_>),
        ExecFn: FnMut(&D, &CommandBuffer) + Send + 'static,
    {
        self.add_task(TaskInfo::raster(name), on_setup, on_execute)
    }

    /// Register a task. `on_setup` runs right away against a fresh
    /// `D::default()` and declares the task's resources; `on_execute` is
    /// kept type-erased and replayed for every buffering slot when the
    /// plan is turned into physical frames.
    pub fn add_task<D, SetupFn, ExecFn>(
        &mut self,
        info: TaskInfo<'_>,
        on_setup: SetupFn,
        mut on_execute: ExecFn,
    ) -> GraphId
    where
        D: Default + Send + 'static,
        SetupFn: FnOnce(&mut D, &mut GraphTaskBuilder<'_>),
        ExecFn: FnMut(&D, &CommandBuffer) + Send + 'static,
    {
        assert!(
            self.compiled.is_none(),
            "Frame graph is already baked, writes are forbidden!"
        );

        let id = self.push_node(GraphNode::Task(TaskNode::new(info)));
        self.tasks.push(id);

        let mut data = Box::new(D::default());
        {
            let mut builder = GraphTaskBuilder { graph: self, task: id };
            on_setup(&mut data, &mut builder);
        }

        let on_execute: ErasedExecuteFn = Box::new(move |data: &dyn Any, cmb| {
            let data = data.downcast_ref::<D>().expect("Task data type mismatch!");
            on_execute(data, cmb);
        });

        self.payloads.insert(id, TaskPayload { data, on_execute });
        id
    }

    pub(crate) fn push_node(&mut self, node: GraphNode) -> GraphId {
        assert!(
            self.compiled.is_none(),
            "Frame graph is already baked, writes are forbidden!"
        );

        let id = GraphId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub(crate) fn task_node(&self, id: GraphId) -> &TaskNode {
        match &self.nodes[id.index()] {
            GraphNode::Task(task) => task,
            _ => panic!("Graph node {:?} is not a task!", id),
        }
    }

    pub(crate) fn task_node_mut(&mut self, id: GraphId) -> &mut TaskNode {
        match &mut self.nodes[id.index()] {
            GraphNode::Task(task) => task,
            _ => panic!("Graph node {:?} is not a task!", id),
        }
    }

    pub(crate) fn image_create(&self, id: GraphId) -> &ImageCreateDescription {
        match &self.nodes[id.index()] {
            GraphNode::ImageCreate { desc, .. } => desc,
            _ => panic!("Graph node {:?} is not an image create!", id),
        }
    }

    /// Bake the registry into an ordered, culled plan annotated with
    /// physical descriptors. Touches no GPU objects. Idempotent on an
    /// unchanged registry (reproduces the same fingerprint).
    pub fn bake(&mut self) -> anyhow::Result<()> {
        if !self.backbuffer.is_valid() {
            anyhow::bail!("No backbuffer was set before baking!");
        }
        if !matches!(
            self.nodes.get(self.backbuffer.index()),
            Some(GraphNode::ImageCreate { .. })
        ) {
            anyhow::bail!("Backbuffer {:?} is not a created image!", self.backbuffer);
        }
        self.validate_references()?;

        let alive = self.cull_unreferenced();
        let sorted = self.topological_sort(&alive)?;
        let fingerprint = self.fingerprint_of(&sorted);

        glog::trace!(
            "Frame graph baked: {} of {} tasks survived (fingerprint {:#018x})",
            sorted.len(),
            self.tasks.len(),
            fingerprint
        );

        self.compiled = Some(build_compiled_frame(self, &sorted, fingerprint));
        Ok(())
    }

    /// Every read/write must point at a live create node of the matching kind.
    fn validate_references(&self) -> anyhow::Result<()> {
        for node in &self.nodes {
            match node {
                GraphNode::ImageRead { desc, .. } => {
                    if !matches!(
                        self.nodes.get(desc.image.index()),
                        Some(GraphNode::ImageCreate { .. })
                    ) {
                        anyhow::bail!("Image read references unknown image {:?}!", desc.image);
                    }
                }
                GraphNode::ImageWrite { desc, .. } => {
                    if !matches!(
                        self.nodes.get(desc.image.index()),
                        Some(GraphNode::ImageCreate { .. })
                    ) {
                        anyhow::bail!("Image write references unknown image {:?}!", desc.image);
                    }
                }
                GraphNode::BufferRead { desc, .. } => {
                    if !matches!(
                        self.nodes.get(desc.buffer.index()),
                        Some(GraphNode::BufferCreate { .. })
                    ) {
                        anyhow::bail!("Buffer read references unknown buffer {:?}!", desc.buffer);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn resource_is_transient(&self, id: GraphId) -> bool {
        match &self.nodes[id.index()] {
            GraphNode::ImageCreate { desc, .. } => desc.transient,
            GraphNode::BufferCreate { desc, .. } => desc.transient,
            _ => false,
        }
    }

    fn resource_is_imune(&self, id: GraphId) -> bool {
        let flagged = match &self.nodes[id.index()] {
            GraphNode::ImageCreate { desc, .. } => desc.cull_imune,
            GraphNode::BufferCreate { desc, .. } => desc.cull_imune,
            _ => false,
        };

        // the final resource roots the live subgraph
        flagged || id == self.backbuffer
    }

    fn resource_creator(&self, id: GraphId) -> GraphId {
        match &self.nodes[id.index()] {
            GraphNode::ImageCreate { creator, .. } => *creator,
            GraphNode::BufferCreate { creator, .. } => *creator,
            _ => panic!("Graph node {:?} is not a resource create!", id),
        }
    }

    fn read_target(&self, id: GraphId) -> GraphId {
        match &self.nodes[id.index()] {
            GraphNode::ImageRead { desc, .. } => desc.image,
            GraphNode::BufferRead { desc, .. } => desc.buffer,
            _ => panic!("Graph node {:?} is not a read!", id),
        }
    }

    /// Reference-count based culling.
    ///
    /// A task's ref count is its output count (creates + writes), a
    /// resource's ref count its reader count. Unreferenced transient
    /// resources propagate: the creator and every writer lose a ref,
    /// tasks reaching zero (unless imune) are culled and release
    /// everything they read. Returns the per-task survival mask, indexed
    /// by node id.
    fn cull_unreferenced(&self) -> Vec<bool> {
        let node_count = self.nodes.len();
        let mut refs = vec![0u32; node_count];
        let mut culled = vec![false; node_count];

        // resource id -> tasks writing it
        let mut writers: HashMap<GraphId, Vec<GraphId>> = HashMap::new();

        for &task_id in &self.tasks {
            let task = self.task_node(task_id);
            refs[task_id.index()] = (task.creates.len() + task.writes.len()) as u32;

            for &read_id in &task.reads {
                refs[self.read_target(read_id).index()] += 1;
            }
            for &write_id in &task.writes {
                if let GraphNode::ImageWrite { desc, .. } = &self.nodes[write_id.index()] {
                    writers.entry(desc.image).or_default().push(task_id);
                }
            }
        }

        let mut unreferenced: VecDeque<GraphId> = VecDeque::new();
        // each resource releases its producers at most once
        let mut enqueued = vec![false; node_count];

        let is_unreferenced = |id: GraphId, refs: &[u32]| {
            refs[id.index()] == 0 && self.resource_is_transient(id) && !self.resource_is_imune(id)
        };

        // a culled task releases everything it reads
        fn cull_task(
            graph: &FrameGraph,
            task_id: GraphId,
            refs: &mut [u32],
            culled: &mut [bool],
            enqueued: &mut [bool],
            unreferenced: &mut VecDeque<GraphId>,
            is_unreferenced: &dyn Fn(GraphId, &[u32]) -> bool,
        ) {
            if culled[task_id.index()] {
                return;
            }
            culled[task_id.index()] = true;

            let task = graph.task_node(task_id);
            for &read_id in &task.reads {
                let resource = graph.read_target(read_id);
                let resource_refs = &mut refs[resource.index()];
                *resource_refs = resource_refs.saturating_sub(1);

                if !enqueued[resource.index()] && is_unreferenced(resource, refs) {
                    enqueued[resource.index()] = true;
                    unreferenced.push_back(resource);
                }
            }
        }

        // tasks producing nothing are dead on arrival
        for &task_id in &self.tasks {
            if refs[task_id.index()] == 0 && !self.task_node(task_id).cull_imune {
                cull_task(
                    self,
                    task_id,
                    &mut refs,
                    &mut culled,
                    &mut enqueued,
                    &mut unreferenced,
                    &is_unreferenced,
                );
            }
        }

        // seed with unreferenced transient resources
        for (index, node) in self.nodes.iter().enumerate() {
            if matches!(
                node,
                GraphNode::ImageCreate { .. } | GraphNode::BufferCreate { .. }
            ) {
                let id = GraphId(index as u32);
                if !enqueued[index] && is_unreferenced(id, &refs) {
                    enqueued[index] = true;
                    unreferenced.push_back(id);
                }
            }
        }

        while let Some(resource) = unreferenced.pop_front() {
            let mut producers = vec![self.resource_creator(resource)];
            if let Some(resource_writers) = writers.get(&resource) {
                producers.extend_from_slice(resource_writers);
            }

            for producer in producers {
                let producer_refs = &mut refs[producer.index()];
                *producer_refs = producer_refs.saturating_sub(1);

                if *producer_refs == 0 && !self.task_node(producer).cull_imune {
                    cull_task(
                        self,
                        producer,
                        &mut refs,
                        &mut culled,
                        &mut enqueued,
                        &mut unreferenced,
                        &is_unreferenced,
                    );
                }
            }
        }

        let mut alive = vec![false; node_count];
        for &task_id in &self.tasks {
            alive[task_id.index()] = !culled[task_id.index()];
        }
        alive
    }

    /// Kahn's algorithm over the surviving tasks. Every create/write of a
    /// resource precedes every read of it. Fails on cycles.
    fn topological_sort(&self, alive: &[bool]) -> anyhow::Result<Vec<GraphId>> {
        let node_count = self.nodes.len();
        let mut indegree = vec![0u32; node_count];
        let mut adjacency: HashMap<GraphId, Vec<GraphId>> = HashMap::new();

        // resource id -> surviving producer tasks (creator first, then writers)
        let mut producers: HashMap<GraphId, Vec<GraphId>> = HashMap::new();
        for &task_id in &self.tasks {
            if !alive[task_id.index()] {
                continue;
            }
            let task = self.task_node(task_id);
            for &create_id in &task.creates {
                producers.entry(create_id).or_default().push(task_id);
            }
            for &write_id in &task.writes {
                if let GraphNode::ImageWrite { desc, .. } = &self.nodes[write_id.index()] {
                    producers.entry(desc.image).or_default().push(task_id);
                }
            }
        }

        let mut add_edge = |from: GraphId, to: GraphId, indegree: &mut [u32]| {
            if from == to {
                return;
            }
            adjacency.entry(from).or_default().push(to);
            indegree[to.index()] += 1;
        };

        for &task_id in &self.tasks {
            if !alive[task_id.index()] {
                continue;
            }
            let task = self.task_node(task_id);

            // producer -> consumer
            for &read_id in &task.reads {
                let resource = self.read_target(read_id);
                if let Some(resource_producers) = producers.get(&resource) {
                    for &producer in resource_producers {
                        if alive[producer.index()] {
                            add_edge(producer, task_id, &mut indegree);
                        }
                    }
                }
            }

            // creator -> writer
            for &write_id in &task.writes {
                if let GraphNode::ImageWrite { desc, .. } = &self.nodes[write_id.index()] {
                    let creator = self.resource_creator(desc.image);
                    if alive[creator.index()] {
                        add_edge(creator, task_id, &mut indegree);
                    }
                }
            }
        }

        let mut ready: VecDeque<GraphId> = self
            .tasks
            .iter()
            .copied()
            .filter(|id| alive[id.index()] && indegree[id.index()] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.tasks.len());
        while let Some(task_id) = ready.pop_front() {
            sorted.push(task_id);

            if let Some(successors) = adjacency.get(&task_id) {
                for &successor in successors {
                    let count = &mut indegree[successor.index()];
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(successor);
                    }
                }
            }
        }

        let surviving = self.tasks.iter().filter(|id| alive[id.index()]).count();
        if sorted.len() != surviving {
            anyhow::bail!("Cycle detected!");
        }
        Ok(sorted)
    }

    /// Order-sensitive fingerprint of the sorted task sequence, used by
    /// the frame pool to recognize an unchanged plan.
    fn fingerprint_of(&self, sorted: &[GraphId]) -> u64 {
        let mut hasher = WyHash::with_seed(0);

        for &task_id in sorted {
            let task = self.task_node(task_id);
            task.name.hash(&mut hasher);
            task.ty.hash(&mut hasher);
            task.cull_imune.hash(&mut hasher);

            for &child in task
                .creates
                .iter()
                .chain(task.reads.iter())
                .chain(task.writes.iter())
            {
                match &self.nodes[child.index()] {
                    GraphNode::ImageCreate { desc, .. } => desc.hash(&mut hasher),
                    GraphNode::BufferCreate { desc, .. } => desc.hash(&mut hasher),
                    GraphNode::ImageRead { desc, .. } => desc.hash(&mut hasher),
                    GraphNode::ImageWrite { desc, .. } => desc.hash(&mut hasher),
                    GraphNode::BufferRead { desc, .. } => desc.hash(&mut hasher),
                    GraphNode::Task(_) => unreachable!(),
                }
            }
        }

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    use crate::resource::ImageCreateDescription;

    fn image(name: &str) -> ImageCreateDescription {
        ImageCreateDescription::new_2d(name, [64, 64], vk::Format::R8G8B8A8_UNORM)
    }

    #[test]
    fn mutual_reads_detect_cycle() {
        let mut graph = FrameGraph::new();

        let mut a = INVALID_ID;
        let first = graph.add_raster_task::<(), _, _>(
            "first",
            |_, builder| {
                a = builder.create_image(image("a"));
                builder.set_backbuffer(a);
            },
            |_, _| {},
        );

        let mut b = INVALID_ID;
        graph.add_raster_task::<(), _, _>(
            "second",
            |_, builder| {
                b = builder.create_image(image("b"));
                builder.read_image(a, vk::ImageViewType::TYPE_2D);
            },
            |_, _| {},
        );

        // close the loop: "first" also reads what "second" created
        {
            let mut builder = GraphTaskBuilder {
                graph: &mut graph,
                task: first,
            };
            builder.read_image(b, vk::ImageViewType::TYPE_2D);
        }

        let err = graph.bake().unwrap_err();
        assert!(err.to_string().contains("Cycle"));
    }

    #[test]
    fn unknown_image_reference_fails_bake() {
        let mut graph = FrameGraph::new();

        graph.add_raster_task::<(), _, _>(
            "render",
            |_, builder| {
                let target = builder.create_image(image("target"));
                builder.set_backbuffer(target);
                builder.read_image(GraphId(99), vk::ImageViewType::TYPE_2D);
            },
            |_, _| {},
        );

        let err = graph.bake().unwrap_err();
        assert!(err.to_string().contains("unknown image"));
    }

    #[test]
    #[should_panic(expected = "already baked")]
    fn writes_after_bake_are_forbidden() {
        let mut graph = FrameGraph::new();

        graph.add_raster_task::<(), _, _>(
            "render",
            |_, builder| {
                let target = builder.create_image(image("target"));
                builder.set_backbuffer(target);
            },
            |_, _| {},
        );
        graph.bake().unwrap();

        graph.add_raster_task::<(), _, _>("late", |_, _| {}, |_, _| {});
    }
}
