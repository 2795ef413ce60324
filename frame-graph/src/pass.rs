use crate::{
    CommandList, FrameGraph, QueueId, RawBuffer, RawTexture, ResourceHandle, ResourceLifetime,
    Result, TransientResourcePool,
};
use std::ops::{Deref, DerefMut};
use wgpu::TextureFormat;

pub const MAX_PASS_COLOR_ATTACHMENTS: usize = 8;
pub const MAX_PASS_RENDER_ITEM_SLOTS: usize = 4;
pub const FULLSCREEN_QUAD_MESH: &str = "fullscreen_quad";

/// Insertion index of a pass in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub usize);

impl PassId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    FrustumCull,
    OcclusionCull,
    FrustumAndOcclusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderType {
    #[default]
    Opaque,
    Transparent,
    Overlay,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassKind {
    #[default]
    Scene,
    Light,
    PostProcess,
    Effect,
    Custom,
}

impl PassKind {
    pub fn default_content_source(self) -> PassContentSource {
        match self {
            Self::Scene => PassContentSource::FromModelComponent,
            Self::Light => PassContentSource::FromLightComponent,
            Self::PostProcess | Self::Effect => PassContentSource::FromPassDefined,
            Self::Custom => PassContentSource::Custom,
        }
    }
}

/// Where a pass gets the things it draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassContentSource {
    #[default]
    FromModelComponent,
    FromLightComponent,
    FromPassDefined,
    Custom,
}

/// Kind of a pass together with the data only that kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PassKindData {
    #[default]
    Scene,
    Light,
    PostProcess {
        material: Option<String>,
        mesh: Option<String>,
    },
    Effect,
    Custom,
}

impl PassKindData {
    pub fn from_kind(kind: PassKind) -> Self {
        match kind {
            PassKind::Scene => Self::Scene,
            PassKind::Light => Self::Light,
            PassKind::PostProcess => Self::PostProcess {
                material: None,
                mesh: None,
            },
            PassKind::Effect => Self::Effect,
            PassKind::Custom => Self::Custom,
        }
    }

    pub fn kind(&self) -> PassKind {
        match self {
            Self::Scene => PassKind::Scene,
            Self::Light => PassKind::Light,
            Self::PostProcess { .. } => PassKind::PostProcess,
            Self::Effect => PassKind::Effect,
            Self::Custom => PassKind::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentLoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentStoreOp {
    #[default]
    Store,
    DontCare,
}

/// Attachment of an earlier pass that this attachment continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentSource {
    pub pass: PassId,
    pub attachment: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassAttachmentDesc {
    pub handle: ResourceHandle,
    /// Zero means the pool's default width.
    pub width: u32,
    /// Zero means the pool's default height.
    pub height: u32,
    /// `None` infers a format from the depth flag.
    pub format: Option<TextureFormat>,
    pub is_depth_stencil: bool,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub lifetime: ResourceLifetime,
    pub source: Option<AttachmentSource>,
}

impl PassAttachmentDesc {
    pub fn color(handle: ResourceHandle) -> Self {
        Self {
            handle,
            ..Default::default()
        }
    }

    pub fn depth(handle: ResourceHandle) -> Self {
        Self {
            handle,
            is_depth_stencil: true,
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_load_op(mut self, load_op: AttachmentLoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    pub fn with_store_op(mut self, store_op: AttachmentStoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.lifetime = ResourceLifetime::Persistent;
        self
    }

    pub fn from_pass(mut self, pass: PassId, attachment: usize) -> Self {
        self.source = Some(AttachmentSource { pass, attachment });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutputDesc {
    pub width: u32,
    pub height: u32,
    pub color_attachment_count: u32,
    pub use_depth_stencil: bool,
    pub color_formats: [Option<TextureFormat>; MAX_PASS_COLOR_ATTACHMENTS],
}

impl Default for PassOutputDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            color_attachment_count: 1,
            use_depth_stencil: false,
            color_formats: [None; MAX_PASS_COLOR_ATTACHMENTS],
        }
    }
}

/// Everything a content producer needs to gather work for one compiled pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassCollectConfig {
    pub pass_name: String,
    pub pass_kind: PassKind,
    pub content_source: PassContentSource,
    pub queue: QueueId,
    pub cull_mode: CullMode,
    pub render_type: RenderType,
    pub output: PassOutputDesc,
    pub color_attachments: Vec<PassAttachmentDesc>,
    pub depth_stencil_attachment: Option<PassAttachmentDesc>,
    pub material_name: Option<String>,
    pub mesh_name: Option<String>,
    pub read_resource_ids: Vec<u64>,
}

/// Read-only list of collected render items.
pub trait RenderItemList: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait LightItemList: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-frame inputs handed to every execute callback.
#[derive(Clone, Copy, Default)]
pub struct PassContext<'a> {
    frame_index: u64,
    execution_index: usize,
    pool: Option<&'a TransientResourcePool>,
    render_items: [Option<&'a dyn RenderItemList>; MAX_PASS_RENDER_ITEM_SLOTS],
    light_items: Option<&'a dyn LightItemList>,
}

impl<'a> PassContext<'a> {
    pub fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            ..Default::default()
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn execution_index(&self) -> usize {
        self.execution_index
    }

    /// Out-of-range slots are ignored.
    pub fn set_render_item_list(&mut self, slot: usize, list: &'a dyn RenderItemList) {
        match self.render_items.get_mut(slot) {
            Some(entry) => *entry = Some(list),
            None => log::warn!("Render item slot {slot} out of range"),
        }
    }

    pub fn render_item_list(&self, slot: usize) -> Option<&'a dyn RenderItemList> {
        self.render_items.get(slot).copied().flatten()
    }

    pub fn set_light_item_list(&mut self, list: &'a dyn LightItemList) {
        self.light_items = Some(list);
    }

    pub fn light_item_list(&self) -> Option<&'a dyn LightItemList> {
        self.light_items
    }

    pub fn pool(&self) -> Option<&'a TransientResourcePool> {
        self.pool
    }

    pub fn texture(&self, handle: ResourceHandle) -> Option<RawTexture> {
        self.pool.and_then(|pool| pool.texture(handle))
    }

    pub fn buffer(&self, handle: ResourceHandle) -> Option<RawBuffer> {
        self.pool.and_then(|pool| pool.buffer(handle))
    }

    /// Copy of this context positioned at one compiled pass.
    pub fn for_pass<'b>(
        &self,
        execution_index: usize,
        pool: &'b TransientResourcePool,
    ) -> PassContext<'b>
    where
        'a: 'b,
    {
        PassContext {
            frame_index: self.frame_index,
            execution_index,
            pool: Some(pool),
            render_items: self.render_items,
            light_items: self.light_items,
        }
    }
}

/// Work recorded for a pass once the frame graph is compiled.
pub trait PassExecutor: Send {
    fn execute(&mut self, context: &PassContext<'_>, command_list: &mut CommandList)
    -> Result<()>;
}

impl<F> PassExecutor for F
where
    F: FnMut(&PassContext<'_>, &mut CommandList) -> Result<()> + Send,
{
    fn execute(
        &mut self,
        context: &PassContext<'_>,
        command_list: &mut CommandList,
    ) -> Result<()> {
        self(context, command_list)
    }
}

pub(crate) struct PassDescriptor {
    pub(crate) name: String,
    pub(crate) kind: PassKindData,
    pub(crate) content_source: PassContentSource,
    pub(crate) queue: QueueId,
    pub(crate) cull_mode: CullMode,
    pub(crate) render_type: RenderType,
    pub(crate) output: PassOutputDesc,
    pub(crate) color_attachments: Vec<PassAttachmentDesc>,
    pub(crate) depth_stencil_attachment: Option<PassAttachmentDesc>,
    pub(crate) reads: Vec<ResourceHandle>,
    pub(crate) writes: Vec<ResourceHandle>,
    pub(crate) dependencies: Vec<PassId>,
    pub(crate) touches_back_buffer: bool,
    pub(crate) executor: Option<Box<dyn PassExecutor>>,
}

impl PassDescriptor {
    pub(crate) fn new(name: &str, kind: PassKind) -> Self {
        Self {
            name: name.to_string(),
            kind: PassKindData::from_kind(kind),
            content_source: kind.default_content_source(),
            queue: QueueId::Graphics,
            cull_mode: CullMode::default(),
            render_type: RenderType::default(),
            output: PassOutputDesc::default(),
            color_attachments: Vec::new(),
            depth_stencil_attachment: None,
            reads: Vec::new(),
            writes: Vec::new(),
            dependencies: Vec::new(),
            touches_back_buffer: false,
            executor: None,
        }
    }

    pub(crate) fn collect_config(&self) -> PassCollectConfig {
        let (material_name, mesh_name) = match &self.kind {
            PassKindData::PostProcess { material, mesh } => (material.clone(), mesh.clone()),
            _ => (None, None),
        };
        PassCollectConfig {
            pass_name: self.name.clone(),
            pass_kind: self.kind.kind(),
            content_source: self.content_source,
            queue: self.queue,
            cull_mode: self.cull_mode,
            render_type: self.render_type,
            output: self.output,
            color_attachments: self.color_attachments.clone(),
            depth_stencil_attachment: self.depth_stencil_attachment,
            material_name,
            mesh_name,
            read_resource_ids: self.reads.iter().map(|handle| handle.id).collect(),
        }
    }
}

/// Configures one pass. Borrows the graph mutably, so it cannot outlive the
/// next `compile`.
pub struct PassBuilder<'g> {
    graph: &'g mut FrameGraph,
    id: PassId,
}

impl<'g> PassBuilder<'g> {
    pub(crate) fn new(graph: &'g mut FrameGraph, id: PassId) -> Self {
        Self { graph, id }
    }

    fn pass(&mut self) -> &mut PassDescriptor {
        self.graph.descriptor_mut(self.id)
    }

    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn set_output(&mut self, output: PassOutputDesc) -> &mut Self {
        self.pass().output = output;
        self
    }

    /// The back buffer is only flagged on the pass; other invalid handles are
    /// ignored.
    pub fn declare_read(&mut self, resource: ResourceHandle) -> &mut Self {
        let pass = self.pass();
        if resource.is_back_buffer() {
            pass.touches_back_buffer = true;
        } else if !resource.is_valid() {
            log::trace!("Pass '{}' ignores read of invalid {resource:?}", pass.name);
        } else if !pass.reads.contains(&resource) {
            pass.reads.push(resource);
        }
        self
    }

    pub fn declare_write(&mut self, resource: ResourceHandle) -> &mut Self {
        let pass = self.pass();
        if resource.is_back_buffer() {
            pass.touches_back_buffer = true;
        } else if !resource.is_valid() {
            log::trace!("Pass '{}' ignores write of invalid {resource:?}", pass.name);
        } else if !pass.writes.contains(&resource) {
            pass.writes.push(resource);
        }
        self
    }

    pub fn add_color_attachment(&mut self, attachment: PassAttachmentDesc) -> &mut Self {
        let pass = self.pass();
        if pass.color_attachments.len() >= MAX_PASS_COLOR_ATTACHMENTS {
            log::warn!(
                "Pass '{}' already has {MAX_PASS_COLOR_ATTACHMENTS} color attachments; ignoring {:?}",
                pass.name,
                attachment.handle
            );
            return self;
        }
        pass.color_attachments.push(attachment);
        self
    }

    pub fn set_depth_stencil_attachment(&mut self, attachment: PassAttachmentDesc) -> &mut Self {
        self.pass().depth_stencil_attachment = Some(attachment);
        self
    }

    pub fn set_execute_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&PassContext<'_>, &mut CommandList) -> Result<()> + Send + 'static,
    {
        self.set_executor(Box::new(callback))
    }

    pub fn set_executor(&mut self, executor: Box<dyn PassExecutor>) -> &mut Self {
        self.pass().executor = Some(executor);
        self
    }

    /// Runs this pass after `pass`.
    pub fn depends_on(&mut self, pass: PassId) -> &mut Self {
        let descriptor = self.pass();
        if !descriptor.dependencies.contains(&pass) {
            descriptor.dependencies.push(pass);
        }
        self
    }

    pub fn set_queue(&mut self, queue: QueueId) -> &mut Self {
        self.pass().queue = queue;
        self
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode) -> &mut Self {
        self.pass().cull_mode = cull_mode;
        self
    }

    pub fn set_render_type(&mut self, render_type: RenderType) -> &mut Self {
        self.pass().render_type = render_type;
        self
    }

    pub fn set_content_source(&mut self, source: PassContentSource) -> &mut Self {
        self.pass().content_source = source;
        self
    }

    /// Changes the kind and resets the content source to the kind's default.
    pub fn set_pass_kind(&mut self, kind: PassKind) -> &mut Self {
        let pass = self.pass();
        if pass.kind.kind() != kind {
            pass.kind = PassKindData::from_kind(kind);
        }
        pass.content_source = kind.default_content_source();
        self
    }

    pub fn pass_kind(&self) -> PassKind {
        self.graph.descriptor(self.id).kind.kind()
    }

    pub fn content_source(&self) -> PassContentSource {
        self.graph.descriptor(self.id).content_source
    }
}

/// Builder view of a post-process pass: a material drawn over a mesh the
/// pass defines itself.
pub struct PostProcessPassBuilder<'g> {
    inner: PassBuilder<'g>,
}

impl<'g> PostProcessPassBuilder<'g> {
    pub(crate) fn new(inner: PassBuilder<'g>) -> Self {
        Self { inner }
    }

    fn post_process_data(&mut self) -> Option<(&mut Option<String>, &mut Option<String>)> {
        match &mut self.inner.pass().kind {
            PassKindData::PostProcess { material, mesh } => Some((material, mesh)),
            _ => None,
        }
    }

    pub fn set_material(&mut self, name: &str) -> &mut Self {
        match self.post_process_data() {
            Some((material, _)) => *material = Some(name.to_string()),
            None => log::warn!("set_material ignored: pass is no longer a post-process pass"),
        }
        self
    }

    pub fn set_mesh(&mut self, name: &str) -> &mut Self {
        match self.post_process_data() {
            Some((_, mesh)) => *mesh = Some(name.to_string()),
            None => log::warn!("set_mesh ignored: pass is no longer a post-process pass"),
        }
        self
    }

    pub fn set_fullscreen_quad(&mut self) -> &mut Self {
        self.set_mesh(FULLSCREEN_QUAD_MESH)
    }
}

impl<'g> Deref for PostProcessPassBuilder<'g> {
    type Target = PassBuilder<'g>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PostProcessPassBuilder<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_selects_content_source() {
        assert_eq!(
            PassKind::Scene.default_content_source(),
            PassContentSource::FromModelComponent
        );
        assert_eq!(
            PassKind::Light.default_content_source(),
            PassContentSource::FromLightComponent
        );
        assert_eq!(
            PassKind::Effect.default_content_source(),
            PassContentSource::FromPassDefined
        );
        assert_eq!(
            PassKind::Custom.default_content_source(),
            PassContentSource::Custom
        );
    }

    #[test]
    fn back_buffer_is_flagged_not_declared() {
        let mut graph = FrameGraph::new();
        graph
            .add_pass("present")
            .declare_write(ResourceHandle::BACK_BUFFER)
            .declare_read(ResourceHandle::texture(2))
            .declare_read(ResourceHandle::texture(2));
        graph.compile().unwrap();

        let config = graph.pass_collect_config(0).unwrap();
        assert_eq!(config.read_resource_ids, vec![2]);
        assert!(graph.pass_touches_back_buffer(0));
        assert!(graph.pass_writes(0).is_empty());
    }

    #[test]
    fn invalid_buffer_is_neither_declared_nor_back_buffer() {
        let mut graph = FrameGraph::new();
        graph
            .add_pass("compute")
            .declare_read(ResourceHandle::buffer(0))
            .declare_write(ResourceHandle::buffer(0));
        graph.compile().unwrap();

        assert!(!graph.pass_touches_back_buffer(0));
        assert!(graph.pass_reads(0).is_empty());
        assert!(graph.pass_writes(0).is_empty());
    }

    #[test]
    fn color_attachments_are_capped() {
        let mut graph = FrameGraph::new();
        {
            let mut pass = graph.add_pass("mrt");
            for id in 1..=10 {
                pass.add_color_attachment(PassAttachmentDesc::color(ResourceHandle::texture(id)));
            }
        }
        graph.compile().unwrap();
        assert_eq!(
            graph.pass_collect_config(0).unwrap().color_attachments.len(),
            MAX_PASS_COLOR_ATTACHMENTS
        );
    }

    #[test]
    fn post_process_view_sets_material_and_mesh() {
        let mut graph = FrameGraph::new();
        graph
            .add_post_process_pass("tonemap")
            .set_material("aces")
            .set_fullscreen_quad()
            .set_cull_mode(CullMode::None);
        graph.compile().unwrap();

        let config = graph.pass_collect_config(0).unwrap();
        assert_eq!(config.pass_kind, PassKind::PostProcess);
        assert_eq!(config.content_source, PassContentSource::FromPassDefined);
        assert_eq!(config.material_name.as_deref(), Some("aces"));
        assert_eq!(config.mesh_name.as_deref(), Some(FULLSCREEN_QUAD_MESH));
    }

    #[test]
    fn set_pass_kind_resets_content_source() {
        let mut graph = FrameGraph::new();
        let mut pass = graph.add_pass("lights");
        pass.set_pass_kind(PassKind::Light);
        assert_eq!(pass.pass_kind(), PassKind::Light);
        assert_eq!(pass.content_source(), PassContentSource::FromLightComponent);

        pass.set_content_source(PassContentSource::Custom);
        assert_eq!(pass.content_source(), PassContentSource::Custom);
    }

    struct Items(usize);

    impl RenderItemList for Items {
        fn len(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn context_slots() {
        let items = Items(3);
        let mut context = PassContext::new(5);
        context.set_render_item_list(1, &items);
        context.set_render_item_list(MAX_PASS_RENDER_ITEM_SLOTS, &items);

        assert_eq!(context.frame_index(), 5);
        assert_eq!(context.render_item_list(1).map(|list| list.len()), Some(3));
        assert!(context.render_item_list(0).is_none());
        assert!(context.render_item_list(MAX_PASS_RENDER_ITEM_SLOTS).is_none());
        assert!(context.light_item_list().is_none());
    }
}
