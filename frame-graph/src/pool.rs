use crate::{
    CommandList, DeviceError, FrameGraphError, PassAttachmentDesc, RawBuffer, RawTexture,
    RenderDevice, ResourceBarrier, ResourceBarrierBuilder, ResourceHandle, ResourceKind,
    ResourceState, Result,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use wgpu::{BufferUsages, TextureFormat, TextureUsages};

/// Sentinel for lifetime fields of a resource no pass uses.
pub const UNUSED_PASS: u32 = u32::MAX;

const FALLBACK_BYTES_PER_TEXEL: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceLifetime {
    /// Created on first use and destroyed at `end_frame`.
    #[default]
    Transient,
    /// Cached across frames until invalidated.
    Persistent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransientTextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: u32,
    pub usage: TextureUsages,
    pub initial_state: ResourceState,
    pub debug_name: String,
}

impl TransientTextureDesc {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        let usage = if format.is_depth_stencil_format() {
            TextureUsages::RENDER_ATTACHMENT
        } else {
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING
        };
        Self {
            width,
            height,
            depth: 1,
            format,
            mip_levels: 1,
            array_layers: 1,
            sample_count: 1,
            usage,
            initial_state: ResourceState::Common,
            debug_name: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = name.into();
        self
    }

    pub fn with_usage(mut self, usage: TextureUsages) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn with_mip_levels(mut self, levels: u32) -> Self {
        self.mip_levels = levels;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    pub fn is_depth_stencil(&self) -> bool {
        self.format.is_depth_stencil_format()
    }

    /// Rough size of the top mip level in bytes.
    pub fn estimated_size(&self) -> u64 {
        let texel = self
            .format
            .block_copy_size(None)
            .map(u64::from)
            .unwrap_or(FALLBACK_BYTES_PER_TEXEL);
        u64::from(self.width)
            * u64::from(self.height)
            * u64::from(self.depth.max(1))
            * u64::from(self.array_layers.max(1))
            * texel
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransientBufferDesc {
    pub size: u64,
    pub usage: BufferUsages,
    pub initial_state: ResourceState,
    pub debug_name: String,
}

impl TransientBufferDesc {
    pub fn new(size: u64, usage: BufferUsages) -> Self {
        Self {
            size,
            usage,
            initial_state: ResourceState::Common,
            debug_name: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = name.into();
        self
    }

    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetimeInfo {
    pub handle: ResourceHandle,
    pub first_use_pass: u32,
    pub last_use_pass: u32,
    pub create_pass: u32,
    pub release_pass: u32,
    pub is_used: bool,
}

impl ResourceLifetimeInfo {
    fn new(handle: ResourceHandle) -> Self {
        Self {
            handle,
            first_use_pass: UNUSED_PASS,
            last_use_pass: 0,
            create_pass: UNUSED_PASS,
            release_pass: UNUSED_PASS,
            is_used: false,
        }
    }
}

/// How a pass uses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAccess {
    Read,
    Write,
    State(ResourceState),
}

/// Cross-frame cache key of a persistent texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PersistentTextureKey {
    pub id: u64,
    /// Ping-pong slot of history textures, 0 otherwise.
    pub slot: u8,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub is_depth_stencil: bool,
}

impl PersistentTextureKey {
    fn new(id: u64, slot: u8, desc: &TransientTextureDesc) -> Self {
        Self {
            id,
            slot,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            is_depth_stencil: desc.is_depth_stencil(),
        }
    }
}

/// Frame handles of a ping-pong texture pair. `previous` holds what
/// `current` held last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTexture {
    pub current: ResourceHandle,
    pub previous: ResourceHandle,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub default_width: u32,
    pub default_height: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_width: 800,
            default_height: 600,
        }
    }
}

impl PoolConfig {
    pub fn with_default_dimensions(mut self, width: u32, height: u32) -> Self {
        self.default_width = width;
        self.default_height = height;
        self
    }
}

pub type CreateTextureCallback =
    Box<dyn FnMut(&TransientTextureDesc) -> std::result::Result<RawTexture, DeviceError> + Send>;
pub type CreateBufferCallback =
    Box<dyn FnMut(&TransientBufferDesc) -> std::result::Result<RawBuffer, DeviceError> + Send>;

#[derive(Debug)]
struct Usage {
    info: ResourceLifetimeInfo,
    accesses: Vec<(u32, ResourceAccess)>,
    release_override: Option<u32>,
    final_state: Option<ResourceState>,
}

impl Usage {
    fn new(handle: ResourceHandle) -> Self {
        Self {
            info: ResourceLifetimeInfo::new(handle),
            accesses: Vec::new(),
            release_override: None,
            final_state: None,
        }
    }

    fn writes(&self) -> bool {
        self.accesses.iter().any(|(_, access)| match access {
            ResourceAccess::Read => false,
            ResourceAccess::Write => true,
            ResourceAccess::State(state) => state.is_write(),
        })
    }

    fn mark(&mut self, pass: u32, access: ResourceAccess) {
        self.info.first_use_pass = self.info.first_use_pass.min(pass);
        self.info.last_use_pass = self.info.last_use_pass.max(pass);
        self.info.is_used = true;
        self.accesses.push((pass, access));
    }

    /// Resolves the state each using pass needs, one per pass: an explicit
    /// state wins over a write, a write over a read.
    fn required_states(
        &self,
        read_state: ResourceState,
        write_state: ResourceState,
    ) -> BTreeMap<u32, ResourceState> {
        let mut per_pass: BTreeMap<u32, (Option<ResourceState>, bool)> = BTreeMap::new();
        for &(pass, access) in &self.accesses {
            let entry = per_pass.entry(pass).or_default();
            match access {
                ResourceAccess::Read => {}
                ResourceAccess::Write => entry.1 = true,
                ResourceAccess::State(state) => entry.0 = Some(state),
            }
        }
        per_pass
            .into_iter()
            .map(|(pass, (explicit, writes))| {
                let state = explicit.unwrap_or(if writes { write_state } else { read_state });
                (pass, state)
            })
            .collect()
    }
}

#[derive(Debug)]
struct TextureEntry {
    desc: TransientTextureDesc,
    persistent_key: Option<PersistentTextureKey>,
    /// Set on the `current` half of a history pair.
    history_current: bool,
    texture: Option<RawTexture>,
    usage: Usage,
}

#[derive(Debug)]
struct BufferEntry {
    desc: TransientBufferDesc,
    buffer: Option<RawBuffer>,
    usage: Usage,
}

#[derive(Debug)]
struct PersistentTexture {
    texture: RawTexture,
    state: ResourceState,
    size: u64,
}

/// Frame-local resource tracker.
///
/// Usage per frame: `begin_frame`, declare resources, mark reads and writes at
/// execution indices, `compile`, fetch backing with `get_or_create_*` and
/// insert barriers pass by pass, `end_frame`.
pub struct TransientResourcePool {
    device: Arc<dyn RenderDevice>,
    config: PoolConfig,
    create_texture: Option<CreateTextureCallback>,
    create_buffer: Option<CreateBufferCallback>,
    textures: BTreeMap<u64, TextureEntry>,
    buffers: BTreeMap<u64, BufferEntry>,
    persistent: HashMap<PersistentTextureKey, PersistentTexture>,
    /// Persistent keys declared this frame.
    declared_persistent: HashMap<PersistentTextureKey, ResourceHandle>,
    /// Slot each history id last wrote in a frame that created it.
    history_written: HashMap<u64, u8>,
    barriers: Vec<ResourceBarrier>,
    barriers_by_pass: BTreeMap<u32, Vec<ResourceBarrier>>,
    next_id: u64,
    frame_index: u64,
    memory_used: u64,
    compiled: bool,
}

impl TransientResourcePool {
    pub fn new(device: Arc<dyn RenderDevice>, config: PoolConfig) -> Self {
        Self {
            device,
            config,
            create_texture: None,
            create_buffer: None,
            textures: BTreeMap::new(),
            buffers: BTreeMap::new(),
            persistent: HashMap::new(),
            declared_persistent: HashMap::new(),
            history_written: HashMap::new(),
            barriers: Vec::new(),
            barriers_by_pass: BTreeMap::new(),
            next_id: 1,
            frame_index: 0,
            memory_used: 0,
            compiled: false,
        }
    }

    /// Routes creation through callbacks instead of the device. Destruction
    /// still goes through the device.
    pub fn set_create_callbacks(
        &mut self,
        texture: Option<CreateTextureCallback>,
        buffer: Option<CreateBufferCallback>,
    ) {
        self.create_texture = texture;
        self.create_buffer = buffer;
    }

    pub fn set_default_dimensions(&mut self, width: u32, height: u32) {
        self.config.default_width = width;
        self.config.default_height = height;
    }

    pub fn default_dimensions(&self) -> (u32, u32) {
        (self.config.default_width, self.config.default_height)
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn begin_frame(&mut self) {
        if !self.textures.is_empty() || !self.buffers.is_empty() {
            log::warn!("begin_frame called before end_frame; releasing the previous frame");
            self.end_frame();
        }
        self.next_id = 1;
        self.frame_index += 1;
        self.memory_used = 0;
        self.compiled = false;
        self.declared_persistent.clear();
        self.barriers.clear();
        self.barriers_by_pass.clear();
    }

    /// Destroys transient backing and carries the final state of persistent
    /// textures over to the next frame.
    pub fn end_frame(&mut self) {
        for entry in std::mem::take(&mut self.textures).into_values() {
            match (entry.persistent_key, entry.texture) {
                (Some(key), texture) => match self.persistent.get_mut(&key) {
                    Some(cached) => {
                        if let Some(state) = entry.usage.final_state {
                            cached.state = state;
                        }
                        if entry.history_current && texture.is_some() && entry.usage.writes() {
                            self.history_written.insert(key.id, key.slot);
                        }
                    }
                    // Invalidated while the frame was using it.
                    None => {
                        if let Some(texture) = texture {
                            self.device.destroy_texture(texture);
                        }
                    }
                },
                (None, Some(texture)) => self.device.destroy_texture(texture),
                (None, None) => {}
            }
        }
        for entry in std::mem::take(&mut self.buffers).into_values() {
            if let Some(buffer) = entry.buffer {
                self.device.destroy_buffer(buffer);
            }
        }
        self.declared_persistent.clear();
        self.barriers.clear();
        self.barriers_by_pass.clear();
        self.compiled = false;
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn resolve_dimensions(&self, desc: &mut TransientTextureDesc) {
        if desc.width == 0 {
            desc.width = self.config.default_width;
        }
        if desc.height == 0 {
            desc.height = self.config.default_height;
        }
    }

    fn insert_texture(
        &mut self,
        mut desc: TransientTextureDesc,
        persistent: Option<(u64, u8)>,
    ) -> ResourceHandle {
        self.resolve_dimensions(&mut desc);
        let persistent_key = persistent.map(|(id, slot)| PersistentTextureKey::new(id, slot, &desc));
        if let Some(handle) = persistent_key.and_then(|key| self.declared_persistent.get(&key)) {
            log::trace!("Texture '{}' already declared as {handle:?}", desc.debug_name);
            return *handle;
        }
        let handle = ResourceHandle::texture(self.allocate_id());
        if let Some(key) = persistent_key {
            self.declared_persistent.insert(key, handle);
        }
        log::trace!("Declared texture '{}' as {handle:?}", desc.debug_name);
        self.textures.insert(
            handle.id,
            TextureEntry {
                desc,
                persistent_key,
                history_current: false,
                texture: None,
                usage: Usage::new(handle),
            },
        );
        handle
    }

    /// Registers a frame-local texture. Zero width or height is replaced by
    /// the default dimensions. Nothing is allocated yet.
    pub fn declare_transient_texture(&mut self, desc: TransientTextureDesc) -> ResourceHandle {
        self.insert_texture(desc, None)
    }

    pub fn declare_transient_buffer(&mut self, desc: TransientBufferDesc) -> ResourceHandle {
        let handle = ResourceHandle::buffer(self.allocate_id());
        log::trace!("Declared buffer '{}' as {handle:?}", desc.debug_name);
        self.buffers.insert(
            handle.id,
            BufferEntry {
                desc,
                buffer: None,
                usage: Usage::new(handle),
            },
        );
        handle
    }

    /// Registers a texture whose backing is reused across frames for the
    /// same `stable_id`, size and format. Declaring the same texture again in
    /// one frame returns the first handle.
    pub fn declare_persistent_texture(
        &mut self,
        stable_id: u64,
        desc: TransientTextureDesc,
    ) -> ResourceHandle {
        self.insert_texture(desc, Some((stable_id, 0)))
    }

    /// Registers a ping-pong pair. `previous` is the backing that `current`
    /// last wrote in a frame that created it, so frames that were skipped or
    /// never wrote the history do not swap the pair.
    pub fn declare_history_texture(
        &mut self,
        stable_id: u64,
        desc: TransientTextureDesc,
    ) -> HistoryTexture {
        let written = self.history_written.get(&stable_id).copied();
        let slot = written.map_or(0, |slot| 1 - slot);
        let current = self.insert_texture(desc.clone(), Some((stable_id, slot)));
        let previous = self.insert_texture(desc, Some((stable_id, 1 - slot)));
        if let Some(entry) = self.textures.get_mut(&current.id) {
            entry.history_current = true;
        }
        HistoryTexture { current, previous }
    }

    pub fn texture_desc(&self, handle: ResourceHandle) -> Option<&TransientTextureDesc> {
        if !handle.is_texture() {
            return None;
        }
        self.textures.get(&handle.id).map(|entry| &entry.desc)
    }

    pub fn buffer_desc(&self, handle: ResourceHandle) -> Option<&TransientBufferDesc> {
        if !handle.is_buffer() {
            return None;
        }
        self.buffers.get(&handle.id).map(|entry| &entry.desc)
    }

    pub fn lifetime_kind(&self, handle: ResourceHandle) -> Option<ResourceLifetime> {
        match handle.kind {
            ResourceKind::Texture => self.textures.get(&handle.id).map(|entry| {
                if entry.persistent_key.is_some() {
                    ResourceLifetime::Persistent
                } else {
                    ResourceLifetime::Transient
                }
            }),
            ResourceKind::Buffer => self
                .buffers
                .get(&handle.id)
                .map(|_| ResourceLifetime::Transient),
        }
    }

    fn usage_mut(&mut self, handle: ResourceHandle) -> Result<&mut Usage> {
        let usage = match handle.kind {
            ResourceKind::Texture => self.textures.get_mut(&handle.id).map(|e| &mut e.usage),
            ResourceKind::Buffer => self.buffers.get_mut(&handle.id).map(|e| &mut e.usage),
        };
        usage.ok_or(FrameGraphError::UnknownResource { handle })
    }

    fn usage(&self, handle: ResourceHandle) -> Option<&Usage> {
        match handle.kind {
            ResourceKind::Texture => self.textures.get(&handle.id).map(|e| &e.usage),
            ResourceKind::Buffer => self.buffers.get(&handle.id).map(|e| &e.usage),
        }
    }

    fn mark(&mut self, handle: ResourceHandle, pass: u32, access: ResourceAccess) -> Result<()> {
        if handle.is_back_buffer() {
            return Ok(());
        }
        self.usage_mut(handle)?.mark(pass, access);
        Ok(())
    }

    pub fn mark_resource_read(&mut self, handle: ResourceHandle, pass: u32) -> Result<()> {
        self.mark(handle, pass, ResourceAccess::Read)
    }

    pub fn mark_resource_write(&mut self, handle: ResourceHandle, pass: u32) -> Result<()> {
        self.mark(handle, pass, ResourceAccess::Write)
    }

    /// Requires `handle` to be in `state` while `pass` runs.
    pub fn mark_resource_state(
        &mut self,
        handle: ResourceHandle,
        pass: u32,
        state: ResourceState,
    ) -> Result<()> {
        self.mark(handle, pass, ResourceAccess::State(state))
    }

    /// Keeps the resource alive at least until after `pass`.
    pub fn release_after_pass(&mut self, handle: ResourceHandle, pass: u32) -> Result<()> {
        self.usage_mut(handle)?.release_override = Some(pass);
        Ok(())
    }

    /// Derives create and release points and the barriers of every pass.
    pub fn compile(&mut self) {
        let mut builder = ResourceBarrierBuilder::new();

        for entry in self.textures.values_mut() {
            let depth = entry.desc.is_depth_stencil();
            let initial = entry
                .persistent_key
                .and_then(|key| self.persistent.get(&key))
                .map_or(entry.desc.initial_state, |cached| cached.state);
            let required = entry.usage.required_states(
                ResourceState::texture_read(depth),
                ResourceState::texture_write(depth),
            );
            let handle = entry.usage.info.handle;
            resolve_usage(&mut entry.usage, initial, required, |src, dst, pass| {
                builder.add_texture_transition(handle, src, dst, pass)
            });
        }

        for entry in self.buffers.values_mut() {
            let required = entry
                .usage
                .required_states(ResourceState::buffer_read(), ResourceState::buffer_write());
            let handle = entry.usage.info.handle;
            let initial = entry.desc.initial_state;
            resolve_usage(&mut entry.usage, initial, required, |src, dst, pass| {
                builder.add_buffer_transition(handle, src, dst, pass)
            });
        }

        self.barriers = builder.build();
        self.barriers_by_pass.clear();
        for barrier in &self.barriers {
            self.barriers_by_pass
                .entry(barrier.before_pass)
                .or_default()
                .push(*barrier);
        }
        self.compiled = true;

        log::debug!(
            "Resource pool compiled: {} textures, {} buffers, {} barriers",
            self.textures.len(),
            self.buffers.len(),
            self.barriers.len()
        );
    }

    pub fn barriers_for_pass(&self, pass: u32) -> &[ResourceBarrier] {
        self.barriers_by_pass
            .get(&pass)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_barriers(&self) -> &[ResourceBarrier] {
        &self.barriers
    }

    pub fn lifetime_info(&self, handle: ResourceHandle) -> Option<&ResourceLifetimeInfo> {
        self.usage(handle).map(|usage| &usage.info)
    }

    /// Handles whose create point is `pass`, textures first, in id order.
    pub fn resources_created_at(&self, pass: u32) -> Vec<ResourceHandle> {
        self.textures
            .values()
            .map(|entry| &entry.usage.info)
            .chain(self.buffers.values().map(|entry| &entry.usage.info))
            .filter(|info| info.is_used && info.create_pass == pass)
            .map(|info| info.handle)
            .collect()
    }

    /// Returns the backing texture, creating it on first call.
    ///
    /// A failed creation leaves the entry uncreated so a later call retries.
    pub fn get_or_create_texture(&mut self, handle: ResourceHandle) -> Result<RawTexture> {
        if handle.is_back_buffer() {
            return Err(FrameGraphError::BackBufferNotPoolOwned);
        }
        let entry = self
            .textures
            .get_mut(&handle.id)
            .filter(|_| handle.is_texture())
            .ok_or(FrameGraphError::UnknownResource { handle })?;
        if let Some(texture) = entry.texture {
            return Ok(texture);
        }

        if let Some(cached) = entry.persistent_key.and_then(|key| self.persistent.get(&key)) {
            entry.texture = Some(cached.texture);
            self.memory_used += cached.size;
            return Ok(cached.texture);
        }

        let created = match self.create_texture.as_mut() {
            Some(callback) => callback(&entry.desc),
            None => self.device.create_texture(&entry.desc),
        };
        let texture = created.map_err(|source| FrameGraphError::ResourceCreationFailed {
            name: entry.desc.debug_name.clone(),
            kind: ResourceKind::Texture,
            handle,
            source,
        })?;

        let size = entry.desc.estimated_size();
        entry.texture = Some(texture);
        self.memory_used += size;
        if let Some(key) = entry.persistent_key {
            self.persistent.insert(
                key,
                PersistentTexture {
                    texture,
                    state: entry.desc.initial_state,
                    size,
                },
            );
        }
        log::debug!(
            "Created texture '{}' {}x{} {:?} ({size} bytes)",
            entry.desc.debug_name,
            entry.desc.width,
            entry.desc.height,
            entry.desc.format
        );
        Ok(texture)
    }

    pub fn get_or_create_buffer(&mut self, handle: ResourceHandle) -> Result<RawBuffer> {
        let entry = self
            .buffers
            .get_mut(&handle.id)
            .filter(|_| handle.is_buffer())
            .ok_or(FrameGraphError::UnknownResource { handle })?;
        if let Some(buffer) = entry.buffer {
            return Ok(buffer);
        }

        let created = match self.create_buffer.as_mut() {
            Some(callback) => callback(&entry.desc),
            None => self.device.create_buffer(&entry.desc),
        };
        let buffer = created.map_err(|source| FrameGraphError::ResourceCreationFailed {
            name: entry.desc.debug_name.clone(),
            kind: ResourceKind::Buffer,
            handle,
            source,
        })?;

        entry.buffer = Some(buffer);
        self.memory_used += entry.desc.size;
        log::debug!(
            "Created buffer '{}' ({} bytes)",
            entry.desc.debug_name,
            entry.desc.size
        );
        Ok(buffer)
    }

    pub fn get_or_create(&mut self, handle: ResourceHandle) -> Result<()> {
        match handle.kind {
            ResourceKind::Texture => self.get_or_create_texture(handle).map(|_| ()),
            ResourceKind::Buffer => self.get_or_create_buffer(handle).map(|_| ()),
        }
    }

    /// Declares a texture matching `attachment` and creates it immediately.
    /// Attachments marked persistent with a valid handle use its id as the
    /// stable cache id.
    pub fn create_texture_from_attachment(
        &mut self,
        attachment: &PassAttachmentDesc,
    ) -> Result<(ResourceHandle, RawTexture)> {
        let format = attachment.format.unwrap_or(if attachment.is_depth_stencil {
            TextureFormat::Depth32Float
        } else {
            TextureFormat::Rgba8Unorm
        });
        let desc = TransientTextureDesc::new(attachment.width, attachment.height, format)
            .with_initial_state(ResourceState::texture_write(format.is_depth_stencil_format()));

        let handle = match attachment.lifetime {
            ResourceLifetime::Persistent if attachment.handle.is_valid() => {
                self.declare_persistent_texture(attachment.handle.id, desc)
            }
            _ => self.declare_transient_texture(desc),
        };
        let texture = self.get_or_create_texture(handle)?;
        Ok((handle, texture))
    }

    pub fn texture(&self, handle: ResourceHandle) -> Option<RawTexture> {
        if !handle.is_texture() {
            return None;
        }
        self.textures.get(&handle.id).and_then(|entry| entry.texture)
    }

    pub fn buffer(&self, handle: ResourceHandle) -> Option<RawBuffer> {
        if !handle.is_buffer() {
            return None;
        }
        self.buffers.get(&handle.id).and_then(|entry| entry.buffer)
    }

    pub fn is_resource_created(&self, handle: ResourceHandle) -> bool {
        match handle.kind {
            ResourceKind::Texture => self.texture(handle).is_some(),
            ResourceKind::Buffer => self.buffer(handle).is_some(),
        }
    }

    /// Records the barriers of `pass` into `command_list`, creating any
    /// backing they need. Returns the number of barriers recorded.
    pub fn insert_barriers_for_pass(
        &mut self,
        pass: u32,
        command_list: &mut CommandList,
    ) -> Result<usize> {
        let barriers = self.barriers_for_pass(pass).to_vec();
        for barrier in &barriers {
            match barrier.resource.kind {
                ResourceKind::Texture => {
                    let texture = self.get_or_create_texture(barrier.resource)?;
                    command_list.texture_barrier(texture, barrier.src_state, barrier.dst_state);
                }
                ResourceKind::Buffer => {
                    let buffer = self.get_or_create_buffer(barrier.resource)?;
                    command_list.buffer_barrier(buffer, barrier.src_state, barrier.dst_state);
                }
            }
        }
        Ok(barriers.len())
    }

    pub fn allocated_texture_count(&self) -> usize {
        self.textures
            .values()
            .filter(|entry| entry.texture.is_some())
            .count()
    }

    pub fn allocated_buffer_count(&self) -> usize {
        self.buffers
            .values()
            .filter(|entry| entry.buffer.is_some())
            .count()
    }

    /// Approximate bytes backing this frame's resources.
    pub fn total_memory_used(&self) -> u64 {
        self.memory_used
    }

    pub fn persistent_texture_count(&self) -> usize {
        self.persistent.len()
    }

    pub fn invalidate_persistent(&mut self) {
        let in_use: Vec<RawTexture> = self.textures.values().filter_map(|e| e.texture).collect();
        self.history_written.clear();
        for (_, cached) in self.persistent.drain() {
            if !in_use.contains(&cached.texture) {
                self.device.destroy_texture(cached.texture);
            }
        }
    }

    pub fn invalidate_persistent_id(&mut self, stable_id: u64) {
        let in_use: Vec<RawTexture> = self.textures.values().filter_map(|e| e.texture).collect();
        self.history_written.remove(&stable_id);
        let device = &self.device;
        self.persistent.retain(|key, cached| {
            if key.id != stable_id {
                return true;
            }
            if !in_use.contains(&cached.texture) {
                device.destroy_texture(cached.texture);
            }
            false
        });
    }
}

/// Walks the per-pass required states from `initial`, reporting every change
/// through `transition`, and fills in the create and release points.
fn resolve_usage(
    usage: &mut Usage,
    initial: ResourceState,
    required: BTreeMap<u32, ResourceState>,
    mut transition: impl FnMut(ResourceState, ResourceState, u32),
) {
    if !usage.info.is_used {
        usage.final_state = None;
        return;
    }

    let info = &mut usage.info;
    info.create_pass = info.first_use_pass;
    info.release_pass = match usage.release_override {
        Some(pass) if pass < info.last_use_pass => {
            log::warn!(
                "Release point {pass} of {:?} precedes its last use {}; keeping it alive",
                info.handle,
                info.last_use_pass
            );
            info.last_use_pass
        }
        Some(pass) => pass,
        None => info.last_use_pass,
    };

    let mut current = initial;
    for (pass, state) in required {
        if state != current {
            transition(current, state, pass);
            current = state;
        }
    }
    usage.final_state = Some(current);
}

impl Drop for TransientResourcePool {
    fn drop(&mut self) {
        self.end_frame();
        self.invalidate_persistent();
    }
}
