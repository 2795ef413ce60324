//! Boundary to the rendering backend.
//!
//! The graph core never talks to a GPU API directly. Pools and submission
//! contexts hold an `Arc<dyn RenderDevice>` and exchange opaque raw ids with it.

use crate::{CommandList, TransientBufferDesc, TransientTextureDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum QueueId {
    #[default]
    Graphics,
    Compute,
    Copy,
}

impl QueueId {
    pub const ALL: [QueueId; 3] = [QueueId::Graphics, QueueId::Compute, QueueId::Copy];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawTexture(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawBuffer(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawFence(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawSemaphore(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawCommandList(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Out of device memory")]
    OutOfMemory,

    #[error("Device lost")]
    DeviceLost,

    #[error("Unknown {object} {id}")]
    UnknownObject { object: &'static str, id: u64 },

    #[error("Fence {0:?} is not signaled and has no pending work that would signal it")]
    FenceNeverSignaled(RawFence),

    #[error("Semaphore {semaphore:?} waited for value {value} but only reached {reached}")]
    SemaphoreNotSignaled {
        semaphore: RawSemaphore,
        value: u64,
        reached: u64,
    },

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Timeline semaphore wait or signal attached to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreOp {
    pub semaphore: RawSemaphore,
    pub value: u64,
}

/// One queue submission. The command lists are handed over to the device.
#[derive(Debug)]
pub struct Submission {
    pub queue: QueueId,
    pub command_lists: Vec<CommandList>,
    pub waits: Vec<SemaphoreOp>,
    pub signals: Vec<SemaphoreOp>,
    pub fence: Option<RawFence>,
}

pub trait RenderDevice: Send + Sync {
    fn create_texture(&self, desc: &TransientTextureDesc) -> Result<RawTexture, DeviceError>;
    fn create_buffer(&self, desc: &TransientBufferDesc) -> Result<RawBuffer, DeviceError>;
    fn destroy_texture(&self, texture: RawTexture);
    fn destroy_buffer(&self, buffer: RawBuffer);

    fn create_fence(&self, signaled: bool) -> Result<RawFence, DeviceError>;
    fn destroy_fence(&self, fence: RawFence);
    fn wait_fence(&self, fence: RawFence) -> Result<(), DeviceError>;
    fn signal_fence(&self, fence: RawFence) -> Result<(), DeviceError>;
    fn reset_fence(&self, fence: RawFence) -> Result<(), DeviceError>;
    fn is_fence_signaled(&self, fence: RawFence) -> bool;

    fn create_semaphore(&self) -> Result<RawSemaphore, DeviceError>;
    fn destroy_semaphore(&self, semaphore: RawSemaphore);

    fn create_command_list(&self, queue: QueueId) -> Result<RawCommandList, DeviceError>;
    fn submit(&self, submission: Submission) -> Result<(), DeviceError>;
    fn wait_queue_idle(&self, queue: QueueId) -> Result<(), DeviceError>;
}
