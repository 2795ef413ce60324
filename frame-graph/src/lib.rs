//! Per-frame render dependency graph.
//!
//! A [`FrameGraph`] turns a declarative list of passes into a deterministic
//! execution order. A [`TransientResourcePool`] turns that order plus the
//! resource usage of every pass into lifetimes and state-transition barriers,
//! and a [`SubmitContext`] (optionally driven by a [`MultiQueueScheduler`])
//! submits the recorded command lists to the graphics, compute and copy queues.
//! [`execute_frame`] wires the three together for one frame.
//!
//! All GPU work goes through the [`RenderDevice`] trait; [`HeadlessDevice`]
//! implements it in memory.

mod barrier;
mod command;
mod device;
mod executor;
mod graph;
mod handle;
mod headless;
mod pass;
mod pool;
mod scheduler;
mod state;
mod submit;
mod sync;

pub use barrier::{ResourceBarrier, ResourceBarrierBuilder};
pub use command::{Command, CommandList};
pub use device::{
    DeviceError, QueueId, RawBuffer, RawCommandList, RawFence, RawSemaphore, RawTexture,
    RenderDevice, SemaphoreOp, Submission,
};
pub use executor::{FrameStats, execute_frame};
pub use graph::FrameGraph;
pub use handle::{ResourceHandle, ResourceKind};
pub use headless::{DEFAULT_SUBMISSION_HISTORY, HeadlessDevice, SubmissionRecord};
pub use pass::{
    AttachmentLoadOp, AttachmentSource, AttachmentStoreOp, CullMode, FULLSCREEN_QUAD_MESH,
    LightItemList, MAX_PASS_COLOR_ATTACHMENTS, MAX_PASS_RENDER_ITEM_SLOTS, PassAttachmentDesc,
    PassBuilder, PassCollectConfig, PassContentSource, PassContext, PassExecutor, PassId,
    PassKind, PassKindData, PassOutputDesc, PostProcessPassBuilder, RenderItemList, RenderType,
};
pub use pool::{
    CreateBufferCallback, CreateTextureCallback, HistoryTexture, PersistentTextureKey,
    PoolConfig, ResourceAccess, ResourceLifetime, ResourceLifetimeInfo, TransientBufferDesc,
    TransientResourcePool, TransientTextureDesc, UNUSED_PASS,
};
pub use scheduler::MultiQueueScheduler;
pub use state::ResourceState;
pub use submit::{DEFAULT_FRAMES_IN_FLIGHT, SubmitBatch, SubmitConfig, SubmitContext};
pub use sync::{Fence, QueueSyncPoint, Semaphore, SyncPoint, SyncPrimitiveType};

#[derive(Debug, thiserror::Error)]
pub enum FrameGraphError {
    #[error("Frame graph contains a cycle through passes {passes:?}")]
    CyclicDependency { passes: Vec<String> },

    #[error("Frame graph must be compiled before it can be executed")]
    NotCompiled,

    #[error("Execution index {index} out of range ({count} compiled passes)")]
    PassOutOfRange { index: usize, count: usize },

    #[error("Resource {handle:?} is not declared in the current frame")]
    UnknownResource { handle: ResourceHandle },

    #[error("The back buffer (id 0) is external and cannot be created by the pool")]
    BackBufferNotPoolOwned,

    #[error("Failed to create {kind:?} resource '{name}' ({handle:?})")]
    ResourceCreationFailed {
        name: String,
        kind: ResourceKind,
        handle: ResourceHandle,
        #[source]
        source: DeviceError,
    },

    #[error("'{operation}' is only valid on a fence sync point")]
    NotAFence { operation: &'static str },

    #[error("Batch on the {queue:?} queue waits on semaphore {semaphore:?} value {value} that is never signaled")]
    UnsatisfiedWait {
        queue: QueueId,
        semaphore: RawSemaphore,
        value: u64,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub type Result<T> = std::result::Result<T, FrameGraphError>;
