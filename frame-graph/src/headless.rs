use crate::{
    CommandList, DeviceError, QueueId, RawBuffer, RawCommandList, RawFence, RawSemaphore,
    RawTexture, RenderDevice, SemaphoreOp, Submission, TransientBufferDesc, TransientTextureDesc,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Submissions kept for inspection unless changed with
/// [`HeadlessDevice::set_submission_history_limit`]. Older ones are dropped.
pub const DEFAULT_SUBMISSION_HISTORY: usize = 256;

/// A submission as the headless device received it.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub queue: QueueId,
    pub command_lists: Vec<CommandList>,
    pub waits: Vec<SemaphoreOp>,
    pub signals: Vec<SemaphoreOp>,
    pub fence: Option<RawFence>,
}

impl SubmissionRecord {
    /// Pass names recorded across every list in the submission.
    pub fn pass_names(&self) -> Vec<String> {
        self.command_lists
            .iter()
            .flat_map(|list| list.pass_names())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Default)]
struct HeadlessState {
    next_id: u64,
    textures: HashMap<RawTexture, String>,
    buffers: HashMap<RawBuffer, String>,
    fences: HashMap<RawFence, bool>,
    semaphores: HashMap<RawSemaphore, u64>,
    submissions: VecDeque<SubmissionRecord>,
    submission_limit: Option<usize>,
    texture_creations: usize,
    buffer_creations: usize,
    fence_waits: usize,
    fail_texture_creation: bool,
    fail_buffer_creation: bool,
    fail_submit: bool,
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`RenderDevice`].
///
/// Submitted work completes immediately: the submission's semaphores reach
/// their signal values and its fence becomes signaled before `submit` returns.
/// Misuse that would hang a real GPU is reported as an error instead.
#[derive(Default)]
pub struct HeadlessDevice {
    state: Mutex<HeadlessState>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_texture_creation(&self, fail: bool) {
        self.state.lock().fail_texture_creation = fail;
    }

    pub fn set_fail_buffer_creation(&self, fail: bool) {
        self.state.lock().fail_buffer_creation = fail;
    }

    /// Makes every `submit` fail with [`DeviceError::DeviceLost`].
    pub fn set_fail_submit(&self, fail: bool) {
        self.state.lock().fail_submit = fail;
    }

    pub fn set_submission_history_limit(&self, limit: usize) {
        let mut state = self.state.lock();
        state.submission_limit = Some(limit);
        while state.submissions.len() > limit {
            state.submissions.pop_front();
        }
    }

    pub fn live_texture_count(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_fence_count(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn live_semaphore_count(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    pub fn texture_creation_count(&self) -> usize {
        self.state.lock().texture_creations
    }

    pub fn buffer_creation_count(&self) -> usize {
        self.state.lock().buffer_creations
    }

    pub fn fence_wait_count(&self) -> usize {
        self.state.lock().fence_waits
    }

    pub fn texture_name(&self, texture: RawTexture) -> Option<String> {
        self.state.lock().textures.get(&texture).cloned()
    }

    pub fn semaphore_value(&self, semaphore: RawSemaphore) -> Option<u64> {
        self.state.lock().semaphores.get(&semaphore).copied()
    }

    /// The most recent submissions, oldest first.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.iter().cloned().collect()
    }

    pub fn clear_submissions(&self) {
        self.state.lock().submissions.clear();
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_texture(&self, desc: &TransientTextureDesc) -> Result<RawTexture, DeviceError> {
        let mut state = self.state.lock();
        if state.fail_texture_creation {
            return Err(DeviceError::OutOfMemory);
        }
        let texture = RawTexture(state.next_id());
        state.textures.insert(texture, desc.debug_name.clone());
        state.texture_creations += 1;
        Ok(texture)
    }

    fn create_buffer(&self, desc: &TransientBufferDesc) -> Result<RawBuffer, DeviceError> {
        let mut state = self.state.lock();
        if state.fail_buffer_creation {
            return Err(DeviceError::OutOfMemory);
        }
        let buffer = RawBuffer(state.next_id());
        state.buffers.insert(buffer, desc.debug_name.clone());
        state.buffer_creations += 1;
        Ok(buffer)
    }

    fn destroy_texture(&self, texture: RawTexture) {
        if self.state.lock().textures.remove(&texture).is_none() {
            log::warn!("Destroying unknown texture {texture:?}");
        }
    }

    fn destroy_buffer(&self, buffer: RawBuffer) {
        if self.state.lock().buffers.remove(&buffer).is_none() {
            log::warn!("Destroying unknown buffer {buffer:?}");
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<RawFence, DeviceError> {
        let mut state = self.state.lock();
        let fence = RawFence(state.next_id());
        state.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: RawFence) {
        self.state.lock().fences.remove(&fence);
    }

    fn wait_fence(&self, fence: RawFence) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.fence_waits += 1;
        match state.fences.get(&fence) {
            Some(true) => Ok(()),
            Some(false) => Err(DeviceError::FenceNeverSignaled(fence)),
            None => Err(DeviceError::UnknownObject {
                object: "fence",
                id: fence.0,
            }),
        }
    }

    fn signal_fence(&self, fence: RawFence) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        let signaled = state
            .fences
            .get_mut(&fence)
            .ok_or(DeviceError::UnknownObject {
                object: "fence",
                id: fence.0,
            })?;
        *signaled = true;
        Ok(())
    }

    fn reset_fence(&self, fence: RawFence) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        let signaled = state
            .fences
            .get_mut(&fence)
            .ok_or(DeviceError::UnknownObject {
                object: "fence",
                id: fence.0,
            })?;
        *signaled = false;
        Ok(())
    }

    fn is_fence_signaled(&self, fence: RawFence) -> bool {
        self.state.lock().fences.get(&fence).copied().unwrap_or(false)
    }

    fn create_semaphore(&self) -> Result<RawSemaphore, DeviceError> {
        let mut state = self.state.lock();
        let semaphore = RawSemaphore(state.next_id());
        state.semaphores.insert(semaphore, 0);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: RawSemaphore) {
        self.state.lock().semaphores.remove(&semaphore);
    }

    fn create_command_list(&self, _queue: QueueId) -> Result<RawCommandList, DeviceError> {
        let mut state = self.state.lock();
        Ok(RawCommandList(state.next_id()))
    }

    fn submit(&self, submission: Submission) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.fail_submit {
            return Err(DeviceError::DeviceLost);
        }

        for wait in &submission.waits {
            let reached = *state
                .semaphores
                .get(&wait.semaphore)
                .ok_or(DeviceError::UnknownObject {
                    object: "semaphore",
                    id: wait.semaphore.0,
                })?;
            if reached < wait.value {
                return Err(DeviceError::SemaphoreNotSignaled {
                    semaphore: wait.semaphore,
                    value: wait.value,
                    reached,
                });
            }
        }

        for signal in &submission.signals {
            let value = state
                .semaphores
                .get_mut(&signal.semaphore)
                .ok_or(DeviceError::UnknownObject {
                    object: "semaphore",
                    id: signal.semaphore.0,
                })?;
            *value = (*value).max(signal.value);
        }

        if let Some(fence) = submission.fence {
            let signaled = state
                .fences
                .get_mut(&fence)
                .ok_or(DeviceError::UnknownObject {
                    object: "fence",
                    id: fence.0,
                })?;
            *signaled = true;
        }

        log::trace!(
            "Headless submit on {:?}: {} lists, {} waits, {} signals",
            submission.queue,
            submission.command_lists.len(),
            submission.waits.len(),
            submission.signals.len()
        );

        let limit = state
            .submission_limit
            .unwrap_or(DEFAULT_SUBMISSION_HISTORY);
        if limit == 0 {
            return Ok(());
        }
        if state.submissions.len() >= limit {
            state.submissions.pop_front();
        }
        state.submissions.push_back(SubmissionRecord {
            queue: submission.queue,
            command_lists: submission.command_lists,
            waits: submission.waits,
            signals: submission.signals,
            fence: submission.fence,
        });
        Ok(())
    }

    fn wait_queue_idle(&self, _queue: QueueId) -> Result<(), DeviceError> {
        Ok(())
    }
}
