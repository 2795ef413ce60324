use crate::{
    CommandList, Fence, QueueId, QueueSyncPoint, RawSemaphore, RenderDevice, Result, Semaphore,
    SemaphoreOp, Submission,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub frames_in_flight: usize,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
        }
    }
}

impl SubmitConfig {
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }
}

/// An explicit submission: ordered command lists plus semaphore waits and signals.
#[derive(Debug)]
pub struct SubmitBatch {
    pub queue: QueueId,
    pub command_lists: Vec<CommandList>,
    pub waits: Vec<SemaphoreOp>,
    pub signals: Vec<SemaphoreOp>,
    /// Track completion with a frame fence in the current frame slot.
    pub signal_frame_fence: bool,
}

impl SubmitBatch {
    pub fn new(queue: QueueId) -> Self {
        Self {
            queue,
            command_lists: Vec::new(),
            waits: Vec::new(),
            signals: Vec::new(),
            signal_frame_fence: true,
        }
    }

    pub fn with_command_list(mut self, command_list: CommandList) -> Self {
        self.command_lists.push(command_list);
        self
    }

    pub fn with_wait(mut self, wait: SemaphoreOp) -> Self {
        self.waits.push(wait);
        self
    }

    pub fn with_signal(mut self, signal: SemaphoreOp) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn wait_on(&mut self, sync: &QueueSyncPoint) {
        self.waits.extend(sync.wait_op());
    }

    pub fn signal_on(&mut self, sync: &QueueSyncPoint) {
        self.signals.extend(sync.signal_op());
    }
}

#[derive(Default)]
struct PendingQueue {
    command_lists: Vec<CommandList>,
    waits: Vec<SemaphoreOp>,
    signals: Vec<SemaphoreOp>,
}

impl PendingQueue {
    fn is_empty(&self) -> bool {
        self.command_lists.is_empty() && self.waits.is_empty() && self.signals.is_empty()
    }
}

struct QueueSemaphore {
    semaphore: Semaphore,
    next_value: u64,
}

/// Records command lists per queue, submits them with semaphore
/// synchronization and rotates frame-in-flight slots.
///
/// Every tracked submission gets its own fence from a free list. The fences
/// live in the slot of the frame that submitted them until that slot is
/// reused, at which point they are waited on, reset and recycled.
pub struct SubmitContext {
    device: Arc<dyn RenderDevice>,
    frames_in_flight: usize,
    frame_index: usize,
    frame_count: u64,
    pending: [PendingQueue; 3],
    frame_fences: Vec<[Vec<Fence>; 3]>,
    free_fences: Vec<Fence>,
    queue_semaphores: HashMap<(QueueId, QueueId), QueueSemaphore>,
    submitted_values: HashMap<RawSemaphore, u64>,
}

impl SubmitContext {
    pub fn new(device: Arc<dyn RenderDevice>, config: SubmitConfig) -> Self {
        let frames_in_flight = config.frames_in_flight.max(1);
        Self {
            device,
            frames_in_flight,
            frame_index: 0,
            frame_count: 0,
            pending: Default::default(),
            frame_fences: (0..frames_in_flight).map(|_| Default::default()).collect(),
            free_fences: Vec::new(),
            queue_semaphores: HashMap::new(),
            submitted_values: HashMap::new(),
        }
    }

    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    pub fn begin_command_list(&mut self, queue: QueueId) -> Result<CommandList> {
        let raw = self.device.create_command_list(queue)?;
        Ok(CommandList::new(raw, queue))
    }

    /// Queues a finished list on the queue it was begun on.
    pub fn end_command_list(&mut self, command_list: CommandList) {
        self.pending[command_list.queue().index()]
            .command_lists
            .push(command_list);
    }

    pub fn attach_wait(&mut self, queue: QueueId, wait: SemaphoreOp) {
        self.pending[queue.index()].waits.push(wait);
    }

    pub fn attach_signal(&mut self, queue: QueueId, signal: SemaphoreOp) {
        self.pending[queue.index()].signals.push(signal);
    }

    pub fn pending_command_list_count(&self, queue: QueueId) -> usize {
        self.pending[queue.index()].command_lists.len()
    }

    /// Flushes the pending lists of one queue as a single batch.
    pub fn submit_queue(&mut self, queue: QueueId) -> Result<()> {
        if self.pending[queue.index()].is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending[queue.index()]);
        self.submit_tracked(
            queue,
            pending.command_lists,
            pending.waits,
            pending.signals,
            true,
        )
    }

    pub fn submit_all(&mut self) -> Result<()> {
        for queue in QueueId::ALL {
            self.submit_queue(queue)?;
        }
        Ok(())
    }

    pub fn submit_batch(&mut self, batch: SubmitBatch) -> Result<()> {
        self.submit_tracked(
            batch.queue,
            batch.command_lists,
            batch.waits,
            batch.signals,
            batch.signal_frame_fence,
        )
    }

    fn submit_tracked(
        &mut self,
        queue: QueueId,
        command_lists: Vec<CommandList>,
        waits: Vec<SemaphoreOp>,
        signals: Vec<SemaphoreOp>,
        track: bool,
    ) -> Result<()> {
        let fence = if track {
            Some(self.acquire_fence()?)
        } else {
            None
        };

        log::trace!(
            "Submitting {} command lists to {queue:?} ({} waits, {} signals)",
            command_lists.len(),
            waits.len(),
            signals.len()
        );

        let submission = Submission {
            queue,
            command_lists,
            waits,
            signals: signals.clone(),
            fence: fence.as_ref().map(Fence::raw),
        };

        if let Err(error) = self.device.submit(submission) {
            self.free_fences.extend(fence);
            return Err(error.into());
        }

        for signal in signals {
            let value = self.submitted_values.entry(signal.semaphore).or_insert(0);
            *value = (*value).max(signal.value);
        }
        if let Some(fence) = fence {
            self.frame_fences[self.frame_index][queue.index()].push(fence);
        }
        Ok(())
    }

    fn acquire_fence(&mut self) -> Result<Fence> {
        match self.free_fences.pop() {
            Some(fence) => Ok(fence),
            None => Fence::new(self.device.clone(), false),
        }
    }

    /// Highest value signalled on `semaphore` by work already submitted.
    pub fn submitted_value(&self, semaphore: RawSemaphore) -> u64 {
        self.submitted_values.get(&semaphore).copied().unwrap_or(0)
    }

    /// Returns a sync point from `producer` to `consumer` with a fresh
    /// timeline value. One semaphore is shared by every sync on the same pair.
    pub fn create_queue_sync(
        &mut self,
        producer: QueueId,
        consumer: QueueId,
    ) -> Result<QueueSyncPoint> {
        let entry = match self.queue_semaphores.entry((producer, consumer)) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => entry.insert(QueueSemaphore {
                semaphore: Semaphore::new(self.device.clone())?,
                next_value: 1,
            }),
        };

        let value = entry.next_value;
        entry.next_value += 1;
        let semaphore = entry.semaphore.raw();

        Ok(QueueSyncPoint {
            producer,
            consumer,
            wait_semaphore: Some(semaphore),
            signal_semaphore: Some(semaphore),
            wait_value: value,
            signal_value: value,
        })
    }

    pub fn create_compute_to_graphics_sync(&mut self) -> Result<QueueSyncPoint> {
        self.create_queue_sync(QueueId::Compute, QueueId::Graphics)
    }

    pub fn create_copy_to_graphics_sync(&mut self) -> Result<QueueSyncPoint> {
        self.create_queue_sync(QueueId::Copy, QueueId::Graphics)
    }

    pub fn create_copy_to_compute_sync(&mut self) -> Result<QueueSyncPoint> {
        self.create_queue_sync(QueueId::Copy, QueueId::Compute)
    }

    /// Most recent fence submitted on `queue` in the current frame slot.
    pub fn current_frame_fence(&self, queue: QueueId) -> Option<&Fence> {
        self.frame_fences[self.frame_index][queue.index()].last()
    }

    pub fn wait_for_current_frame(&mut self, queue: QueueId) -> Result<()> {
        for fence in &self.frame_fences[self.frame_index][queue.index()] {
            fence.wait()?;
        }
        Ok(())
    }

    /// Moves to the next frame slot, first waiting on every fence that slot
    /// submitted `frames_in_flight` frames ago. If a wait fails the current
    /// slot stays in place, so calling again retries the same slot.
    pub fn advance_frame(&mut self) -> Result<()> {
        let next = (self.frame_index + 1) % self.frames_in_flight;
        self.recycle_slot(next)?;
        self.frame_index = next;
        self.frame_count += 1;
        Ok(())
    }

    fn recycle_slot(&mut self, slot: usize) -> Result<()> {
        for queue in QueueId::ALL {
            let fences = std::mem::take(&mut self.frame_fences[slot][queue.index()]);
            let mut fences = fences.into_iter();
            while let Some(fence) = fences.next() {
                if let Err(error) = fence.wait().and_then(|_| fence.reset()) {
                    // Keep the untouched fences so a retry waits on them again.
                    let remaining = &mut self.frame_fences[slot][queue.index()];
                    remaining.push(fence);
                    remaining.extend(fences);
                    return Err(error);
                }
                self.free_fences.push(fence);
            }
        }
        Ok(())
    }

    pub fn wait_queue_idle(&self, queue: QueueId) -> Result<()> {
        Ok(self.device.wait_queue_idle(queue)?)
    }

    pub fn wait_all_idle(&self) -> Result<()> {
        for queue in QueueId::ALL {
            self.wait_queue_idle(queue)?;
        }
        Ok(())
    }

    pub fn current_frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Waits for the device to go idle, recycles every frame fence and drops
    /// pending work.
    pub fn reset(&mut self) -> Result<()> {
        self.wait_all_idle()?;
        for slot in 0..self.frames_in_flight {
            self.recycle_slot(slot)?;
        }
        self.pending = Default::default();
        self.frame_index = 0;
        Ok(())
    }
}

impl Drop for SubmitContext {
    fn drop(&mut self) {
        if let Err(error) = self.wait_all_idle() {
            log::warn!("Failed to idle queues while dropping submit context: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameGraphError, HeadlessDevice, RenderDevice};

    fn context(frames_in_flight: usize) -> (Arc<HeadlessDevice>, SubmitContext) {
        let device = Arc::new(HeadlessDevice::new());
        let context = SubmitContext::new(
            device.clone(),
            SubmitConfig::default().with_frames_in_flight(frames_in_flight),
        );
        (device, context)
    }

    #[test]
    fn end_command_list_queues_on_own_queue() {
        let (device, mut context) = context(2);
        let list = context.begin_command_list(QueueId::Compute).unwrap();
        context.end_command_list(list);

        assert_eq!(context.pending_command_list_count(QueueId::Compute), 1);
        assert_eq!(context.pending_command_list_count(QueueId::Graphics), 0);

        context.submit_all().unwrap();
        let submissions = device.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].queue, QueueId::Compute);
        assert!(submissions[0].fence.is_some());
    }

    #[test]
    fn queue_sync_reuses_semaphore_with_fresh_values() {
        let (device, mut context) = context(2);
        let first = context.create_compute_to_graphics_sync().unwrap();
        let second = context.create_compute_to_graphics_sync().unwrap();
        let other = context.create_copy_to_compute_sync().unwrap();

        assert_eq!(first.signal_semaphore, second.signal_semaphore);
        assert_eq!(first.wait_semaphore, first.signal_semaphore);
        assert!(second.signal_value > first.signal_value);
        assert_ne!(first.signal_semaphore, other.signal_semaphore);
        assert_eq!(device.live_semaphore_count(), 2);
    }

    #[test]
    fn signal_then_wait_across_queues() {
        let (_device, mut context) = context(2);
        let sync = context.create_compute_to_graphics_sync().unwrap();

        let compute = context.begin_command_list(QueueId::Compute).unwrap();
        context.end_command_list(compute);
        context.attach_signal(QueueId::Compute, sync.signal_op().unwrap());
        context.submit_queue(QueueId::Compute).unwrap();
        assert_eq!(
            context.submitted_value(sync.signal_semaphore.unwrap()),
            sync.signal_value
        );

        let graphics = context.begin_command_list(QueueId::Graphics).unwrap();
        context.end_command_list(graphics);
        context.attach_wait(QueueId::Graphics, sync.wait_op().unwrap());
        context.submit_queue(QueueId::Graphics).unwrap();
    }

    #[test]
    fn wait_before_signal_is_rejected() {
        let (_device, mut context) = context(2);
        let sync = context.create_copy_to_graphics_sync().unwrap();

        let graphics = context.begin_command_list(QueueId::Graphics).unwrap();
        context.end_command_list(graphics);
        context.attach_wait(QueueId::Graphics, sync.wait_op().unwrap());

        assert!(matches!(
            context.submit_queue(QueueId::Graphics),
            Err(FrameGraphError::Device(_))
        ));
        // The fence acquired for the failed submission is not tracked.
        assert!(context.current_frame_fence(QueueId::Graphics).is_none());
    }

    #[test]
    fn advance_frame_rotates_slots() {
        let (_device, mut context) = context(3);
        assert_eq!(context.frames_in_flight(), 3);
        for expected in [1, 2, 0, 1] {
            context.advance_frame().unwrap();
            assert_eq!(context.current_frame_index(), expected);
        }
        assert_eq!(context.frame_count(), 4);
    }

    #[test]
    fn failed_advance_retries_the_same_slot() {
        let (device, mut context) = context(2);
        let list = context.begin_command_list(QueueId::Graphics).unwrap();
        context.end_command_list(list);
        context.submit_all().unwrap();
        let fence = context.current_frame_fence(QueueId::Graphics).unwrap();
        let raw = fence.raw();
        fence.reset().unwrap();

        context.advance_frame().unwrap();
        assert!(context.advance_frame().is_err());
        assert_eq!(context.current_frame_index(), 1);
        assert_eq!(context.frame_count(), 1);

        device.signal_fence(raw).unwrap();
        context.advance_frame().unwrap();
        assert_eq!(context.current_frame_index(), 0);
        assert_eq!(context.frame_count(), 2);
        assert!(context.current_frame_fence(QueueId::Graphics).is_none());
    }

    #[test]
    fn fences_are_recycled() {
        let (device, mut context) = context(1);
        for _ in 0..4 {
            let list = context.begin_command_list(QueueId::Graphics).unwrap();
            context.end_command_list(list);
            context.submit_all().unwrap();
            context.advance_frame().unwrap();
        }
        assert_eq!(device.live_fence_count(), 1);
    }

    #[test]
    fn reset_returns_to_first_slot() {
        let (_device, mut context) = context(2);
        let list = context.begin_command_list(QueueId::Copy).unwrap();
        context.end_command_list(list);
        context.submit_all().unwrap();
        context.advance_frame().unwrap();
        context.reset().unwrap();

        assert_eq!(context.current_frame_index(), 0);
        assert!(context.current_frame_fence(QueueId::Copy).is_none());
    }
}
