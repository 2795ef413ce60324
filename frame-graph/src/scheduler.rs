use crate::{
    CommandList, FrameGraphError, QueueId, Result, SemaphoreOp, SubmitBatch, SubmitContext,
};
use std::collections::VecDeque;

const DEFAULT_PRIORITIES: [u32; 3] = [2, 1, 0];

/// Collects batches per queue and submits them so that no batch is handed to
/// the device before the batches it waits on.
///
/// Batches on the same queue keep their order. Across queues, the ready batch
/// on the highest-priority queue goes first.
pub struct MultiQueueScheduler {
    context: SubmitContext,
    batches: [VecDeque<SubmitBatch>; 3],
    priorities: [u32; 3],
}

impl MultiQueueScheduler {
    pub fn new(context: SubmitContext) -> Self {
        Self {
            context,
            batches: Default::default(),
            priorities: DEFAULT_PRIORITIES,
        }
    }

    pub fn context(&self) -> &SubmitContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SubmitContext {
        &mut self.context
    }

    pub fn submit(&mut self, batch: SubmitBatch) {
        self.batches[batch.queue.index()].push_back(batch);
    }

    fn queue_batch(
        &mut self,
        queue: QueueId,
        command_lists: Vec<CommandList>,
        waits: Vec<SemaphoreOp>,
        signals: Vec<SemaphoreOp>,
    ) {
        let mut batch = SubmitBatch::new(queue);
        batch.command_lists = command_lists;
        batch.waits = waits;
        batch.signals = signals;
        self.submit(batch);
    }

    pub fn submit_graphics(
        &mut self,
        command_lists: Vec<CommandList>,
        waits: Vec<SemaphoreOp>,
        signals: Vec<SemaphoreOp>,
    ) {
        self.queue_batch(QueueId::Graphics, command_lists, waits, signals);
    }

    pub fn submit_compute(
        &mut self,
        command_lists: Vec<CommandList>,
        waits: Vec<SemaphoreOp>,
        signals: Vec<SemaphoreOp>,
    ) {
        self.queue_batch(QueueId::Compute, command_lists, waits, signals);
    }

    pub fn submit_copy(
        &mut self,
        command_lists: Vec<CommandList>,
        waits: Vec<SemaphoreOp>,
        signals: Vec<SemaphoreOp>,
    ) {
        self.queue_batch(QueueId::Copy, command_lists, waits, signals);
    }

    pub fn set_queue_priority(&mut self, queue: QueueId, priority: u32) {
        self.priorities[queue.index()] = priority;
    }

    pub fn queue_priority(&self, queue: QueueId) -> u32 {
        self.priorities[queue.index()]
    }

    pub fn pending_work_count(&self) -> usize {
        self.batches.iter().map(VecDeque::len).sum()
    }

    fn queues_by_priority(&self) -> [QueueId; 3] {
        let mut queues = QueueId::ALL;
        queues.sort_by_key(|queue| std::cmp::Reverse(self.priorities[queue.index()]));
        queues
    }

    fn unsatisfied_wait(&self, batch: &SubmitBatch) -> Option<SemaphoreOp> {
        batch
            .waits
            .iter()
            .find(|wait| self.context.submitted_value(wait.semaphore) < wait.value)
            .copied()
    }

    /// Submits every queued batch and returns how many were submitted.
    ///
    /// Fails with [`FrameGraphError::UnsatisfiedWait`] when the remaining
    /// batches all wait on values nothing left in the scheduler will signal.
    /// On any error the batches not yet submitted are discarded.
    pub fn execute(&mut self) -> Result<usize> {
        let order = self.queues_by_priority();
        let mut submitted = 0;

        while self.pending_work_count() > 0 {
            let mut ready = None;
            let mut blocked = None;
            for queue in order {
                let Some(batch) = self.batches[queue.index()].front() else {
                    continue;
                };
                match self.unsatisfied_wait(batch) {
                    None => {
                        ready = Some(queue);
                        break;
                    }
                    Some(wait) => {
                        blocked.get_or_insert(FrameGraphError::UnsatisfiedWait {
                            queue,
                            semaphore: wait.semaphore,
                            value: wait.value,
                        });
                    }
                }
            }

            let Some(queue) = ready else {
                self.batches = Default::default();
                if let Some(error) = blocked {
                    return Err(error);
                }
                break;
            };

            if let Some(batch) = self.batches[queue.index()].pop_front() {
                if let Err(error) = self.context.submit_batch(batch) {
                    // The rest of the frame references resources that are
                    // released before the next execute.
                    self.batches = Default::default();
                    return Err(error);
                }
                submitted += 1;
            }
        }

        log::debug!("Scheduler submitted {submitted} batches");
        Ok(submitted)
    }

    pub fn wait_all(&self) -> Result<()> {
        self.context.wait_all_idle()
    }

    pub fn next_frame(&mut self) -> Result<()> {
        self.context.advance_frame()
    }
}
