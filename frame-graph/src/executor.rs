use crate::{
    CommandList, FrameGraph, FrameGraphError, MultiQueueScheduler, PassContext, QueueId, Result,
    SemaphoreOp, SubmitBatch, TransientResourcePool,
};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes: usize,
    pub batches: usize,
    pub barriers: usize,
    pub cross_queue_syncs: usize,
    pub resources_created: usize,
}

struct PendingBatch {
    queue: QueueId,
    command_list: CommandList,
    waits: Vec<SemaphoreOp>,
    signals: Vec<SemaphoreOp>,
}

/// Records and submits one compiled frame.
///
/// Marks every pass's reads and writes into `pool` at its execution index and
/// compiles the pool. Each pass then gets its resources created, its barriers
/// and a begin/end marker around its callback recorded into the batch of its
/// queue; consecutive passes on the same queue share a batch. Every graph edge
/// between batches on different queues becomes a semaphore signal on the
/// producer and a wait on the consumer.
///
/// Nothing is submitted unless recording the whole frame succeeds.
pub fn execute_frame(
    graph: &mut FrameGraph,
    pool: &mut TransientResourcePool,
    scheduler: &mut MultiQueueScheduler,
    context: &PassContext<'_>,
) -> Result<FrameStats> {
    if !graph.is_compiled() {
        return Err(FrameGraphError::NotCompiled);
    }

    let pass_count = graph.pass_count();
    for index in 0..pass_count {
        let pass = index as u32;
        for &resource in graph.pass_reads(index) {
            pool.mark_resource_read(resource, pass)?;
        }
        for &resource in graph.pass_writes(index) {
            pool.mark_resource_write(resource, pass)?;
        }
    }
    pool.compile();

    let mut stats = FrameStats {
        passes: pass_count,
        ..Default::default()
    };
    let mut batches: Vec<PendingBatch> = Vec::new();
    let mut batch_of_pass: Vec<usize> = Vec::with_capacity(pass_count);
    let mut synced: HashSet<(usize, usize)> = HashSet::new();

    for index in 0..pass_count {
        let pass = index as u32;
        let queue = graph.pass_queue(index).unwrap_or_default();

        for handle in pool.resources_created_at(pass) {
            pool.get_or_create(handle)?;
            stats.resources_created += 1;
        }

        if batches.last().is_none_or(|batch| batch.queue != queue) {
            let command_list = scheduler.context_mut().begin_command_list(queue)?;
            batches.push(PendingBatch {
                queue,
                command_list,
                waits: Vec::new(),
                signals: Vec::new(),
            });
        }
        let batch_index = batches.len() - 1;
        batch_of_pass.push(batch_index);

        for producer in graph.pass_dependencies(index) {
            let producer_batch = batch_of_pass[producer];
            let producer_queue = batches[producer_batch].queue;
            if producer_queue == queue || !synced.insert((producer_batch, batch_index)) {
                continue;
            }
            let sync = scheduler
                .context_mut()
                .create_queue_sync(producer_queue, queue)?;
            batches[producer_batch].signals.extend(sync.signal_op());
            batches[batch_index].waits.extend(sync.wait_op());
            stats.cross_queue_syncs += 1;
        }

        let batch = &mut batches[batch_index];
        stats.barriers += pool.insert_barriers_for_pass(pass, &mut batch.command_list)?;

        let name = graph.pass_name(index).unwrap_or_default().to_string();
        batch.command_list.begin_pass(&name, index);
        let pass_context = context.for_pass(index, pool);
        graph.execute_pass(index, &pass_context, &mut batch.command_list)?;
        batch.command_list.end_pass();
    }

    stats.batches = batches.len();
    for batch in batches {
        let mut submit = SubmitBatch::new(batch.queue).with_command_list(batch.command_list);
        submit.waits = batch.waits;
        submit.signals = batch.signals;
        scheduler.submit(submit);
    }
    scheduler.execute()?;

    log::debug!(
        "Executed frame {}: {} passes in {} batches, {} barriers, {} cross-queue syncs",
        context.frame_index(),
        stats.passes,
        stats.batches,
        stats.barriers,
        stats.cross_queue_syncs
    );
    Ok(stats)
}
