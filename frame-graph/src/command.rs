use crate::{QueueId, RawBuffer, RawCommandList, RawTexture, ResourceState};

/// A command recorded by the core or by a pass callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TextureBarrier {
        texture: RawTexture,
        src_state: ResourceState,
        dst_state: ResourceState,
    },
    BufferBarrier {
        buffer: RawBuffer,
        src_state: ResourceState,
        dst_state: ResourceState,
    },
    BeginPass {
        name: String,
        execution_index: usize,
    },
    EndPass,
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyBufferToBuffer {
        src: RawBuffer,
        dst: RawBuffer,
        size: u64,
    },
    CopyTextureToTexture {
        src: RawTexture,
        dst: RawTexture,
    },
    Marker(String),
}

/// Software-recorded command list bound to one queue.
///
/// Only the owner can record into it; handing it to the submission context
/// moves it, which ends recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandList {
    raw: RawCommandList,
    queue: QueueId,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(raw: RawCommandList, queue: QueueId) -> Self {
        Self {
            raw,
            queue,
            commands: Vec::new(),
        }
    }

    pub fn raw(&self) -> RawCommandList {
        self.raw
    }

    pub fn queue(&self) -> QueueId {
        self.queue
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn record(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn texture_barrier(
        &mut self,
        texture: RawTexture,
        src_state: ResourceState,
        dst_state: ResourceState,
    ) {
        self.record(Command::TextureBarrier {
            texture,
            src_state,
            dst_state,
        });
    }

    pub fn buffer_barrier(
        &mut self,
        buffer: RawBuffer,
        src_state: ResourceState,
        dst_state: ResourceState,
    ) {
        self.record(Command::BufferBarrier {
            buffer,
            src_state,
            dst_state,
        });
    }

    pub fn begin_pass(&mut self, name: &str, execution_index: usize) {
        self.record(Command::BeginPass {
            name: name.to_string(),
            execution_index,
        });
    }

    pub fn end_pass(&mut self) {
        self.record(Command::EndPass);
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.record(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.record(Command::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record(Command::Dispatch { x, y, z });
    }

    pub fn copy_buffer_to_buffer(&mut self, src: RawBuffer, dst: RawBuffer, size: u64) {
        self.record(Command::CopyBufferToBuffer { src, dst, size });
    }

    pub fn copy_texture_to_texture(&mut self, src: RawTexture, dst: RawTexture) {
        self.record(Command::CopyTextureToTexture { src, dst });
    }

    pub fn marker(&mut self, label: impl Into<String>) {
        self.record(Command::Marker(label.into()));
    }

    pub fn barrier_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| {
                matches!(
                    command,
                    Command::TextureBarrier { .. } | Command::BufferBarrier { .. }
                )
            })
            .count()
    }

    /// Names of the passes recorded into this list, in order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::BeginPass { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut list = CommandList::new(RawCommandList(7), QueueId::Compute);
        list.begin_pass("luminance", 0);
        list.texture_barrier(RawTexture(1), ResourceState::Common, ResourceState::ShaderResource);
        list.dispatch(8, 8, 1);
        list.end_pass();

        assert_eq!(list.queue(), QueueId::Compute);
        assert_eq!(list.len(), 4);
        assert_eq!(list.barrier_count(), 1);
        assert_eq!(list.pass_names(), vec!["luminance"]);
        assert_eq!(list.commands()[2], Command::Dispatch { x: 8, y: 8, z: 1 });
    }
}
