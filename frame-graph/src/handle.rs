#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ResourceKind {
    #[default]
    Texture,
    Buffer,
}

/// Logical resource reference shared by the graph and the pool.
///
/// Id 0 is never allocated by the pool. The texture with id 0 is the
/// swapchain back buffer: the pool never creates, tracks or destroys it, and
/// passes only record that they touch it. A buffer with id 0 is just invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceHandle {
    pub id: u64,
    pub kind: ResourceKind,
}

impl ResourceHandle {
    pub const BACK_BUFFER: Self = Self {
        id: 0,
        kind: ResourceKind::Texture,
    };

    pub const fn texture(id: u64) -> Self {
        Self {
            id,
            kind: ResourceKind::Texture,
        }
    }

    pub const fn buffer(id: u64) -> Self {
        Self {
            id,
            kind: ResourceKind::Buffer,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.id != 0
    }

    pub fn is_back_buffer(&self) -> bool {
        *self == Self::BACK_BUFFER
    }

    pub fn is_texture(&self) -> bool {
        self.kind == ResourceKind::Texture
    }

    pub fn is_buffer(&self) -> bool {
        self.kind == ResourceKind::Buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_buffer_is_reserved() {
        assert!(ResourceHandle::BACK_BUFFER.is_back_buffer());
        assert!(!ResourceHandle::BACK_BUFFER.is_valid());
        assert_eq!(ResourceHandle::default(), ResourceHandle::BACK_BUFFER);

        let null_buffer = ResourceHandle::buffer(0);
        assert!(!null_buffer.is_valid());
        assert!(!null_buffer.is_back_buffer());
    }

    #[test]
    fn kinds() {
        let texture = ResourceHandle::texture(3);
        let buffer = ResourceHandle::buffer(3);
        assert!(texture.is_texture() && texture.is_valid());
        assert!(buffer.is_buffer());
        assert_ne!(texture, buffer);
    }
}
