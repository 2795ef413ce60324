/// GPU-side resource state a barrier transitions between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Common,
    VertexBuffer,
    IndexBuffer,
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    RenderTarget,
    DepthWrite,
    DepthRead,
    CopySrc,
    CopyDst,
    Present,
}

impl ResourceState {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::UnorderedAccess | Self::RenderTarget | Self::DepthWrite | Self::CopyDst
        )
    }

    pub fn is_read_only(self) -> bool {
        !self.is_write() && self != Self::Common
    }

    pub fn texture_read(is_depth_stencil: bool) -> Self {
        if is_depth_stencil {
            Self::DepthRead
        } else {
            Self::ShaderResource
        }
    }

    pub fn texture_write(is_depth_stencil: bool) -> Self {
        if is_depth_stencil {
            Self::DepthWrite
        } else {
            Self::RenderTarget
        }
    }

    pub fn buffer_read() -> Self {
        Self::ShaderResource
    }

    pub fn buffer_write() -> Self {
        Self::UnorderedAccess
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ResourceState::RenderTarget.is_write());
        assert!(ResourceState::CopyDst.is_write());
        assert!(ResourceState::ShaderResource.is_read_only());
        assert!(!ResourceState::Common.is_read_only());
        assert!(!ResourceState::Common.is_write());
    }

    #[test]
    fn depth_aware_defaults() {
        assert_eq!(ResourceState::texture_write(true), ResourceState::DepthWrite);
        assert_eq!(ResourceState::texture_write(false), ResourceState::RenderTarget);
        assert_eq!(ResourceState::texture_read(true), ResourceState::DepthRead);
        assert_eq!(ResourceState::texture_read(false), ResourceState::ShaderResource);
    }
}
