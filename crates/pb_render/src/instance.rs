/// Per-sprite record in a sprite list's instance buffer.
///
/// The quad is generated in the vertex shader from `vertex_index`, so one
/// instance is all the GPU needs per sprite.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpriteInstance {
    /// Centre in world units.
    pub position: [f32; 2],
    /// Width/height in world units after scaling.
    pub size: [f32; 2],
    /// Radians, counter-clockwise.
    pub angle: f32,
    pub _padding: f32,
    pub color: [f32; 4],
    /// `[u0, v0, du, dv]` inside the atlas.
    pub uv: [f32; 4],
}

impl SpriteInstance {
    pub const SIZE: usize = std::mem::size_of::<SpriteInstance>();

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: std::mem::offset_of!(SpriteInstance, position) as wgpu::BufferAddress,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // size
                wgpu::VertexAttribute {
                    offset: std::mem::offset_of!(SpriteInstance, size) as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // angle
                wgpu::VertexAttribute {
                    offset: std::mem::offset_of!(SpriteInstance, angle) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32,
                },
                // color
                wgpu::VertexAttribute {
                    offset: std::mem::offset_of!(SpriteInstance, color) as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // uv rect
                wgpu::VertexAttribute {
                    offset: std::mem::offset_of!(SpriteInstance, uv) as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}
