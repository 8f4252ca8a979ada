//! Common types shared between the pool and its backend

use glam::{UVec2, Vec4};

/// Pixel format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    R8Unorm,
    Rgb10A2Unorm,
    Rgba16Unorm,
    Rgba16Float,
    Rgba32Float,
    Rg16Float,
    Rg11B10Float,
    R32Float,
    Depth24PlusStencil8,
    Depth24Unorm,
    ShadowDepth,
    FilteredShadowDepth,
}

impl PixelFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            PixelFormat::Depth24PlusStencil8
                | PixelFormat::Depth24Unorm
                | PixelFormat::ShadowDepth
                | PixelFormat::FilteredShadowDepth
        )
    }

    /// Depth formats the hardware can always sample, regardless of general
    /// depth texture support (PCF and Fetch4 shadow formats).
    pub fn is_sampleable_shadow_depth(&self) -> bool {
        matches!(
            self,
            PixelFormat::FilteredShadowDepth | PixelFormat::Depth24Unorm
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::R8Unorm => 1,
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgb10A2Unorm
            | PixelFormat::Rg16Float
            | PixelFormat::Rg11B10Float
            | PixelFormat::R32Float
            | PixelFormat::Depth24PlusStencil8
            | PixelFormat::Depth24Unorm
            | PixelFormat::ShadowDepth
            | PixelFormat::FilteredShadowDepth => 4,
            PixelFormat::Rgba16Unorm | PixelFormat::Rgba16Float => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }
}

/// Texture creation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const NONE: Self = Self(0);
    /// Texture receives resolves from a targetable surface.
    pub const RESOLVE_TARGET: Self = Self(1 << 0);
    pub const DEPTH_STENCIL: Self = Self(1 << 1);
    /// Surface owns its own memory instead of borrowing the resolve target's.
    pub const DEDICATED: Self = Self(1 << 2);
    pub const MULTISAMPLE: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// How a pass intends to use the render target it binds.
///
/// Forwarded to the backend as a hint; `RESTORE_SURFACE` and `RESTORE_RAW`
/// additionally make the pool copy resolved contents back before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetUsage(u32);

impl TargetUsage {
    pub const DEFAULT: Self = Self(0);
    pub const RESTORE_SURFACE: Self = Self(1 << 0);
    pub const RESTORE_RAW: Self = Self(1 << 1);
    pub const FULL_OVERWRITE: Self = Self(1 << 2);
    pub const DONT_SWAP_BUFFER: Self = Self(1 << 3);
    pub const RESOLVE_DEPTH: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for TargetUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorWrites(pub u32);

impl ColorWrites {
    pub const RED: Self = Self(1 << 0);
    pub const GREEN: Self = Self(1 << 1);
    pub const BLUE: Self = Self(1 << 2);
    pub const ALPHA: Self = Self(1 << 3);
    pub const ALL: Self = Self(0xF);

    pub fn bits(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    D2,
    Cube,
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: PixelFormat,
    pub dimension: TextureDimension,
    pub usage: TextureUsage,
    /// Backing allocation to place the texture in, if any.
    pub shared_memory: Option<super::SharedMemoryHandle>,
}

impl TextureDescriptor {
    /// Bytes the texture occupies (all faces, first mip only).
    pub fn size_in_bytes(&self) -> u64 {
        let faces = match self.dimension {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        };
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64 * faces
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            mip_levels: 1,
            format: PixelFormat::Rgba8Unorm,
            dimension: TextureDimension::D2,
            usage: TextureUsage::RESOLVE_TARGET,
            shared_memory: None,
        }
    }
}

/// Render-targetable surface descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Texture that `copy_to_resolve_target` writes into.
    pub resolve_target: Option<super::TextureHandle>,
    pub usage: TextureUsage,
}

impl SurfaceDescriptor {
    pub fn size_in_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Sub-rectangle of a surface to resolve. Coordinates are exclusive on the
/// far edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl ResolveRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// Parameters of a single resolve. `rect: None` resolves the whole surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveParams {
    pub rect: Option<ResolveRect>,
    /// Destination array slice or cube face.
    pub slice: Option<u32>,
}

impl ResolveParams {
    pub fn with_rect(rect: ResolveRect) -> Self {
        Self {
            rect: Some(rect),
            slice: None,
        }
    }
}

/// Viewport in pixels with a depth range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub min: UVec2,
    pub max: UVec2,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            min: UVec2::new(x, y),
            max: UVec2::new(x + width, y + height),
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn width(&self) -> u32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> u32 {
        self.max.y - self.min.y
    }
}

/// What `clear` touches. `None` leaves the aspect untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearValues {
    pub color: Option<Vec4>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl ClearValues {
    pub fn color(color: Vec4) -> Self {
        Self {
            color: Some(color),
            ..Default::default()
        }
    }
}

/// Hardware features the pool adapts to. Queried once when the pool is
/// created and never re-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Depth surfaces can be resolved into sampleable textures.
    pub depth_textures: bool,
    /// Hardware percentage-closer filtering of shadow depth.
    pub hardware_pcf: bool,
    /// Four-tap depth fetch for shadow filtering.
    pub fetch4: bool,
    /// Explicit shared-memory allocations that several textures may alias.
    pub shared_memory: bool,
    /// Simultaneous color targets, including target 0.
    pub max_render_targets: u32,
    /// Cube maps can be bound as depth render targets.
    pub cube_render_targets: bool,
}

impl PlatformCapabilities {
    /// Feature-rich desktop GPU: depth textures, 8 MRTs, cube shadow targets.
    pub fn desktop() -> Self {
        Self {
            depth_textures: true,
            hardware_pcf: true,
            fetch4: false,
            shared_memory: false,
            max_render_targets: 8,
            cube_render_targets: true,
        }
    }

    /// Fixed-memory console: shared-memory aliasing, no G-buffer MRT path.
    pub fn console() -> Self {
        Self {
            depth_textures: true,
            hardware_pcf: false,
            fetch4: false,
            shared_memory: true,
            max_render_targets: 4,
            cube_render_targets: false,
        }
    }

    /// Minimal hardware: no depth textures, shadows go through color targets.
    pub fn minimal() -> Self {
        Self {
            depth_textures: false,
            hardware_pcf: false,
            fetch4: false,
            shared_memory: false,
            max_render_targets: 1,
            cube_render_targets: false,
        }
    }
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self::desktop()
    }
}
