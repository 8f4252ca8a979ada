//! Core backend abstraction traits
//!
//! The pool never talks to a graphics API directly. Everything it needs from
//! the driver layer goes through [`GraphicsBackend`].

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create shared memory: {0}")]
    SharedMemoryCreationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a sampleable GPU texture (2D or cube)
///
/// [`TextureHandle::NULL`] is the shared "no resource" sentinel. Binding it as
/// a shader input is a no-op on every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a render-targetable surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub(crate) u64);

/// Handle to a shared backing allocation that several textures may alias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedMemoryHandle(pub(crate) u64);

macro_rules! impl_handle {
    ($name:ident) => {
        impl $name {
            pub const NULL: Self = Self(0);

            /// Wrap a backend-issued id. Id 0 is reserved for [`Self::NULL`].
            pub fn from_raw(id: u64) -> Self {
                Self(id)
            }

            pub fn raw(&self) -> u64 {
                self.0
            }

            pub fn is_null(&self) -> bool {
                self.0 == 0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }
    };
}

impl_handle!(TextureHandle);
impl_handle!(SurfaceHandle);
impl_handle!(SharedMemoryHandle);

/// Driver layer consumed by the render target pool
///
/// Calls are synchronous from the pool's point of view. Any null handle
/// passed in (for example an unbound depth target) means "nothing".
pub trait GraphicsBackend {
    /// Get the backend name
    fn name(&self) -> &'static str;

    /// Hardware capabilities, queried once at pool creation
    fn capabilities(&self) -> PlatformCapabilities;

    /// Whether a stereo driver is active and wants draw calls duplicated per eye
    fn is_stereo_enabled(&self) -> bool {
        false
    }

    // === Resource Creation ===

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    fn create_targetable_surface(
        &mut self,
        desc: &SurfaceDescriptor,
    ) -> BackendResult<SurfaceHandle>;

    /// Allocate `size` bytes that textures can later be placed into
    fn create_shared_memory(&mut self, label: &str, size: u64)
        -> BackendResult<SharedMemoryHandle>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_surface(&mut self, surface: SurfaceHandle);

    fn destroy_shared_memory(&mut self, memory: SharedMemoryHandle);

    // === Binding and State ===

    /// Bind a color target (slot 0) and a depth-stencil target
    fn set_render_target(&mut self, color: SurfaceHandle, depth: SurfaceHandle);

    /// Bind an additional color target at `index` (1-based)
    fn set_mrt_render_target(&mut self, index: u32, surface: SurfaceHandle);

    fn set_mrt_color_write_enable(&mut self, index: u32, enable: bool);

    fn set_mrt_color_write_mask(&mut self, index: u32, mask: ColorWrites);

    fn set_color_write_enable(&mut self, enable: bool);

    fn set_color_write_mask(&mut self, mask: ColorWrites);

    fn set_viewport(&mut self, viewport: Viewport);

    fn clear(&mut self, values: ClearValues);

    /// Usage hint for a surface that is about to be bound
    fn update_render_target_usage(&mut self, _surface: SurfaceHandle, _usage: TargetUsage) {}

    // === Resolve ===

    /// Copy the surface into its resolve-target texture
    fn copy_to_resolve_target(
        &mut self,
        surface: SurfaceHandle,
        generate_mips: bool,
        params: &ResolveParams,
    );

    /// Restore previously resolved contents back into the surface
    fn copy_from_resolve_target(&mut self, surface: SurfaceHandle);
}
