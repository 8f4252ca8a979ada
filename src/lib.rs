//! Scene Render Targets - a render target pool for deferred renderers
//!
//! The pool owns every intermediate render target a frame needs (scene
//! color, depth, G-buffers, shadow depths, light attenuation, ambient
//! occlusion, translucency, fog, velocity, post-processing) and hands out
//! backend handles for them.
//!
//! # Features
//! - Sizes derived from a single principal size that only ever grows
//! - Lazy allocation, per-platform availability and handle reuse
//! - Shared-memory aliasing on fixed-memory platforms, checked by replaying a
//!   recorded bind timeline
//! - Begin/finish bracketing of every pass, with a scope guard
//! - Reconfiguration from any thread, applied on the owner thread
//! - Memory usage reporting
//!
//! # Example
//! ```
//! use scene_render_targets::backend::{DummyBackend, PlatformCapabilities};
//! use scene_render_targets::passes::{FinishParams, Pass};
//! use scene_render_targets::{PoolConfig, RenderTargetPool, Slot};
//!
//! let backend = DummyBackend::new(PlatformCapabilities::desktop());
//! let mut pool = RenderTargetPool::new(backend, PoolConfig::default());
//! pool.allocate(1920, 1080);
//!
//! pool.begin(Pass::SCENE_COLOR);
//! // draw...
//! pool.finish(Pass::SCENE_COLOR, FinishParams::default());
//! assert!(!pool.get_texture(Slot::SceneColor).is_null());
//! ```

pub mod backend;
pub mod error;
pub mod passes;
pub mod targets;

pub use error::{PoolError, PoolResult};
pub use passes::{FinishParams, Pass, PassScope, SlotState};
pub use targets::{Extent, RenderTargetPool, ShadowSettings, SharedMemoryBank, Slot};

use backend::PixelFormat;

/// Renderer feature switches that decide which slots exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSettings {
    pub allow_ambient_occlusion: bool,
    pub allow_motion_blur: bool,
    pub allow_dynamic_shadows: bool,
    /// Use hardware PCF for shadow depth when the platform has it
    pub allow_hardware_shadow_filtering: bool,
    pub allow_subsurface_scattering: bool,
    pub allow_separate_translucency: bool,
    /// Dominant light attenuation goes to a second buffer
    pub one_pass_dominant_light: bool,
    /// 16-bit float G-buffers instead of 8-bit and 10-bit ones
    pub high_precision_gbuffers: bool,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            allow_ambient_occlusion: true,
            allow_motion_blur: true,
            allow_dynamic_shadows: true,
            allow_hardware_shadow_filtering: true,
            allow_subsurface_scattering: false,
            allow_separate_translucency: false,
            one_pass_dominant_light: false,
            high_precision_gbuffers: false,
        }
    }
}

/// Configuration for creating a [`RenderTargetPool`]
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub features: FeatureSettings,
    pub shadows: ShadowSettings,
    /// Initial ambient occlusion downsample factor
    pub ao_downsample_factor: u32,
    /// Format of scene color and the fog accumulation targets
    pub scene_color_format: PixelFormat,
    /// Record begin/finish events for aliasing validation
    pub record_bind_timeline: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            features: FeatureSettings::default(),
            shadows: ShadowSettings::default(),
            ao_downsample_factor: targets::size::DEFAULT_AO_DOWNSAMPLE_FACTOR,
            scene_color_format: PixelFormat::Rgba16Float,
            record_bind_timeline: cfg!(debug_assertions),
        }
    }
}
