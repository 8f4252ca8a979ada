//! Buffer dimensions
//!
//! Every extent the pool allocates is a pure function of the principal size
//! plus a handful of knobs:
//!
//! ```text
//!   principal (multiple of 8)
//!     ├── filter        = principal / 4 + 2
//!     ├── translucency  = max(1, principal / 2)
//!     ├── fog           = max(1, principal / 2)
//!     ├── ao            = max(1, principal / ao_factor)
//!     └── velocity      = principal (halved with shared memory)
//!
//!   shadow settings
//!     ├── object        = clamp(max_shadow_resolution, 1, max_object_size)
//!     ├── whole scene   = clamp(max_whole_scene_resolution, 1, max_whole_scene_size)
//!     ├── translucency  = object * preshadow_factor
//!     ├── preshadow     = object * preshadow_factor
//!     └── cube[i]       = max(object.x / 2 >> i, min_shadow_resolution)
//! ```

use glam::UVec2;
use log::warn;

use super::slot::{ExtentCategory, NUM_CUBE_SHADOW_SURFACES};
use crate::error::{PoolError, PoolResult};

pub const FILTER_DOWNSAMPLE_FACTOR: u32 = 4;
pub const FOG_ACCUMULATION_DOWNSAMPLE_FACTOR: u32 = 2;
pub const SMALL_COLOR_DEPTH_DOWNSAMPLE_FACTOR: u32 = 2;
pub const DEFAULT_AO_DOWNSAMPLE_FACTOR: u32 = 2;
/// Padding added to each filter dimension for kernel taps.
pub const FILTER_PADDING: u32 = 2;
pub const SIZE_ALIGNMENT: u32 = 8;
/// Unwrapped 16x16x16 color grading volume.
pub const LUT_BLEND_EXTENT: Extent = Extent::new(16 * 16, 16);

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether `other` fits inside this extent in both dimensions.
    pub fn contains(&self, other: Extent) -> bool {
        other.width <= self.width && other.height <= self.height
    }
}

impl From<UVec2> for Extent {
    fn from(v: UVec2) -> Self {
        Self::new(v.x, v.y)
    }
}

impl From<Extent> for UVec2 {
    fn from(e: Extent) -> Self {
        UVec2::new(e.width, e.height)
    }
}

/// Shadow buffer limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    /// Requested per-object shadow resolution.
    pub max_shadow_resolution: u32,
    /// Requested whole-scene dominant shadow resolution.
    pub max_whole_scene_shadow_resolution: u32,
    /// Hardware clamp for per-object shadows. A Y larger than X is clamped
    /// down to X.
    pub max_object_shadow_size: UVec2,
    pub max_whole_scene_shadow_size: u32,
    /// Ratio applied to the object extent for translucency and preshadow cache buffers.
    pub preshadow_resolution_factor: f32,
    /// Smallest cube shadow face.
    pub min_shadow_resolution: u32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            max_shadow_resolution: 1024,
            max_whole_scene_shadow_resolution: 2048,
            max_object_shadow_size: UVec2::new(2048, 2048),
            max_whole_scene_shadow_size: 4096,
            preshadow_resolution_factor: 0.5,
            min_shadow_resolution: 32,
        }
    }
}

/// Derives every extent from the principal size.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeConfig {
    principal: Extent,
    ao_downsample_factor: u32,
    halve_velocity: bool,
    shadows: ShadowSettings,
}

impl SizeConfig {
    /// `halve_velocity` is set on platforms with shared-memory aliasing, where
    /// the velocity buffer shares a bank with quarter-size targets.
    pub fn new(ao_downsample_factor: u32, shadows: ShadowSettings, halve_velocity: bool) -> Self {
        warn_on_tall_object_clamp(&shadows);
        Self {
            principal: Extent::ZERO,
            ao_downsample_factor: ao_downsample_factor.max(1),
            halve_velocity,
            shadows,
        }
    }

    pub fn principal(&self) -> Extent {
        self.principal
    }

    pub fn is_configured(&self) -> bool {
        !self.principal.is_zero()
    }

    /// Round a requested size up to the alignment the pool stores.
    pub fn align(width: u32, height: u32) -> Extent {
        Extent::new(
            width.next_multiple_of(SIZE_ALIGNMENT),
            height.next_multiple_of(SIZE_ALIGNMENT),
        )
    }

    /// Store a new principal size, rounded up to a multiple of 8.
    ///
    /// A zero dimension is ignored. Returns whether the stored size changed.
    pub fn set_principal_size(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let aligned = Self::align(width, height);
        let changed = aligned != self.principal;
        self.principal = aligned;
        changed
    }

    pub fn ao_downsample_factor(&self) -> u32 {
        self.ao_downsample_factor
    }

    /// Returns whether the factor actually changed.
    pub fn set_ao_downsample_factor(&mut self, factor: u32) -> PoolResult<bool> {
        if factor == 0 {
            return Err(PoolError::InvalidParameter(
                "ambient occlusion downsample factor must be at least 1".to_string(),
            ));
        }
        let changed = factor != self.ao_downsample_factor;
        self.ao_downsample_factor = factor;
        Ok(changed)
    }

    pub fn shadows(&self) -> &ShadowSettings {
        &self.shadows
    }

    pub fn set_shadows(&mut self, shadows: ShadowSettings) {
        warn_on_tall_object_clamp(&shadows);
        self.shadows = shadows;
    }

    fn downsampled(&self, factor: u32) -> Extent {
        (UVec2::from(self.principal) / factor).max(UVec2::ONE).into()
    }

    pub fn filter_extent(&self) -> Extent {
        if !self.is_configured() {
            return Extent::ZERO;
        }
        (UVec2::from(self.principal) / FILTER_DOWNSAMPLE_FACTOR + FILTER_PADDING).into()
    }

    pub fn translucency_extent(&self) -> Extent {
        if !self.is_configured() {
            return Extent::ZERO;
        }
        self.downsampled(SMALL_COLOR_DEPTH_DOWNSAMPLE_FACTOR)
    }

    pub fn fog_accumulation_extent(&self) -> Extent {
        if !self.is_configured() {
            return Extent::ZERO;
        }
        self.downsampled(FOG_ACCUMULATION_DOWNSAMPLE_FACTOR)
    }

    pub fn ao_extent(&self) -> Extent {
        if !self.is_configured() {
            return Extent::ZERO;
        }
        self.downsampled(self.ao_downsample_factor)
    }

    pub fn velocity_extent(&self) -> Extent {
        if !self.is_configured() {
            return Extent::ZERO;
        }
        self.downsampled(if self.halve_velocity { 2 } else { 1 })
    }

    /// Per-object or whole-scene dominant shadow depth extent.
    pub fn shadow_extent(&self, whole_scene: bool) -> Extent {
        let s = &self.shadows;
        if whole_scene {
            let side = s
                .max_whole_scene_shadow_resolution
                .clamp(1, s.max_whole_scene_shadow_size.max(1));
            Extent::new(side, side)
        } else {
            // per-object shadows are laid out along X
            let max = s.max_object_shadow_size.max(UVec2::ONE);
            Extent::new(
                s.max_shadow_resolution.clamp(1, max.x),
                s.max_shadow_resolution.clamp(1, max.x.min(max.y)),
            )
        }
    }

    fn scaled_object_shadow(&self) -> Extent {
        let object = self.shadow_extent(false);
        let factor = self.shadows.preshadow_resolution_factor;
        Extent::new(
            (factor * object.width as f32) as u32,
            (factor * object.height as f32) as u32,
        )
    }

    pub fn translucency_shadow_extent(&self) -> Extent {
        self.scaled_object_shadow()
    }

    pub fn preshadow_cache_extent(&self) -> Extent {
        self.scaled_object_shadow()
    }

    /// Square face size of the cube shadow target at `index`.
    pub fn cube_shadow_resolution(&self, index: usize) -> u32 {
        debug_assert!(index < NUM_CUBE_SHADOW_SURFACES);
        let min = self.shadows.min_shadow_resolution.max(1);
        if index + 1 >= NUM_CUBE_SHADOW_SURFACES {
            return min;
        }
        let half = self.shadow_extent(false).width / 2;
        (half >> index).max(min)
    }

    /// First cube target whose face fits inside `resolution`; the smallest
    /// target catches everything below it.
    pub fn cube_shadow_index(&self, resolution: u32) -> usize {
        (0..NUM_CUBE_SHADOW_SURFACES)
            .find(|&index| resolution >= self.cube_shadow_resolution(index))
            .unwrap_or(NUM_CUBE_SHADOW_SURFACES - 1)
    }

    /// Extent of a sizing category; zero until a principal size is set.
    pub fn extent(&self, category: ExtentCategory) -> Extent {
        if !self.is_configured() {
            return Extent::ZERO;
        }
        match category {
            ExtentCategory::Primary => self.principal,
            ExtentCategory::Filter => self.filter_extent(),
            ExtentCategory::Translucency => self.translucency_extent(),
            ExtentCategory::FogAccumulation => self.fog_accumulation_extent(),
            ExtentCategory::AmbientOcclusion => self.ao_extent(),
            ExtentCategory::Velocity => self.velocity_extent(),
            ExtentCategory::ShadowObject => self.shadow_extent(false),
            ExtentCategory::ShadowWholeScene => self.shadow_extent(true),
            ExtentCategory::ShadowTranslucency => self.translucency_shadow_extent(),
            ExtentCategory::ShadowPreshadowCache => self.preshadow_cache_extent(),
            ExtentCategory::CubeShadow(index) => {
                let side = self.cube_shadow_resolution(index as usize);
                Extent::new(side, side)
            }
            ExtentCategory::LutBlend => LUT_BLEND_EXTENT,
            ExtentCategory::Unit => Extent::new(1, 1),
        }
    }
}

fn warn_on_tall_object_clamp(shadows: &ShadowSettings) {
    let max = shadows.max_object_shadow_size;
    if max.y > max.x {
        warn!(
            "Object shadow clamp {}x{} is taller than wide, using {}x{}",
            max.x, max.y, max.x, max.x
        );
    }
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_AO_DOWNSAMPLE_FACTOR, ShadowSettings::default(), false)
    }
}
