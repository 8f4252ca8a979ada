//! Logical render target slots and their static description table
//!
//! Every slot maps to exactly one [`ExtentCategory`], a format rule, a
//! multisample flag, a storage shape and an availability predicate. The
//! table is the single place that knows which platforms and features a slot
//! exists on.

use std::fmt;

use crate::backend::{PixelFormat, PlatformCapabilities};
use crate::FeatureSettings;

/// Number of cube shadow depth targets, one per resolution step.
pub const NUM_CUBE_SHADOW_SURFACES: usize = 5;

/// Logical render target role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum Slot {
    FilterColor,
    SceneColor,
    SceneColorRaw,
    SceneDepthZ,
    SmallDepthZ,
    ReflectionSmallDepthZ,
    ShadowDepthZ,
    DominantShadowDepthZ,
    TranslucencyShadowDepthZ,
    PreshadowCacheDepthZ,
    ShadowDepthColor,
    DominantShadowDepthColor,
    TranslucencyShadowDepthColor,
    PreshadowCacheDepthColor,
    LightAttenuation0,
    LightAttenuation1,
    TranslucencyBuffer,
    HalfResPostProcess,
    TranslucencyDominantLightAttenuation,
    AoInput,
    AoOutput,
    AoHistory,
    VelocityBuffer,
    QuarterSizeSceneColor,
    FogFrontfacesIntegralAccumulation,
    FogBackfacesIntegralAccumulation,
    HitProxy,
    FogBuffer,
    FilterColor2,
    DofBlurBuffer,
    LutBlend,
    FilterColor3,
    SubsurfaceInscattering,
    SubsurfaceScatteringAttenuation,
    WorldNormalGBuffer,
    WorldReflectionNormalGBuffer,
    SpecularGBuffer,
    DiffuseGBuffer,
    WhiteDummy,
    BokehDof,
    CubeShadowDepthZ0,
    CubeShadowDepthZ1,
    CubeShadowDepthZ2,
    CubeShadowDepthZ3,
    CubeShadowDepthZ4,
    SeparateTranslucency,
    SeparateTranslucencyDepth,
}

pub const SLOT_COUNT: usize = 47;

impl Slot {
    pub const ALL: [Slot; SLOT_COUNT] = [
        Slot::FilterColor,
        Slot::SceneColor,
        Slot::SceneColorRaw,
        Slot::SceneDepthZ,
        Slot::SmallDepthZ,
        Slot::ReflectionSmallDepthZ,
        Slot::ShadowDepthZ,
        Slot::DominantShadowDepthZ,
        Slot::TranslucencyShadowDepthZ,
        Slot::PreshadowCacheDepthZ,
        Slot::ShadowDepthColor,
        Slot::DominantShadowDepthColor,
        Slot::TranslucencyShadowDepthColor,
        Slot::PreshadowCacheDepthColor,
        Slot::LightAttenuation0,
        Slot::LightAttenuation1,
        Slot::TranslucencyBuffer,
        Slot::HalfResPostProcess,
        Slot::TranslucencyDominantLightAttenuation,
        Slot::AoInput,
        Slot::AoOutput,
        Slot::AoHistory,
        Slot::VelocityBuffer,
        Slot::QuarterSizeSceneColor,
        Slot::FogFrontfacesIntegralAccumulation,
        Slot::FogBackfacesIntegralAccumulation,
        Slot::HitProxy,
        Slot::FogBuffer,
        Slot::FilterColor2,
        Slot::DofBlurBuffer,
        Slot::LutBlend,
        Slot::FilterColor3,
        Slot::SubsurfaceInscattering,
        Slot::SubsurfaceScatteringAttenuation,
        Slot::WorldNormalGBuffer,
        Slot::WorldReflectionNormalGBuffer,
        Slot::SpecularGBuffer,
        Slot::DiffuseGBuffer,
        Slot::WhiteDummy,
        Slot::BokehDof,
        Slot::CubeShadowDepthZ0,
        Slot::CubeShadowDepthZ1,
        Slot::CubeShadowDepthZ2,
        Slot::CubeShadowDepthZ3,
        Slot::CubeShadowDepthZ4,
        Slot::SeparateTranslucency,
        Slot::SeparateTranslucencyDepth,
    ];

    /// The ambient occlusion working set, released together when the AO
    /// downsample factor changes.
    pub const AMBIENT_OCCLUSION: [Slot; 3] = [Slot::AoInput, Slot::AoOutput, Slot::AoHistory];

    pub const GBUFFERS: [Slot; 4] = [
        Slot::WorldNormalGBuffer,
        Slot::WorldReflectionNormalGBuffer,
        Slot::SpecularGBuffer,
        Slot::DiffuseGBuffer,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a slot by its numeric id. Ids outside the enumeration yield `None`.
    pub fn from_index(index: u32) -> Option<Slot> {
        Slot::ALL.get(index as usize).copied()
    }

    /// Cube shadow slot for a resolution step, `index < NUM_CUBE_SHADOW_SURFACES`.
    pub fn cube_shadow(index: usize) -> Option<Slot> {
        (index < NUM_CUBE_SHADOW_SURFACES)
            .then(|| Slot::ALL[Slot::CubeShadowDepthZ0.index() + index])
    }

    pub fn name(self) -> &'static str {
        match self {
            Slot::FilterColor => "FilterColor",
            Slot::SceneColor => "SceneColor",
            Slot::SceneColorRaw => "SceneColorRaw",
            Slot::SceneDepthZ => "SceneDepthZ",
            Slot::SmallDepthZ => "SmallDepthZ",
            Slot::ReflectionSmallDepthZ => "ReflectionSmallDepthZ",
            Slot::ShadowDepthZ => "ShadowDepthZ",
            Slot::DominantShadowDepthZ => "DominantShadowDepthZ",
            Slot::TranslucencyShadowDepthZ => "TranslucencyShadowDepthZ",
            Slot::PreshadowCacheDepthZ => "PreshadowCacheDepthZ",
            Slot::ShadowDepthColor => "ShadowDepthColor",
            Slot::DominantShadowDepthColor => "DominantShadowDepthColor",
            Slot::TranslucencyShadowDepthColor => "TranslucencyShadowDepthColor",
            Slot::PreshadowCacheDepthColor => "PreshadowCacheDepthColor",
            Slot::LightAttenuation0 => "LightAttenuation0",
            Slot::LightAttenuation1 => "LightAttenuation1",
            Slot::TranslucencyBuffer => "TranslucencyBuffer",
            Slot::HalfResPostProcess => "HalfResPostProcess",
            Slot::TranslucencyDominantLightAttenuation => "TranslucencyDominantLightAttenuation",
            Slot::AoInput => "AOInput",
            Slot::AoOutput => "AOOutput",
            Slot::AoHistory => "AOHistory",
            Slot::VelocityBuffer => "VelocityBuffer",
            Slot::QuarterSizeSceneColor => "QuarterSizeSceneColor",
            Slot::FogFrontfacesIntegralAccumulation => "FogFrontfacesIntegralAccumulation",
            Slot::FogBackfacesIntegralAccumulation => "FogBackfacesIntegralAccumulation",
            Slot::HitProxy => "HitProxy",
            Slot::FogBuffer => "FogBuffer",
            Slot::FilterColor2 => "FilterColor2",
            Slot::DofBlurBuffer => "DoFBlurBuffer",
            Slot::LutBlend => "LUTBlend",
            Slot::FilterColor3 => "FilterColor3",
            Slot::SubsurfaceInscattering => "SubsurfaceInscattering",
            Slot::SubsurfaceScatteringAttenuation => "SubsurfaceScatteringAttenuation",
            Slot::WorldNormalGBuffer => "WorldNormalGBuffer",
            Slot::WorldReflectionNormalGBuffer => "WorldReflectionNormalGBuffer",
            Slot::SpecularGBuffer => "SpecularGBuffer",
            Slot::DiffuseGBuffer => "DiffuseGBuffer",
            Slot::WhiteDummy => "WhiteDummy",
            Slot::BokehDof => "BokehDOF",
            Slot::CubeShadowDepthZ0 => "CubeShadowDepthZ0",
            Slot::CubeShadowDepthZ1 => "CubeShadowDepthZ1",
            Slot::CubeShadowDepthZ2 => "CubeShadowDepthZ2",
            Slot::CubeShadowDepthZ3 => "CubeShadowDepthZ3",
            Slot::CubeShadowDepthZ4 => "CubeShadowDepthZ4",
            Slot::SeparateTranslucency => "SeparateTranslucency",
            Slot::SeparateTranslucencyDepth => "SeparateTranslucencyDepth",
        }
    }

    pub fn desc(self) -> &'static SlotDesc {
        &SLOT_TABLE[self.index()]
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sizing family a slot belongs to. All slots of a category share one extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtentCategory {
    Primary,
    Filter,
    /// Half resolution; also used by the small depth buffers it must match.
    Translucency,
    FogAccumulation,
    AmbientOcclusion,
    Velocity,
    ShadowObject,
    ShadowWholeScene,
    ShadowTranslucency,
    ShadowPreshadowCache,
    /// Square cube face for the given resolution step.
    CubeShadow(u8),
    /// Unwrapped 16x16x16 color grading volume.
    LutBlend,
    /// Single texel.
    Unit,
}

/// How a slot picks its pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRule {
    Fixed(PixelFormat),
    /// The configured scene color format.
    SceneColor,
    /// Shadow depth format for the active shadow filtering path.
    ShadowDepth,
    GBufferNormal,
    GBufferColor,
}

/// Which resources a slot owns once allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    TextureAndSurface,
    SurfaceOnly,
    TextureOnly,
    /// A depth surface, plus a resolve texture only where the format can be
    /// sampled on this hardware.
    DepthTexture,
    /// Cube texture with a targetable surface.
    Cube,
}

/// Platform and feature state the availability predicates look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotContext {
    pub caps: PlatformCapabilities,
    pub features: FeatureSettings,
    pub scene_color_format: PixelFormat,
}

impl SlotContext {
    /// Enough simultaneous targets for scene color plus four G-buffers.
    pub fn deferred(&self) -> bool {
        self.caps.max_render_targets >= 5
    }

    pub fn subsurface_scattering(&self) -> bool {
        self.features.allow_subsurface_scattering && self.caps.max_render_targets >= 7
    }

    pub fn hardware_pcf(&self) -> bool {
        self.caps.hardware_pcf && self.features.allow_hardware_shadow_filtering
    }

    /// Shadow passes bind a same-sized color target next to the depth target.
    pub fn shadow_needs_color_target(&self) -> bool {
        self.hardware_pcf() || self.caps.fetch4
    }

    pub fn shadow_depth_format(&self) -> PixelFormat {
        if self.hardware_pcf() {
            PixelFormat::FilteredShadowDepth
        } else if self.caps.fetch4 {
            PixelFormat::Depth24Unorm
        } else {
            PixelFormat::ShadowDepth
        }
    }

    pub fn format(&self, rule: FormatRule) -> PixelFormat {
        match rule {
            FormatRule::Fixed(format) => format,
            FormatRule::SceneColor => self.scene_color_format,
            FormatRule::ShadowDepth => self.shadow_depth_format(),
            FormatRule::GBufferNormal if self.features.high_precision_gbuffers => {
                PixelFormat::Rgba16Float
            }
            FormatRule::GBufferNormal => PixelFormat::Rgb10A2Unorm,
            FormatRule::GBufferColor if self.features.high_precision_gbuffers => {
                PixelFormat::Rgba16Float
            }
            FormatRule::GBufferColor => PixelFormat::Rgba8Unorm,
        }
    }

    pub fn is_available(&self, slot: Slot) -> bool {
        (slot.desc().available)(self)
    }
}

/// Static description of one slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotDesc {
    pub slot: Slot,
    pub category: ExtentCategory,
    pub format: FormatRule,
    pub multisample: bool,
    pub storage: Storage,
    /// Slot whose handles this one shares when it has no bank of its own.
    pub reuses: Option<Slot>,
    pub available: fn(&SlotContext) -> bool,
}

impl SlotDesc {
    const fn new(
        slot: Slot,
        category: ExtentCategory,
        format: FormatRule,
        multisample: bool,
        storage: Storage,
        available: fn(&SlotContext) -> bool,
    ) -> Self {
        Self {
            slot,
            category,
            format,
            multisample,
            storage,
            reuses: None,
            available,
        }
    }

    const fn reusing(mut self, owner: Slot) -> Self {
        self.reuses = Some(owner);
        self
    }

    /// Whether a sampleable texture is created next to the surface.
    pub fn has_texture(&self, ctx: &SlotContext) -> bool {
        match self.storage {
            Storage::TextureAndSurface | Storage::TextureOnly => true,
            Storage::SurfaceOnly | Storage::Cube => false,
            Storage::DepthTexture => {
                ctx.caps.depth_textures || ctx.format(self.format).is_sampleable_shadow_depth()
            }
        }
    }

    pub fn has_surface(&self) -> bool {
        !matches!(self.storage, Storage::TextureOnly)
    }
}

fn always(_: &SlotContext) -> bool {
    true
}

fn deferred(ctx: &SlotContext) -> bool {
    ctx.deferred()
}

fn subsurface(ctx: &SlotContext) -> bool {
    ctx.subsurface_scattering()
}

fn separate_translucency(ctx: &SlotContext) -> bool {
    ctx.features.allow_separate_translucency && ctx.deferred()
}

fn ambient_occlusion(ctx: &SlotContext) -> bool {
    ctx.features.allow_ambient_occlusion
}

fn motion_blur(ctx: &SlotContext) -> bool {
    ctx.features.allow_motion_blur
}

fn dynamic_shadows(ctx: &SlotContext) -> bool {
    ctx.features.allow_dynamic_shadows
}

fn shadow_color(ctx: &SlotContext) -> bool {
    ctx.features.allow_dynamic_shadows && !ctx.caps.depth_textures
}

fn cube_shadows(ctx: &SlotContext) -> bool {
    ctx.features.allow_dynamic_shadows && ctx.caps.cube_render_targets
}

fn one_pass_dominant_light(ctx: &SlotContext) -> bool {
    ctx.features.one_pass_dominant_light
}

fn shared_memory(ctx: &SlotContext) -> bool {
    ctx.caps.shared_memory
}

use ExtentCategory as C;
use FormatRule::{Fixed, GBufferColor, GBufferNormal, SceneColor as SceneColorFormat};
use PixelFormat as F;
use Storage::{Cube, DepthTexture, SurfaceOnly, TextureAndSurface, TextureOnly};

const fn cube(slot: Slot, step: u8) -> SlotDesc {
    SlotDesc::new(
        slot,
        C::CubeShadow(step),
        FormatRule::ShadowDepth,
        false,
        Cube,
        cube_shadows,
    )
}

/// Slot descriptions in enumeration order.
pub static SLOT_TABLE: [SlotDesc; SLOT_COUNT] = [
    SlotDesc::new(Slot::FilterColor, C::Filter, Fixed(F::Rgba16Unorm), true, TextureAndSurface, always),
    SlotDesc::new(Slot::SceneColor, C::Primary, SceneColorFormat, true, TextureAndSurface, always),
    SlotDesc::new(Slot::SceneColorRaw, C::Primary, Fixed(F::Rgb10A2Unorm), true, TextureAndSurface, always)
        .reusing(Slot::SceneColor),
    SlotDesc::new(Slot::SceneDepthZ, C::Primary, Fixed(F::Depth24PlusStencil8), true, DepthTexture, always),
    SlotDesc::new(Slot::SmallDepthZ, C::Translucency, Fixed(F::Depth24PlusStencil8), false, SurfaceOnly, always),
    SlotDesc::new(Slot::ReflectionSmallDepthZ, C::Translucency, Fixed(F::Depth24PlusStencil8), false, SurfaceOnly, deferred),
    SlotDesc::new(Slot::ShadowDepthZ, C::ShadowObject, FormatRule::ShadowDepth, false, DepthTexture, dynamic_shadows),
    SlotDesc::new(Slot::DominantShadowDepthZ, C::ShadowWholeScene, FormatRule::ShadowDepth, false, DepthTexture, dynamic_shadows),
    SlotDesc::new(Slot::TranslucencyShadowDepthZ, C::ShadowTranslucency, FormatRule::ShadowDepth, false, DepthTexture, dynamic_shadows),
    SlotDesc::new(Slot::PreshadowCacheDepthZ, C::ShadowPreshadowCache, FormatRule::ShadowDepth, false, DepthTexture, dynamic_shadows),
    SlotDesc::new(Slot::ShadowDepthColor, C::ShadowObject, Fixed(F::R32Float), false, TextureAndSurface, shadow_color),
    SlotDesc::new(Slot::DominantShadowDepthColor, C::ShadowWholeScene, Fixed(F::R32Float), false, TextureAndSurface, shadow_color),
    SlotDesc::new(Slot::TranslucencyShadowDepthColor, C::ShadowTranslucency, Fixed(F::R32Float), false, TextureAndSurface, shadow_color),
    SlotDesc::new(Slot::PreshadowCacheDepthColor, C::ShadowPreshadowCache, Fixed(F::R32Float), false, TextureAndSurface, shadow_color),
    SlotDesc::new(Slot::LightAttenuation0, C::Primary, Fixed(F::Rgba8Unorm), true, TextureAndSurface, always),
    SlotDesc::new(Slot::LightAttenuation1, C::Primary, Fixed(F::Rgba8Unorm), true, TextureAndSurface, one_pass_dominant_light),
    SlotDesc::new(Slot::TranslucencyBuffer, C::Translucency, Fixed(F::Rgba16Float), false, TextureAndSurface, always),
    SlotDesc::new(Slot::HalfResPostProcess, C::Translucency, Fixed(F::Rgba16Float), false, TextureAndSurface, always),
    SlotDesc::new(Slot::TranslucencyDominantLightAttenuation, C::Primary, Fixed(F::Rgba8Unorm), false, TextureOnly, always),
    SlotDesc::new(Slot::AoInput, C::AmbientOcclusion, Fixed(F::Rg16Float), false, TextureAndSurface, ambient_occlusion),
    SlotDesc::new(Slot::AoOutput, C::AmbientOcclusion, Fixed(F::Rg16Float), false, TextureAndSurface, ambient_occlusion)
        .reusing(Slot::AoInput),
    SlotDesc::new(Slot::AoHistory, C::AmbientOcclusion, Fixed(F::Rg16Float), false, TextureAndSurface, ambient_occlusion),
    SlotDesc::new(Slot::VelocityBuffer, C::Velocity, Fixed(F::Rgba8Unorm), true, TextureAndSurface, motion_blur),
    SlotDesc::new(Slot::QuarterSizeSceneColor, C::Translucency, Fixed(F::Rgb10A2Unorm), false, TextureOnly, shared_memory),
    SlotDesc::new(Slot::FogFrontfacesIntegralAccumulation, C::FogAccumulation, SceneColorFormat, false, TextureAndSurface, always),
    SlotDesc::new(Slot::FogBackfacesIntegralAccumulation, C::FogAccumulation, SceneColorFormat, false, TextureAndSurface, always),
    SlotDesc::new(Slot::HitProxy, C::Primary, Fixed(F::Rgba8Unorm), true, TextureAndSurface, always)
        .reusing(Slot::LightAttenuation0),
    SlotDesc::new(Slot::FogBuffer, C::Translucency, Fixed(F::Rgba8Unorm), true, TextureAndSurface, shared_memory),
    SlotDesc::new(Slot::FilterColor2, C::Filter, Fixed(F::Rgba16Unorm), true, TextureAndSurface, always),
    SlotDesc::new(Slot::DofBlurBuffer, C::Primary, Fixed(F::R8Unorm), false, TextureAndSurface, shared_memory),
    SlotDesc::new(Slot::LutBlend, C::LutBlend, Fixed(F::Rgba8Unorm), true, TextureAndSurface, always),
    SlotDesc::new(Slot::FilterColor3, C::Filter, Fixed(F::Rgba16Unorm), true, TextureAndSurface, always),
    SlotDesc::new(Slot::SubsurfaceInscattering, C::Primary, Fixed(F::Rg11B10Float), false, TextureAndSurface, subsurface),
    SlotDesc::new(Slot::SubsurfaceScatteringAttenuation, C::Primary, Fixed(F::Rgba8Unorm), false, TextureAndSurface, subsurface),
    SlotDesc::new(Slot::WorldNormalGBuffer, C::Primary, GBufferNormal, false, TextureAndSurface, deferred),
    SlotDesc::new(Slot::WorldReflectionNormalGBuffer, C::Primary, GBufferNormal, false, TextureAndSurface, deferred),
    SlotDesc::new(Slot::SpecularGBuffer, C::Primary, GBufferColor, false, TextureAndSurface, deferred),
    SlotDesc::new(Slot::DiffuseGBuffer, C::Primary, GBufferColor, false, TextureAndSurface, deferred),
    SlotDesc::new(Slot::WhiteDummy, C::Unit, Fixed(F::Rgba8Unorm), false, TextureAndSurface, deferred),
    SlotDesc::new(Slot::BokehDof, C::Primary, Fixed(F::Rgba16Float), false, TextureAndSurface, deferred),
    cube(Slot::CubeShadowDepthZ0, 0),
    cube(Slot::CubeShadowDepthZ1, 1),
    cube(Slot::CubeShadowDepthZ2, 2),
    cube(Slot::CubeShadowDepthZ3, 3),
    cube(Slot::CubeShadowDepthZ4, 4),
    SlotDesc::new(Slot::SeparateTranslucency, C::Primary, Fixed(F::Rgba16Float), false, TextureAndSurface, separate_translucency),
    SlotDesc::new(Slot::SeparateTranslucencyDepth, C::Primary, Fixed(F::R32Float), false, TextureAndSurface, separate_translucency),
];
