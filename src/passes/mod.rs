//! Begin/finish bracketing of render target passes
//!
//! Every pass follows the same protocol:
//!
//! ```text
//!   begin(pass)                         finish(pass, params)
//!   ─────────────────────────────       ───────────────────────────────
//!   1. ensure_allocated(targets)        1. resolve surface -> texture
//!   2. restore resolved contents           (unless params ask for raw)
//!   3. bind color / depth surfaces      2. undo state changed by begin
//!   4. state fixups (write masks, MRT)  3. bracket exit
//!   5. bracket entry
//! ```
//!
//! Per slot the bracket walks `Unbound -> Bound -> Resolved` (or back to
//! `Unbound` for a raw finish). A second begin on a bound slot, or a finish on
//! an unbound one, is a protocol violation: it is logged, asserts in debug
//! builds and is ignored in release builds.
//!
//! [`RenderTargetPool::scope`] wraps a bracket in a guard that finishes on
//! drop. Nested scopes are opened through the outer guard, so the borrow
//! checker enforces LIFO nesting.

mod lighting;
mod post;
mod scene;
mod shadow;

use std::marker::PhantomData;

use log::trace;

use crate::backend::{
    GraphicsBackend, ResolveParams, ResolveRect, SurfaceHandle, TargetUsage, Viewport,
};
use crate::error::{report, PoolError, PoolResult};
use crate::targets::{BindEventKind, RenderTargetPool, Slot, SLOT_COUNT};

/// Bracket state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Unbound,
    Bound,
    Resolved,
}

/// Per-slot bracket state machine
#[derive(Debug, Clone)]
pub struct BracketTracker {
    states: [SlotState; SLOT_COUNT],
}

impl BracketTracker {
    pub fn new() -> Self {
        Self {
            states: [SlotState::Unbound; SLOT_COUNT],
        }
    }

    pub fn state(&self, slot: Slot) -> SlotState {
        self.states[slot.index()]
    }

    pub fn is_bound(&self, slot: Slot) -> bool {
        self.state(slot) == SlotState::Bound
    }

    /// Enter `Bound` for every slot, or for none of them.
    pub fn begin(&mut self, slots: &[Slot], pass: &'static str) -> PoolResult<()> {
        if let Some(&slot) = slots.iter().find(|slot| self.is_bound(**slot)) {
            return Err(PoolError::ReentrantBind { slot, pass });
        }
        for slot in slots {
            self.states[slot.index()] = SlotState::Bound;
        }
        Ok(())
    }

    /// Leave `Bound` for every slot, or for none of them.
    pub fn finish(&mut self, slots: &[Slot], pass: &'static str, resolved: bool) -> PoolResult<()> {
        if let Some(&slot) = slots.iter().find(|slot| !self.is_bound(**slot)) {
            return Err(PoolError::NotBound { slot, pass });
        }
        let next = if resolved {
            SlotState::Resolved
        } else {
            SlotState::Unbound
        };
        for slot in slots {
            self.states[slot.index()] = next;
        }
        Ok(())
    }

    /// Record a resolve that happened outside a bracket.
    pub fn mark_resolved(&mut self, slot: Slot) {
        if self.states[slot.index()] == SlotState::Unbound {
            self.states[slot.index()] = SlotState::Resolved;
        }
    }

    pub fn bound_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        Slot::ALL
            .into_iter()
            .filter(move |slot| self.is_bound(*slot))
    }

    /// Drop the state of a slot whose resources were released.
    pub fn forget(&mut self, slot: Slot) {
        if self.is_bound(slot) {
            log::warn!("Releasing render target {slot} while it is still bound");
        }
        self.states[slot.index()] = SlotState::Unbound;
    }

    pub fn reset(&mut self) {
        if let Some(slot) = self.bound_slots().next() {
            log::warn!("Resetting render target brackets while {slot} is still bound");
        }
        self.states = [SlotState::Unbound; SLOT_COUNT];
    }
}

impl Default for BracketTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// How a pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishParams {
    /// Resolve into the sampleable texture. `false` leaves the surface raw
    /// for an immediately following raw read.
    pub keep_changes: bool,
    pub resolve: ResolveParams,
}

impl FinishParams {
    pub fn raw() -> Self {
        Self {
            keep_changes: false,
            resolve: ResolveParams::default(),
        }
    }

    pub fn rect(rect: ResolveRect) -> Self {
        Self {
            keep_changes: true,
            resolve: ResolveParams::with_rect(rect),
        }
    }
}

impl Default for FinishParams {
    fn default() -> Self {
        Self {
            keep_changes: true,
            resolve: ResolveParams::default(),
        }
    }
}

/// Pixel rectangle of a view inside the principal buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ViewRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.x, self.y, self.width, self.height)
    }

    pub fn downsampled(&self, factor: u32) -> ViewRect {
        let factor = factor.max(1);
        ViewRect::new(
            self.x / factor,
            self.y / factor,
            self.width / factor,
            self.height / factor,
        )
    }
}

/// Which of the three filter buffers a filter pass writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTarget {
    Color,
    Color2,
    Color3,
}

impl FilterTarget {
    pub fn slot(self) -> Slot {
        match self {
            FilterTarget::Color => Slot::FilterColor,
            FilterTarget::Color2 => Slot::FilterColor2,
            FilterTarget::Color3 => Slot::FilterColor3,
        }
    }
}

/// Extra targets bound next to scene color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneColorMode {
    #[default]
    Default,
    /// G-buffer population: G-buffers (and subsurface targets) on MRT 1..
    GBuffer,
    /// Additive lighting: subsurface inscattering on MRT 1.
    Lighting,
}

/// Named pass with its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    BackBuffer { usage: TargetUsage },
    Filter(FilterTarget),
    LutBlend,
    SceneColor { usage: TargetUsage, mode: SceneColorMode },
    SceneColorLdr { usage: TargetUsage },
    SceneColorRaw,
    PrePass,
    PostTranslucencyDepth,
    DofBlurBuffer,
    ShadowDepth { whole_scene: bool },
    PreshadowCacheDepth,
    CubeShadowDepth { resolution: u32 },
    LightAttenuation { use_texture0: bool },
    Translucency {
        view: ViewRect,
        downsampled: bool,
        state_changed: bool,
    },
    SeparateTranslucency { view: ViewRect },
    AoInput { downsized_depth: bool },
    AoOutput { downsized_depth: bool },
    AoHistory { downsized_depth: bool },
    DistortionAccumulation,
    Velocities,
    FogFrontfaces,
    FogBackfaces,
    HitProxies,
    FogBuffer,
}

impl Pass {
    /// Plain scene color bind with no restore and no extra targets.
    pub const SCENE_COLOR: Pass = Pass::SceneColor {
        usage: TargetUsage::DEFAULT,
        mode: SceneColorMode::Default,
    };

    pub fn name(&self) -> &'static str {
        match self {
            Pass::BackBuffer { .. } => "BackBuffer",
            Pass::Filter(_) => "Filter",
            Pass::LutBlend => "LUTBlend",
            Pass::SceneColor { .. } => "SceneColor",
            Pass::SceneColorLdr { .. } => "SceneColorLDR",
            Pass::SceneColorRaw => "SceneColorRaw",
            Pass::PrePass => "PrePass",
            Pass::PostTranslucencyDepth => "PostTranslucencyDepth",
            Pass::DofBlurBuffer => "DoFBlurBuffer",
            Pass::ShadowDepth { .. } => "ShadowDepth",
            Pass::PreshadowCacheDepth => "PreshadowCacheDepth",
            Pass::CubeShadowDepth { .. } => "CubeShadowDepth",
            Pass::LightAttenuation { .. } => "LightAttenuation",
            Pass::Translucency { .. } => "Translucency",
            Pass::SeparateTranslucency { .. } => "SeparateTranslucency",
            Pass::AoInput { .. } => "AOInput",
            Pass::AoOutput { .. } => "AOOutput",
            Pass::AoHistory { .. } => "AOHistory",
            Pass::DistortionAccumulation => "DistortionAccumulation",
            Pass::Velocities => "Velocities",
            Pass::FogFrontfaces => "FogFrontfacesIntegralAccumulation",
            Pass::FogBackfaces => "FogBackfacesIntegralAccumulation",
            Pass::HitProxies => "HitProxies",
            Pass::FogBuffer => "FogBuffer",
        }
    }
}

/// Slots a pass touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassTargets {
    /// Written by the pass and tracked by the bracket.
    pub owned: Vec<Slot>,
    /// Bound alongside (usually as depth) but not written.
    pub attached: Vec<Slot>,
}

impl<B: GraphicsBackend> RenderTargetPool<B> {
    /// Slots `pass` owns and attaches on this platform.
    pub fn pass_targets(&self, pass: &Pass) -> PassTargets {
        let ctx = self.slot_context();
        let scene_depth = vec![Slot::SceneDepthZ];
        let (owned, attached) = match *pass {
            Pass::BackBuffer { .. } => (vec![], vec![]),
            Pass::Filter(target) => (vec![target.slot()], vec![]),
            Pass::LutBlend => (vec![Slot::LutBlend], vec![]),
            Pass::SceneColor { usage, mode } => {
                let mut attached = scene_depth;
                if usage.contains(TargetUsage::RESTORE_RAW) {
                    attached.push(Slot::SceneColorRaw);
                }
                (self.scene_color_targets(mode), attached)
            }
            Pass::SceneColorLdr { .. } => (vec![Slot::LightAttenuation0], scene_depth),
            Pass::SceneColorRaw => (vec![Slot::SceneColorRaw], scene_depth),
            Pass::PrePass => (vec![Slot::SceneDepthZ], vec![Slot::LightAttenuation0]),
            Pass::PostTranslucencyDepth => (vec![Slot::SceneColor], scene_depth),
            Pass::DofBlurBuffer => (vec![Slot::DofBlurBuffer], vec![]),
            Pass::ShadowDepth { whole_scene } => {
                let (depth, color) = shadow::shadow_slots(whole_scene);
                let mut owned = vec![depth];
                if ctx.is_available(color) {
                    owned.push(color);
                }
                (owned, vec![])
            }
            Pass::PreshadowCacheDepth => {
                let mut owned = vec![Slot::PreshadowCacheDepthZ];
                if ctx.is_available(Slot::PreshadowCacheDepthColor) {
                    owned.push(Slot::PreshadowCacheDepthColor);
                }
                (owned, vec![])
            }
            Pass::CubeShadowDepth { resolution } => {
                (vec![self.cube_shadow_slot(resolution)], vec![])
            }
            Pass::LightAttenuation { use_texture0 } => {
                (vec![self.light_attenuation_slot(use_texture0)], scene_depth)
            }
            Pass::Translucency { downsampled, .. } => {
                if downsampled {
                    (vec![Slot::TranslucencyBuffer], vec![Slot::SmallDepthZ])
                } else {
                    (vec![Slot::SceneColor], scene_depth)
                }
            }
            Pass::SeparateTranslucency { .. } => (
                vec![Slot::SeparateTranslucency, Slot::SeparateTranslucencyDepth],
                scene_depth,
            ),
            Pass::AoInput { downsized_depth } => {
                (vec![Slot::AoInput], self.ao_depth_targets(downsized_depth))
            }
            Pass::AoOutput { downsized_depth } => {
                (vec![Slot::AoOutput], self.ao_depth_targets(downsized_depth))
            }
            Pass::AoHistory { downsized_depth } => {
                (vec![Slot::AoHistory], self.ao_depth_targets(downsized_depth))
            }
            Pass::DistortionAccumulation => (vec![Slot::LightAttenuation0], scene_depth),
            Pass::Velocities => (vec![Slot::VelocityBuffer], vec![self.velocity_depth_slot()]),
            Pass::FogFrontfaces => (vec![Slot::FogFrontfacesIntegralAccumulation], vec![]),
            Pass::FogBackfaces => (vec![Slot::FogBackfacesIntegralAccumulation], vec![]),
            Pass::HitProxies => (vec![Slot::HitProxy], scene_depth),
            Pass::FogBuffer => (vec![Slot::FogBuffer], vec![]),
        };
        PassTargets { owned, attached }
    }

    /// Start a pass. Protocol violations are reported and the pass is skipped.
    pub fn begin(&mut self, pass: Pass) {
        if let Err(err) = self.try_begin(&pass) {
            report(err);
        }
    }

    /// Finish a pass started with [`begin`](Self::begin).
    pub fn finish(&mut self, pass: Pass, params: FinishParams) {
        if let Err(err) = self.try_finish(&pass, &params) {
            report(err);
        }
    }

    /// Open a bracket that finishes with default params when dropped.
    pub fn scope(&mut self, pass: Pass) -> PassScope<'_, B> {
        self.begin(pass);
        PassScope {
            pool: self,
            pass,
            params: FinishParams::default(),
            _not_send: PhantomData,
        }
    }

    pub fn slot_state(&self, slot: Slot) -> SlotState {
        self.brackets.state(slot)
    }

    /// Begin a pass, returning the first error instead of reporting it.
    pub fn try_begin(&mut self, pass: &Pass) -> PoolResult<()> {
        let targets = self.pass_targets(pass);
        if !targets.owned.is_empty() && !self.sizes.is_configured() {
            return Err(PoolError::NotConfigured);
        }
        if let Some(&slot) = targets.owned.iter().find(|slot| !self.is_available(**slot)) {
            return Err(PoolError::UnsupportedSlot(slot));
        }
        for &slot in targets.owned.iter().chain(&targets.attached) {
            match self.ensure_allocated(slot) {
                Ok(()) => {}
                Err(err @ (PoolError::Backend(_) | PoolError::UnsupportedSlot(_))) => report(err),
                Err(err) => return Err(err),
            }
        }

        self.brackets.begin(&targets.owned, pass.name())?;
        if let Some(timeline) = self.timeline.as_mut() {
            for &slot in &targets.owned {
                timeline.record(slot, BindEventKind::Bind, pass.name());
            }
        }
        trace!("Begin {}", pass.name());
        self.bind_pass(pass);
        Ok(())
    }

    /// Finish a pass, returning the first error instead of reporting it.
    pub fn try_finish(&mut self, pass: &Pass, params: &FinishParams) -> PoolResult<()> {
        let targets = self.pass_targets(pass);
        if let Some(&slot) = targets.owned.iter().find(|slot| !self.is_available(**slot)) {
            return Err(PoolError::UnsupportedSlot(slot));
        }
        if let Some(&slot) = targets.owned.iter().find(|slot| !self.brackets.is_bound(**slot)) {
            return Err(PoolError::NotBound {
                slot,
                pass: pass.name(),
            });
        }

        let resolved = self.unbind_pass(pass, params);
        self.brackets.finish(&targets.owned, pass.name(), resolved)?;
        if let Some(timeline) = self.timeline.as_mut() {
            for &slot in &targets.owned {
                timeline.record(slot, BindEventKind::Unbind, pass.name());
            }
        }
        trace!("Finish {} (resolved: {resolved})", pass.name());
        Ok(())
    }

    fn bind_pass(&mut self, pass: &Pass) {
        match *pass {
            Pass::BackBuffer { usage } => self.bind_back_buffer(usage),
            Pass::Filter(target) => self.bind_filter(target),
            Pass::LutBlend => self.bind_lut_blend(),
            Pass::SceneColor { usage, mode } => self.bind_scene_color(usage, mode),
            Pass::SceneColorLdr { usage } => self.bind_scene_color_ldr(usage),
            Pass::SceneColorRaw => self.bind_scene_color_raw(),
            Pass::PrePass => self.bind_pre_pass(),
            Pass::PostTranslucencyDepth => self.bind_post_translucency_depth(),
            Pass::DofBlurBuffer => self.bind_dof_blur_buffer(),
            Pass::ShadowDepth { whole_scene } => {
                let (depth, color) = shadow::shadow_slots(whole_scene);
                self.bind_shadow_depth(depth, color);
            }
            Pass::PreshadowCacheDepth => {
                self.bind_shadow_depth(Slot::PreshadowCacheDepthZ, Slot::PreshadowCacheDepthColor)
            }
            Pass::CubeShadowDepth { resolution } => self.bind_cube_shadow_depth(resolution),
            Pass::LightAttenuation { use_texture0 } => self.bind_light_attenuation(use_texture0),
            Pass::Translucency {
                view,
                downsampled,
                state_changed,
            } => self.bind_translucency(view, downsampled, state_changed),
            Pass::SeparateTranslucency { view } => self.bind_separate_translucency(view),
            Pass::AoInput { downsized_depth } => self.bind_ao(Slot::AoInput, downsized_depth),
            Pass::AoOutput { downsized_depth } => self.bind_ao(Slot::AoOutput, downsized_depth),
            Pass::AoHistory { downsized_depth } => self.bind_ao(Slot::AoHistory, downsized_depth),
            Pass::DistortionAccumulation => self.bind_distortion_accumulation(),
            Pass::Velocities => self.bind_velocities(),
            Pass::FogFrontfaces => self.bind_fog_integral(Slot::FogFrontfacesIntegralAccumulation),
            Pass::FogBackfaces => self.bind_fog_integral(Slot::FogBackfacesIntegralAccumulation),
            Pass::HitProxies => self.bind_hit_proxies(),
            Pass::FogBuffer => self.bind_fog_buffer(),
        }
    }

    /// Returns whether the owned slots were resolved.
    fn unbind_pass(&mut self, pass: &Pass, params: &FinishParams) -> bool {
        match *pass {
            Pass::BackBuffer { .. } => false,
            Pass::Filter(target) => self.finish_simple(target.slot(), false, params),
            Pass::LutBlend => self.finish_simple(Slot::LutBlend, false, params),
            Pass::SceneColor { mode, .. } => self.finish_scene_color(mode, params),
            Pass::SceneColorLdr { .. } => {
                self.finish_simple(Slot::LightAttenuation0, true, params)
            }
            Pass::SceneColorRaw => self.finish_scene_color_raw(params),
            Pass::PrePass => self.finish_pre_pass(),
            Pass::PostTranslucencyDepth => self.finish_post_translucency_depth(params),
            Pass::DofBlurBuffer => self.finish_dof_blur_buffer(params),
            Pass::ShadowDepth { whole_scene } => {
                let (depth, color) = shadow::shadow_slots(whole_scene);
                self.finish_shadow_depth(depth, color, params)
            }
            Pass::PreshadowCacheDepth => self.finish_shadow_depth(
                Slot::PreshadowCacheDepthZ,
                Slot::PreshadowCacheDepthColor,
                params,
            ),
            Pass::CubeShadowDepth { resolution } => {
                self.finish_cube_shadow_depth(resolution, params)
            }
            Pass::LightAttenuation { use_texture0 } => {
                let slot = self.light_attenuation_slot(use_texture0);
                self.finish_simple(slot, false, params)
            }
            Pass::Translucency { downsampled, .. } => {
                self.finish_translucency(downsampled, params)
            }
            Pass::SeparateTranslucency { .. } => self.finish_separate_translucency(params),
            Pass::AoInput { .. } => self.finish_simple(Slot::AoInput, false, params),
            Pass::AoOutput { .. } => self.finish_simple(Slot::AoOutput, false, params),
            Pass::AoHistory { .. } => self.finish_ao_history(params),
            Pass::DistortionAccumulation => {
                self.finish_simple(Slot::LightAttenuation0, false, params)
            }
            Pass::Velocities => self.finish_simple(Slot::VelocityBuffer, false, params),
            Pass::FogFrontfaces => {
                self.finish_simple(Slot::FogFrontfacesIntegralAccumulation, false, params)
            }
            Pass::FogBackfaces => {
                self.finish_simple(Slot::FogBackfacesIntegralAccumulation, false, params)
            }
            Pass::HitProxies => self.finish_simple(Slot::HitProxy, false, params),
            Pass::FogBuffer => self.finish_fog_buffer(params),
        }
    }

    // === Shared helpers ===

    /// Resolve a single slot when changes are kept.
    fn finish_simple(&mut self, slot: Slot, generate_mips: bool, params: &FinishParams) -> bool {
        if params.keep_changes {
            self.resolve_slot(slot, generate_mips, &params.resolve);
        }
        params.keep_changes
    }

    pub(crate) fn resolve_slot(&mut self, slot: Slot, generate_mips: bool, params: &ResolveParams) {
        let surface = self.registry.surface(slot);
        if surface.is_null() {
            trace!("Skipping resolve of {slot}, no surface");
            return;
        }
        self.backend
            .copy_to_resolve_target(surface, generate_mips, params);
    }

    /// `alt` when a stereo driver needs the bind as a duplication cue,
    /// otherwise nothing.
    pub(crate) fn stereo_null_target(&self, alt: SurfaceHandle) -> SurfaceHandle {
        if self.backend.is_stereo_enabled() {
            alt
        } else {
            SurfaceHandle::NULL
        }
    }
}

/// Guard that finishes its pass when dropped
///
/// Holds the pool mutably, so inner brackets can only be opened through
/// [`PassScope::pool`] and must close first. Not `Send`.
pub struct PassScope<'a, B: GraphicsBackend> {
    pool: &'a mut RenderTargetPool<B>,
    pass: Pass,
    params: FinishParams,
    _not_send: PhantomData<*const ()>,
}

impl<'a, B: GraphicsBackend> PassScope<'a, B> {
    pub fn pass(&self) -> &Pass {
        &self.pass
    }

    /// The pool, for draws and nested scopes.
    pub fn pool(&mut self) -> &mut RenderTargetPool<B> {
        self.pool
    }

    /// Params used when the scope closes.
    pub fn set_finish_params(&mut self, params: FinishParams) {
        self.params = params;
    }
}

impl<B: GraphicsBackend> Drop for PassScope<'_, B> {
    fn drop(&mut self) {
        self.pool.finish(self.pass, self.params);
    }
}
