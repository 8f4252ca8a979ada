//! Scene color, depth pre-pass and standalone resolves

use glam::Vec4;
use log::debug;

use crate::backend::{
    ClearValues, ColorWrites, GraphicsBackend, ResolveParams, SurfaceHandle, TargetUsage,
};
use crate::error::{report, PoolError};
use crate::targets::{RenderTargetPool, Slot};

use super::{FinishParams, Pass, SceneColorMode};

/// First MRT index after scene color.
const FIRST_MRT: u32 = 1;

impl<B: GraphicsBackend> RenderTargetPool<B> {
    /// Extra color targets bound with scene color, by MRT index.
    fn scene_color_mrts(&self, mode: SceneColorMode) -> Vec<(u32, Slot)> {
        let ctx = self.slot_context();
        match mode {
            SceneColorMode::Default => Vec::new(),
            SceneColorMode::GBuffer if ctx.deferred() => {
                let mut mrts: Vec<(u32, Slot)> = (FIRST_MRT..)
                    .zip(Slot::GBUFFERS)
                    .collect();
                if ctx.subsurface_scattering() {
                    mrts.push((5, Slot::SubsurfaceInscattering));
                    mrts.push((6, Slot::SubsurfaceScatteringAttenuation));
                }
                mrts
            }
            SceneColorMode::Lighting if ctx.subsurface_scattering() => {
                vec![(FIRST_MRT, Slot::SubsurfaceInscattering)]
            }
            _ => Vec::new(),
        }
    }

    pub(super) fn scene_color_targets(&self, mode: SceneColorMode) -> Vec<Slot> {
        std::iter::once(Slot::SceneColor)
            .chain(self.scene_color_mrts(mode).into_iter().map(|(_, slot)| slot))
            .collect()
    }

    pub(super) fn bind_back_buffer(&mut self, usage: TargetUsage) {
        let back_buffer = self.back_buffer;
        if back_buffer.is_null() {
            debug!("Binding back buffer before set_back_buffer");
        }
        self.backend.update_render_target_usage(back_buffer, usage);
        self.backend
            .set_render_target(back_buffer, SurfaceHandle::NULL);
    }

    pub(super) fn bind_scene_color(&mut self, usage: TargetUsage, mode: SceneColorMode) {
        let scene_color = self.registry.surface(Slot::SceneColor);
        let scene_depth = self.registry.surface(Slot::SceneDepthZ);

        if usage.contains(TargetUsage::RESTORE_RAW) {
            let raw = self.registry.surface(Slot::SceneColorRaw);
            self.backend.copy_from_resolve_target(raw);
        } else if usage.contains(TargetUsage::RESTORE_SURFACE) {
            self.backend.copy_from_resolve_target(scene_color);
        }
        self.backend.update_render_target_usage(scene_color, usage);
        self.backend.set_render_target(scene_color, scene_depth);

        let mrts = self.scene_color_mrts(mode);
        if mode != SceneColorMode::Default && mrts.is_empty() {
            debug!("No extra targets for {mode:?} on this platform");
        }
        for (index, slot) in mrts {
            let surface = self.registry.surface(slot);
            self.backend.set_mrt_render_target(index, surface);
            self.backend.set_mrt_color_write_enable(index, true);
        }
    }

    pub(super) fn finish_scene_color(&mut self, mode: SceneColorMode, params: &FinishParams) -> bool {
        if params.keep_changes {
            self.resolve_slot(Slot::SceneColor, true, &params.resolve);
            self.scene_color_is_raw = false;
        }
        for (index, _) in self.scene_color_mrts(mode) {
            self.backend
                .set_mrt_render_target(index, SurfaceHandle::NULL);
            self.backend.set_mrt_color_write_enable(index, false);
        }
        params.keep_changes
    }

    /// Low dynamic range scene color lives in the light attenuation buffer.
    pub(super) fn bind_scene_color_ldr(&mut self, usage: TargetUsage) {
        let surface = self.registry.surface(Slot::LightAttenuation0);
        let scene_depth = self.registry.surface(Slot::SceneDepthZ);
        self.backend.update_render_target_usage(surface, usage);
        self.backend.set_render_target(surface, scene_depth);
    }

    pub(super) fn bind_scene_color_raw(&mut self) {
        let raw = self.registry.surface(Slot::SceneColorRaw);
        let scene_depth = self.registry.surface(Slot::SceneDepthZ);
        self.backend.set_render_target(raw, scene_depth);
    }

    pub(super) fn finish_scene_color_raw(&mut self, params: &FinishParams) -> bool {
        if params.keep_changes {
            self.resolve_slot(Slot::SceneColorRaw, true, &params.resolve);
            self.scene_color_is_raw = true;
        }
        params.keep_changes
    }

    /// Depth-only pass. Binds light attenuation as the color target so the
    /// target dimensions match, with color writes off.
    pub(super) fn bind_pre_pass(&mut self) {
        let color = self.registry.surface(Slot::LightAttenuation0);
        let scene_depth = self.registry.surface(Slot::SceneDepthZ);
        self.backend.set_render_target(color, scene_depth);
        self.backend.set_color_write_enable(false);
    }

    pub(super) fn finish_pre_pass(&mut self) -> bool {
        self.backend.set_color_write_enable(true);
        false
    }

    pub(super) fn bind_post_translucency_depth(&mut self) {
        self.bind_scene_color(TargetUsage::DEFAULT, SceneColorMode::Default);
        if self.caps.depth_textures {
            self.backend.set_color_write_enable(false);
        } else {
            // depth goes to scene color alpha
            self.backend.set_color_write_mask(ColorWrites::ALPHA);
        }
    }

    /// Scene color is never resolved here; only scene depth when it is a
    /// texture.
    pub(super) fn finish_post_translucency_depth(&mut self, params: &FinishParams) -> bool {
        if self.caps.depth_textures {
            self.backend.set_color_write_enable(true);
            if params.keep_changes {
                self.resolve_slot(Slot::SceneDepthZ, true, &params.resolve);
            }
        } else {
            self.backend.set_color_write_mask(ColorWrites::ALL);
        }
        false
    }

    pub(super) fn bind_hit_proxies(&mut self) {
        let surface = self.registry.surface(Slot::HitProxy);
        let scene_depth = self.registry.surface(Slot::SceneDepthZ);
        self.backend.set_render_target(surface, scene_depth);
    }

    // === Standalone operations ===

    /// Resolve scene color outside a bracket, for a pass that finished raw.
    pub fn resolve_scene_color(&mut self, params: ResolveParams) {
        self.resolve_slot(Slot::SceneColor, true, &params);
        self.brackets.mark_resolved(Slot::SceneColor);
        self.scene_color_is_raw = false;
    }

    pub fn resolve_gbuffer_surfaces(&mut self, params: ResolveParams) {
        if !self.slot_context().deferred() {
            report(PoolError::UnsupportedSlot(Slot::WorldNormalGBuffer));
            return;
        }
        for slot in Slot::GBUFFERS {
            self.resolve_slot(slot, true, &params);
            self.brackets.mark_resolved(slot);
        }
    }

    pub fn resolve_subsurface_scattering_surfaces(&mut self, params: ResolveParams) {
        if !self.slot_context().subsurface_scattering() {
            report(PoolError::UnsupportedSlot(Slot::SubsurfaceInscattering));
            return;
        }
        for slot in [
            Slot::SubsurfaceInscattering,
            Slot::SubsurfaceScatteringAttenuation,
        ] {
            self.resolve_slot(slot, false, &params);
            self.brackets.mark_resolved(slot);
        }
    }

    /// Resolve raw scene color and flag scene color as holding raw data.
    pub fn save_scene_color_raw(&mut self, params: ResolveParams) {
        self.resolve_slot(Slot::SceneColorRaw, true, &params);
        self.brackets.mark_resolved(Slot::SceneColorRaw);
        self.scene_color_is_raw = true;
    }

    /// Copy the saved raw contents back and bind scene color. Pair with
    /// `finish(Pass::SceneColor { usage: TargetUsage::RESTORE_RAW, .. })`.
    pub fn restore_scene_color_raw(&mut self) {
        self.begin(Pass::SceneColor {
            usage: TargetUsage::RESTORE_RAW,
            mode: SceneColorMode::Default,
        });
    }

    /// Make scene depth sampleable. No-op without depth textures.
    pub fn resolve_scene_depth_texture(&mut self) {
        if !self.caps.depth_textures {
            return;
        }
        self.resolve_slot(Slot::SceneDepthZ, true, &ResolveParams::default());
        self.brackets.mark_resolved(Slot::SceneDepthZ);
    }

    /// Clear the G-buffers (and subsurface and separate translucency targets
    /// when present) to their neutral values.
    pub fn clear_gbuffer_targets(&mut self) {
        let ctx = self.slot_context();
        if !ctx.deferred() {
            report(PoolError::UnsupportedSlot(Slot::WorldNormalGBuffer));
            return;
        }

        let mut clears: Vec<(Slot, SurfaceHandle, Vec4)> = Vec::new();
        let normal = Vec4::new(0.0, 0.0, 1.0, 0.0);
        for slot in Slot::GBUFFERS {
            let value = match slot {
                Slot::WorldNormalGBuffer | Slot::WorldReflectionNormalGBuffer => normal,
                _ => Vec4::ZERO,
            };
            clears.push((slot, SurfaceHandle::NULL, value));
        }
        if ctx.subsurface_scattering() {
            clears.push((Slot::SubsurfaceInscattering, SurfaceHandle::NULL, Vec4::ZERO));
            clears.push((
                Slot::SubsurfaceScatteringAttenuation,
                SurfaceHandle::NULL,
                Vec4::ZERO,
            ));
        }
        if ctx.is_available(Slot::SeparateTranslucency) {
            let scene_depth = self.registry.surface(Slot::SceneDepthZ);
            clears.push((Slot::SeparateTranslucency, scene_depth, Vec4::W));
            clears.push((Slot::SeparateTranslucencyDepth, SurfaceHandle::NULL, Vec4::ZERO));
        }

        if let Some(slot) = clears
            .iter()
            .map(|(slot, _, _)| *slot)
            .find(|slot| self.brackets.is_bound(*slot))
        {
            report(PoolError::ReentrantBind {
                slot,
                pass: "ClearGBufferTargets",
            });
            return;
        }

        for (slot, depth, value) in clears {
            if let Err(err) = self.ensure_allocated(slot) {
                report(err);
                continue;
            }
            let surface = self.registry.surface(slot);
            self.backend.set_render_target(surface, depth);
            self.backend.clear(ClearValues::color(value));
        }
    }
}
