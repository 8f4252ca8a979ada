//! Light attenuation, translucency, ambient occlusion and distortion passes

use glam::Vec4;

use crate::backend::{ClearValues, GraphicsBackend, SurfaceHandle, TargetUsage};
use crate::targets::size::SMALL_COLOR_DEPTH_DOWNSAMPLE_FACTOR;
use crate::targets::{RenderTargetPool, Slot};

use super::{FinishParams, SceneColorMode, ViewRect};

const SEPARATE_TRANSLUCENCY_DEPTH_MRT: u32 = 1;

impl<B: GraphicsBackend> RenderTargetPool<B> {
    /// Second light attenuation buffer when one-pass dominant lighting has it.
    pub(super) fn light_attenuation_slot(&self, use_texture0: bool) -> Slot {
        if use_texture0 || !self.is_available(Slot::LightAttenuation1) {
            Slot::LightAttenuation0
        } else {
            Slot::LightAttenuation1
        }
    }

    /// Scene depth is only attached at full resolution when a stereo driver
    /// needs the depth bind.
    pub(super) fn ao_depth_targets(&self, downsized_depth: bool) -> Vec<Slot> {
        if downsized_depth {
            vec![Slot::SmallDepthZ]
        } else if self.backend.is_stereo_enabled() {
            vec![Slot::SceneDepthZ]
        } else {
            Vec::new()
        }
    }

    pub(super) fn bind_light_attenuation(&mut self, use_texture0: bool) {
        let slot = self.light_attenuation_slot(use_texture0);
        let surface = self.registry.surface(slot);
        let scene_depth = self.registry.surface(Slot::SceneDepthZ);
        self.backend.set_render_target(surface, scene_depth);
    }

    pub(super) fn bind_translucency(&mut self, view: ViewRect, downsampled: bool, state_changed: bool) {
        if downsampled {
            let surface = self.registry.surface(Slot::TranslucencyBuffer);
            let small_depth = self.registry.surface(Slot::SmallDepthZ);
            self.backend.set_render_target(surface, small_depth);
            self.backend.set_viewport(
                view.downsampled(SMALL_COLOR_DEPTH_DOWNSAMPLE_FACTOR)
                    .viewport(),
            );
            if state_changed {
                self.backend.clear(ClearValues::color(Vec4::W));
            }
        } else {
            self.bind_scene_color(TargetUsage::DEFAULT, SceneColorMode::Default);
            self.backend.set_viewport(view.viewport());
        }
    }

    /// Full resolution translucency leaves scene color bound for later
    /// passes and resolves nothing.
    pub(super) fn finish_translucency(&mut self, downsampled: bool, params: &FinishParams) -> bool {
        if downsampled {
            self.finish_simple(Slot::TranslucencyBuffer, false, params)
        } else {
            false
        }
    }

    pub(super) fn bind_separate_translucency(&mut self, view: ViewRect) {
        let surface = self.registry.surface(Slot::SeparateTranslucency);
        let depth_color = self.registry.surface(Slot::SeparateTranslucencyDepth);
        let scene_depth = self.registry.surface(Slot::SceneDepthZ);
        self.backend.set_render_target(surface, scene_depth);
        self.backend
            .set_mrt_render_target(SEPARATE_TRANSLUCENCY_DEPTH_MRT, depth_color);
        self.backend
            .set_mrt_color_write_enable(SEPARATE_TRANSLUCENCY_DEPTH_MRT, true);
        self.backend.set_viewport(view.viewport());
    }

    pub(super) fn finish_separate_translucency(&mut self, params: &FinishParams) -> bool {
        if params.keep_changes {
            self.resolve_slot(Slot::SeparateTranslucency, false, &params.resolve);
            self.resolve_slot(Slot::SeparateTranslucencyDepth, false, &params.resolve);
        }
        self.backend
            .set_mrt_color_write_enable(SEPARATE_TRANSLUCENCY_DEPTH_MRT, false);
        self.backend
            .set_mrt_render_target(SEPARATE_TRANSLUCENCY_DEPTH_MRT, SurfaceHandle::NULL);
        params.keep_changes
    }

    pub(super) fn bind_ao(&mut self, slot: Slot, downsized_depth: bool) {
        let surface = self.registry.surface(slot);
        let depth = if downsized_depth {
            self.registry.surface(Slot::SmallDepthZ)
        } else {
            self.stereo_null_target(self.registry.surface(Slot::SceneDepthZ))
        };
        self.backend.set_render_target(surface, depth);
    }

    /// A resolved history pass means history now holds valid data.
    pub(super) fn finish_ao_history(&mut self, params: &FinishParams) -> bool {
        let resolved = self.finish_simple(Slot::AoHistory, false, params);
        if resolved {
            self.ao_history_needs_clear = false;
        }
        resolved
    }

    /// Distortion offsets accumulate in the light attenuation buffer.
    pub(super) fn bind_distortion_accumulation(&mut self) {
        let surface = self.registry.surface(Slot::LightAttenuation0);
        let scene_depth = self.registry.surface(Slot::SceneDepthZ);
        self.backend.set_render_target(surface, scene_depth);
    }
}
