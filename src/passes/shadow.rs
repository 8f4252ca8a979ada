//! Shadow depth passes

use crate::backend::{GraphicsBackend, ResolveParams, SurfaceHandle};
use crate::targets::{RenderTargetPool, Slot};

use super::FinishParams;

/// Depth and color slot of a projected shadow pass.
pub(super) fn shadow_slots(whole_scene: bool) -> (Slot, Slot) {
    if whole_scene {
        (Slot::DominantShadowDepthZ, Slot::DominantShadowDepthColor)
    } else {
        (Slot::ShadowDepthZ, Slot::ShadowDepthColor)
    }
}

impl<B: GraphicsBackend> RenderTargetPool<B> {
    /// Whether shadow depth is resolved from the depth surface rather than
    /// from the color target.
    fn shadow_resolves_depth(&self) -> bool {
        self.caps.depth_textures || self.slot_context().shadow_needs_color_target()
    }

    pub(super) fn bind_shadow_depth(&mut self, depth: Slot, color: Slot) {
        let ctx = self.slot_context();
        let depth = self.registry.surface(depth);
        let color = self.registry.surface(color);

        if ctx.shadow_needs_color_target() {
            self.backend.set_render_target(color, depth);
            self.backend.set_color_write_enable(false);
        } else if self.caps.depth_textures {
            self.backend.set_render_target(SurfaceHandle::NULL, depth);
            self.backend.set_color_write_enable(false);
        } else {
            // depth is written to the color target
            self.backend.set_render_target(color, depth);
        }
    }

    pub(super) fn finish_shadow_depth(
        &mut self,
        depth: Slot,
        color: Slot,
        params: &FinishParams,
    ) -> bool {
        if self.shadow_resolves_depth() {
            if params.keep_changes {
                self.resolve_slot(depth, false, &params.resolve);
            }
            self.backend.set_color_write_enable(true);
        } else if params.keep_changes {
            self.resolve_slot(color, false, &params.resolve);
        }
        params.keep_changes
    }

    pub(super) fn bind_cube_shadow_depth(&mut self, resolution: u32) {
        let slot = self.cube_shadow_slot(resolution);
        let surface = self.registry.surface(slot);
        self.backend
            .set_render_target(SurfaceHandle::NULL, surface);
        self.backend.set_color_write_enable(false);
    }

    /// `params.resolve.slice` selects the cube face.
    pub(super) fn finish_cube_shadow_depth(&mut self, resolution: u32, params: &FinishParams) -> bool {
        let slot = self.cube_shadow_slot(resolution);
        if params.keep_changes {
            self.resolve_slot(slot, false, &params.resolve);
        }
        self.backend.set_color_write_enable(true);
        params.keep_changes
    }

    /// Resolve the preshadow cache outside a bracket.
    pub fn resolve_preshadow_cache_depth(&mut self, params: ResolveParams) {
        let slot = if self.shadow_resolves_depth() {
            Slot::PreshadowCacheDepthZ
        } else {
            Slot::PreshadowCacheDepthColor
        };
        self.resolve_slot(slot, false, &params);
        self.brackets.mark_resolved(slot);
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, PlatformCapabilities};
    use crate::passes::test_support::{pool, state_calls};
    use crate::passes::{Pass, SlotState};

    #[test]
    fn test_depth_texture_platform_binds_depth_only() {
        let mut pool = pool(PlatformCapabilities::console());
        let pass = Pass::ShadowDepth { whole_scene: false };
        pool.begin(pass);
        let depth = pool.get_surface(Slot::ShadowDepthZ);
        assert_eq!(
            state_calls(&mut pool),
            vec![
                BackendCall::SetRenderTarget {
                    color: SurfaceHandle::NULL,
                    depth
                },
                BackendCall::SetColorWriteEnable(false),
            ]
        );

        pool.finish(pass, FinishParams::default());
        assert_eq!(
            state_calls(&mut pool),
            vec![
                BackendCall::CopyToResolveTarget {
                    surface: depth,
                    generate_mips: false,
                    params: ResolveParams::default(),
                },
                BackendCall::SetColorWriteEnable(true),
            ]
        );
        assert_eq!(pool.slot_state(Slot::ShadowDepthZ), SlotState::Resolved);
    }

    #[test]
    fn test_minimal_platform_writes_depth_to_color() {
        let mut pool = pool(PlatformCapabilities::minimal());
        let pass = Pass::ShadowDepth { whole_scene: true };
        assert_eq!(
            pool.pass_targets(&pass).owned,
            vec![Slot::DominantShadowDepthZ, Slot::DominantShadowDepthColor]
        );
        pool.begin(pass);
        let color = pool.get_surface(Slot::DominantShadowDepthColor);
        let depth = pool.get_surface(Slot::DominantShadowDepthZ);
        assert!(!color.is_null());
        assert_eq!(
            state_calls(&mut pool),
            vec![BackendCall::SetRenderTarget { color, depth }]
        );

        pool.finish(pass, FinishParams::default());
        assert_eq!(
            state_calls(&mut pool),
            vec![BackendCall::CopyToResolveTarget {
                surface: color,
                generate_mips: false,
                params: ResolveParams::default(),
            }]
        );
    }

    #[test]
    fn test_cube_shadow_pass_picks_slot_by_resolution() {
        let mut pool = pool(PlatformCapabilities::desktop());
        let pass = Pass::CubeShadowDepth { resolution: 300 };
        assert_eq!(pool.pass_targets(&pass).owned, vec![Slot::CubeShadowDepthZ1]);
        pool.begin(pass);
        assert_eq!(pool.slot_state(Slot::CubeShadowDepthZ1), SlotState::Bound);
        let surface = pool.get_surface(Slot::CubeShadowDepthZ1);
        assert_eq!(
            state_calls(&mut pool)[0],
            BackendCall::SetRenderTarget {
                color: SurfaceHandle::NULL,
                depth: surface
            }
        );
        pool.finish(pass, FinishParams::default());
        assert_eq!(pool.slot_state(Slot::CubeShadowDepthZ1), SlotState::Resolved);
    }

    #[test]
    fn test_cube_shadow_pass_skipped_without_cube_targets() {
        let mut pool = pool(PlatformCapabilities::console());
        let pass = Pass::CubeShadowDepth { resolution: 64 };
        pool.begin(pass);
        pool.finish(pass, FinishParams::default());
        assert!(state_calls(&mut pool).is_empty());
        assert_eq!(pool.slot_state(Slot::CubeShadowDepthZ3), SlotState::Unbound);
    }

    #[test]
    fn test_preshadow_cache_resolve() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.begin(Pass::PreshadowCacheDepth);
        pool.finish(Pass::PreshadowCacheDepth, FinishParams::raw());
        assert_eq!(pool.slot_state(Slot::PreshadowCacheDepthZ), SlotState::Unbound);
        state_calls(&mut pool);

        pool.resolve_preshadow_cache_depth(ResolveParams::default());
        let depth = pool.get_surface(Slot::PreshadowCacheDepthZ);
        assert_eq!(
            state_calls(&mut pool),
            vec![BackendCall::CopyToResolveTarget {
                surface: depth,
                generate_mips: false,
                params: ResolveParams::default(),
            }]
        );
        assert_eq!(pool.slot_state(Slot::PreshadowCacheDepthZ), SlotState::Resolved);
    }
}
