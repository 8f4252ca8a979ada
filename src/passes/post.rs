//! Post-processing, velocity and fog passes

use crate::backend::{ColorWrites, GraphicsBackend, SurfaceHandle, Viewport};
use crate::targets::size::LUT_BLEND_EXTENT;
use crate::targets::{RenderTargetPool, Slot};

use super::{FilterTarget, FinishParams};

/// MRT index used by passes that write next to scene color.
const SIDE_MRT: u32 = 1;

impl<B: GraphicsBackend> RenderTargetPool<B> {
    /// Depth attached to the velocity pass. Halved velocity buffers need the
    /// half size depth buffer.
    pub(super) fn velocity_depth_slot(&self) -> Slot {
        if self.sizes.velocity_extent() == self.sizes.principal() {
            Slot::SceneDepthZ
        } else {
            Slot::SmallDepthZ
        }
    }

    pub(super) fn bind_filter(&mut self, target: FilterTarget) {
        let surface = self.registry.surface(target.slot());
        let extent = self.sizes.filter_extent();
        self.backend
            .set_render_target(surface, SurfaceHandle::NULL);
        self.backend
            .set_viewport(Viewport::new(0, 0, extent.width, extent.height));
    }

    pub(super) fn bind_lut_blend(&mut self) {
        let surface = self.registry.surface(Slot::LutBlend);
        self.backend
            .set_render_target(surface, SurfaceHandle::NULL);
        self.backend.set_viewport(Viewport::new(
            0,
            0,
            LUT_BLEND_EXTENT.width,
            LUT_BLEND_EXTENT.height,
        ));
    }

    /// Blur amount goes to the red channel of a side target.
    pub(super) fn bind_dof_blur_buffer(&mut self) {
        let surface = self.registry.surface(Slot::DofBlurBuffer);
        self.backend.set_mrt_render_target(SIDE_MRT, surface);
        self.backend
            .set_mrt_color_write_mask(SIDE_MRT, ColorWrites::RED);
    }

    pub(super) fn finish_dof_blur_buffer(&mut self, params: &FinishParams) -> bool {
        self.backend
            .set_mrt_render_target(SIDE_MRT, SurfaceHandle::NULL);
        self.backend
            .set_mrt_color_write_mask(SIDE_MRT, ColorWrites::ALL);
        self.finish_simple(Slot::DofBlurBuffer, false, params)
    }

    pub(super) fn bind_velocities(&mut self) {
        let surface = self.registry.surface(Slot::VelocityBuffer);
        let depth = self.registry.surface(self.velocity_depth_slot());
        self.backend.set_render_target(surface, depth);
    }

    pub(super) fn bind_fog_integral(&mut self, slot: Slot) {
        let surface = self.registry.surface(slot);
        self.backend
            .set_render_target(surface, SurfaceHandle::NULL);
    }

    pub(super) fn bind_fog_buffer(&mut self) {
        let surface = self.registry.surface(Slot::FogBuffer);
        self.backend.set_mrt_render_target(SIDE_MRT, surface);
    }

    pub(super) fn finish_fog_buffer(&mut self, params: &FinishParams) -> bool {
        self.backend
            .set_mrt_render_target(SIDE_MRT, SurfaceHandle::NULL);
        self.finish_simple(Slot::FogBuffer, false, params)
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, PlatformCapabilities, ResolveParams};
    use crate::passes::test_support::{pool, state_calls};
    use crate::passes::{Pass, SlotState};
    use crate::targets::Extent;

    #[test]
    fn test_filter_sets_filter_viewport() {
        let mut pool = pool(PlatformCapabilities::desktop());
        let pass = Pass::Filter(FilterTarget::Color2);
        pool.begin(pass);
        let surface = pool.get_surface(Slot::FilterColor2);
        assert_eq!(
            state_calls(&mut pool),
            vec![
                BackendCall::SetRenderTarget {
                    color: surface,
                    depth: SurfaceHandle::NULL
                },
                BackendCall::SetViewport(Viewport::new(0, 0, 18, 18)),
            ]
        );
        assert_eq!(pool.extent(Slot::FilterColor2), Extent::new(18, 18));

        pool.finish(pass, FinishParams::default());
        assert_eq!(
            state_calls(&mut pool),
            vec![BackendCall::CopyToResolveTarget {
                surface,
                generate_mips: false,
                params: ResolveParams::default(),
            }]
        );
    }

    #[test]
    fn test_lut_blend_viewport() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.begin(Pass::LutBlend);
        assert_eq!(
            state_calls(&mut pool).last(),
            Some(&BackendCall::SetViewport(Viewport::new(0, 0, 256, 16)))
        );
        pool.finish(Pass::LutBlend, FinishParams::default());
        assert_eq!(pool.slot_state(Slot::LutBlend), SlotState::Resolved);
    }

    #[test]
    fn test_dof_blur_buffer_masks_red() {
        let mut pool = pool(PlatformCapabilities::console());
        pool.begin(Pass::DofBlurBuffer);
        let surface = pool.get_surface(Slot::DofBlurBuffer);
        assert_eq!(
            state_calls(&mut pool),
            vec![
                BackendCall::SetMrtRenderTarget { index: 1, surface },
                BackendCall::SetMrtColorWriteMask {
                    index: 1,
                    mask: ColorWrites::RED
                },
            ]
        );
        pool.finish(Pass::DofBlurBuffer, FinishParams::default());
        let calls = state_calls(&mut pool);
        assert_eq!(
            calls[1],
            BackendCall::SetMrtColorWriteMask {
                index: 1,
                mask: ColorWrites::ALL
            }
        );
    }

    #[test]
    fn test_dof_blur_buffer_skipped_on_desktop() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.begin(Pass::DofBlurBuffer);
        pool.finish(Pass::DofBlurBuffer, FinishParams::default());
        assert!(state_calls(&mut pool).is_empty());
    }

    #[test]
    fn test_velocity_depth_follows_velocity_extent() {
        let desktop = pool(PlatformCapabilities::desktop());
        assert_eq!(
            desktop.pass_targets(&Pass::Velocities).attached,
            vec![Slot::SceneDepthZ]
        );
        let console = pool(PlatformCapabilities::console());
        assert_eq!(
            console.pass_targets(&Pass::Velocities).attached,
            vec![Slot::SmallDepthZ]
        );
    }

    #[test]
    fn test_fog_buffer_uses_side_target() {
        let mut pool = pool(PlatformCapabilities::console());
        pool.begin(Pass::FogBuffer);
        pool.finish(Pass::FogBuffer, FinishParams::default());
        let surface = pool.get_surface(Slot::FogBuffer);
        let calls = state_calls(&mut pool);
        assert_eq!(calls[0], BackendCall::SetMrtRenderTarget { index: 1, surface });
        assert_eq!(
            calls[1],
            BackendCall::SetMrtRenderTarget {
                index: 1,
                surface: SurfaceHandle::NULL
            }
        );
        assert_eq!(pool.slot_state(Slot::FogBuffer), SlotState::Resolved);
    }

    #[test]
    fn test_fog_integrals_bind_without_depth() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.begin(Pass::FogFrontfaces);
        pool.begin(Pass::FogBackfaces);
        pool.finish(Pass::FogBackfaces, FinishParams::default());
        pool.finish(Pass::FogFrontfaces, FinishParams::default());
        assert_eq!(
            pool.slot_state(Slot::FogFrontfacesIntegralAccumulation),
            SlotState::Resolved
        );
        assert_eq!(pool.extent(Slot::FogBackfacesIntegralAccumulation), Extent::new(32, 32));
    }
}
