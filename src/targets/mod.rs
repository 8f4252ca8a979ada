//! Render target ownership, sizing and reconfiguration
//!
//! [`RenderTargetPool`] owns every scene render target. Resources are created
//! lazily the first time a pass touches a slot and live until the next
//! resize, feature change or teardown.
//!
//! ```text
//!   allocate(w, h) ──► SizeConfig ──► ResourceRegistry ◄── AliasingPlanner
//!                                        ▲       │
//!   PoolCommandSender ─► process_commands│       ▼
//!                                   begin/finish (passes)
//! ```

pub mod aliasing;
pub mod diagnostics;
pub mod reconfigure;
pub mod registry;
pub mod size;
pub mod slot;

pub use aliasing::{
    AliasingPlanner, BindEvent, BindEventKind, BindTimeline, SharedMemoryBank, BANK_ASSIGNMENTS,
};
pub use diagnostics::{MemoryReport, MemoryReportEntry};
pub use reconfigure::{PoolCommand, PoolCommandSender, ReconfigurationController};
pub use registry::{AllocationRequest, ResourceEntry, ResourceRegistry};
pub use size::{Extent, ShadowSettings, SizeConfig};
pub use slot::{ExtentCategory, FormatRule, Slot, SlotContext, SlotDesc, Storage, SLOT_COUNT};

use log::{debug, info};

use crate::backend::{
    GraphicsBackend, PixelFormat, PlatformCapabilities, SurfaceHandle, TextureHandle,
};
use crate::error::{report, PoolError, PoolResult};
use crate::passes::BracketTracker;
use crate::{FeatureSettings, PoolConfig};

/// Owner of all scene render targets
pub struct RenderTargetPool<B: GraphicsBackend> {
    pub(crate) backend: B,
    pub(crate) caps: PlatformCapabilities,
    pub(crate) features: FeatureSettings,
    pub(crate) scene_color_format: PixelFormat,
    pub(crate) sizes: SizeConfig,
    pub(crate) registry: ResourceRegistry,
    pub(crate) planner: AliasingPlanner,
    pub(crate) brackets: BracketTracker,
    pub(crate) timeline: Option<BindTimeline>,
    pub(crate) controller: ReconfigurationController,
    pub(crate) back_buffer: SurfaceHandle,
    pub(crate) scene_color_is_raw: bool,
    pub(crate) ao_history_needs_clear: bool,
}

impl<B: GraphicsBackend> RenderTargetPool<B> {
    /// Create an empty pool. Capabilities are read from the backend once and
    /// the calling thread becomes the owner thread.
    pub fn new(backend: B, config: PoolConfig) -> Self {
        let caps = backend.capabilities();
        info!(
            "Creating render target pool on {} (shared memory: {}, {} render targets)",
            backend.name(),
            caps.shared_memory,
            caps.max_render_targets
        );
        if caps.max_render_targets < 5 {
            debug!("G-buffer targets disabled, need 5 render targets");
        }

        Self {
            backend,
            caps,
            features: config.features,
            scene_color_format: config.scene_color_format,
            sizes: SizeConfig::new(
                config.ao_downsample_factor,
                config.shadows,
                caps.shared_memory,
            ),
            registry: ResourceRegistry::new(),
            planner: AliasingPlanner::new(&caps),
            brackets: BracketTracker::new(),
            timeline: config.record_bind_timeline.then(BindTimeline::new),
            controller: ReconfigurationController::new(),
            back_buffer: SurfaceHandle::NULL,
            scene_color_is_raw: false,
            ao_history_needs_clear: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.caps
    }

    pub fn features(&self) -> &FeatureSettings {
        &self.features
    }

    pub fn sizes(&self) -> &SizeConfig {
        &self.sizes
    }

    pub fn planner(&self) -> &AliasingPlanner {
        &self.planner
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn principal_size(&self) -> Extent {
        self.sizes.principal()
    }

    pub fn is_initialized(&self) -> bool {
        self.sizes.is_configured()
    }

    pub fn slot_context(&self) -> SlotContext {
        SlotContext {
            caps: self.caps,
            features: self.features,
            scene_color_format: self.scene_color_format,
        }
    }

    /// Whether the slot exists for the current platform and feature set.
    pub fn is_available(&self, slot: Slot) -> bool {
        self.slot_context().is_available(slot)
    }

    // === Reconfiguration ===

    /// Grow the principal size to cover `width x height`.
    ///
    /// The stored size only ever grows. A request that already fits is a
    /// no-op; otherwise every slot is released and reallocated lazily.
    /// Returns whether a reallocation happened.
    pub fn allocate(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            debug!("Ignoring render target allocation of {width}x{height}");
            return false;
        }
        let requested = SizeConfig::align(width, height);
        let current = self.sizes.principal();
        if current.contains(requested) {
            return false;
        }

        let width = requested.width.max(current.width);
        let height = requested.height.max(current.height);
        info!(
            "Resizing render targets from {}x{} to {width}x{height}",
            current.width, current.height
        );
        self.release_all();
        self.sizes.set_principal_size(width, height);
        true
    }

    /// Change the ambient occlusion downsample factor.
    ///
    /// Only the AO working set is released and reallocated; every other slot
    /// keeps its handles. Returns whether the factor changed.
    pub fn set_ao_downsample_factor(&mut self, factor: u32) -> bool {
        match self.sizes.set_ao_downsample_factor(factor) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                report(err);
                return false;
            }
        }

        info!("Ambient occlusion downsample factor is now {factor}");
        let reallocate: Vec<Slot> = Slot::AMBIENT_OCCLUSION
            .into_iter()
            .filter(|&slot| self.registry.is_allocated(slot))
            .collect();
        for slot in Slot::AMBIENT_OCCLUSION {
            self.release(slot);
        }
        self.ao_history_needs_clear = true;
        for slot in reallocate {
            if let Err(err) = self.ensure_allocated(slot) {
                report(err);
            }
        }
        true
    }

    /// Replace the feature settings, releasing slots that no longer exist
    /// and slots whose format or texture changed with the new settings.
    /// Returns the number of slots released.
    pub fn update_features(&mut self, features: FeatureSettings) -> usize {
        self.features = features;
        let ctx = self.slot_context();
        let stale: Vec<Slot> = self
            .registry
            .iter()
            .filter(|(slot, entry)| Self::is_stale(*slot, entry, &ctx))
            .map(|(slot, _)| slot)
            .collect();
        let released = stale
            .into_iter()
            .filter(|&slot| self.release(slot))
            .count();
        if released > 0 {
            info!("Released {released} render targets after a feature change");
        }
        released
    }

    /// Whether an allocated entry no longer matches what `ctx` would create.
    /// Sharing entries follow their owner.
    fn is_stale(slot: Slot, entry: &ResourceEntry, ctx: &SlotContext) -> bool {
        if !ctx.is_available(slot) {
            return true;
        }
        if entry.shared_from.is_some() {
            return false;
        }
        let desc = slot.desc();
        if entry.format != ctx.format(desc.format) {
            return true;
        }
        desc.storage != Storage::Cube && entry.texture.is_some() != desc.has_texture(ctx)
    }

    /// Handle for posting reconfiguration from other threads.
    pub fn command_sender(&self) -> PoolCommandSender {
        self.controller.sender()
    }

    /// Make the calling thread the owner thread. Call after handing the pool
    /// to another thread once commands have been processed.
    pub fn bind_to_current_thread(&mut self) {
        self.controller.bind_to_current_thread();
    }

    /// Apply queued commands in issue order. The first call claims the
    /// owner thread; later calls must come from it.
    pub fn process_commands(&mut self) -> usize {
        let on_owner = self.controller.claim_current_thread();
        debug_assert!(
            on_owner,
            "render target commands must be processed on the owner thread"
        );
        let commands = self.controller.drain();
        for command in &commands {
            match *command {
                PoolCommand::Allocate { width, height } => {
                    self.allocate(width, height);
                }
                PoolCommand::SetAoDownsampleFactor(factor) => {
                    self.set_ao_downsample_factor(factor);
                }
                PoolCommand::ReleaseAll => self.release_all(),
            }
        }
        commands.len()
    }

    // === Allocation ===

    fn base_request(&self, slot: Slot, ctx: &SlotContext) -> AllocationRequest {
        let desc = slot.desc();
        AllocationRequest {
            slot,
            extent: self.sizes.extent(desc.category),
            format: ctx.format(desc.format),
            multisample: desc.multisample,
            storage: desc.storage,
            texture: desc.has_texture(ctx),
            bank: None,
        }
    }

    /// Allocation request for a slot, with its bank sized for the largest
    /// member available on this platform.
    pub fn allocation_request(&self, slot: Slot) -> AllocationRequest {
        let ctx = self.slot_context();
        let mut request = self.base_request(slot, &ctx);
        if let Some(bank) = self.planner.bank_for(slot) {
            let size = self.planner.resolve_bank_size(bank, |member| {
                ctx.is_available(member)
                    .then(|| self.base_request(member, &ctx).footprint())
            });
            request.bank = Some((bank, size));
        }
        request
    }

    /// Create the slot's resources if it has none yet.
    pub fn ensure_allocated(&mut self, slot: Slot) -> PoolResult<()> {
        if !self.sizes.is_configured() {
            return Err(PoolError::NotConfigured);
        }
        let ctx = self.slot_context();
        if !ctx.is_available(slot) {
            return Err(PoolError::UnsupportedSlot(slot));
        }
        if self.registry.is_allocated(slot) {
            return Ok(());
        }

        if let Some(owner) = slot.desc().reuses {
            if self.planner.bank_for(slot).is_none() && ctx.is_available(owner) {
                self.ensure_allocated(owner)?;
                self.registry.share(slot, owner);
                return Ok(());
            }
        }

        let request = self.allocation_request(slot);
        self.registry.allocate(&mut self.backend, &request)?;
        if slot == Slot::AoHistory {
            self.ao_history_needs_clear = true;
        }
        Ok(())
    }

    /// Allocate every slot available on this platform.
    pub fn ensure_all_allocated(&mut self) {
        if !self.sizes.is_configured() {
            report(PoolError::NotConfigured);
            return;
        }
        let ctx = self.slot_context();
        for slot in Slot::ALL {
            if ctx.is_available(slot) {
                if let Err(err) = self.ensure_allocated(slot) {
                    report(err);
                }
            }
        }
    }

    /// Release one slot, and the slots sharing its handles. Safe to call on
    /// an unallocated slot.
    pub fn release(&mut self, slot: Slot) -> bool {
        let sharers: Vec<Slot> = self
            .registry
            .iter()
            .filter(|(_, entry)| entry.shared_from == Some(slot))
            .map(|(sharer, _)| sharer)
            .collect();
        if !self.registry.release(&mut self.backend, slot) {
            return false;
        }
        for released in std::iter::once(slot).chain(sharers) {
            self.brackets.forget(released);
        }
        true
    }

    pub fn release_all(&mut self) {
        let released = self.registry.release_all(&mut self.backend);
        self.brackets.reset();
        self.scene_color_is_raw = false;
        if released > 0 {
            info!("Released {released} render targets");
        }
    }

    // === Accessors ===

    /// Sampleable texture of a slot, or [`TextureHandle::NULL`] when it is
    /// unallocated or unavailable.
    pub fn get_texture(&self, slot: Slot) -> TextureHandle {
        if !self.is_available(slot) {
            report(PoolError::UnsupportedSlot(slot));
            return TextureHandle::NULL;
        }
        self.registry.texture(slot)
    }

    pub fn get_surface(&self, slot: Slot) -> SurfaceHandle {
        if !self.is_available(slot) {
            report(PoolError::UnsupportedSlot(slot));
            return SurfaceHandle::NULL;
        }
        self.registry.surface(slot)
    }

    pub fn get_texture_cube(&self, slot: Slot) -> TextureHandle {
        if !self.is_available(slot) {
            report(PoolError::UnsupportedSlot(slot));
            return TextureHandle::NULL;
        }
        self.registry.texture_cube(slot)
    }

    pub fn get_texture_by_index(&self, index: u32) -> TextureHandle {
        Slot::from_index(index)
            .map(|slot| self.get_texture(slot))
            .unwrap_or(TextureHandle::NULL)
    }

    pub fn get_surface_by_index(&self, index: u32) -> SurfaceHandle {
        Slot::from_index(index)
            .map(|slot| self.get_surface(slot))
            .unwrap_or(SurfaceHandle::NULL)
    }

    /// Cube shadow slot used for shadows of `resolution`.
    pub fn cube_shadow_slot(&self, resolution: u32) -> Slot {
        let index = self.sizes.cube_shadow_index(resolution);
        Slot::cube_shadow(index).unwrap_or(Slot::CubeShadowDepthZ4)
    }

    /// Set the surface the `BackBuffer` pass binds. Called once per frame.
    pub fn set_back_buffer(&mut self, surface: SurfaceHandle) {
        self.back_buffer = surface;
    }

    pub fn back_buffer(&self) -> SurfaceHandle {
        self.back_buffer
    }

    /// Whether the scene color texture currently holds raw, unconverted data.
    pub fn scene_color_is_raw(&self) -> bool {
        self.scene_color_is_raw
    }

    /// Whether the next AO history pass must initialise history.
    pub fn ao_history_needs_clear(&self) -> bool {
        self.ao_history_needs_clear
    }

    pub fn timeline(&self) -> Option<&BindTimeline> {
        self.timeline.as_ref()
    }

    pub fn clear_timeline(&mut self) {
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.clear();
        }
    }

    /// Check the recorded frame against the bank plan. Passes trivially
    /// when recording is off.
    pub fn validate_timeline(&self) -> PoolResult<()> {
        match &self.timeline {
            Some(timeline) => timeline.validate(&self.planner),
            None => Ok(()),
        }
    }
}

impl<B: GraphicsBackend> Drop for RenderTargetPool<B> {
    fn drop(&mut self) {
        self.registry.release_all(&mut self.backend);
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, DummyBackend};
    use crate::passes::{Pass, SlotState};

    fn pool(caps: PlatformCapabilities) -> RenderTargetPool<DummyBackend> {
        RenderTargetPool::new(DummyBackend::new(caps), PoolConfig::default())
    }

    #[test]
    fn test_allocate_is_monotonic() {
        let mut pool = pool(PlatformCapabilities::desktop());
        assert!(pool.allocate(1280, 720));
        assert!(!pool.allocate(640, 480));
        assert!(pool.allocate(1000, 1000));
        assert_eq!(pool.principal_size(), Extent::new(1280, 1000));
        assert!(!pool.allocate(0, 4000));
    }

    #[test]
    fn test_ensure_before_allocate_is_not_configured() {
        let mut pool = pool(PlatformCapabilities::desktop());
        assert_eq!(
            pool.ensure_allocated(Slot::SceneColor),
            Err(PoolError::NotConfigured)
        );
    }

    #[test]
    fn test_unavailable_slot_is_rejected_and_null() {
        let mut pool = pool(PlatformCapabilities::console());
        pool.allocate(64, 64);
        assert_eq!(
            pool.ensure_allocated(Slot::WorldNormalGBuffer),
            Err(PoolError::UnsupportedSlot(Slot::WorldNormalGBuffer))
        );
        assert!(pool.get_texture(Slot::WorldNormalGBuffer).is_null());
    }

    #[test]
    fn test_hit_proxy_reuses_light_attenuation() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.allocate(64, 64);
        pool.ensure_allocated(Slot::HitProxy).unwrap();
        assert!(pool.registry().is_allocated(Slot::LightAttenuation0));
        assert_eq!(
            pool.get_surface(Slot::HitProxy),
            pool.get_surface(Slot::LightAttenuation0)
        );
    }

    #[test]
    fn test_banked_slot_gets_bank_sized_for_largest_member() {
        let mut pool = pool(PlatformCapabilities::console());
        pool.allocate(64, 64);
        pool.ensure_allocated(Slot::AoInput).unwrap();
        let (_, size, members) = pool
            .registry()
            .bank_allocation(SharedMemoryBank::LightAttenuation)
            .unwrap();
        assert_eq!(members, 1);
        // the 1024x1024 object shadow depth is the largest member
        assert_eq!(size, 1024 * 1024 * 4);
    }

    #[test]
    fn test_ao_history_allocation_sets_clear_flag() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.allocate(64, 64);
        assert!(!pool.ao_history_needs_clear());
        pool.ensure_allocated(Slot::AoHistory).unwrap();
        assert!(pool.ao_history_needs_clear());
    }

    #[test]
    fn test_update_features_releases_disabled_slots() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.allocate(64, 64);
        pool.ensure_allocated(Slot::VelocityBuffer).unwrap();
        pool.ensure_allocated(Slot::SceneColor).unwrap();

        let features = FeatureSettings {
            allow_motion_blur: false,
            ..*pool.features()
        };
        assert_eq!(pool.update_features(features), 1);
        assert!(!pool.registry().is_allocated(Slot::VelocityBuffer));
        assert!(pool.registry().is_allocated(Slot::SceneColor));
    }

    #[test]
    fn test_gbuffer_precision_change_reallocates_gbuffers() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.allocate(64, 64);
        pool.ensure_allocated(Slot::DiffuseGBuffer).unwrap();
        pool.ensure_allocated(Slot::SceneColor).unwrap();
        let scene_color = pool.get_texture(Slot::SceneColor);

        let features = FeatureSettings {
            high_precision_gbuffers: true,
            ..*pool.features()
        };
        assert_eq!(pool.update_features(features), 1);
        assert!(!pool.registry().is_allocated(Slot::DiffuseGBuffer));
        assert_eq!(pool.get_texture(Slot::SceneColor), scene_color);

        pool.ensure_allocated(Slot::DiffuseGBuffer).unwrap();
        let entry = pool.registry().entry(Slot::DiffuseGBuffer).unwrap();
        assert_eq!(entry.format, PixelFormat::Rgba16Float);
    }

    #[test]
    fn test_shadow_filtering_change_reallocates_shadow_depth() {
        let caps = PlatformCapabilities {
            depth_textures: false,
            ..PlatformCapabilities::desktop()
        };
        let mut pool = pool(caps);
        pool.allocate(64, 64);
        pool.ensure_allocated(Slot::ShadowDepthZ).unwrap();
        let entry = pool.registry().entry(Slot::ShadowDepthZ).unwrap();
        assert_eq!(entry.format, PixelFormat::FilteredShadowDepth);
        assert!(entry.texture.is_some());

        let features = FeatureSettings {
            allow_hardware_shadow_filtering: false,
            ..*pool.features()
        };
        assert_eq!(pool.update_features(features), 1);
        assert!(!pool.registry().is_allocated(Slot::ShadowDepthZ));

        pool.ensure_allocated(Slot::ShadowDepthZ).unwrap();
        let entry = pool.registry().entry(Slot::ShadowDepthZ).unwrap();
        assert_eq!(entry.format, PixelFormat::ShadowDepth);
        assert!(entry.texture.is_none());
    }

    #[test]
    fn test_tall_object_shadow_clamp_allocates_banked_slots() {
        let config = PoolConfig {
            shadows: ShadowSettings {
                max_shadow_resolution: 2048,
                max_object_shadow_size: glam::UVec2::new(1024, 2048),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut pool =
            RenderTargetPool::new(DummyBackend::new(PlatformCapabilities::console()), config);
        pool.allocate(64, 64);
        pool.ensure_allocated(Slot::LightAttenuation0).unwrap();
        let (_, size, _) = pool
            .registry()
            .bank_allocation(SharedMemoryBank::LightAttenuation)
            .unwrap();
        assert_eq!(size, 1024 * 1024 * 4);
    }

    #[test]
    fn test_releasing_a_bound_slot_unbinds_it() {
        let mut pool = pool(PlatformCapabilities::desktop());
        pool.allocate(64, 64);
        let ao = Pass::AoInput {
            downsized_depth: true,
        };
        pool.begin(ao);
        assert_eq!(pool.slot_state(Slot::AoInput), SlotState::Bound);

        assert!(pool.set_ao_downsample_factor(4));
        assert_eq!(pool.slot_state(Slot::AoInput), SlotState::Unbound);
        assert_eq!(pool.try_begin(&ao), Ok(()));

        pool.begin(Pass::HitProxies);
        assert!(pool.release(Slot::LightAttenuation0));
        assert_eq!(pool.slot_state(Slot::HitProxy), SlotState::Unbound);
    }

    #[test]
    fn test_release_all_destroys_everything() {
        let mut pool = pool(PlatformCapabilities::console());
        pool.allocate(128, 128);
        pool.ensure_all_allocated();
        assert!(pool.registry().allocated_count() > 0);
        pool.release_all();
        assert_eq!(pool.registry().allocated_count(), 0);
        assert_eq!(pool.backend().live_resource_count(), 0);
    }

    #[test]
    fn test_process_commands_in_order() {
        let mut pool = pool(PlatformCapabilities::desktop());
        let sender = pool.command_sender();
        sender.request_allocate(320, 240);
        sender.request_ao_downsample_factor(4);
        assert_eq!(pool.process_commands(), 2);
        assert_eq!(pool.principal_size(), Extent::new(320, 240));
        assert_eq!(pool.sizes().ao_extent(), Extent::new(80, 60));
        assert!(!pool
            .backend()
            .calls()
            .iter()
            .any(BackendCall::is_allocation));
    }
}
