//! Dummy backend for testing and development.
//!
//! This backend doesn't perform any GPU work. It hands out unique handles,
//! tracks which of them are alive and records every call in order, so tests
//! can assert on the exact sequence of binds and resolves a pass produced.

use std::collections::HashSet;

use super::{
    BackendError, BackendResult, ClearValues, ColorWrites, GraphicsBackend, PlatformCapabilities,
    ResolveParams, SharedMemoryHandle, SurfaceDescriptor, SurfaceHandle, TargetUsage,
    TextureDescriptor, TextureHandle, Viewport,
};

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateTexture {
        handle: TextureHandle,
        desc: TextureDescriptor,
    },
    CreateSurface {
        handle: SurfaceHandle,
        desc: SurfaceDescriptor,
    },
    CreateSharedMemory {
        handle: SharedMemoryHandle,
        size: u64,
    },
    DestroyTexture(TextureHandle),
    DestroySurface(SurfaceHandle),
    DestroySharedMemory(SharedMemoryHandle),
    SetRenderTarget {
        color: SurfaceHandle,
        depth: SurfaceHandle,
    },
    SetMrtRenderTarget {
        index: u32,
        surface: SurfaceHandle,
    },
    SetMrtColorWriteEnable {
        index: u32,
        enable: bool,
    },
    SetMrtColorWriteMask {
        index: u32,
        mask: ColorWrites,
    },
    SetColorWriteEnable(bool),
    SetColorWriteMask(ColorWrites),
    SetViewport(Viewport),
    Clear(ClearValues),
    UpdateUsage {
        surface: SurfaceHandle,
        usage: TargetUsage,
    },
    CopyToResolveTarget {
        surface: SurfaceHandle,
        generate_mips: bool,
        params: ResolveParams,
    },
    CopyFromResolveTarget(SurfaceHandle),
}

impl BackendCall {
    pub fn is_allocation(&self) -> bool {
        matches!(
            self,
            BackendCall::CreateTexture { .. }
                | BackendCall::CreateSurface { .. }
                | BackendCall::CreateSharedMemory { .. }
        )
    }

    pub fn is_release(&self) -> bool {
        matches!(
            self,
            BackendCall::DestroyTexture(_)
                | BackendCall::DestroySurface(_)
                | BackendCall::DestroySharedMemory(_)
        )
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    capabilities: PlatformCapabilities,
    stereo: bool,
    next_id: u64,
    live: HashSet<u64>,
    calls: Vec<BackendCall>,
    fail_allocations: bool,
}

impl DummyBackend {
    /// Create a new dummy backend reporting the given capabilities.
    pub fn new(capabilities: PlatformCapabilities) -> Self {
        Self {
            capabilities,
            stereo: false,
            next_id: 1,
            live: HashSet::new(),
            calls: Vec::new(),
            fail_allocations: false,
        }
    }

    /// Pretend a stereo driver is active.
    pub fn with_stereo(mut self, stereo: bool) -> Self {
        self.stereo = stereo;
        self
    }

    /// Make every following allocation fail with [`BackendError::OutOfMemory`].
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// All calls recorded so far, oldest first.
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Return the recorded calls and start a fresh log.
    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of textures, surfaces and shared allocations not yet destroyed.
    pub fn live_resource_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, raw: u64) -> bool {
        self.live.contains(&raw)
    }

    fn allocate_id(&mut self) -> BackendResult<u64> {
        if self.fail_allocations {
            return Err(BackendError::OutOfMemory);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        Ok(id)
    }

    fn free_id(&mut self, id: u64, kind: &str) {
        if id == 0 {
            return;
        }
        if !self.live.remove(&id) {
            log::warn!("DummyBackend: destroying unknown or already destroyed {kind} {id}");
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(PlatformCapabilities::default())
    }
}

impl GraphicsBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    fn is_stereo_enabled(&self) -> bool {
        self.stereo
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let handle = TextureHandle(self.allocate_id()?);
        self.calls.push(BackendCall::CreateTexture {
            handle,
            desc: desc.clone(),
        });
        Ok(handle)
    }

    fn create_targetable_surface(
        &mut self,
        desc: &SurfaceDescriptor,
    ) -> BackendResult<SurfaceHandle> {
        log::trace!(
            "DummyBackend: creating surface {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let handle = SurfaceHandle(self.allocate_id()?);
        self.calls.push(BackendCall::CreateSurface {
            handle,
            desc: desc.clone(),
        });
        Ok(handle)
    }

    fn create_shared_memory(
        &mut self,
        label: &str,
        size: u64,
    ) -> BackendResult<SharedMemoryHandle> {
        log::trace!("DummyBackend: creating shared memory {label} ({size} bytes)");
        let handle = SharedMemoryHandle(self.allocate_id()?);
        self.calls
            .push(BackendCall::CreateSharedMemory { handle, size });
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.free_id(texture.0, "texture");
        self.calls.push(BackendCall::DestroyTexture(texture));
    }

    fn destroy_surface(&mut self, surface: SurfaceHandle) {
        self.free_id(surface.0, "surface");
        self.calls.push(BackendCall::DestroySurface(surface));
    }

    fn destroy_shared_memory(&mut self, memory: SharedMemoryHandle) {
        self.free_id(memory.0, "shared memory");
        self.calls.push(BackendCall::DestroySharedMemory(memory));
    }

    fn set_render_target(&mut self, color: SurfaceHandle, depth: SurfaceHandle) {
        log::trace!("DummyBackend: set render target {color:?} / {depth:?}");
        self.calls
            .push(BackendCall::SetRenderTarget { color, depth });
    }

    fn set_mrt_render_target(&mut self, index: u32, surface: SurfaceHandle) {
        self.calls
            .push(BackendCall::SetMrtRenderTarget { index, surface });
    }

    fn set_mrt_color_write_enable(&mut self, index: u32, enable: bool) {
        self.calls
            .push(BackendCall::SetMrtColorWriteEnable { index, enable });
    }

    fn set_mrt_color_write_mask(&mut self, index: u32, mask: ColorWrites) {
        self.calls
            .push(BackendCall::SetMrtColorWriteMask { index, mask });
    }

    fn set_color_write_enable(&mut self, enable: bool) {
        self.calls.push(BackendCall::SetColorWriteEnable(enable));
    }

    fn set_color_write_mask(&mut self, mask: ColorWrites) {
        self.calls.push(BackendCall::SetColorWriteMask(mask));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.calls.push(BackendCall::SetViewport(viewport));
    }

    fn clear(&mut self, values: ClearValues) {
        if let Some(color) = values.color {
            log::trace!("DummyBackend: clear color {:?}", color.to_array());
        }
        self.calls.push(BackendCall::Clear(values));
    }

    fn update_render_target_usage(&mut self, surface: SurfaceHandle, usage: TargetUsage) {
        self.calls.push(BackendCall::UpdateUsage { surface, usage });
    }

    fn copy_to_resolve_target(
        &mut self,
        surface: SurfaceHandle,
        generate_mips: bool,
        params: &ResolveParams,
    ) {
        log::trace!("DummyBackend: resolve {surface:?}");
        self.calls.push(BackendCall::CopyToResolveTarget {
            surface,
            generate_mips,
            params: *params,
        });
    }

    fn copy_from_resolve_target(&mut self, surface: SurfaceHandle) {
        log::trace!("DummyBackend: restore {surface:?}");
        self.calls.push(BackendCall::CopyFromResolveTarget(surface));
    }
}
