//! Shared test utilities for render target pool integration tests.

#![allow(dead_code)]

use std::collections::HashSet;

use scene_render_targets::backend::{BackendCall, DummyBackend, PlatformCapabilities};
use scene_render_targets::{PoolConfig, RenderTargetPool, Slot};

/// Platform presets the tests run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Desktop,
    Console,
    Minimal,
}

impl Platform {
    pub fn capabilities(self) -> PlatformCapabilities {
        match self {
            Platform::Desktop => PlatformCapabilities::desktop(),
            Platform::Console => PlatformCapabilities::console(),
            Platform::Minimal => PlatformCapabilities::minimal(),
        }
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn create_pool(platform: Platform) -> RenderTargetPool<DummyBackend> {
    create_pool_with(platform, PoolConfig::default())
}

pub fn create_pool_with(platform: Platform, config: PoolConfig) -> RenderTargetPool<DummyBackend> {
    init_logging();
    RenderTargetPool::new(DummyBackend::new(platform.capabilities()), config)
}

/// Raw ids of every texture and surface a slot currently holds.
pub fn slot_handles(pool: &RenderTargetPool<DummyBackend>, slot: Slot) -> Vec<u64> {
    let registry = pool.registry();
    [
        registry.texture(slot).raw(),
        registry.surface(slot).raw(),
        registry.texture_cube(slot).raw(),
    ]
    .into_iter()
    .filter(|raw| *raw != 0)
    .collect()
}

/// Raw ids destroyed in a call log.
pub fn released_handles(calls: &[BackendCall]) -> HashSet<u64> {
    calls
        .iter()
        .filter_map(|call| match call {
            BackendCall::DestroyTexture(handle) => Some(handle.raw()),
            BackendCall::DestroySurface(handle) => Some(handle.raw()),
            BackendCall::DestroySharedMemory(handle) => Some(handle.raw()),
            _ => None,
        })
        .collect()
}

pub fn count_allocations(calls: &[BackendCall]) -> usize {
    calls.iter().filter(|call| call.is_allocation()).count()
}

pub fn count_releases(calls: &[BackendCall]) -> usize {
    calls.iter().filter(|call| call.is_release()).count()
}
