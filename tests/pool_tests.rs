//! Integration tests for render target sizing, allocation and bracketing.
//!
//! Every test drives a [`RenderTargetPool`] over the recording
//! [`DummyBackend`](scene_render_targets::backend::DummyBackend) and asserts
//! on the pool state and the backend call log.
//!
//! ```bash
//! cargo test --test pool_tests
//! ```

mod common;

use std::collections::HashSet;

use rstest::rstest;

use common::{
    count_releases, create_pool, create_pool_with, released_handles, slot_handles, Platform,
};
use scene_render_targets::backend::{BackendCall, SurfaceHandle};
use scene_render_targets::passes::SceneColorMode;
use scene_render_targets::targets::{SizeConfig, SLOT_COUNT};
use scene_render_targets::{
    Extent, FeatureSettings, FinishParams, Pass, PoolConfig, PoolError, ShadowSettings, Slot,
    SlotState,
};

// ============================================================================
// Sizing
// ============================================================================

/// The sizes from a 1920x1080 frame, and a repeated AO factor is a no-op.
#[test]
fn test_full_hd_scenario() {
    let mut pool = create_pool(Platform::Desktop);
    assert!(pool.allocate(1920, 1080));
    assert_eq!(pool.principal_size(), Extent::new(1920, 1080));
    assert_eq!(pool.sizes().filter_extent(), Extent::new(482, 272));
    assert_eq!(pool.extent(Slot::FilterColor), Extent::new(482, 272));
    assert_eq!(pool.extent(Slot::AoInput), Extent::new(960, 540));

    pool.ensure_all_allocated();
    pool.backend_mut().take_calls();
    assert!(!pool.set_ao_downsample_factor(2));
    assert_eq!(count_releases(pool.backend().calls()), 0);
    assert!(pool.backend().calls().is_empty());
}

#[rstest]
#[case::single(&[(1920, 1080)], (1920, 1080))]
#[case::rounds_up(&[(1001, 333)], (1008, 336))]
#[case::grows_per_axis(&[(1280, 720), (640, 1024)], (1280, 1024))]
#[case::shrink_is_ignored(&[(1920, 1080), (800, 600), (1921, 10)], (1928, 1080))]
fn test_principal_size_only_grows(#[case] requests: &[(u32, u32)], #[case] expected: (u32, u32)) {
    let mut pool = create_pool(Platform::Console);
    for &(width, height) in requests {
        let aligned = SizeConfig::align(width, height);
        let current = pool.principal_size();
        let reallocates = !current.contains(aligned);
        if pool.is_initialized() {
            pool.ensure_all_allocated();
        }
        pool.backend_mut().take_calls();

        assert_eq!(pool.allocate(width, height), reallocates);
        if !reallocates {
            assert_eq!(count_releases(pool.backend().calls()), 0);
        }
    }
    assert_eq!(pool.principal_size(), Extent::new(expected.0, expected.1));
}

#[rstest]
#[case::full_hd(1920, 1080, 2)]
#[case::odd(1001, 333, 3)]
#[case::tiny(8, 8, 16)]
fn test_derived_sizes_are_pure(#[case] width: u32, #[case] height: u32, #[case] factor: u32) {
    let mut sizes = SizeConfig::new(factor, ShadowSettings::default(), false);
    sizes.set_principal_size(width, height);
    let p = sizes.principal();

    assert_eq!(
        sizes.filter_extent(),
        Extent::new(p.width / 4 + 2, p.height / 4 + 2)
    );
    assert_eq!(
        sizes.ao_extent(),
        Extent::new((p.width / factor).max(1), (p.height / factor).max(1))
    );
    assert_eq!(
        sizes.translucency_extent(),
        Extent::new((p.width / 2).max(1), (p.height / 2).max(1))
    );

    let mut again = SizeConfig::new(factor, ShadowSettings::default(), false);
    again.set_principal_size(width, height);
    assert_eq!(again, sizes);
}

// ============================================================================
// Allocation
// ============================================================================

#[rstest]
#[case::desktop(Platform::Desktop)]
#[case::console(Platform::Console)]
#[case::minimal(Platform::Minimal)]
fn test_release_is_idempotent(#[case] platform: Platform) {
    let mut pool = create_pool(platform);
    pool.allocate(256, 256);
    pool.ensure_allocated(Slot::SceneColor).unwrap();

    assert!(pool.release(Slot::SceneColor));
    pool.backend_mut().take_calls();
    assert!(!pool.release(Slot::SceneColor));
    assert!(!pool.registry().is_allocated(Slot::SceneColor));
    assert!(pool.backend().calls().is_empty());
}

/// Changing the AO factor touches the AO working set and nothing else.
#[rstest]
#[case::desktop(Platform::Desktop)]
#[case::console(Platform::Console)]
fn test_ao_factor_change_reallocates_only_ao(#[case] platform: Platform) {
    let mut pool = create_pool(platform);
    pool.allocate(1920, 1080);
    pool.ensure_all_allocated();

    let before: Vec<(Slot, Vec<u64>)> = Slot::ALL
        .iter()
        .map(|&slot| (slot, slot_handles(&pool, slot)))
        .collect();
    let ao_handles: HashSet<u64> = Slot::AMBIENT_OCCLUSION
        .iter()
        .flat_map(|&slot| slot_handles(&pool, slot))
        .collect();
    pool.backend_mut().take_calls();

    assert!(pool.set_ao_downsample_factor(4));
    let calls = pool.backend_mut().take_calls();
    let released = released_handles(&calls);
    assert!(!released.is_empty());
    assert!(released.is_subset(&ao_handles));

    for (slot, handles) in before {
        if Slot::AMBIENT_OCCLUSION.contains(&slot) {
            assert!(pool.registry().is_allocated(slot), "{slot} not reallocated");
            assert_ne!(slot_handles(&pool, slot), handles);
        } else {
            assert_eq!(slot_handles(&pool, slot), handles, "{slot} changed");
        }
    }
    assert_eq!(pool.extent(Slot::AoHistory), Extent::new(480, 270));
    assert!(pool.ao_history_needs_clear());
}

#[test]
fn test_disabling_a_feature_releases_its_slots() {
    let mut pool = create_pool(Platform::Desktop);
    pool.allocate(256, 256);
    pool.ensure_all_allocated();

    let features = FeatureSettings {
        allow_ambient_occlusion: false,
        ..*pool.features()
    };
    assert!(pool.update_features(features) >= 2);
    for slot in Slot::AMBIENT_OCCLUSION {
        assert!(!pool.registry().is_allocated(slot));
        assert!(pool.get_texture(slot).is_null());
    }

    pool.backend_mut().take_calls();
    let pass = Pass::AoInput {
        downsized_depth: true,
    };
    pool.begin(pass);
    pool.finish(pass, FinishParams::default());
    assert!(pool.backend().calls().is_empty());
}

#[test]
fn test_out_of_memory_binds_null_and_recovers() {
    let mut pool = create_pool(Platform::Console);
    pool.allocate(256, 256);
    pool.backend_mut().set_fail_allocations(true);

    pool.begin(Pass::SCENE_COLOR);
    assert_eq!(pool.slot_state(Slot::SceneColor), SlotState::Bound);
    assert!(pool.backend().calls().contains(&BackendCall::SetRenderTarget {
        color: SurfaceHandle::NULL,
        depth: SurfaceHandle::NULL,
    }));
    pool.finish(Pass::SCENE_COLOR, FinishParams::default());
    assert!(pool.get_texture(Slot::SceneColor).is_null());

    pool.backend_mut().set_fail_allocations(false);
    pool.ensure_allocated(Slot::SceneColor).unwrap();
    assert!(!pool.get_texture(Slot::SceneColor).is_null());
}

#[test]
fn test_release_all_frees_everything() {
    let mut pool = create_pool(Platform::Console);
    pool.allocate(512, 512);
    pool.ensure_all_allocated();
    pool.release_all();
    assert_eq!(pool.backend().live_resource_count(), 0);
    assert_eq!(pool.dump_memory_usage(), 0);
}

// ============================================================================
// Null safety
// ============================================================================

#[test]
fn test_null_handles_for_missing_slots() {
    let mut pool = create_pool(Platform::Desktop);
    assert!(pool.get_texture(Slot::SceneColor).is_null());

    pool.allocate(256, 256);
    pool.ensure_all_allocated();
    assert!(pool.get_texture_by_index(SLOT_COUNT as u32 + 5).is_null());
    assert!(pool.get_surface_by_index(u32::MAX).is_null());
    assert!(pool.get_texture(Slot::DofBlurBuffer).is_null());
    assert!(pool.get_surface(Slot::FogBuffer).is_null());
    assert!(!pool.get_texture_cube(Slot::CubeShadowDepthZ0).is_null());
    assert_eq!(pool.slot_name(SLOT_COUNT as u32), "0000002F");
}

// ============================================================================
// Bracketing
// ============================================================================

#[test]
fn test_scope_guard_nests_and_finishes() {
    let mut pool = create_pool(Platform::Desktop);
    pool.allocate(256, 256);
    {
        let mut scene = pool.scope(Pass::SceneColor {
            usage: Default::default(),
            mode: SceneColorMode::GBuffer,
        });
        assert_eq!(scene.pool().slot_state(Slot::SceneColor), SlotState::Bound);
        {
            let _velocity = scene.pool().scope(Pass::Velocities);
        }
        assert_eq!(
            scene.pool().slot_state(Slot::VelocityBuffer),
            SlotState::Resolved
        );
        scene.set_finish_params(FinishParams::raw());
    }
    assert_eq!(pool.slot_state(Slot::SceneColor), SlotState::Unbound);
    assert_eq!(pool.slot_state(Slot::DiffuseGBuffer), SlotState::Unbound);
}

#[test]
fn test_try_begin_reports_reentry() {
    let mut pool = create_pool(Platform::Desktop);
    pool.allocate(256, 256);
    pool.try_begin(&Pass::SCENE_COLOR).unwrap();
    assert_eq!(
        pool.try_begin(&Pass::PostTranslucencyDepth),
        Err(PoolError::ReentrantBind {
            slot: Slot::SceneColor,
            pass: "PostTranslucencyDepth"
        })
    );
    pool.try_finish(&Pass::SCENE_COLOR, &FinishParams::default())
        .unwrap();
    assert_eq!(
        pool.try_finish(&Pass::SCENE_COLOR, &FinishParams::default()),
        Err(PoolError::NotBound {
            slot: Slot::SceneColor,
            pass: "SceneColor"
        })
    );
}

#[test]
fn test_try_begin_before_allocate_is_not_configured() {
    let mut pool = create_pool(Platform::Desktop);
    assert_eq!(
        pool.try_begin(&Pass::SCENE_COLOR),
        Err(PoolError::NotConfigured)
    );
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "already bound")]
fn test_double_begin_asserts() {
    let mut pool = create_pool(Platform::Desktop);
    pool.allocate(256, 256);
    pool.begin(Pass::LutBlend);
    pool.begin(Pass::LutBlend);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "is not bound")]
fn test_finish_without_begin_asserts() {
    let mut pool = create_pool(Platform::Desktop);
    pool.allocate(256, 256);
    pool.finish(Pass::HitProxies, FinishParams::default());
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "not configured")]
fn test_begin_before_allocate_asserts() {
    let mut pool = create_pool(Platform::Desktop);
    pool.begin(Pass::SCENE_COLOR);
}

// ============================================================================
// Reconfiguration and diagnostics
// ============================================================================

#[test]
fn test_commands_from_another_thread() {
    let mut pool = create_pool(Platform::Desktop);
    let sender = pool.command_sender();
    std::thread::spawn(move || {
        sender.request_allocate(1280, 720);
        sender.request_ao_downsample_factor(4);
    })
    .join()
    .unwrap();

    assert_eq!(pool.principal_size(), Extent::ZERO);
    assert_eq!(pool.process_commands(), 2);
    assert_eq!(pool.principal_size(), Extent::new(1280, 720));
    assert_eq!(pool.extent(Slot::AoInput), Extent::new(320, 180));
    assert_eq!(pool.process_commands(), 0);
}

#[test]
fn test_pool_built_elsewhere_runs_on_render_thread() {
    let pool = create_pool(Platform::Desktop);
    let sender = pool.command_sender();
    sender.request_allocate(640, 360);

    let mut pool = std::thread::spawn(move || {
        let mut pool = pool;
        assert_eq!(pool.process_commands(), 1);
        pool
    })
    .join()
    .unwrap();
    assert_eq!(pool.principal_size(), Extent::new(640, 360));

    pool.bind_to_current_thread();
    sender.request_allocate(1280, 720);
    assert_eq!(pool.process_commands(), 1);
    assert_eq!(pool.principal_size(), Extent::new(1280, 720));
}

#[test]
fn test_memory_dump_counts_banks_once() {
    let mut pool = create_pool(Platform::Console);
    pool.allocate(1280, 720);
    pool.ensure_all_allocated();

    let unshared: u64 = pool
        .registry()
        .iter()
        .filter(|(_, entry)| entry.shared_from.is_none())
        .map(|(_, entry)| entry.footprint)
        .sum();
    let total = pool.dump_memory_usage();
    assert_eq!(total, pool.memory_report().total_bytes);
    assert!(total > 0);
    assert!(total < unshared);
}

#[test]
fn test_high_precision_gbuffers() {
    let mut pool = create_pool_with(
        Platform::Desktop,
        PoolConfig {
            features: FeatureSettings {
                high_precision_gbuffers: true,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    pool.allocate(64, 64);
    pool.ensure_allocated(Slot::DiffuseGBuffer).unwrap();
    let entry = pool.registry().entry(Slot::DiffuseGBuffer).unwrap();
    assert_eq!(
        entry.format,
        scene_render_targets::backend::PixelFormat::Rgba16Float
    );
}
