//! Shared-memory aliasing plan
//!
//! On platforms that expose explicit shared allocations, slots whose live
//! windows inside a frame never overlap are placed into one backing
//! allocation sized for the largest member:
//!
//! ```text
//!   bank              members (never bound at the same time)
//!   ────────────────  ──────────────────────────────────────────────
//!   SceneColor        SceneColor  SceneColorRaw  DominantShadowDepthZ
//!                     LightAttenuation1
//!   LightAttenuation  LightAttenuation0  FilterColor  AOInput  AOOutput
//!                     ShadowDepthZ  FogFrontfacesIntegralAccumulation
//!   Translucency      TranslucencyBuffer  HalfResPostProcess
//!   Velocity          VelocityBuffer  QuarterSizeSceneColor  FogBuffer
//!                     FogBackfacesIntegralAccumulation
//!   DofBlurResolve    DoFBlurBuffer  TranslucencyDominantLightAttenuation
//! ```
//!
//! Nothing at runtime stops two members from being bound together. The
//! [`BindTimeline`] records every bracket so a replayed frame can be checked
//! after the fact.

use std::collections::HashMap;

use super::slot::Slot;
use crate::backend::PlatformCapabilities;
use crate::error::{PoolError, PoolResult};

/// Named group of slots backed by one allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SharedMemoryBank {
    SceneColor,
    LightAttenuation,
    Translucency,
    Velocity,
    DofBlurResolve,
}

impl SharedMemoryBank {
    pub const ALL: [SharedMemoryBank; 5] = [
        SharedMemoryBank::SceneColor,
        SharedMemoryBank::LightAttenuation,
        SharedMemoryBank::Translucency,
        SharedMemoryBank::Velocity,
        SharedMemoryBank::DofBlurResolve,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SharedMemoryBank::SceneColor => "SceneColorMemory",
            SharedMemoryBank::LightAttenuation => "LightAttenuationMemory",
            SharedMemoryBank::Translucency => "TranslucencyMemory",
            SharedMemoryBank::Velocity => "VelocityMemory",
            SharedMemoryBank::DofBlurResolve => "DofBlurResolveMemory",
        }
    }

    pub fn members(self) -> &'static [Slot] {
        BANK_ASSIGNMENTS
            .iter()
            .find(|(bank, _)| *bank == self)
            .map(|(_, members)| *members)
            .unwrap_or(&[])
    }
}

pub static BANK_ASSIGNMENTS: [(SharedMemoryBank, &[Slot]); 5] = [
    (
        SharedMemoryBank::SceneColor,
        &[
            Slot::SceneColor,
            Slot::SceneColorRaw,
            Slot::DominantShadowDepthZ,
            Slot::LightAttenuation1,
        ],
    ),
    (
        SharedMemoryBank::LightAttenuation,
        &[
            Slot::LightAttenuation0,
            Slot::FilterColor,
            Slot::AoInput,
            Slot::AoOutput,
            Slot::ShadowDepthZ,
            Slot::FogFrontfacesIntegralAccumulation,
        ],
    ),
    (
        SharedMemoryBank::Translucency,
        &[Slot::TranslucencyBuffer, Slot::HalfResPostProcess],
    ),
    (
        SharedMemoryBank::Velocity,
        &[
            Slot::VelocityBuffer,
            Slot::QuarterSizeSceneColor,
            Slot::FogBuffer,
            Slot::FogBackfacesIntegralAccumulation,
        ],
    ),
    (
        SharedMemoryBank::DofBlurResolve,
        &[Slot::DofBlurBuffer, Slot::TranslucencyDominantLightAttenuation],
    ),
];

/// Decides whether a slot draws its memory from a bank.
///
/// The decision is fixed when the pool is created; without shared-memory
/// support every slot is allocated independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasingPlanner {
    enabled: bool,
}

impl AliasingPlanner {
    pub fn new(caps: &PlatformCapabilities) -> Self {
        Self {
            enabled: caps.shared_memory,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Static bank assignment, regardless of platform support.
    pub fn assigned_bank(slot: Slot) -> Option<SharedMemoryBank> {
        BANK_ASSIGNMENTS
            .iter()
            .find(|(_, members)| members.contains(&slot))
            .map(|(bank, _)| *bank)
    }

    /// Bank the slot is allocated from on this platform.
    pub fn bank_for(&self, slot: Slot) -> Option<SharedMemoryBank> {
        if self.enabled {
            Self::assigned_bank(slot)
        } else {
            None
        }
    }

    /// Largest footprint among the bank's members. `footprint` returns `None`
    /// for members that do not exist on this platform.
    pub fn resolve_bank_size(
        &self,
        bank: SharedMemoryBank,
        footprint: impl Fn(Slot) -> Option<u64>,
    ) -> u64 {
        bank.members()
            .iter()
            .filter_map(|&slot| footprint(slot))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindEventKind {
    Bind,
    Unbind,
}

/// One bracket transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindEvent {
    pub step: u64,
    pub slot: Slot,
    pub kind: BindEventKind,
    pub pass: &'static str,
}

/// Ordered record of every bind and unbind within a frame
#[derive(Debug, Clone, Default)]
pub struct BindTimeline {
    events: Vec<BindEvent>,
    next_step: u64,
}

impl BindTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, slot: Slot, kind: BindEventKind, pass: &'static str) {
        self.events.push(BindEvent {
            step: self.next_step,
            slot,
            kind,
            pass,
        });
        self.next_step += 1;
    }

    pub fn events(&self) -> &[BindEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Replay the events and fail on the first bind of a bank member while
    /// another member of the same bank is still live.
    pub fn validate(&self, planner: &AliasingPlanner) -> PoolResult<()> {
        let mut live: HashMap<SharedMemoryBank, Slot> = HashMap::new();
        for event in &self.events {
            let Some(bank) = planner.bank_for(event.slot) else {
                continue;
            };
            match event.kind {
                BindEventKind::Bind => {
                    if let Some(&other) = live.get(&bank) {
                        if other != event.slot {
                            return Err(PoolError::AliasingViolation {
                                bank,
                                live: other,
                                incoming: event.slot,
                            });
                        }
                    }
                    live.insert(bank, event.slot);
                }
                BindEventKind::Unbind => {
                    if live.get(&bank) == Some(&event.slot) {
                        live.remove(&bank);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_slot_has_at_most_one_bank() {
        for slot in Slot::ALL {
            let count = BANK_ASSIGNMENTS
                .iter()
                .filter(|(_, members)| members.contains(&slot))
                .count();
            assert!(count <= 1, "{slot} is in {count} banks");
        }
    }

    #[test]
    fn test_planner_is_pass_through_without_shared_memory() {
        let desktop = AliasingPlanner::new(&PlatformCapabilities::desktop());
        let console = AliasingPlanner::new(&PlatformCapabilities::console());
        assert_eq!(desktop.bank_for(Slot::AoInput), None);
        assert_eq!(
            console.bank_for(Slot::AoInput),
            Some(SharedMemoryBank::LightAttenuation)
        );
        assert_eq!(console.bank_for(Slot::AoHistory), None);
    }

    #[test]
    fn test_bank_size_is_largest_member() {
        let planner = AliasingPlanner::new(&PlatformCapabilities::console());
        let size = planner.resolve_bank_size(SharedMemoryBank::Translucency, |slot| match slot {
            Slot::TranslucencyBuffer => Some(100),
            Slot::HalfResPostProcess => Some(300),
            _ => None,
        });
        assert_eq!(size, 300);
        assert_eq!(
            planner.resolve_bank_size(SharedMemoryBank::Velocity, |_| None),
            0
        );
    }

    #[test]
    fn test_timeline_detects_overlap() {
        let planner = AliasingPlanner::new(&PlatformCapabilities::console());
        let mut timeline = BindTimeline::new();
        timeline.record(Slot::LightAttenuation0, BindEventKind::Bind, "LightAttenuation");
        timeline.record(Slot::AoInput, BindEventKind::Bind, "AOInput");

        assert_eq!(
            timeline.validate(&planner),
            Err(PoolError::AliasingViolation {
                bank: SharedMemoryBank::LightAttenuation,
                live: Slot::LightAttenuation0,
                incoming: Slot::AoInput,
            })
        );
    }

    #[test]
    fn test_timeline_accepts_sequential_use() {
        let planner = AliasingPlanner::new(&PlatformCapabilities::console());
        let mut timeline = BindTimeline::new();
        for (slot, pass) in [(Slot::AoInput, "AOInput"), (Slot::LightAttenuation0, "LightAttenuation")] {
            timeline.record(slot, BindEventKind::Bind, pass);
            timeline.record(slot, BindEventKind::Unbind, pass);
        }
        assert_eq!(timeline.events().len(), 4);
        assert_eq!(timeline.events()[3].step, 3);
        assert!(timeline.validate(&planner).is_ok());
    }
}
