//! Slot-keyed resource storage
//!
//! The registry is the only owner of the textures, surfaces and shared
//! allocations the pool creates. Everything handed out is a copy of a handle;
//! unallocated or unknown slots answer with the `NULL` sentinels.

use std::collections::HashMap;

use log::{debug, warn};

use super::aliasing::SharedMemoryBank;
use super::size::Extent;
use super::slot::{Slot, Storage, SLOT_COUNT};
use crate::backend::{
    GraphicsBackend, PixelFormat, SharedMemoryHandle, SurfaceDescriptor, SurfaceHandle,
    TextureDescriptor, TextureDimension, TextureHandle, TextureUsage,
};
use crate::error::PoolResult;

/// Everything needed to create one slot's resources.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    pub slot: Slot,
    pub extent: Extent,
    pub format: PixelFormat,
    pub multisample: bool,
    pub storage: Storage,
    /// Create a sampleable texture next to the surface.
    pub texture: bool,
    /// Bank to place the texture in and the size the bank must have.
    pub bank: Option<(SharedMemoryBank, u64)>,
}

impl AllocationRequest {
    /// Bytes the slot occupies at its extent.
    pub fn footprint(&self) -> u64 {
        let faces = if self.storage == Storage::Cube { 6 } else { 1 };
        self.extent.area() * self.format.bytes_per_pixel() as u64 * faces
    }
}

/// Resources owned by one slot
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub texture: Option<TextureHandle>,
    pub surface: Option<SurfaceHandle>,
    pub cube: Option<TextureHandle>,
    pub extent: Extent,
    pub format: PixelFormat,
    pub footprint: u64,
    pub bank: Option<SharedMemoryBank>,
    /// Set when the handles belong to another slot.
    pub shared_from: Option<Slot>,
}

#[derive(Debug, Clone, Copy)]
struct BankAllocation {
    memory: SharedMemoryHandle,
    size: u64,
    members: u32,
}

/// Fixed table of slot entries plus the live shared allocations.
#[derive(Debug)]
pub struct ResourceRegistry {
    entries: Vec<Option<ResourceEntry>>,
    banks: HashMap<SharedMemoryBank, BankAllocation>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            entries: vec![None; SLOT_COUNT],
            banks: HashMap::new(),
        }
    }

    pub fn entry(&self, slot: Slot) -> Option<&ResourceEntry> {
        self.entries[slot.index()].as_ref()
    }

    pub fn is_allocated(&self, slot: Slot) -> bool {
        self.entry(slot).is_some()
    }

    pub fn texture(&self, slot: Slot) -> TextureHandle {
        self.entry(slot)
            .and_then(|entry| entry.texture)
            .unwrap_or(TextureHandle::NULL)
    }

    pub fn surface(&self, slot: Slot) -> SurfaceHandle {
        self.entry(slot)
            .and_then(|entry| entry.surface)
            .unwrap_or(SurfaceHandle::NULL)
    }

    pub fn texture_cube(&self, slot: Slot) -> TextureHandle {
        self.entry(slot)
            .and_then(|entry| entry.cube)
            .unwrap_or(TextureHandle::NULL)
    }

    /// Texture for a raw slot id; ids outside the enumeration are null.
    pub fn texture_by_index(&self, index: u32) -> TextureHandle {
        Slot::from_index(index)
            .map(|slot| self.texture(slot))
            .unwrap_or(TextureHandle::NULL)
    }

    pub fn surface_by_index(&self, index: u32) -> SurfaceHandle {
        Slot::from_index(index)
            .map(|slot| self.surface(slot))
            .unwrap_or(SurfaceHandle::NULL)
    }

    /// Allocated entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &ResourceEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|entry| (Slot::ALL[index], entry)))
    }

    pub fn allocated_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    /// Backing allocation and member count of a live bank.
    pub fn bank_allocation(&self, bank: SharedMemoryBank) -> Option<(SharedMemoryHandle, u64, u32)> {
        self.banks
            .get(&bank)
            .map(|alloc| (alloc.memory, alloc.size, alloc.members))
    }

    /// Create the resources described by `request` unless the slot already
    /// has them. On failure nothing is left behind.
    pub fn allocate<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        request: &AllocationRequest,
    ) -> PoolResult<()> {
        if self.is_allocated(request.slot) || request.extent.is_zero() {
            return Ok(());
        }

        let footprint = request.footprint();
        let bank = match request.bank {
            Some((bank, size)) => self.acquire_bank(backend, bank, size, footprint, request.slot)?,
            None => None,
        };
        let memory = bank.and_then(|bank| self.banks.get(&bank).map(|alloc| alloc.memory));

        match Self::create_resources(backend, request, memory) {
            Ok(mut entry) => {
                entry.bank = bank;
                entry.footprint = footprint;
                if let Some(alloc) = bank.and_then(|bank| self.banks.get_mut(&bank)) {
                    alloc.members += 1;
                }
                debug!(
                    "Allocated render target {} {}x{} {:?}{}",
                    request.slot,
                    request.extent.width,
                    request.extent.height,
                    request.format,
                    bank.map(|bank| format!(" in {}", bank.name()))
                        .unwrap_or_default()
                );
                self.entries[request.slot.index()] = Some(entry);
                Ok(())
            }
            Err(err) => {
                if let Some(bank) = bank {
                    self.drop_bank_if_empty(backend, bank);
                }
                Err(err)
            }
        }
    }

    fn acquire_bank<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        bank: SharedMemoryBank,
        size: u64,
        footprint: u64,
        slot: Slot,
    ) -> PoolResult<Option<SharedMemoryBank>> {
        if let Some(alloc) = self.banks.get(&bank) {
            if alloc.size < footprint {
                warn!(
                    "{slot} needs {footprint} bytes but {} holds {}, allocating it separately",
                    bank.name(),
                    alloc.size
                );
                return Ok(None);
            }
            return Ok(Some(bank));
        }

        let size = size.max(footprint);
        let memory = backend.create_shared_memory(bank.name(), size)?;
        debug!("Created shared memory {} ({size} bytes)", bank.name());
        self.banks.insert(
            bank,
            BankAllocation {
                memory,
                size,
                members: 0,
            },
        );
        Ok(Some(bank))
    }

    fn drop_bank_if_empty<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        bank: SharedMemoryBank,
    ) {
        if let Some(alloc) = self.banks.get(&bank).copied() {
            if alloc.members == 0 {
                backend.destroy_shared_memory(alloc.memory);
                self.banks.remove(&bank);
                debug!("Released shared memory {}", bank.name());
            }
        }
    }

    fn create_resources<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        request: &AllocationRequest,
        memory: Option<SharedMemoryHandle>,
    ) -> PoolResult<ResourceEntry> {
        let label = Some(request.slot.name().to_string());
        let depth = request.format.is_depth();
        let mut texture_usage = TextureUsage::RESOLVE_TARGET;
        if depth {
            texture_usage = texture_usage | TextureUsage::DEPTH_STENCIL;
        }

        let resolve_target = match request.storage {
            Storage::Cube => Some(TextureDimension::Cube),
            _ if request.texture => Some(TextureDimension::D2),
            _ => None,
        };
        let texture = match resolve_target {
            Some(dimension) => Some(backend.create_texture(&TextureDescriptor {
                label: label.clone(),
                width: request.extent.width,
                height: request.extent.height,
                mip_levels: 1,
                format: request.format,
                dimension,
                usage: texture_usage,
                shared_memory: memory,
            })?),
            None => None,
        };

        let surface = if request.storage == Storage::TextureOnly {
            None
        } else {
            let mut usage = TextureUsage::NONE;
            if memory.is_some() || texture.is_none() {
                usage = usage | TextureUsage::DEDICATED;
            }
            if request.multisample {
                usage = usage | TextureUsage::MULTISAMPLE;
            }
            if depth {
                usage = usage | TextureUsage::DEPTH_STENCIL;
            }
            let desc = SurfaceDescriptor {
                label,
                width: request.extent.width,
                height: request.extent.height,
                format: request.format,
                resolve_target: texture,
                usage,
            };
            match backend.create_targetable_surface(&desc) {
                Ok(surface) => Some(surface),
                Err(err) => {
                    if let Some(texture) = texture {
                        backend.destroy_texture(texture);
                    }
                    return Err(err.into());
                }
            }
        };

        let (texture, cube) = match request.storage {
            Storage::Cube => (None, texture),
            _ => (texture, None),
        };
        Ok(ResourceEntry {
            texture,
            surface,
            cube,
            extent: request.extent,
            format: request.format,
            footprint: 0,
            bank: None,
            shared_from: None,
        })
    }

    /// Make `slot` use the handles already allocated for `owner`.
    pub fn share(&mut self, slot: Slot, owner: Slot) {
        if self.is_allocated(slot) {
            return;
        }
        let Some(entry) = self.entry(owner).cloned() else {
            return;
        };
        debug!("Render target {slot} shares resources with {owner}");
        self.entries[slot.index()] = Some(ResourceEntry {
            bank: None,
            shared_from: Some(owner),
            ..entry
        });
    }

    /// Release a slot's resources. Releasing an unallocated slot does nothing.
    ///
    /// Slots sharing this slot's handles are cleared with it. Returns whether
    /// anything was released.
    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, slot: Slot) -> bool {
        let Some(entry) = self.entries[slot.index()].take() else {
            return false;
        };

        for other in self.entries.iter_mut() {
            if other.as_ref().and_then(|e| e.shared_from) == Some(slot) {
                *other = None;
            }
        }

        if entry.shared_from.is_some() {
            debug!("Released render target {slot} (shared)");
            return true;
        }

        if let Some(surface) = entry.surface {
            backend.destroy_surface(surface);
        }
        if let Some(texture) = entry.texture {
            backend.destroy_texture(texture);
        }
        if let Some(cube) = entry.cube {
            backend.destroy_texture(cube);
        }
        if let Some(bank) = entry.bank {
            if let Some(alloc) = self.banks.get_mut(&bank) {
                alloc.members = alloc.members.saturating_sub(1);
            }
            self.drop_bank_if_empty(backend, bank);
        }
        debug!("Released render target {slot}");
        true
    }

    /// Release every slot and every shared allocation. Returns the number of
    /// slots that held resources.
    pub fn release_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let before = self.allocated_count();
        for slot in Slot::ALL {
            self.release(backend, slot);
        }
        for (bank, alloc) in self.banks.drain() {
            warn!("{} outlived its members, releasing it", bank.name());
            debug_assert_eq!(alloc.members, 0);
            backend.destroy_shared_memory(alloc.memory);
        }
        before
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
