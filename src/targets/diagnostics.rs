//! Name lookup, extents and memory accounting for tooling

use std::borrow::Cow;

use log::info;

use super::aliasing::SharedMemoryBank;
use super::size::Extent;
use super::slot::Slot;
use super::RenderTargetPool;
use crate::backend::{GraphicsBackend, PixelFormat};

/// One allocated slot in a [`MemoryReport`]
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryReportEntry {
    pub slot: Slot,
    pub extent: Extent,
    pub format: PixelFormat,
    /// Bytes this slot adds to the total. Zero when it shares memory.
    pub bytes: u64,
    pub bank: Option<SharedMemoryBank>,
    /// Slot whose memory this one occupies.
    pub shares_with: Option<Slot>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryReport {
    pub entries: Vec<MemoryReportEntry>,
    /// Backing allocation size of every live bank.
    pub banks: Vec<(SharedMemoryBank, u64)>,
    pub total_bytes: u64,
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Name of a raw slot id. Ids outside the enumeration print as hex.
pub fn slot_name(index: u32) -> Cow<'static, str> {
    match Slot::from_index(index) {
        Some(slot) => Cow::Borrowed(slot.name()),
        None => Cow::Owned(format!("{index:08X}")),
    }
}

impl<B: GraphicsBackend> RenderTargetPool<B> {
    /// Extent of the slot's sizing category at the current principal size.
    pub fn extent(&self, slot: Slot) -> Extent {
        self.sizes.extent(slot.desc().category)
    }

    /// Like [`extent`](Self::extent), `{0, 0}` for unknown ids.
    pub fn extent_of_index(&self, index: u32) -> Extent {
        Slot::from_index(index)
            .map(|slot| self.extent(slot))
            .unwrap_or(Extent::ZERO)
    }

    pub fn slot_name(&self, index: u32) -> Cow<'static, str> {
        slot_name(index)
    }

    /// Per-slot footprint with every shared allocation counted once.
    pub fn memory_report(&self) -> MemoryReport {
        let mut report = MemoryReport::default();
        let mut first_in_bank: Vec<(SharedMemoryBank, Slot)> = Vec::new();

        for (slot, entry) in self.registry.iter() {
            let (bytes, shares_with) = match (entry.shared_from, entry.bank) {
                (Some(owner), _) => (0, Some(owner)),
                (None, Some(bank)) => match first_in_bank.iter().find(|(b, _)| *b == bank) {
                    Some(&(_, first)) => (0, Some(first)),
                    None => {
                        first_in_bank.push((bank, slot));
                        let size = self
                            .registry
                            .bank_allocation(bank)
                            .map(|(_, size, _)| size)
                            .unwrap_or(entry.footprint);
                        report.banks.push((bank, size));
                        (size, None)
                    }
                },
                (None, None) => (entry.footprint, None),
            };
            report.total_bytes += bytes;
            report.entries.push(MemoryReportEntry {
                slot,
                extent: entry.extent,
                format: entry.format,
                bytes,
                bank: entry.bank,
                shares_with,
            });
        }
        report
    }

    /// Log every allocated render target and return the total bytes.
    /// Returns 0 before the first `allocate`.
    pub fn dump_memory_usage(&self) -> u64 {
        if !self.is_initialized() {
            return 0;
        }

        let report = self.memory_report();
        info!("Listing scene render targets.");
        for entry in &report.entries {
            match entry.shares_with {
                Some(other) => info!(
                    "  RenderTarget {:2} {} sharing memory with {}",
                    entry.slot.index(),
                    entry.slot,
                    other
                ),
                None => info!(
                    "  RenderTarget {:2} {} using {:.2}Mb",
                    entry.slot.index(),
                    entry.slot,
                    megabytes(entry.bytes)
                ),
            }
        }
        for (bank, size) in &report.banks {
            info!("  {} {:.2}Mb", bank.name(), megabytes(*size));
        }
        info!(
            "{} render targets, {:.2}Mb total",
            report.entries.len(),
            megabytes(report.total_bytes)
        );
        report.total_bytes
    }
}
