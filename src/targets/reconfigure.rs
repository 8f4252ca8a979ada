//! Deferred reconfiguration requests
//!
//! Only the thread that owns the pool may touch its resources. Any other
//! thread clones a [`PoolCommandSender`] and posts commands, which the owner
//! applies in issue order from [`RenderTargetPool::process_commands`].
//!
//! [`RenderTargetPool::process_commands`]: super::RenderTargetPool::process_commands

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

/// A reconfiguration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolCommand {
    Allocate { width: u32, height: u32 },
    SetAoDownsampleFactor(u32),
    ReleaseAll,
}

type CommandQueue = Arc<Mutex<VecDeque<PoolCommand>>>;

/// Cloneable handle for posting commands from any thread
#[derive(Debug, Clone)]
pub struct PoolCommandSender {
    queue: CommandQueue,
}

impl PoolCommandSender {
    pub fn send(&self, command: PoolCommand) {
        log::trace!("Queued {command:?}");
        self.queue.lock().push_back(command);
    }

    pub fn request_allocate(&self, width: u32, height: u32) {
        self.send(PoolCommand::Allocate { width, height });
    }

    pub fn request_ao_downsample_factor(&self, factor: u32) {
        self.send(PoolCommand::SetAoDownsampleFactor(factor));
    }

    pub fn request_release_all(&self) {
        self.send(PoolCommand::ReleaseAll);
    }
}

/// Owning side of the command queue
///
/// The owner thread is claimed by the first [`claim_current_thread`] call,
/// so a pool may be built on one thread and handed to the render thread.
///
/// [`claim_current_thread`]: ReconfigurationController::claim_current_thread
#[derive(Debug)]
pub struct ReconfigurationController {
    owner: Option<ThreadId>,
    queue: CommandQueue,
}

impl ReconfigurationController {
    pub fn new() -> Self {
        Self {
            owner: None,
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn sender(&self) -> PoolCommandSender {
        PoolCommandSender {
            queue: Arc::clone(&self.queue),
        }
    }

    /// `None` until a thread has claimed the controller.
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Make the calling thread the owner, replacing any previous one.
    pub fn bind_to_current_thread(&mut self) {
        let current = thread::current().id();
        if let Some(previous) = self.owner.replace(current) {
            if previous != current {
                log::debug!("Render target pool moved from {previous:?} to {current:?}");
            }
        }
    }

    /// Claim the calling thread if no owner is set yet. Returns whether the
    /// calling thread is the owner.
    pub fn claim_current_thread(&mut self) -> bool {
        let current = thread::current().id();
        *self.owner.get_or_insert(current) == current
    }

    /// True on the owner thread, and on any thread before one is claimed.
    pub fn is_owner_thread(&self) -> bool {
        self.owner
            .map_or(true, |owner| owner == thread::current().id())
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Take every queued command, oldest first.
    pub fn drain(&self) -> Vec<PoolCommand> {
        self.queue.lock().drain(..).collect()
    }
}

impl Default for ReconfigurationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_drain_in_issue_order() {
        let controller = ReconfigurationController::new();
        let sender = controller.sender();
        sender.request_allocate(640, 480);
        sender.request_ao_downsample_factor(4);
        sender.request_release_all();
        assert_eq!(controller.pending(), 3);

        assert_eq!(
            controller.drain(),
            vec![
                PoolCommand::Allocate {
                    width: 640,
                    height: 480
                },
                PoolCommand::SetAoDownsampleFactor(4),
                PoolCommand::ReleaseAll,
            ]
        );
        assert_eq!(controller.pending(), 0);
    }

    #[test]
    fn test_sender_works_from_other_threads() {
        let controller = ReconfigurationController::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sender = controller.sender();
                thread::spawn(move || sender.request_allocate(100 * (i + 1), 100))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(controller.drain().len(), 4);
        assert!(controller.is_owner_thread());
    }

    #[test]
    fn test_first_claim_sets_owner() {
        let mut controller = ReconfigurationController::new();
        assert_eq!(controller.owner(), None);

        let (claimed, controller) = thread::spawn(move || {
            let claimed = controller.claim_current_thread();
            (claimed, controller)
        })
        .join()
        .unwrap();
        assert!(claimed);
        assert!(!controller.is_owner_thread());

        let mut controller = controller;
        assert!(!controller.claim_current_thread());
        controller.bind_to_current_thread();
        assert_eq!(controller.owner(), Some(thread::current().id()));
        assert!(controller.claim_current_thread());
    }
}
