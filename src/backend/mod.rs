//! Backend abstraction layer
//!
//! Provides the trait and types the pool uses to create, bind and resolve
//! render targets without knowing which graphics API sits underneath.

#[cfg(feature = "dummy")]
pub mod dummy;
pub mod traits;
pub mod types;

#[cfg(feature = "dummy")]
pub use dummy::{BackendCall, DummyBackend};
pub use traits::*;
pub use types::*;
