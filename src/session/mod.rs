//! Asynchronous invocation bookkeeping.
//!
//! Each in-flight asynchronous invocation is an [`AsyncSession`] keyed by an
//! [`InvocationId`] in the engine's [`InstanceRegistry`], so cancellation and
//! engine shutdown can find and terminate it.

mod id;
mod registry;
mod state;

pub use id::InvocationId;
pub use registry::{AsyncSession, InstanceRegistry};
pub use state::AsyncState;
