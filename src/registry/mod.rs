//! Shared queen state: who is connected and who serves which mount.

mod mounts;
mod sessions;

pub use mounts::{MountError, MountTable};
pub use sessions::{BandHandle, BandPool, Checkout, ExchangeJob, SessionEntry, SessionRegistry};
