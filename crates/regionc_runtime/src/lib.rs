//! Loads natively compiled regions into a running process and calls them.

pub mod entry;
pub mod error;
pub mod loader;

pub use crate::entry::{
    LIVE_ENTRY_SYMBOL, ManagedThread, NativeEntryPoint, RawEntryPoint, ResultCell,
};
pub use crate::error::LoaderError;
pub use crate::loader::RuntimeLoader;
