//! Scopebus Core - Types, debounce/ledger state machines, frame boundary, and error handling

pub mod debounce;
pub mod error;
pub mod frames;
pub mod ledger;
pub mod params;
pub mod types;

pub use debounce::DebounceGate;
pub use error::{Error, Result};
pub use frames::{Device, FrameBatch, RawFrame};
pub use ledger::PromptLedger;
pub use params::{ParamValue, Params};
pub use types::*;
