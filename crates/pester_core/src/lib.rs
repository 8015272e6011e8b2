//! Trigger engine for pester: scope chain for pack scripts, weighted rolls
//! and the tick-driven engine that turns them into actions.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod roll;
pub mod scope;
pub mod value;

pub use error::{ConfigError, RollError, ScopeError};
pub use roll::{Chance, RollMode, RollTarget, roll, roll_targets};
pub use scope::{FrameId, ScopeTree};
pub use value::{Function, Value};
