//! `timecapsule` - Shared video time capsules
//!
//! Groups of users record short clips into a capsule that stays sealed until
//! its unlock date. Once it unseals, members watch every clip in the order it
//! was recorded. This library holds the seal rule and unseal sweep, clip
//! ordering, invite helpers, the capsule service and local implementations of
//! its auth, document, object and notification backends.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod backend;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod objects;
pub mod ordering;
pub mod service;
pub mod sharing;
pub mod storage;
pub mod unseal;

pub use config::Config;
pub use error::{Error, ErrorCategory, Result};
pub use events::{CapsuleEvent, EventBus, Subscription};
pub use logging::init_logging;
pub use model::{Capsule, Clip, ScheduledNotification, User};
pub use objects::LocalObjectStore;
pub use service::{Backends, CapsuleService};
pub use storage::{Storage, StorageStats};
pub use unseal::{SealState, SweepHandle, UnsealSweeper};
