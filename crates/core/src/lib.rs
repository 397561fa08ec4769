pub mod config;
pub mod directory;
pub mod error;
pub mod event;
pub mod task;

pub use config::{ChatConfig, Config, PathsConfig, ScheduleConfig, TrackerConfig};
pub use directory::*;
pub use error::*;
pub use event::*;
pub use task::*;
