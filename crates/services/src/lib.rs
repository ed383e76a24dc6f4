//! # services
//!
//! Application logic for the art generator and the social agent. Everything
//! here talks to the outside world only through the `domains` ports.

pub mod activity;
pub mod clock;
pub mod gate;
pub mod generation;
pub mod prompt;
pub mod resolver;
pub mod retention;
pub mod scheduler;
pub mod social;

pub use activity::ActivityLog;
pub use clock::{local_day_bounds, SystemClock};
pub use gate::QuotaGate;
pub use generation::{
    AutoGenerationTask, GenerationConfig, GenerationDeps, GenerationError, GenerationOutcome,
    GenerationReport, GenerationService,
};
pub use prompt::{character_system_prompt, default_character, ensure_character};
pub use resolver::{ImageResolver, Resolved};
pub use retention::LogRetention;
pub use scheduler::{parse_time_of_day, ScheduledTask, Scheduler};
pub use social::{AutoPostTask, PostOutcome, RecordOnlyPublisher, SocialAgent, SocialStats};
