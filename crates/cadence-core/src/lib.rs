//! # Cadence Core Library
//!
//! Recurrence and occurrence engine for recurring tasks and events. A series
//! is stored once, as a template plus a compact rule string; its occurrences
//! are computed on demand and merged with the few records a user leaves
//! behind (skipped dates, per-occurrence overrides, task completions).
//!
//! ## Core Modules
//!
//! - [`calendar`]: Civil-calendar math (ordinals, month lengths, clamping)
//! - [`codec`]: Rule string encoding, lenient decoding and summaries
//! - [`expander`]: Rule expansion into dates within a window
//! - [`recurrence`]: Merging expanded dates with stored records
//! - [`engine`]: Series operations (create, skip, complete, edit, split)
//! - [`repository`]: Storage traits and the SQLite implementation
//! - [`db`]: Database connection and migration management
//! - [`config`]: Layered engine configuration
//! - [`timezone`]: Timezone utilities and DST resolution
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence_core::{
//!     config::EngineConfig,
//!     engine::RecurrenceEngine,
//!     models::{EntityType, NewSeries, RecurrenceConfig, WeekdayCode},
//! };
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = RecurrenceEngine::connect(EngineConfig::load()?).await?;
//!
//!     let series = engine
//!         .create_series(NewSeries {
//!             entity_type: EntityType::Task,
//!             title: "Standup".to_string(),
//!             description: None,
//!             anchor_at: NaiveDate::from_ymd_opt(2024, 1, 1)
//!                 .unwrap()
//!                 .and_hms_opt(9, 30, 0)
//!                 .unwrap(),
//!             config: RecurrenceConfig::weekly(
//!                 "America/New_York",
//!                 [WeekdayCode::Mo, WeekdayCode::We, WeekdayCode::Fr],
//!             ),
//!         })
//!         .await?;
//!
//!     for occurrence in engine.get_upcoming(series.id, engine.default_upcoming()).await? {
//!         println!("{} {}", occurrence.occurrence_date, occurrence.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod calendar;
pub mod codec;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod expander;
pub mod models;
pub mod recurrence;
pub mod repository;
pub mod timezone;
