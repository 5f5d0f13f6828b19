//! Shared types, error model, and configuration for CourseMind.
//!
//! This crate is the foundation depended on by all other CourseMind crates.
//! It provides:
//! - [`CourseMindError`]: the unified error type
//! - Domain types ([`Course`], [`Chapter`], [`Topic`], [`Subscription`], [`Plan`])
//! - Configuration ([`AppConfig`], per-collaborator configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BillingConfig, DefaultsConfig, GeminiConfig, GeminiSection, GenerationConfig,
    UnsplashConfig, UnsplashSection, YouTubeConfig, YouTubeSection, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{CourseMindError, Result};
pub use types::{
    Chapter, ContentMode, Course, CourseOutline, ImageRef, OutlineChapter, OutlineTopic, Plan, Role,
    Subscription, SubscriptionStatus, Topic, User, course_progress, new_id,
};
