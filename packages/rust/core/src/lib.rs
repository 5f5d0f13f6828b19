//! Course authoring and entitlement logic for CourseMind.
//!
//! This crate ties providers, Markdown rendering and storage together:
//! per-topic content generation, course-wide generation runs, progress
//! tracking and plan/quota resolution.

pub mod content;
pub mod course;
pub mod entitlement;
pub mod plans;

pub use content::{GeneratedContent, GeneratorConfig, TopicContentGenerator, TopicContext};
pub use course::{
    GenerationProgress, GenerationReport, NewCourse, SilentProgress, TopicFailure, create_course,
    draft_outline, generate_course, regenerate_topic, set_topic_completed,
};
pub use entitlement::{AccessLevel, Entitlement, EntitlementResolver, EntitlementStore};
pub use plans::{PlanCatalog, PlanLimits};
