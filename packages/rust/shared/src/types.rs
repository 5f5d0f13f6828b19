//! Core domain types for CourseMind courses and billing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CourseMindError;

/// Generate a new time-sortable identifier (UUID v7) for any entity.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Selects which media type accompanies a topic's generated theory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentMode {
    TextImage,
    VideoText,
}

impl ContentMode {
    /// Storage / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextImage => "TEXT_IMAGE",
            Self::VideoText => "VIDEO_TEXT",
        }
    }
}

impl std::str::FromStr for ContentMode {
    type Err = CourseMindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "TEXT_IMAGE" => Ok(Self::TextImage),
            "VIDEO_TEXT" => Ok(Self::VideoText),
            other => Err(CourseMindError::validation(format!(
                "unknown content mode '{other}': expected TEXT_IMAGE or VIDEO_TEXT"
            ))),
        }
    }
}

impl std::fmt::Display for ContentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    Free,
    Monthly,
    Yearly,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    /// `MONTHLY` and `YEARLY` are paid; `FREE` is not.
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Monthly | Self::Yearly)
    }
}

impl std::str::FromStr for Plan {
    type Err = CourseMindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(CourseMindError::validation(format!("unknown plan '{other}'"))),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription status as written by the billing webhook.
///
/// Lifecycle: `INCOMPLETE → ACTIVE → {CANCELED, EXPIRED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Expired,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Canceled => "CANCELED",
            Self::Expired => "EXPIRED",
            Self::Incomplete => "INCOMPLETE",
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = CourseMindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "CANCELED" | "CANCELLED" => Ok(Self::Canceled),
            "EXPIRED" => Ok(Self::Expired),
            "INCOMPLETE" => Ok(Self::Incomplete),
            other => Err(CourseMindError::validation(format!(
                "unknown subscription status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform role of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = CourseMindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            other => Err(CourseMindError::validation(format!("unknown role '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Media references
// ---------------------------------------------------------------------------

/// Image attached to a generated topic.
///
/// `Fallback` marks the placeholder served when image search was unconfigured,
/// failed, or returned nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ImageRef {
    Found(String),
    Fallback(String),
}

impl ImageRef {
    pub fn url(&self) -> &str {
        match self {
            Self::Found(url) | Self::Fallback(url) => url,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A platform user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A generated course and its ordered chapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Natural language the theory is generated in.
    pub language: String,
    pub mode: ContentMode,
    /// 0–100, derived from completed/total topics.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<Chapter>,
}

impl Course {
    /// Iterate every topic in chapter order.
    pub fn topics(&self) -> impl Iterator<Item = (&Chapter, &Topic)> {
        self.chapters
            .iter()
            .flat_map(|chapter| chapter.topics.iter().map(move |topic| (chapter, topic)))
    }
}

/// An ordered chapter of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Topic>,
}

/// An ordered topic of a chapter, filled in by content generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub chapter_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub position: u32,
    pub completed: bool,
    /// Rendered theory HTML (absent until generated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theory_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

impl Topic {
    pub fn is_generated(&self) -> bool {
        self.theory_html.is_some()
    }
}

/// A billing subscription record. Several may exist per user (history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// A fresh subscription record stamped with the current time.
    pub fn new(user_id: impl Into<String>, plan: Plan, status: SubscriptionStatus) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            plan,
            status,
            customer_ref: None,
            subscription_ref: None,
            price_ref: None,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Outline (input to course creation)
// ---------------------------------------------------------------------------

/// The chapter/topic skeleton of a course before any content is generated.
///
/// Authored by hand (JSON file) or produced by an outline generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseOutline {
    pub chapters: Vec<OutlineChapter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineChapter {
    pub title: String,
    pub topics: Vec<OutlineTopic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineTopic {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CourseOutline {
    /// Total number of topics across all chapters.
    pub fn topic_count(&self) -> usize {
        self.chapters.iter().map(|c| c.topics.len()).sum()
    }

    /// Check the outline is non-empty and every title is filled in.
    pub fn validate(&self) -> Result<(), CourseMindError> {
        if self.chapters.is_empty() {
            return Err(CourseMindError::validation("outline has no chapters"));
        }
        for (i, chapter) in self.chapters.iter().enumerate() {
            if chapter.title.trim().is_empty() {
                return Err(CourseMindError::validation(format!(
                    "chapter {} has an empty title",
                    i + 1
                )));
            }
            if chapter.topics.is_empty() {
                return Err(CourseMindError::validation(format!(
                    "chapter '{}' has no topics",
                    chapter.title
                )));
            }
            if chapter.topics.iter().any(|t| t.title.trim().is_empty()) {
                return Err(CourseMindError::validation(format!(
                    "chapter '{}' has a topic with an empty title",
                    chapter.title
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Course progress percentage: `round(100 * completed / total)`, 0 when empty.
///
/// Halves round up.
pub fn course_progress(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((200 * completed + total) / (2 * total)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_of_empty_course_is_zero() {
        assert_eq!(course_progress(0, 0), 0);
    }

    #[test]
    fn progress_rounds_to_nearest() {
        assert_eq!(course_progress(3, 4), 75);
        assert_eq!(course_progress(1, 3), 33);
        assert_eq!(course_progress(2, 3), 67);
        assert_eq!(course_progress(1, 8), 13);
        assert_eq!(course_progress(4, 4), 100);
    }

    #[test]
    fn progress_clamps_overcount() {
        assert_eq!(course_progress(5, 4), 100);
    }

    #[test]
    fn content_mode_parses_storage_and_cli_forms() {
        assert_eq!("TEXT_IMAGE".parse::<ContentMode>().unwrap(), ContentMode::TextImage);
        assert_eq!("video-text".parse::<ContentMode>().unwrap(), ContentMode::VideoText);
        assert!("AUDIO".parse::<ContentMode>().is_err());
        assert_eq!(ContentMode::VideoText.to_string(), "VIDEO_TEXT");
    }

    #[test]
    fn content_mode_serde_uses_screaming_case() {
        let json = serde_json::to_string(&ContentMode::TextImage).unwrap();
        assert_eq!(json, r#""TEXT_IMAGE""#);
    }

    #[test]
    fn plan_paid_rules() {
        assert!(!Plan::Free.is_paid());
        assert!(Plan::Monthly.is_paid());
        assert!(Plan::Yearly.is_paid());
        assert_eq!("yearly".parse::<Plan>().unwrap(), Plan::Yearly);
    }

    #[test]
    fn status_accepts_british_spelling() {
        assert_eq!(
            "cancelled".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn image_ref_serialization() {
        let image = ImageRef::Fallback("https://placehold.co/600x400".into());
        let json = serde_json::to_string(&image).unwrap();
        assert_eq!(json, r#"{"kind":"fallback","url":"https://placehold.co/600x400"}"#);
        assert!(image.is_fallback());
        assert_eq!(image.url(), "https://placehold.co/600x400");
    }

    #[test]
    fn outline_validation() {
        let outline: CourseOutline = serde_json::from_str(
            r#"{"chapters":[{"title":"Searching","topics":[{"title":"Binary Search"},{"title":"Linear Search","description":"Scan every item"}]}]}"#,
        )
        .expect("parse outline");
        assert!(outline.validate().is_ok());
        assert_eq!(outline.topic_count(), 2);

        assert!(CourseOutline::default().validate().is_err());

        let empty_chapter = CourseOutline {
            chapters: vec![OutlineChapter {
                title: "Sorting".into(),
                topics: vec![],
            }],
        };
        let err = empty_chapter.validate().unwrap_err();
        assert!(err.to_string().contains("no topics"));

        let blank_topic = CourseOutline {
            chapters: vec![OutlineChapter {
                title: "Sorting".into(),
                topics: vec![OutlineTopic {
                    title: "  ".into(),
                    description: None,
                }],
            }],
        };
        assert!(blank_topic.validate().is_err());
    }

    #[test]
    fn course_topics_iterates_in_chapter_order() {
        let now = Utc::now();
        let topic = |id: &str, chapter: &str| Topic {
            id: id.into(),
            chapter_id: chapter.into(),
            title: id.into(),
            description: None,
            position: 0,
            completed: false,
            theory_html: None,
            video_id: None,
            image: None,
        };
        let course = Course {
            id: "c".into(),
            user_id: "u".into(),
            name: "Algorithms".into(),
            language: "English".into(),
            mode: ContentMode::TextImage,
            progress: 0,
            created_at: now,
            updated_at: now,
            chapters: vec![
                Chapter {
                    id: "ch1".into(),
                    course_id: "c".into(),
                    title: "Searching".into(),
                    position: 0,
                    topics: vec![topic("t1", "ch1"), topic("t2", "ch1")],
                },
                Chapter {
                    id: "ch2".into(),
                    course_id: "c".into(),
                    title: "Sorting".into(),
                    position: 1,
                    topics: vec![topic("t3", "ch2")],
                },
            ],
        };

        let ids: Vec<_> = course.topics().map(|(_, t)| t.id.as_str()).collect();
        assert_eq!(ids, ["t1", "t2", "t3"]);
    }
}
