//! Course authoring: creation from an outline, content generation runs,
//! single-topic regeneration and completion tracking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use coursemind_providers::{OutlineGenerator, OutlineRequest};
use coursemind_shared::{
    Chapter, ContentMode, Course, CourseMindError, CourseOutline, Result, Topic, new_id,
};
use coursemind_storage::{CourseQuota, Storage, TopicRecord};

use crate::content::{GeneratedContent, TopicContentGenerator, TopicContext};
use crate::entitlement::{AccessLevel, EntitlementResolver};

/// Input to [`create_course`].
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub user_id: String,
    pub name: String,
    pub language: String,
    pub mode: ContentMode,
    pub outline: CourseOutline,
}

/// Outcome of a [`generate_course`] run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub course_id: String,
    /// Topics sent to the generator.
    pub attempted: usize,
    /// Topics generated and stored.
    pub generated: usize,
    /// Topics left alone because they already had content.
    pub skipped: usize,
    pub failures: Vec<TopicFailure>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl GenerationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicFailure {
    pub topic_id: String,
    pub title: String,
    pub error: String,
}

/// Progress callback for course generation runs.
pub trait GenerationProgress: Send + Sync {
    /// Called once the set of topics to generate is known.
    fn started(&self, total: usize);
    /// Called after a topic's content is stored.
    fn topic_done(&self, title: &str, current: usize, total: usize);
    fn topic_failed(&self, title: &str, error: &str);
    fn finished(&self, report: &GenerationReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl GenerationProgress for SilentProgress {
    fn started(&self, _total: usize) {}
    fn topic_done(&self, _title: &str, _current: usize, _total: usize) {}
    fn topic_failed(&self, _title: &str, _error: &str) {}
    fn finished(&self, _report: &GenerationReport) {}
}

impl From<&TopicRecord> for TopicContext {
    fn from(record: &TopicRecord) -> Self {
        Self {
            title: record.topic.title.clone(),
            description: record.topic.description.clone(),
            chapter_title: record.chapter.title.clone(),
            language: record.course.language.clone(),
            mode: record.course.mode,
        }
    }
}

/// Ask the outline generator for a course skeleton.
#[instrument(skip_all, fields(subject = %request.subject))]
pub async fn draft_outline(
    outlines: &dyn OutlineGenerator,
    request: &OutlineRequest,
    deadline: Duration,
) -> Result<CourseOutline> {
    if request.subject.trim().is_empty() {
        return Err(CourseMindError::validation("subject must not be empty"));
    }
    if request.chapter_count == 0 {
        return Err(CourseMindError::validation("chapter count must be at least 1"));
    }

    let outline = tokio::time::timeout(deadline, outlines.generate_outline(request))
        .await
        .map_err(|_| {
            CourseMindError::upstream(
                "outline generation",
                format!("timed out after {}ms", deadline.as_millis()),
            )
        })??;
    outline.validate()?;
    Ok(outline)
}

/// Validate and persist a new course, enforcing the owner's course quota.
#[instrument(skip_all, fields(user_id = %new.user_id, name = %new.name))]
pub async fn create_course(storage: &Storage, new: NewCourse) -> Result<Course> {
    if new.name.trim().is_empty() {
        return Err(CourseMindError::validation("course name must not be empty"));
    }
    if new.language.trim().is_empty() {
        return Err(CourseMindError::validation("language must not be empty"));
    }
    new.outline.validate()?;

    let entitlement = EntitlementResolver::new(storage)
        .ensure_can_create_course(&new.user_id)
        .await?;
    let quota = (entitlement.access != AccessLevel::Admin).then(|| CourseQuota {
        plan: entitlement.plan,
        limit: entitlement.limits.max_courses,
    });

    let course = build_course(new);
    storage.insert_course_within(&course, quota.as_ref()).await?;

    info!(
        course_id = %course.id,
        chapters = course.chapters.len(),
        topics = course.topics().count(),
        "course created"
    );
    Ok(course)
}

fn build_course(new: NewCourse) -> Course {
    let now = Utc::now();
    let course_id = new_id();

    let chapters = new
        .outline
        .chapters
        .into_iter()
        .enumerate()
        .map(|(ci, chapter)| {
            let chapter_id = new_id();
            let topics = chapter
                .topics
                .into_iter()
                .enumerate()
                .map(|(ti, topic)| Topic {
                    id: new_id(),
                    chapter_id: chapter_id.clone(),
                    title: topic.title.trim().to_string(),
                    description: topic
                        .description
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty()),
                    position: ti as u32,
                    completed: false,
                    theory_html: None,
                    video_id: None,
                    image: None,
                })
                .collect();

            Chapter {
                id: chapter_id,
                course_id: course_id.clone(),
                title: chapter.title.trim().to_string(),
                position: ci as u32,
                topics,
            }
        })
        .collect();

    Course {
        id: course_id,
        user_id: new.user_id,
        name: new.name.trim().to_string(),
        language: new.language.trim().to_string(),
        mode: new.mode,
        progress: 0,
        created_at: now,
        updated_at: now,
        chapters,
    }
}

/// Generate content for a course's topics.
///
/// Topics that already have theory are skipped unless `force` is set. At
/// most `max_concurrent_topics` topics are in flight at once. A failed topic
/// is recorded in the report and does not stop the others.
#[instrument(skip_all, fields(course_id = %course_id, force))]
pub async fn generate_course(
    storage: &Storage,
    generator: &TopicContentGenerator,
    course_id: &str,
    force: bool,
    progress: &dyn GenerationProgress,
) -> Result<GenerationReport> {
    let start = Instant::now();
    let course = storage
        .get_course(course_id)
        .await?
        .ok_or_else(|| CourseMindError::not_found("course", course_id))?;

    let pending: Vec<(String, TopicContext)> = course
        .topics()
        .filter(|(_, topic)| force || !topic.is_generated())
        .map(|(chapter, topic)| {
            (
                topic.id.clone(),
                TopicContext {
                    title: topic.title.clone(),
                    description: topic.description.clone(),
                    chapter_title: chapter.title.clone(),
                    language: course.language.clone(),
                    mode: course.mode,
                },
            )
        })
        .collect();

    let total = pending.len();
    let skipped = course.topics().count() - total;
    progress.started(total);

    let concurrency = generator.config().max_concurrent_topics.max(1);
    info!(total, skipped, concurrency, "starting course generation");

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(total);

    for (topic_id, context) in pending {
        let generator = generator.clone();
        let sem = semaphore.clone();
        handles.push((
            topic_id,
            context.title.clone(),
            tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| CourseMindError::upstream("generation task", e.to_string()))?;
                generator.generate(&context).await
            }),
        ));
    }

    let mut generated = 0;
    let mut failures = Vec::new();

    for (topic_id, title, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(content)) => store_content(storage, &topic_id, &content).await,
            Ok(Err(e)) => Err(e),
            Err(e) => Err(CourseMindError::upstream("generation task", e.to_string())),
        };

        match outcome {
            Ok(()) => {
                generated += 1;
                progress.topic_done(&title, generated + failures.len(), total);
            }
            Err(e) => {
                warn!(%topic_id, error = %e, "topic generation failed");
                progress.topic_failed(&title, &e.to_string());
                failures.push(TopicFailure {
                    topic_id,
                    title,
                    error: e.to_string(),
                });
            }
        }
    }

    let report = GenerationReport {
        course_id: course.id,
        attempted: total,
        generated,
        skipped,
        failures,
        elapsed: start.elapsed(),
    };

    info!(
        generated = report.generated,
        failed = report.failures.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "course generation finished"
    );
    progress.finished(&report);
    Ok(report)
}

/// Regenerate and store one topic's content.
#[instrument(skip_all, fields(topic_id = %topic_id))]
pub async fn regenerate_topic(
    storage: &Storage,
    generator: &TopicContentGenerator,
    topic_id: &str,
) -> Result<GeneratedContent> {
    let record = storage
        .get_topic(topic_id)
        .await?
        .ok_or_else(|| CourseMindError::not_found("topic", topic_id))?;

    let content = generator.generate(&TopicContext::from(&record)).await?;
    store_content(storage, topic_id, &content).await?;
    info!(title = %record.topic.title, "topic regenerated");
    Ok(content)
}

/// Mark a topic done (or not) and return the course's recomputed progress.
#[instrument(skip(storage))]
pub async fn set_topic_completed(storage: &Storage, topic_id: &str, completed: bool) -> Result<u8> {
    let record = storage
        .get_topic(topic_id)
        .await?
        .ok_or_else(|| CourseMindError::not_found("topic", topic_id))?;

    storage.set_topic_completed(topic_id, completed).await?;
    storage.recompute_course_progress(&record.course.id).await
}

async fn store_content(storage: &Storage, topic_id: &str, content: &GeneratedContent) -> Result<()> {
    storage
        .update_topic_content(
            topic_id,
            &content.theory_html,
            content.video_id.as_deref(),
            content.image.as_ref(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use coursemind_providers::{TextGenerator, TheoryRequest};
    use coursemind_shared::{
        ImageRef, OutlineChapter, OutlineTopic, Plan, Role, Subscription, SubscriptionStatus, User,
    };
    use uuid::Uuid;

    use super::*;
    use crate::content::tests::{FakeImages, FakeText, FakeVideos, PLACEHOLDER, config};

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("cm_core_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    async fn add_user(storage: &Storage, role: Role) -> String {
        let user = User {
            id: new_id(),
            email: format!("{}@example.com", Uuid::now_v7()),
            name: None,
            role,
            created_at: Utc::now(),
        };
        storage.insert_user(&user).await.unwrap();
        user.id
    }

    fn outline(shape: &[usize]) -> CourseOutline {
        CourseOutline {
            chapters: shape
                .iter()
                .enumerate()
                .map(|(ci, &n)| OutlineChapter {
                    title: format!("Chapter {}", ci + 1),
                    topics: (0..n)
                        .map(|ti| OutlineTopic {
                            title: format!("Topic {}.{}", ci + 1, ti + 1),
                            description: None,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn new_course(user_id: &str, mode: ContentMode, shape: &[usize]) -> NewCourse {
        NewCourse {
            user_id: user_id.into(),
            name: "Algorithms".into(),
            language: "English".into(),
            mode,
            outline: outline(shape),
        }
    }

    fn fake_generator(text: FakeText) -> TopicContentGenerator {
        TopicContentGenerator::new(
            Arc::new(text),
            Arc::new(FakeVideos::returning(vec!["vid"])),
            Arc::new(FakeImages::returning(vec!["https://img/x"])),
            config(Duration::from_secs(5)),
        )
    }

    /// Text generator recording the highest number of simultaneous calls.
    #[derive(Default)]
    struct CountingText {
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for CountingText {
        async fn generate_theory(&self, request: &TheoryRequest) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("# {}", request.title))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl GenerationProgress for RecordingProgress {
        fn started(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }
        fn topic_done(&self, _title: &str, current: usize, total: usize) {
            self.events.lock().unwrap().push(format!("done {current}/{total}"));
        }
        fn topic_failed(&self, title: &str, _error: &str) {
            self.events.lock().unwrap().push(format!("fail {title}"));
        }
        fn finished(&self, report: &GenerationReport) {
            self.events.lock().unwrap().push(format!("end {}", report.generated));
        }
    }

    #[tokio::test]
    async fn create_course_persists_outline_in_order() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;

        let course = create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[2, 1]))
            .await
            .unwrap();

        let loaded = storage.get_course(&course.id).await.unwrap().unwrap();
        assert_eq!(loaded.chapters.len(), 2);
        assert_eq!(loaded.chapters[0].topics[1].title, "Topic 1.2");
        assert_eq!(loaded.chapters[1].position, 1);
        assert_eq!(loaded.progress, 0);
    }

    #[tokio::test]
    async fn create_course_rejects_bad_input() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;

        let mut input = new_course(&user_id, ContentMode::TextImage, &[1]);
        input.name = " ".into();
        assert!(matches!(
            create_course(&storage, input).await.unwrap_err(),
            CourseMindError::Validation { .. }
        ));

        let input = new_course(&user_id, ContentMode::TextImage, &[1, 0]);
        let err = create_course(&storage, input).await.unwrap_err();
        assert!(err.to_string().contains("has no topics"));

        let err = create_course(&storage, new_course("ghost", ContentMode::TextImage, &[1]))
            .await
            .unwrap_err();
        assert!(matches!(err, CourseMindError::NotFound { entity: "user", .. }));
    }

    #[tokio::test]
    async fn free_user_limited_to_three_courses() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;

        for _ in 0..3 {
            create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[1]))
                .await
                .unwrap();
        }
        let err = create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[1]))
            .await
            .unwrap_err();
        assert!(matches!(err, CourseMindError::QuotaExceeded { limit: 3, .. }));

        let sub = Subscription::new(&user_id, Plan::Monthly, SubscriptionStatus::Active);
        storage.insert_subscription(&sub).await.unwrap();
        create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[1]))
            .await
            .expect("paid plan lifts the limit");
    }

    #[tokio::test]
    async fn admin_creates_courses_past_free_limit() {
        let storage = test_storage().await;
        let admin_id = add_user(&storage, Role::Admin).await;

        for _ in 0..4 {
            create_course(&storage, new_course(&admin_id, ContentMode::TextImage, &[1]))
                .await
                .expect("admins are not limited");
        }
        assert_eq!(storage.count_courses(&admin_id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn generate_course_fills_every_topic() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;
        let course = create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[2, 2]))
            .await
            .unwrap();

        let progress = RecordingProgress::default();
        let report = generate_course(
            &storage,
            &fake_generator(FakeText::ok("# {title}\n\nBody.")),
            &course.id,
            false,
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(report.attempted, 4);
        assert_eq!(report.generated, 4);
        assert!(report.is_complete());

        let loaded = storage.get_course(&course.id).await.unwrap().unwrap();
        for (_, topic) in loaded.topics() {
            let html = topic.theory_html.as_deref().unwrap();
            assert!(html.starts_with(&format!("<h1>{}</h1>", topic.title)));
            assert_eq!(topic.image, Some(ImageRef::Found("https://img/x".into())));
            assert!(topic.video_id.is_none());
        }

        let events = progress.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("start 4"));
        assert_eq!(events.last().map(String::as_str), Some("end 4"));
    }

    #[tokio::test]
    async fn generated_topics_skipped_unless_forced() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;
        let course = create_course(&storage, new_course(&user_id, ContentMode::VideoText, &[3]))
            .await
            .unwrap();
        let generator = fake_generator(FakeText::ok("# T"));

        generate_course(&storage, &generator, &course.id, false, &SilentProgress)
            .await
            .unwrap();
        let again = generate_course(&storage, &generator, &course.id, false, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(again.attempted, 0);
        assert_eq!(again.skipped, 3);

        let forced = generate_course(&storage, &generator, &course.id, true, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(forced.generated, 3);

        let loaded = storage.get_course(&course.id).await.unwrap().unwrap();
        assert!(loaded.topics().all(|(_, t)| t.video_id.as_deref() == Some("vid") && t.image.is_none()));
    }

    #[tokio::test]
    async fn failures_are_collected_not_fatal() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;
        let course = create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[2]))
            .await
            .unwrap();

        let progress = RecordingProgress::default();
        let report = generate_course(
            &storage,
            &fake_generator(FakeText::failing("model overloaded")),
            &course.id,
            false,
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(report.generated, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].error.contains("model overloaded"));
        assert!(!report.is_complete());

        let loaded = storage.get_course(&course.id).await.unwrap().unwrap();
        assert!(loaded.topics().all(|(_, t)| !t.is_generated()));
    }

    #[tokio::test]
    async fn generation_respects_concurrency_bound() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;
        let course = create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[4, 4]))
            .await
            .unwrap();

        let text = Arc::new(CountingText::default());
        let generator = TopicContentGenerator::new(
            text.clone(),
            Arc::new(FakeVideos::returning(vec![])),
            Arc::new(FakeImages::returning(vec![])),
            config(Duration::from_secs(5)),
        );

        let report = generate_course(&storage, &generator, &course.id, false, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.generated, 8);
        let max = text.max_seen.load(Ordering::SeqCst);
        assert!(max <= 2, "saw {max} concurrent generations");
        assert!(max >= 1);
    }

    #[tokio::test]
    async fn generate_unknown_course_is_not_found() {
        let storage = test_storage().await;
        let err = generate_course(
            &storage,
            &fake_generator(FakeText::ok("# T")),
            "missing",
            false,
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CourseMindError::NotFound { entity: "course", .. }));
    }

    #[tokio::test]
    async fn regenerate_topic_replaces_content() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;
        let course = create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[1]))
            .await
            .unwrap();
        let topic_id = course.chapters[0].topics[0].id.clone();

        let generator = TopicContentGenerator::new(
            Arc::new(FakeText::ok("# Fresh")),
            Arc::new(FakeVideos::returning(vec![])),
            Arc::new(FakeImages::returning(vec![])),
            config(Duration::from_secs(5)),
        );
        let content = regenerate_topic(&storage, &generator, &topic_id).await.unwrap();
        assert_eq!(content.image, Some(ImageRef::Fallback(PLACEHOLDER.into())));

        let topic = storage.get_topic(&topic_id).await.unwrap().unwrap().topic;
        assert!(topic.theory_html.unwrap().contains("Fresh"));
        assert!(topic.image.unwrap().is_fallback());

        let err = regenerate_topic(&storage, &generator, "missing").await.unwrap_err();
        assert!(matches!(err, CourseMindError::NotFound { entity: "topic", .. }));
    }

    #[tokio::test]
    async fn completion_recomputes_progress() {
        let storage = test_storage().await;
        let user_id = add_user(&storage, Role::User).await;
        let course = create_course(&storage, new_course(&user_id, ContentMode::TextImage, &[2, 2]))
            .await
            .unwrap();
        let ids: Vec<String> = course.topics().map(|(_, t)| t.id.clone()).collect();

        assert_eq!(set_topic_completed(&storage, &ids[0], true).await.unwrap(), 25);
        assert_eq!(set_topic_completed(&storage, &ids[1], true).await.unwrap(), 50);
        assert_eq!(set_topic_completed(&storage, &ids[2], true).await.unwrap(), 75);
        assert_eq!(set_topic_completed(&storage, &ids[2], false).await.unwrap(), 50);

        let err = set_topic_completed(&storage, "missing", true).await.unwrap_err();
        assert!(matches!(err, CourseMindError::NotFound { .. }));
    }

    struct FixedOutline(CourseOutline);

    #[async_trait]
    impl OutlineGenerator for FixedOutline {
        async fn generate_outline(&self, _request: &OutlineRequest) -> Result<CourseOutline> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn draft_outline_validates_request_and_answer() {
        let request = OutlineRequest {
            subject: "Rust".into(),
            chapter_count: 2,
            language: "English".into(),
        };

        let good = FixedOutline(outline(&[1, 2]));
        let drafted = draft_outline(&good, &request, Duration::from_secs(1)).await.unwrap();
        assert_eq!(drafted.topic_count(), 3);

        let empty = FixedOutline(CourseOutline::default());
        assert!(draft_outline(&empty, &request, Duration::from_secs(1)).await.is_err());

        let zero = OutlineRequest {
            chapter_count: 0,
            ..request
        };
        let err = draft_outline(&good, &zero, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CourseMindError::Validation { .. }));
    }
}
