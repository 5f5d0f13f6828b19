//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use coursemind_core::{
    EntitlementResolver, GenerationProgress, GenerationReport, GeneratorConfig, NewCourse,
    PlanCatalog, TopicContentGenerator,
};
use coursemind_providers::{
    GeminiClient, OutlineRequest, UnsplashClient, VideoHit, VideoSearch, YouTubeClient,
};
use coursemind_shared::{
    AppConfig, ContentMode, Course, CourseMindError, CourseOutline, GeminiConfig, Plan, Role,
    Subscription, SubscriptionStatus, UnsplashConfig, User, YouTubeConfig, init_config,
    load_config, load_config_from, new_id,
};
use coursemind_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CourseMind: AI-authored courses with progress tracking.
#[derive(Parser)]
#[command(
    name = "coursemind",
    version,
    about = "Generate AI-authored courses, track progress and manage plan limits.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.coursemind/coursemind.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file (overrides `defaults.database_path`).
    #[arg(long, global = true, env = "COURSEMIND_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// User accounts.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Subscription records.
    Subscription {
        #[command(subcommand)]
        action: SubscriptionAction,
    },

    /// Plans and entitlements.
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Course authoring and generation.
    Course {
        #[command(subcommand)]
        action: CourseAction,
    },

    /// Single-topic operations.
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

#[derive(Subcommand)]
pub(crate) enum UserAction {
    /// Register a user.
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
        /// Grant the admin role.
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum SubscriptionAction {
    /// Record a subscription for a user.
    Add(SubscriptionArgs),

    /// Record a status change reported by the billing provider.
    SetStatus {
        /// Subscription ID.
        id: String,
        /// ACTIVE, CANCELED, EXPIRED or INCOMPLETE.
        #[arg(long)]
        status: SubscriptionStatus,
        /// Cancel when the current period ends.
        #[arg(long)]
        cancel_at_period_end: bool,
    },

    /// Show a user's subscription history.
    List {
        #[arg(long)]
        user: String,
    },
}

#[derive(Args)]
pub(crate) struct SubscriptionArgs {
    /// User ID.
    #[arg(long)]
    user: String,

    /// Plan: FREE, MONTHLY or YEARLY.
    #[arg(long, conflicts_with = "price_id", required_unless_present = "price_id")]
    plan: Option<Plan>,

    /// Billing price ID, mapped to a plan through `[billing]`.
    #[arg(long)]
    price_id: Option<String>,

    #[arg(long, default_value = "ACTIVE")]
    status: SubscriptionStatus,

    #[arg(long)]
    customer_ref: Option<String>,

    #[arg(long)]
    subscription_ref: Option<String>,

    /// Length of the current billing period in days.
    #[arg(long)]
    period_days: Option<i64>,
}

#[derive(Subcommand)]
pub(crate) enum PlanAction {
    /// Show a user's plan, access level and limits.
    Show {
        #[arg(long)]
        user: String,
    },
    /// List every plan and its limits.
    List,
}

#[derive(Subcommand)]
pub(crate) enum CourseAction {
    /// Create a course from an outline file or an AI-drafted outline.
    Create {
        /// Owner user ID.
        #[arg(long)]
        user: String,

        /// Course name.
        #[arg(long)]
        name: String,

        /// Language of the generated theory (defaults to config).
        #[arg(long)]
        language: Option<String>,

        /// TEXT_IMAGE or VIDEO_TEXT (defaults to config).
        #[arg(long)]
        mode: Option<ContentMode>,

        /// JSON outline file: {"chapters":[{"title":..,"topics":[{"title":..}]}]}.
        #[arg(long, conflicts_with = "subject", required_unless_present = "subject")]
        outline: Option<PathBuf>,

        /// Draft the outline with the text model from this subject.
        #[arg(long)]
        subject: Option<String>,

        /// Number of chapters to draft.
        #[arg(long, default_value = "4")]
        chapters: u32,

        /// Generate every topic right after creation.
        #[arg(long)]
        generate: bool,
    },

    /// Generate content for topics that have none yet.
    Generate {
        /// Course ID.
        id: String,
        /// Regenerate topics that already have content.
        #[arg(long)]
        force: bool,
    },

    /// Print a course with its chapters and topics.
    Show {
        /// Course ID.
        id: String,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List a user's courses.
    List {
        #[arg(long)]
        user: String,
    },

    /// Delete a course with its chapters and topics.
    Delete {
        /// Course ID.
        id: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum TopicAction {
    /// Regenerate one topic's theory and media.
    Regenerate {
        /// Topic ID.
        id: String,
    },
    /// Mark a topic as completed.
    Complete {
        /// Topic ID.
        id: String,
        /// Mark as not completed instead.
        #[arg(long)]
        undo: bool,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "coursemind=info",
        1 => "coursemind=debug",
        _ => "coursemind=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        };
    }

    let ctx = Context::load(cli.config.as_deref(), cli.db)?;

    match cli.command {
        Command::Config { .. } => Ok(()),
        Command::User { action } => match action {
            UserAction::Add { email, name, admin } => cmd_user_add(&ctx, email, name, admin).await,
        },
        Command::Subscription { action } => match action {
            SubscriptionAction::Add(args) => cmd_subscription_add(&ctx, args).await,
            SubscriptionAction::SetStatus {
                id,
                status,
                cancel_at_period_end,
            } => cmd_subscription_set_status(&ctx, &id, status, cancel_at_period_end).await,
            SubscriptionAction::List { user } => cmd_subscription_list(&ctx, &user).await,
        },
        Command::Plan { action } => match action {
            PlanAction::Show { user } => cmd_plan_show(&ctx, &user).await,
            PlanAction::List => cmd_plan_list(&ctx),
        },
        Command::Course { action } => match action {
            CourseAction::Create {
                user,
                name,
                language,
                mode,
                outline,
                subject,
                chapters,
                generate,
            } => {
                let language = language.unwrap_or_else(|| ctx.config.defaults.language.clone());
                let outline = match (outline, subject) {
                    (Some(path), _) => read_outline(&path)?,
                    (None, Some(subject)) => draft_outline(&ctx, &subject, chapters, &language).await?,
                    (None, None) => return Err(eyre!("either --outline or --subject is required")),
                };
                let new = NewCourse {
                    user_id: user,
                    name,
                    language,
                    mode: mode.unwrap_or(ctx.config.defaults.content_mode),
                    outline,
                };
                cmd_course_create(&ctx, new, generate).await
            }
            CourseAction::Generate { id, force } => cmd_course_generate(&ctx, &id, force).await,
            CourseAction::Show { id, json } => cmd_course_show(&ctx, &id, json).await,
            CourseAction::List { user } => cmd_course_list(&ctx, &user).await,
            CourseAction::Delete { id } => cmd_course_delete(&ctx, &id).await,
        },
        Command::Topic { action } => match action {
            TopicAction::Regenerate { id } => cmd_topic_regenerate(&ctx, &id).await,
            TopicAction::Complete { id, undo } => cmd_topic_complete(&ctx, &id, !undo).await,
        },
    }
}

/// Resolved configuration shared by all commands.
struct Context {
    config: AppConfig,
    db_path: PathBuf,
}

impl Context {
    fn load(config_path: Option<&Path>, db: Option<PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        let db_path = db.unwrap_or_else(|| PathBuf::from(&config.defaults.database_path));
        Ok(Self { config, db_path })
    }

    async fn storage(&self) -> Result<Storage> {
        Ok(Storage::open(&self.db_path).await?)
    }

    async fn storage_readonly(&self) -> Result<Storage> {
        Ok(Storage::open_readonly(&self.db_path).await?)
    }

    /// Build the content generator from configured collaborators.
    ///
    /// Video search is only required for `VIDEO_TEXT` courses, so a missing
    /// YouTube key surfaces when a video is actually requested.
    fn generator(&self) -> Result<TopicContentGenerator> {
        let text = Arc::new(GeminiClient::new(GeminiConfig::from_app(&self.config)?)?);
        let images = Arc::new(UnsplashClient::new(UnsplashConfig::from_app(&self.config)?)?);
        let videos: Arc<dyn VideoSearch> = match YouTubeConfig::from_app(&self.config) {
            Ok(yt) => Arc::new(YouTubeClient::new(yt)?),
            Err(e) => {
                warn!(error = %e, "video search unavailable");
                Arc::new(UnconfiguredVideoSearch(e.to_string()))
            }
        };

        Ok(TopicContentGenerator::new(
            text,
            videos,
            images,
            GeneratorConfig::from_app(&self.config),
        ))
    }
}

/// Video search standing in when no YouTube key is configured.
struct UnconfiguredVideoSearch(String);

#[async_trait]
impl VideoSearch for UnconfiguredVideoSearch {
    async fn search_videos(&self, _query: &str, _count: u32) -> coursemind_shared::Result<Vec<VideoHit>> {
        Err(CourseMindError::config(self.0.clone()))
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner.set_message(message.to_string());
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl GenerationProgress for CliProgress {
    fn started(&self, total: usize) {
        self.spinner.set_message(format!("Generating {total} topics"));
    }

    fn topic_done(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Generated [{current}/{total}] {title}"));
    }

    fn topic_failed(&self, title: &str, error: &str) {
        self.spinner.println(format!("  ✗ {title}: {error}"));
    }

    fn finished(&self, _report: &GenerationReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

async fn cmd_user_add(ctx: &Context, email: String, name: Option<String>, admin: bool) -> Result<()> {
    if !email.contains('@') {
        return Err(eyre!("invalid email '{email}'"));
    }
    let storage = ctx.storage().await?;
    let user = User {
        id: new_id(),
        email,
        name,
        role: if admin { Role::Admin } else { Role::User },
        created_at: Utc::now(),
    };
    storage.insert_user(&user).await?;
    info!(user_id = %user.id, role = user.role.as_str(), "user added");
    println!("{}", user.id);
    Ok(())
}

async fn cmd_subscription_add(ctx: &Context, args: SubscriptionArgs) -> Result<()> {
    let catalog = PlanCatalog::new(ctx.config.billing.clone());
    let plan = match (args.plan, args.price_id.as_deref()) {
        (Some(plan), _) => plan,
        (None, Some(price_id)) => catalog
            .plan_for_price_id(price_id)
            .ok_or_else(|| eyre!("price ID '{price_id}' is not configured under [billing]"))?,
        (None, None) => return Err(eyre!("either --plan or --price-id is required")),
    };

    let storage = ctx.storage().await?;
    if storage.get_user(&args.user).await?.is_none() {
        return Err(CourseMindError::not_found("user", &args.user).into());
    }

    let now = Utc::now();
    let sub = Subscription {
        customer_ref: args.customer_ref,
        subscription_ref: args.subscription_ref,
        price_ref: args
            .price_id
            .or_else(|| catalog.price_id_for_plan(plan).map(String::from)),
        current_period_start: args.period_days.map(|_| now),
        current_period_end: args.period_days.map(|d| now + chrono::Duration::days(d)),
        ..Subscription::new(args.user, plan, args.status)
    };
    storage.insert_subscription(&sub).await?;

    info!(subscription_id = %sub.id, %plan, status = %sub.status, "subscription recorded");
    println!("{}", sub.id);
    Ok(())
}

async fn cmd_subscription_set_status(
    ctx: &Context,
    id: &str,
    status: SubscriptionStatus,
    cancel_at_period_end: bool,
) -> Result<()> {
    let storage = ctx.storage().await?;
    storage
        .update_subscription_status(id, status, cancel_at_period_end)
        .await?;
    println!("Subscription {id} is now {status}");
    Ok(())
}

async fn cmd_subscription_list(ctx: &Context, user: &str) -> Result<()> {
    let storage = ctx.storage_readonly().await?;
    let subs = storage.list_subscriptions(user).await?;
    if subs.is_empty() {
        println!("No subscriptions for {user}");
        return Ok(());
    }
    for sub in subs {
        let period_end = sub
            .current_period_end
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {:<8} {:<10} ends {}{}",
            sub.id,
            sub.plan.as_str(),
            sub.status.as_str(),
            period_end,
            if sub.cancel_at_period_end { " (cancels)" } else { "" }
        );
    }
    Ok(())
}

async fn cmd_plan_show(ctx: &Context, user: &str) -> Result<()> {
    let storage = ctx.storage_readonly().await?;
    let resolver = EntitlementResolver::new(&storage);
    let entitlement = resolver.entitlement(user).await?;
    let owned = storage.count_courses(user).await?;

    println!();
    println!("  Plan:     {}", entitlement.plan);
    println!("  Access:   {}", entitlement.access);
    println!("  Courses:  {owned}/{}", entitlement.limits.max_courses);
    println!("  Features:");
    for feature in entitlement.limits.features {
        println!("    - {feature}");
    }
    println!();
    Ok(())
}

fn cmd_plan_list(ctx: &Context) -> Result<()> {
    let catalog = PlanCatalog::new(ctx.config.billing.clone());
    for limits in catalog.all() {
        let price = catalog.price_id_for_plan(limits.plan).unwrap_or("-");
        println!(
            "{:<8} {:>3} courses  price {price}",
            limits.plan.as_str(),
            limits.max_courses
        );
    }
    Ok(())
}

fn read_outline(path: &Path) -> Result<CourseOutline> {
    let content =
        std::fs::read_to_string(path).map_err(|e| CourseMindError::io(path, e))?;
    let outline: CourseOutline = serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid outline {}: {e}", path.display()))?;
    Ok(outline)
}

async fn draft_outline(
    ctx: &Context,
    subject: &str,
    chapters: u32,
    language: &str,
) -> Result<CourseOutline> {
    let gemini = GeminiClient::new(GeminiConfig::from_app(&ctx.config)?)?;
    let request = OutlineRequest {
        subject: subject.to_string(),
        chapter_count: chapters,
        language: language.to_string(),
    };

    let progress = CliProgress::new("Drafting outline");
    let outline = coursemind_core::draft_outline(
        &gemini,
        &request,
        ctx.config.generation.request_timeout(),
    )
    .await;
    progress.finish();
    Ok(outline?)
}

async fn cmd_course_create(ctx: &Context, new: NewCourse, generate: bool) -> Result<()> {
    let storage = ctx.storage().await?;
    let course = coursemind_core::create_course(&storage, new).await?;

    println!();
    println!("  Course created!");
    println!("  ID:       {}", course.id);
    println!("  Name:     {}", course.name);
    println!("  Mode:     {}", course.mode);
    println!("  Chapters: {}", course.chapters.len());
    println!("  Topics:   {}", course.topics().count());
    println!();

    if generate {
        run_generation(ctx, &storage, &course.id, false).await?;
    }
    Ok(())
}

async fn cmd_course_generate(ctx: &Context, id: &str, force: bool) -> Result<()> {
    let storage = ctx.storage().await?;
    run_generation(ctx, &storage, id, force).await
}

async fn run_generation(ctx: &Context, storage: &Storage, id: &str, force: bool) -> Result<()> {
    let generator = ctx.generator()?;
    let reporter = CliProgress::new("Loading course");
    let result = coursemind_core::generate_course(storage, &generator, id, force, &reporter).await;
    reporter.finish();
    let report = result?;

    println!();
    println!("  Generated: {}", report.generated);
    println!("  Skipped:   {}", report.skipped);
    println!("  Failed:    {}", report.failures.len());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    if !report.is_complete() {
        return Err(eyre!(
            "{} topic(s) failed; rerun `coursemind course generate {id}` to retry them",
            report.failures.len()
        ));
    }
    Ok(())
}

async fn cmd_course_show(ctx: &Context, id: &str, json: bool) -> Result<()> {
    let storage = ctx.storage_readonly().await?;
    let course = storage
        .get_course(id)
        .await?
        .ok_or_else(|| CourseMindError::not_found("course", id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&course)?);
        return Ok(());
    }

    print_course(&course);
    Ok(())
}

fn print_course(course: &Course) {
    println!();
    println!("  {} ({}, {})", course.name, course.language, course.mode);
    println!("  Progress: {}%", course.progress);
    for chapter in &course.chapters {
        println!();
        println!("  {}. {}", chapter.position + 1, chapter.title);
        for topic in &chapter.topics {
            let mark = if topic.completed { "x" } else { " " };
            let media = match (&topic.video_id, &topic.image) {
                (Some(video), _) => format!("video {video}"),
                (None, Some(image)) if image.is_fallback() => "placeholder image".into(),
                (None, Some(image)) => format!("image {}", image.url()),
                (None, None) if topic.is_generated() => "no media".into(),
                (None, None) => "not generated".into(),
            };
            println!("     [{mark}] {}  ({media})  {}", topic.title, topic.id);
        }
    }
    println!();
}

async fn cmd_course_list(ctx: &Context, user: &str) -> Result<()> {
    let storage = ctx.storage_readonly().await?;
    let courses = storage.list_courses(user).await?;
    if courses.is_empty() {
        println!("No courses for {user}");
        return Ok(());
    }
    for course in courses {
        println!(
            "{}  {:>3}%  {:<10} {}",
            course.id,
            course.progress,
            course.mode.as_str(),
            course.name
        );
    }
    Ok(())
}

async fn cmd_course_delete(ctx: &Context, id: &str) -> Result<()> {
    let storage = ctx.storage().await?;
    if !storage.delete_course(id).await? {
        return Err(CourseMindError::not_found("course", id).into());
    }
    info!(course_id = id, "course deleted");
    println!("Deleted course {id}");
    Ok(())
}

async fn cmd_topic_regenerate(ctx: &Context, id: &str) -> Result<()> {
    let storage = ctx.storage().await?;
    let generator = ctx.generator()?;

    let progress = CliProgress::new("Regenerating topic");
    let result = coursemind_core::regenerate_topic(&storage, &generator, id).await;
    progress.finish();
    let content = result?;

    println!("Topic {id} regenerated ({} bytes of HTML)", content.theory_html.len());
    if let Some(video) = content.video_id {
        println!("  Video: https://www.youtube.com/watch?v={video}");
    }
    if let Some(image) = content.image {
        let note = if image.is_fallback() { " (placeholder)" } else { "" };
        println!("  Image: {}{note}", image.url());
    }
    Ok(())
}

async fn cmd_topic_complete(ctx: &Context, id: &str, completed: bool) -> Result<()> {
    let storage = ctx.storage().await?;
    let progress = coursemind_core::set_topic_completed(&storage, id, completed).await?;
    let state = if completed { "completed" } else { "not completed" };
    println!("Topic {id} marked {state}; course progress {progress}%");
    Ok(())
}
