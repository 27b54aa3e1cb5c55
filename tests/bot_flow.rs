//! End-to-end tests for the bot: commands, flows and persistence.
//!
//! Most tests call `Bot::reply` directly against an in-memory store. One test
//! drives the full `run` loop through a scripted in-process channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use chrono::Utc;

use devfolio_bot::accrual::AccrualJob;
use devfolio_bot::bot::{Bot, BotDeps, TRANSIENT_FAILURE};
use devfolio_bot::channels::{
    Channel, ChannelManager, CommandInfo, IncomingMessage, Keyboard, MessageStream,
    OutgoingResponse,
};
use devfolio_bot::config::BotConfig;
use devfolio_bot::error::{ChannelError, DatabaseError};
use devfolio_bot::profile::{CityCount, PLACEHOLDER, ProfilePatch, ProfileStats, UserProfile};
use devfolio_bot::store::{AccrualCandidate, LibSqlBackend, ProfileStore};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const FULL_ANSWERS: [&str; 9] = [
    "Ada",
    "Lovelace",
    "36",
    " London ",
    "rust, sql",
    "30",
    "5000",
    "Analytical Engines",
    "math, poetry",
];

async fn setup() -> (Bot, Arc<LibSqlBackend>) {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let deps = BotDeps {
        store: store.clone(),
    };
    (Bot::new(BotConfig::default(), deps, ChannelManager::new()), store)
}

fn from(user_id: &str, handle: Option<&str>, text: &str) -> IncomingMessage {
    let msg = IncomingMessage::new("test", user_id, text);
    match handle {
        Some(h) => msg.with_handle(h),
        None => msg,
    }
}

/// Send each line as `ada` (id 1) and return the last reply.
async fn say_all(bot: &Bot, lines: &[&str]) -> OutgoingResponse {
    let mut last = None;
    for line in lines {
        last = Some(bot.reply(&from("1", Some("ada"), line)).await);
    }
    last.unwrap()
}

async fn register(bot: &Bot, user_id: &str, handle: &str, city: &str, salary: &str) {
    bot.reply(&from(user_id, Some(handle), "/start")).await;
    let answers = ["-", "-", "-", city, "-", "-", salary, "-", "-"];
    for answer in answers {
        bot.reply(&from(user_id, Some(handle), answer)).await;
    }
}

// ── Registration ────────────────────────────────────────────────────────

#[tokio::test]
async fn start_then_skip_everything() {
    let (bot, store) = setup().await;

    let first = bot.reply(&from("1", Some("ada"), "/start")).await;
    assert!(first.content.contains("What is your first name?"));

    let done = say_all(&bot, &["-"; 9]).await;
    assert!(done.content.contains("profile is saved"));
    assert_eq!(done.keyboard, Keyboard::Remove);

    let profile = store.get_profile("1").await.unwrap().unwrap();
    assert_eq!(profile.identity, "1");
    assert_eq!(profile.handle.as_deref(), Some("ada"));
    assert!(profile.last_experience_update.is_some());
    assert_eq!(
        profile,
        UserProfile {
            identity: "1".to_string(),
            handle: Some("ada".to_string()),
            last_experience_update: profile.last_experience_update,
            ..Default::default()
        }
    );

    let shown = bot.reply(&from("1", Some("ada"), "/profile")).await;
    assert!(shown.content.contains("Handle: @ada"));
    assert_eq!(shown.content.matches(PLACEHOLDER).count(), 8);
}

#[tokio::test]
async fn full_registration_and_profile_lookup() {
    let (bot, _store) = setup().await;
    bot.reply(&from("1", Some("ada"), "/start")).await;
    say_all(&bot, &FULL_ANSWERS).await;

    let own = bot.reply(&from("1", Some("ada"), "/profile")).await;
    assert!(own.content.contains("Name: Ada Lovelace"));
    assert!(own.content.contains("City: london"));
    assert!(own.content.contains("Stack: rust, sql"));
    assert!(own.content.contains("Experience: 2 years 6 months"));
    assert!(!own.content.contains(PLACEHOLDER));

    let other = bot.reply(&from("2", Some("bob"), "/profile @ada")).await;
    assert_eq!(other.content, own.content);

    let missing = bot.reply(&from("2", Some("bob"), "/profile @nobody")).await;
    assert_eq!(missing.content, "No profile found for @nobody.");
}

#[tokio::test]
async fn invalid_age_is_asked_again() {
    let (bot, store) = setup().await;
    bot.reply(&from("1", Some("ada"), "/start")).await;
    say_all(&bot, &["Ada", "Lovelace"]).await;

    for bad in ["200", "old"] {
        let retry = bot.reply(&from("1", Some("ada"), bad)).await;
        assert!(retry.content.starts_with("Age must be"));
        assert!(retry.content.contains("How old are you?"));
    }

    let next = bot.reply(&from("1", Some("ada"), "36")).await;
    assert!(next.content.contains("Which city"));
    say_all(&bot, &["-"; 6]).await;
    assert_eq!(store.get_profile("1").await.unwrap().unwrap().age, Some(36));
}

#[tokio::test]
async fn extreme_experience_is_rejected_and_accrual_keeps_working() {
    let (bot, store) = setup().await;
    bot.reply(&from("1", Some("ada"), "/start")).await;
    say_all(&bot, &["-"; 5]).await;

    let retry = bot.reply(&from("1", Some("ada"), "9223372036854775807")).await;
    assert!(retry.content.starts_with("Experience must be"));
    say_all(&bot, &["1200", "-", "-", "-"]).await;

    let job = AccrualJob::new(store.clone());
    let later = Utc::now() + chrono::Duration::days(62);
    let first = job.run_once(later).await.unwrap();
    assert_eq!(first.advanced, 1);
    let second = job.run_once(later).await.unwrap();
    assert_eq!(second.unchanged, 1);

    let shown = bot.reply(&from("1", Some("ada"), "/profile")).await;
    assert!(shown.content.contains("Experience: 100 years"));
}

#[tokio::test]
async fn start_when_registered_does_not_enter_the_flow() {
    let (bot, _store) = setup().await;
    register(&bot, "1", "ada", "london", "100").await;

    let reply = bot.reply(&from("1", Some("ada"), "/start")).await;
    assert!(reply.content.contains("already registered"));

    // Plain text afterwards is not treated as an answer.
    let hint = bot.reply(&from("1", Some("ada"), "Ada")).await;
    assert!(hint.content.contains("/start"));
}

#[tokio::test]
async fn update_merges_into_the_stored_profile() {
    let (bot, store) = setup().await;
    bot.reply(&from("1", Some("ada"), "/start")).await;
    say_all(&bot, &FULL_ANSWERS).await;

    bot.reply(&from("1", Some("ada"), "/update")).await;
    say_all(&bot, &["-", "-", "37", "Paris", "-", "-", "-", "-", "-"]).await;

    let profile = store.get_profile("1").await.unwrap().unwrap();
    assert_eq!(profile.first_name.as_deref(), Some("Ada"));
    assert_eq!(profile.age, Some(37));
    assert_eq!(profile.city.as_deref(), Some("paris"));
    assert_eq!(profile.salary, Some(5000));
    assert_eq!(profile.company.as_deref(), Some("Analytical Engines"));
}

#[tokio::test]
async fn cancel_discards_the_draft() {
    let (bot, store) = setup().await;
    bot.reply(&from("1", Some("ada"), "/start")).await;
    say_all(&bot, &["Ada"]).await;

    let cancelled = bot.reply(&from("1", Some("ada"), "/cancel")).await;
    assert!(cancelled.content.starts_with("Cancelled"));
    assert!(store.get_profile("1").await.unwrap().is_none());

    let again = bot.reply(&from("1", Some("ada"), "/cancel")).await;
    assert_eq!(again.content, "There is nothing to cancel.");
}

#[tokio::test]
async fn commands_pre_empt_an_active_flow() {
    let (bot, store) = setup().await;
    register(&bot, "2", "bob", "rome", "100").await;

    bot.reply(&from("1", Some("ada"), "/start")).await;
    say_all(&bot, &["Ada"]).await;

    let stats = bot.reply(&from("1", Some("ada"), "/stats")).await;
    assert!(stats.content.contains("Registered developers: 1"));

    // The registration draft survives the interruption.
    let next = bot.reply(&from("1", Some("ada"), "Lovelace")).await;
    assert!(next.content.contains("How old are you?"));

    // Entering search replaces it.
    bot.reply(&from("1", Some("ada"), "/search")).await;
    let result = bot.reply(&from("1", Some("ada"), "Rome")).await;
    assert!(result.content.starts_with("Found 1 in rome"));
    assert!(store.get_profile("1").await.unwrap().is_none());
}

// ── Search ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_suggests_cities_and_finds_matches() {
    let (bot, _store) = setup().await;
    register(&bot, "2", "bob", "Paris", "100").await;
    register(&bot, "3", "eve", "paris", "100").await;
    register(&bot, "4", "max", "Rome", "100").await;

    let prompt = bot.reply(&from("1", Some("ada"), "/search")).await;
    assert_eq!(
        prompt.keyboard,
        Keyboard::Choices(vec!["paris".to_string(), "rome".to_string()])
    );

    let empty = bot.reply(&from("1", Some("ada"), "   ")).await;
    assert!(empty.content.starts_with("Please type a city name."));

    let found = bot.reply(&from("1", Some("ada"), " PARIS ")).await;
    assert!(found.content.starts_with("Found 2 in paris"));
    assert!(found.content.contains("@bob"));
    assert!(found.content.contains("@eve"));

    bot.reply(&from("1", Some("ada"), "/search")).await;
    let none = bot.reply(&from("1", Some("ada"), "Oslo")).await;
    assert_eq!(none.content, "Nobody from oslo has registered yet.");
}

// ── Stats & misc ────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_count_and_average_salary() {
    let (bot, _store) = setup().await;
    let empty = bot.reply(&from("1", None, "/stats")).await;
    assert_eq!(
        empty.content,
        "Registered developers: 0\nAverage salary: 0.00"
    );

    register(&bot, "2", "bob", "rome", "1000").await;
    register(&bot, "3", "eve", "rome", "2000").await;
    register(&bot, "4", "max", "rome", "-").await;

    let stats = bot.reply(&from("1", None, "/stats")).await;
    assert_eq!(
        stats.content,
        "Registered developers: 3\nAverage salary: 1500.00"
    );
}

#[tokio::test]
async fn help_and_unknown_commands() {
    let (bot, _store) = setup().await;
    let help = bot.reply(&from("1", None, "/help")).await;
    assert!(help.content.contains("/search"));

    let unknown = bot.reply(&from("1", None, "/dance")).await;
    assert!(unknown.content.contains("/dance"));
    assert!(unknown.content.contains("/help"));

    let idle = bot.reply(&from("1", None, "hello")).await;
    assert!(idle.content.contains("/start"));
}

#[tokio::test]
async fn profile_without_handle_falls_back_to_identity() {
    let (bot, _store) = setup().await;
    let none = bot.reply(&from("9", None, "/profile")).await;
    assert!(none.content.contains("no profile yet"));

    bot.reply(&from("9", None, "/start")).await;
    for _ in 0..9 {
        bot.reply(&from("9", None, "-")).await;
    }
    let shown = bot.reply(&from("9", None, "/profile")).await;
    assert_eq!(shown.content.matches(PLACEHOLDER).count(), 9);
}

// ── Store failures ──────────────────────────────────────────────────────

/// A store that is down for every call.
struct DownStore;

fn down<T>() -> Result<T, DatabaseError> {
    Err(DatabaseError::Query("connection reset by peer".to_string()))
}

#[async_trait]
impl ProfileStore for DownStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        down()
    }
    async fn get_profile(&self, _: &str) -> Result<Option<UserProfile>, DatabaseError> {
        down()
    }
    async fn find_by_handle(&self, _: &str) -> Result<Option<UserProfile>, DatabaseError> {
        down()
    }
    async fn find_by_city(&self, _: &str) -> Result<Vec<UserProfile>, DatabaseError> {
        down()
    }
    async fn upsert_profile(&self, _: &str, _: &ProfilePatch) -> Result<(), DatabaseError> {
        down()
    }
    async fn stats(&self) -> Result<ProfileStats, DatabaseError> {
        down()
    }
    async fn top_cities(&self, _: usize) -> Result<Vec<CityCount>, DatabaseError> {
        down()
    }
    async fn list_accrual_candidates(&self) -> Result<Vec<AccrualCandidate>, DatabaseError> {
        down()
    }
    async fn advance_experience(
        &self,
        _: &str,
        _: i64,
        _: Option<chrono::DateTime<chrono::Utc>>,
        _: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, DatabaseError> {
        down()
    }
}

#[tokio::test]
async fn store_failures_never_leak_error_text() {
    let bot = Bot::new(
        BotConfig::default(),
        BotDeps {
            store: Arc::new(DownStore),
        },
        ChannelManager::new(),
    );

    let stats = bot.reply(&from("1", None, "/stats")).await;
    assert_eq!(stats.content, TRANSIENT_FAILURE);
    assert!(!stats.content.contains("connection reset"));

    // Search still prompts, without suggestions.
    let prompt = bot.reply(&from("1", None, "/search")).await;
    assert_eq!(prompt.keyboard, Keyboard::Remove);
    let failed = bot.reply(&from("1", None, "oslo")).await;
    assert_eq!(failed.content, TRANSIENT_FAILURE);

    // The failed search released its draft.
    let idle = bot.reply(&from("1", None, "oslo")).await;
    assert!(idle.content.contains("/start"));

    // Registration via /update reaches the commit and fails there.
    bot.reply(&from("1", None, "/update")).await;
    let mut last = None;
    for _ in 0..9 {
        last = Some(bot.reply(&from("1", None, "-")).await);
    }
    assert_eq!(last.unwrap().content, TRANSIENT_FAILURE);
}

// ── Full loop through a channel ─────────────────────────────────────────

/// Delivers a fixed script of messages, then ends its stream.
struct ScriptedChannel {
    script: Mutex<Vec<IncomingMessage>>,
    replies: Arc<Mutex<Vec<OutgoingResponse>>>,
    registered: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "test"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let script = std::mem::take(&mut *self.script.lock().unwrap());
        Ok(Box::pin(futures::stream::iter(script)))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.replies.lock().unwrap().push(response);
        Ok(())
    }

    async fn register_commands(&self, commands: &[CommandInfo]) -> Result<(), ChannelError> {
        self.registered
            .lock()
            .unwrap()
            .extend(commands.iter().map(|c| c.name));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[tokio::test]
async fn run_loop_answers_every_message_in_order() {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let replies = Arc::new(Mutex::new(Vec::new()));
    let registered = Arc::new(Mutex::new(Vec::new()));

    let mut script = vec![from("1", Some("ada"), "/start")];
    script.extend(FULL_ANSWERS.iter().map(|a| from("1", Some("ada"), a)));
    script.push(from("1", Some("ada"), "/stats"));

    let mut channels = ChannelManager::new();
    channels.add(Box::new(ScriptedChannel {
        script: Mutex::new(script),
        replies: Arc::clone(&replies),
        registered: Arc::clone(&registered),
    }));

    let bot = Bot::new(
        BotConfig::default(),
        BotDeps {
            store: store.clone(),
        },
        channels,
    );
    timeout(TEST_TIMEOUT, bot.run())
        .await
        .expect("bot loop hung")
        .unwrap();

    let replies = replies.lock().unwrap();
    assert_eq!(replies.len(), 11);
    assert!(replies[0].content.contains("first name"));
    assert!(replies[9].content.contains("profile is saved"));
    assert_eq!(
        replies[10].content,
        "Registered developers: 1\nAverage salary: 5000.00"
    );

    assert!(registered.lock().unwrap().contains(&"search"));
    let profile = store.get_profile("1").await.unwrap().unwrap();
    assert_eq!(profile.experience_months, Some(30));
}
