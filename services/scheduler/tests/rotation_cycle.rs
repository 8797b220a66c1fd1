//! Rotation engine integration tests against in-memory storage.
//!
//! All scenarios run on 2026-03-01, when New York is on EST: the default
//! daily window is `[13:00, 01:00)` UTC and flash windows open every three
//! hours on the UTC clock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempo_scheduler::clock::ManualClock;
use tempo_scheduler::collaborators::{
    CollaboratorError, ContentGenerator, PollDraft, Signal, StaticSignalSource, TemplateGenerator,
};
use tempo_scheduler::polls::{MemoryPollRepository, NewPoll, PollKind, PollRepository, PollStatus};
use tempo_scheduler::rotation::{
    GenerationError, GenerationOutcome, RotationEngine, RotationSettings, Slot,
};
use tempo_window::RotationWindow;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
}

struct Fixture {
    repo: Arc<MemoryPollRepository>,
    signals: Arc<StaticSignalSource>,
    clock: ManualClock,
    engine: RotationEngine,
}

impl Fixture {
    fn new(now: DateTime<Utc>) -> Self {
        let settings = RotationSettings::default();
        let generator = Arc::new(TemplateGenerator::new(settings.categories.clone()));
        Self::with_generator(now, generator)
    }

    fn with_generator(now: DateTime<Utc>, generator: Arc<dyn ContentGenerator>) -> Self {
        let repo = Arc::new(MemoryPollRepository::new());
        let signals = Arc::new(StaticSignalSource::default());
        let clock = ManualClock::new(now);
        let engine = RotationEngine::new(
            repo.clone(),
            signals.clone(),
            generator,
            Arc::new(clock.clone()),
            RotationSettings::default(),
        );
        Self {
            repo,
            signals,
            clock,
            engine,
        }
    }

    fn engine_sharing_repo(&self, generator: Arc<dyn ContentGenerator>) -> RotationEngine {
        RotationEngine::new(
            self.repo.clone(),
            self.signals.clone(),
            generator,
            Arc::new(self.clock.clone()),
            RotationSettings::default(),
        )
    }

    async fn all_polls(&self) -> Vec<tempo_scheduler::polls::Poll> {
        self.repo
            .get_units_created_since(at(0, 0, 0) - Duration::days(365), None)
            .await
            .unwrap()
    }
}

fn new_poll(kind: PollKind, window: RotationWindow, status: PollStatus) -> NewPoll {
    NewPoll {
        kind,
        category: "science".to_string(),
        question: "Will it rain on the comet?".to_string(),
        choices: vec!["Yes".to_string(), "No".to_string()],
        source_title: "Comet forecast published".to_string(),
        source_signal: "fixture".to_string(),
        synthesized: false,
        window,
        initial_status: status,
        created_at: window.start,
    }
}

fn signal(category: &str, title: &str, score: f64) -> Signal {
    Signal {
        title: title.to_string(),
        summary: format!("{title} (summary)"),
        category: category.to_string(),
        url: None,
        score,
    }
}

#[tokio::test]
async fn current_window_follows_the_hour() {
    let fx = Fixture::new(at(10, 0, 0));
    let ten_to_eleven = RotationWindow::new(at(10, 0, 0), at(11, 0, 0)).unwrap();

    assert_eq!(fx.engine.current_window(), ten_to_eleven);
    fx.clock.set(at(10, 59, 59));
    assert_eq!(fx.engine.current_window(), ten_to_eleven);
    fx.clock.set(at(11, 0, 0));
    assert_eq!(
        fx.engine.current_window(),
        RotationWindow::new(at(11, 0, 0), at(12, 0, 0)).unwrap()
    );
    assert_eq!(fx.engine.previous_window(), ten_to_eleven);
}

#[tokio::test]
async fn close_expired_closes_the_finished_poll() {
    let fx = Fixture::new(at(10, 30, 0));
    let finished = RotationWindow::new(at(9, 0, 0), at(10, 0, 0)).unwrap();
    let poll = fx
        .repo
        .create(new_poll(PollKind::Flash, finished, PollStatus::Active))
        .await
        .unwrap();

    assert_eq!(fx.engine.close_expired().await.unwrap(), 1);

    let closed = fx.repo.get(poll.id).await.unwrap();
    assert_eq!(closed.status, PollStatus::Closed);
    assert_eq!(closed.closed_at, Some(at(10, 30, 0)));

    assert_eq!(fx.engine.close_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn close_expired_closes_a_scheduled_poll_whose_window_passed() {
    // No replica ran between 09:00 and 10:00, so the poll never opened.
    let fx = Fixture::new(at(10, 30, 0));
    let missed = RotationWindow::new(at(9, 0, 0), at(10, 0, 0)).unwrap();
    let poll = fx
        .repo
        .create(new_poll(PollKind::Flash, missed, PollStatus::Scheduled))
        .await
        .unwrap();

    let summary = fx.engine.run_rotation_cycle().await.unwrap();
    assert_eq!(summary.closed_count, 1);
    assert_eq!(summary.activated_count, 0);

    let closed = fx.repo.get(poll.id).await.unwrap();
    assert_eq!(closed.status, PollStatus::Closed);
    assert_eq!(closed.activated_at, None);
    assert_eq!(closed.closed_at, Some(at(10, 30, 0)));
}

#[tokio::test]
async fn generation_refuses_a_slot_that_already_ended() {
    let fx = Fixture::new(at(15, 30, 0));
    let slot = Slot {
        kind: PollKind::Flash,
        window: RotationWindow::new(at(12, 0, 0), at(13, 0, 0)).unwrap(),
    };

    let err = fx.engine.generate_for(slot).await.unwrap_err();
    assert!(matches!(err, GenerationError::SlotEnded { kind: PollKind::Flash, .. }));
    assert!(fx.all_polls().await.is_empty());
}

#[tokio::test]
async fn rotation_cycle_is_idempotent_within_a_window() {
    let fx = Fixture::new(at(15, 30, 0));

    let first = fx.engine.run_rotation_cycle().await.unwrap();
    assert_eq!(first.generated.len(), 2);
    let daily = first.generated_poll().unwrap();
    assert_eq!(daily.kind, PollKind::Daily);
    assert_eq!(daily.status, PollStatus::Active);
    assert_eq!(daily.scheduled_start, at(13, 0, 0));
    let flash = &first.generated[1];
    assert_eq!(flash.kind, PollKind::Flash);
    assert_eq!(flash.status, PollStatus::Scheduled);
    assert_eq!(flash.scheduled_start, at(18, 0, 0));
    assert_eq!(first.newly_opened().len(), 1);

    let second = fx.engine.run_rotation_cycle().await.unwrap();
    assert_eq!(second.closed_count, 0);
    assert_eq!(second.activated_count, 0);
    assert!(second.generated_poll().is_none());
    assert!(second.newly_opened().is_empty());

    assert_eq!(fx.all_polls().await.len(), 2);
}

#[tokio::test]
async fn rotation_cycle_walks_a_flash_poll_through_its_window() {
    let fx = Fixture::new(at(15, 30, 0));
    fx.engine.run_rotation_cycle().await.unwrap();

    fx.clock.set(at(18, 0, 5));
    let opened = fx.engine.run_rotation_cycle().await.unwrap();
    assert_eq!(opened.closed_count, 0);
    assert_eq!(opened.activated_count, 1);
    assert_eq!(opened.activated[0].scheduled_start, at(18, 0, 0));
    assert_eq!(opened.activated[0].activated_at, Some(at(18, 0, 5)));
    assert_eq!(opened.generated.len(), 1);
    assert_eq!(opened.generated[0].scheduled_start, at(21, 0, 0));

    fx.clock.set(at(19, 0, 5));
    let closed = fx.engine.run_rotation_cycle().await.unwrap();
    assert_eq!(closed.closed_count, 1);
    assert_eq!(closed.activated_count, 0);
    assert!(closed.generated.is_empty());

    let closed_polls = fx.repo.list_by_status(PollStatus::Closed).await.unwrap();
    assert_eq!(closed_polls.len(), 1);
    assert_eq!(closed_polls[0].scheduled_end, at(19, 0, 0));
}

/// Hands control back to the scheduler before drafting, so two engines
/// both get past the filled-slot check before either writes.
struct YieldingGenerator(TemplateGenerator);

#[async_trait]
impl ContentGenerator for YieldingGenerator {
    async fn generate(
        &self,
        signals: &[Signal],
        avoid_categories: &[String],
    ) -> Result<Vec<PollDraft>, CollaboratorError> {
        tokio::task::yield_now().await;
        self.0.generate(signals, avoid_categories).await
    }
}

#[tokio::test]
async fn concurrent_generation_fills_a_slot_once() {
    let categories = RotationSettings::default().categories;
    let fx = Fixture::with_generator(
        at(15, 30, 0),
        Arc::new(YieldingGenerator(TemplateGenerator::new(categories.clone()))),
    );
    let other =
        fx.engine_sharing_repo(Arc::new(YieldingGenerator(TemplateGenerator::new(categories))));
    let slot = Slot {
        kind: PollKind::Flash,
        window: RotationWindow::new(at(18, 0, 0), at(19, 0, 0)).unwrap(),
    };

    let (a, b) = tokio::join!(fx.engine.generate_for(slot), other.generate_for(slot));
    let (a, b) = (a.unwrap(), b.unwrap());

    // The loser hit the uniqueness constraint and read the winner's poll back.
    assert!(matches!(
        (&a, &b),
        (GenerationOutcome::Created(_), GenerationOutcome::Existing(_))
            | (GenerationOutcome::Existing(_), GenerationOutcome::Created(_))
    ));
    assert_eq!(a.poll().id, b.poll().id);
    assert_eq!(fx.all_polls().await.len(), 1);
}

#[tokio::test]
async fn generation_avoids_recent_categories_and_titles() {
    let fx = Fixture::new(at(15, 30, 0));
    let earlier = RotationWindow::new(at(12, 0, 0), at(13, 0, 0)).unwrap();
    let mut recent = new_poll(PollKind::Flash, earlier, PollStatus::Closed);
    recent.source_title = "Mars rover finds water ice".to_string();
    fx.repo.create(recent).await.unwrap();

    fx.signals.set(vec![
        signal("science", "Mars rover finds water ice deposits", 0.9),
        signal("sports", "Underdogs take the championship final", 0.5),
    ]);

    let outcome = fx.engine.force_generate().await.unwrap();
    let poll = outcome.poll();
    assert!(outcome.is_created());
    assert_eq!(poll.kind, PollKind::Daily);
    assert_eq!(poll.category, "sports");
    assert_eq!(poll.source_title, "Underdogs take the championship final");
    assert!(poll.synthesized);
}

#[tokio::test]
async fn repetitive_signals_fall_back_to_an_evergreen_question() {
    let fx = Fixture::new(at(15, 30, 0));
    let earlier = RotationWindow::new(at(12, 0, 0), at(13, 0, 0)).unwrap();
    let mut recent = new_poll(PollKind::Flash, earlier, PollStatus::Closed);
    recent.source_title = "Mars rover finds water ice".to_string();
    fx.repo.create(recent).await.unwrap();

    fx.signals
        .set(vec![signal("technology", "Mars rover finds water ice again", 0.9)]);

    let poll = fx.engine.force_generate().await.unwrap().into_poll();
    assert_eq!(poll.category, "technology");
    assert!(poll.source_title.is_empty());
    assert_eq!(poll.source_signal, "evergreen");
}

struct BrokenGenerator;

#[async_trait]
impl ContentGenerator for BrokenGenerator {
    async fn generate(
        &self,
        _signals: &[Signal],
        _avoid_categories: &[String],
    ) -> Result<Vec<PollDraft>, CollaboratorError> {
        Err(CollaboratorError::Status {
            endpoint: "http://generator.invalid".to_string(),
            status: 500,
            body: "boom".to_string(),
        })
    }
}

#[tokio::test]
async fn generator_failure_does_not_fail_the_cycle() {
    let fx = Fixture::with_generator(at(15, 30, 0), Arc::new(BrokenGenerator));
    let finished = RotationWindow::new(at(14, 0, 0), at(15, 0, 0)).unwrap();
    fx.repo
        .create(new_poll(PollKind::Flash, finished, PollStatus::Active))
        .await
        .unwrap();

    let summary = fx.engine.run_rotation_cycle().await.unwrap();
    assert_eq!(summary.closed_count, 1);
    assert!(summary.generated.is_empty());

    assert!(fx.engine.force_generate().await.is_err());
}

#[tokio::test]
async fn repository_outage_fails_the_cycle() {
    let fx = Fixture::new(at(15, 30, 0));
    fx.repo.set_unavailable(true);

    assert!(fx.engine.run_rotation_cycle().await.is_err());
}

#[tokio::test]
async fn top_up_fills_upcoming_flash_windows() {
    let fx = Fixture::new(at(15, 30, 0));

    let report = fx.engine.top_up(2).await.unwrap();
    assert_eq!(report.upcoming_before, 0);
    assert_eq!(report.upcoming_after, 2);
    assert_eq!(report.created.len(), 3);

    let upcoming: Vec<_> = fx
        .repo
        .list_by_status(PollStatus::Scheduled)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.scheduled_start)
        .collect();
    assert_eq!(upcoming, vec![at(18, 0, 0), at(21, 0, 0)]);

    let again = fx.engine.top_up(2).await.unwrap();
    assert_eq!(again.upcoming_before, 2);
    assert!(again.created.is_empty());
}

#[tokio::test]
async fn archive_moves_only_old_closed_polls() {
    let fx = Fixture::new(at(15, 30, 0));
    let old = RotationWindow::new(
        at(9, 0, 0) - Duration::days(40),
        at(10, 0, 0) - Duration::days(40),
    )
    .unwrap();
    let recent = RotationWindow::new(at(9, 0, 0), at(10, 0, 0)).unwrap();
    fx.repo
        .create(new_poll(PollKind::Flash, old, PollStatus::Closed))
        .await
        .unwrap();
    fx.repo
        .create(new_poll(PollKind::Flash, recent, PollStatus::Closed))
        .await
        .unwrap();

    assert_eq!(fx.engine.archive_closed(Duration::days(30)).await.unwrap(), 1);

    let archived = fx.repo.list_by_status(PollStatus::Archived).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].scheduled_end, old.end);
    assert!(archived[0].archived_at.is_some());
}
