//! Saved pull and publish schedules, checked once a minute while serving.

use chrono::{Datelike, Days, Local, NaiveDateTime, NaiveTime};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::models::publish::{PublishRequest, PublishStatus};
use crate::models::pull::{PullByConfigRequest, PullConfig, PullPlan};
use crate::models::settings::PublishConfig;
use crate::models::task::CreateTaskRequest;
use crate::pipeline::Pipeline;

pub const SCHEDULER_TICK: Duration = Duration::from_secs(60);
const DEFAULT_START: &str = "09:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    /// Days from Monday, 0 to 6.
    Weekly(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub cadence: Cadence,
    pub at: NaiveTime,
}

impl Schedule {
    /// Pull schedule of a saved config. None when no frequency is set.
    pub fn for_pull(config: &PullConfig) -> Option<Self> {
        let cadence = match config.frequency.as_deref()? {
            "daily" => Cadence::Daily,
            "weekly" => Cadence::Weekly(config.weekday.unwrap_or(0).min(6)),
            _ => return None,
        };
        let at = clock(config.start_time.as_deref().unwrap_or(DEFAULT_START))?;
        Some(Self { cadence, at })
    }

    /// Approved articles go out daily at `publish_time` when one is set.
    pub fn for_publish(config: &PublishConfig) -> Option<Self> {
        let at = clock(config.publish_time.as_deref()?)?;
        Some(Self {
            cadence: Cadence::Daily,
            at,
        })
    }

    /// Most recent slot at or before `now`.
    pub fn latest(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let (back, period) = match self.cadence {
            Cadence::Daily => (0, 1),
            Cadence::Weekly(day) => {
                let today = now.weekday().num_days_from_monday();
                ((today + 7 - u32::from(day)) % 7, 7)
            }
        };
        let slot = now
            .date()
            .checked_sub_days(Days::new(u64::from(back)))?
            .and_time(self.at);
        if slot <= now {
            return Some(slot);
        }
        Some(slot.date().checked_sub_days(Days::new(period))?.and_time(self.at))
    }

    /// Whether a slot fell in `(since, now]`.
    pub fn is_due(&self, since: NaiveDateTime, now: NaiveDateTime) -> bool {
        self.latest(now).is_some_and(|slot| slot > since)
    }
}

fn clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// What one scheduler pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduledRun {
    pub pulled: usize,
    pub queued: usize,
    pub published: usize,
}

impl Pipeline {
    /// Checks the saved schedules every [`SCHEDULER_TICK`]. Slots that fell
    /// while the process was down are not replayed.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SCHEDULER_TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            let mut since = Local::now().naive_local();
            tracing::info!("Scheduler started, checking every {}s", SCHEDULER_TICK.as_secs());

            loop {
                interval.tick().await;
                let now = Local::now().naive_local();
                let run = pipeline.run_due(since, now).await;
                if run != ScheduledRun::default() {
                    tracing::info!(
                        "Scheduled run: {} pulled, {} queued, {} published",
                        run.pulled,
                        run.queued,
                        run.published
                    );
                }
                since = now;
            }
        })
    }

    /// Runs each stage whose schedule has a slot in `(since, now]`. A failing
    /// stage is logged and does not stop the other.
    pub async fn run_due(&self, since: NaiveDateTime, now: NaiveDateTime) -> ScheduledRun {
        let mut run = ScheduledRun::default();

        match self.registry.load::<PullConfig>() {
            Ok(config) if Schedule::for_pull(&config).is_some_and(|s| s.is_due(since, now)) => {
                match self.scheduled_pull(&config).await {
                    Ok((pulled, queued)) => {
                        run.pulled = pulled;
                        run.queued = queued;
                    }
                    Err(e) => tracing::warn!("Scheduled pull failed: {}", e),
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not load the pull config: {}", e),
        }

        match self.registry.load::<PublishConfig>() {
            Ok(config) if Schedule::for_publish(&config).is_some_and(|s| s.is_due(since, now)) => {
                match self.publish_approved().await {
                    Ok(published) => run.published = published,
                    Err(e) => tracing::warn!("Scheduled publish failed: {}", e),
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not load the publish config: {}", e),
        }

        run
    }

    async fn scheduled_pull(&self, config: &PullConfig) -> Result<(usize, usize)> {
        let plan = PullPlan::from_config(config, PullByConfigRequest::default())?;
        let (result, ingest) = self.start_pull(plan).await?;
        if let Some(ingest) = ingest {
            if let Err(e) = ingest.await {
                tracing::warn!("README ingest ended abnormally: {}", e);
            }
        }
        let queued = self.queue_fetched()?;
        Ok((result.count, queued))
    }

    /// Queues a generation task for every fetched record that has none.
    pub fn queue_fetched(&self) -> Result<usize> {
        let records = self.storage.fetched_without_task()?;
        for record in &records {
            self.create_task(
                CreateTaskRequest {
                    pull_record_id: Some(record.id),
                    ..CreateTaskRequest::default()
                },
                None,
            )?;
        }
        Ok(records.len())
    }

    /// Publishes every approved article not yet published anywhere to all
    /// configured targets. Returns how many reached at least one target.
    pub async fn publish_approved(&self) -> Result<usize> {
        let mut published = 0;
        for pending in self.publish_pending()? {
            let report = self
                .publish(PublishRequest {
                    article_id: pending.article_id,
                    targets: Vec::new(),
                })
                .await?;
            if report
                .outcomes
                .iter()
                .any(|o| o.status == PublishStatus::Published)
            {
                published += 1;
            }
        }
        Ok(published)
    }
}
