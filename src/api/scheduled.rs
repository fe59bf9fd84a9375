//! Scheduled message outbox.
//!
//! Rows are materialized ahead of time by [`ScheduledDispatchRunner::schedule`]
//! and drained by [`ScheduledDispatchRunner::run_due`], which an external
//! trigger calls through the internal API. A row is claimed (`pending` ->
//! `sending`) before its send, so overlapping runs never send it twice.

use crate::{
    consts, metric,
    models::scheduled_message::ScheduledMessage,
    phone::PhoneNormalizer,
    repo, utils,
    whatsapp::facade::MessagingFacade,
};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub processed: u32,
    pub success: u32,
    pub failed: u32,
}

/// Rows to create for a template or automation flagged as scheduled.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub template_id: Option<i64>,
    pub automation_id: Option<i64>,
    pub phones: Vec<String>,
    pub message: String,
    pub date: NaiveDate,
    /// Local time of day; 09:00 when absent.
    pub time: Option<NaiveTime>,
}

pub struct ScheduledDispatchRunner {
    repo: repo::ImplAppRepo,
    facade: Arc<MessagingFacade>,
    normalizer: PhoneNormalizer,
    timezone: chrono_tz::Tz,
}

impl ScheduledDispatchRunner {
    pub fn new(
        repo: repo::ImplAppRepo,
        facade: Arc<MessagingFacade>,
        normalizer: PhoneNormalizer,
        timezone: chrono_tz::Tz,
    ) -> Self {
        Self {
            repo,
            facade,
            normalizer,
            timezone,
        }
    }

    /// Sends every due pending row, oldest first, one at a time.
    ///
    /// A failing row is marked `failed` and the batch goes on. Rows claimed by
    /// a concurrent run are skipped and not counted.
    pub async fn run_due(&self, now: DateTime<Utc>) -> anyhow::Result<DispatchSummary> {
        let due = self
            .repo
            .get_due_scheduled_messages(now, consts::SCHEDULED_BATCH_SIZE)
            .await
            .context("failed to load due scheduled messages")?;

        let mut summary = DispatchSummary::default();

        for message in due {
            let claimed = utils::best_effort(
                "scheduled message claim",
                self.repo.claim_scheduled_message(message.id),
            )
            .await;
            if claimed != Some(true) {
                continue;
            }

            summary.processed += 1;
            if self.dispatch(&message).await {
                summary.success += 1;
            } else {
                summary.failed += 1;
            }
        }

        logfire::info!(
            "scheduled dispatch: {processed} processed, {success} sent, {failed} failed",
            processed = summary.processed as i64,
            success = summary.success as i64,
            failed = summary.failed as i64
        );

        Ok(summary)
    }

    async fn dispatch(&self, message: &ScheduledMessage) -> bool {
        let phone = self.normalizer.normalize(&message.phone);

        match self.facade.send_plain_text(&phone, &message.message).await {
            Ok(_) => {
                metric::incr_scheduled_statds("sent");
                utils::best_effort(
                    "scheduled message sent",
                    self.repo.mark_scheduled_sent(message.id, Utc::now()),
                )
                .await;
                true
            }
            Err(e) => {
                metric::incr_scheduled_statds("failed");
                logfire::warn!(
                    "scheduled message {id} failed: {error}",
                    id = message.id,
                    error = e.to_string()
                );
                utils::best_effort(
                    "scheduled message failed",
                    self.repo.mark_scheduled_failed(message.id, &e.to_string()),
                )
                .await;
                false
            }
        }
    }

    /// Creates one pending row per distinct valid phone. Returns the new ids.
    pub async fn schedule(&self, request: &ScheduleRequest) -> anyhow::Result<Vec<i64>> {
        let scheduled_at = self.scheduled_at(request.date, request.time)?;

        let mut phones: Vec<String> = Vec::with_capacity(request.phones.len());
        for raw in &request.phones {
            match self.normalizer.normalize_valid(raw) {
                Some(phone) if !phones.contains(&phone) => phones.push(phone),
                Some(_) => {}
                None => logfire::warn!(
                    "skipping invalid phone in schedule request: {phone}",
                    phone = raw.clone()
                ),
            }
        }
        anyhow::ensure!(!phones.is_empty(), "no valid phone number to schedule");

        let messages: Vec<ScheduledMessage> = phones
            .into_iter()
            .map(|phone| {
                ScheduledMessage::new_pending(
                    request.template_id,
                    request.automation_id,
                    phone,
                    request.message.clone(),
                    scheduled_at,
                )
            })
            .collect();

        self.repo.insert_scheduled_messages(&messages).await
    }

    /// Combines a local date and time of day in the configured time zone.
    pub fn scheduled_at(
        &self,
        date: NaiveDate,
        time: Option<NaiveTime>,
    ) -> anyhow::Result<DateTime<Utc>> {
        let time = match time {
            Some(time) => time,
            None => NaiveTime::from_hms_opt(consts::DEFAULT_SCHEDULE_HOUR, 0, 0)
                .context("invalid default schedule hour")?,
        };

        let local = self
            .timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .with_context(|| format!("{date} {time} does not exist in {}", self.timezone))?;

        Ok(local.with_timezone(&Utc))
    }

    /// Pending rows only; false when already picked up.
    pub async fn cancel(&self, id: i64) -> anyhow::Result<bool> {
        self.repo.cancel_scheduled_message(id).await
    }
}
