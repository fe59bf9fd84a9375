//! # WhatsApp Webhook Handler
//!
//! Processes verified webhook payloads: inbound messages (with the COD reply
//! flow) and delivery status callbacks.

use super::{
    facade::MessagingFacade,
    schemas::{MediaMessage, Message, Status, WebhookPayload},
};
use crate::{
    consts, metric,
    models::{
        chat_session::ChatActivity,
        inbound::{InboundMessageLog, MessageStatusLog},
        order::OrderStatus,
    },
    phone::PhoneNormalizer,
    repo, utils,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Typed content of an inbound message, picked by its declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundContent {
    Text(String),
    /// image, video, audio, document and sticker messages
    Media {
        kind: String,
        media_id: String,
        caption: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        name: Option<String>,
    },
    Contacts(usize),
    /// Any other type, stored with its raw payload only
    Other(String),
}

impl InboundContent {
    pub fn from_message(message: &Message) -> Self {
        let media = |kind: &str, media: &Option<MediaMessage>| {
            media.as_ref().map(|m| Self::Media {
                kind: kind.to_string(),
                media_id: m.id.clone(),
                caption: m.caption.clone(),
            })
        };

        let content = match message.msg_type.as_str() {
            "text" => message.text.as_ref().map(|t| Self::Text(t.body.clone())),
            "image" => media("image", &message.image),
            "video" => media("video", &message.video),
            "audio" => media("audio", &message.audio),
            "document" => media("document", &message.document),
            "sticker" => media("sticker", &message.sticker),
            "location" => message.location.as_ref().map(|l| Self::Location {
                latitude: l.latitude,
                longitude: l.longitude,
                name: l.name.clone(),
            }),
            "contacts" => message.contacts.as_ref().map(|c| Self::Contacts(c.len())),
            _ => None,
        };

        content.unwrap_or_else(|| Self::Other(message.msg_type.clone()))
    }

    /// Human readable line stored as message text and chat preview.
    pub fn summary(&self) -> String {
        match self {
            Self::Text(body) => body.clone(),
            Self::Media {
                kind,
                caption: Some(caption),
                ..
            } => format!("[{kind}] {caption}"),
            Self::Media { kind, .. } => format!("[{kind}]"),
            Self::Location {
                name: Some(name), ..
            } => format!("[location] {name}"),
            Self::Location {
                latitude,
                longitude,
                ..
            } => format!("[location] {latitude},{longitude}"),
            Self::Contacts(count) => format!("[contacts] {count}"),
            Self::Other(kind) => format!("[{kind}]"),
        }
    }

    fn media_id(&self) -> Option<String> {
        match self {
            Self::Media { media_id, .. } => Some(media_id.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CodReply {
    Yes,
    No,
}

impl CodReply {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("yes") {
            Some(Self::Yes)
        } else if text.eq_ignore_ascii_case("no") {
            Some(Self::No)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    CodConfirmed { order_id: i64 },
    CodCancelled { order_id: i64 },
    /// Stored in the inbound log; `duplicate` when the id was already there.
    Logged { duplicate: bool },
}

pub struct InboundEventProcessor {
    repo: repo::ImplAppRepo,
    facade: Arc<MessagingFacade>,
    normalizer: PhoneNormalizer,
}

impl InboundEventProcessor {
    pub fn new(
        repo: repo::ImplAppRepo,
        facade: Arc<MessagingFacade>,
        normalizer: PhoneNormalizer,
    ) -> Self {
        Self {
            repo,
            facade,
            normalizer,
        }
    }

    /// Handles every message and status in a verified payload.
    ///
    /// A failing event is logged and does not stop the others.
    pub async fn process_webhook(&self, payload: &WebhookPayload) {
        let values = payload
            .entry
            .iter()
            .flat_map(|entry| &entry.changes)
            .filter(|change| change.field == "messages")
            .map(|change| &change.value);

        for value in values {
            for message in value.messages.iter().flatten() {
                let profile_name = value.profile_name(&message.from);
                if let Err(e) = self.handle_message(message, profile_name).await {
                    logfire::error!("Failed to handle message: {error}", error = e.to_string());
                }
            }

            for status in value.statuses.iter().flatten() {
                self.handle_status(status).await;
            }
        }
    }

    pub async fn handle_message(
        &self,
        message: &Message,
        profile_name: Option<&str>,
    ) -> anyhow::Result<InboundOutcome> {
        metric::incr_webhook_statds("message");

        let from = self.normalizer.normalize(&message.from);
        let content = InboundContent::from_message(message);

        let cod_reply = match &content {
            InboundContent::Text(body) => CodReply::parse(body),
            _ => None,
        };
        if let Some(reply) = cod_reply {
            match self.resolve_cod_order(&from, reply).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {}
                Err(e) => logfire::warn!(
                    "COD reply from {from} not resolved, storing it as a message: {error}",
                    from = from.clone(),
                    error = e.to_string()
                ),
            }
        }

        let log = InboundMessageLog {
            message_id: message.id.clone(),
            from_phone: from.clone(),
            to_phone: None,
            message_type: message.msg_type.clone(),
            message_text: Some(content.summary()),
            media_url: content.media_id(),
            timestamp: parse_timestamp(&message.timestamp),
            status: consts::INBOUND_MESSAGE_RECEIVED.to_string(),
            raw_payload: serde_json::to_string(message)?,
        };

        let inserted =
            utils::best_effort("inbound message log", self.repo.insert_inbound_message(&log))
                .await;
        if inserted == Some(false) {
            logfire::info!(
                "Duplicate webhook delivery for {message_id}",
                message_id = message.id.clone()
            );
            return Ok(InboundOutcome::Logged { duplicate: true });
        }

        let activity = ChatActivity {
            customer_phone: from,
            customer_name: profile_name.map(str::to_string),
            last_message: content.summary(),
            at: log.timestamp,
        };
        utils::best_effort("chat session upsert", self.repo.upsert_chat_session(&activity)).await;

        Ok(InboundOutcome::Logged { duplicate: false })
    }

    /// Confirms or cancels the latest COD order awaiting a reply from `phone`.
    ///
    /// `None` when no such order exists, so the message is handled like any other.
    async fn resolve_cod_order(
        &self,
        phone: &str,
        reply: CodReply,
    ) -> anyhow::Result<Option<InboundOutcome>> {
        let Some(order) = self
            .repo
            .find_pending_cod_orders(phone)
            .await?
            .into_iter()
            .find(|order| self.normalizer.is_same_phone(&order.customer_phone, phone))
        else {
            return Ok(None);
        };

        let (status, acknowledgement, outcome) = match reply {
            CodReply::Yes => (
                OrderStatus::Confirmed,
                consts::COD_CONFIRMED_REPLY,
                InboundOutcome::CodConfirmed { order_id: order.id },
            ),
            CodReply::No => (
                OrderStatus::Cancelled,
                consts::COD_CANCELLED_REPLY,
                InboundOutcome::CodCancelled { order_id: order.id },
            ),
        };

        self.repo.update_order_status(order.id, status.clone()).await?;
        logfire::info!(
            "COD order {order_number} moved to {status}",
            order_number = order.order_number.clone(),
            status = status.to_string()
        );
        metric::incr_webhook_statds(&format!("cod_{status}"));

        // the transition stands even if the acknowledgement cannot be delivered
        if let Err(e) = self.facade.send_plain_text(phone, acknowledgement).await {
            logfire::warn!(
                "COD acknowledgement for order {order_number} failed: {error}",
                order_number = order.order_number.clone(),
                error = e.to_string()
            );
        }

        Ok(Some(outcome))
    }

    pub async fn handle_status(&self, status: &Status) {
        metric::incr_webhook_statds(&format!("status_{}", status.status));

        let first_error = (status.status == "failed")
            .then(|| status.errors.first())
            .flatten();

        let log = MessageStatusLog {
            message_id: status.id.clone(),
            status: status.status.clone(),
            timestamp: parse_timestamp(&status.timestamp),
            error_code: first_error.map(|e| e.code.to_string()),
            error_message: first_error.and_then(|e| e.message.clone().or_else(|| e.title.clone())),
        };

        utils::best_effort("message status log", self.repo.insert_message_status(&log)).await;
    }
}

/// Provider timestamps are unix seconds sent as strings.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repo::{
            AppRepo, MockAppRepo,
            sqlite::{SqlxSqliteRepo, in_memory_repo, insert_test_order},
        },
        whatsapp::{
            client::MockMessagingTransport,
            dispatcher::tests::{accepted, dispatcher},
            schemas::{StatusError, TextMessage},
        },
    };
    use std::collections::HashMap;

    fn processor(transport: MockMessagingTransport, repo: Arc<SqlxSqliteRepo>) -> InboundEventProcessor {
        let facade = MessagingFacade::new(
            Arc::new(dispatcher(transport)),
            repo.clone(),
            "en",
            "shop.example.com",
        );
        InboundEventProcessor::new(repo, Arc::new(facade), PhoneNormalizer::new("91"))
    }

    fn text_message(id: &str, from: &str, body: &str) -> Message {
        Message {
            from: from.into(),
            id: id.into(),
            timestamp: "1760000000".into(),
            msg_type: "text".into(),
            text: Some(TextMessage { body: body.into() }),
            image: None,
            video: None,
            document: None,
            audio: None,
            sticker: None,
            location: None,
            contacts: None,
            context: None,
            other: HashMap::new(),
        }
    }

    async fn order_status(repo: &SqlxSqliteRepo, order_id: i64) -> String {
        sqlx::query_scalar::<_, String>("SELECT status FROM orders WHERE id=$1;")
            .bind(order_id)
            .fetch_one(&repo.db_pool)
            .await
            .unwrap()
    }

    #[ntex::test]
    async fn test_cod_yes_then_no() {
        let repo = Arc::new(in_memory_repo().await);
        let order_id = insert_test_order(&repo, "9876543210", "cod", "pending", Utc::now()).await;

        let mut transport = MockMessagingTransport::new();
        transport
            .expect_post_message()
            .withf(|payload| payload["text"]["body"] == consts::COD_CONFIRMED_REPLY)
            .times(1)
            .returning(|_| accepted("wamid.ACK"));
        let processor = processor(transport, repo.clone());

        let outcome = processor
            .handle_message(&text_message("wamid.1", "919876543210", " Yes "), Some("Asha"))
            .await
            .unwrap();
        assert_eq!(outcome, InboundOutcome::CodConfirmed { order_id });
        assert_eq!(order_status(&repo, order_id).await, "confirmed");

        // nothing left awaiting a reply: stored as a regular message
        let outcome = processor
            .handle_message(&text_message("wamid.2", "919876543210", "no"), Some("Asha"))
            .await
            .unwrap();
        assert_eq!(outcome, InboundOutcome::Logged { duplicate: false });
        assert_eq!(order_status(&repo, order_id).await, "confirmed");
    }

    #[ntex::test]
    async fn test_cod_no_cancels_latest_processing_order() {
        let repo = Arc::new(in_memory_repo().await);
        let older = Utc::now() - chrono::Duration::days(1);
        let first = insert_test_order(&repo, "98765 43210", "cash_on_delivery", "pending", older).await;
        let latest = insert_test_order(&repo, "9876543210", "COD", "processing", Utc::now()).await;

        let mut transport = MockMessagingTransport::new();
        transport
            .expect_post_message()
            .withf(|payload| payload["text"]["body"] == consts::COD_CANCELLED_REPLY)
            .times(1)
            .returning(|_| accepted("wamid.ACK"));
        let processor = processor(transport, repo.clone());

        let outcome = processor
            .handle_message(&text_message("wamid.1", "919876543210", "NO"), None)
            .await
            .unwrap();

        assert_eq!(outcome, InboundOutcome::CodCancelled { order_id: latest });
        assert_eq!(order_status(&repo, latest).await, "cancelled");
        assert_eq!(order_status(&repo, first).await, "pending");
    }

    #[ntex::test]
    async fn test_cod_reply_ignores_orders_from_another_country() {
        let repo = Arc::new(in_memory_repo().await);
        let us_order = insert_test_order(&repo, "+1 415 555 0100", "cod", "pending", Utc::now()).await;

        let mut transport = MockMessagingTransport::new();
        transport.expect_post_message().never();
        let processor = processor(transport, repo.clone());

        let outcome = processor
            .handle_message(&text_message("wamid.1", "914155550100", "YES"), None)
            .await
            .unwrap();

        assert_eq!(outcome, InboundOutcome::Logged { duplicate: false });
        assert_eq!(order_status(&repo, us_order).await, "pending");
    }

    #[ntex::test]
    async fn test_cod_lookup_failure_still_logs_the_message() {
        let mut repo = MockAppRepo::new();
        repo.expect_find_pending_cod_orders()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("database is locked")));
        repo.expect_update_order_status().never();
        repo.expect_insert_inbound_message()
            .withf(|log| log.message_text.as_deref() == Some("yes"))
            .times(1)
            .returning(|_| Ok(true));
        repo.expect_upsert_chat_session()
            .times(1)
            .returning(|_| Ok(()));
        let repo: repo::ImplAppRepo = Arc::new(repo);

        let mut transport = MockMessagingTransport::new();
        transport.expect_post_message().never();
        let facade = MessagingFacade::new(
            Arc::new(dispatcher(transport)),
            repo.clone(),
            "en",
            "shop.example.com",
        );
        let processor = InboundEventProcessor::new(repo, Arc::new(facade), PhoneNormalizer::new("91"));

        let outcome = processor
            .handle_message(&text_message("wamid.1", "919876543210", "yes"), None)
            .await
            .unwrap();

        assert_eq!(outcome, InboundOutcome::Logged { duplicate: false });
    }

    #[ntex::test]
    async fn test_regular_message_is_logged_once() {
        let repo = Arc::new(in_memory_repo().await);
        let mut transport = MockMessagingTransport::new();
        transport.expect_post_message().never();
        let processor = processor(transport, repo.clone());
        let message = text_message("wamid.1", "919876543210", "yes");

        let first = processor.handle_message(&message, Some("Asha")).await.unwrap();
        let again = processor.handle_message(&message, Some("Asha")).await.unwrap();

        assert_eq!(first, InboundOutcome::Logged { duplicate: false });
        assert_eq!(again, InboundOutcome::Logged { duplicate: true });

        let session = repo
            .get_chat_session("919876543210")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.message_count, 1);
        assert_eq!(session.customer_name.as_deref(), Some("Asha"));
        assert_eq!(session.last_message.as_deref(), Some("yes"));
    }

    #[ntex::test]
    async fn test_failed_status_keeps_first_error() {
        let repo = Arc::new(in_memory_repo().await);
        let processor = processor(MockMessagingTransport::new(), repo.clone());

        let status = Status {
            id: "wamid.OUT".into(),
            status: "failed".into(),
            timestamp: "1760000000".into(),
            recipient_id: "919876543210".into(),
            errors: vec![
                StatusError {
                    code: 131026,
                    title: Some("Message undeliverable".into()),
                    message: None,
                },
                StatusError {
                    code: 131000,
                    title: None,
                    message: Some("Something went wrong".into()),
                },
            ],
        };
        processor.handle_status(&status).await;
        processor.handle_status(&status).await;

        let rows: Vec<(String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT status,error_code,error_message FROM whatsapp_message_status WHERE message_id='wamid.OUT';",
        )
        .fetch_all(&repo.db_pool)
        .await
        .unwrap();
        assert_eq!(
            rows,
            vec![(
                "failed".to_string(),
                Some("131026".to_string()),
                Some("Message undeliverable".to_string())
            )]
        );
    }

    #[test]
    fn test_content_extraction() {
        let mut image = text_message("wamid.1", "919876543210", "");
        image.msg_type = "image".into();
        image.text = None;
        image.image = Some(MediaMessage {
            id: "MEDIA1".into(),
            mime_type: Some("image/jpeg".into()),
            sha256: None,
            caption: Some("damaged box".into()),
            filename: None,
        });
        let content = InboundContent::from_message(&image);
        assert_eq!(content.summary(), "[image] damaged box");
        assert_eq!(content.media_id().as_deref(), Some("MEDIA1"));

        let mut reaction = text_message("wamid.2", "919876543210", "");
        reaction.msg_type = "reaction".into();
        reaction.text = None;
        assert_eq!(
            InboundContent::from_message(&reaction),
            InboundContent::Other("reaction".into())
        );
    }

    #[test]
    fn test_cod_reply_parsing() {
        assert_eq!(CodReply::parse("  yEs\n"), Some(CodReply::Yes));
        assert_eq!(CodReply::parse("No"), Some(CodReply::No));
        assert_eq!(CodReply::parse("yes please"), None);
        assert_eq!(CodReply::parse("nope"), None);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1760000000").timestamp(), 1_760_000_000);
        assert!(parse_timestamp("not-a-number") <= Utc::now());
    }
}
