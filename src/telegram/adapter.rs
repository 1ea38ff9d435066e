//! Transport adapter: converts teloxide updates into the pipeline's
//! [`Inbound`] type and feeds the constructed router.
//!
//! The dptree schema is deliberately thin — two branches, no business logic.
//! Everything order-sensitive lives in the gate chain and router, which are
//! testable without a live transport.

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{ChatKind, Message, MessageOrigin};

use crate::pipeline::router::{HandlerError, Router};
use crate::pipeline::{Attachment, ForwardedChannel, Inbound, InboundKind};
use crate::storage::files::FileKind;
use crate::telegram::Bot;

/// Creates the dispatcher schema for the bot.
///
/// The same schema is used in production and can be driven by tests.
pub fn schema(router: Arc<Router>) -> UpdateHandler<HandlerError> {
    let router_messages = Arc::clone(&router);
    let router_callbacks = router;

    dptree::entry()
        .branch(
            Update::filter_message()
                .filter(|msg: Message| matches!(msg.chat.kind, ChatKind::Private(_)))
                .endpoint(move |_bot: Bot, msg: Message| {
                    let router = Arc::clone(&router_messages);
                    async move {
                        if let Some(update) = inbound_from_message(&msg) {
                            router.dispatch(update).await;
                        }
                        Ok(())
                    }
                }),
        )
        .branch(Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
            let router = Arc::clone(&router_callbacks);
            async move {
                // Acknowledge eagerly: the raw ack expires ~10s after the
                // press, long before a membership sweep can finish. Results
                // of slow work arrive as follow-up messages instead.
                if let Err(err) = bot.answer_callback_query(q.id.clone()).await {
                    log::warn!("failed to ack callback from {}: {}", q.from.id, err);
                }
                if let Some(update) = inbound_from_callback(&q) {
                    router.dispatch(update).await;
                }
                Ok(())
            }
        }))
}

/// Reduces a Telegram message to the pipeline's update type.
/// Returns None for messages without a human sender.
pub fn inbound_from_message(msg: &Message) -> Option<Inbound> {
    let from = msg.from.as_ref()?;
    if from.is_bot {
        return None;
    }

    let attachment = if let Some(doc) = msg.document() {
        Some(Attachment {
            file_id: doc.file.id.0.clone(),
            kind: FileKind::Document,
            file_name: doc.file_name.clone(),
        })
    } else if let Some(audio) = msg.audio() {
        Some(Attachment {
            file_id: audio.file.id.0.clone(),
            kind: FileKind::Audio,
            file_name: audio.file_name.clone(),
        })
    } else {
        msg.video().map(|video| Attachment {
            file_id: video.file.id.0.clone(),
            kind: FileKind::Video,
            file_name: video.file_name.clone(),
        })
    };

    let forwarded_channel = match msg.forward_origin() {
        Some(MessageOrigin::Channel { chat, .. }) => Some(ForwardedChannel {
            channel_id: chat.id.0,
            username: chat.username().map(|u| u.to_string()),
            title: chat.title().map(|t| t.to_string()),
        }),
        _ => None,
    };

    Some(Inbound {
        identity: msg.chat.id.0,
        username: from.username.clone(),
        full_name: Some(from.full_name()),
        language_hint: from.language_code.clone(),
        kind: InboundKind::Message {
            text: msg.text().map(|t| t.to_string()),
            attachment,
            forwarded_channel,
        },
        received_at: chrono::Utc::now(),
    })
}

/// Reduces a callback query to the pipeline's update type.
/// Returns None when the callback carries no action payload.
pub fn inbound_from_callback(q: &CallbackQuery) -> Option<Inbound> {
    let action = q.data.clone()?;

    Some(Inbound {
        identity: i64::try_from(q.from.id.0).ok()?,
        username: q.from.username.clone(),
        full_name: Some(q.from.full_name()),
        language_hint: q.from.language_code.clone(),
        kind: InboundKind::Callback {
            action,
            message_id: q.message.as_ref().map(|m| m.id().0),
        },
        received_at: chrono::Utc::now(),
    })
}
