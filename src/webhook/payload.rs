//! Inbound webhook envelope — parsed defensively, never rejected.
//!
//! Only the subset of the provider payload the engine consumes is modeled:
//! `entry[0].changes[0].value` with either `statuses[]` or `messages[0]`.
//! Every field defaults so a malformed body decodes to an empty envelope
//! instead of a parse error.

use serde::Deserialize;

use crate::conversation::TurnInput;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Entry {
    pub changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangeValue {
    pub statuses: Vec<serde_json::Value>,
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    pub from: Option<String>,
    pub id: Option<String>,
    pub text: Option<TextBody>,
    pub button: Option<ButtonBody>,
    pub interactive: Option<Interactive>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TextBody {
    pub body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ButtonBody {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Interactive {
    pub list_reply: Option<ListReply>,
    pub button_reply: Option<ButtonReply>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListReply {
    pub id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ButtonReply {
    pub title: Option<String>,
}

/// What to do with a delivery once parsed.
#[derive(Debug)]
pub enum Delivery {
    /// Status-only notification, or nothing actionable: acknowledge and drop.
    Ack,
    /// A real message turn.
    Turn(TurnInput),
}

/// Reduce an envelope to a turn, or to a bare acknowledgment.
///
/// Status notifications, empty envelopes, and messages lacking a sender or
/// a delivery id are all acknowledged without further processing.
pub fn classify(envelope: Envelope) -> Delivery {
    let Some(value) = envelope
        .entry
        .into_iter()
        .next()
        .and_then(|entry| entry.changes.into_iter().next())
        .map(|change| change.value)
    else {
        return Delivery::Ack;
    };

    if !value.statuses.is_empty() {
        return Delivery::Ack;
    }

    let Some(message) = value.messages.into_iter().next() else {
        return Delivery::Ack;
    };

    let (Some(phone), Some(message_id)) = (message.from, message.id) else {
        return Delivery::Ack;
    };

    let list_reply_id = message
        .interactive
        .as_ref()
        .and_then(|i| i.list_reply.as_ref())
        .and_then(|r| r.id.clone());

    let text = message
        .text
        .and_then(|t| t.body)
        .or(message.button.and_then(|b| b.text))
        .or_else(|| {
            message.interactive.and_then(|i| {
                i.list_reply
                    .and_then(|r| r.title)
                    .or(i.button_reply.and_then(|r| r.title))
            })
        });

    Delivery::Turn(TurnInput {
        phone,
        message_id,
        text,
        list_reply_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: serde_json::Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    fn text_message(body: &str) -> serde_json::Value {
        serde_json::json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": "+1555",
                "id": "wamid.1",
                "text": { "body": body }
            }] } }] }]
        })
    }

    #[test]
    fn text_body_extracted() {
        let Delivery::Turn(turn) = classify(parse(text_message("hello"))) else {
            panic!("expected a turn");
        };
        assert_eq!(turn.phone, "+1555");
        assert_eq!(turn.message_id, "wamid.1");
        assert_eq!(turn.text.as_deref(), Some("hello"));
        assert!(turn.list_reply_id.is_none());
    }

    #[test]
    fn list_reply_extracts_id_and_title() {
        let envelope = parse(serde_json::json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": "+1555",
                "id": "wamid.2",
                "interactive": { "list_reply": { "id": "swap-lunch", "title": "Swap lunch" } }
            }] } }] }]
        }));
        let Delivery::Turn(turn) = classify(envelope) else {
            panic!("expected a turn");
        };
        assert_eq!(turn.list_reply_id.as_deref(), Some("swap-lunch"));
        assert_eq!(turn.text.as_deref(), Some("Swap lunch"));
    }

    #[test]
    fn button_text_is_free_text() {
        let envelope = parse(serde_json::json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": "+1555",
                "id": "wamid.3",
                "button": { "text": "Accept plan" }
            }] } }] }]
        }));
        let Delivery::Turn(turn) = classify(envelope) else {
            panic!("expected a turn");
        };
        assert_eq!(turn.text.as_deref(), Some("Accept plan"));
        assert!(turn.list_reply_id.is_none());
    }

    #[test]
    fn status_only_delivery_is_acked() {
        let envelope = parse(serde_json::json!({
            "entry": [{ "changes": [{ "value": { "statuses": [{ "status": "delivered" }] } }] }]
        }));
        assert!(matches!(classify(envelope), Delivery::Ack));
    }

    #[test]
    fn missing_sender_or_id_is_acked() {
        let no_from = parse(serde_json::json!({
            "entry": [{ "changes": [{ "value": { "messages": [{ "id": "wamid.4" }] } }] }]
        }));
        assert!(matches!(classify(no_from), Delivery::Ack));

        let no_id = parse(serde_json::json!({
            "entry": [{ "changes": [{ "value": { "messages": [{ "from": "+1555" }] } }] }]
        }));
        assert!(matches!(classify(no_id), Delivery::Ack));
    }

    #[test]
    fn empty_envelope_is_acked() {
        assert!(matches!(classify(Envelope::default()), Delivery::Ack));
        assert!(matches!(classify(parse(serde_json::json!({}))), Delivery::Ack));
    }

    #[test]
    fn garbage_body_decodes_to_default_envelope() {
        let envelope: Envelope = serde_json::from_str("{\"unexpected\": 42}").unwrap();
        assert!(matches!(classify(envelope), Delivery::Ack));
    }
}
