//! Webhook normalizer - Turns a raw webhook payload into one canonical command

use serde_json::Value;

use crate::domain::entities::{Command, SourceTag};

/// The first recognised sub-event of a webhook payload
#[derive(Debug, Clone, PartialEq)]
pub struct Event<'a> {
    pub sender_id: Option<String>,
    pub command: Command,
    /// The messaging item the command was taken from
    pub raw: Option<&'a Value>,
}

impl Event<'_> {
    fn none() -> Self {
        Self {
            sender_id: None,
            command: Command::empty(),
            raw: None,
        }
    }
}

/// Scan `entry[].messaging[]` in order and return the first item matching the
/// priority ladder. Scanning stops at the first match across the whole
/// payload. Shapes that match nothing yield an empty command, never an error.
pub fn normalize(payload: &Value) -> Event<'_> {
    let items = payload
        .get("entry")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("messaging").and_then(Value::as_array))
        .flatten();

    for item in items {
        if let Some(command) = match_item(item) {
            let sender_id = item.get("sender").and_then(|s| s.get("id")).and_then(scalar);
            return Event {
                sender_id,
                command,
                raw: Some(item),
            };
        }
    }

    Event::none()
}

fn match_item(item: &Value) -> Option<Command> {
    if let Some(message) = present(item, "message") {
        if let Some(cmd) = match_message(message) {
            return Some(cmd);
        }
    }

    if let Some(cmd) = field_command(item, "postback", "payload", SourceTag::Postback) {
        return Some(cmd);
    }
    if let Some(cmd) = field_command(item, "read", "watermark", SourceTag::Read) {
        return Some(cmd);
    }
    if let Some(cmd) = field_command(item, "delivery", "watermark", SourceTag::Delivery) {
        return Some(cmd);
    }
    if let Some(cmd) = field_command(item, "reaction", "reaction", SourceTag::Reaction) {
        return Some(cmd);
    }

    let optin = present(item, "optin")?;
    let body = optin.get("payload").and_then(scalar)?;
    let token = match optin.get("type").and_then(Value::as_str) {
        Some("one_time_notif_req") => optin.get("one_time_notif_token"),
        Some("notification_messages") => optin.get("notification_messages_token"),
        _ => None,
    };
    Some(Command::new(body, SourceTag::Optin).with_token(token.and_then(scalar)))
}

fn match_message(message: &Value) -> Option<Command> {
    if let Some(attachments) = present(message, "attachments").and_then(Value::as_array) {
        let urls: Vec<String> = attachments
            .iter()
            .filter_map(|a| a.get("payload").and_then(|p| p.get("url")).and_then(scalar))
            .collect();
        if let Some(first) = urls.first() {
            return Some(Command::new(first.clone(), SourceTag::Attachment).with_attachments(urls));
        }
    }

    if let Some(cmd) = field_command(message, "quick_reply", "payload", SourceTag::QuickReply) {
        return Some(cmd);
    }

    present(message, "text")
        .and_then(scalar)
        .map(|text| Command::new(text, SourceTag::Text))
}

/// `parent[field][key]` as a command body, when the field is present
fn field_command(parent: &Value, field: &str, key: &str, tag: SourceTag) -> Option<Command> {
    present(parent, field)
        .and_then(|v| v.get(key))
        .and_then(scalar)
        .map(|body| Command::new(body, tag))
}

/// A field counts as present when it holds a non-empty, non-zero value.
fn present<'a>(parent: &'a Value, field: &str) -> Option<&'a Value> {
    parent.get(field).filter(|v| truthy(v))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(item: Value) -> Value {
        json!({ "object": "page", "entry": [ { "id": "P1", "messaging": [ item ] } ] })
    }

    #[test]
    fn text_message() {
        let payload = wrap(json!({ "sender": { "id": "U1" }, "message": { "mid": "m1", "text": "hi" } }));
        let event = normalize(&payload);

        assert_eq!(event.sender_id.as_deref(), Some("U1"));
        assert_eq!(event.command, Command::new("hi", SourceTag::Text));
        assert_eq!(event.raw, Some(&payload["entry"][0]["messaging"][0]));
    }

    #[test]
    fn attachments_win_over_text() {
        let payload = wrap(json!({
            "sender": { "id": "U1" },
            "message": {
                "text": "look",
                "attachments": [
                    { "type": "image", "payload": { "url": "https://cdn/a.png" } },
                    { "type": "image", "payload": { "url": "https://cdn/b.png" } }
                ]
            }
        }));
        let cmd = normalize(&payload).command;

        assert_eq!(cmd.source(), Some(SourceTag::Attachment));
        assert_eq!(cmd.body(), "https://cdn/a.png");
        assert_eq!(cmd.attachments(), ["https://cdn/a.png", "https://cdn/b.png"]);
    }

    #[test]
    fn quick_reply_wins_over_text() {
        let payload = wrap(json!({
            "sender": { "id": "U1" },
            "message": { "text": "Yes", "quick_reply": { "payload": "/confirm" } }
        }));
        let cmd = normalize(&payload).command;

        assert_eq!(cmd.source(), Some(SourceTag::QuickReply));
        assert_eq!(cmd.body(), "/confirm");
    }

    #[test]
    fn message_checked_before_postback() {
        let payload = wrap(json!({
            "sender": { "id": "U1" },
            "message": { "text": "typed" },
            "postback": { "payload": "/menu" }
        }));
        assert_eq!(normalize(&payload).command.source(), Some(SourceTag::Text));
    }

    #[test]
    fn empty_message_falls_through_to_postback() {
        let payload = wrap(json!({
            "sender": { "id": "U1" },
            "message": { "mid": "m1" },
            "postback": { "title": "Menu", "payload": "/menu" }
        }));
        assert_eq!(normalize(&payload).command, Command::new("/menu", SourceTag::Postback));
    }

    #[test]
    fn receipts_and_reactions() {
        let read = wrap(json!({ "sender": { "id": "U1" }, "read": { "watermark": 1458668856253_i64 } }));
        assert_eq!(normalize(&read).command, Command::new("1458668856253", SourceTag::Read));

        let delivery = wrap(json!({ "sender": { "id": "U1" }, "delivery": { "watermark": 1458668856253_i64 } }));
        assert_eq!(normalize(&delivery).command.source(), Some(SourceTag::Delivery));

        let reaction = wrap(json!({ "sender": { "id": "U1" }, "reaction": { "reaction": "love", "action": "react" } }));
        assert_eq!(normalize(&reaction).command, Command::new("love", SourceTag::Reaction));
    }

    #[test]
    fn optin_tokens() {
        let one_time = wrap(json!({
            "sender": { "id": "U1" },
            "optin": { "type": "one_time_notif_req", "payload": "/notify", "one_time_notif_token": "tok-1" }
        }));
        let cmd = normalize(&one_time).command;
        assert_eq!(cmd.source(), Some(SourceTag::Optin));
        assert_eq!(cmd.body(), "/notify");
        assert_eq!(cmd.token(), Some("tok-1"));

        let recurring = wrap(json!({
            "sender": { "id": "U1" },
            "optin": { "type": "notification_messages", "payload": "/weekly", "notification_messages_token": "tok-2" }
        }));
        assert_eq!(normalize(&recurring).command.token(), Some("tok-2"));

        let plain = wrap(json!({ "sender": { "id": "U1" }, "optin": { "payload": "/hello" } }));
        assert_eq!(normalize(&plain).command.token(), None);
    }

    #[test]
    fn first_match_across_entries_wins() {
        let payload = json!({
            "entry": [
                { "messaging": [ { "sender": { "id": "U0" }, "unknown": {} } ] },
                { "messaging": [
                    { "sender": { "id": "U1" }, "read": { "watermark": 1 } },
                    { "sender": { "id": "U2" }, "message": { "text": "later" } }
                ] },
                { "messaging": [ { "sender": { "id": "U3" }, "message": { "text": "much later" } } ] }
            ]
        });
        let event = normalize(&payload);

        assert_eq!(event.sender_id.as_deref(), Some("U1"));
        assert_eq!(event.command.source(), Some(SourceTag::Read));
    }

    #[test]
    fn matched_item_without_sender() {
        let item = json!({ "message": { "text": "hi" } });
        let payload = wrap(item.clone());
        let event = normalize(&payload);

        assert_eq!(event.sender_id, None);
        assert_eq!(event.command, Command::new("hi", SourceTag::Text));
        assert_eq!(event.raw, Some(&item));
    }

    #[test]
    fn unrecognised_payload_is_sentinel() {
        for payload in [
            json!({}),
            json!({ "entry": [] }),
            json!({ "entry": [ { "messaging": [ { "sender": { "id": "U1" }, "account_linking": {} } ] } ] }),
            json!({ "entry": "oops" }),
            wrap(json!({ "sender": { "id": "U1" }, "read": { "seq": 0 } })),
        ] {
            let event = normalize(&payload);
            assert_eq!(event.sender_id, None);
            assert!(event.command.is_empty());
            assert_eq!(event.command.source(), None);
            assert_eq!(event.raw, None);
        }
    }
}
