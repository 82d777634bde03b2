use std::fmt;

/// Webhook field a command was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTag {
    Attachment,
    QuickReply,
    Text,
    Postback,
    Read,
    Delivery,
    Reaction,
    Optin,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Attachment => "attachment",
            SourceTag::QuickReply => "quick-reply",
            SourceTag::Text => "text",
            SourceTag::Postback => "postback",
            SourceTag::Read => "read",
            SourceTag::Delivery => "delivery",
            SourceTag::Reaction => "reaction",
            SourceTag::Optin => "optin",
        }
    }

    /// Receipts, reactions and opt-ins are routed to event handlers
    /// rather than commands.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            SourceTag::Read | SourceTag::Delivery | SourceTag::Reaction | SourceTag::Optin
        )
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical representation of one inbound webhook event.
///
/// Built once by the normalizer and read-only afterwards. An empty body means
/// there is nothing to dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    body: String,
    source: Option<SourceTag>,
    attachments: Vec<String>,
    token: Option<String>,
}

impl Command {
    pub fn new(body: impl Into<String>, source: SourceTag) -> Self {
        Self {
            body: body.into(),
            source: Some(source),
            attachments: Vec::new(),
            token: None,
        }
    }

    /// The "no actionable event" sentinel
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn with_attachments(mut self, urls: Vec<String>) -> Self {
        self.attachments = urls;
        self
    }

    pub(crate) fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn source(&self) -> Option<SourceTag> {
        self.source
    }

    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }

    /// One-time or recurring notification token carried by some opt-ins
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_sentinel() {
        let cmd = Command::empty();
        assert!(cmd.is_empty());
        assert_eq!(cmd.body(), "");
        assert_eq!(cmd.source(), None);
        assert!(cmd.attachments().is_empty());
    }

    #[test]
    fn event_tags() {
        assert!(SourceTag::Read.is_event());
        assert!(SourceTag::Optin.is_event());
        assert!(!SourceTag::Postback.is_event());
        assert!(!SourceTag::Attachment.is_event());
        assert_eq!(SourceTag::QuickReply.to_string(), "quick-reply");
    }
}
