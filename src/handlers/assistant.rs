use std::sync::Arc;
use std::time::Duration;

use crate::models::ChatMessage;
use crate::services::error::RelayError;
use crate::services::prompts::{self, CHAT_FALLBACK};
use crate::services::RelayClient;

/// Produces the next assistant turn for a caller-owned conversation.
pub struct AssistantHandler {
    relay: Arc<dyn RelayClient>,
    timeout: Duration,
}

impl AssistantHandler {
    pub fn new(relay: Arc<dyn RelayClient>, timeout: Duration) -> Self {
        Self { relay, timeout }
    }

    /// Never fails: a relay error turns into the canned fallback reply.
    pub async fn continue_chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
        last_scanned: Option<&str>,
    ) -> ChatMessage {
        self.reply_or_fallback(history, new_message, last_scanned).await.0
    }

    /// The reply, and whether it is the fallback.
    async fn reply_or_fallback(
        &self,
        history: &[ChatMessage],
        new_message: &str,
        last_scanned: Option<&str>,
    ) -> (ChatMessage, bool) {
        match self.try_continue(history, new_message, last_scanned).await {
            Ok(reply) => (reply, false),
            Err(e) => {
                log::error!("❌ Assistant relay call failed: {}", e);
                (ChatMessage::assistant(CHAT_FALLBACK), true)
            }
        }
    }

    async fn try_continue(
        &self,
        history: &[ChatMessage],
        new_message: &str,
        last_scanned: Option<&str>,
    ) -> Result<ChatMessage, RelayError> {
        let messages = prompts::assistant_messages(history, new_message, last_scanned);
        log::info!("💬 Assistant turn with {} history messages", history.len());

        let completion = tokio::time::timeout(self.timeout, self.relay.invoke(&messages))
            .await
            .map_err(|_| RelayError::Timeout(self.timeout))??;

        let reply = completion.reply_text()?;
        if reply.trim().is_empty() {
            return Err(RelayError::MalformedCompletion("empty assistant reply".to_string()));
        }

        Ok(ChatMessage::assistant(reply))
    }
}

#[derive(Debug, Clone)]
struct Turn {
    message: ChatMessage,
    fallback: bool,
}

/// Append-only chat log owned by one UI session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn greeting() -> ChatMessage {
        ChatMessage::assistant(prompts::GREETING)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Everything shown to the user, fallback replies included.
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.turns.iter().map(|t| &t.message)
    }

    /// Snapshot sent upstream; fallback replies are left out.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .filter(|t| !t.fallback)
            .map(|t| t.message.clone())
            .collect()
    }

    /// Sends `text` and records the user turn plus the reply. Blank input is
    /// ignored and returns `None`.
    pub async fn send(
        &mut self,
        handler: &AssistantHandler,
        text: &str,
        last_scanned: Option<&str>,
    ) -> Option<&ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let history = self.history();
        let (reply, fallback) = handler.reply_or_fallback(&history, text, last_scanned).await;

        self.turns.push(Turn {
            message: ChatMessage::user(text),
            fallback: false,
        });
        self.turns.push(Turn {
            message: reply,
            fallback,
        });

        self.turns.last().map(|t| &t.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::relay::ScriptedRelay;

    fn handler(relay: &Arc<ScriptedRelay>) -> AssistantHandler {
        AssistantHandler::new(relay.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_continue_chat_builds_full_conversation() {
        let relay = Arc::new(ScriptedRelay::new(vec![Ok("Quinoa is a great source of protein.")]));
        let history = vec![
            ChatMessage::user("Is rice healthy?"),
            ChatMessage::assistant("Brown rice is a good choice."),
        ];

        let reply = handler(&relay)
            .continue_chat(&history, "What about quinoa?", Some("Green Salad"))
            .await;

        assert_eq!(reply, ChatMessage::assistant("Quinoa is a great source of protein."));

        let calls = relay.calls();
        let sent = &calls[0];
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].content.contains("\"Green Salad\""));
        assert_eq!(&sent[1..3], &history[..]);
        assert_eq!(sent[3], ChatMessage::user("What about quinoa?"));
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_relay_failure_becomes_fallback() {
        let relay = Arc::new(ScriptedRelay::new(vec![Err(RelayError::Transport(
            "connection reset".to_string(),
        ))]));

        let reply = handler(&relay).continue_chat(&[], "hello", None).await;

        assert_eq!(reply, ChatMessage::assistant(CHAT_FALLBACK));
    }

    #[tokio::test]
    async fn test_empty_reply_becomes_fallback() {
        let relay = Arc::new(ScriptedRelay::new(vec![Ok("   ")]));
        let reply = handler(&relay).continue_chat(&[], "hello", None).await;
        assert_eq!(reply.content, CHAT_FALLBACK);
    }

    #[tokio::test]
    async fn test_conversation_grows_by_two_on_failure() {
        let relay = Arc::new(ScriptedRelay::new(vec![
            Ok("Eat more vegetables!"),
            Err(RelayError::Upstream {
                status: 500,
                message: "Internal Server Error".to_string(),
            }),
            Ok("Try oatmeal with berries."),
        ]));
        let handler = handler(&relay);
        let mut conversation = Conversation::new();

        conversation.send(&handler, "Any tips?", None).await;
        assert_eq!(conversation.len(), 2);

        let reply = conversation.send(&handler, "And for breakfast?", None).await.cloned();
        assert_eq!(reply, Some(ChatMessage::assistant(CHAT_FALLBACK)));
        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation.messages().count(), 4);

        // The fallback is displayed but not replayed upstream
        assert_eq!(conversation.history().len(), 3);

        conversation.send(&handler, "Breakfast ideas please", Some("Apple")).await;
        let calls = relay.calls();
        let third_call = &calls[2];
        assert!(third_call.iter().all(|m| m.content != CHAT_FALLBACK));
        assert_eq!(third_call.len(), 1 + 3 + 1);
        assert_eq!(conversation.len(), 6);
    }

    #[tokio::test]
    async fn test_blank_input_ignored() {
        let relay = Arc::new(ScriptedRelay::new(vec![]));
        let mut conversation = Conversation::new();

        assert!(conversation.send(&handler(&relay), "   ", None).await.is_none());
        assert!(conversation.is_empty());
        assert_eq!(relay.call_count(), 0);
    }

    #[test]
    fn test_greeting_is_not_history() {
        let conversation = Conversation::new();
        assert_eq!(Conversation::greeting().role, Role::Assistant);
        assert!(conversation.history().is_empty());
    }
}
