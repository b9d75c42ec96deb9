use crate::completion::{CompletionClient, CompletionError};
use crate::config::{HISTORY_LIMIT, RECENT_CONTEXT_ENTRIES};
use crate::state::SharedState;
use crate::types::{ChatMessage, Role};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Sent while a search is queued but nothing has been scraped yet.
const SEARCHING_PLACEHOLDER: &str = "這話題有點意思～讓我去 PTT 八卦一下，找到料再來跟你分享！";

fn system_prompt(assistant_name: &str) -> String {
    format!(
        "你叫{assistant_name}，用繁體中文（zh-TW）回應。\
         語氣輕鬆幽默，富有創意，不主動詢問聊天話題。\
         遇具體話題時，萃取關鍵字供 Google 搜尋；否則回傳空列表。"
    )
}

/// Most recent conversation turns; older ones fall off on append.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ChatMessage>,
    limit: usize,
}

impl ConversationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(limit + 1),
            limit,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push_back(ChatMessage::new(role, content));
        while self.turns.len() > self.limit {
            self.turns.pop_front();
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &ChatMessage> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// The request path: keeps the conversation, seeds each completion with
/// scraped forum content and hands extracted keywords to the worker.
pub struct ChatSession {
    assistant_name: String,
    history: Mutex<ConversationHistory>,
    shared: Arc<SharedState>,
    completion: Arc<dyn CompletionClient>,
}

impl ChatSession {
    pub fn new(
        assistant_name: impl Into<String>,
        shared: Arc<SharedState>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            history: Mutex::new(ConversationHistory::new(HISTORY_LIMIT)),
            shared,
            completion,
        }
    }

    fn with_history<T>(&self, f: impl FnOnce(&mut ConversationHistory) -> T) -> T {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut history)
    }

    /// Messages for the next completion call: persona, scraped context (or
    /// a placeholder while a search is pending), then the conversation.
    pub fn build_messages(&self) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new(
            Role::System,
            system_prompt(&self.assistant_name),
        )];

        let context = self.shared.recent_context(RECENT_CONTEXT_ENTRIES);
        if !context.is_empty() {
            messages.extend(
                context
                    .into_iter()
                    .map(|content| ChatMessage::new(Role::Assistant, content)),
            );
        } else if self.shared.pending_query().is_some() {
            messages.push(ChatMessage::new(Role::Assistant, SEARCHING_PLACEHOLDER));
        }

        self.with_history(|history| messages.extend(history.turns().cloned()));
        messages
    }

    /// Answer one user message.
    ///
    /// The user turn is recorded even when the completion fails.
    pub async fn handle_message(&self, message: &str) -> Result<String, CompletionError> {
        self.with_history(|history| history.push(Role::User, message));

        let messages = self.build_messages();
        let reply = self.completion.complete(&messages).await?;
        info!("Bot: {}", reply.response);

        self.with_history(|history| history.push(Role::Assistant, reply.response.clone()));
        if !reply.extracted_keywords.is_empty() {
            self.shared.submit_query(&reply.extracted_keywords);
        }
        Ok(reply.response)
    }

    pub fn history_len(&self) -> usize {
        self.with_history(|history| history.len())
    }
}
