use crate::models::chat::ChatMessage;
use crate::utils::token_estimator::estimate_tokens;
use super::types::TokenCount;

pub struct TokenCounter;

impl TokenCounter {
    pub fn count_text(text: &str) -> usize {
        estimate_tokens(text)
    }

    pub fn count_messages(messages: &[ChatMessage]) -> usize {
        messages.iter()
            .map(|msg| msg.estimate_tokens())
            .sum()
    }

    pub fn count_payload(
        system_context: &str,
        messages: &[ChatMessage],
        current_message: &str,
    ) -> TokenCount {
        let system_tokens = Self::count_text(system_context);
        let history_tokens = Self::count_messages(messages);
        let current_message_tokens = Self::count_text(current_message);

        TokenCount {
            total: system_tokens + history_tokens + current_message_tokens,
            system_tokens,
            history_tokens,
            current_message_tokens,
        }
    }

    pub fn estimate_total(
        system_approx: usize,
        messages: &[ChatMessage],
        current_message: &str,
    ) -> usize {
        system_approx 
            + Self::count_messages(messages) 
            + Self::count_text(current_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_text() {
        let text = "Hello world";
        let tokens = TokenCounter::count_text(text);
        assert!(tokens >= 3 && tokens <= 6);
    }

    #[test]
    fn test_count_messages() {
        let messages = vec![
            ChatMessage::user("What is RAG?"),
            ChatMessage::assistant("RAG is Retrieval-Augmented Generation"),
        ];
        let tokens = TokenCounter::count_messages(&messages);
        assert!(tokens > 0);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(TokenCounter::count_text(""), 0);
    }
}
