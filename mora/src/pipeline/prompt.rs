//! Prompt construction for rewrite, answer and fast paths

use crate::history::{Role, Turn};
use crate::llm::ChatMessage;
use crate::retrieval::Passage;

fn history_messages(history: &[Turn]) -> impl Iterator<Item = ChatMessage> + '_ {
    history.iter().map(|turn| match turn.role {
        Role::Human => ChatMessage::user(turn.message.clone()),
        Role::Ai => ChatMessage::assistant(turn.message.clone()),
    })
}

/// Ask for a standalone restatement of `input` given the prior turns
pub fn rewrite_messages(instruction: &str, history: &[Turn], input: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(instruction));
    messages.extend(history_messages(history));
    messages.push(ChatMessage::user(input));
    messages
}

/// Persona followed by the retrieved passages, if any
pub fn system_prompt(persona: &str, passages: &[Passage]) -> String {
    if passages.is_empty() {
        return persona.to_string();
    }
    let context = passages
        .iter()
        .map(|p| p.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{}", persona, context)
}

pub fn answer_messages(
    persona: &str,
    passages: &[Passage],
    history: &[Turn],
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(persona, passages)));
    messages.extend(history_messages(history));
    messages.push(ChatMessage::user(question));
    messages
}

pub fn fast_messages(input: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!("Answer briefly: {}", input))]
}

/// Whitespace-separated word count
pub fn word_count(input: &str) -> usize {
    input.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRole;
    use chrono::Utc;

    fn turn(role: Role, message: &str) -> Turn {
        Turn {
            role,
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_system_prompt_without_context_is_persona() {
        assert_eq!(system_prompt("You are Mora.", &[]), "You are Mora.");
    }

    #[test]
    fn test_system_prompt_appends_passages() {
        let passages = vec![
            Passage {
                text: "first ".into(),
                source: "a".into(),
                score: 0.9,
            },
            Passage {
                text: "second".into(),
                source: "b".into(),
                score: 0.5,
            },
        ];
        assert_eq!(
            system_prompt("You are Mora.", &passages),
            "You are Mora.\n\nfirst\n\nsecond"
        );
    }

    #[test]
    fn test_answer_messages_order() {
        let history = vec![turn(Role::Human, "hi"), turn(Role::Ai, "hello")];
        let messages = answer_messages("persona", &[], &history, "what now?");
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User
            ]
        );
        assert_eq!(messages[3].content, "what now?");
    }

    #[test]
    fn test_fast_prompt() {
        let messages = fast_messages("What is BSE?");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Answer briefly: What is BSE?");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  hello   there  "), 2);
        assert_eq!(word_count(""), 0);
    }
}
