//! Conversation-to-prompt rendering for the Llama 3.1 chat template.
//!
//! Pure and deterministic: the same message sequence always yields the same
//! prompt text.

use crate::api::{Message, Role};

/// Appended after every conversation so the model continues as the assistant.
pub const ASSISTANT_OPENING: &str = "<|start_header_id|>assistant<|end_header_id|>\n\n";

pub fn format_conversation(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        match message.role {
            Role::System => {
                prompt.push_str("<|begin_of_text|>");
                push_turn(&mut prompt, "system", &message.content);
            }
            Role::User => push_turn(&mut prompt, "user", &message.content),
            Role::Assistant => push_turn(&mut prompt, "assistant", &message.content),
            // Unrecognized roles contribute no block.
            Role::Other => {}
        }
    }
    prompt.push_str(ASSISTANT_OPENING);
    prompt
}

fn push_turn(prompt: &mut String, role: &str, content: &str) {
    prompt.push_str("<|start_header_id|>");
    prompt.push_str(role);
    prompt.push_str("<|end_header_id|>\n\n");
    prompt.push_str(content);
    prompt.push_str("<|eot_id|>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn system_then_user_renders_in_order_with_assistant_opening() {
        let prompt = format_conversation(&[
            message(Role::System, "You are helpful."),
            message(Role::User, "Hi"),
        ]);

        let system_at = prompt.find("You are helpful.").unwrap();
        let user_at = prompt.find("Hi").unwrap();
        assert!(system_at < user_at);
        assert!(prompt.ends_with(ASSISTANT_OPENING));
    }

    #[test]
    fn one_block_per_recognized_message() {
        let prompt = format_conversation(&[
            message(Role::System, "a"),
            message(Role::User, "b"),
            message(Role::Assistant, "c"),
        ]);
        // Three rendered turns plus the unconditional assistant opening.
        assert_eq!(prompt.matches("<|start_header_id|>").count(), 4);
        assert_eq!(prompt.matches("<|eot_id|>").count(), 3);
    }

    #[test]
    fn unknown_roles_are_skipped() {
        let with_unknown = format_conversation(&[
            message(Role::User, "hello"),
            message(Role::Other, "invisible"),
        ]);
        let without = format_conversation(&[message(Role::User, "hello")]);
        assert_eq!(with_unknown, without);
        assert!(!with_unknown.contains("invisible"));
    }

    #[test]
    fn empty_conversation_yields_only_the_assistant_opening() {
        assert_eq!(format_conversation(&[]), ASSISTANT_OPENING);
    }

    #[test]
    fn formatting_is_deterministic() {
        let messages = [
            message(Role::System, "sys"),
            message(Role::User, "u1"),
            message(Role::Assistant, "a1"),
            message(Role::User, "u2"),
        ];
        assert_eq!(format_conversation(&messages), format_conversation(&messages));
    }

    #[test]
    fn begin_of_text_marks_the_system_turn_only() {
        let prompt = format_conversation(&[
            message(Role::System, "sys"),
            message(Role::User, "u"),
        ]);
        assert!(prompt.starts_with("<|begin_of_text|>"));
        assert_eq!(prompt.matches("<|begin_of_text|>").count(), 1);
    }
}
