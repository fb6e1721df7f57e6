//! Prompt composition.

use crate::host::HostContext;
use crate::tool_registry::truncate_chars;
use crate::types::{Message, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Hex, an AI agent with full control of this machine.\n\
You have full shell access. Execute commands freely to accomplish tasks.\n\
Be direct and concise. This is your machine.";

/// Base instructions followed by the host summary line.
pub fn system_prompt(base: &str, host: &HostContext) -> String {
    format!("{}\n\n{}", base.trim_end(), host.summary())
}

/// Flatten the conversation into one plain-text prompt for a backend with no
/// structured message protocol.
///
/// The last message is the new user input. Up to `window` earlier text
/// messages precede it as `User:`/`Assistant:` lines, with assistant replies
/// cut to `excerpt_chars` characters.
pub fn flatten(system_prompt: &str, history: &[Message], window: usize, excerpt_chars: usize) -> String {
    let (current, prior) = match history.split_last() {
        Some((last, rest)) => (last.text(), rest),
        None => (String::new(), history),
    };

    let exchanges: Vec<&Message> = prior
        .iter()
        .filter(|m| m.is_user_text() || m.role == Role::Assistant)
        .filter(|m| !m.text().trim().is_empty())
        .collect();
    let start = exchanges.len().saturating_sub(window);

    let mut prompt = String::new();
    if !system_prompt.trim().is_empty() {
        prompt.push_str(system_prompt.trim_end());
        prompt.push_str("\n\n");
    }
    for message in &exchanges[start..] {
        match message.role {
            Role::User => {
                prompt.push_str(&format!("User: {}\n", message.text()));
            }
            Role::Assistant => {
                let (excerpt, _) = truncate_chars(&message.text(), excerpt_chars);
                prompt.push_str(&format!("Assistant: {}\n", excerpt));
            }
        }
    }
    prompt.push_str(&format!("User: {}", current));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_appends_host_line() {
        let host = HostContext {
            os: "linux".into(),
            arch: "x86_64".into(),
            hostname: "h".into(),
            cpu_cores: Some(4),
            memory_gb: Some(8.0),
            sudo: true,
        };
        let prompt = system_prompt("Be helpful.\n", &host);
        assert_eq!(prompt, "Be helpful.\n\n[System: linux x86_64, 4 cores, 8GB RAM, sudo=yes]");
    }

    #[test]
    fn test_flatten_first_turn() {
        let history = vec![Message::user("list files in /tmp")];
        let prompt = flatten("SYS", &history, 4, 300);
        assert_eq!(prompt, "SYS\n\nUser: list files in /tmp");
    }

    #[test]
    fn test_flatten_keeps_trailing_window() {
        let history = vec![
            Message::user("one"),
            Message::assistant("reply one"),
            Message::user("two"),
            Message::assistant("reply two"),
            Message::user("three"),
            Message::assistant("reply three"),
            Message::user("now"),
        ];
        let prompt = flatten("", &history, 4, 300);
        assert_eq!(
            prompt,
            "User: two\nAssistant: reply two\nUser: three\nAssistant: reply three\nUser: now"
        );
    }

    #[test]
    fn test_flatten_cuts_long_replies() {
        let history = vec![
            Message::user("q"),
            Message::assistant("a".repeat(1000)),
            Message::user("next"),
        ];
        let prompt = flatten("", &history, 4, 300);
        let line = prompt.lines().nth(1).unwrap();
        assert_eq!(line, format!("Assistant: {}", "a".repeat(300)));
    }
}
