//! Conversation context assembly
//!
//! Client history is cleaned up before it reaches the model: gateway
//! instructions and failure notices are dropped, the history is made to
//! start on a user turn, repeated submissions are collapsed, and a single
//! system message with the instruction and profile preamble is prepended.
//! Each step is a standalone function so it can be tested in isolation.

use crate::config::ChatConfig;
use crate::prompts::{build_profile_prompt, render_instruction, PROMPT_TIME_FORMAT};
use crate::providers::{Message, Role};
use crate::storage::SubjectProfile;

/// Builds the message list sent upstream for a chat turn
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    instruction: String,
    failure_marker: String,
}

impl ContextBuilder {
    /// Create a builder with an instruction template and failure marker
    pub fn new(instruction: impl Into<String>, failure_marker: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            failure_marker: failure_marker.into(),
        }
    }

    /// Create a builder from the `chat` configuration section
    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.system_prompt.clone(), config.failure_marker.clone())
    }

    /// Build the context using the current local time
    pub fn build(&self, turns: Vec<Message>, profile: Option<&SubjectProfile>) -> Vec<Message> {
        let now = chrono::Local::now().format(PROMPT_TIME_FORMAT).to_string();
        self.build_at(turns, profile, &now)
    }

    /// Build the context with an explicit timestamp
    ///
    /// # Examples
    ///
    /// ```
    /// use fate_gateway::context::ContextBuilder;
    /// use fate_gateway::providers::{Message, Role};
    ///
    /// let builder = ContextBuilder::new("now {time}", "请求失败：");
    /// let turns = vec![Message::assistant("hi"), Message::user("问")];
    /// let built = builder.build_at(turns, None, "2024-01-01 00:00:00");
    ///
    /// assert_eq!(built[0].role, Role::System);
    /// assert_eq!(built[0].content, "now 2024-01-01 00:00:00");
    /// assert_eq!(built[1], Message::user("问"));
    /// ```
    pub fn build_at(
        &self,
        turns: Vec<Message>,
        profile: Option<&SubjectProfile>,
        now: &str,
    ) -> Vec<Message> {
        let turns = filter_client_turns(turns, &self.failure_marker);
        let turns = trim_leading_non_user(turns);
        let turns = collapse_duplicate_user_turns(turns);

        let preamble = profile.map(build_profile_prompt).unwrap_or_default();
        match system_message(&self.instruction, &preamble, now) {
            Some(system) => std::iter::once(system).chain(turns).collect(),
            None => turns,
        }
    }
}

/// Drops system turns and assistant turns that are stored failure notices
pub fn filter_client_turns(turns: Vec<Message>, failure_marker: &str) -> Vec<Message> {
    turns
        .into_iter()
        .filter(|m| match m.role {
            Role::System => false,
            Role::Assistant => {
                failure_marker.is_empty() || !m.content.trim().starts_with(failure_marker)
            }
            Role::User => true,
        })
        .collect()
}

/// Removes turns before the first user turn
pub fn trim_leading_non_user(turns: Vec<Message>) -> Vec<Message> {
    turns
        .into_iter()
        .skip_while(|m| m.role != Role::User)
        .collect()
}

/// Collapses consecutive user turns with equal trimmed content, keeping the latest
pub fn collapse_duplicate_user_turns(turns: Vec<Message>) -> Vec<Message> {
    let mut compacted: Vec<Message> = Vec::with_capacity(turns.len());
    for message in turns {
        if let Some(last) = compacted.last_mut() {
            if message.role == Role::User
                && last.role == Role::User
                && message.content.trim() == last.content.trim()
            {
                *last = message;
                continue;
            }
        }
        compacted.push(message);
    }
    compacted
}

/// The system turn prepended to every context, if there is anything to say
pub fn system_message(instruction: &str, preamble: &str, now: &str) -> Option<Message> {
    let parts: Vec<String> = [render_instruction(instruction, now), preamble.trim().to_string()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(Message::system(parts.join("\n\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "请求失败：";
    const NOW: &str = "2024-06-01 09:00:00";

    fn profile() -> SubjectProfile {
        SubjectProfile {
            id: "p-1".to_string(),
            name: "林晓".to_string(),
            gender: "女".to_string(),
            ..SubjectProfile::default()
        }
    }

    #[test]
    fn test_filter_drops_system_and_failure_notices() {
        let turns = vec![
            Message::system("client supplied"),
            Message::user("a"),
            Message::assistant("  请求失败：网络错误"),
            Message::assistant("正常回复"),
        ];
        let filtered = filter_client_turns(turns, MARKER);
        assert_eq!(
            filtered,
            vec![Message::user("a"), Message::assistant("正常回复")]
        );
    }

    #[test]
    fn test_trim_leading_non_user() {
        let turns = vec![
            Message::assistant("欢迎"),
            Message::assistant("还有"),
            Message::user("q"),
            Message::assistant("r"),
        ];
        assert_eq!(
            trim_leading_non_user(turns),
            vec![Message::user("q"), Message::assistant("r")]
        );
        assert!(trim_leading_non_user(vec![Message::assistant("x")]).is_empty());
    }

    #[test]
    fn test_collapse_keeps_latest_duplicate() {
        let turns = vec![
            Message::user("问题"),
            Message::user(" 问题 "),
            Message::user("问题\n"),
            Message::assistant("答"),
            Message::user("问题"),
        ];
        assert_eq!(
            collapse_duplicate_user_turns(turns),
            vec![
                Message::user("问题\n"),
                Message::assistant("答"),
                Message::user("问题"),
            ]
        );
    }

    #[test]
    fn test_collapse_keeps_distinct_user_turns() {
        let turns = vec![Message::user("a"), Message::user("b")];
        assert_eq!(collapse_duplicate_user_turns(turns.clone()), turns);
    }

    #[test]
    fn test_build_prepends_single_system_message() {
        let builder = ContextBuilder::new("现在是{time}", MARKER);
        let built = builder.build_at(
            vec![Message::system("ignored"), Message::user("hi")],
            Some(&profile()),
            NOW,
        );

        assert_eq!(built.len(), 2);
        assert_eq!(built[0].role, Role::System);
        assert!(built[0].content.starts_with("现在是2024-06-01 09:00:00\n\n用户档案信息"));
        assert_eq!(built.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[test]
    fn test_build_without_instruction_or_profile_has_no_system() {
        let builder = ContextBuilder::new("  ", MARKER);
        let built = builder.build_at(vec![Message::user("hi")], None, NOW);
        assert_eq!(built, vec![Message::user("hi")]);
    }

    #[test]
    fn test_build_profile_only() {
        let builder = ContextBuilder::new("", MARKER);
        let built = builder.build_at(vec![Message::user("hi")], Some(&profile()), NOW);
        assert!(built[0].content.starts_with("用户档案信息"));
    }

    #[test]
    fn test_build_output_properties() {
        let builder = ContextBuilder::new("instr {time}", MARKER);
        let inputs = vec![
            vec![],
            vec![Message::assistant("a"), Message::assistant("b")],
            vec![
                Message::user("x"),
                Message::user("x"),
                Message::assistant("请求失败：boom"),
                Message::user("x"),
                Message::system("s"),
                Message::user("y"),
            ],
        ];

        for turns in inputs {
            let built = builder.build_at(turns, None, NOW);
            let system_count = built.iter().filter(|m| m.role == Role::System).count();
            assert!(system_count <= 1);
            if system_count == 1 {
                assert_eq!(built[0].role, Role::System);
            }

            let rest: Vec<&Message> = built.iter().filter(|m| m.role != Role::System).collect();
            if let Some(first) = rest.first() {
                assert_eq!(first.role, Role::User);
            }
            for pair in rest.windows(2) {
                let both_user = pair[0].role == Role::User && pair[1].role == Role::User;
                assert!(!(both_user && pair[0].content.trim() == pair[1].content.trim()));
            }
            assert!(!rest
                .iter()
                .any(|m| m.role == Role::Assistant && m.content.trim().starts_with(MARKER)));
        }
    }

    #[test]
    fn test_failure_notice_between_duplicates_collapses() {
        let builder = ContextBuilder::new("", MARKER);
        let built = builder.build_at(
            vec![
                Message::user("x"),
                Message::assistant("请求失败：timeout"),
                Message::user("x"),
            ],
            None,
            NOW,
        );
        assert_eq!(built, vec![Message::user("x")]);
    }
}
