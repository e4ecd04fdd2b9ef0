// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rudder_config::ConversationConfig;
use rudder_model::{Message, Role};

/// Header line of the collapsed-history summary block.  Kept byte-for-byte
/// stable because downstream prompts and clients key on it.
const SUMMARY_HEADER: &str = "[对话历史摘要]";

/// Bounded message history for one agent run.
///
/// Index 0 is always the system prompt.  When the message count crosses
/// `compress_threshold` — or the token estimate crosses
/// `max_prompt_tokens`, whichever happens first — the middle of the
/// history collapses into a single user-role summary; the last
/// `keep_recent` messages survive verbatim and the split never separates
/// an assistant's tool calls from their results.
pub struct ConversationManager {
    messages: Vec<Message>,
    cfg: ConversationConfig,
}

impl ConversationManager {
    /// Build a well-formed conversation from a system prompt and optional
    /// pre-existing messages.
    ///
    /// Extra system-role messages in `initial` are merged into the primary
    /// system content; a trailing assistant-with-tool-calls without its
    /// results (or an orphan tool message) is stripped so the sequence the
    /// model sees is always valid.
    pub fn new(system_prompt: &str, initial: Vec<Message>, cfg: ConversationConfig) -> Self {
        let mut system_content = system_prompt.to_string();
        let mut rest: Vec<Message> = Vec::with_capacity(initial.len());
        for msg in initial {
            if msg.role == Role::System {
                if !msg.content.is_empty() {
                    system_content.push_str("\n\n");
                    system_content.push_str(&msg.content);
                }
            } else {
                rest.push(msg);
            }
        }
        strip_trailing_unmatched(&mut rest);

        let mut messages = vec![Message::system(system_content)];
        messages.extend(rest);
        Self { messages, cfg }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message, compressing when the count crosses the threshold
    /// or the token estimate crosses the prompt budget.  The token gate
    /// catches histories that are short in messages but heavy in content
    /// (a few large page extractions) before the next model call.
    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        if self.messages.len() >= self.cfg.compress_threshold
            || self.estimated_tokens() >= self.cfg.max_prompt_tokens
        {
            self.compress();
        }
    }

    /// Estimated prompt tokens at the configured chars-per-token ratio.
    pub fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.approx_tokens(self.cfg.chars_per_token))
            .sum()
    }

    /// Collapse the middle of the history into one summary message.
    pub fn compress(&mut self) {
        let keep_recent = self.cfg.keep_recent;
        // system + summary + recent must actually shrink the list.
        if self.messages.len() <= keep_recent + 2 {
            return;
        }

        let body = &self.messages[1..];
        let mut split = body.len().saturating_sub(keep_recent);

        // Never start the preserved tail at a tool-result message: walking
        // backward keeps the whole tool group (assistant call + results)
        // intact in the tail.  Orphan results would be rejected by the
        // provider on the next request.
        while split > 0 && body[split].role == Role::Tool {
            split -= 1;
        }
        if split == 0 {
            return;
        }

        let summary = summarize(&body[..split]);
        let tail: Vec<Message> = body[split..].to_vec();

        let mut rebuilt = Vec::with_capacity(tail.len() + 2);
        rebuilt.push(self.messages[0].clone());
        rebuilt.push(Message::user(summary));
        rebuilt.extend(tail);
        self.messages = rebuilt;
    }
}

/// Render the collapsed range: one "thought/called/→" line per tool group,
/// one flat line per free assistant or user message.
fn summarize(range: &[Message]) -> String {
    let mut out = String::from(SUMMARY_HEADER);
    let mut i = 0;
    while i < range.len() {
        let msg = &range[i];
        match msg.role {
            Role::Assistant if msg.has_tool_calls() => {
                let thought = snippet(&msg.content, 80);
                let names: Vec<&str> =
                    msg.tool_calls.iter().map(|c| c.name.as_str()).collect();
                // Collect the snippet of the first paired result.
                let mut result_snippet = String::new();
                let mut j = i + 1;
                while j < range.len() && range[j].role == Role::Tool {
                    if result_snippet.is_empty() {
                        result_snippet = snippet(&range[j].content, 100);
                    }
                    j += 1;
                }
                out.push_str(&format!(
                    "\n- thought: {} called {} → {}",
                    thought,
                    names.join(","),
                    result_snippet
                ));
                i = j;
            }
            Role::Assistant => {
                out.push_str(&format!("\n- assistant: {}", snippet(&msg.content, 120)));
                i += 1;
            }
            Role::User => {
                out.push_str(&format!("\n- user: {}", snippet(&msg.content, 120)));
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

fn snippet(text: &str, cap: usize) -> String {
    let trimmed = text.trim().replace('\n', " ");
    if trimmed.is_empty() {
        return "…".to_string();
    }
    if trimmed.chars().count() <= cap {
        return trimmed;
    }
    let cut: String = trimmed.chars().take(cap).collect();
    format!("{cut}…")
}

/// Drop a trailing assistant-with-tool-calls that has no results yet, and
/// any leading/orphan tool messages that lost their assistant pair.
fn strip_trailing_unmatched(messages: &mut Vec<Message>) {
    while let Some(last) = messages.last() {
        match last.role {
            Role::Assistant if last.has_tool_calls() => {
                messages.pop();
            }
            Role::Tool => {
                let id = last.tool_call_id.clone().unwrap_or_default();
                let paired = messages.iter().rev().skip(1).any(|m| {
                    m.role == Role::Assistant && m.tool_calls.iter().any(|c| c.id == id)
                });
                if paired {
                    break;
                }
                messages.pop();
            }
            _ => break,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rudder_model::ToolInvocation;
    use serde_json::json;

    fn cfg(threshold: usize, keep: usize) -> ConversationConfig {
        ConversationConfig {
            max_messages: 40,
            compress_threshold: threshold,
            keep_recent: keep,
            chars_per_token: 4,
            ..ConversationConfig::default()
        }
    }

    fn tool_group(id: &str, tool: &str) -> Vec<Message> {
        vec![
            Message::assistant_tool_calls(
                "let me check",
                vec![ToolInvocation {
                    id: id.into(),
                    name: tool.into(),
                    args: json!({}),
                }],
            ),
            Message::tool_result(id, "{\"ok\":true}"),
        ]
    }

    // ── Init shaping ──────────────────────────────────────────────────────

    #[test]
    fn extra_system_messages_merge_into_primary() {
        let conv = ConversationManager::new(
            "base prompt",
            vec![Message::system("site notes"), Message::user("hello")],
            cfg(30, 20),
        );
        assert_eq!(conv.messages()[0].role, Role::System);
        assert!(conv.messages()[0].content.contains("base prompt"));
        assert!(conv.messages()[0].content.contains("site notes"));
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn trailing_unanswered_tool_call_is_stripped() {
        let mut initial = vec![Message::user("go")];
        initial.push(Message::assistant_tool_calls(
            "",
            vec![ToolInvocation {
                id: "c1".into(),
                name: "navigate".into(),
                args: json!({}),
            }],
        ));
        let conv = ConversationManager::new("S", initial, cfg(30, 20));
        assert_eq!(conv.len(), 2); // system + user
    }

    #[test]
    fn orphan_tool_message_is_stripped() {
        let initial = vec![Message::user("go"), Message::tool_result("ghost", "{}")];
        let conv = ConversationManager::new("S", initial, cfg(30, 20));
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn complete_tool_group_is_kept() {
        let mut initial = vec![Message::user("go")];
        initial.extend(tool_group("c1", "navigate"));
        let conv = ConversationManager::new("S", initial, cfg(30, 20));
        assert_eq!(conv.len(), 4);
    }

    // ── Compression ───────────────────────────────────────────────────────

    #[test]
    fn compression_boundary_scenario() {
        // system "S" + 12 assistant messages at threshold 10 / keep 5:
        // ≤ 10 messages, [0] == "S", [1] is the summary user message.
        let mut conv = ConversationManager::new("S", vec![], cfg(10, 5));
        for i in 0..12 {
            conv.push(Message::assistant(format!("step {i}")));
        }
        assert!(conv.len() <= 10, "got {} messages", conv.len());
        assert_eq!(conv.messages()[0].content, "S");
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[1].role, Role::User);
        assert!(conv.messages()[1].content.starts_with("[对话历史摘要]"));
    }

    #[test]
    fn compression_preserves_recent_tail() {
        let mut conv = ConversationManager::new("S", vec![], cfg(10, 5));
        for i in 0..12 {
            conv.push(Message::assistant(format!("step {i}")));
        }
        let last = conv.messages().last().unwrap();
        assert_eq!(last.content, "step 11");
    }

    #[test]
    fn split_never_orphans_tool_results() {
        let mut conv = ConversationManager::new("S", vec![], cfg(12, 3));
        for i in 0..4 {
            conv.push(Message::user(format!("q{i}")));
            for m in tool_group(&format!("c{i}"), "get_page_info") {
                conv.push(m);
            }
        }
        // After any compression, every tool message must have a preceding
        // assistant carrying its call id.
        let msgs = conv.messages();
        for (idx, m) in msgs.iter().enumerate() {
            if m.role == Role::Tool {
                let id = m.tool_call_id.as_deref().unwrap();
                let paired = msgs[..idx].iter().any(|p| {
                    p.role == Role::Assistant && p.tool_calls.iter().any(|c| c.id == id)
                });
                assert!(paired, "orphan tool result at index {idx}");
            }
        }
    }

    #[test]
    fn summary_contains_group_lines() {
        let mut conv = ConversationManager::new("S", vec![], cfg(8, 2));
        conv.push(Message::user("open example.com"));
        for m in tool_group("c1", "navigate") {
            conv.push(m);
        }
        for i in 0..4 {
            conv.push(Message::assistant(format!("note {i}")));
        }
        let summary = &conv.messages()[1];
        assert!(summary.content.contains("called navigate"));
        assert!(summary.content.contains("- user: open example.com"));
    }

    #[test]
    fn token_estimate_uses_chars_per_token() {
        let mut conv = ConversationManager::new("12345678", vec![], cfg(30, 20));
        conv.push(Message::user("abcd"));
        // 8 chars / 4 + 4 chars / 4 = 2 + 1
        assert_eq!(conv.estimated_tokens(), 3);
    }

    #[test]
    fn token_pressure_compresses_below_count_threshold() {
        let config = ConversationConfig {
            compress_threshold: 30,
            keep_recent: 2,
            max_prompt_tokens: 100, // 400 chars at 4 chars/token
            ..ConversationConfig::default()
        };
        let mut conv = ConversationManager::new("S", vec![], config);
        for i in 0..4 {
            conv.push(Message::assistant(format!("{i}{}", "x".repeat(200))));
        }
        // Far below the 30-message threshold, yet compressed on tokens.
        assert!(conv.len() <= 4);
        assert_eq!(conv.messages()[1].role, Role::User);
        assert!(conv.messages()[1].content.starts_with("[对话历史摘要]"));
    }

    #[test]
    fn small_messages_stay_below_the_token_gate() {
        let mut conv = ConversationManager::new("S", vec![], cfg(30, 20));
        for i in 0..10 {
            conv.push(Message::assistant(format!("short {i}")));
        }
        assert_eq!(conv.len(), 11); // system + 10, nothing collapsed
    }

    #[test]
    fn short_history_is_not_compressed() {
        let mut conv = ConversationManager::new("S", vec![], cfg(30, 20));
        conv.push(Message::user("hi"));
        conv.compress();
        assert_eq!(conv.len(), 2);
    }
}
