//! Message search with inline filters.
//!
//! A query is split on whitespace. Recognised filter tokens are consumed:
//!
//! - `from:<nick>`: exact sender match, case-insensitive
//! - `in:<conversation>`: search another conversation
//! - `has:image` / `has:link`: message contains an image URL or any URL
//! - `before:<YYYY-MM-DD>` / `after:<YYYY-MM-DD>`: inclusive date bounds
//!
//! Everything else is free text, matched as a case-insensitive substring.

use crate::casemap::keys_match;
use crate::message::Message;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

fn image_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Closing punctuation may follow the extension, e.g. "(see x.png)".
        Regex::new(
            r#"(?i)https?://\S+?\.(?:png|jpe?g|gif|webp|bmp|svg|avif)(?:\?\S*?)?[)\]}>.,;:!?'"]*(?:\s|$)"#,
        )
        .expect("image URL pattern is valid")
    })
}

fn any_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)https?://\S+").expect("URL pattern is valid"))
}

/// A parsed search query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Lowercased free text.
    pub text: String,
    pub from: Option<String>,
    /// Conversation override from `in:`.
    pub conversation: Option<String>,
    pub has_image: bool,
    pub has_link: bool,
    pub before: Option<NaiveDate>,
    pub after: Option<NaiveDate>,
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        let mut words = Vec::new();

        for token in query.split_whitespace() {
            let Some((key, value)) = token.split_once(':') else {
                words.push(token);
                continue;
            };
            match (key.to_ascii_lowercase().as_str(), value) {
                ("from", nick) if !nick.is_empty() => parsed.from = Some(nick.to_string()),
                ("in", target) if !target.is_empty() => parsed.conversation = Some(target.to_string()),
                ("has", kind) if kind.eq_ignore_ascii_case("image") => parsed.has_image = true,
                ("has", kind) if kind.eq_ignore_ascii_case("link") => parsed.has_link = true,
                // Unparseable dates are dropped without failing the query.
                ("before", date) => parsed.before = parse_date(date),
                ("after", date) => parsed.after = parse_date(date),
                _ => words.push(token),
            }
        }

        parsed.text = words.join(" ").to_lowercase();
        parsed
    }

    /// Whether any filter other than `in:` and free text is set.
    pub fn has_filters(&self) -> bool {
        self.from.is_some()
            || self.has_image
            || self.has_link
            || self.before.is_some()
            || self.after.is_some()
    }

    /// A query with neither text nor filters matches nothing.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && !self.has_filters()
    }

    pub fn matches(&self, msg: &Message) -> bool {
        if msg.redacted || !msg.kind.is_content() {
            return false;
        }
        if let Some(from) = &self.from
            && !keys_match(from, &msg.nick)
        {
            return false;
        }
        if self.has_image && !image_url().is_match(&msg.text) {
            return false;
        }
        if self.has_link && !any_url().is_match(&msg.text) {
            return false;
        }
        let date = msg.time.date_naive();
        if self.after.is_some_and(|after| date < after) {
            return false;
        }
        if self.before.is_some_and(|before| date > before) {
            return false;
        }
        self.text.is_empty() || msg.text.to_lowercase().contains(&self.text)
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Messages matching `query`, in buffer order.
pub fn search<'a>(messages: &'a [Message], query: &SearchQuery) -> Vec<&'a Message> {
    if query.is_empty() {
        return Vec::new();
    }
    messages.iter().filter(|m| query.matches(m)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use chrono::{TimeZone, Utc};

    fn msg_at(id: &str, nick: &str, text: &str, day: u32) -> Message {
        Message::new(id, nick, "#rust", text, Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap())
    }

    fn ids(found: &[&Message]) -> Vec<String> {
        found.iter().map(|m| m.msgid.clone()).collect()
    }

    // === Parsing ===

    #[test]
    fn parse_consumes_filters() {
        let q = SearchQuery::parse("from:Alice in:#Other has:image before:2024-03-05 after:2024-03-01 Hello World");
        assert_eq!(q.from.as_deref(), Some("Alice"));
        assert_eq!(q.conversation.as_deref(), Some("#Other"));
        assert!(q.has_image);
        assert!(!q.has_link);
        assert_eq!(q.before, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(q.after, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(q.text, "hello world");
    }

    #[test]
    fn parse_keeps_unknown_tokens_as_text() {
        let q = SearchQuery::parse("has:video note:this");
        assert!(!q.has_filters());
        assert_eq!(q.text, "has:video note:this");
    }

    #[test]
    fn parse_drops_unparseable_dates() {
        let q = SearchQuery::parse("before:someday rust");
        assert_eq!(q.before, None);
        assert_eq!(q.text, "rust");
    }

    #[test]
    fn empty_query_matches_nothing() {
        let msgs = vec![msg_at("1", "alice", "anything", 1)];
        assert!(search(&msgs, &SearchQuery::parse("")).is_empty());
        assert!(search(&msgs, &SearchQuery::parse("   ")).is_empty());
        assert!(search(&msgs, &SearchQuery::parse("before:nope")).is_empty());
    }

    // === Matching ===

    #[test]
    fn free_text_is_case_insensitive_substring() {
        let msgs = vec![
            msg_at("1", "alice", "Borrow Checker woes", 1),
            msg_at("2", "bob", "lifetimes", 1),
        ];
        assert_eq!(ids(&search(&msgs, &SearchQuery::parse("checker"))), vec!["1"]);
    }

    #[test]
    fn from_is_exact_nick_case_insensitive() {
        let msgs = vec![
            msg_at("1", "Alice", "hi", 1),
            msg_at("2", "alicebot", "hi", 1),
        ];
        assert_eq!(ids(&search(&msgs, &SearchQuery::parse("from:alice"))), vec!["1"]);
    }

    #[test]
    fn has_image_accepts_query_string() {
        let msgs = vec![
            msg_at("1", "a", "look https://img.example/cat.png?size=large nice", 1),
            msg_at("2", "a", "https://img.example/dog.JPG", 1),
            msg_at("3", "a", "no image here", 1),
        ];
        assert_eq!(ids(&search(&msgs, &SearchQuery::parse("has:image"))), vec!["1", "2"]);
    }

    #[test]
    fn has_image_rejects_non_image_extension() {
        let msgs = vec![
            msg_at("1", "a", "see photo.png then https://files.example/report.pdf", 1),
            msg_at("2", "a", "https://files.example/photo.png.exe", 1),
        ];
        assert!(search(&msgs, &SearchQuery::parse("has:image")).is_empty());
    }

    #[test]
    fn has_image_tolerates_trailing_punctuation() {
        let msgs = vec![
            msg_at("1", "a", "(https://x.example/a.png)", 1),
            msg_at("2", "a", "https://x.example/b.gif, nice", 1),
            msg_at("3", "a", "see https://x.example/c.jpg?w=2.", 1),
            msg_at("4", "a", "https://x.example/d.png.exe!", 1),
        ];
        assert_eq!(ids(&search(&msgs, &SearchQuery::parse("has:image"))), vec!["1", "2", "3"]);
    }

    #[test]
    fn has_link_matches_any_url() {
        let msgs = vec![
            msg_at("1", "a", "docs at https://doc.rust-lang.org", 1),
            msg_at("2", "a", "no link", 1),
        ];
        assert_eq!(ids(&search(&msgs, &SearchQuery::parse("has:link"))), vec!["1"]);
    }

    #[test]
    fn date_bounds_are_inclusive_and_combined() {
        let msgs = vec![
            msg_at("1", "a", "x", 1),
            msg_at("2", "a", "x", 2),
            msg_at("3", "a", "x", 3),
            msg_at("4", "a", "x", 4),
        ];
        let found = search(&msgs, &SearchQuery::parse("after:2024-03-02 before:2024-03-03"));
        assert_eq!(ids(&found), vec!["2", "3"]);
    }

    #[test]
    fn unparseable_date_does_not_block_text() {
        let msgs = vec![msg_at("1", "a", "rust release", 1), msg_at("2", "a", "go", 1)];
        let found = search(&msgs, &SearchQuery::parse("after:03/01 release"));
        assert_eq!(ids(&found), vec!["1"]);
    }

    #[test]
    fn redacted_and_state_changes_are_skipped() {
        let mut redacted = msg_at("1", "a", "hello", 1);
        redacted.redacted = true;
        let join = msg_at("2", "a", "hello", 1).with_kind(MessageKind::Join);
        let notice = msg_at("3", "a", "hello", 1).with_kind(MessageKind::Notice);
        let msgs = vec![redacted, join, notice];
        assert_eq!(ids(&search(&msgs, &SearchQuery::parse("hello"))), vec!["3"]);
    }

    #[test]
    fn filters_are_conjunctive() {
        let msgs = vec![
            msg_at("1", "alice", "https://x.example/a.gif", 1),
            msg_at("2", "bob", "https://x.example/b.gif", 1),
            msg_at("3", "alice", "plain text", 1),
        ];
        let found = search(&msgs, &SearchQuery::parse("from:alice has:image"));
        assert_eq!(ids(&found), vec!["1"]);
    }
}
