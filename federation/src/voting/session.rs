//! One proposal's voting session: the vote-message grammar, the
//! deduplicating tally, and the majority decision.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::clients::ChatMessage;

/// A parsed vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Yes,
    No,
}

// Grammar: verb, one space, one trailing token. "yes abc extra" is not
// a vote for "abc".
fn vote_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(yes|no) (\S+)$").unwrap())
}

/// Parse a message body as a vote for `model_id`.
///
/// The body is trimmed and lowercased first; the trailing token must
/// equal the proposal's model id exactly.
pub fn parse_vote(body: &str, model_id: &str) -> Option<Vote> {
    let body = body.trim().to_lowercase();
    let captures = vote_pattern().captures(&body)?;

    if &captures[2] != model_id {
        return None;
    }

    match &captures[1] {
        "yes" => Some(Vote::Yes),
        "no" => Some(Vote::No),
        _ => unreachable!("pattern only admits yes|no"),
    }
}

/// Tally state for one in-flight proposal.
///
/// Counts only ever increase, one increment per distinct valid vote
/// message. Message identity is (room, author, timestamp, body), so
/// re-polling an overlapping window never double-counts.
#[derive(Debug)]
pub struct VotingSession {
    pub model_name: String,
    pub model_id: String,
    pub yes_votes: u32,
    pub no_votes: u32,
    pub voting_start: DateTime<Utc>,
    seen: HashSet<(String, String, i64, String)>,
}

impl VotingSession {
    pub fn new(model_name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_id: model_id.into(),
            yes_votes: 0,
            no_votes: 0,
            voting_start: Utc::now(),
            seen: HashSet::new(),
        }
    }

    /// Record one observed message. Returns true when it counted as a
    /// new vote for this proposal.
    pub fn record_message(&mut self, room_id: &str, message: &ChatMessage) -> bool {
        let Some(vote) = parse_vote(&message.body, &self.model_id) else {
            return false;
        };

        let identity = (
            room_id.to_string(),
            message.author.clone(),
            message.timestamp.timestamp_millis(),
            message.body.clone(),
        );
        if !self.seen.insert(identity) {
            debug!(author = %message.author, "duplicate vote message ignored");
            return false;
        }

        match vote {
            Vote::Yes => self.yes_votes += 1,
            Vote::No => self.no_votes += 1,
        }
        true
    }

    pub fn total_votes(&self) -> u32 {
        self.yes_votes + self.no_votes
    }

    /// Strict majority: a tie rejects.
    pub fn approved(&self) -> bool {
        self.yes_votes > self.no_votes
    }
}
