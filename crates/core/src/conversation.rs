use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Position of a turn in the log. Strictly increasing, starting at 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TurnId(pub u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemTurnKind {
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationTurn {
    #[serde(rename_all = "camelCase")]
    User {
        #[serde(rename = "timestampOrdinal")]
        id: TurnId,
        text: String,
        created_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    System {
        #[serde(rename = "timestampOrdinal")]
        id: TurnId,
        text: String,
        kind: SystemTurnKind,
        #[serde(rename = "relatedTurnId", skip_serializing_if = "Option::is_none")]
        related: Option<TurnId>,
        offers_summarization: bool,
        created_at: DateTime<Utc>,
    },
}

impl ConversationTurn {
    pub fn id(&self) -> TurnId {
        match self {
            ConversationTurn::User { id, .. } | ConversationTurn::System { id, .. } => *id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ConversationTurn::User { text, .. } | ConversationTurn::System { text, .. } => text,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, ConversationTurn::User { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ConversationTurn::System { kind: SystemTurnKind::Error, .. }
        )
    }
}

/// Append-only record of one session's turns.
///
/// Lives as long as the session; nothing is persisted.
#[derive(Debug, Default, Clone)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
    next_ordinal: u64,
    detected: HashMap<TurnId, String>,
    /// Translation of a user turn into the summarizer's working language.
    working_text: HashMap<TurnId, String>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> TurnId {
        self.next_ordinal += 1;
        TurnId(self.next_ordinal)
    }

    pub fn append_user(&mut self, text: &str) -> TurnId {
        let id = self.next_id();
        self.turns.push(ConversationTurn::User {
            id,
            text: text.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    /// Append a system annotation. `related` must name a user turn already in the log.
    pub fn append_system(
        &mut self,
        text: &str,
        kind: SystemTurnKind,
        related: Option<TurnId>,
        offers_summarization: bool,
    ) -> Result<TurnId> {
        if let Some(rel) = related {
            match self.get(rel) {
                Some(turn) if turn.is_user() => {}
                Some(_) => {
                    return Err(Error::Validation(format!(
                        "turn {} is not a user turn",
                        rel
                    )))
                }
                None => return Err(Error::NotFound(format!("turn {}", rel))),
            }
        }
        let id = self.next_id();
        self.turns.push(ConversationTurn::System {
            id,
            text: text.to_string(),
            kind,
            related,
            offers_summarization,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, id: TurnId) -> Option<&ConversationTurn> {
        // Ordinals are dense, so the index is known.
        let idx = id.0.checked_sub(1)? as usize;
        self.turns.get(idx).filter(|t| t.id() == id)
    }

    pub fn user_text(&self, id: TurnId) -> Option<&str> {
        self.get(id).filter(|t| t.is_user()).map(|t| t.text())
    }

    pub fn last_user_turn(&self) -> Option<TurnId> {
        self.turns.iter().rev().find(|t| t.is_user()).map(|t| t.id())
    }

    pub fn record_language(&mut self, id: TurnId, language: &str) {
        self.detected.insert(id, language.to_string());
    }

    pub fn detected_language(&self, id: TurnId) -> Option<&str> {
        self.detected.get(&id).map(|s| s.as_str())
    }

    pub fn record_working_text(&mut self, id: TurnId, text: &str) {
        self.working_text.insert(id, text.to_string());
    }

    /// Text the length policy and summarizer act on: the working-language translation
    /// when one was recorded, the user's own text otherwise.
    pub fn working_text(&self, id: TurnId) -> Option<&str> {
        let user = self.user_text(id)?;
        Some(self.working_text.get(&id).map(|s| s.as_str()).unwrap_or(user))
    }

    /// Whether any annotation of `user_turn` offers summarization.
    pub fn offers_summarization(&self, user_turn: TurnId) -> bool {
        self.turns.iter().any(|t| {
            matches!(
                t,
                ConversationTurn::System { related: Some(r), offers_summarization: true, .. } if *r == user_turn
            )
        })
    }

    /// Most recent user turn with a summarization offer.
    pub fn latest_offered_turn(&self) -> Option<TurnId> {
        self.turns.iter().rev().find_map(|t| match t {
            ConversationTurn::System {
                related: Some(r),
                offers_summarization: true,
                ..
            } => Some(*r),
            _ => None,
        })
    }

    /// Ordinals strictly increase and every relation points back to an earlier user turn.
    pub fn is_consistent(&self) -> bool {
        let ordered = self.turns.windows(2).all(|w| w[0].id() < w[1].id());
        let relations_ok = self.turns.iter().all(|t| match t {
            ConversationTurn::System {
                id,
                related: Some(r),
                ..
            } => r < id && self.get(*r).map(|u| u.is_user()).unwrap_or(false),
            _ => true,
        });
        ordered && relations_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_increase() {
        let mut log = ConversationLog::new();
        let u = log.append_user("Hello");
        let s = log
            .append_system("Detected language: en", SystemTurnKind::Info, Some(u), false)
            .unwrap();
        let e = log
            .append_system("Please enter some text!", SystemTurnKind::Error, None, false)
            .unwrap();
        assert_eq!(u, TurnId(1));
        assert!(u < s && s < e);
        assert!(log.is_consistent());
        assert!(log.get(e).unwrap().is_error());
    }

    #[test]
    fn test_related_must_be_existing_user_turn() {
        let mut log = ConversationLog::new();
        let u = log.append_user("Bonjour");
        let s = log
            .append_system("Detected language: fr", SystemTurnKind::Info, Some(u), false)
            .unwrap();

        let err = log
            .append_system("bad", SystemTurnKind::Info, Some(s), false)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = log
            .append_system("bad", SystemTurnKind::Info, Some(TurnId(99)), false)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_summarization_offer_lookup() {
        let mut log = ConversationLog::new();
        let first = log.append_user("one");
        log.append_system("Detected language: en", SystemTurnKind::Info, Some(first), true)
            .unwrap();
        let second = log.append_user("two");
        log.append_system("Detected language: en", SystemTurnKind::Info, Some(second), false)
            .unwrap();

        assert!(log.offers_summarization(first));
        assert!(!log.offers_summarization(second));
        assert_eq!(log.latest_offered_turn(), Some(first));
        assert_eq!(log.last_user_turn(), Some(second));
    }

    #[test]
    fn test_detected_language_record() {
        let mut log = ConversationLog::new();
        let u = log.append_user("Hola");
        assert!(log.detected_language(u).is_none());
        log.record_language(u, "es");
        assert_eq!(log.detected_language(u), Some("es"));
        assert_eq!(log.user_text(u), Some("Hola"));
        assert_eq!(log.user_text(TurnId(0)), None);
    }

    #[test]
    fn test_working_text_prefers_translation() {
        let mut log = ConversationLog::new();
        let u = log.append_user("Olá mundo");
        assert_eq!(log.working_text(u), Some("Olá mundo"));
        log.record_working_text(u, "Hello world");
        assert_eq!(log.working_text(u), Some("Hello world"));
        assert_eq!(log.user_text(u), Some("Olá mundo"));

        let s = log.append_system("Detected language: pt", SystemTurnKind::Info, Some(u), false).unwrap();
        assert_eq!(log.working_text(s), None);
    }

    #[test]
    fn test_turn_serialization() {
        let mut log = ConversationLog::new();
        let u = log.append_user("Hello");
        log.append_system("Detected language: en", SystemTurnKind::Info, Some(u), false)
            .unwrap();
        let json = serde_json::to_value(log.turns()).unwrap();
        assert_eq!(json[0]["type"], "user");
        assert_eq!(json[0]["timestampOrdinal"], 1);
        assert_eq!(json[1]["relatedTurnId"], 1);
        assert_eq!(json[1]["offersSummarization"], false);
    }
}
