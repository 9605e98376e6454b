//! Mutable per-session conversation state.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::extraction::{ASPECT_ALL, ExtractedFields};

/// Scope used when no field or condition is known.
pub const DEFAULT_SCOPE: &str = "medical AI";

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// What changed when extracted fields were merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextUpdate {
    pub field_set: bool,
    /// A different canonical field replaced the current one.
    pub field_switched: bool,
}

/// Where the conversation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// No medical field yet.
    Gathering,
    /// Field known, no analysis yet.
    Ready,
    /// An analysis is present.
    Analyzed,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationState::Gathering => write!(f, "gathering"),
            ConversationState::Ready => write!(f, "ready"),
            ConversationState::Analyzed => write!(f, "analyzed"),
        }
    }
}

/// Accumulated topic fields plus the free-text history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub medical_field: Option<String>,
    pub specific_condition: Option<String>,
    pub time_range_years: Option<u32>,
    pub bias_aspects: BTreeSet<String>,
    history: Vec<HistoryEntry>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge best-effort extracted fields.
    ///
    /// Empty slots are filled. A canonical field named outright that differs
    /// from the current one replaces it and clears the condition, which
    /// belonged to the old field.
    pub fn apply(&mut self, fields: &ExtractedFields) -> ContextUpdate {
        let mut update = ContextUpdate::default();

        match (&self.medical_field, &fields.named_field) {
            (Some(current), Some(named)) if current != named => {
                self.medical_field = Some(named.clone());
                self.specific_condition = None;
                update.field_set = true;
                update.field_switched = true;
            }
            (None, _) => {
                if let Some(field) = fields.named_field.as_ref().or(fields.medical_field.as_ref())
                {
                    self.medical_field = Some(field.clone());
                    update.field_set = true;
                }
            }
            _ => {}
        }

        if self.specific_condition.is_none() {
            self.specific_condition = fields.specific_condition.clone();
        }
        if self.time_range_years.is_none() {
            self.time_range_years = fields.time_range_years;
        }
        self.bias_aspects.extend(fields.bias_aspects.iter().cloned());

        update
    }

    pub fn set_medical_field(&mut self, field: impl Into<String>) {
        self.medical_field = Some(field.into());
    }

    /// Replace the requested aspects with the "all" sentinel.
    pub fn select_all_aspects(&mut self) {
        self.bias_aspects.clear();
        self.bias_aspects.insert(ASPECT_ALL.to_string());
    }

    /// True when no specific aspect was requested, or the sentinel was set.
    pub fn wants_all_aspects(&self) -> bool {
        self.bias_aspects.is_empty() || self.bias_aspects.contains(ASPECT_ALL)
    }

    pub fn wants_aspect(&self, aspect: &str) -> bool {
        self.wants_all_aspects() || self.bias_aspects.contains(aspect)
    }

    /// Only the medical field is required before analysing.
    pub fn has_sufficient_context(&self) -> bool {
        self.medical_field.is_some()
    }

    /// Field plus condition, e.g. "dermatology melanoma".
    pub fn scope(&self) -> String {
        let parts: Vec<&str> = [&self.medical_field, &self.specific_condition]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            DEFAULT_SCOPE.to_string()
        } else {
            parts.join(" ")
        }
    }

    pub fn time_range(&self, default_years: u32) -> u32 {
        self.time_range_years.unwrap_or(default_years)
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.medical_field.is_none() {
            missing.push("medical_field");
        }
        if self.specific_condition.is_none() {
            missing.push("specific_condition");
        }
        if self.time_range_years.is_none() {
            missing.push("time_range");
        }
        missing
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    fn push(&mut self, role: Role, content: String) {
        self.history.push(HistoryEntry { role, content });
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The entry before the most recent one.
    ///
    /// While a user message is being handled this is the previous
    /// assistant response.
    pub fn previous_entry(&self) -> Option<&HistoryEntry> {
        self.history.iter().rev().nth(1)
    }

    /// Whether the turn before the current message mentioned mitigation.
    pub fn offered_mitigation(&self) -> bool {
        self.previous_entry()
            .is_some_and(|e| e.content.to_lowercase().contains("mitigation"))
    }

    /// The last `max_messages` entries as `role: content`, each truncated to
    /// `max_chars` characters.
    pub fn summary(&self, max_messages: usize, max_chars: usize) -> String {
        let start = self.history.len().saturating_sub(max_messages);
        self.history[start..]
            .iter()
            .map(|e| {
                let content: String = e.content.chars().take(max_chars).collect();
                format!("{}: {}", e.role, content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
