//! Phrasing types.
//!
//! A phrasing is one testable rendering (question/options/answer) of a
//! concept. A concept with zero active phrasings is not reviewable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Answer format of a phrasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PhrasingType {
    #[default]
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl PhrasingType {
    /// Parse from string with flexible matching, for untrusted LLM output.
    pub fn from_str_flexible(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        match lower.trim() {
            "multiple_choice" | "multiple-choice" | "multiplechoice" | "mcq" | "choice" => {
                Some(PhrasingType::MultipleChoice)
            }
            "true_false" | "true-false" | "truefalse" | "boolean" => Some(PhrasingType::TrueFalse),
            "short_answer" | "short-answer" | "shortanswer" | "text" | "open" => {
                Some(PhrasingType::ShortAnswer)
            }
            _ => None,
        }
    }
}

/// One testable rendering of a concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phrasing {
    pub id: Uuid,
    pub concept_id: Uuid,
    pub user_id: String,
    pub question: String,
    /// Answer options for multiple-choice phrasings; empty otherwise.
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub phrasing_type: PhrasingType,
    /// Local attempt counters. These never feed the scheduling engine.
    pub attempt_count: u32,
    pub correct_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Phrasing {
    pub fn new(
        concept_id: Uuid,
        user_id: impl Into<String>,
        question: impl Into<String>,
        correct_answer: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            concept_id,
            user_id: user_id.into(),
            question: question.into(),
            options: Vec::new(),
            correct_answer: correct_answer.into(),
            explanation: None,
            phrasing_type: PhrasingType::default(),
            attempt_count: 0,
            correct_count: 0,
            last_attempted_at: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && self.archived_at.is_none()
    }
}
