//! Creation-time keyword classification.
//!
//! An explicit pipeline action, separate from the upsert merge: when the
//! initiating message matches a configured keyword the freshly created
//! lead is promoted to "potential" through `update_status`. An empty rule
//! set disables classification entirely.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::models::lead::LeadStatus;

/// Rule-based classifier applied to the message that created a lead.
#[derive(Debug, Clone)]
pub struct Classifier {
    potential: Option<Regex>,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to compile keyword pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl Classifier {
    /// Build from keyword lists; keywords are matched literally,
    /// case-insensitively, anywhere in the message.
    pub fn from_keywords(potential_keywords: &[String]) -> Result<Self, ClassifierError> {
        Ok(Self {
            potential: build_alternation(potential_keywords)?,
        })
    }

    /// A classifier that never matches.
    pub fn disabled() -> Self {
        Self { potential: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.potential.is_some()
    }

    /// Classify the initiating message, if any rule matches.
    pub fn classify(&self, body: &str) -> Option<LeadStatus> {
        match &self.potential {
            Some(pattern) if pattern.is_match(body) => Some(LeadStatus::Potential),
            _ => None,
        }
    }
}

fn build_alternation(keywords: &[String]) -> Result<Option<Regex>, regex::Error> {
    let escaped: Vec<String> = keywords
        .iter()
        .map(|kw| kw.trim())
        .filter(|kw| !kw.is_empty())
        .map(regex::escape)
        .collect();

    if escaped.is_empty() {
        return Ok(None);
    }

    let pattern = escaped.join("|");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
}
