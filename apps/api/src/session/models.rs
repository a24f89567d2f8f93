//! Paragraph sessions: the multi-paragraph editing variant.
//!
//! A session owns its paragraphs exclusively. Each paragraph keeps every text
//! version it has had, so any earlier round can be restored. Nothing here is
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::convergence::request::MIN_TARGET_LENGTH;
use crate::errors::AppError;
use crate::length::{char_count, normalize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: Uuid,
    pub current_text: String,
    pub original_text: String,
    /// Every version in creation order. `history[0]` is the original.
    pub history: Vec<String>,
    pub current_version_index: usize,
}

impl Paragraph {
    pub fn new(text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            current_text: text.clone(),
            original_text: text.clone(),
            history: vec![text],
            current_version_index: 0,
        }
    }

    pub fn current_length(&self) -> usize {
        char_count(&self.current_text)
    }

    /// Appends a new version and makes it current.
    pub fn push_version(&mut self, text: String) {
        self.history.push(text.clone());
        self.current_version_index = self.history.len() - 1;
        self.current_text = text;
    }

    /// Makes an existing version current. The history itself is never rewritten.
    pub fn revert_to(&mut self, version_index: usize) -> Result<(), AppError> {
        let text = self.history.get(version_index).cloned().ok_or_else(|| {
            AppError::Validation(format!(
                "version {version_index} does not exist (paragraph has {} versions)",
                self.history.len()
            ))
        })?;
        self.current_version_index = version_index;
        self.current_text = text;
        Ok(())
    }

    /// Steps back one version from the current one.
    pub fn revert_previous(&mut self) -> Result<(), AppError> {
        if self.current_version_index == 0 {
            return Err(AppError::Validation(
                "paragraph is already at its original version".to_string(),
            ));
        }
        self.revert_to(self.current_version_index - 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub paragraphs: Vec<Paragraph>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Splits `text` into paragraphs on line breaks, dropping blank lines.
    pub fn from_text(text: &str) -> Result<Self, AppError> {
        let paragraphs: Vec<Paragraph> = split_paragraphs(text)
            .into_iter()
            .map(Paragraph::new)
            .collect();

        if paragraphs.is_empty() {
            return Err(AppError::Validation("text cannot be empty".to_string()));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            paragraphs,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn paragraph(&self, paragraph_id: Uuid) -> Result<&Paragraph, AppError> {
        self.paragraphs
            .iter()
            .find(|p| p.id == paragraph_id)
            .ok_or_else(|| AppError::NotFound(format!("Paragraph {paragraph_id} not found")))
    }

    pub fn paragraph_mut(&mut self, paragraph_id: Uuid) -> Result<&mut Paragraph, AppError> {
        self.paragraphs
            .iter_mut()
            .find(|p| p.id == paragraph_id)
            .ok_or_else(|| AppError::NotFound(format!("Paragraph {paragraph_id} not found")))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

pub fn split_paragraphs(text: &str) -> Vec<String> {
    normalize(text)
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shares `total_target` across paragraphs in proportion to their lengths.
///
/// Each share is floored and raised to `MIN_TARGET_LENGTH`. Whatever the raise
/// adds is taken back from the largest shares, so the sum never exceeds
/// `total_target` as long as it is at least `lengths.len() * MIN_TARGET_LENGTH`.
pub fn distribute_target(lengths: &[usize], total_target: usize) -> Vec<usize> {
    let total_length: usize = lengths.iter().sum();
    let mut shares: Vec<usize> = if total_length == 0 {
        let even = total_target / lengths.len().max(1);
        vec![even.max(MIN_TARGET_LENGTH); lengths.len()]
    } else {
        lengths
            .iter()
            .map(|&len| {
                let share = (len as u128 * total_target as u128 / total_length as u128) as usize;
                share.max(MIN_TARGET_LENGTH)
            })
            .collect()
    };

    let mut excess = shares.iter().sum::<usize>().saturating_sub(total_target);
    while excess > 0 {
        let Some(largest) = shares
            .iter_mut()
            .filter(|share| **share > MIN_TARGET_LENGTH)
            .max_by_key(|share| **share)
        else {
            break;
        };
        let taken = (*largest - MIN_TARGET_LENGTH).min(excess);
        *largest -= taken;
        excess -= taken;
    }
    shares
}
