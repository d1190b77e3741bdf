//! Narration content collaborator
//!
//! Speech synthesis and LLM-backed writers live outside this crate and
//! implement `ContentGenerator`. `TemplateContentGenerator` builds plain
//! sentences from the POI record itself and sizes them to the requested
//! duration at a fixed speaking rate.

use crate::domain::narration::Narration;
use crate::domain::types::{Poi, PoiId};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContentError {
    #[error("content generation failed for {poi_id}: {reason}")]
    ContentGenerationFailed { poi_id: PoiId, reason: String },
}

impl ContentError {
    pub fn failed(poi: &Poi, reason: impl Into<String>) -> Self {
        ContentError::ContentGenerationFailed { poi_id: poi.id.clone(), reason: reason.into() }
    }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce a queued narration about `poi`, aiming for the target duration
    async fn generate(
        &self,
        poi: &Poi,
        target_duration_seconds: f64,
        interests: &[String],
    ) -> Result<Narration, ContentError>;
}

/// Offline generator composing text from the POI's own fields
#[derive(Debug, Clone)]
pub struct TemplateContentGenerator {
    words_per_minute: f64,
}

impl Default for TemplateContentGenerator {
    fn default() -> Self {
        Self::new(150.0)
    }
}

impl TemplateContentGenerator {
    pub fn new(words_per_minute: f64) -> Self {
        Self { words_per_minute }
    }

    pub fn words_per_minute(&self) -> f64 {
        self.words_per_minute
    }

    /// Spoken length of `text` at this generator's rate
    pub fn spoken_seconds(&self, text: &str) -> f64 {
        text.split_whitespace().count() as f64 / self.words_per_minute * 60.0
    }

    /// Candidate sentences, most important first
    fn sentences(poi: &Poi, interests: &[String]) -> Vec<String> {
        let mut sentences = vec![format!("Coming up: {}, {}.", poi.name, poi.category.describe())];

        if let Some(description) = poi.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            sentences.push(description.to_string());
        }

        let matching: Vec<&str> = poi
            .tags
            .iter()
            .filter(|t| interests.iter().any(|i| i.eq_ignore_ascii_case(t)))
            .map(String::as_str)
            .collect();
        if !matching.is_empty() {
            sentences.push(format!("You'll enjoy it for its {}.", matching.join(" and ")));
        } else if !poi.tags.is_empty() {
            sentences.push(format!("It is known for {}.", poi.tags.join(", ")));
        }

        if let Some(rating) = poi.rating {
            sentences.push(format!("Visitors rate it {rating:.1} out of 5."));
        }
        if let Some(hours) = &poi.hours {
            sentences.push(format!("Opening hours: {hours}."));
        }
        sentences
    }
}

#[async_trait]
impl ContentGenerator for TemplateContentGenerator {
    async fn generate(
        &self,
        poi: &Poi,
        target_duration_seconds: f64,
        interests: &[String],
    ) -> Result<Narration, ContentError> {
        if !self.words_per_minute.is_finite() || self.words_per_minute <= 0.0 {
            return Err(ContentError::failed(poi, "speaking rate must be positive"));
        }
        if !target_duration_seconds.is_finite() || target_duration_seconds <= 0.0 {
            return Err(ContentError::failed(poi, "target duration must be positive"));
        }
        if poi.name.trim().is_empty() {
            return Err(ContentError::failed(poi, "POI has no name"));
        }
        let has_details = poi.description.as_deref().is_some_and(|d| !d.trim().is_empty())
            || !poi.tags.is_empty()
            || poi.rating.is_some();
        if !has_details {
            return Err(ContentError::failed(poi, "POI has no description, tags or rating"));
        }

        // Always keep the introduction, then add sentences while they fit
        let budget_words = (target_duration_seconds / 60.0 * self.words_per_minute).floor() as usize;
        let mut words = 0usize;
        let mut kept: Vec<String> = Vec::new();
        for sentence in Self::sentences(poi, interests) {
            let count = sentence.split_whitespace().count();
            if !kept.is_empty() && words + count > budget_words {
                break;
            }
            words += count;
            kept.push(sentence);
        }

        let content = kept.join(" ");
        let duration = self.spoken_seconds(&content);
        debug!(
            poi_id = %poi.id,
            words = %words,
            duration_secs = %format!("{duration:.1}"),
            target_secs = %target_duration_seconds,
            "narration_content_generated"
        );
        Ok(Narration::new(poi.id.clone(), &poi.name, &poi.name, &content, duration))
    }
}
