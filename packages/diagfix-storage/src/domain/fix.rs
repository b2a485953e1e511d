//! Candidate fixes and their edits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Smoothing factor of the running success rate
pub const SUCCESS_RATE_ALPHA: f64 = 0.2;

/// Replace `[start_offset, end_offset)` of `file` with `new_text`
///
/// Offsets are byte offsets into the file's UTF-8 content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixEdit {
    pub file: PathBuf,
    pub start_offset: usize,
    pub end_offset: usize,
    pub new_text: String,
}

impl FixEdit {
    pub fn new(
        file: impl Into<PathBuf>,
        start_offset: usize,
        end_offset: usize,
        new_text: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            start_offset,
            end_offset,
            new_text: new_text.into(),
        }
    }

    /// Pure insertion at `offset`
    pub fn insert(file: impl Into<PathBuf>, offset: usize, text: impl Into<String>) -> Self {
        Self::new(file, offset, offset, text)
    }

    /// Pure deletion of `[start, end)`
    pub fn delete(file: impl Into<PathBuf>, start: usize, end: usize) -> Self {
        Self::new(file, start, end, "")
    }

    /// Bytes replaced
    pub fn replaced_len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    /// Half-open ranges overlap; two insertions at the same offset also conflict
    pub fn overlaps(&self, other: &FixEdit) -> bool {
        if self.file != other.file {
            return false;
        }
        if self.start_offset == other.start_offset {
            return true;
        }
        self.start_offset < other.end_offset && other.start_offset < self.end_offset
    }
}

/// Candidate correction for one diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub id: Uuid,
    pub diagnostic_id: Uuid,
    pub pattern_id: Option<Uuid>,
    /// Id of the strategy (or `ai_fallback`) that produced the fix
    pub strategy: String,
    pub description: String,
    pub edits: Vec<FixEdit>,
    /// True when produced by learning or the completion service
    pub is_generated: bool,
    confidence: u8,
    success_rate: f64,
    pub applications: u32,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Fix {
    pub fn new(
        diagnostic_id: Uuid,
        strategy: impl Into<String>,
        description: impl Into<String>,
        edits: Vec<FixEdit>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            diagnostic_id,
            pattern_id: None,
            strategy: strategy.into(),
            description: description.into(),
            edits,
            is_generated: false,
            confidence: 0,
            success_rate: 0.0,
            applications: 0,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Set confidence, clamped to [0, 100]
    pub fn with_confidence(mut self, confidence: i32) -> Self {
        self.set_confidence(confidence);
        self
    }

    pub fn with_pattern(mut self, pattern_id: Uuid) -> Self {
        self.pattern_id = Some(pattern_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn generated(mut self) -> Self {
        self.is_generated = true;
        self
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn set_confidence(&mut self, confidence: i32) {
        self.confidence = confidence.clamp(0, 100) as u8;
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    /// Fold one application outcome into the running success rate
    ///
    /// The first application sets the rate outright; later ones use an
    /// exponential moving average with [`SUCCESS_RATE_ALPHA`].
    pub fn record_application(&mut self, success: bool) {
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = if self.applications == 0 {
            outcome
        } else {
            (1.0 - SUCCESS_RATE_ALPHA) * self.success_rate + SUCCESS_RATE_ALPHA * outcome
        };
        self.success_rate = self.success_rate.clamp(0.0, 1.0);
        self.applications = self.applications.saturating_add(1);
    }

    /// Restore persisted counters (storage adapters only)
    pub fn restore_stats(&mut self, confidence: i32, success_rate: f64, applications: u32) {
        self.set_confidence(confidence);
        self.success_rate = success_rate.clamp(0.0, 1.0);
        self.applications = applications;
    }

    /// Distinct files touched, sorted
    pub fn files(&self) -> BTreeSet<&Path> {
        self.edits.iter().map(|e| e.file.as_path()).collect()
    }

    /// Edits for `file` in descending start offset
    pub fn edits_for(&self, file: &Path) -> Vec<&FixEdit> {
        let mut edits: Vec<&FixEdit> = self.edits.iter().filter(|e| e.file == file).collect();
        edits.sort_by(|a, b| b.start_offset.cmp(&a.start_offset));
        edits
    }

    /// Concatenated replacement text, for content scanners
    pub fn inserted_text(&self) -> String {
        self.edits
            .iter()
            .map(|e| e.new_text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First pair of overlapping edits, if any
    pub fn find_overlap(&self) -> Option<(&FixEdit, &FixEdit)> {
        for (i, a) in self.edits.iter().enumerate() {
            for b in &self.edits[i + 1..] {
                if a.overlaps(b) {
                    return Some((a, b));
                }
            }
        }
        None
    }
}
