//! Pattern tracking
//!
//! Every observed diagnostic is folded into the `Pattern` for its signature.
//! Patterns are created on first sight and their frequency only grows.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use diagfix_storage::{Diagnostic, FixStore, Pattern};

use crate::classify::signature_for;
use crate::error::Result;

pub struct PatternTracker {
    store: Arc<dyn FixStore>,
    // Serializes read-modify-write cycles against the store
    guard: Mutex<()>,
}

impl PatternTracker {
    pub fn new(store: Arc<dyn FixStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Record one occurrence and link the diagnostic to its pattern
    ///
    /// `auto_fixable` is sticky: once any strategy covered the shape, the
    /// pattern stays flagged.
    pub async fn observe(&self, diagnostic: &mut Diagnostic, auto_fixable: bool) -> Result<Pattern> {
        let sig = signature_for(&diagnostic.code, &diagnostic.message);
        let _guard = self.guard.lock().await;

        let pattern = match self.store.find_pattern(&sig.signature).await? {
            Some(mut existing) => {
                existing.record_occurrence();
                existing.auto_fixable |= auto_fixable;
                existing
            }
            None => {
                debug!(signature = %sig.signature, template = %sig.template, "new diagnostic pattern");
                let mut created = Pattern::new(sig.signature, sig.template, diagnostic.category);
                created.auto_fixable = auto_fixable;
                created
            }
        };

        self.store.save_pattern(&pattern).await?;
        diagnostic.pattern_id = Some(pattern.id);
        Ok(pattern)
    }

    /// Most frequent patterns first
    pub async fn top(&self, limit: usize) -> Result<Vec<Pattern>> {
        let mut patterns = self.store.list_patterns().await?;
        patterns.truncate(limit);
        Ok(patterns)
    }

    /// Frequency of the diagnostic's pattern (0 when never observed)
    pub async fn frequency_of(&self, diagnostic: &Diagnostic) -> Result<u64> {
        let sig = signature_for(&diagnostic.code, &diagnostic.message);
        Ok(self
            .store
            .find_pattern(&sig.signature)
            .await?
            .map(|p| p.frequency)
            .unwrap_or(0))
    }
}
