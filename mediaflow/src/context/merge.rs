//! Folding the contexts produced by one wave back into a single context.

use super::{ContextField, PipelineContext};
use std::collections::HashMap;
use tracing::warn;

/// Two wave members wrote different values to the same slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConflict {
    /// The field name, or `meta.<key>` for metadata entries.
    pub field: String,
    /// The stage whose value was overwritten.
    pub overwritten: String,
    /// The stage whose value was kept.
    pub kept: String,
}

/// Result of merging a wave.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The merged context.
    pub context: PipelineContext,
    /// Conflicting sibling writes, in the order they were resolved.
    pub conflicts: Vec<WriteConflict>,
}

/// Merges the per-stage results of one wave onto the pre-wave context.
///
/// A result contributes every field it changed relative to `base` and left
/// non-null; `meta` is merged key by key. Results are applied in iteration
/// order, so when two siblings write the same slot the later one wins and
/// the collision is reported in [`MergeOutcome::conflicts`].
pub fn merge_wave<I, S>(base: &PipelineContext, results: I) -> MergeOutcome
where
    I: IntoIterator<Item = (S, PipelineContext)>,
    S: AsRef<str>,
{
    let mut merged = base.clone();
    let mut writers: HashMap<String, String> = HashMap::new();
    let mut conflicts = Vec::new();

    for (stage, result) in results {
        let stage = stage.as_ref();

        for field in ContextField::ALL {
            if !result.is_present(field) || !result.differs(base, field) {
                continue;
            }
            let slot = field.as_str().to_string();
            if let Some(previous) = writers.get(&slot) {
                if merged.differs(&result, field) {
                    conflicts.push(record_conflict(&slot, previous, stage));
                }
            }
            merged.copy_field_from(&result, field);
            writers.insert(slot, stage.to_string());
        }

        for (key, value) in result.meta {
            if base.meta.get(&key) == Some(&value) {
                continue;
            }
            let slot = format!("meta.{key}");
            if let Some(previous) = writers.get(&slot) {
                if merged.meta.get(&key) != Some(&value) {
                    conflicts.push(record_conflict(&slot, previous, stage));
                }
            }
            merged.meta.insert(key, value);
            writers.insert(slot, stage.to_string());
        }
    }

    MergeOutcome {
        context: merged,
        conflicts,
    }
}

fn record_conflict(slot: &str, overwritten: &str, kept: &str) -> WriteConflict {
    warn!(
        field = %slot,
        overwritten = %overwritten,
        kept = %kept,
        "Concurrent stages wrote different values to the same field"
    );
    WriteConflict {
        field: slot.to_string(),
        overwritten: overwritten.to_string(),
        kept: kept.to_string(),
    }
}
