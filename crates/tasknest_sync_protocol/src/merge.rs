//! Per-entity-kind field merge.
//!
//! `merge_data` reconciles two conflicting entity payloads into one. The
//! rules are field-category based:
//!
//! - authoritative scalars (status, title, color): last writer wins by the
//!   payloads' `updated_at`
//! - numeric progress: maximum of both sides
//! - free text (description, notes): the longer string wins; this is a
//!   deliberate lossy heuristic that treats longer text as a superset of
//!   the shorter
//! - set-like tags: deduplicated union
//! - fixed time ranges (calendar start/end): any mismatch is a hard
//!   conflict, never silently merged
//!
//! Kinds without a specialized rule fall back to a generic whole-payload
//! merge where the newer `updated_at` wins.

use crate::types::EntityKind;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Result of merging two entity payloads.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Whether the merge produced a usable payload.
    pub success: bool,
    /// The merged payload, when successful.
    pub merged: Option<Value>,
    /// Hard field-level conflicts that prevented the merge.
    pub conflicts: Vec<String>,
    /// Notes about lossy choices the merge made.
    pub warnings: Vec<String>,
}

/// Merges two conflicting payloads for an entity of the given kind.
pub fn merge_data(local: &Value, remote: &Value, kind: EntityKind) -> MergeOutcome {
    let (Some(local_map), Some(remote_map)) = (local.as_object(), remote.as_object()) else {
        return generic_merge(local, remote, kind);
    };

    match kind {
        EntityKind::Action => {
            let mut ctx = FieldMerge::new(local_map, remote_map);
            ctx.scalar_lww("title");
            ctx.scalar_lww("status");
            ctx.progress_max("progress");
            ctx.longer_text("description");
            ctx.longer_text("notes");
            ctx.tags_union("tags");
            ctx.finish()
        }
        EntityKind::Project => {
            let mut ctx = FieldMerge::new(local_map, remote_map);
            // Project titles double as identifiers across UI references, so
            // a mismatch is never silently merged.
            ctx.require_equal("title", |l, r| {
                format!("conflicting titles: \"{l}\" vs \"{r}\"")
            });
            ctx.scalar_lww("status");
            ctx.scalar_lww("color");
            ctx.progress_max("progress");
            ctx.longer_text("description");
            ctx.longer_text("notes");
            ctx.tags_union("tags");
            ctx.finish()
        }
        EntityKind::Context => {
            let mut ctx = FieldMerge::new(local_map, remote_map);
            ctx.scalar_lww("title");
            ctx.scalar_lww("color");
            ctx.longer_text("description");
            ctx.finish()
        }
        EntityKind::CalendarItem => {
            let mut ctx = FieldMerge::new(local_map, remote_map);
            ctx.require_equal("start_time", |l, r| {
                format!("conflicting start_time: \"{l}\" vs \"{r}\"")
            });
            ctx.require_equal("end_time", |l, r| {
                format!("conflicting end_time: \"{l}\" vs \"{r}\"")
            });
            ctx.scalar_lww("title");
            ctx.scalar_lww("status");
            ctx.longer_text("description");
            ctx.longer_text("notes");
            ctx.tags_union("tags");
            ctx.finish()
        }
        EntityKind::InboxItem | EntityKind::WaitingItem => generic_merge(local, remote, kind),
    }
}

/// Whole-payload fallback: the side with the newer `updated_at` wins.
fn generic_merge(local: &Value, remote: &Value, kind: EntityKind) -> MergeOutcome {
    let merged = if remote_is_newer(local.as_object(), remote.as_object()) {
        remote.clone()
    } else {
        local.clone()
    };

    MergeOutcome {
        success: true,
        merged: Some(merged),
        conflicts: Vec::new(),
        warnings: vec![format!("generic merge strategy applied for {kind}")],
    }
}

fn parse_updated_at(map: Option<&Map<String, Value>>) -> Option<DateTime<Utc>> {
    map.and_then(|m| m.get("updated_at"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn remote_is_newer(local: Option<&Map<String, Value>>, remote: Option<&Map<String, Value>>) -> bool {
    match (parse_updated_at(local), parse_updated_at(remote)) {
        (Some(l), Some(r)) => r > l,
        (None, Some(_)) => true,
        _ => false,
    }
}

/// Field-by-field merge state over two payload maps.
struct FieldMerge<'a> {
    local: &'a Map<String, Value>,
    remote: &'a Map<String, Value>,
    merged: Map<String, Value>,
    remote_newer: bool,
    conflicts: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> FieldMerge<'a> {
    fn new(local: &'a Map<String, Value>, remote: &'a Map<String, Value>) -> Self {
        let remote_newer = remote_is_newer(Some(local), Some(remote));

        // Start from the local payload and fill in remote-only fields, so
        // no field is lost regardless of which rules run.
        let mut merged = local.clone();
        for (key, value) in remote {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Self {
            local,
            remote,
            merged,
            remote_newer,
            conflicts: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn both(&self, field: &str) -> Option<(&'a Value, &'a Value)> {
        Some((self.local.get(field)?, self.remote.get(field)?))
    }

    /// Last-writer-wins for an authoritative scalar field.
    fn scalar_lww(&mut self, field: &str) {
        let Some((local, remote)) = self.both(field) else {
            return;
        };
        if local == remote {
            return;
        }

        let (chosen, side) = if self.remote_newer {
            (remote.clone(), "remote")
        } else {
            (local.clone(), "local")
        };
        self.warnings
            .push(format!("kept {side} {field} (last writer wins)"));
        self.merged.insert(field.to_string(), chosen);
    }

    /// Hard conflict when both sides carry different values.
    fn require_equal(&mut self, field: &str, message: impl Fn(&str, &str) -> String) {
        let Some((local, remote)) = self.both(field) else {
            return;
        };
        if local != remote {
            self.conflicts
                .push(message(&display(local), &display(remote)));
        }
    }

    /// Maximum of both sides for a monotonic numeric field.
    fn progress_max(&mut self, field: &str) {
        let Some((local, remote)) = self.both(field) else {
            return;
        };
        let (Some(l), Some(r)) = (local.as_f64(), remote.as_f64()) else {
            return;
        };
        let chosen = if r > l { remote.clone() } else { local.clone() };
        self.merged.insert(field.to_string(), chosen);
    }

    /// Keeps the longer of two free-text fields; an empty side loses.
    fn longer_text(&mut self, field: &str) {
        let local = self.local.get(field).and_then(Value::as_str).unwrap_or("");
        let remote = self.remote.get(field).and_then(Value::as_str).unwrap_or("");

        let chosen = if local == remote {
            local
        } else if local.is_empty() {
            remote
        } else if remote.is_empty() {
            local
        } else if remote.chars().count() > local.chars().count() {
            remote
        } else {
            local
        };

        if !chosen.is_empty() {
            self.merged
                .insert(field.to_string(), Value::String(chosen.to_string()));
        }
    }

    /// Deduplicated union of two tag arrays; an empty union removes the
    /// field rather than leaving an empty set.
    fn tags_union(&mut self, field: &str) {
        let mut union: Vec<Value> = Vec::new();
        for side in [self.local.get(field), self.remote.get(field)] {
            if let Some(Value::Array(items)) = side {
                for item in items {
                    if !union.contains(item) {
                        union.push(item.clone());
                    }
                }
            }
        }

        if union.is_empty() {
            self.merged.remove(field);
        } else {
            self.merged.insert(field.to_string(), Value::Array(union));
        }
    }

    fn finish(mut self) -> MergeOutcome {
        if !self.conflicts.is_empty() {
            return MergeOutcome {
                success: false,
                merged: None,
                conflicts: self.conflicts,
                warnings: self.warnings,
            };
        }

        // The merged payload is at least as new as either side.
        if let (Some(l), Some(r)) = (
            parse_updated_at(Some(self.local)),
            parse_updated_at(Some(self.remote)),
        ) {
            let newest = l.max(r);
            self.merged
                .insert("updated_at".to_string(), Value::String(newest.to_rfc3339()));
        }

        MergeOutcome {
            success: true,
            merged: Some(Value::Object(self.merged)),
            conflicts: Vec::new(),
            warnings: self.warnings,
        }
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
