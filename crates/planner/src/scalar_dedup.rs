use std::collections::HashMap;

use flowq_common::{FlowqError, Result, SideInputId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logical_plan::LogicalPlan;
use crate::schema_resolver::RelationSchema;

/// One distinct scalar subtree of a compiled unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideInputEntry {
    pub id: SideInputId,
    /// Every alias that resolved to this subtree, in registration order.
    pub aliases: Vec<String>,
    /// Compiled, typed plan producing the scalar row.
    pub plan: LogicalPlan,
    pub schema: RelationSchema,
    pub fingerprint: String,
    /// Aliases whose expressions read this side input (fan-out).
    pub consumers: Vec<String>,
}

impl SideInputEntry {
    /// Alias used in logs and diagnostics.
    pub fn alias(&self) -> &str {
        self.aliases.first().map(String::as_str).unwrap_or("")
    }
}

/// Assigns one [`SideInputId`] per distinct scalar subtree within a unit.
///
/// Lookup goes by alias first, then by structural fingerprint of the compiled
/// subtree, so two aliases with identical definitions share a side input.
#[derive(Debug, Default)]
pub struct SideInputRegistry {
    entries: Vec<SideInputEntry>,
    by_alias: HashMap<String, SideInputId>,
    by_fingerprint: HashMap<String, SideInputId>,
}

impl SideInputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `alias` with its compiled subtree, returning the shared id.
    pub fn register(
        &mut self,
        alias: &str,
        plan: &LogicalPlan,
        schema: &RelationSchema,
    ) -> Result<SideInputId> {
        if let Some(id) = self.by_alias.get(alias) {
            return Ok(*id);
        }
        let fp = fingerprint(plan)?;
        if let Some(id) = self.by_fingerprint.get(&fp).copied() {
            debug!(alias, side_input = %id, "scalar subtree deduplicated by fingerprint");
            self.by_alias.insert(alias.to_string(), id);
            if let Some(entry) = self.entry_mut(id) {
                entry.aliases.push(alias.to_string());
            }
            return Ok(id);
        }
        let id = SideInputId(self.entries.len() as u32);
        debug!(alias, side_input = %id, "registered scalar side input");
        self.entries.push(SideInputEntry {
            id,
            aliases: vec![alias.to_string()],
            plan: plan.clone(),
            schema: schema.clone(),
            fingerprint: fp.clone(),
            consumers: Vec::new(),
        });
        self.by_alias.insert(alias.to_string(), id);
        self.by_fingerprint.insert(fp, id);
        Ok(id)
    }

    /// Record that `consumer` reads side input `id`.
    pub fn add_consumer(&mut self, id: SideInputId, consumer: &str) {
        if let Some(entry) = self.entry_mut(id) {
            if !entry.consumers.iter().any(|c| c == consumer) {
                entry.consumers.push(consumer.to_string());
            }
        }
    }

    fn entry_mut(&mut self, id: SideInputId) -> Option<&mut SideInputEntry> {
        self.entries.get_mut(id.0 as usize)
    }

    /// Entries in id order. Ids are handed out after a subtree's own
    /// dependencies were registered, so this is also a topological order.
    pub fn into_entries(self) -> Vec<SideInputEntry> {
        self.entries
    }
}

/// Canonical serialization of a compiled plan.
pub fn fingerprint(plan: &LogicalPlan) -> Result<String> {
    serde_json::to_string(plan)
        .map_err(|e| FlowqError::Planning(format!("failed to fingerprint scalar subtree: {e}")))
}
