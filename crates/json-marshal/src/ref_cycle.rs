//! Reference session: the scratch state behind `$id` / `$ref` handling.
//!
//! One session serves both directions. On serialize it maps node identity
//! to an assigned id so revisits emit reference tokens instead of recursing.
//! On deserialize it maps ids to resolved instances and queues deferred
//! patches for forward references, applied in a finalize pass once the
//! top-level walk completes.
//!
//! The session is never cleared implicitly: callers own [`RefSession::clear`]
//! (via the engine facade) and stale entries deliberately survive between
//! calls until then.

use std::collections::HashMap;

use crate::instance::{ArrayRef, Instance, MapRef, ObjRef, SetRef};
use crate::types::MarshalError;

/// Where a `$ref` placeholder was written, awaiting its `$id` target.
#[derive(Clone)]
pub enum PatchSite {
    Prop(ObjRef, String),
    Index(ArrayRef, usize),
    SetSlot(SetRef, usize),
    MapValue(MapRef, usize),
}

#[derive(Default)]
pub struct RefSession {
    next_id: u64,
    assigned: HashMap<usize, String>,
    resolved: HashMap<String, Instance>,
    pending: Vec<(PatchSite, String)>,
}

impl RefSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all session state: assigned ids, resolved instances, and any
    /// deferred patches not yet applied.
    pub fn clear(&mut self) {
        self.next_id = 0;
        self.assigned.clear();
        self.resolved.clear();
        self.pending.clear();
    }

    // ── serialize side ───────────────────────────────────────────────────

    /// Id previously assigned to a node identity, if any. A hit means the
    /// caller emits a reference token instead of recursing again.
    pub(crate) fn id_for(&self, identity: usize) -> Option<&str> {
        self.assigned.get(&identity).map(String::as_str)
    }

    /// Assign the next id ("1", "2", …) to a node identity.
    pub(crate) fn assign(&mut self, identity: usize) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        self.assigned.insert(identity, id.clone());
        id
    }

    // ── deserialize side ─────────────────────────────────────────────────

    /// Record an id as resolved to an instance. Must happen before the
    /// node's children are walked so self-references land on the same
    /// identity.
    pub(crate) fn resolve(&mut self, id: &str, instance: Instance) {
        self.resolved.insert(id.to_string(), instance);
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<Instance> {
        self.resolved.get(id).cloned()
    }

    /// Queue a placeholder rewrite for an id not resolved yet.
    pub(crate) fn defer(&mut self, site: PatchSite, id: &str) {
        self.pending.push((site, id.to_string()));
    }

    /// Apply every deferred patch. Ids still unresolved at this point are
    /// an error: the `$ref` had no matching `$id` anywhere in the walk.
    pub(crate) fn finalize(&mut self) -> Result<(), MarshalError> {
        for (site, id) in self.pending.drain(..) {
            let target = self
                .resolved
                .get(&id)
                .cloned()
                .ok_or_else(|| MarshalError::UnresolvedRef(id.clone()))?;
            match site {
                PatchSite::Prop(obj, name) => {
                    obj.borrow_mut().props.insert(name, target);
                }
                PatchSite::Index(arr, i) => {
                    arr.borrow_mut()[i] = target;
                }
                PatchSite::SetSlot(set, i) => {
                    set.borrow_mut()[i] = target;
                }
                PatchSite::MapValue(map, i) => {
                    map.borrow_mut()[i].1 = target;
                }
            }
        }
        Ok(())
    }
}
