//! Short-term memory: perceived terms with decaying activation.

use serde::{Deserialize, Serialize};
use term_logic::{Bindings, Ontology, Term};

use super::Provenance;

/// A remembered term with its activation (remaining lifetime in ticks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: Term,
    pub provenance: Provenance,
    pub activation: i64,
    pub time: u64,
}

/// The short-term store. Entries decay once per tick and expire silently;
/// superseded state terms are kept in a previous-terms list for persistence
/// and temporal queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortTermMemory {
    entries: Vec<TermEntry>,
    previous: Vec<TermEntry>,
}

impl ShortTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermEntry> {
        self.entries.iter()
    }

    pub fn previous_iter(&self) -> impl Iterator<Item = &TermEntry> {
        self.previous.iter()
    }

    /// Insert without any duplicate check (load path).
    pub fn add_entry(&mut self, entry: TermEntry) {
        self.entries.push(entry);
    }

    /// Insert into the previous-terms list (load path).
    pub fn add_previous_entry(&mut self, entry: TermEntry) {
        self.previous.push(entry);
    }

    /// Add a term unless a structurally equal one is present. A duplicate
    /// refreshes the existing entry's activation instead. Returns true iff
    /// the term is new.
    pub fn add_term_if_new(
        &mut self,
        term: Term,
        provenance: Provenance,
        activation: i64,
        time: u64,
    ) -> bool {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.term.structural_eq(&term))
        {
            existing.activation = existing.activation.max(activation);
            return false;
        }
        self.entries.push(TermEntry {
            term,
            provenance,
            activation,
            time,
        });
        true
    }

    /// Add a state term: at most one entry per (functor, subject) is kept,
    /// the superseded one moving to the previous-terms list. Returns true
    /// iff the term is new (not a structural duplicate).
    pub fn add_state_term_if_new(
        &mut self,
        term: Term,
        provenance: Provenance,
        activation: i64,
        time: u64,
    ) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| {
            e.term.functor == term.functor
                && match (e.term.attributes.first(), term.attributes.first()) {
                    (Some(a), Some(b)) => a.structural_eq(b),
                    (None, None) => true,
                    _ => false,
                }
        }) {
            if self.entries[pos].term.structural_eq(&term) {
                self.entries[pos].activation = self.entries[pos].activation.max(activation);
                return false;
            }
            let old = self.entries.remove(pos);
            self.previous.push(old);
        }
        self.entries.push(TermEntry {
            term,
            provenance,
            activation,
            time,
        });
        true
    }

    /// Tick decay: every activation drops by one; expired entries are
    /// removed silently.
    pub fn activation_update(&mut self) {
        for e in &mut self.entries {
            e.activation -= 1;
        }
        self.entries.retain(|e| e.activation > 0);
    }

    /// First entry unifying with the query, with the generated bindings.
    pub fn first_match(&self, query: &Term, ont: &Ontology) -> Option<(&TermEntry, Bindings)> {
        for e in &self.entries {
            let mut b = Bindings::new();
            if query.unify(&e.term, ont, &mut b) {
                return Some((e, b));
            }
        }
        None
    }

    /// All entries unifying with the query.
    pub fn all_matches(&self, query: &Term, ont: &Ontology) -> Vec<(&TermEntry, Bindings)> {
        let mut out = Vec::new();
        for e in &self.entries {
            let mut b = Bindings::new();
            if query.unify(&e.term, ont, &mut b) {
                out.push((e, b));
            }
        }
        out
    }
}
