//! Sort lattice - the subsumption (is-a) hierarchy of functors and types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for sorts, valid within one [`Ontology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortId(pub usize);

impl std::fmt::Display for SortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sort#{}", self.0)
    }
}

/// A sort: a symbolic predicate/type label with zero or more parents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sort {
    pub name: String,
    pub parents: Vec<SortId>,
}

/// The sort lattice. Sorts are interned by name; the ID counter is owned by
/// the instance, so two ontologies never share ambient state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ontology {
    sorts: Vec<Sort>,
    by_name: HashMap<String, SortId>,
}

impl Ontology {
    /// Create an empty ontology containing only the root sort `any`.
    pub fn new() -> Self {
        let mut o = Self {
            sorts: Vec::new(),
            by_name: HashMap::new(),
        };
        o.sort("any", &[]);
        o
    }

    /// Register a sort under the given parents, or return the existing one.
    ///
    /// Re-registering an existing sort with new parents extends its parent
    /// list (vocabularies are open; hosts refine the lattice over time).
    pub fn sort(&mut self, name: &str, parents: &[SortId]) -> SortId {
        if let Some(&id) = self.by_name.get(name) {
            for p in parents {
                if !self.sorts[id.0].parents.contains(p) {
                    self.sorts[id.0].parents.push(*p);
                }
            }
            return id;
        }
        let id = SortId(self.sorts.len());
        self.sorts.push(Sort {
            name: name.to_string(),
            parents: parents.to_vec(),
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Register a sort with a single parent looked up by name.
    pub fn sort_under(&mut self, name: &str, parent: &str) -> SortId {
        let p = self.get_or_insert(parent);
        self.sort(name, &[p])
    }

    /// Look up a sort by name.
    pub fn get_sort(&self, name: &str) -> Option<SortId> {
        self.by_name.get(name).copied()
    }

    /// Look up a sort by name, registering it under `any` if unknown.
    pub fn get_or_insert(&mut self, name: &str) -> SortId {
        if let Some(id) = self.get_sort(name) {
            return id;
        }
        let any = self.sort("any", &[]);
        self.sort(name, &[any])
    }

    /// The name of a sort.
    pub fn name_of(&self, id: SortId) -> &str {
        &self.sorts[id.0].name
    }

    /// True iff `a` is-a `b`: `a == b` or `b` is reachable through parents.
    pub fn is_a(&self, a: SortId, b: SortId) -> bool {
        if a == b {
            return true;
        }
        let mut stack = self.sorts[a.0].parents.clone();
        while let Some(p) = stack.pop() {
            if p == b {
                return true;
            }
            stack.extend(self.sorts[p.0].parents.iter().copied());
        }
        false
    }

    /// True iff `a` subsumes `b` (the inverse of [`Ontology::is_a`]).
    pub fn subsumes(&self, a: SortId, b: SortId) -> bool {
        self.is_a(b, a)
    }

    /// Ancestors of a sort, nearest first, excluding the sort itself.
    pub fn ancestors(&self, id: SortId) -> Vec<SortId> {
        let mut out = Vec::new();
        let mut stack = self.sorts[id.0].parents.clone();
        while let Some(p) = stack.pop() {
            if !out.contains(&p) {
                out.push(p);
                stack.extend(self.sorts[p.0].parents.iter().copied());
            }
        }
        out
    }

    /// Number of registered sorts.
    pub fn len(&self) -> usize {
        self.sorts.len()
    }

    /// True if the ontology holds no sorts (never the case after `new`).
    pub fn is_empty(&self) -> bool {
        self.sorts.is_empty()
    }

    /// An ontology seeded with every sort the cognitive core dereferences.
    ///
    /// Host games extend this with their own vocabulary via [`Ontology::sort`].
    pub fn core() -> Self {
        let mut o = Self::new();
        let any = o.sort("any", &[]);

        for name in [
            "#id", "symbol", "number", "etcetera", "sentence", "singular",
            "#and", "#not", "#query", "unknown",
        ] {
            o.sort(name, &[any]);
        }
        let state = o.sort("#stateSort", &[any]);

        // time
        let time = o.sort("time", &[any]);
        for name in ["time.now", "time.past", "time.current", "time.year"] {
            o.sort(name, &[time]);
        }

        // space and properties
        o.sort("space.at", &[state]);
        let property = o.sort("property", &[any]);
        o.sort("property.born", &[property]);
        o.sort("property.age", &[property, state]);

        // verbs the reaction engine inspects
        let verb = o.sort("verb", &[any]);
        for name in [
            "verb.remember", "verb.know", "verb.see", "verb.can",
            "verb.understand", "verb.parse", "verb.disambiguate",
        ] {
            o.sort(name, &[verb]);
        }
        o.sort("proper-noun", &[any]);
        o.sort("the", &[any]);

        // actions
        let action = o.sort("action", &[any]);
        o.sort("action.talk", &[action]);
        o.sort("action.memorize", &[action]);
        let answer = o.sort("action.answer", &[action]);
        for name in [
            "action.answer.predicate", "action.answer.predicate-negated",
            "action.answer.whereis", "action.answer.whereto",
            "action.answer.whois.name", "action.answer.whois.noname",
            "action.answer.whatis.name", "action.answer.whatis.noname",
            "action.answer.query", "action.answer.query-followup",
            "action.answer.howmany", "action.answer.when",
            "action.answer.why", "action.answer.how",
        ] {
            o.sort(name, &[answer]);
        }
        o.sort("intention", &[any]);

        // performatives
        let perf = o.sort("performative", &[any]);
        for name in [
            "perf.greet", "perf.farewell", "perf.thankyou",
            "perf.youarewelcome", "perf.callattention", "perf.moreresults",
            "perf.request.action",
        ] {
            o.sort(name, &[perf]);
        }
        let ack = o.sort("perf.ack", &[perf]);
        for name in [
            "perf.ack.ok", "perf.ack.contradict", "perf.ack.denyrequest",
            "perf.ack.invalidanswer",
        ] {
            o.sort(name, &[ack]);
        }
        let inform = o.sort("perf.inform", &[perf]);
        o.sort("perf.inform.answer", &[inform]);
        o.sort("perf.inform.parseerror", &[inform]);
        let question = o.sort("perf.question", &[perf]);
        for name in [
            "perf.q.predicate", "perf.q.predicate-negated", "perf.q.whereis",
            "perf.q.whereto", "perf.q.whois.name", "perf.q.whois.noname",
            "perf.q.whatis.name", "perf.q.whatis.noname", "perf.q.query",
            "perf.q.query-followup", "perf.q.howmany", "perf.q.when",
            "perf.q.why", "perf.q.how", "perf.q.howareyou", "perf.q.action",
        ] {
            o.sort(name, &[question]);
        }

        o
    }
}
