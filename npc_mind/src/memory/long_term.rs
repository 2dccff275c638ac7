//! Long-term memory: signed sentences with a previous-sentence history.

use serde::{Deserialize, Serialize};
use term_logic::{Bindings, Ontology, Sentence, Term};

use super::Provenance;

/// A remembered sentence. History entries carry `time_end`, closing the
/// `[time, time_end)` range during which the belief held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceEntry {
    pub sentence: Sentence,
    pub provenance: Provenance,
    pub activation: i64,
    pub time: u64,
    pub time_end: Option<u64>,
}

/// The long-term store. Current entries are permanent until explicitly
/// contradicted or removed; superseded state sentences move into the
/// append-only previous-sentence history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LongTermMemory {
    sentences: Vec<SentenceEntry>,
    previous: Vec<SentenceEntry>,
}

impl LongTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SentenceEntry> {
        self.sentences.iter()
    }

    pub fn previous_iter(&self) -> impl Iterator<Item = &SentenceEntry> {
        self.previous.iter()
    }

    /// Add unconditionally (rules and the load path).
    pub fn add_sentence(
        &mut self,
        sentence: Sentence,
        provenance: Provenance,
        activation: i64,
        time: u64,
    ) {
        self.sentences.push(SentenceEntry {
            sentence,
            provenance,
            activation,
            time,
            time_end: None,
        });
    }

    /// Add straight into the previous-sentence history (the load path).
    pub fn add_previous_sentence(
        &mut self,
        sentence: Sentence,
        provenance: Provenance,
        activation: i64,
        time: u64,
        time_end: u64,
    ) {
        self.previous.push(SentenceEntry {
            sentence,
            provenance,
            activation,
            time,
            time_end: Some(time_end),
        });
    }

    /// Add unless a structurally equal sentence is present. Returns true iff
    /// the sentence is new.
    pub fn add_sentence_if_new(
        &mut self,
        sentence: Sentence,
        provenance: Provenance,
        activation: i64,
        time: u64,
    ) -> bool {
        if self
            .sentences
            .iter()
            .any(|e| e.sentence.structural_eq(&sentence))
        {
            return false;
        }
        self.add_sentence(sentence, provenance, activation, time);
        true
    }

    /// Idempotent state upsert: at most one current fact per (functor,
    /// subject). A superseded fact moves into the history with
    /// `time_end = now`. Returns true iff the sentence is new.
    pub fn add_state_sentence_if_new(
        &mut self,
        sentence: Sentence,
        provenance: Provenance,
        activation: i64,
        time: u64,
        now: u64,
    ) -> bool {
        let Some(term) = sentence.is_fact().then(|| &sentence.terms[0]) else {
            return self.add_sentence_if_new(sentence, provenance, activation, time);
        };
        if let Some(pos) = self.sentences.iter().position(|e| {
            e.sentence.is_fact()
                && e.sentence.terms[0].functor == term.functor
                && match (e.sentence.terms[0].attributes.first(), term.attributes.first()) {
                    (Some(a), Some(b)) => a.structural_eq(b),
                    (None, None) => true,
                    _ => false,
                }
        }) {
            if self.sentences[pos].sentence.structural_eq(&sentence) {
                return false;
            }
            let mut old = self.sentences.remove(pos);
            old.time_end = Some(now);
            self.previous.push(old);
        }
        self.add_sentence(sentence, provenance, activation, time);
        true
    }

    /// Index of the first current fact whose term unifies with the query.
    pub fn contains_unifying_term(&self, query: &Term, ont: &Ontology) -> Option<usize> {
        self.sentences.iter().position(|e| {
            e.sentence.is_fact() && {
                let mut b = Bindings::new();
                query.unify(&e.sentence.terms[0], ont, &mut b)
            }
        })
    }

    /// Remove the entry at `pos`, recording it in the history.
    pub fn remove(&mut self, pos: usize, now: u64) -> SentenceEntry {
        let mut old = self.sentences.remove(pos);
        old.time_end = Some(now);
        self.previous.push(old.clone());
        old
    }

    /// First current fact unifying with the query.
    pub fn first_match(&self, query: &Term, ont: &Ontology) -> Option<(&SentenceEntry, Bindings)> {
        for e in &self.sentences {
            if !e.sentence.is_fact() {
                continue;
            }
            let mut b = Bindings::new();
            if query.unify(&e.sentence.terms[0], ont, &mut b) {
                return Some((e, b));
            }
        }
        None
    }

    /// All current facts unifying with the query.
    pub fn all_matches(&self, query: &Term, ont: &Ontology) -> Vec<(&SentenceEntry, Bindings)> {
        let mut out = Vec::new();
        for e in &self.sentences {
            if !e.sentence.is_fact() {
                continue;
            }
            let mut b = Bindings::new();
            if query.unify(&e.sentence.terms[0], ont, &mut b) {
                out.push((e, b));
            }
        }
        out
    }

    /// Clauses of the current belief state (seeds "now" inferences).
    pub fn snapshot_now(&self) -> Vec<Sentence> {
        self.sentences.iter().map(|e| e.sentence.clone()).collect()
    }

    /// Clauses of the superseded history (seeds "past" inferences).
    pub fn snapshot_past(&self) -> Vec<Sentence> {
        self.previous.iter().map(|e| e.sentence.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use term_logic::Ontology;

    fn fact(src: &str, o: &mut Ontology) -> Sentence {
        Sentence::fact(Term::from_string(src, o).unwrap())
    }

    #[test]
    fn test_add_if_new_rejects_duplicates() {
        let mut o = Ontology::core();
        let mut ltm = LongTermMemory::new();
        let s = fact("space.at('bob'[#id], 'kitchen'[#id])", &mut o);
        assert!(ltm.add_sentence_if_new(s.clone(), Provenance::Perception, 1, 0));
        assert!(!ltm.add_sentence_if_new(s, Provenance::Perception, 1, 5));
        assert_eq!(ltm.len(), 1);
    }

    #[test]
    fn test_state_upsert_keeps_history() {
        let mut o = Ontology::core();
        let mut ltm = LongTermMemory::new();
        let at_kitchen = fact("space.at('bob'[#id], 'kitchen'[#id])", &mut o);
        let at_garden = fact("space.at('bob'[#id], 'garden'[#id])", &mut o);
        assert!(ltm.add_state_sentence_if_new(at_kitchen, Provenance::Perception, 1, 0, 0));
        // idempotent re-add
        let again = fact("space.at('bob'[#id], 'kitchen'[#id])", &mut o);
        assert!(!ltm.add_state_sentence_if_new(again, Provenance::Perception, 1, 3, 3));
        assert!(ltm.add_state_sentence_if_new(at_garden, Provenance::Perception, 1, 9, 9));
        assert_eq!(ltm.len(), 1);
        let prev: Vec<_> = ltm.previous_iter().collect();
        assert_eq!(prev.len(), 1);
        assert_eq!(prev[0].time, 0);
        assert_eq!(prev[0].time_end, Some(9));
        // the past snapshot answers "where did bob use to be"
        let q = Term::from_string("space.at('bob'[#id], X:[any])", &mut o).unwrap();
        let past = ltm.snapshot_past();
        let mut b = term_logic::Bindings::new();
        assert!(q.unify(&past[0].terms[0], &o, &mut b));
        assert_eq!(b.get_by_name("X").and_then(|v| v.as_constant()), Some("kitchen"));
    }

    #[test]
    fn test_remove_matching() {
        let mut o = Ontology::core();
        let mut ltm = LongTermMemory::new();
        ltm.add_sentence_if_new(
            fact("verb.own('bob'[#id], 'key'[#id])", &mut o),
            Provenance::Memorize,
            1,
            0,
        );
        let q = Term::from_string("verb.own('bob'[#id], [any])", &mut o).unwrap();
        let pos = ltm.contains_unifying_term(&q, &o).unwrap();
        ltm.remove(pos, 4);
        assert!(ltm.is_empty());
        assert_eq!(ltm.previous_iter().next().unwrap().time_end, Some(4));
    }

    #[test]
    fn test_non_fact_sentences_skipped_by_term_queries() {
        let mut o = Ontology::core();
        let mut ltm = LongTermMemory::new();
        let rule = Sentence::from_string(
            "~verb.own(X:[any], 'key'[#id]) || space.at(X, 'cell'[#id])",
            &mut o,
        )
        .unwrap();
        ltm.add_sentence(rule, Provenance::Background, 1, 0);
        let q = Term::from_string("space.at(Y:[any], 'cell'[#id])", &mut o).unwrap();
        assert!(ltm.first_match(&q, &o).is_none());
        assert_eq!(ltm.snapshot_now().len(), 1);
    }
}
