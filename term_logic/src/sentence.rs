//! Sentences: signed disjunctive clauses over terms.
//!
//! `signs[i] == true` marks the positive literal. A fact is a single
//! positive literal; a resolution target arrives as one clause holding the
//! negated goal conjunction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ontology::Ontology;
use crate::parse::{assign_names, render_term, ParseError, TermParser};
use crate::term::Term;

/// A disjunction of signed literals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub terms: Vec<Term>,
    pub signs: Vec<bool>,
}

impl Sentence {
    pub fn new(terms: Vec<Term>, signs: Vec<bool>) -> Self {
        debug_assert_eq!(terms.len(), signs.len());
        Self { terms, signs }
    }

    /// A single positive literal.
    pub fn fact(term: Term) -> Self {
        Self {
            terms: vec![term],
            signs: vec![true],
        }
    }

    /// True iff the sentence is a single positive literal.
    pub fn is_fact(&self) -> bool {
        self.terms.len() == 1 && self.signs[0]
    }

    /// The empty clause (a derived contradiction).
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Structural equality literal by literal (no bindings generated).
    pub fn structural_eq(&self, other: &Sentence) -> bool {
        self.terms.len() == other.terms.len()
            && self.signs == other.signs
            && self
                .terms
                .iter()
                .zip(other.terms.iter())
                .all(|(a, b)| a.structural_eq(b))
    }

    /// Copy with variables standardized apart using the caller's counter.
    /// The renaming map is shared across literals.
    pub fn renamed(&self, next: &mut u64) -> Sentence {
        let mut map = HashMap::new();
        Sentence {
            terms: self
                .terms
                .iter()
                .map(|t| t.renamed_with(&mut map, next))
                .collect(),
            signs: self.signs.clone(),
        }
    }

    /// Parse from the wire syntax (literals joined by `||`, `~` negation),
    /// in a fresh variable scope.
    pub fn from_string(input: &str, ont: &mut Ontology) -> Result<Sentence, ParseError> {
        TermParser::new().parse_sentence(input, ont)
    }

    /// Render to the wire syntax. Variables shared between literals keep a
    /// common name so the output round-trips.
    pub fn render(&self, ont: &Ontology) -> String {
        let refs: Vec<&Term> = self.terms.iter().collect();
        let names = assign_names(&refs);
        self.terms
            .iter()
            .zip(self.signs.iter())
            .map(|(t, sign)| {
                let body = render_term(t, ont, &names);
                if *sign {
                    body
                } else {
                    format!("~{body}")
                }
            })
            .collect::<Vec<_>>()
            .join(" || ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact() {
        let mut o = Ontology::core();
        let t = Term::from_string("space.at('bob'[#id], 'kitchen'[#id])", &mut o).unwrap();
        let s = Sentence::fact(t);
        assert!(s.is_fact());
        assert!(!s.is_empty());
    }

    #[test]
    fn test_parse_negated_clause() {
        let mut o = Ontology::core();
        let s = Sentence::from_string(
            "~verb.own(X:[any], 'key'[#id]) || space.at(X, 'cell'[#id])",
            &mut o,
        )
        .unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.signs, vec![false, true]);
        // the clause shares X between its literals
        assert_eq!(s.terms[0].variables(), s.terms[1].variables());
    }

    #[test]
    fn test_render_round_trip_shared_variables() {
        let mut o = Ontology::core();
        let s = Sentence::from_string(
            "~verb.own(X:[any], 'key'[#id]) || space.at(X, 'cell'[#id])",
            &mut o,
        )
        .unwrap();
        let rendered = s.render(&o);
        let s2 = Sentence::from_string(&rendered, &mut o).unwrap();
        assert!(s.structural_eq(&s2), "{rendered}");
    }

    #[test]
    fn test_empty_sentence_round_trip() {
        let mut o = Ontology::core();
        let s = Sentence::from_string("", &mut o).unwrap();
        assert!(s.is_empty());
        assert_eq!(s.render(&o), "");
    }

    #[test]
    fn test_renamed_shares_map_across_literals() {
        let mut o = Ontology::core();
        let s = Sentence::from_string(
            "~verb.own(X:[any], 'key'[#id]) || space.at(X, 'cell'[#id])",
            &mut o,
        )
        .unwrap();
        let mut next = 50;
        let r = s.renamed(&mut next);
        assert_eq!(r.terms[0].variables(), r.terms[1].variables());
        assert_eq!(r.terms[0].variables(), vec![50]);
    }
}
