//! Interruptible resolution: a step-wise refutation proof search.
//!
//! The goal conjunction arrives negated as one or more clauses; the search
//! resolves goal clauses against the knowledge base one frontier entry per
//! step, so a scheduler can interleave many searches without stalling the
//! simulation. Deriving the empty clause yields an answer substitution.

use term_logic::{Bindings, Ontology, Sentence};

/// One suspended proof search. All of its state lives here - suspension is
/// explicit, not a coroutine.
#[derive(Debug)]
pub struct InterruptibleResolution {
    kb: Vec<Sentence>,
    frontier: Vec<(Sentence, Bindings, usize)>,
    results: Vec<Bindings>,
    next_var: u64,
    max_depth: usize,
    finished: bool,
}

impl InterruptibleResolution {
    /// Start a search refuting `targets` (already-negated goal clauses)
    /// against `kb`. The fresh-variable counter is owned by the process.
    pub fn new(kb: Vec<Sentence>, targets: &[Sentence], max_depth: usize) -> Self {
        let mut next_var = 0;
        for s in kb.iter().chain(targets.iter()) {
            for t in &s.terms {
                for v in t.variables() {
                    next_var = next_var.max(v + 1);
                }
            }
        }
        let frontier = targets
            .iter()
            .map(|t| (t.clone(), Bindings::new(), 0))
            .collect();
        Self {
            kb,
            frontier,
            results: Vec::new(),
            next_var,
            max_depth,
            finished: false,
        }
    }

    /// Whether the search has concluded (successfully or not).
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Answer substitutions found so far.
    pub fn results(&self) -> &[Bindings] {
        &self.results
    }

    /// Advance one step; stop at the first answer. Returns true when the
    /// search has concluded.
    pub fn step(&mut self, ont: &Ontology) -> bool {
        self.step_impl(ont, false)
    }

    /// Advance one step; keep searching past answers until the frontier is
    /// exhausted. Returns true when the search has concluded.
    pub fn step_accumulating_results(&mut self, ont: &Ontology) -> bool {
        self.step_impl(ont, true)
    }

    /// One step: resolve one frontier clause against the whole knowledge
    /// base. Failure to unify anywhere is ordinary control flow.
    fn step_impl(&mut self, ont: &Ontology, accumulate: bool) -> bool {
        if self.finished {
            return true;
        }
        if self.frontier.is_empty() {
            self.finished = true;
            return true;
        }
        let (clause, bindings, depth) = self.frontier.remove(0);
        if clause.is_empty() {
            self.results.push(bindings);
            if !accumulate {
                self.finished = true;
            }
            return self.finished;
        }

        let goal_term = &clause.terms[0];
        let goal_sign = clause.signs[0];
        for kb_clause_index in 0..self.kb.len() {
            let kb_clause = self.kb[kb_clause_index].renamed(&mut self.next_var);
            for j in 0..kb_clause.terms.len() {
                if kb_clause.signs[j] == goal_sign {
                    continue;
                }
                let mut b = bindings.clone();
                if !goal_term.unify(&kb_clause.terms[j], ont, &mut b) {
                    continue;
                }
                let mut terms = Vec::new();
                let mut signs = Vec::new();
                for k in 1..clause.terms.len() {
                    terms.push(clause.terms[k].clone());
                    signs.push(clause.signs[k]);
                }
                for (k, t) in kb_clause.terms.iter().enumerate() {
                    if k != j {
                        terms.push(t.clone());
                        signs.push(kb_clause.signs[k]);
                    }
                }
                if terms.is_empty() {
                    self.results.push(b);
                    if !accumulate {
                        self.finished = true;
                        return true;
                    }
                } else if depth + 1 <= self.max_depth {
                    self.frontier.push((Sentence::new(terms, signs), b, depth + 1));
                }
            }
        }

        if self.frontier.is_empty() {
            self.finished = true;
        }
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use term_logic::{Ontology, Term};

    fn fact(src: &str, o: &mut Ontology) -> Sentence {
        Sentence::fact(Term::from_string(src, o).unwrap())
    }

    /// Negated goal: prove `space.at('bob', X)`.
    fn goal(src: &str, o: &mut Ontology) -> Sentence {
        let t = Term::from_string(src, o).unwrap();
        Sentence::new(vec![t], vec![false])
    }

    #[test]
    fn test_single_fact_refutation() {
        let mut o = Ontology::core();
        let kb = vec![fact("space.at('bob'[#id], 'kitchen'[#id])", &mut o)];
        let g = goal("space.at('bob'[#id], X:[any])", &mut o);
        let mut r = InterruptibleResolution::new(kb, &[g], 8);
        let mut steps = 0;
        while !r.step(&o) {
            steps += 1;
            assert!(steps < 100, "did not terminate");
        }
        assert_eq!(r.results().len(), 1);
        assert_eq!(
            r.results()[0].get_by_name("X").and_then(|v| v.as_constant()),
            Some("kitchen")
        );
    }

    #[test]
    fn test_chained_rule() {
        let mut o = Ontology::core();
        // own(bob, key). at(X, cell) :- own(X, key).
        let kb = vec![
            fact("verb.own('bob'[#id], 'key'[#id])", &mut o),
            Sentence::from_string(
                "~verb.own(X:[any], 'key'[#id]) || space.at(X, 'cell'[#id])",
                &mut o,
            )
            .unwrap(),
        ];
        let g = goal("space.at('bob'[#id], W:[any])", &mut o);
        let mut r = InterruptibleResolution::new(kb, &[g], 8);
        while !r.step(&o) {}
        assert_eq!(r.results().len(), 1);
        let w = r.results()[0].get_by_name("W").unwrap();
        let applied = w.apply_bindings(&r.results()[0]);
        assert_eq!(applied.as_constant(), Some("cell"));
    }

    #[test]
    fn test_failure_is_ordinary() {
        let mut o = Ontology::core();
        let kb = vec![fact("space.at('bob'[#id], 'kitchen'[#id])", &mut o)];
        let g = goal("space.at('eva'[#id], X:[any])", &mut o);
        let mut r = InterruptibleResolution::new(kb, &[g], 8);
        assert!(r.step(&o));
        assert!(r.results().is_empty());
        assert!(r.finished());
    }

    #[test]
    fn test_accumulating_finds_all() {
        let mut o = Ontology::core();
        let kb = vec![
            fact("space.at('bob'[#id], 'kitchen'[#id])", &mut o),
            fact("space.at('eva'[#id], 'garden'[#id])", &mut o),
        ];
        let g = goal("space.at(W:[any], L:[any])", &mut o);
        let mut r = InterruptibleResolution::new(kb, &[g], 8);
        let mut steps = 0;
        while !r.step_accumulating_results(&o) {
            steps += 1;
            assert!(steps < 100, "did not terminate");
        }
        assert_eq!(r.results().len(), 2);
    }

    #[test]
    fn test_depth_bound_terminates() {
        let mut o = Ontology::core();
        // a cyclic rule set: p(X) :- p(X).
        let kb = vec![Sentence::from_string(
            "~verb.own(X:[any], 'key'[#id]) || verb.own(X, 'key'[#id])",
            &mut o,
        )
        .unwrap()];
        let g = goal("verb.own('bob'[#id], 'key'[#id])", &mut o);
        let mut r = InterruptibleResolution::new(kb, &[g], 4);
        let mut steps = 0;
        while !r.step(&o) {
            steps += 1;
            assert!(steps < 10_000, "depth bound did not terminate the search");
        }
        assert!(r.results().is_empty());
    }

    #[test]
    fn test_conjunctive_goal() {
        let mut o = Ontology::core();
        let kb = vec![
            fact("space.at('bob'[#id], 'kitchen'[#id])", &mut o),
            fact("verb.own('bob'[#id], 'key'[#id])", &mut o),
        ];
        // prove at(W, kitchen) AND own(W, key)
        let g = Sentence::from_string(
            "~space.at(W:[any], 'kitchen'[#id]) || ~verb.own(W, 'key'[#id])",
            &mut o,
        )
        .unwrap();
        let mut r = InterruptibleResolution::new(kb, &[g], 8);
        while !r.step(&o) {}
        assert_eq!(r.results().len(), 1);
        let w = r.results()[0].get_by_name("W").unwrap();
        let applied = w.apply_bindings(&r.results()[0]);
        assert_eq!(applied.as_constant(), Some("bob"));
    }
}
