//! Term representation and unification.
//!
//! A term is a functor (a [`SortId`] in the lattice) applied to a list of
//! attributes: constants, variables, or nested subterms. Unification is
//! sort-aware: functors and constant sorts match under subsumption, and a
//! variable only binds values whose sort is compatible with its own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ontology::{Ontology, SortId};

/// One attribute of a term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TermAttribute {
    /// A constant value with a sort, e.g. `'bob'[#id]`.
    Constant { value: String, sort: SortId },
    /// A variable, optionally named, constrained to a sort.
    Variable {
        id: u64,
        name: Option<String>,
        sort: SortId,
    },
    /// A nested term.
    Subterm(Term),
}

/// A functor applied to attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub functor: SortId,
    pub attributes: Vec<TermAttribute>,
}

/// A substitution: variable id -> attribute, remembering variable names so
/// callers can extract named answer variables.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(u64, Option<String>, TermAttribute)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The value bound to a variable id, if any.
    pub fn get(&self, id: u64) -> Option<&TermAttribute> {
        self.entries
            .iter()
            .find(|(eid, _, _)| *eid == id)
            .map(|(_, _, v)| v)
    }

    /// The value bound to a variable name, if any.
    pub fn get_by_name(&self, name: &str) -> Option<&TermAttribute> {
        self.entries
            .iter()
            .find(|(_, n, _)| n.as_deref() == Some(name))
            .map(|(_, _, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, Option<&str>, &TermAttribute)> {
        self.entries.iter().map(|(id, n, v)| (*id, n.as_deref(), v))
    }

    fn bind(&mut self, id: u64, name: Option<String>, value: TermAttribute) {
        self.entries.push((id, name, value));
    }

    fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

/// Follow variable bindings until an unbound variable or a non-variable.
fn resolve<'a>(mut attr: &'a TermAttribute, bindings: &'a Bindings) -> &'a TermAttribute {
    while let TermAttribute::Variable { id, .. } = attr {
        match bindings.get(*id) {
            Some(v) => attr = v,
            None => break,
        }
    }
    attr
}

/// Occurs check: does the variable appear inside the (resolved) attribute?
fn occurs(var_id: u64, attr: &TermAttribute, bindings: &Bindings) -> bool {
    match resolve(attr, bindings) {
        TermAttribute::Variable { id, .. } => *id == var_id,
        TermAttribute::Constant { .. } => false,
        TermAttribute::Subterm(t) => t
            .attributes
            .iter()
            .any(|a| occurs(var_id, a, bindings)),
    }
}

fn sorts_compatible(ont: &Ontology, a: SortId, b: SortId) -> bool {
    ont.is_a(a, b) || ont.is_a(b, a)
}

fn sort_of(attr: &TermAttribute) -> SortId {
    match attr {
        TermAttribute::Constant { sort, .. } => *sort,
        TermAttribute::Variable { sort, .. } => *sort,
        TermAttribute::Subterm(t) => t.functor,
    }
}

/// Core unification over attributes. With `one_way`, only variables from the
/// left side may bind (subsumption check).
fn unify_inner(
    a: &TermAttribute,
    b: &TermAttribute,
    ont: &Ontology,
    bindings: &mut Bindings,
    one_way: bool,
) -> bool {
    let ra = resolve(a, bindings).clone();
    let rb = resolve(b, bindings).clone();

    if let (
        TermAttribute::Variable { id: ia, .. },
        TermAttribute::Variable { id: ib, .. },
    ) = (&ra, &rb)
    {
        if ia == ib {
            return true;
        }
    }

    match (&ra, &rb) {
        (TermAttribute::Variable { id, name, sort }, _) => {
            if !sorts_compatible(ont, sort_of(&rb), *sort) {
                return false;
            }
            if occurs(*id, &rb, bindings) {
                return false;
            }
            bindings.bind(*id, name.clone(), rb.clone());
            true
        }
        (_, TermAttribute::Variable { id, name, sort }) => {
            if one_way {
                return false;
            }
            if !sorts_compatible(ont, sort_of(&ra), *sort) {
                return false;
            }
            if occurs(*id, &ra, bindings) {
                return false;
            }
            bindings.bind(*id, name.clone(), ra.clone());
            true
        }
        (
            TermAttribute::Constant { value: va, sort: sa },
            TermAttribute::Constant { value: vb, sort: sb },
        ) => va == vb && sorts_compatible(ont, *sa, *sb),
        (TermAttribute::Subterm(ta), TermAttribute::Subterm(tb)) => {
            unify_terms(ta, tb, ont, bindings, one_way)
        }
        _ => false,
    }
}

fn unify_terms(
    a: &Term,
    b: &Term,
    ont: &Ontology,
    bindings: &mut Bindings,
    one_way: bool,
) -> bool {
    let functor_ok = if one_way {
        ont.is_a(b.functor, a.functor)
    } else {
        sorts_compatible(ont, a.functor, b.functor)
    };
    if !functor_ok || a.attributes.len() != b.attributes.len() {
        return false;
    }
    a.attributes
        .iter()
        .zip(b.attributes.iter())
        .all(|(x, y)| unify_inner(x, y, ont, bindings, one_way))
}

impl TermAttribute {
    /// Fresh unnamed variable.
    pub fn variable(id: u64, sort: SortId) -> Self {
        TermAttribute::Variable {
            id,
            name: None,
            sort,
        }
    }

    /// Constant helper.
    pub fn constant(value: impl Into<String>, sort: SortId) -> Self {
        TermAttribute::Constant {
            value: value.into(),
            sort,
        }
    }

    /// Unify two attributes, extending `bindings` on success. Partial
    /// bindings are rolled back on failure.
    pub fn unify(
        a: &TermAttribute,
        b: &TermAttribute,
        ont: &Ontology,
        bindings: &mut Bindings,
    ) -> bool {
        let mark = bindings.len();
        if unify_inner(a, b, ont, bindings, false) {
            true
        } else {
            bindings.truncate(mark);
            false
        }
    }

    /// Substitute bound variables, producing a new attribute.
    pub fn apply_bindings(&self, bindings: &Bindings) -> TermAttribute {
        match self {
            TermAttribute::Variable { id, .. } => match bindings.get(*id) {
                Some(v) => v.clone().apply_bindings(bindings),
                None => self.clone(),
            },
            TermAttribute::Subterm(t) => TermAttribute::Subterm(t.apply_bindings(bindings)),
            c => c.clone(),
        }
    }

    /// The constant value, if this attribute is a constant.
    pub fn as_constant(&self) -> Option<&str> {
        match self {
            TermAttribute::Constant { value, .. } => Some(value.as_str()),
            _ => None,
        }
    }

    /// The nested term, if this attribute is a subterm.
    pub fn as_subterm(&self) -> Option<&Term> {
        match self {
            TermAttribute::Subterm(t) => Some(t),
            _ => None,
        }
    }

    /// Structural equality on a single attribute (variables correspond
    /// one-to-one, no bindings generated).
    pub fn structural_eq(&self, other: &TermAttribute) -> bool {
        let mut fwd = HashMap::new();
        let mut rev = HashMap::new();
        eq_attrs(self, other, &mut fwd, &mut rev)
    }

    fn renamed_with(&self, map: &mut HashMap<u64, u64>, next: &mut u64) -> TermAttribute {
        match self {
            TermAttribute::Variable { id, name, sort } => {
                let new_id = *map.entry(*id).or_insert_with(|| {
                    let v = *next;
                    *next += 1;
                    v
                });
                TermAttribute::Variable {
                    id: new_id,
                    name: name.clone(),
                    sort: *sort,
                }
            }
            TermAttribute::Subterm(t) => TermAttribute::Subterm(t.renamed_with(map, next)),
            c => c.clone(),
        }
    }

    fn collect_variables(&self, out: &mut Vec<u64>) {
        match self {
            TermAttribute::Variable { id, .. } => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            TermAttribute::Subterm(t) => {
                for a in &t.attributes {
                    a.collect_variables(out);
                }
            }
            TermAttribute::Constant { .. } => {}
        }
    }
}

impl Term {
    /// A term with no attributes.
    pub fn atom(functor: SortId) -> Self {
        Self {
            functor,
            attributes: Vec::new(),
        }
    }

    pub fn new(functor: SortId, attributes: Vec<TermAttribute>) -> Self {
        Self {
            functor,
            attributes,
        }
    }

    /// Unify with another term (two-way). Bindings roll back on failure.
    pub fn unify(&self, other: &Term, ont: &Ontology, bindings: &mut Bindings) -> bool {
        let mark = bindings.len();
        if unify_terms(self, other, ont, bindings, false) {
            true
        } else {
            bindings.truncate(mark);
            false
        }
    }

    /// One-way match: only this term's variables may bind.
    pub fn subsumes(&self, other: &Term, ont: &Ontology, bindings: &mut Bindings) -> bool {
        let mark = bindings.len();
        if unify_terms(self, other, ont, bindings, true) {
            true
        } else {
            bindings.truncate(mark);
            false
        }
    }

    /// Substitute bound variables, producing a new term.
    pub fn apply_bindings(&self, bindings: &Bindings) -> Term {
        Term {
            functor: self.functor,
            attributes: self
                .attributes
                .iter()
                .map(|a| a.apply_bindings(bindings))
                .collect(),
        }
    }

    /// Structural equality: no bindings are generated, variables must
    /// correspond one-to-one. This is the duplicate test belief memory uses.
    pub fn structural_eq(&self, other: &Term) -> bool {
        let mut fwd = HashMap::new();
        let mut rev = HashMap::new();
        eq_terms(self, other, &mut fwd, &mut rev)
    }

    /// Ids of all distinct variables in the term.
    pub fn variables(&self) -> Vec<u64> {
        let mut out = Vec::new();
        for a in &self.attributes {
            a.collect_variables(&mut out);
        }
        out
    }

    pub fn has_variables(&self) -> bool {
        !self.variables().is_empty()
    }

    /// Copy with variables standardized apart using the caller's counter.
    pub fn renamed(&self, next: &mut u64) -> Term {
        let mut map = HashMap::new();
        self.renamed_with(&mut map, next)
    }

    pub(crate) fn renamed_with(&self, map: &mut HashMap<u64, u64>, next: &mut u64) -> Term {
        Term {
            functor: self.functor,
            attributes: self
                .attributes
                .iter()
                .map(|a| a.renamed_with(map, next))
                .collect(),
        }
    }

    /// Flatten a right-nested `#and` list into its member attributes.
    /// A non-list term is returned as a single-element list.
    pub fn conjunct_attributes(&self, ont: &Ontology) -> Vec<TermAttribute> {
        let and = ont.get_sort("#and");
        if Some(self.functor) != and {
            return vec![TermAttribute::Subterm(self.clone())];
        }
        let mut out = Vec::new();
        self.flatten_and(and, &mut out);
        out
    }

    /// Flatten a right-nested `#and` list into its member terms, skipping
    /// non-term elements.
    pub fn conjunct_terms(&self, ont: &Ontology) -> Vec<Term> {
        self.conjunct_attributes(ont)
            .into_iter()
            .filter_map(|a| match a {
                TermAttribute::Subterm(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn flatten_and(&self, and: Option<SortId>, out: &mut Vec<TermAttribute>) {
        for a in &self.attributes {
            if let TermAttribute::Subterm(t) = a {
                if Some(t.functor) == and {
                    t.flatten_and(and, out);
                    continue;
                }
            }
            out.push(a.clone());
        }
    }
}

fn eq_attrs(
    a: &TermAttribute,
    b: &TermAttribute,
    fwd: &mut HashMap<u64, u64>,
    rev: &mut HashMap<u64, u64>,
) -> bool {
    match (a, b) {
        (
            TermAttribute::Constant { value: va, sort: sa },
            TermAttribute::Constant { value: vb, sort: sb },
        ) => va == vb && sa == sb,
        (
            TermAttribute::Variable { id: ia, sort: sa, .. },
            TermAttribute::Variable { id: ib, sort: sb, .. },
        ) => {
            if sa != sb {
                return false;
            }
            let f = *fwd.entry(*ia).or_insert(*ib);
            let r = *rev.entry(*ib).or_insert(*ia);
            f == *ib && r == *ia
        }
        (TermAttribute::Subterm(ta), TermAttribute::Subterm(tb)) => eq_terms(ta, tb, fwd, rev),
        _ => false,
    }
}

fn eq_terms(
    a: &Term,
    b: &Term,
    fwd: &mut HashMap<u64, u64>,
    rev: &mut HashMap<u64, u64>,
) -> bool {
    a.functor == b.functor
        && a.attributes.len() == b.attributes.len()
        && a.attributes
            .iter()
            .zip(b.attributes.iter())
            .all(|(x, y)| eq_attrs(x, y, fwd, rev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Ontology;

    fn setup() -> (Ontology, SortId, SortId) {
        let o = Ontology::core();
        let id = o.get_sort("#id").unwrap();
        let at = o.get_sort("space.at").unwrap();
        (o, id, at)
    }

    #[test]
    fn test_unify_constant_against_variable() {
        let (o, id, at) = setup();
        let fact = Term::new(
            at,
            vec![
                TermAttribute::constant("bob", id),
                TermAttribute::constant("kitchen", id),
            ],
        );
        let query = Term::new(
            at,
            vec![
                TermAttribute::constant("bob", id),
                TermAttribute::variable(0, o.get_sort("any").unwrap()),
            ],
        );
        let mut b = Bindings::new();
        assert!(query.unify(&fact, &o, &mut b));
        assert_eq!(b.get(0).and_then(|v| v.as_constant()), Some("kitchen"));
    }

    #[test]
    fn test_unify_mismatched_constant_rolls_back() {
        let (o, id, at) = setup();
        let fact = Term::new(
            at,
            vec![
                TermAttribute::constant("bob", id),
                TermAttribute::constant("kitchen", id),
            ],
        );
        let query = Term::new(
            at,
            vec![
                TermAttribute::variable(0, o.get_sort("any").unwrap()),
                TermAttribute::constant("garden", id),
            ],
        );
        let mut b = Bindings::new();
        assert!(!query.unify(&fact, &o, &mut b));
        assert!(b.is_empty());
    }

    #[test]
    fn test_subsumes_is_one_way() {
        let (o, id, at) = setup();
        let any = o.get_sort("any").unwrap();
        let pattern = Term::new(
            at,
            vec![
                TermAttribute::variable(0, any),
                TermAttribute::constant("kitchen", id),
            ],
        );
        let instance = Term::new(
            at,
            vec![
                TermAttribute::constant("bob", id),
                TermAttribute::constant("kitchen", id),
            ],
        );
        let mut b = Bindings::new();
        assert!(pattern.subsumes(&instance, &o, &mut b));
        let mut b2 = Bindings::new();
        assert!(!instance.subsumes(&pattern, &o, &mut b2));
    }

    #[test]
    fn test_occurs_check() {
        let (o, _, at) = setup();
        let any = o.get_sort("any").unwrap();
        let v = TermAttribute::variable(7, any);
        let nested = TermAttribute::Subterm(Term::new(at, vec![v.clone(), v.clone()]));
        let mut b = Bindings::new();
        assert!(!TermAttribute::unify(&v, &nested, &o, &mut b));
    }

    #[test]
    fn test_structural_eq_variable_bijection() {
        let (o, id, at) = setup();
        let any = o.get_sort("any").unwrap();
        let a = Term::new(
            at,
            vec![TermAttribute::variable(0, any), TermAttribute::variable(0, any)],
        );
        let b = Term::new(
            at,
            vec![TermAttribute::variable(5, any), TermAttribute::variable(5, any)],
        );
        let c = Term::new(
            at,
            vec![TermAttribute::variable(5, any), TermAttribute::variable(6, any)],
        );
        assert!(a.structural_eq(&b));
        assert!(!a.structural_eq(&c));
        let d = Term::new(
            at,
            vec![
                TermAttribute::constant("bob", id),
                TermAttribute::variable(1, any),
            ],
        );
        assert!(!a.structural_eq(&d));
    }

    #[test]
    fn test_apply_bindings_recursive() {
        let (o, id, at) = setup();
        let any = o.get_sort("any").unwrap();
        let mut b = Bindings::new();
        let inner = Term::new(at, vec![TermAttribute::variable(1, any)]);
        // X -> at(Y), Y -> 'bob'
        let fact = Term::new(
            at,
            vec![
                TermAttribute::Subterm(inner.clone()),
                TermAttribute::constant("x", id),
            ],
        );
        let query = Term::new(
            at,
            vec![
                TermAttribute::variable(0, any),
                TermAttribute::constant("x", id),
            ],
        );
        assert!(query.unify(&fact, &o, &mut b));
        let probe = Term::new(
            at,
            vec![TermAttribute::variable(1, any), TermAttribute::variable(0, any)],
        );
        let bound_fact = Term::new(at, vec![TermAttribute::constant("bob", id)]);
        assert!(inner.unify(&bound_fact, &o, &mut b));
        let applied = probe.apply_bindings(&b);
        assert_eq!(
            applied.attributes[0].as_constant(),
            Some("bob"),
            "variable chased through two bindings"
        );
        let sub = applied.attributes[1].as_subterm().unwrap();
        assert_eq!(sub.attributes[0].as_constant(), Some("bob"));
    }

    #[test]
    fn test_renamed_standardizes_apart() {
        let (o, _, at) = setup();
        let any = o.get_sort("any").unwrap();
        let t = Term::new(
            at,
            vec![TermAttribute::variable(0, any), TermAttribute::variable(0, any)],
        );
        let mut next = 100;
        let r = t.renamed(&mut next);
        assert_eq!(r.variables(), vec![100]);
        assert_eq!(next, 101);
        assert!(t.structural_eq(&r));
    }

    #[test]
    fn test_serde_round_trip() {
        let (o, id, at) = setup();
        let t = Term::new(
            at,
            vec![
                TermAttribute::constant("bob", id),
                TermAttribute::variable(3, o.get_sort("any").unwrap()),
            ],
        );
        let json = serde_json::to_string(&t).unwrap();
        let back: Term = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn test_functor_subsumption_in_unify() {
        let mut o = Ontology::core();
        let at = o.get_sort("space.at").unwrap();
        let at_indoor = o.sort("space.at.indoor", &[at]);
        let id = o.get_sort("#id").unwrap();
        let fact = Term::new(at_indoor, vec![TermAttribute::constant("bob", id)]);
        let query = Term::new(at, vec![TermAttribute::constant("bob", id)]);
        let mut b = Bindings::new();
        assert!(query.unify(&fact, &o, &mut b));
    }
}
