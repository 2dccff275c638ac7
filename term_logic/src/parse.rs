//! Parsing and rendering of the term surface syntax.
//!
//! The wire syntax is the one used throughout the persisted format:
//! `functor('constant'[sort], VAR:[sort], [sort], nested(...))`. Unknown
//! functor and sort names are registered in the ontology on the fly, since
//! host vocabularies are open.

use std::collections::HashMap;
use thiserror::Error;

use crate::ontology::{Ontology, SortId};
use crate::sentence::Sentence;
use crate::term::{Term, TermAttribute};

/// Errors from the term/sentence parser.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected end of input while parsing {0}")]
    UnexpectedEnd(&'static str),
    #[error("unexpected character {found:?} at offset {at}")]
    UnexpectedChar { found: char, at: usize },
    #[error("expected {expected} at offset {at}")]
    Expected { expected: &'static str, at: usize },
    #[error("not a term: {0}")]
    NotATerm(String),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '#' | '_')
}

struct Scan {
    chars: Vec<char>,
    pos: usize,
}

impl Scan {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !f(c) {
                break;
            }
            out.push(c);
            self.advance();
        }
        out
    }

    fn take_until(&mut self, stop: char) -> Result<String, ParseError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::UnexpectedEnd("quoted constant")),
                Some(c) if c == stop => {
                    self.advance();
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
    }
}

/// Parser with a persistent variable scope: several strings parsed through
/// one `TermParser` share their named variables (the persistence layer relies
/// on this when the targets and additional sentences of one inference record
/// mention the same variable).
#[derive(Debug, Default)]
pub struct TermParser {
    vars: HashMap<String, (u64, SortId)>,
    next_var: u64,
}

impl TermParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_var(&mut self) -> u64 {
        let v = self.next_var;
        self.next_var += 1;
        v
    }

    /// Parse a single attribute (constant, variable, or term).
    pub fn parse_attribute_str(
        &mut self,
        input: &str,
        ont: &mut Ontology,
    ) -> Result<TermAttribute, ParseError> {
        let mut scan = Scan::new(input);
        let attr = self.parse_attribute(&mut scan, ont)?;
        scan.skip_ws();
        if let Some(c) = scan.peek() {
            return Err(ParseError::UnexpectedChar {
                found: c,
                at: scan.pos,
            });
        }
        Ok(attr)
    }

    /// Parse a single term.
    pub fn parse_term(&mut self, input: &str, ont: &mut Ontology) -> Result<Term, ParseError> {
        let mut scan = Scan::new(input);
        let attr = self.parse_attribute(&mut scan, ont)?;
        scan.skip_ws();
        if let Some(c) = scan.peek() {
            return Err(ParseError::UnexpectedChar {
                found: c,
                at: scan.pos,
            });
        }
        match attr {
            TermAttribute::Subterm(t) => Ok(t),
            _ => Err(ParseError::NotATerm(input.trim().to_string())),
        }
    }

    /// Parse a sentence: literals separated by `||`, `~` marking negation.
    /// An empty input parses as the empty clause.
    pub fn parse_sentence(
        &mut self,
        input: &str,
        ont: &mut Ontology,
    ) -> Result<Sentence, ParseError> {
        let trimmed = input.trim();
        let mut sentence = Sentence::default();
        if trimmed.is_empty() {
            return Ok(sentence);
        }
        for part in trimmed.split("||") {
            let mut p = part.trim();
            let mut sign = true;
            if let Some(rest) = p.strip_prefix('~') {
                sign = false;
                p = rest.trim_start();
            }
            sentence.terms.push(self.parse_term(p, ont)?);
            sentence.signs.push(sign);
        }
        Ok(sentence)
    }

    fn parse_attribute(
        &mut self,
        scan: &mut Scan,
        ont: &mut Ontology,
    ) -> Result<TermAttribute, ParseError> {
        scan.skip_ws();
        match scan.peek() {
            None => Err(ParseError::UnexpectedEnd("attribute")),
            Some('\'') => {
                scan.advance();
                let value = scan.take_until('\'')?;
                let sort = self.parse_sort_suffix(scan, ont)?;
                Ok(TermAttribute::Constant { value, sort })
            }
            Some('[') => {
                let sort = self.parse_sort_suffix(scan, ont)?;
                Ok(TermAttribute::Variable {
                    id: self.fresh_var(),
                    name: None,
                    sort,
                })
            }
            Some(c) if c.is_ascii_digit() => {
                let value = scan.take_while(|c| c.is_ascii_digit() || c == '.');
                let sort = ont.get_or_insert("number");
                Ok(TermAttribute::Constant { value, sort })
            }
            Some(c) if is_name_char(c) => {
                let name = scan.take_while(is_name_char);
                match scan.peek() {
                    Some(':') => {
                        scan.advance();
                        let sort = self.parse_sort_suffix(scan, ont)?;
                        let id = match self.vars.get(&name) {
                            Some((id, _)) => *id,
                            None => {
                                let id = self.fresh_var();
                                self.vars.insert(name.clone(), (id, sort));
                                id
                            }
                        };
                        Ok(TermAttribute::Variable {
                            id,
                            name: Some(name),
                            sort,
                        })
                    }
                    Some('(') => {
                        scan.advance();
                        let functor = ont.get_or_insert(&name);
                        let mut attributes = Vec::new();
                        scan.skip_ws();
                        if scan.peek() == Some(')') {
                            scan.advance();
                        } else {
                            loop {
                                attributes.push(self.parse_attribute(scan, ont)?);
                                scan.skip_ws();
                                match scan.peek() {
                                    Some(',') => scan.advance(),
                                    Some(')') => {
                                        scan.advance();
                                        break;
                                    }
                                    Some(c) => {
                                        return Err(ParseError::UnexpectedChar {
                                            found: c,
                                            at: scan.pos,
                                        })
                                    }
                                    None => {
                                        return Err(ParseError::UnexpectedEnd("attribute list"))
                                    }
                                }
                            }
                        }
                        Ok(TermAttribute::Subterm(Term::new(functor, attributes)))
                    }
                    _ => {
                        // Bare identifier: an in-scope variable reference, a
                        // new uppercase variable, or a zero-attribute term.
                        if let Some((id, sort)) = self.vars.get(&name).copied() {
                            Ok(TermAttribute::Variable {
                                id,
                                name: Some(name),
                                sort,
                            })
                        } else if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                            let any = ont.get_or_insert("any");
                            let id = self.fresh_var();
                            self.vars.insert(name.clone(), (id, any));
                            Ok(TermAttribute::Variable {
                                id,
                                name: Some(name),
                                sort: any,
                            })
                        } else {
                            Ok(TermAttribute::Subterm(Term::atom(ont.get_or_insert(&name))))
                        }
                    }
                }
            }
            Some(c) => Err(ParseError::UnexpectedChar {
                found: c,
                at: scan.pos,
            }),
        }
    }

    fn parse_sort_suffix(
        &mut self,
        scan: &mut Scan,
        ont: &mut Ontology,
    ) -> Result<SortId, ParseError> {
        scan.skip_ws();
        if scan.peek() != Some('[') {
            return Err(ParseError::Expected {
                expected: "'['",
                at: scan.pos,
            });
        }
        scan.advance();
        scan.skip_ws();
        let name = scan.take_while(is_name_char);
        if name.is_empty() {
            return Err(ParseError::Expected {
                expected: "sort name",
                at: scan.pos,
            });
        }
        scan.skip_ws();
        if scan.peek() != Some(']') {
            return Err(ParseError::Expected {
                expected: "']'",
                at: scan.pos,
            });
        }
        scan.advance();
        Ok(ont.get_or_insert(&name))
    }
}

impl Term {
    /// Parse a term in a fresh variable scope.
    pub fn from_string(input: &str, ont: &mut Ontology) -> Result<Term, ParseError> {
        TermParser::new().parse_term(input, ont)
    }

    /// Render back to the wire syntax. Round-trips through
    /// [`Term::from_string`] (synthetic names are assigned to unnamed
    /// variables that occur more than once).
    pub fn render(&self, ont: &Ontology) -> String {
        let names = assign_names(&[self]);
        render_term(self, ont, &names)
    }
}

impl TermAttribute {
    /// Parse an attribute in a fresh variable scope.
    pub fn from_string(input: &str, ont: &mut Ontology) -> Result<TermAttribute, ParseError> {
        TermParser::new().parse_attribute_str(input, ont)
    }

    /// Render back to the wire syntax.
    pub fn render(&self, ont: &Ontology) -> String {
        let names = match self {
            TermAttribute::Subterm(t) => assign_names(&[t]),
            TermAttribute::Variable {
                id,
                name: Some(n),
                ..
            } => HashMap::from([(*id, n.clone())]),
            _ => HashMap::new(),
        };
        render_attribute(self, ont, &names)
    }
}

/// Assign render names to variables across a group of terms sharing a scope.
pub(crate) fn assign_names(terms: &[&Term]) -> HashMap<u64, String> {
    let mut order: Vec<u64> = Vec::new();
    let mut counts: HashMap<u64, usize> = HashMap::new();
    let mut explicit: HashMap<u64, String> = HashMap::new();
    for t in terms {
        collect_var_info(t, &mut order, &mut counts, &mut explicit);
    }

    let mut names: HashMap<u64, String> = HashMap::new();
    let mut used: Vec<String> = Vec::new();
    let mut synth = 0usize;
    for id in order {
        let count = counts.get(&id).copied().unwrap_or(0);
        if let Some(name) = explicit.get(&id) {
            if !used.contains(name) {
                used.push(name.clone());
                names.insert(id, name.clone());
                continue;
            }
        } else if count <= 1 {
            continue;
        }
        // synthesize a fresh name
        loop {
            let candidate = format!("V{synth}");
            synth += 1;
            if !used.contains(&candidate) {
                used.push(candidate.clone());
                names.insert(id, candidate);
                break;
            }
        }
    }
    names
}

fn collect_var_info(
    term: &Term,
    order: &mut Vec<u64>,
    counts: &mut HashMap<u64, usize>,
    explicit: &mut HashMap<u64, String>,
) {
    for attr in &term.attributes {
        match attr {
            TermAttribute::Variable { id, name, .. } => {
                if !order.contains(id) {
                    order.push(*id);
                }
                *counts.entry(*id).or_insert(0) += 1;
                if let Some(n) = name {
                    explicit.entry(*id).or_insert_with(|| n.clone());
                }
            }
            TermAttribute::Subterm(t) => collect_var_info(t, order, counts, explicit),
            TermAttribute::Constant { .. } => {}
        }
    }
}

pub(crate) fn render_term(term: &Term, ont: &Ontology, names: &HashMap<u64, String>) -> String {
    let functor = ont.name_of(term.functor);
    if term.attributes.is_empty() {
        return functor.to_string();
    }
    let attrs: Vec<String> = term
        .attributes
        .iter()
        .map(|a| render_attribute(a, ont, names))
        .collect();
    format!("{}({})", functor, attrs.join(", "))
}

fn render_attribute(attr: &TermAttribute, ont: &Ontology, names: &HashMap<u64, String>) -> String {
    match attr {
        TermAttribute::Constant { value, sort } => {
            format!("'{}'[{}]", value, ont.name_of(*sort))
        }
        TermAttribute::Variable { id, sort, .. } => match names.get(id) {
            Some(name) => format!("{}:[{}]", name, ont.name_of(*sort)),
            None => format!("[{}]", ont.name_of(*sort)),
        },
        TermAttribute::Subterm(t) => render_term(t, ont, names),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_talk_performative() {
        let mut o = Ontology::core();
        let t = Term::from_string(
            "action.talk('self'[#id], perf.greet('bob'[#id]))",
            &mut o,
        )
        .unwrap();
        assert_eq!(o.name_of(t.functor), "action.talk");
        assert_eq!(t.attributes.len(), 2);
        assert_eq!(t.attributes[0].as_constant(), Some("self"));
        let perf = t.attributes[1].as_subterm().unwrap();
        assert_eq!(o.name_of(perf.functor), "perf.greet");
    }

    #[test]
    fn test_parse_shared_named_variable() {
        let mut o = Ontology::core();
        let t = Term::from_string(
            "#and(S:[sentence], the(S, [singular]))",
            &mut o,
        )
        .unwrap();
        let vars = t.variables();
        // S appears twice as one variable, the anonymous one is separate
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_parse_zero_attribute_term() {
        let mut o = Ontology::core();
        let t = Term::from_string("perf.greet", &mut o).unwrap();
        assert_eq!(o.name_of(t.functor), "perf.greet");
        assert!(t.attributes.is_empty());
    }

    #[test]
    fn test_parse_rejects_bare_constant() {
        let mut o = Ontology::core();
        assert!(Term::from_string("'bob'[#id]", &mut o).is_err());
        assert!(Term::from_string("", &mut o).is_err());
    }

    #[test]
    fn test_parse_unknown_names_registered() {
        let mut o = Ontology::core();
        let t = Term::from_string("verb.own('bob'[#id], 'key'[object.key])", &mut o).unwrap();
        assert!(o.get_sort("verb.own").is_some());
        assert!(o.get_sort("object.key").is_some());
        assert_eq!(t.attributes.len(), 2);
    }

    #[test]
    fn test_render_round_trip() {
        let mut o = Ontology::core();
        let src = "space.at(X:[any], 'kitchen'[#id], #and(S:[sentence], the(S, [singular])))";
        let t = Term::from_string(src, &mut o).unwrap();
        let rendered = t.render(&o);
        let t2 = Term::from_string(&rendered, &mut o).unwrap();
        assert!(t.structural_eq(&t2), "{rendered}");
    }

    #[test]
    fn test_render_anonymous_singleton_variable() {
        let mut o = Ontology::core();
        let t = Term::from_string("space.at('bob'[#id], [space.location])", &mut o).unwrap();
        let rendered = t.render(&o);
        assert_eq!(rendered, "space.at('bob'[#id], [space.location])");
    }

    #[test]
    fn test_number_literal() {
        let mut o = Ontology::core();
        let t = Term::from_string("property.age('bob'[#id], 7)", &mut o).unwrap();
        assert_eq!(t.attributes[1].as_constant(), Some("7"));
        let rendered = t.render(&o);
        let t2 = Term::from_string(&rendered, &mut o).unwrap();
        assert!(t.structural_eq(&t2));
    }
}
