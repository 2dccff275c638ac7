//! # Term Logic (The Logical Language)
//!
//! The symbolic substrate the Mindstone NPC core reasons over: a sort
//! lattice with subsumption, first-order terms with sort-aware unification,
//! signed clauses, and the wire-syntax parser/renderer.
//!
//! ## Core Components
//!
//! - **ontology**: `Sort` / `Ontology` - the is-a lattice of functors and types
//! - **term**: `Term`, `TermAttribute`, `Bindings` - unification, subsumption,
//!   substitution, structural equality
//! - **sentence**: `Sentence` - signed disjunctive clauses
//! - **parse**: wire-syntax parsing and round-tripping rendering

pub mod ontology;
pub mod parse;
pub mod sentence;
pub mod term;

pub use ontology::*;
pub use parse::{ParseError, TermParser};
pub use sentence::*;
pub use term::*;
