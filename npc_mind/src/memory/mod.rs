//! Belief memory - short-term and long-term fact stores with provenance.
//!
//! Short-term memory holds perceived terms with a decaying activation; the
//! promotion filter commits "important, persistent" facts (talk events,
//! locations) straight to long-term memory. Long-term memory keeps signed
//! sentences, and preserves superseded state sentences as a previous-sentence
//! history for temporal queries.

mod long_term;
mod short_term;

pub use long_term::*;
pub use short_term::*;

use serde::{Deserialize, Serialize};

/// Why a fact entered memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Seeded world knowledge; re-derived at load, never persisted.
    Background,
    /// Perceived from the world.
    Perception,
    /// Produced by reactive behavior.
    Reaction,
    /// Explicitly memorized (told by another character).
    Memorize,
}

impl Provenance {
    /// Wire-format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Background => "background",
            Provenance::Perception => "perception",
            Provenance::Reaction => "reaction",
            Provenance::Memorize => "memorize",
        }
    }

    /// Parse a wire-format name.
    pub fn parse(s: &str) -> Option<Provenance> {
        match s {
            "background" => Some(Provenance::Background),
            "perception" => Some(Provenance::Perception),
            "reaction" => Some(Provenance::Reaction),
            "memorize" => Some(Provenance::Memorize),
            _ => None,
        }
    }
}
