//! Inference records: one reasoning task, possibly spanning many targets.

use term_logic::{Bindings, Sentence, Term};
use uuid::Uuid;

use super::effect::InferenceEffect;
use super::resolution::InterruptibleResolution;

/// Unique identifier for inference records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InferenceId(pub Uuid);

impl InferenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InferenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One reasoning task: a disjunction of conjunctive goals, each with its own
/// resolution process, serviced by the anxiety scheduler. The record is live
/// until every resolution has completed, then its effect fires exactly once.
#[derive(Debug)]
pub struct InferenceRecord {
    pub id: InferenceId,
    /// The goal clauses, one clause-list per resolution process.
    pub targets: Vec<Vec<Sentence>>,
    pub resolutions: Vec<InterruptibleResolution>,
    /// How many resolutions have completed; always `<= resolutions.len()`.
    pub completed: usize,
    /// Extra clauses the requester supplied beyond memory.
    pub additional_sentences: Vec<Sentence>,
    pub priority: i64,
    pub anxiety: i64,
    pub find_all_answers: bool,
    /// Selects the memory snapshot ("now" vs "past") that seeded the search.
    pub time_term: Option<Term>,
    pub effect: Option<Box<dyn InferenceEffect>>,
    /// The performative that triggered this task, for "why" explanations.
    pub triggered_by: Option<Term>,
    pub triggered_by_speaker: Option<String>,
}

impl InferenceRecord {
    /// Build a record over an already-assembled knowledge base. Each target
    /// gets its own resolution process seeded with a clone of the base.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kb: Vec<Sentence>,
        targets: Vec<Vec<Sentence>>,
        priority: i64,
        anxiety: i64,
        find_all_answers: bool,
        time_term: Option<Term>,
        effect: Option<Box<dyn InferenceEffect>>,
        additional_sentences: Vec<Sentence>,
        max_depth: usize,
    ) -> Self {
        let resolutions = targets
            .iter()
            .map(|t| InterruptibleResolution::new(kb.clone(), t, max_depth))
            .collect();
        Self {
            id: InferenceId::new(),
            targets,
            resolutions,
            completed: 0,
            additional_sentences,
            priority,
            anxiety,
            find_all_answers,
            time_term,
            effect,
            triggered_by: None,
            triggered_by_speaker: None,
        }
    }

    /// True when every resolution has completed.
    pub fn is_done(&self) -> bool {
        self.completed >= self.resolutions.len()
    }

    /// Answer substitutions of the first resolution process.
    pub fn first_results(&self) -> &[Bindings] {
        self.resolutions
            .first()
            .map(|r| r.results())
            .unwrap_or(&[])
    }
}
