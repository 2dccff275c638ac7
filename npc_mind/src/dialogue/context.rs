//! Per-interlocutor conversation state.

use serde::{Deserialize, Serialize};
use term_logic::{Term, TermAttribute};

/// One performative in a context's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPerformative {
    /// Who uttered it (may be ourselves).
    pub speaker: String,
    /// Surface text, when one was perceived.
    pub text: Option<String>,
    pub performative: Term,
    pub time: u64,
}

/// Cursor over a long answer list, paged out via `perf.moreresults`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumeratedQuestion {
    pub question: Term,
    pub answers: Vec<TermAttribute>,
    pub next_answer_index: usize,
}

/// Conversation state for one interlocutor. Created lazily on first contact
/// and never destroyed. The expectation stacks hold indices into the
/// performative history, paired with the timestamps used by the patience
/// timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueContext {
    pub speaker: String,
    pub performatives: Vec<ContextPerformative>,
    /// Questions we asked and still await an answer to (history indices).
    pub expecting_answer_to_question: Vec<usize>,
    pub expecting_answer_timestamps: Vec<u64>,
    /// Action requests we made and still await confirmation of.
    pub expecting_confirmation_to_request: Vec<Term>,
    pub expecting_confirmation_timestamps: Vec<u64>,
    pub in_conversation: bool,
    pub expecting_greet: bool,
    pub expecting_farewell: bool,
    pub expecting_thank_you: bool,
    pub expecting_you_are_welcome: bool,
    pub last_performative_involving_this_character_was_to_us: bool,
    pub last_enumerated_question: Option<EnumeratedQuestion>,
}

impl DialogueContext {
    pub fn new(speaker: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            performatives: Vec::new(),
            expecting_answer_to_question: Vec::new(),
            expecting_answer_timestamps: Vec::new(),
            expecting_confirmation_to_request: Vec::new(),
            expecting_confirmation_timestamps: Vec::new(),
            in_conversation: false,
            expecting_greet: false,
            expecting_farewell: false,
            expecting_thank_you: false,
            expecting_you_are_welcome: false,
            last_performative_involving_this_character_was_to_us: false,
            last_enumerated_question: None,
        }
    }

    /// Append to the history, returning the new performative's index.
    pub fn record_performative(
        &mut self,
        speaker: impl Into<String>,
        text: Option<String>,
        performative: Term,
        time: u64,
    ) -> usize {
        self.performatives.push(ContextPerformative {
            speaker: speaker.into(),
            text,
            performative,
            time,
        });
        self.performatives.len() - 1
    }

    /// Push a question we just asked onto the expectation stack.
    pub fn push_question(&mut self, index: usize, time: u64) {
        self.expecting_answer_to_question.push(index);
        self.expecting_answer_timestamps.push(time);
    }

    /// Push an action request awaiting confirmation.
    pub fn push_confirmation(&mut self, request: Term, time: u64) {
        self.expecting_confirmation_to_request.push(request);
        self.expecting_confirmation_timestamps.push(time);
    }

    pub fn expecting_answer(&self) -> bool {
        !self.expecting_answer_to_question.is_empty()
    }

    pub fn expecting_confirmation(&self) -> bool {
        !self.expecting_confirmation_to_request.is_empty()
    }

    /// The question at the top of the expectation stack.
    pub fn last_question(&self) -> Option<&ContextPerformative> {
        self.expecting_answer_to_question
            .last()
            .and_then(|&i| self.performatives.get(i))
    }

    /// Pop the top question, returning its history index.
    pub fn pop_last_question(&mut self) -> Option<usize> {
        self.expecting_answer_timestamps.pop();
        self.expecting_answer_to_question.pop()
    }

    /// Drop every pending confirmation.
    pub fn clear_confirmations(&mut self) {
        self.expecting_confirmation_to_request.clear();
        self.expecting_confirmation_timestamps.clear();
    }

    /// When the conversation started, if it has.
    pub fn first_performative_time(&self) -> Option<u64> {
        self.performatives.first().map(|p| p.time)
    }

    /// Store a long answer list for later `perf.moreresults` paging.
    pub fn set_enumerated_answers(
        &mut self,
        question: Term,
        answers: Vec<TermAttribute>,
        already_given: usize,
    ) {
        self.last_enumerated_question = Some(EnumeratedQuestion {
            question,
            answers,
            next_answer_index: already_given,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use term_logic::Ontology;

    #[test]
    fn test_question_stack() {
        let mut o = Ontology::core();
        let mut ctx = DialogueContext::new("bob");
        let q = Term::from_string("perf.q.howareyou('bob'[#id])", &mut o).unwrap();
        let idx = ctx.record_performative("self", None, q.clone(), 10);
        ctx.push_question(idx, 10);
        assert!(ctx.expecting_answer());
        assert!(ctx.last_question().unwrap().performative.structural_eq(&q));
        assert_eq!(ctx.pop_last_question(), Some(idx));
        assert!(!ctx.expecting_answer());
        // history survives the pop
        assert_eq!(ctx.performatives.len(), 1);
    }

    #[test]
    fn test_context_serde_round_trip() {
        let mut o = Ontology::core();
        let mut ctx = DialogueContext::new("bob");
        let q = Term::from_string("perf.q.howareyou('bob'[#id])", &mut o).unwrap();
        let idx = ctx.record_performative("self", Some("how are you".to_string()), q, 3);
        ctx.push_question(idx, 3);
        ctx.in_conversation = true;
        let json = serde_json::to_string(&ctx).unwrap();
        let back: DialogueContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.speaker, "bob");
        assert!(back.in_conversation);
        assert_eq!(back.expecting_answer_to_question, vec![idx]);
        assert_eq!(back.performatives.len(), 1);
    }

    #[test]
    fn test_confirmation_stack() {
        let mut o = Ontology::core();
        let mut ctx = DialogueContext::new("bob");
        let req = Term::from_string("verb.follow('bob'[#id], 'self'[#id])", &mut o).unwrap();
        ctx.push_confirmation(req, 5);
        assert!(ctx.expecting_confirmation());
        ctx.clear_confirmations();
        assert!(!ctx.expecting_confirmation());
        assert!(ctx.expecting_confirmation_timestamps.is_empty());
    }
}
