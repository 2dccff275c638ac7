//! Built-in capability handlers: talking and memorizing.

use term_logic::{Sentence, Term};
use tracing::debug;

use super::{IntentionAction, IntentionOutcome, IntentionRecord};
use crate::memory::Provenance;
use crate::mind::{Mind, Utterance};

/// Utters a performative: records it in long-term memory and the outbox,
/// and tracks the conversational expectations it creates (questions await
/// answers, requests await confirmation, greetings open conversations).
#[derive(Debug, Default)]
pub struct TalkAction;

impl IntentionAction for TalkAction {
    fn can_handle(&self, action: &Term, mind: &Mind) -> bool {
        mind.ontology.is_a(action.functor, mind.sorts.action_talk)
    }

    fn execute(&mut self, record: &IntentionRecord, mind: &mut Mind) -> IntentionOutcome {
        let Some(performative) = record.action.attributes.get(1).and_then(|a| a.as_subterm())
        else {
            return IntentionOutcome::Failed("talk intention without a performative".to_string());
        };
        let performative = performative.clone();
        let time = mind.time;

        mind.outbox.push(Utterance {
            performative: performative.clone(),
            time,
        });
        mind.add_long_term_term(record.action.clone(), Provenance::Reaction);

        let listener = performative
            .attributes
            .first()
            .and_then(|a| a.as_constant())
            .map(str::to_string);
        let Some(listener) = listener else {
            return IntentionOutcome::Completed;
        };
        if listener == mind.self_id {
            return IntentionOutcome::Completed;
        }

        let is_question = mind
            .ontology
            .is_a(performative.functor, mind.sorts.question);
        let name = mind.ontology.name_of(performative.functor).to_string();
        let ctx_idx = mind.dialogue.context_index_for_speaker(&listener);
        let self_id = mind.self_id.clone();
        let ctx = &mut mind.dialogue.contexts[ctx_idx];
        let index = ctx.record_performative(self_id, None, performative.clone(), time);
        if is_question {
            ctx.push_question(index, time);
        }
        match name.as_str() {
            "perf.greet" => {
                ctx.expecting_greet = true;
                ctx.in_conversation = true;
            }
            "perf.farewell" => {
                ctx.expecting_farewell = true;
                ctx.in_conversation = false;
            }
            "perf.request.action" => {
                if let Some(request) =
                    performative.attributes.get(1).and_then(|a| a.as_subterm())
                {
                    ctx.push_confirmation(request.clone(), time);
                }
            }
            _ => {}
        }
        IntentionOutcome::Completed
    }
}

/// Commits a told fact to long-term memory. A `#not(...)` payload removes
/// the matching positive belief and records the negation as a negative
/// sentence.
#[derive(Debug, Default)]
pub struct MemorizeAction;

impl IntentionAction for MemorizeAction {
    fn can_handle(&self, action: &Term, mind: &Mind) -> bool {
        mind.ontology
            .is_a(action.functor, mind.sorts.action_memorize)
    }

    fn execute(&mut self, record: &IntentionRecord, mind: &mut Mind) -> IntentionOutcome {
        let Some(content) = record.action.attributes.get(2).and_then(|a| a.as_subterm()) else {
            return IntentionOutcome::Failed("memorize intention without content".to_string());
        };
        if mind.ontology.name_of(content.functor) == "#not" {
            let Some(inner) = content.attributes.first().and_then(|a| a.as_subterm()) else {
                return IntentionOutcome::Failed(
                    "memorize of a negation without an inner term".to_string(),
                );
            };
            let inner = inner.clone();
            if !mind.remove_long_term_term_matching_with(&inner) {
                debug!(
                    term = %inner.render(&mind.ontology),
                    "no matching positive belief to retract"
                );
            }
            let time = mind.time;
            mind.long_term.add_sentence_if_new(
                Sentence::new(vec![inner], vec![false]),
                Provenance::Memorize,
                1,
                time,
            );
            return IntentionOutcome::Completed;
        }
        let content = content.clone();
        mind.add_long_term_term(content, Provenance::Memorize);
        IntentionOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mind::Mind;
    use term_logic::Ontology;

    #[test]
    fn test_memorize_adds_and_forgets() {
        let mut mind = Mind::new(Ontology::core(), "self", Default::default());
        let mem = Term::from_string(
            "action.memorize('self'[#id], 'bob'[#id], verb.own('bob'[#id], 'key'[#id]))",
            &mut mind.ontology,
        )
        .unwrap();
        let record = IntentionRecord::new(mem, None, None, None, 0);
        let mut action = MemorizeAction;
        assert_eq!(
            action.execute(&record, &mut mind),
            IntentionOutcome::Completed
        );
        let q = Term::from_string("verb.own('bob'[#id], [any])", &mut mind.ontology).unwrap();
        assert!(mind.no_inference_query(&q).is_some());

        let forget = Term::from_string(
            "action.memorize('self'[#id], 'bob'[#id], #not(verb.own('bob'[#id], 'key'[#id])))",
            &mut mind.ontology,
        )
        .unwrap();
        let record = IntentionRecord::new(forget, None, None, None, 1);
        assert_eq!(
            action.execute(&record, &mut mind),
            IntentionOutcome::Completed
        );
        assert!(mind.no_inference_query(&q).is_none());
    }

    #[test]
    fn test_talk_pushes_question_expectation() {
        let mut mind = Mind::new(Ontology::core(), "self", Default::default());
        mind.time = 5;
        let talk = Term::from_string(
            "action.talk('self'[#id], perf.q.howareyou('bob'[#id]))",
            &mut mind.ontology,
        )
        .unwrap();
        let record = IntentionRecord::new(talk, None, None, None, 5);
        let mut action = TalkAction;
        assert_eq!(
            action.execute(&record, &mut mind),
            IntentionOutcome::Completed
        );
        assert_eq!(mind.outbox.len(), 1);
        let ctx = mind.dialogue.context_for_speaker("bob");
        assert!(ctx.expecting_answer());
        assert_eq!(ctx.expecting_answer_timestamps, vec![5]);
    }
}
