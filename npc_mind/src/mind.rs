//! The mind - orchestrator of the per-tick cognitive cycle.
//!
//! Fixed intra-tick ordering, which observable behavior depends on:
//! perception filtering -> short-term decay -> one inference step ->
//! conversation timeouts -> intention execution.

use term_logic::{Bindings, Ontology, Sentence, SortId, Term, TermAttribute};
use tracing::warn;

use crate::calendar;
use crate::config::MindConfig;
use crate::dialogue::DialogueManager;
use crate::inference::{EffectRegistry, InferenceRecord};
use crate::intention::{
    IntentionAction, IntentionRecord, MemorizeAction, TalkAction,
};
use crate::memory::{LongTermMemory, Provenance, ShortTermMemory};

/// Sorts the core dereferences on hot paths, resolved once at construction.
#[derive(Debug, Clone, Copy)]
pub struct SortCache {
    pub any: SortId,
    pub id: SortId,
    pub symbol: SortId,
    pub number: SortId,
    pub etcetera: SortId,
    pub and_list: SortId,
    pub negation: SortId,
    pub query_marker: SortId,
    pub state: SortId,
    pub time_now: SortId,
    pub time_past: SortId,
    pub time_current: SortId,
    pub space_at: SortId,
    pub action_talk: SortId,
    pub action_memorize: SortId,
    pub intention: SortId,
    pub performative: SortId,
    pub question: SortId,
}

impl SortCache {
    pub fn new(ont: &mut Ontology) -> Self {
        Self {
            any: ont.get_or_insert("any"),
            id: ont.get_or_insert("#id"),
            symbol: ont.get_or_insert("symbol"),
            number: ont.get_or_insert("number"),
            etcetera: ont.get_or_insert("etcetera"),
            and_list: ont.get_or_insert("#and"),
            negation: ont.get_or_insert("#not"),
            query_marker: ont.get_or_insert("#query"),
            state: ont.get_or_insert("#stateSort"),
            time_now: ont.get_or_insert("time.now"),
            time_past: ont.get_or_insert("time.past"),
            time_current: ont.get_or_insert("time.current"),
            space_at: ont.get_or_insert("space.at"),
            action_talk: ont.get_or_insert("action.talk"),
            action_memorize: ont.get_or_insert("action.memorize"),
            intention: ont.get_or_insert("intention"),
            performative: ont.get_or_insert("performative"),
            question: ont.get_or_insert("perf.question"),
        }
    }
}

/// Host hook deciding whether a character is currently perceivable (used by
/// the re-ask logic). Without one, everyone is.
pub trait Awareness: std::fmt::Debug {
    fn can_see(&self, character_id: &str) -> bool;
}

/// Something we said: the game renders it and other characters perceive it.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub performative: Term,
    pub time: u64,
}

/// The cognitive core of one character.
#[derive(Debug)]
pub struct Mind {
    pub config: MindConfig,
    pub self_id: String,
    pub time: u64,
    pub ontology: Ontology,
    pub sorts: SortCache,
    pub short_term: ShortTermMemory,
    pub long_term: LongTermMemory,
    pub dialogue: DialogueManager,
    pub intentions: Vec<IntentionRecord>,
    /// Become active only once intentions and inferences are both drained.
    pub queued_intentions: Vec<IntentionRecord>,
    /// Completed intentions that had a cause, kept for "why" answers.
    pub intentions_caused_by_request: Vec<IntentionRecord>,
    pub inference: Vec<InferenceRecord>,
    pub(crate) handlers: Vec<Box<dyn IntentionAction>>,
    pub effects: EffectRegistry,
    pub perception_buffer: Vec<Term>,
    pub outbox: Vec<Utterance>,
    pub awareness: Option<Box<dyn Awareness>>,
}

impl Mind {
    /// A mind over the given ontology, with the built-in talk and memorize
    /// handlers registered.
    pub fn new(mut ontology: Ontology, self_id: impl Into<String>, config: MindConfig) -> Self {
        let sorts = SortCache::new(&mut ontology);
        Self {
            config,
            self_id: self_id.into(),
            time: 0,
            ontology,
            sorts,
            short_term: ShortTermMemory::new(),
            long_term: LongTermMemory::new(),
            dialogue: DialogueManager::new(),
            intentions: Vec::new(),
            queued_intentions: Vec::new(),
            intentions_caused_by_request: Vec::new(),
            inference: Vec::new(),
            handlers: vec![Box::new(TalkAction), Box::new(MemorizeAction)],
            effects: EffectRegistry::with_defaults(),
            perception_buffer: Vec::new(),
            outbox: Vec::new(),
            awareness: None,
        }
    }

    /// Append a capability handler; dispatch stays first-match in
    /// registration order.
    pub fn register_intention_handler(&mut self, handler: Box<dyn IntentionAction>) {
        self.handlers.push(handler);
    }

    pub fn set_awareness(&mut self, awareness: Box<dyn Awareness>) {
        self.awareness = Some(awareness);
    }

    pub fn can_see(&self, character_id: &str) -> bool {
        self.awareness
            .as_ref()
            .map_or(true, |a| a.can_see(character_id))
    }

    /// One simulation tick. The phase ordering is a hard invariant.
    pub fn update(&mut self, time: u64) {
        self.time = time;

        if self.config.perception_frequency > 0
            && time % self.config.perception_frequency == self.config.perception_frequency_offset
        {
            self.attention_and_perception();
        }
        self.short_term.activation_update();
        self.inference_update();
        self.conversation_update();
        self.execute_intentions();
    }

    /// Offer a perceived term; it is filtered into memory on the next
    /// perception phase.
    pub fn perceive(&mut self, term: Term) {
        self.perception_buffer.push(term);
    }

    pub fn clear_perception(&mut self) {
        self.perception_buffer.clear();
    }

    fn attention_and_perception(&mut self) {
        let buffered = std::mem::take(&mut self.perception_buffer);
        for term in buffered {
            self.perception_to_short_memory_filter(term);
        }
    }

    /// Everything perceivable enters short-term memory except the clock.
    fn perception_to_short_memory_filter(&mut self, term: Term) -> bool {
        if term.functor == self.sorts.time_current {
            return false;
        }
        self.add_short_term_term(term, Provenance::Perception);
        true
    }

    /// Important, persistent predicate classes skip short-term memory.
    fn short_memory_to_long_term_filter(&mut self, term: &Term, provenance: Provenance) -> bool {
        if self.ontology.is_a(term.functor, self.sorts.action_talk)
            || self.ontology.is_a(term.functor, self.sorts.space_at)
        {
            self.add_long_term_term(term.clone(), provenance);
            return true;
        }
        false
    }

    /// Offer a term to short-term memory: promotion filter first, then
    /// intention interception, then insertion with a decaying activation.
    /// A genuinely new term triggers the reaction engine.
    pub fn add_short_term_term(&mut self, term: Term, provenance: Provenance) {
        if self.short_memory_to_long_term_filter(&term, provenance) {
            return;
        }
        if term.functor == self.sorts.intention {
            self.push_intention_term(&term);
            return;
        }
        // one extra tick: the activation update that follows immediately
        // takes it right back
        let activation = self.config.perception_memory_time + 1;
        let added = if self.ontology.is_a(term.functor, self.sorts.state) {
            self.short_term
                .add_state_term_if_new(term.clone(), provenance, activation, self.time)
        } else {
            self.short_term
                .add_term_if_new(term.clone(), provenance, activation, self.time)
        };
        if added {
            self.reactive_behavior_update(&term);
        }
    }

    /// Commit a fact to long-term memory (permanent until contradicted). A
    /// genuinely new fact triggers the reaction engine.
    pub fn add_long_term_term(&mut self, term: Term, provenance: Provenance) {
        if term.functor == self.sorts.intention {
            self.push_intention_term(&term);
            return;
        }
        let added = if self.ontology.is_a(term.functor, self.sorts.state) {
            self.long_term.add_state_sentence_if_new(
                Sentence::fact(term.clone()),
                provenance,
                1,
                self.time,
                self.time,
            )
        } else {
            self.long_term
                .add_sentence_if_new(Sentence::fact(term.clone()), provenance, 1, self.time)
        };
        if added {
            self.reactive_behavior_update(&term);
        }
    }

    /// `intention(Action [, Requester])` terms become intention records
    /// rather than memories.
    fn push_intention_term(&mut self, term: &Term) {
        let Some(action) = term.attributes.first().and_then(|a| a.as_subterm()) else {
            warn!(
                term = %term.render(&self.ontology),
                "intention term without an action"
            );
            return;
        };
        let requester = term.attributes.get(1).cloned();
        self.intentions.push(IntentionRecord::new(
            action.clone(),
            requester,
            None,
            None,
            self.time,
        ));
    }

    /// Add a rule sentence at the current time.
    pub fn add_long_term_rule_now(&mut self, sentence: Sentence, provenance: Provenance) {
        self.long_term
            .add_sentence(sentence, provenance, 1, self.time);
    }

    /// Add a rule sentence with an explicit timestamp.
    pub fn add_long_term_rule(&mut self, sentence: Sentence, provenance: Provenance, time: u64) {
        self.long_term.add_sentence(sentence, provenance, 1, time);
    }

    /// Drop the first long-term fact unifying with the term. Returns whether
    /// anything was removed.
    pub fn remove_long_term_term_matching_with(&mut self, term: &Term) -> bool {
        match self.long_term.contains_unifying_term(term, &self.ontology) {
            Some(pos) => {
                self.long_term.remove(pos, self.time);
                true
            }
            None => false,
        }
    }

    /// Does the query unify with any remembered fact, without running
    /// inference? Short-term memory is consulted first.
    pub fn no_inference_query(&self, query: &Term) -> Option<Bindings> {
        if let Some((_, bindings)) = self.short_term.first_match(query, &self.ontology) {
            return Some(bindings);
        }
        if let Some((_, bindings)) = self.long_term.first_match(query, &self.ontology) {
            return Some(bindings);
        }
        None
    }

    /// The value a no-inference query binds to a named variable.
    pub fn no_inference_query_value(&self, query: &Term, variable: &str) -> Option<TermAttribute> {
        let bindings = self.no_inference_query(query)?;
        bindings
            .get_by_name(variable)
            .map(|v| v.apply_bindings(&bindings))
    }

    /// Subsumption-minimal matches from either store, with each match's
    /// functor mapped through a host renderability filter (`None` = cannot
    /// be rendered, skip).
    pub fn most_specific_matches_from_memory(
        &self,
        query: &Term,
        renderable: &dyn Fn(SortId, &Ontology) -> Option<SortId>,
    ) -> Vec<Term> {
        let mut most_specific: Vec<Term> = Vec::new();
        let mut candidates: Vec<Term> = Vec::new();
        for (entry, _) in self.short_term.all_matches(query, &self.ontology) {
            candidates.push(entry.term.clone());
        }
        for (entry, _) in self.long_term.all_matches(query, &self.ontology) {
            candidates.push(entry.sentence.terms[0].clone());
        }

        for candidate in candidates {
            let Some(mapped) = renderable(candidate.functor, &self.ontology) else {
                continue;
            };
            let mut term = candidate;
            term.functor = mapped;

            let mut is_more_specific = true;
            most_specific.retain(|previous| {
                if self.ontology.subsumes(term.functor, previous.functor) {
                    is_more_specific = false;
                    true
                } else if self.ontology.subsumes(previous.functor, term.functor) {
                    false
                } else {
                    true
                }
            });
            if is_more_specific {
                most_specific.push(term);
            }
        }
        most_specific
    }

    /// [`Mind::most_specific_matches_from_memory`] with every sort
    /// renderable as itself.
    pub fn most_specific_matches(&self, query: &Term) -> Vec<Term> {
        self.most_specific_matches_from_memory(query, &|s, _| Some(s))
    }

    /// Derive `property.age` facts from remembered births. Idempotent
    /// upsert, safe to run on any cadence.
    pub fn recalculate_character_ages(&mut self) {
        let Some(born) = self.ontology.get_sort("property.born") else {
            return;
        };
        let mut updates: Vec<(TermAttribute, u64, Provenance, u64)> = Vec::new();
        for entry in self.long_term.iter() {
            if !entry.sentence.is_fact() {
                continue;
            }
            let term = &entry.sentence.terms[0];
            if term.functor != born {
                continue;
            }
            let Some(TermAttribute::Constant { .. }) = term.attributes.first() else {
                continue;
            };
            updates.push((
                term.attributes[0].clone(),
                calendar::age_in_years(entry.time, self.time),
                entry.provenance,
                entry.time,
            ));
        }

        let age_sort = self.ontology.get_or_insert("property.age");
        let year_sort = self.ontology.get_or_insert("time.year");
        for (subject, age, provenance, time) in updates {
            let term = Term::new(
                age_sort,
                vec![
                    subject,
                    TermAttribute::constant(age.to_string(), year_sort),
                ],
            );
            self.long_term.add_state_sentence_if_new(
                Sentence::fact(term),
                provenance,
                1,
                time,
                self.time,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use term_logic::TermParser;

    use crate::inference::ExecuteActionEffect;
    use crate::intention::{IntentionAction, IntentionOutcome, IntentionRecord};

    fn test_mind() -> Mind {
        let config = MindConfig {
            perception_frequency: 1,
            perception_memory_time: 3,
            ..MindConfig::default()
        };
        Mind::new(Ontology::core(), "self", config)
    }

    fn term(mind: &mut Mind, src: &str) -> Term {
        Term::from_string(src, &mut mind.ontology).unwrap()
    }

    /// A perceived talk event: (source, speaker, text, performative).
    fn talk_from(mind: &mut Mind, speaker: &str, text: &str, perf: &str) -> Term {
        term(
            mind,
            &format!(
                "action.talk('{speaker}'[#id], '{speaker}'[#id], '{text}'[symbol], {perf})"
            ),
        )
    }

    fn goal(mind: &mut Mind, src: &str) -> Sentence {
        let t = term(mind, src);
        Sentence::new(vec![t], vec![false])
    }

    fn outbox_names(mind: &Mind) -> Vec<String> {
        mind.outbox
            .iter()
            .map(|u| mind.ontology.name_of(u.performative.functor).to_string())
            .collect()
    }

    #[derive(Debug)]
    struct Recorder {
        prefix: &'static str,
        seen: Rc<RefCell<Vec<Term>>>,
    }

    impl IntentionAction for Recorder {
        fn can_handle(&self, action: &Term, mind: &Mind) -> bool {
            mind.ontology.name_of(action.functor).starts_with(self.prefix)
        }

        fn execute(&mut self, record: &IntentionRecord, _mind: &mut Mind) -> IntentionOutcome {
            self.seen.borrow_mut().push(record.action.clone());
            IntentionOutcome::Completed
        }
    }

    #[derive(Debug)]
    struct BlockThenDone {
        remaining: u32,
    }

    impl IntentionAction for BlockThenDone {
        fn can_handle(&self, action: &Term, mind: &Mind) -> bool {
            mind.ontology.name_of(action.functor) == "verb.wait"
        }

        fn execute(&mut self, _record: &IntentionRecord, _mind: &mut Mind) -> IntentionOutcome {
            if self.remaining > 0 {
                self.remaining -= 1;
                IntentionOutcome::Blocked
            } else {
                IntentionOutcome::Completed
            }
        }
    }

    #[test]
    fn test_location_facts_promote_to_long_term() {
        let mut mind = test_mind();
        let at = term(&mut mind, "space.at('bob'[#id], 'kitchen'[#id])");
        mind.perceive(at.clone());
        mind.update(1);
        assert!(mind.long_term.first_match(&at, &mind.ontology).is_some());
        assert_eq!(mind.short_term.len(), 0);
    }

    #[test]
    fn test_other_facts_stay_short_term_and_expire() {
        let mut mind = test_mind();
        let own = term(&mut mind, "verb.own('bob'[#id], 'key'[#id])");
        mind.perceive(own.clone());
        mind.update(1);
        assert_eq!(mind.short_term.len(), 1);
        assert!(mind.long_term.first_match(&own, &mind.ontology).is_none());
        // gone after perception_memory_time + 1 ticks without renewal
        for t in 2..=4 {
            mind.update(t);
        }
        assert_eq!(mind.short_term.len(), 0);
    }

    #[test]
    fn test_scheduler_services_max_anxiety_one_step_per_tick() {
        let mut mind = test_mind();
        let at_term = term(&mut mind, "space.at('bob'[#id], 'kitchen'[#id])");
        mind.add_long_term_term(
            at_term,
            Provenance::Background,
        );
        let g1 = goal(&mut mind, "space.at('bob'[#id], X:[any])");
        let g2 = goal(&mut mind, "space.at('bob'[#id], Y:[any])");
        let id1 = mind.spawn_inference(vec![vec![g1]], 1, 0, false, None, None, Vec::new());
        let id2 = mind.spawn_inference(vec![vec![g2]], 3, 0, false, None, None, Vec::new());

        mind.inference_update();
        let r1 = mind.inference.iter().find(|r| r.id == id1).unwrap();
        let r2 = mind.inference.iter().find(|r| r.id == id2).unwrap();
        // both anxieties grew by their priorities; only the max was serviced
        assert_eq!(r1.anxiety, 1);
        assert_eq!(r2.anxiety, 3);
        assert_eq!(r1.completed, 0);
        assert_eq!(r2.completed, 1);

        mind.inference_update();
        // the finished record retires; the other only accumulates anxiety
        assert!(mind.inference.iter().all(|r| r.id != id2));
        let r1 = mind.inference.iter().find(|r| r.id == id1).unwrap();
        assert_eq!(r1.anxiety, 2);
        assert_eq!(r1.completed, 0);

        mind.inference_update();
        mind.inference_update();
        assert!(mind.inference.is_empty());
    }

    #[test]
    fn test_completed_inference_fires_effect_once() {
        let mut mind = test_mind();
        let at_term = term(&mut mind, "space.at('bob'[#id], 'kitchen'[#id])");
        mind.add_long_term_term(
            at_term,
            Provenance::Background,
        );
        let mut parser = TermParser::new();
        let action = parser
            .parse_term("verb.follow('self'[#id], L:[any])", &mut mind.ontology)
            .unwrap();
        let target = parser
            .parse_term("space.at('bob'[#id], L:[any])", &mut mind.ontology)
            .unwrap();
        let target = Sentence::new(vec![target], vec![false]);
        mind.spawn_inference(
            vec![vec![target]],
            1,
            0,
            false,
            None,
            Some(Box::new(ExecuteActionEffect { action })),
            Vec::new(),
        );

        mind.inference_update();
        assert!(mind.intentions.is_empty());
        mind.inference_update();
        assert_eq!(mind.intentions.len(), 1);
        assert!(mind.inference.is_empty());
        let bound = &mind.intentions[0].action;
        assert_eq!(mind.ontology.name_of(bound.functor), "verb.follow");
        assert_eq!(bound.attributes[1].as_constant(), Some("kitchen"));
    }

    #[test]
    fn test_predicate_question_generates_answer_intention() {
        let mut mind = test_mind();
        let seen = Rc::new(RefCell::new(Vec::new()));
        mind.register_intention_handler(Box::new(Recorder {
            prefix: "action.answer.",
            seen: seen.clone(),
        }));

        let talk = talk_from(
            &mut mind,
            "bob",
            "do you own a key",
            "perf.q.predicate('self'[#id], verb.own('bob'[#id], 'key'[#id]))",
        );
        mind.perceive(talk);
        mind.update(1);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            mind.ontology.name_of(seen[0].functor),
            "action.answer.predicate"
        );
        assert_eq!(seen[0].attributes[0].as_constant(), Some("self"));
        assert_eq!(seen[0].attributes[1].as_constant(), Some("bob"));
        // the completed request is retained for "why" answers
        assert_eq!(mind.intentions_caused_by_request.len(), 1);
        assert!(mind.intentions_caused_by_request[0]
            .requesting_performative
            .is_some());
    }

    #[test]
    fn test_unanswered_question_reasked_with_callattention() {
        let mut mind = test_mind();
        mind.config.question_patience_timer = 10;
        let talk = term(
            &mut mind,
            "action.talk('self'[#id], perf.q.predicate('bob'[#id], verb.own('bob'[#id], 'key'[#id])))",
        );
        mind.intentions
            .push(IntentionRecord::new(talk, None, None, None, 1));
        mind.update(1);
        assert_eq!(mind.outbox.len(), 1);
        assert!(mind.dialogue.context_for_speaker("bob").expecting_answer());

        for t in 2..=11 {
            mind.update(t);
        }
        assert_eq!(mind.outbox.len(), 1, "patience not yet exceeded");
        mind.update(12);
        let names = outbox_names(&mind);
        assert_eq!(
            names,
            vec!["perf.q.predicate", "perf.callattention", "perf.q.predicate"]
        );
        // the repeated question re-arms the expectation stack
        assert!(mind.dialogue.context_for_speaker("bob").expecting_answer());
    }

    #[test]
    fn test_blocked_intention_stays_until_done() {
        let mut mind = test_mind();
        mind.register_intention_handler(Box::new(BlockThenDone { remaining: 2 }));
        let wait = term(&mut mind, "verb.wait('self'[#id])");
        mind.intentions
            .push(IntentionRecord::new(wait, None, None, None, 0));
        mind.update(1);
        assert_eq!(mind.intentions.len(), 1);
        mind.update(2);
        assert_eq!(mind.intentions.len(), 1);
        mind.update(3);
        assert!(mind.intentions.is_empty());
    }

    #[test]
    fn test_unsupported_intention_is_dropped() {
        let mut mind = test_mind();
        let dance = term(&mut mind, "verb.dance('self'[#id])");
        mind.intentions
            .push(IntentionRecord::new(dance, None, None, None, 0));
        mind.update(1);
        assert!(mind.intentions.is_empty());
    }

    #[test]
    fn test_queued_intentions_promote_when_idle() {
        let mut mind = test_mind();
        let talk = term(
            &mut mind,
            "action.talk('self'[#id], perf.greet('bob'[#id]))",
        );
        mind.queue_intention(talk, None, None);
        let g = goal(&mut mind, "verb.own('eva'[#id], 'sword'[#id])");
        mind.spawn_inference(vec![vec![g]], 1, 0, false, None, None, Vec::new());

        mind.update(1);
        assert!(mind.outbox.is_empty(), "deferred while inference is live");
        mind.update(2);
        assert_eq!(mind.outbox.len(), 1);
        assert!(mind.queued_intentions.is_empty());
    }

    #[test]
    fn test_greet_reply_and_expected_greet_suppressed() {
        let mut mind = test_mind();
        let talk = talk_from(&mut mind, "bob", "hi", "perf.greet('self'[#id])");
        mind.perceive(talk);
        mind.update(1);
        assert_eq!(outbox_names(&mind), vec!["perf.greet"]);
        // our reply set expecting_greet; a second greet draws no reply
        assert!(mind.dialogue.context_for_speaker("bob").expecting_greet);
        let talk = talk_from(&mut mind, "bob", "hello again", "perf.greet('self'[#id])");
        mind.perceive(talk);
        mind.update(2);
        assert_eq!(mind.outbox.len(), 1);
    }

    #[test]
    fn test_talk_addressed_to_someone_else_is_ignored() {
        let mut mind = test_mind();
        let talk = talk_from(&mut mind, "bob", "hi eva", "perf.greet('eva'[#id])");
        mind.perceive(talk);
        mind.update(1);
        assert!(mind.outbox.is_empty());
        assert!(mind.intentions.is_empty());
    }

    #[test]
    fn test_invalid_answer_reissues_question() {
        let mut mind = test_mind();
        let talk = term(
            &mut mind,
            "action.talk('self'[#id], perf.q.predicate('bob'[#id], verb.own('bob'[#id], 'key'[#id])))",
        );
        mind.intentions
            .push(IntentionRecord::new(talk, None, None, None, 1));
        mind.update(1);
        assert!(mind.dialogue.context_for_speaker("bob").expecting_answer());

        // a greeting is no answer to a predicate question
        let talk = talk_from(&mut mind, "bob", "hello", "perf.greet('self'[#id])");
        mind.perceive(talk);
        mind.update(2);
        let names = outbox_names(&mind);
        assert_eq!(
            names,
            vec!["perf.q.predicate", "perf.ack.invalidanswer", "perf.q.predicate"]
        );
        assert!(mind.dialogue.context_for_speaker("bob").expecting_answer());
    }

    #[test]
    fn test_yes_answer_memorizes_predicate_content() {
        let mut mind = test_mind();
        let talk = term(
            &mut mind,
            "action.talk('self'[#id], perf.q.predicate('bob'[#id], verb.own('bob'[#id], 'key'[#id])))",
        );
        mind.intentions
            .push(IntentionRecord::new(talk, None, None, None, 1));
        mind.update(1);

        let talk = talk_from(&mut mind, "bob", "yes", "perf.inform('self'[#id], 'yes'[symbol])");
        mind.perceive(talk);
        mind.update(2);

        let q = term(&mut mind, "verb.own('bob'[#id], 'key'[#id])");
        assert!(mind.no_inference_query(&q).is_some());
        assert!(!mind.dialogue.context_for_speaker("bob").expecting_answer());
    }

    #[test]
    fn test_no_answer_memorizes_negation() {
        let mut mind = test_mind();
        let talk = term(
            &mut mind,
            "action.talk('self'[#id], perf.q.predicate('bob'[#id], verb.own('bob'[#id], 'key'[#id])))",
        );
        mind.intentions
            .push(IntentionRecord::new(talk, None, None, None, 1));
        mind.update(1);

        let talk = talk_from(&mut mind, "bob", "no", "perf.inform('self'[#id], 'no'[symbol])");
        mind.perceive(talk);
        mind.update(2);

        // the denial is remembered as a negative sentence
        let own = term(&mut mind, "verb.own('bob'[#id], 'key'[#id])");
        let negative = Sentence::new(vec![own.clone()], vec![false]);
        assert!(mind
            .long_term
            .iter()
            .any(|e| e.sentence.structural_eq(&negative)));
        assert!(mind.no_inference_query(&own).is_none());
        assert!(!mind.dialogue.context_for_speaker("bob").expecting_answer());
    }

    #[test]
    fn test_action_request_with_variables_spawns_inference() {
        let mut mind = test_mind();
        let seen = Rc::new(RefCell::new(Vec::new()));
        mind.register_intention_handler(Box::new(Recorder {
            prefix: "verb.follow",
            seen: seen.clone(),
        }));
        let at_term = term(&mut mind, "space.at('bob'[#id], 'garden'[#id])");
        mind.add_long_term_term(
            at_term,
            Provenance::Background,
        );
        // "follow bob, wherever he is": the request carries an open variable
        let talk = talk_from(
            &mut mind,
            "bob",
            "follow me",
            "perf.request.action('self'[#id], verb.follow('self'[#id], W:[any]), space.at('bob'[#id], W))",
        );
        mind.perceive(talk);
        mind.update(1);
        assert_eq!(mind.inference.len(), 1);
        assert_eq!(
            mind.inference[0].triggered_by_speaker.as_deref(),
            Some("bob")
        );

        mind.update(2); // one resolution step: the search completes
        mind.update(3); // retire + effect queues the bound action + executes it
        assert!(mind.inference.is_empty());
        let done = &mind.intentions_caused_by_request;
        assert!(done
            .iter()
            .any(|r| mind.ontology.name_of(r.action.functor) == "verb.follow"
                && r.action.attributes[1].as_constant() == Some("garden")));
    }

    #[test]
    fn test_action_request_without_handler_is_denied() {
        let mut mind = test_mind();
        let talk = talk_from(
            &mut mind,
            "bob",
            "dance",
            "perf.request.action('self'[#id], verb.dance('self'[#id]))",
        );
        mind.perceive(talk);
        mind.update(1);
        assert_eq!(outbox_names(&mind), vec!["perf.ack.denyrequest"]);
    }

    #[test]
    fn test_moreresults_pages_in_batches_with_etcetera() {
        let mut mind = test_mind();
        let question = term(&mut mind, "perf.q.query(V:[any], verb.own('bob'[#id], V))");
        let id_sort = mind.sorts.id;
        let answers: Vec<TermAttribute> = (0..5)
            .map(|i| TermAttribute::constant(format!("item{i}"), id_sort))
            .collect();
        mind.dialogue
            .context_for_speaker("bob")
            .set_enumerated_answers(question, answers, 0);

        let talk = talk_from(&mut mind, "bob", "more", "perf.moreresults('self'[#id])");
        mind.perceive(talk);
        mind.update(1);
        assert_eq!(mind.outbox.len(), 1);
        let first = mind.outbox[0].performative.render(&mind.ontology);
        assert!(first.contains("etcetera"), "{first}");
        assert!(mind.dialogue.context_for_speaker("bob").expecting_thank_you);

        let talk = talk_from(&mut mind, "bob", "and more", "perf.moreresults('self'[#id])");
        mind.perceive(talk);
        mind.update(2);
        assert_eq!(mind.outbox.len(), 2);
        let second = mind.outbox[1].performative.render(&mind.ontology);
        assert!(!second.contains("etcetera"), "{second}");
        assert!(second.contains("item4"), "{second}");

        // exhausted: no matches left
        let talk = talk_from(&mut mind, "bob", "even more", "perf.moreresults('self'[#id])");
        mind.perceive(talk);
        mind.update(3);
        let third = mind.outbox[2].performative.render(&mind.ontology);
        assert!(third.contains("no-matches-found"), "{third}");
    }

    #[test]
    fn test_parse_error_reaction() {
        let mut mind = test_mind();
        // establish a conversation first
        let talk = talk_from(&mut mind, "bob", "hi", "perf.greet('self'[#id])");
        mind.perceive(talk);
        mind.update(1);
        mind.react_to_parse_error("bob", crate::reaction::ParseFailureKind::UnrecognizedToken(
            "frobnicate".to_string(),
        ));
        mind.update(2);
        let names = outbox_names(&mind);
        assert_eq!(names.last().map(String::as_str), Some("perf.inform.parseerror"));
    }

    #[test]
    fn test_recalculate_character_ages_upserts() {
        let mut mind = test_mind();
        let year = crate::calendar::SECONDS_PER_DAY
            * crate::calendar::DAYS_PER_MONTH
            * crate::calendar::MONTHS_PER_YEAR;
        let born = term(&mut mind, "property.born('bob'[#id], 'e'[any])");
        mind.long_term
            .add_sentence(Sentence::fact(born), Provenance::Background, 1, 0);
        mind.time = 2 * year + 5;
        mind.recalculate_character_ages();
        let q = term(&mut mind, "property.age('bob'[#id], A:[any])");
        let age = mind.no_inference_query_value(&q, "A").unwrap();
        assert_eq!(age.as_constant(), Some("2"));

        // a year later the fact is replaced, not duplicated
        mind.time = 3 * year + 5;
        mind.recalculate_character_ages();
        let age = mind.no_inference_query_value(&q, "A").unwrap();
        assert_eq!(age.as_constant(), Some("3"));
        assert_eq!(
            mind.long_term
                .all_matches(&q, &mind.ontology)
                .len(),
            1
        );
    }

    #[test]
    fn test_most_specific_matches_prunes_general_duplicates() {
        let mut mind = test_mind();
        let at = mind.sorts.space_at;
        let indoor = mind.ontology.sort("space.at.indoor", &[at]);
        let id = mind.sorts.id;
        let general = Term::new(
            at,
            vec![
                TermAttribute::constant("bob", id),
                TermAttribute::constant("kitchen", id),
            ],
        );
        let specific = Term::new(
            indoor,
            vec![
                TermAttribute::constant("bob", id),
                TermAttribute::constant("kitchen", id),
            ],
        );
        mind.long_term
            .add_sentence(Sentence::fact(general), Provenance::Background, 1, 0);
        mind.long_term
            .add_sentence(Sentence::fact(specific), Provenance::Background, 1, 0);
        let query = term(&mut mind, "space.at('bob'[#id], [any])");
        let matches = mind.most_specific_matches(&query);
        assert_eq!(matches.len(), 1);
        assert_eq!(mind.ontology.name_of(matches[0].functor), "space.at.indoor");
    }
}
