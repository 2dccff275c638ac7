//! Reaction engine - speech-act dispatch.
//!
//! Fires on newly-added long-term talk facts, decides addressing, then runs
//! a two-phase dispatcher: pending expectations (answers, confirmations)
//! first, then the per-kind default responses. Performative kinds form a
//! closed enumeration so dispatch is an exhaustive `match`.

use term_logic::{Bindings, Ontology, Sentence, Term, TermAttribute};
use tracing::{debug, error, warn};

use crate::inference::ExecuteActionEffect;
use crate::intention::IntentionRecord;
use crate::mind::Mind;

/// The closed set of performative kinds the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformativeKind {
    CallAttention,
    Greet,
    Farewell,
    ThankYou,
    YouAreWelcome,
    HowAreYou,
    AckOk,
    AckContradict,
    AckDenyRequest,
    Inform,
    InformAnswer,
    QPredicate,
    QPredicateNegated,
    QWhereIs,
    QWhereTo,
    QWhoIsName,
    QWhoIsNoName,
    QWhatIsName,
    QWhatIsNoName,
    QQuery,
    QQueryFollowup,
    QHowMany,
    QWhen,
    QWhy,
    QHow,
    QAction,
    RequestAction,
    MoreResults,
    Unknown,
}

impl PerformativeKind {
    /// Classify by functor name; anything unrecognized is `Unknown` and is
    /// logged and dropped by the dispatcher.
    pub fn classify(performative: &Term, ont: &Ontology) -> Self {
        match ont.name_of(performative.functor) {
            "perf.callattention" => Self::CallAttention,
            "perf.greet" => Self::Greet,
            "perf.farewell" => Self::Farewell,
            "perf.thankyou" => Self::ThankYou,
            "perf.youarewelcome" => Self::YouAreWelcome,
            "perf.q.howareyou" => Self::HowAreYou,
            "perf.ack.ok" => Self::AckOk,
            "perf.ack.contradict" => Self::AckContradict,
            "perf.ack.denyrequest" => Self::AckDenyRequest,
            "perf.inform" => Self::Inform,
            "perf.inform.answer" => Self::InformAnswer,
            "perf.q.predicate" => Self::QPredicate,
            "perf.q.predicate-negated" => Self::QPredicateNegated,
            "perf.q.whereis" => Self::QWhereIs,
            "perf.q.whereto" => Self::QWhereTo,
            "perf.q.whois.name" => Self::QWhoIsName,
            "perf.q.whois.noname" => Self::QWhoIsNoName,
            "perf.q.whatis.name" => Self::QWhatIsName,
            "perf.q.whatis.noname" => Self::QWhatIsNoName,
            "perf.q.query" => Self::QQuery,
            "perf.q.query-followup" => Self::QQueryFollowup,
            "perf.q.howmany" => Self::QHowMany,
            "perf.q.when" => Self::QWhen,
            "perf.q.why" => Self::QWhy,
            "perf.q.how" => Self::QHow,
            "perf.q.action" => Self::QAction,
            "perf.request.action" => Self::RequestAction,
            "perf.moreresults" => Self::MoreResults,
            _ => Self::Unknown,
        }
    }

    /// The answer-intention family a question kind maps to, if any.
    fn answer_family(&self) -> Option<&'static str> {
        match self {
            Self::QPredicate => Some("action.answer.predicate"),
            Self::QPredicateNegated => Some("action.answer.predicate-negated"),
            Self::QWhereIs => Some("action.answer.whereis"),
            Self::QWhereTo => Some("action.answer.whereto"),
            Self::QWhoIsName => Some("action.answer.whois.name"),
            Self::QWhoIsNoName => Some("action.answer.whois.noname"),
            Self::QWhatIsName => Some("action.answer.whatis.name"),
            Self::QWhatIsNoName => Some("action.answer.whatis.noname"),
            Self::QQuery => Some("action.answer.query"),
            Self::QQueryFollowup => Some("action.answer.query-followup"),
            Self::QHowMany => Some("action.answer.howmany"),
            Self::QWhen => Some("action.answer.when"),
            Self::QWhy => Some("action.answer.why"),
            Self::QHow => Some("action.answer.how"),
            _ => None,
        }
    }
}

/// How the host parser failed on an utterance addressed to us.
#[derive(Debug, Clone)]
pub enum ParseFailureKind {
    Semantic,
    NoReferents(String),
    CannotDisambiguate(String),
    UnrecognizedToken(String),
    Grammatical,
}

impl Mind {
    /// Fires on a newly-added long-term fact. Perceived talk by someone
    /// else, addressed to us, has its listener slot unified with ourselves
    /// and is dispatched; everything else is ignored.
    pub(crate) fn reactive_behavior_update(&mut self, t: &Term) {
        if !self.ontology.is_a(t.functor, self.sorts.action_talk) {
            return;
        }
        if t.attributes.len() < 4 {
            return;
        }
        let (Some(speaker), Some(text), Some(performative)) = (
            t.attributes[1].as_constant(),
            t.attributes[2].as_constant(),
            t.attributes[3].as_subterm(),
        ) else {
            return;
        };
        let speaker = speaker.to_string();
        let text = text.to_string();
        let performative = performative.clone();
        if speaker == self.self_id {
            return;
        }

        let ctx_idx = self.dialogue.context_index_for_speaker(&speaker);
        if !self.talking_to_us(ctx_idx, Some(&performative)) {
            return;
        }
        let perf = self.unify_listener(&performative);

        self.dialogue.contexts[ctx_idx].in_conversation = true;
        let intentions_before = self.intentions.len();
        self.react_to_performative(&perf, &speaker, ctx_idx);
        let perf_index = self.dialogue.contexts[ctx_idx].record_performative(
            speaker.clone(),
            Some(text),
            perf,
            self.time,
        );
        // back-fill the provoking performative into the new intentions
        for i in intentions_before..self.intentions.len() {
            if self.intentions[i].requesting_performative.is_none() {
                self.intentions[i].requesting_performative = Some((speaker.clone(), perf_index));
            }
        }
    }

    /// Replace an unbound listener slot with our own id.
    pub(crate) fn unify_listener(&self, performative: &Term) -> Term {
        let mut out = performative.clone();
        if let Some(first) = out.attributes.first_mut() {
            if matches!(first, TermAttribute::Variable { .. }) {
                *first = TermAttribute::constant(self.self_id.clone(), self.sorts.id);
            }
        }
        out
    }

    /// Two-phase dispatch of an addressed performative.
    pub(crate) fn react_to_performative(&mut self, perf: &Term, speaker: &str, ctx_idx: usize) {
        let kind = PerformativeKind::classify(perf, &self.ontology);
        let name = self.ontology.name_of(perf.functor).to_string();
        let speaker_attr = TermAttribute::constant(speaker, self.sorts.id);
        let mut handled = false;
        let mut new_expecting_thank_you = false;

        let (expecting_answer, expecting_confirmation) = {
            let ctx = &self.dialogue.contexts[ctx_idx];
            (ctx.expecting_answer(), ctx.expecting_confirmation())
        };

        // Phase 1: pending expectations.
        if expecting_answer {
            if name == "perf.inform" {
                if self
                    .react_to_answer_performative(perf, speaker, ctx_idx)
                    .is_none()
                {
                    // memorize what they said anyway, then complain and re-ask
                    if let Some(content) = perf.attributes.get(1) {
                        let memorize = self.memorize_intention_term(speaker, content.clone());
                        self.intentions.push(IntentionRecord::new(
                            memorize, None, None, None, self.time,
                        ));
                    }
                    self.push_invalid_answer_and_reask(speaker, ctx_idx);
                }
                handled = true;
            } else if self.is_perf(perf, "perf.inform.answer") || self.is_perf(perf, "perf.ack.ok")
            {
                if self
                    .react_to_answer_performative(perf, speaker, ctx_idx)
                    .is_none()
                {
                    self.push_invalid_answer_and_reask(speaker, ctx_idx);
                }
                handled = true;
            } else if self.is_perf(perf, "perf.question")
                || self.is_perf(perf, "perf.request.action")
            {
                // accepted; handled by the default dispatch below
            } else {
                self.push_invalid_answer_and_reask(speaker, ctx_idx);
                handled = true;
            }
        } else if expecting_confirmation {
            if self.is_perf(perf, "perf.ack.ok") {
                self.dialogue.contexts[ctx_idx].clear_confirmations();
                handled = true;
            } else if self.is_perf(perf, "perf.ack.denyrequest") {
                self.dialogue.contexts[ctx_idx].clear_confirmations();
                handled = true;
                self.push_reply(
                    &format!("perf.ack.ok('{speaker}'[#id])"),
                    Some(speaker_attr.clone()),
                );
            }
            // Intentionally not chained to the branches above: a
            // performative matching both checks runs both.
            if self.is_perf(perf, "perf.inform.answer") {
                self.dialogue.contexts[ctx_idx].clear_confirmations();
                handled = true;
                if perf.attributes.get(1).and_then(|a| a.as_constant()) == Some("no") {
                    self.push_reply(
                        &format!("perf.ack.ok('{speaker}'[#id])"),
                        Some(speaker_attr.clone()),
                    );
                }
            }
        }

        // Phase 2: default dispatch by kind.
        if !handled {
            match kind {
                PerformativeKind::CallAttention => {
                    self.push_reply(
                        &format!("perf.inform.answer('{speaker}'[#id],'yes'[symbol])"),
                        Some(speaker_attr.clone()),
                    );
                }
                PerformativeKind::Greet => {
                    if !self.dialogue.contexts[ctx_idx].expecting_greet {
                        self.push_reply(
                            &format!("perf.greet('{speaker}'[#id])"),
                            Some(speaker_attr.clone()),
                        );
                    }
                }
                PerformativeKind::Farewell => {
                    if !self.dialogue.contexts[ctx_idx].expecting_farewell {
                        self.push_reply(
                            &format!("perf.farewell('{speaker}'[#id])"),
                            Some(speaker_attr.clone()),
                        );
                    }
                    self.dialogue.contexts[ctx_idx].in_conversation = false;
                }
                PerformativeKind::ThankYou => {
                    if self.dialogue.contexts[ctx_idx].expecting_thank_you {
                        self.push_reply(
                            &format!("perf.youarewelcome('{speaker}'[#id])"),
                            Some(speaker_attr.clone()),
                        );
                    }
                }
                PerformativeKind::YouAreWelcome
                | PerformativeKind::AckOk
                | PerformativeKind::InformAnswer => {}
                PerformativeKind::AckContradict => {
                    error!(
                        performative = %perf.render(&self.ontology),
                        "no reaction defined for a contradiction acknowledgement"
                    );
                }
                PerformativeKind::HowAreYou => {
                    self.push_reply(
                        &format!("perf.inform.answer('{speaker}'[#id],'fine'[symbol])"),
                        Some(speaker_attr.clone()),
                    );
                }
                PerformativeKind::Inform => {
                    if let Some(content) = perf.attributes.get(1) {
                        let memorize = self.memorize_intention_term(speaker, content.clone());
                        self.intentions.push(IntentionRecord::new(
                            memorize,
                            Some(speaker_attr.clone()),
                            None,
                            None,
                            self.time,
                        ));
                    }
                }
                PerformativeKind::QPredicate
                | PerformativeKind::QPredicateNegated
                | PerformativeKind::QWhatIsName
                | PerformativeKind::QWhatIsNoName
                | PerformativeKind::QQueryFollowup => {
                    if let Some(family) = kind.answer_family() {
                        let extra: Vec<TermAttribute> =
                            perf.attributes.get(1).cloned().into_iter().collect();
                        self.push_answer_intention(family, speaker, extra, &speaker_attr);
                    }
                }
                PerformativeKind::QWhereIs
                | PerformativeKind::QWhereTo
                | PerformativeKind::QWhoIsName
                | PerformativeKind::QWhoIsNoName
                | PerformativeKind::QWhen
                | PerformativeKind::QWhy
                | PerformativeKind::QHow => {
                    if let Some(family) = kind.answer_family() {
                        let extra: Vec<TermAttribute> =
                            perf.attributes.iter().skip(1).cloned().collect();
                        self.push_answer_intention(family, speaker, extra, &speaker_attr);
                    }
                }
                PerformativeKind::QQuery | PerformativeKind::QHowMany => {
                    if let Some(family) = kind.answer_family() {
                        let extra = vec![TermAttribute::Subterm(perf.clone())];
                        self.push_answer_intention(family, speaker, extra, &speaker_attr);
                    }
                }
                PerformativeKind::RequestAction | PerformativeKind::QAction => {
                    self.react_to_action_request(perf, speaker, &speaker_attr);
                }
                PerformativeKind::MoreResults => {
                    new_expecting_thank_you =
                        self.react_to_more_results(speaker, ctx_idx, &speaker_attr);
                }
                PerformativeKind::AckDenyRequest => {
                    self.push_reply(
                        &format!("perf.ack.ok('{speaker}'[#id])"),
                        Some(speaker_attr.clone()),
                    );
                }
                PerformativeKind::Unknown => {
                    error!(
                        performative = %perf.render(&self.ontology),
                        "unknown performative, dropped"
                    );
                }
            }
        }

        let ctx = &mut self.dialogue.contexts[ctx_idx];
        ctx.expecting_thank_you = new_expecting_thank_you;
        ctx.expecting_you_are_welcome = false;
        ctx.expecting_greet = false;
        ctx.expecting_farewell = false;
    }

    /// An action request either spawns an inference (when the request still
    /// carries unbound variables), queues the action directly (when some
    /// handler is capable), or is denied.
    fn react_to_action_request(
        &mut self,
        perf: &Term,
        speaker: &str,
        speaker_attr: &TermAttribute,
    ) {
        let Some(action) = perf.attributes.get(1).and_then(|a| a.as_subterm()).cloned() else {
            self.push_reply(
                &format!("perf.ack.denyrequest('{speaker}'[#id])"),
                Some(speaker_attr.clone()),
            );
            return;
        };

        if let Some(condition) = perf.attributes.get(2).and_then(|a| a.as_subterm()).cloned() {
            let mut terms = Vec::new();
            let mut signs = Vec::new();
            for conjunct in condition.conjunct_terms(&self.ontology) {
                if self.ontology.name_of(conjunct.functor) == "#not" {
                    if let Some(inner) = conjunct.attributes.first().and_then(|a| a.as_subterm())
                    {
                        terms.push(inner.clone());
                        signs.push(true);
                    }
                } else {
                    terms.push(conjunct);
                    signs.push(false);
                }
            }
            let target = Sentence::new(terms, signs);
            let id = self.spawn_inference(
                vec![vec![target]],
                1,
                0,
                false,
                None,
                Some(Box::new(ExecuteActionEffect { action })),
                Vec::new(),
            );
            if let Some(record) = self.inference.iter_mut().find(|r| r.id == id) {
                record.triggered_by = Some(perf.clone());
                record.triggered_by_speaker = Some(speaker.to_string());
            }
        } else if self.can_satisfy_action_request(&action) {
            self.intentions.push(IntentionRecord::new(
                action,
                Some(speaker_attr.clone()),
                None,
                None,
                self.time,
            ));
        } else {
            self.push_reply(
                &format!("perf.ack.denyrequest('{speaker}'[#id])"),
                Some(speaker_attr.clone()),
            );
        }
    }

    /// Page out the next batch of a stored answer list. Returns the new
    /// expecting-thank-you flag.
    fn react_to_more_results(
        &mut self,
        speaker: &str,
        ctx_idx: usize,
        speaker_attr: &TermAttribute,
    ) -> bool {
        let Some(mut cursor) = self.dialogue.contexts[ctx_idx].last_enumerated_question.clone()
        else {
            self.push_reply(
                &format!(
                    "perf.inform('{speaker}'[#id],#not(verb.understand('{}'[#id])))",
                    self.self_id
                ),
                Some(speaker_attr.clone()),
            );
            return false;
        };

        if cursor.next_answer_index >= cursor.answers.len() {
            self.push_reply(
                &format!("perf.inform.answer('{speaker}'[#id],'no-matches-found'[symbol])"),
                Some(speaker_attr.clone()),
            );
            return true;
        }

        let and = self.sorts.and_list;
        let remaining = cursor.answers.len() - cursor.next_answer_index;
        let batch = self.config.max_answers_per_query;
        let results = if remaining > batch {
            let mut acc = TermAttribute::constant("etcetera", self.sorts.etcetera);
            for _ in 0..batch {
                let answer = cursor.answers[cursor.next_answer_index].clone();
                acc = TermAttribute::Subterm(Term::new(and, vec![answer, acc]));
                cursor.next_answer_index += 1;
            }
            acc
        } else {
            let mut acc: Option<TermAttribute> = None;
            while cursor.next_answer_index < cursor.answers.len() {
                let answer = cursor.answers[cursor.next_answer_index].clone();
                acc = Some(match acc {
                    None => answer,
                    Some(prev) => TermAttribute::Subterm(Term::new(and, vec![answer, prev])),
                });
                cursor.next_answer_index += 1;
            }
            match acc {
                Some(a) => a,
                None => return false,
            }
        };

        let inform = Term::new(
            self.ontology.get_or_insert("perf.inform.answer"),
            vec![speaker_attr.clone(), results],
        );
        let talk = Term::new(
            self.sorts.action_talk,
            vec![
                TermAttribute::constant(self.self_id.clone(), self.sorts.id),
                TermAttribute::Subterm(inform),
            ],
        );
        self.intentions.push(IntentionRecord::new(
            talk,
            Some(speaker_attr.clone()),
            None,
            None,
            self.time,
        ));
        self.dialogue.contexts[ctx_idx].last_enumerated_question = Some(cursor);
        true
    }

    /// Test an incoming performative against the type of the outstanding
    /// question. `None` means the answer was rejected as malformed; a valid
    /// (possibly empty) reaction pops the question.
    pub(crate) fn react_to_answer_performative(
        &mut self,
        perf: &Term,
        speaker: &str,
        ctx_idx: usize,
    ) -> Option<Vec<Term>> {
        let last_question = self.dialogue.contexts[ctx_idx]
            .last_question()?
            .performative
            .clone();
        debug!(
            answer = %perf.render(&self.ontology),
            question = %last_question.render(&self.ontology),
            "checking whether the performative answers the outstanding question"
        );

        if self.is_perf(&last_question, "perf.q.predicate") {
            if self.is_perf(perf, "perf.inform") && perf.attributes.len() == 2 {
                match &perf.attributes[1] {
                    TermAttribute::Constant { value, .. } => match value.as_str() {
                        "yes" => {
                            let to_memorize = self
                                .sentence_to_memorize_from_predicate_question(&last_question, true);
                            self.commit_answer(to_memorize, speaker, ctx_idx)
                        }
                        "no" => {
                            let to_memorize = self
                                .sentence_to_memorize_from_predicate_question(&last_question, false);
                            self.commit_answer(to_memorize, speaker, ctx_idx)
                        }
                        "unknown" => {
                            self.dialogue.contexts[ctx_idx].pop_last_question();
                            Some(Vec::new())
                        }
                        other => {
                            error!(answer = other, "unsupported answer to a predicate question");
                            None
                        }
                    },
                    _ => {
                        let to_memorize = self
                            .sentence_to_memorize_from_predicate_question_with_inform_answer(
                                &last_question,
                                perf,
                            );
                        self.commit_answer(to_memorize, speaker, ctx_idx)
                    }
                }
            } else {
                error!(
                    answer = %perf.render(&self.ontology),
                    "unsupported answer to a predicate question"
                );
                None
            }
        } else if self.is_perf(&last_question, "perf.q.query") {
            if self.is_perf(perf, "perf.inform") {
                let to_memorize =
                    self.sentence_to_memorize_from_query_question(&last_question, perf);
                self.commit_answer(to_memorize, speaker, ctx_idx)
            } else {
                error!(
                    answer = %perf.render(&self.ontology),
                    "unsupported answer to a query question"
                );
                None
            }
        } else if self.is_perf(&last_question, "perf.q.action") {
            if (self.is_perf(perf, "perf.inform") && perf.attributes.len() == 2)
                || (self.is_perf(perf, "perf.inform.answer") && perf.attributes.len() == 3)
            {
                if perf.attributes.len() == 3 {
                    let answer_predicate = perf.attributes[2].as_subterm();
                    let question_predicate =
                        last_question.attributes.get(1).and_then(|a| a.as_subterm());
                    let (Some(ap), Some(qp)) = (answer_predicate, question_predicate) else {
                        debug!("predicates of an action answer are not terms");
                        return None;
                    };
                    if !ap.structural_eq(qp) {
                        debug!("action answer predicate does not match the question");
                        return None;
                    }
                }
                match perf.attributes[1].as_constant() {
                    Some("yes") | Some("no") | Some("unknown") => {
                        self.dialogue.contexts[ctx_idx].pop_last_question();
                        Some(Vec::new())
                    }
                    _ => {
                        error!(
                            answer = %perf.render(&self.ontology),
                            "unsupported answer to an action question"
                        );
                        None
                    }
                }
            } else if self.is_perf(perf, "perf.ack.ok") {
                self.dialogue.contexts[ctx_idx].pop_last_question();
                Some(Vec::new())
            } else {
                error!(
                    answer = %perf.render(&self.ontology),
                    "unsupported answer to an action question"
                );
                None
            }
        } else {
            error!(
                question = %last_question.render(&self.ontology),
                "answers to this question type are not supported yet"
            );
            None
        }
    }

    /// Shared tail of the valid/invalid answer paths: memorize a valid
    /// answer's content; rejected-as-malformed stays the caller's problem.
    fn commit_answer(
        &mut self,
        to_memorize: Option<Vec<Term>>,
        speaker: &str,
        ctx_idx: usize,
    ) -> Option<Vec<Term>> {
        match to_memorize {
            None => {
                self.push_invalid_answer_and_reask(speaker, ctx_idx);
                Some(Vec::new())
            }
            Some(terms) => {
                let speaker_attr = TermAttribute::constant(speaker, self.sorts.id);
                for t in terms {
                    let memorize =
                        self.memorize_intention_term(speaker, TermAttribute::Subterm(t));
                    self.intentions.push(IntentionRecord::new(
                        memorize,
                        Some(speaker_attr.clone()),
                        None,
                        None,
                        self.time,
                    ));
                }
                self.dialogue.contexts[ctx_idx].pop_last_question();
                Some(Vec::new())
            }
        }
    }

    /// `Some(vec![])` = nothing applicable to memorize; `None` = the answer
    /// is rejected as malformed. Call sites treat the two differently.
    pub(crate) fn sentence_to_memorize_from_predicate_question(
        &self,
        question: &Term,
        answer: bool,
    ) -> Option<Vec<Term>> {
        let Some(query_term) = question.attributes.get(1).and_then(|a| a.as_subterm()) else {
            return Some(Vec::new());
        };
        // variables mean there was a query involved; nothing to memorize
        if !query_term.variables().is_empty() {
            return Some(Vec::new());
        }
        let query_attrs = query_term.conjunct_attributes(&self.ontology);
        if answer {
            Some(
                query_attrs
                    .iter()
                    .filter_map(|a| a.as_subterm().cloned())
                    .collect(),
            )
        } else {
            // at least one conjunct is wrong
            let not = self.sorts.negation;
            let and = self.sorts.and_list;
            let first = query_attrs.first()?;
            let mut to_memorize = Term::new(not, vec![first.clone()]);
            for qt in query_attrs.iter().skip(1) {
                to_memorize = Term::new(
                    and,
                    vec![
                        TermAttribute::Subterm(to_memorize),
                        TermAttribute::Subterm(Term::new(not, vec![qt.clone()])),
                    ],
                );
            }
            Some(vec![to_memorize])
        }
    }

    /// A predicate question answered with content instead of yes/no. Only
    /// remember/know questions hide a query this way.
    pub(crate) fn sentence_to_memorize_from_predicate_question_with_inform_answer(
        &self,
        question: &Term,
        answer_perf: &Term,
    ) -> Option<Vec<Term>> {
        let answer_attr = self.unwrap_proper_noun(answer_perf.attributes.get(1)?.clone());

        let Some(query_sub) = question.attributes.get(1).and_then(|a| a.as_subterm()) else {
            return Some(Vec::new());
        };
        let conjuncts = query_sub.conjunct_attributes(&self.ontology);
        let Some(main_query) = conjuncts.first().and_then(|a| a.as_subterm()) else {
            return Some(Vec::new());
        };
        let main_name = self.ontology.name_of(main_query.functor);
        if main_name != "verb.remember" && main_name != "verb.know" {
            return None;
        }

        // replace the query term by the hidden one inside
        let inner = main_query.attributes.get(1).and_then(|a| a.as_subterm())?;
        let inner_conjuncts = inner.conjunct_attributes(&self.ontology);
        if inner_conjuncts.len() != 2 {
            return None;
        }
        let query_marker = inner_conjuncts[0].as_subterm()?;
        inner_conjuncts[1].as_subterm()?;
        if self.ontology.name_of(query_marker.functor) != "#query" {
            return None;
        }
        let query_variable = query_marker.attributes.first()?.clone();
        let query_term = inner_conjuncts[1].clone();
        self.memorize_from_answer(&query_variable, &query_term, &answer_attr)
    }

    /// A direct query question (`perf.q.query(V, Q)`) answered by an inform.
    pub(crate) fn sentence_to_memorize_from_query_question(
        &self,
        question: &Term,
        answer_perf: &Term,
    ) -> Option<Vec<Term>> {
        let query_variable = question.attributes.get(1)?.clone();
        let query_term = question.attributes.get(2)?.clone();
        let answer_attr = self.unwrap_proper_noun(answer_perf.attributes.get(1)?.clone());
        self.memorize_from_answer(&query_variable, &query_term, &answer_attr)
    }

    fn unwrap_proper_noun(&self, attr: TermAttribute) -> TermAttribute {
        if let TermAttribute::Subterm(t) = &attr {
            if self.ontology.name_of(t.functor) == "proper-noun" {
                if let Some(first) = t.attributes.first() {
                    return first.clone();
                }
            }
        }
        attr
    }

    /// Bind a direct or indirect answer into the query term.
    fn memorize_from_answer(
        &self,
        query_variable: &TermAttribute,
        query_term: &TermAttribute,
        answer: &TermAttribute,
    ) -> Option<Vec<Term>> {
        match answer {
            TermAttribute::Variable { sort, .. } => {
                if self.ontology.name_of(*sort) == "unknown" {
                    Some(Vec::new())
                } else {
                    None
                }
            }
            TermAttribute::Constant { .. } => {
                let mut bindings = Bindings::new();
                if TermAttribute::unify(query_variable, answer, &self.ontology, &mut bindings) {
                    let applied = query_term.apply_bindings(&bindings);
                    applied.as_subterm().map(|t| vec![t.clone()])
                } else {
                    None
                }
            }
            TermAttribute::Subterm(_) => {
                let mut bindings = Bindings::new();
                if TermAttribute::unify(query_term, answer, &self.ontology, &mut bindings) {
                    let applied = query_term.apply_bindings(&bindings);
                    applied.as_subterm().map(|t| vec![t.clone()])
                } else {
                    None
                }
            }
        }
    }

    /// Supplement to perception: the host parser failed on an utterance. If
    /// the speaker was talking to us, explain what went wrong.
    pub fn react_to_parse_error(&mut self, speaker: &str, kind: ParseFailureKind) {
        let Some(ctx_idx) = self.dialogue.existing_context_index(speaker) else {
            debug!(speaker, "no context; not reacting to the parse error");
            return;
        };
        if !self.talking_to_us(ctx_idx, None) {
            debug!(speaker, "not in conversation; not reacting to the parse error");
            return;
        }
        let me = self.self_id.clone();
        let inner = match kind {
            ParseFailureKind::Semantic => format!(
                "perf.inform.parseerror('{speaker}'[#id], #not(verb.understand('{me}'[#id], #and(S:[sentence], the(S, [singular])))))"
            ),
            ParseFailureKind::NoReferents(what) => format!(
                "perf.inform.parseerror('{speaker}'[#id], #not(verb.see('{me}'[#id], '{what}'[symbol])))"
            ),
            ParseFailureKind::CannotDisambiguate(what) => format!(
                "perf.inform.parseerror('{speaker}'[#id], #not(verb.can('{me}'[#id], verb.disambiguate('{me}'[#id], '{what}'[symbol]))))"
            ),
            ParseFailureKind::UnrecognizedToken(token) => format!(
                "perf.inform.parseerror('{speaker}'[#id], #not(verb.understand('{me}'[#id], '{token}'[symbol])))"
            ),
            ParseFailureKind::Grammatical => format!(
                "perf.inform.parseerror('{speaker}'[#id], #not(verb.can('{me}'[#id], verb.parse('{me}'[#id], #and(S:[sentence], the(S, [singular]))))))"
            ),
        };
        self.push_reply(&inner, None);
    }

    // -- small shared builders ------------------------------------------

    pub(crate) fn is_perf(&self, t: &Term, sort_name: &str) -> bool {
        self.ontology
            .get_sort(sort_name)
            .is_some_and(|s| self.ontology.is_a(t.functor, s))
    }

    /// Queue `action.talk(self, <inner>)` built from a reply template.
    pub(crate) fn push_reply(&mut self, inner: &str, requester: Option<TermAttribute>) {
        let text = format!("action.talk('{}'[#id], {})", self.self_id, inner);
        match Term::from_string(&text, &mut self.ontology) {
            Ok(t) => self
                .intentions
                .push(IntentionRecord::new(t, requester, None, None, self.time)),
            Err(e) => warn!(error = %e, text = %text, "failed to build a reply term"),
        }
    }

    /// Queue a full talk intention from source text (no requester).
    pub(crate) fn push_parsed_talk_intention(&mut self, text: &str) {
        match Term::from_string(text, &mut self.ontology) {
            Ok(t) => self
                .intentions
                .push(IntentionRecord::new(t, None, None, None, self.time)),
            Err(e) => warn!(error = %e, text = %text, "failed to build a talk term"),
        }
    }

    /// Emit the invalid-answer acknowledgement, re-queue the outstanding
    /// question, and pop it (the re-ask logic appends it again when the
    /// repeated question is actually uttered).
    pub(crate) fn push_invalid_answer_and_reask(&mut self, speaker: &str, ctx_idx: usize) {
        let requester = TermAttribute::constant(speaker, self.sorts.id);
        self.push_reply(
            &format!("perf.ack.invalidanswer('{speaker}'[#id])"),
            Some(requester.clone()),
        );
        if let Some(question) = self.dialogue.contexts[ctx_idx]
            .last_question()
            .map(|cp| cp.performative.clone())
        {
            let talk = Term::new(
                self.sorts.action_talk,
                vec![
                    TermAttribute::constant(self.self_id.clone(), self.sorts.id),
                    TermAttribute::Subterm(question),
                ],
            );
            self.intentions.push(IntentionRecord::new(
                talk,
                Some(requester),
                None,
                None,
                self.time,
            ));
        }
        self.dialogue.contexts[ctx_idx].pop_last_question();
    }

    /// `action.memorize(self, speaker, <content>)`.
    pub(crate) fn memorize_intention_term(
        &self,
        speaker: &str,
        content: TermAttribute,
    ) -> Term {
        Term::new(
            self.sorts.action_memorize,
            vec![
                TermAttribute::constant(self.self_id.clone(), self.sorts.id),
                TermAttribute::constant(speaker, self.sorts.id),
                content,
            ],
        )
    }

    fn push_answer_intention(
        &mut self,
        family: &'static str,
        speaker: &str,
        extra: Vec<TermAttribute>,
        speaker_attr: &TermAttribute,
    ) {
        let functor = self.ontology.get_or_insert(family);
        let mut attributes = vec![
            TermAttribute::constant(self.self_id.clone(), self.sorts.id),
            TermAttribute::constant(speaker, self.sorts.id),
        ];
        attributes.extend(extra);
        let action = Term::new(functor, attributes);
        self.intentions.push(IntentionRecord::new(
            action,
            Some(speaker_attr.clone()),
            None,
            None,
            self.time,
        ));
    }
}
