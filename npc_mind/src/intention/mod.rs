//! Intentions - pending actions, their causes, and the executor.

mod builtin;

pub use builtin::*;

use std::collections::VecDeque;

use term_logic::{Term, TermAttribute};
use tracing::warn;
use uuid::Uuid;

use crate::mind::Mind;

/// Unique identifier for intention records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntentionId(pub Uuid);

impl IntentionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IntentionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IntentionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A singly-linked causal chain explaining why an intention exists, kept for
/// later "why did you do X" answers.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub term: Term,
    pub cause: Option<Box<CauseRecord>>,
    pub time_stamp: u64,
}

impl CauseRecord {
    pub fn new(term: Term, cause: Option<CauseRecord>, time_stamp: u64) -> Self {
        Self {
            term,
            cause: cause.map(Box::new),
            time_stamp,
        }
    }

    /// The chain from this cause outward, nearest first.
    pub fn chain(&self) -> Vec<&CauseRecord> {
        let mut out = vec![self];
        let mut cursor = self.cause.as_deref();
        while let Some(c) = cursor {
            out.push(c);
            cursor = c.cause.as_deref();
        }
        out
    }
}

/// A pending action. Back-references to the conversation are lookup keys
/// (speaker id + performative index), not pointers.
#[derive(Debug, Clone)]
pub struct IntentionRecord {
    pub id: IntentionId,
    pub action: Term,
    /// Who asked for it, when the action was requested.
    pub requester: Option<TermAttribute>,
    /// `(speaker, index into that speaker's performative history)`.
    pub requesting_performative: Option<(String, usize)>,
    pub cause: Option<CauseRecord>,
    pub time_stamp: u64,
}

impl IntentionRecord {
    pub fn new(
        action: Term,
        requester: Option<TermAttribute>,
        requesting_performative: Option<(String, usize)>,
        cause: Option<CauseRecord>,
        time_stamp: u64,
    ) -> Self {
        Self {
            id: IntentionId::new(),
            action,
            requester,
            requesting_performative,
            cause,
            time_stamp,
        }
    }
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentionOutcome {
    /// The intention is satisfied; remove it.
    Completed,
    /// Recognized but cannot proceed this tick; retry next tick.
    Blocked,
    /// A handler claimed capability but could not perform the action.
    Failed(String),
}

/// A capability handler. The registered set is supplied externally and is
/// the extension point for new verbs; dispatch is first-match over the
/// registration order.
pub trait IntentionAction: std::fmt::Debug {
    fn can_handle(&self, action: &Term, mind: &Mind) -> bool;

    fn execute(&mut self, record: &IntentionRecord, mind: &mut Mind) -> IntentionOutcome;

    /// For actions spanning multiple ticks: run on every tick after the
    /// first, until it returns true.
    fn execute_continuous(&mut self, _mind: &mut Mind) -> bool {
        true
    }

    fn needs_continuous_execution(&self) -> bool {
        false
    }
}

impl Mind {
    /// Feasibility probe: can any registered handler take the first conjunct
    /// of the request?
    pub fn can_satisfy_action_request(&self, request: &Term) -> bool {
        let conjuncts;
        let probe = if self.ontology.name_of(request.functor) == "#and" {
            conjuncts = request.conjunct_terms(&self.ontology);
            match conjuncts.first() {
                Some(t) => t,
                None => request,
            }
        } else {
            request
        };
        self.handlers.iter().any(|h| h.can_handle(probe, self))
    }

    /// Defer an action until the current intentions and inferences finish.
    pub fn queue_intention(
        &mut self,
        action: Term,
        requester: Option<TermAttribute>,
        requesting_performative: Option<(String, usize)>,
    ) {
        self.queued_intentions.push(IntentionRecord::new(
            action,
            requester,
            requesting_performative,
            None,
            self.time,
        ));
    }

    /// Drain runnable intentions. Once both the active intention list and
    /// the inference set are empty, the deferred list is promoted. Each
    /// record goes to the first handler claiming it; `Blocked` leaves it in
    /// place for the next tick, everything else removes it. Intentions
    /// pushed during execution are drained in the same tick.
    pub fn execute_intentions(&mut self) {
        if self.intentions.is_empty()
            && self.inference.is_empty()
            && !self.queued_intentions.is_empty()
        {
            self.intentions = std::mem::take(&mut self.queued_intentions);
        }

        let mut handlers = std::mem::take(&mut self.handlers);
        let mut pending: VecDeque<IntentionRecord> =
            std::mem::take(&mut self.intentions).into();
        let mut blocked: Vec<IntentionRecord> = Vec::new();

        while let Some(record) = pending.pop_front() {
            let mut outcome: Option<IntentionOutcome> = None;
            for handler in handlers.iter_mut() {
                if handler.can_handle(&record.action, self) {
                    outcome = Some(handler.execute(&record, self));
                    break;
                }
            }
            match outcome {
                None => {
                    warn!(
                        action = %record.action.render(&self.ontology),
                        "unsupported intention: no capable handler"
                    );
                }
                Some(IntentionOutcome::Blocked) => blocked.push(record),
                Some(IntentionOutcome::Completed) => {
                    if record.cause.is_some() || record.requester.is_some() {
                        self.intentions_caused_by_request.push(record);
                    }
                }
                Some(IntentionOutcome::Failed(reason)) => {
                    warn!(
                        action = %record.action.render(&self.ontology),
                        reason = %reason,
                        "unsupported intention"
                    );
                }
            }
            pending.extend(std::mem::take(&mut self.intentions));
        }

        self.intentions = blocked;
        handlers.extend(std::mem::take(&mut self.handlers));
        self.handlers = handlers;
    }
}
