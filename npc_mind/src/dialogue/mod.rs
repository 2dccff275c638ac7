//! Dialogue management - one persistent conversation context per
//! interlocutor, addressing rules, and question patience timeouts.

mod context;

pub use context::*;

use serde::{Deserialize, Serialize};
use term_logic::{Term, TermAttribute};

use crate::intention::IntentionRecord;
use crate::mind::Mind;

/// Holds every per-speaker context. Contexts are created lazily on first
/// contact and never destroyed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogueManager {
    pub contexts: Vec<DialogueContext>,
}

impl DialogueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the context for a speaker, creating one if missing.
    pub fn context_index_for_speaker(&mut self, speaker: &str) -> usize {
        if let Some(i) = self.existing_context_index(speaker) {
            return i;
        }
        self.contexts.push(DialogueContext::new(speaker));
        self.contexts.len() - 1
    }

    /// Index of an existing context, if we have spoken before.
    pub fn existing_context_index(&self, speaker: &str) -> Option<usize> {
        self.contexts.iter().position(|c| c.speaker == speaker)
    }

    /// The context for a speaker, creating one if missing.
    pub fn context_for_speaker(&mut self, speaker: &str) -> &mut DialogueContext {
        let i = self.context_index_for_speaker(speaker);
        &mut self.contexts[i]
    }
}

impl Mind {
    /// Addressing decision for an incoming performative from the context's
    /// speaker. A performative's target attribute encodes a right-nested
    /// conjunction of addressee ids; mentioning someone else also marks
    /// their context as no longer in conversation with us. Without a target
    /// list the decision falls back to conversation-timeout, then the
    /// last-performative flag, then `in_conversation`.
    pub(crate) fn talking_to_us(&mut self, ctx_idx: usize, performative: Option<&Term>) -> bool {
        let mut target_ids: Vec<String> = Vec::new();
        if let Some(perf) = performative {
            let and = self.sorts.and_list;
            let mut target_list = perf.attributes.first().cloned();
            while let Some(TermAttribute::Subterm(t)) = &target_list {
                if t.functor == and {
                    if let Some(value) = t.attributes.first().and_then(|a| a.as_constant()) {
                        target_ids.push(value.to_string());
                        target_list = t.attributes.get(1).cloned();
                        continue;
                    }
                }
                break;
            }
            if let Some(TermAttribute::Constant { value, .. }) = &target_list {
                target_ids.push(value.clone());
            }

            for target in &target_ids {
                if *target == self.self_id {
                    self.dialogue.contexts[ctx_idx]
                        .last_performative_involving_this_character_was_to_us = true;
                    return true;
                }
                if let Some(j) = self.dialogue.existing_context_index(target) {
                    self.dialogue.contexts[j]
                        .last_performative_involving_this_character_was_to_us = false;
                    self.dialogue.contexts[j].in_conversation = false;
                }
            }
            if !target_ids.is_empty() {
                let ctx = &mut self.dialogue.contexts[ctx_idx];
                ctx.last_performative_involving_this_character_was_to_us = false;
                ctx.in_conversation = false;
                return false;
            }
        }

        let ctx = &self.dialogue.contexts[ctx_idx];
        if let Some(first) = ctx.first_performative_time() {
            if self.time.saturating_sub(first) >= self.config.conversation_timeout {
                return false;
            }
        }
        if ctx.last_performative_involving_this_character_was_to_us {
            return true;
        }
        ctx.in_conversation
    }

    /// Per-tick timeout scan: if the top of any context's question stack has
    /// waited longer than the patience timer and the speaker is perceivable,
    /// re-ask.
    pub fn conversation_update(&mut self) {
        self.check_overdue_questions();
    }

    pub(crate) fn check_overdue_questions(&mut self) {
        for idx in 0..self.dialogue.contexts.len() {
            let (overdue, speaker) = {
                let ctx = &self.dialogue.contexts[idx];
                match ctx.expecting_answer_timestamps.last() {
                    Some(&ts) => (
                        self.time.saturating_sub(ts) > self.config.question_patience_timer,
                        ctx.speaker.clone(),
                    ),
                    None => (false, String::new()),
                }
            };
            if overdue && self.can_see(&speaker) {
                self.reask_the_last_question(idx);
            }
        }
    }

    /// Pop the stale question and queue it as a fresh intention. Outside a
    /// conversation an attention-getting utterance goes first. Memory is
    /// never touched, only the intention queue.
    pub fn reask_the_last_question(&mut self, ctx_idx: usize) {
        let (performative, in_conversation, speaker) = {
            let ctx = &mut self.dialogue.contexts[ctx_idx];
            let Some(question) = ctx.last_question().cloned() else {
                return;
            };
            ctx.pop_last_question();
            (
                question.performative,
                ctx.in_conversation,
                ctx.speaker.clone(),
            )
        };

        if !in_conversation {
            let text = format!(
                "action.talk('{}'[#id], perf.callattention('{}'[#id]))",
                self.self_id, speaker
            );
            self.push_parsed_talk_intention(&text);
        }

        let talk = Term::new(
            self.sorts.action_talk,
            vec![
                TermAttribute::constant(self.self_id.clone(), self.sorts.id),
                TermAttribute::Subterm(performative),
            ],
        );
        self.intentions
            .push(IntentionRecord::new(talk, None, None, None, self.time));
    }
}
