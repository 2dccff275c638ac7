//! Post-completion effects of inference records.
//!
//! An effect is a capability object invoked exactly once with the finished
//! record. The registry maps persisted effect kinds back to loaders, so
//! hosts can add their own effect families.

use std::collections::HashMap;

use term_logic::{Ontology, Term, TermAttribute};
use tracing::debug;

use super::record::InferenceRecord;
use crate::intention::{CauseRecord, IntentionRecord};
use crate::mind::Mind;

/// Strategy run when an inference record completes.
pub trait InferenceEffect: std::fmt::Debug {
    /// Persisted kind name (the `type` attribute of `<InferenceEffect>`).
    fn kind(&self) -> &'static str;

    /// Run against the finished record.
    fn execute(&self, record: &InferenceRecord, mind: &mut Mind);

    /// Attributes to persist alongside the kind.
    fn xml_attributes(&self, ont: &Ontology) -> Vec<(String, String)>;
}

/// Loader from persisted attributes back to a live effect.
pub type EffectLoader =
    fn(&HashMap<String, String>, &mut Ontology) -> Option<Box<dyn InferenceEffect>>;

/// Registry of effect loaders, keyed by kind name.
#[derive(Debug, Default)]
pub struct EffectRegistry {
    loaders: Vec<(String, EffectLoader)>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in effects.
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        r.register("ExecuteAction", load_execute_action);
        r
    }

    pub fn register(&mut self, kind: &str, loader: EffectLoader) {
        self.loaders.push((kind.to_string(), loader));
    }

    /// Rebuild an effect from its persisted kind and attributes.
    pub fn load(
        &self,
        kind: &str,
        attrs: &HashMap<String, String>,
        ont: &mut Ontology,
    ) -> Option<Box<dyn InferenceEffect>> {
        self.loaders
            .iter()
            .find(|(k, _)| k == kind)
            .and_then(|(_, loader)| loader(attrs, ont))
    }
}

/// Queue the requested action once the request's open variables have been
/// resolved. With no solution, the requesting speaker is told the request
/// is denied.
#[derive(Debug, Clone)]
pub struct ExecuteActionEffect {
    pub action: Term,
}

impl InferenceEffect for ExecuteActionEffect {
    fn kind(&self) -> &'static str {
        "ExecuteAction"
    }

    fn execute(&self, record: &InferenceRecord, mind: &mut Mind) {
        if let Some(bindings) = record.first_results().first() {
            let bound = self.action.apply_bindings(bindings);
            let cause = record
                .triggered_by
                .as_ref()
                .map(|t| CauseRecord::new(t.clone(), None, mind.time));
            let requester = record
                .triggered_by_speaker
                .as_ref()
                .map(|s| TermAttribute::constant(s.clone(), mind.sorts.id));
            mind.intentions.push(IntentionRecord::new(
                bound, requester, None, cause, mind.time,
            ));
        } else if let Some(speaker) = record.triggered_by_speaker.clone() {
            let text = format!(
                "action.talk('{}'[#id], perf.ack.denyrequest('{}'[#id]))",
                mind.self_id, speaker
            );
            mind.push_parsed_talk_intention(&text);
        } else {
            debug!(record = %record.id, "inference found no solution and has no requester to notify");
        }
    }

    fn xml_attributes(&self, ont: &Ontology) -> Vec<(String, String)> {
        vec![("effectParameter".to_string(), self.action.render(ont))]
    }
}

fn load_execute_action(
    attrs: &HashMap<String, String>,
    ont: &mut Ontology,
) -> Option<Box<dyn InferenceEffect>> {
    let src = attrs.get("effectParameter")?;
    let action = Term::from_string(src, ont).ok()?;
    Some(Box::new(ExecuteActionEffect { action }))
}
