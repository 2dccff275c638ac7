//! XML persistence of the whole mind.
//!
//! The element and attribute names are a compatibility surface and must not
//! change (including the `questionPatienceTimmer` spelling on the root).
//! Background-provenance sentences are never persisted; they are re-derived
//! at load. The in-progress resolution cursor is not persisted either: on
//! reload every inference record restarts its search against current memory.
//! Malformed entries are skipped with a warning and the load continues.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;
use tracing::warn;

use term_logic::{Ontology, Sentence, Term, TermAttribute, TermParser};

use crate::dialogue::{ContextPerformative, DialogueContext, DialogueManager, EnumeratedQuestion};
use crate::inference::InferenceRecord;
use crate::intention::{CauseRecord, IntentionRecord};
use crate::memory::{LongTermMemory, Provenance, ShortTermMemory, TermEntry};
use crate::mind::Mind;

/// Errors from the persistence layer. Entry-level problems are not errors;
/// they degrade to a warning and a skipped entry.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing RuleBasedAI root element")]
    MissingRoot,
}

// -- writing ------------------------------------------------------------

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn start(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<(), PersistError> {
        let mut e = BytesStart::new(name);
        for (k, v) in attrs {
            e.push_attribute((*k, v.as_str()));
        }
        self.writer.write_event(Event::Start(e))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<(), PersistError> {
        let mut e = BytesStart::new(name);
        for (k, v) in attrs {
            e.push_attribute((*k, v.as_str()));
        }
        self.writer.write_event(Event::Empty(e))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<(), PersistError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), PersistError> {
        self.start(name, &[])?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> String {
        String::from_utf8_lossy(&self.writer.into_inner()).into_owned()
    }
}

/// Serialize the whole mind.
pub fn save_to_xml(mind: &Mind) -> Result<String, PersistError> {
    let ont = &mind.ontology;
    let mut out = XmlOut::new();
    out.start(
        "RuleBasedAI",
        &[
            ("timeInSeconds", mind.time.to_string()),
            (
                "questionPatienceTimmer",
                mind.config.question_patience_timer.to_string(),
            ),
        ],
    )?;

    out.start("shortTermMemory", &[])?;
    for entry in mind.short_term.iter() {
        out.empty("term", &term_entry_attrs(entry, ont))?;
    }
    for entry in mind.short_term.previous_iter() {
        out.empty("previousTerm", &term_entry_attrs(entry, ont))?;
    }
    out.end("shortTermMemory")?;

    out.start("longTermMemory", &[])?;
    for entry in mind.long_term.previous_iter() {
        if entry.provenance == Provenance::Background {
            continue;
        }
        let mut attrs = vec![
            ("activation", entry.activation.to_string()),
            ("provenance", entry.provenance.as_str().to_string()),
            ("sentence", entry.sentence.render(ont)),
            ("time", entry.time.to_string()),
        ];
        attrs.push(("timeEnd", entry.time_end.unwrap_or(entry.time).to_string()));
        out.empty("sentence", &attrs)?;
    }
    for entry in mind.long_term.iter() {
        if entry.provenance == Provenance::Background {
            continue;
        }
        out.empty(
            "sentence",
            &[
                ("activation", entry.activation.to_string()),
                ("provenance", entry.provenance.as_str().to_string()),
                ("sentence", entry.sentence.render(ont)),
                ("time", entry.time.to_string()),
            ],
        )?;
    }
    out.end("longTermMemory")?;

    for record in &mind.intentions {
        write_intention(&mut out, ont, record)?;
    }
    if !mind.queued_intentions.is_empty() {
        out.start("queuedIntentions", &[])?;
        for record in &mind.queued_intentions {
            write_intention(&mut out, ont, record)?;
        }
        out.end("queuedIntentions")?;
    }
    if !mind.intentions_caused_by_request.is_empty() {
        out.start("intentionsCausedByRequest", &[])?;
        for record in &mind.intentions_caused_by_request {
            write_intention(&mut out, ont, record)?;
        }
        out.end("intentionsCausedByRequest")?;
    }

    out.start("inference", &[])?;
    for record in &mind.inference {
        write_inference(&mut out, ont, record)?;
    }
    out.end("inference")?;

    for context in &mind.dialogue.contexts {
        write_context(&mut out, ont, context)?;
    }

    out.end("RuleBasedAI")?;
    Ok(out.finish())
}

fn term_entry_attrs(entry: &TermEntry, ont: &Ontology) -> Vec<(&'static str, String)> {
    vec![
        ("activation", entry.activation.to_string()),
        ("provenance", entry.provenance.as_str().to_string()),
        ("term", entry.term.render(ont)),
        ("time", entry.time.to_string()),
    ]
}

fn write_intention(
    out: &mut XmlOut,
    ont: &Ontology,
    record: &IntentionRecord,
) -> Result<(), PersistError> {
    let mut attrs = vec![("action", record.action.render(ont))];
    if let Some(requester) = &record.requester {
        attrs.push(("requester", requester.render(ont)));
    }
    if let Some((speaker, index)) = &record.requesting_performative {
        attrs.push(("requestingPerformativeSpeaker", speaker.clone()));
        attrs.push(("requestingPerformative", index.to_string()));
    }
    attrs.push(("timeStamp", record.time_stamp.to_string()));

    match &record.cause {
        None => out.empty("IntentionRecord", &attrs),
        Some(cause) => {
            out.start("IntentionRecord", &attrs)?;
            write_cause(out, ont, cause)?;
            out.end("IntentionRecord")
        }
    }
}

fn write_cause(out: &mut XmlOut, ont: &Ontology, cause: &CauseRecord) -> Result<(), PersistError> {
    let attrs = vec![
        ("term", cause.term.render(ont)),
        ("timeStamp", cause.time_stamp.to_string()),
    ];
    match cause.cause.as_deref() {
        None => out.empty("CauseRecord", &attrs),
        Some(inner) => {
            out.start("CauseRecord", &attrs)?;
            write_cause(out, ont, inner)?;
            out.end("CauseRecord")
        }
    }
}

fn write_inference(
    out: &mut XmlOut,
    ont: &Ontology,
    record: &InferenceRecord,
) -> Result<(), PersistError> {
    let mut attrs = vec![
        ("priority", record.priority.to_string()),
        ("anxiety", record.anxiety.to_string()),
        ("findAllAnswers", record.find_all_answers.to_string()),
    ];
    if let Some(t) = &record.time_term {
        attrs.push(("timeTerm", t.render(ont)));
    }
    if let Some(t) = &record.triggered_by {
        attrs.push(("triggeredBy", t.render(ont)));
    }
    if let Some(s) = &record.triggered_by_speaker {
        attrs.push(("triggeredBySpeaker", s.clone()));
    }
    out.start("InferenceRecord", &attrs)?;

    if let Some(effect) = &record.effect {
        let mut effect_attrs = vec![("type", effect.kind().to_string())];
        let owned = effect.xml_attributes(ont);
        for (k, v) in &owned {
            effect_attrs.push((k.as_str(), v.clone()));
        }
        // re-borrow with the static key type expected by the writer
        let mut e = BytesStart::new("InferenceEffect");
        for (k, v) in &effect_attrs {
            e.push_attribute((*k, v.as_str()));
        }
        out.writer.write_event(Event::Empty(e))?;
    }

    if !record.additional_sentences.is_empty() {
        out.start("additionalSentences", &[])?;
        for s in &record.additional_sentences {
            out.text_element("sentence", &s.render(ont))?;
        }
        out.end("additionalSentences")?;
    }
    for target in &record.targets {
        out.start("target", &[])?;
        for s in target {
            out.text_element("sentence", &s.render(ont))?;
        }
        out.end("target")?;
    }
    out.end("InferenceRecord")
}

fn write_context(
    out: &mut XmlOut,
    ont: &Ontology,
    context: &DialogueContext,
) -> Result<(), PersistError> {
    out.start(
        "context",
        &[
            ("speaker", context.speaker.clone()),
            ("inConversation", context.in_conversation.to_string()),
            ("expectingGreet", context.expecting_greet.to_string()),
            ("expectingFarewell", context.expecting_farewell.to_string()),
            ("expectingThankYou", context.expecting_thank_you.to_string()),
            (
                "expectingYouAreWelcome",
                context.expecting_you_are_welcome.to_string(),
            ),
            (
                "lastPerformativeInvolvingThisCharacterWasToUs",
                context
                    .last_performative_involving_this_character_was_to_us
                    .to_string(),
            ),
        ],
    )?;

    for p in &context.performatives {
        let mut attrs = vec![
            ("speaker", p.speaker.clone()),
            ("time", p.time.to_string()),
        ];
        if let Some(text) = &p.text {
            attrs.push(("text", text.clone()));
        }
        attrs.push(("performative", p.performative.render(ont)));
        out.empty("performative", &attrs)?;
    }
    for (index, time) in context
        .expecting_answer_to_question
        .iter()
        .zip(context.expecting_answer_timestamps.iter())
    {
        out.empty(
            "expectingAnswerToQuestion",
            &[("index", index.to_string()), ("time", time.to_string())],
        )?;
    }
    for (term, time) in context
        .expecting_confirmation_to_request
        .iter()
        .zip(context.expecting_confirmation_timestamps.iter())
    {
        out.empty(
            "expectingConfirmationToRequest",
            &[("term", term.render(ont)), ("time", time.to_string())],
        )?;
    }
    if let Some(eq) = &context.last_enumerated_question {
        out.start(
            "lastEnumeratedQuestion",
            &[
                ("nextAnswerIndex", eq.next_answer_index.to_string()),
                ("performative", eq.question.render(ont)),
            ],
        )?;
        for answer in &eq.answers {
            out.empty("answer", &[("attribute", answer.render(ont))])?;
        }
        out.end("lastEnumeratedQuestion")?;
    }
    out.end("context")
}

// -- reading ------------------------------------------------------------

#[derive(Debug, Default)]
struct Node {
    name: String,
    attrs: HashMap<String, String>,
    children: Vec<Node>,
    text: String,
}

impl Node {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn num_attr<T: std::str::FromStr>(node: &Node, key: &str) -> Option<T> {
    node.attr(key)?.parse().ok()
}

fn bool_attr(node: &Node, key: &str) -> bool {
    node.attr(key) == Some("true")
}

fn node_from(e: &BytesStart) -> Result<Node, PersistError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = HashMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(Node {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

fn parse_dom(xml: &str) -> Result<Node, PersistError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Node> = vec![Node {
        name: "#document".to_string(),
        ..Default::default()
    }];
    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(node_from(&e)?),
            Event::Empty(e) => {
                let node = node_from(&e)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
            }
            Event::Text(t) => {
                let s = t.unescape()?;
                let s = s.trim();
                if !s.is_empty() {
                    if let Some(parent) = stack.last_mut() {
                        if !parent.text.is_empty() {
                            parent.text.push(' ');
                        }
                        parent.text.push_str(s);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    // tolerate unclosed elements by folding the stack down
    let mut root = stack.pop().ok_or(PersistError::MissingRoot)?;
    while let Some(mut parent) = stack.pop() {
        parent.children.push(root);
        root = parent;
    }
    Ok(root)
}

fn load_term_entry(node: &Node, ont: &mut Ontology) -> Option<TermEntry> {
    let term = Term::from_string(node.attr("term")?, ont).ok()?;
    let provenance = Provenance::parse(node.attr("provenance")?)?;
    let activation = num_attr(node, "activation")?;
    let time = num_attr(node, "time").unwrap_or(0);
    Some(TermEntry {
        term,
        provenance,
        activation,
        time,
    })
}

fn load_cause(node: &Node, ont: &mut Ontology) -> Option<CauseRecord> {
    let term = Term::from_string(node.attr("term")?, ont).ok()?;
    let time_stamp = num_attr(node, "timeStamp").unwrap_or(0);
    let inner = node.child("CauseRecord").and_then(|c| load_cause(c, ont));
    Some(CauseRecord::new(term, inner, time_stamp))
}

fn load_intention(node: &Node, ont: &mut Ontology) -> Option<IntentionRecord> {
    let action = Term::from_string(node.attr("action")?, ont).ok()?;
    let requester = node
        .attr("requester")
        .and_then(|s| TermAttribute::from_string(s, ont).ok());
    let requesting_performative = match (
        node.attr("requestingPerformativeSpeaker"),
        node.attr("requestingPerformative"),
    ) {
        (Some(speaker), Some(index)) => {
            index.parse().ok().map(|i| (speaker.to_string(), i))
        }
        _ => None,
    };
    let time_stamp = num_attr(node, "timeStamp").unwrap_or(0);
    let cause = node.child("CauseRecord").and_then(|c| load_cause(c, ont));
    Some(IntentionRecord::new(
        action,
        requester,
        requesting_performative,
        cause,
        time_stamp,
    ))
}

fn load_context(node: &Node, ont: &mut Ontology) -> Option<DialogueContext> {
    let speaker = node.attr("speaker")?.to_string();
    let mut ctx = DialogueContext::new(speaker);
    ctx.in_conversation = bool_attr(node, "inConversation");
    ctx.expecting_greet = bool_attr(node, "expectingGreet");
    ctx.expecting_farewell = bool_attr(node, "expectingFarewell");
    ctx.expecting_thank_you = bool_attr(node, "expectingThankYou");
    ctx.expecting_you_are_welcome = bool_attr(node, "expectingYouAreWelcome");
    ctx.last_performative_involving_this_character_was_to_us =
        bool_attr(node, "lastPerformativeInvolvingThisCharacterWasToUs");

    let fallback_speaker = ctx.speaker.clone();
    for p in node.children_named("performative") {
        let Some(performative) = p
            .attr("performative")
            .and_then(|s| Term::from_string(s, ont).ok())
        else {
            warn!("skipping a malformed performative in a persisted context");
            continue;
        };
        ctx.performatives.push(ContextPerformative {
            speaker: p
                .attr("speaker")
                .unwrap_or(fallback_speaker.as_str())
                .to_string(),
            text: p.attr("text").map(String::from),
            performative,
            time: num_attr(p, "time").unwrap_or(0),
        });
    }
    for q in node.children_named("expectingAnswerToQuestion") {
        if let (Some(index), Some(time)) = (num_attr(q, "index"), num_attr(q, "time")) {
            if index < ctx.performatives.len() {
                ctx.expecting_answer_to_question.push(index);
                ctx.expecting_answer_timestamps.push(time);
            }
        }
    }
    for c in node.children_named("expectingConfirmationToRequest") {
        let (Some(term), Some(time)) = (
            c.attr("term").and_then(|s| Term::from_string(s, ont).ok()),
            num_attr(c, "time"),
        ) else {
            warn!("skipping a malformed pending confirmation in a persisted context");
            continue;
        };
        ctx.expecting_confirmation_to_request.push(term);
        ctx.expecting_confirmation_timestamps.push(time);
    }
    if let Some(eq) = node.child("lastEnumeratedQuestion") {
        if let Some(question) = eq
            .attr("performative")
            .and_then(|s| Term::from_string(s, ont).ok())
        {
            let answers = eq
                .children_named("answer")
                .filter_map(|a| {
                    a.attr("attribute")
                        .and_then(|s| TermAttribute::from_string(s, ont).ok())
                })
                .collect();
            ctx.last_enumerated_question = Some(EnumeratedQuestion {
                question,
                answers,
                next_answer_index: num_attr(eq, "nextAnswerIndex").unwrap_or(0),
            });
        }
    }
    Some(ctx)
}

impl Mind {
    /// Restore from a persisted document. Memories, intentions, contexts
    /// and inference records are replaced wholesale; each inference restarts
    /// its resolution from scratch against the restored memory.
    pub fn restore_from_xml(&mut self, xml: &str) -> Result<(), PersistError> {
        let dom = parse_dom(xml)?;
        let root = if dom.name == "RuleBasedAI" {
            dom
        } else {
            dom.children
                .into_iter()
                .find(|c| c.name == "RuleBasedAI")
                .ok_or(PersistError::MissingRoot)?
        };

        if let Some(time) = root.attr("timeInSeconds").and_then(|v| v.parse().ok()) {
            self.time = time;
        }
        if let Some(patience) = root
            .attr("questionPatienceTimmer")
            .and_then(|v| v.parse().ok())
        {
            self.config.question_patience_timer = patience;
        }

        if let Some(stm) = root.child("shortTermMemory") {
            self.short_term = ShortTermMemory::new();
            for node in stm.children_named("term") {
                match load_term_entry(node, &mut self.ontology) {
                    Some(entry) => self.short_term.add_entry(entry),
                    None => warn!("skipping a malformed short-term entry"),
                }
            }
            for node in stm.children_named("previousTerm") {
                match load_term_entry(node, &mut self.ontology) {
                    Some(entry) => self.short_term.add_previous_entry(entry),
                    None => warn!("skipping a malformed previous-term entry"),
                }
            }
        }

        if let Some(ltm) = root.child("longTermMemory") {
            self.long_term = LongTermMemory::new();
            for node in ltm.children_named("sentence") {
                let parsed = node
                    .attr("sentence")
                    .and_then(|s| Sentence::from_string(s, &mut self.ontology).ok())
                    .zip(node.attr("provenance").and_then(Provenance::parse));
                let Some((sentence, provenance)) = parsed else {
                    warn!("skipping a malformed long-term entry");
                    continue;
                };
                let activation = num_attr(node, "activation").unwrap_or(1);
                let time = num_attr(node, "time").unwrap_or(self.time);
                match num_attr(node, "timeEnd") {
                    Some(time_end) => self.long_term.add_previous_sentence(
                        sentence, provenance, activation, time, time_end,
                    ),
                    None => self
                        .long_term
                        .add_sentence(sentence, provenance, activation, time),
                }
            }
        }

        self.dialogue = DialogueManager::new();
        for node in root.children_named("context") {
            match load_context(node, &mut self.ontology) {
                Some(ctx) => self.dialogue.contexts.push(ctx),
                None => warn!("skipping a malformed persisted context"),
            }
        }

        self.intentions = Vec::new();
        for node in root.children_named("IntentionRecord") {
            match load_intention(node, &mut self.ontology) {
                Some(record) => self.intentions.push(record),
                None => warn!("skipping a malformed intention record"),
            }
        }
        self.queued_intentions = Vec::new();
        if let Some(queued) = root.child("queuedIntentions") {
            for node in queued.children_named("IntentionRecord") {
                match load_intention(node, &mut self.ontology) {
                    Some(record) => self.queued_intentions.push(record),
                    None => warn!("skipping a malformed queued intention record"),
                }
            }
        }
        self.intentions_caused_by_request = Vec::new();
        if let Some(caused) = root.child("intentionsCausedByRequest") {
            for node in caused.children_named("IntentionRecord") {
                match load_intention(node, &mut self.ontology) {
                    Some(record) => self.intentions_caused_by_request.push(record),
                    None => warn!("skipping a malformed caused intention record"),
                }
            }
        }

        self.inference = Vec::new();
        if let Some(inference) = root.child("inference") {
            for node in inference.children_named("InferenceRecord") {
                match self.load_inference_record(node) {
                    Some(record) => self.inference.push(record),
                    None => warn!("skipping a malformed inference record"),
                }
            }
        }
        Ok(())
    }

    fn load_inference_record(&mut self, node: &Node) -> Option<InferenceRecord> {
        // one shared variable scope across the whole record
        let mut parser = TermParser::new();
        let priority = num_attr(node, "priority")?;
        let anxiety = num_attr(node, "anxiety")?;
        let find_all_answers = node.attr("findAllAnswers") == Some("true");
        let time_term = node
            .attr("timeTerm")
            .and_then(|s| parser.parse_term(s, &mut self.ontology).ok());
        let triggered_by = node
            .attr("triggeredBy")
            .and_then(|s| parser.parse_term(s, &mut self.ontology).ok());
        let triggered_by_speaker = node.attr("triggeredBySpeaker").map(str::to_string);

        let mut additional_sentences = Vec::new();
        if let Some(wrapper) = node.child("additionalSentences") {
            for s_node in wrapper.children_named("sentence") {
                match parser.parse_sentence(&s_node.text, &mut self.ontology) {
                    Ok(s) if !s.is_empty() => additional_sentences.push(s),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "skipping a malformed additional sentence"),
                }
            }
        }
        let mut targets = Vec::new();
        for t_node in node.children_named("target") {
            let mut clauses = Vec::new();
            for s_node in t_node.children_named("sentence") {
                match parser.parse_sentence(&s_node.text, &mut self.ontology) {
                    Ok(s) if !s.is_empty() => clauses.push(s),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "skipping a malformed target sentence"),
                }
            }
            if !clauses.is_empty() {
                targets.push(clauses);
            }
        }
        if targets.is_empty() {
            return None;
        }

        let effect = node.child("InferenceEffect").and_then(|e| {
            let kind = e.attr("type")?.to_string();
            self.effects.load(&kind, &e.attrs, &mut self.ontology)
        });

        let kb = self.inference_kb(time_term.as_ref(), &additional_sentences);
        let mut record = InferenceRecord::new(
            kb,
            targets,
            priority,
            anxiety,
            find_all_answers,
            time_term,
            effect,
            additional_sentences,
            self.config.max_resolution_depth,
        );
        record.triggered_by = triggered_by;
        record.triggered_by_speaker = triggered_by_speaker;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use term_logic::TermParser;

    use crate::config::MindConfig;
    use crate::inference::ExecuteActionEffect;

    fn term(mind: &mut Mind, src: &str) -> Term {
        Term::from_string(src, &mut mind.ontology).unwrap()
    }

    fn populated_mind() -> Mind {
        let mut mind = Mind::new(term_logic::Ontology::core(), "self", MindConfig::default());
        mind.time = 100;

        // background knowledge is re-derived at load, never persisted
        let bg = term(&mut mind, "verb.own('eva'[#id], 'sword'[#id])");
        mind.long_term
            .add_sentence(Sentence::fact(bg), Provenance::Background, 1, 0);

        // a superseded location fact leaves a history entry
        let at1 = Sentence::fact(term(&mut mind, "space.at('bob'[#id], 'kitchen'[#id])"));
        let at2 = Sentence::fact(term(&mut mind, "space.at('bob'[#id], 'garden'[#id])"));
        mind.long_term
            .add_state_sentence_if_new(at1, Provenance::Perception, 1, 10, 10);
        mind.long_term
            .add_state_sentence_if_new(at2, Provenance::Perception, 1, 60, 60);

        let own = term(&mut mind, "verb.own('bob'[#id], 'key'[#id])");
        mind.short_term
            .add_term_if_new(own, Provenance::Perception, 42, 70);

        // an intention with a two-deep cause chain
        let act = term(&mut mind, "action.talk('self'[#id], perf.greet('bob'[#id]))");
        let why = term(&mut mind, "perf.greet('self'[#id])");
        let deeper = term(&mut mind, "perf.callattention('self'[#id])");
        let cause = CauseRecord::new(why, Some(CauseRecord::new(deeper, None, 80)), 90);
        let requester = TermAttribute::constant("bob", mind.sorts.id);
        mind.intentions.push(IntentionRecord::new(
            act,
            Some(requester),
            Some(("bob".to_string(), 0)),
            Some(cause),
            95,
        ));
        let deferred = term(&mut mind, "action.talk('self'[#id], perf.farewell('bob'[#id]))");
        mind.queue_intention(deferred, None, None);

        // dialogue context with a pending question and an answer cursor
        let pending = term(
            &mut mind,
            "perf.q.predicate('bob'[#id], verb.own('bob'[#id], 'key'[#id]))",
        );
        let question = term(&mut mind, "perf.q.query(V:[any], verb.own('bob'[#id], V))");
        let answer = TermAttribute::constant("item0", mind.sorts.id);
        {
            let ctx = mind.dialogue.context_for_speaker("bob");
            let idx = ctx.record_performative("self", None, pending, 90);
            ctx.push_question(idx, 90);
            ctx.in_conversation = true;
            ctx.expecting_thank_you = true;
            ctx.last_performative_involving_this_character_was_to_us = true;
            ctx.set_enumerated_answers(question, vec![answer], 1);
        }

        // a live inference with an effect
        let mut parser = TermParser::new();
        let action = parser
            .parse_term("verb.follow('self'[#id], L:[any])", &mut mind.ontology)
            .unwrap();
        let goal = parser
            .parse_term("space.at('bob'[#id], L:[any])", &mut mind.ontology)
            .unwrap();
        let target = Sentence::new(vec![goal], vec![false]);
        let id = mind.spawn_inference(
            vec![vec![target]],
            2,
            5,
            true,
            None,
            Some(Box::new(ExecuteActionEffect { action })),
            Vec::new(),
        );
        if let Some(r) = mind.inference.iter_mut().find(|r| r.id == id) {
            r.triggered_by_speaker = Some("bob".to_string());
        }
        mind
    }

    #[test]
    fn test_round_trip() {
        let mind = populated_mind();
        let xml = save_to_xml(&mind).unwrap();
        assert!(xml.contains("questionPatienceTimmer"));
        assert!(!xml.contains("sword"), "background beliefs are not persisted");

        let mut restored = Mind::new(term_logic::Ontology::core(), "self", MindConfig::default());
        restored.restore_from_xml(&xml).unwrap();

        assert_eq!(restored.time, 100);
        assert_eq!(
            restored.config.question_patience_timer,
            mind.config.question_patience_timer
        );

        assert_eq!(restored.long_term.len(), 1);
        let entry = restored.long_term.iter().next().unwrap();
        assert_eq!(entry.provenance, Provenance::Perception);
        assert_eq!(entry.time, 60);
        assert_eq!(
            entry.sentence.render(&restored.ontology),
            "space.at('bob'[#id], 'garden'[#id])"
        );
        let prev = restored.long_term.previous_iter().next().unwrap();
        assert_eq!(prev.time, 10);
        assert_eq!(prev.time_end, Some(60));

        assert_eq!(restored.short_term.len(), 1);
        let st = restored.short_term.iter().next().unwrap();
        assert_eq!(st.activation, 42);
        assert_eq!(st.time, 70);

        assert_eq!(restored.intentions.len(), 1);
        let it = &restored.intentions[0];
        assert_eq!(it.time_stamp, 95);
        assert_eq!(it.requesting_performative, Some(("bob".to_string(), 0)));
        assert_eq!(it.cause.as_ref().unwrap().chain().len(), 2);
        assert!(it.requester.is_some());
        assert_eq!(restored.queued_intentions.len(), 1);

        assert_eq!(restored.dialogue.contexts.len(), 1);
        let ctx = &restored.dialogue.contexts[0];
        assert_eq!(ctx.speaker, "bob");
        assert!(ctx.in_conversation);
        assert!(ctx.expecting_thank_you);
        assert!(ctx.last_performative_involving_this_character_was_to_us);
        assert_eq!(ctx.expecting_answer_to_question, vec![0]);
        assert_eq!(ctx.expecting_answer_timestamps, vec![90]);
        let eq = ctx.last_enumerated_question.as_ref().unwrap();
        assert_eq!(eq.next_answer_index, 1);
        assert_eq!(eq.answers.len(), 1);

        // the inference keeps its settings but restarts its search
        assert_eq!(restored.inference.len(), 1);
        let inf = &restored.inference[0];
        assert_eq!(inf.priority, 2);
        assert_eq!(inf.anxiety, 5);
        assert!(inf.find_all_answers);
        assert_eq!(inf.completed, 0);
        assert_eq!(inf.triggered_by_speaker.as_deref(), Some("bob"));
        assert!(inf
            .effect
            .as_ref()
            .is_some_and(|e| e.kind() == "ExecuteAction"));
        assert_eq!(inf.targets.len(), 1);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let xml = r#"<RuleBasedAI timeInSeconds="7" questionPatienceTimmer="99">
<shortTermMemory>
<term activation="3" provenance="perception" term="verb.own('bob'[#id], 'key'[#id])" time="1"/>
<term activation="oops" provenance="perception" term="verb.own('eva'[#id], 'cup'[#id])" time="1"/>
<term activation="3" provenance="perception" term="(((" time="1"/>
</shortTermMemory>
<longTermMemory>
<sentence activation="1" provenance="memorize" sentence="space.at('bob'[#id], 'garden'[#id])" time="2"/>
<sentence activation="1" provenance="divine" sentence="space.at('eva'[#id], 'garden'[#id])" time="2"/>
</longTermMemory>
</RuleBasedAI>"#;
        let mut mind = Mind::new(term_logic::Ontology::core(), "self", MindConfig::default());
        mind.restore_from_xml(xml).unwrap();
        assert_eq!(mind.time, 7);
        assert_eq!(mind.config.question_patience_timer, 99);
        assert_eq!(mind.short_term.len(), 1);
        assert_eq!(mind.long_term.len(), 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let mut mind = Mind::new(term_logic::Ontology::core(), "self", MindConfig::default());
        assert!(matches!(
            mind.restore_from_xml("<nothing/>"),
            Err(PersistError::MissingRoot)
        ));
    }
}
