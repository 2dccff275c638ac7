//! Inference scheduling - anxiety-weighted, one resolution step per tick.

mod effect;
mod record;
mod resolution;

pub use effect::*;
pub use record::*;
pub use resolution::*;

use term_logic::{Sentence, Term};
use tracing::error;

use crate::mind::Mind;

impl Mind {
    /// Assemble the knowledge base an inference seeds from: the requested
    /// long-term snapshot (now vs past), every short-term term as a unit
    /// fact, and the requester's additional clauses.
    pub(crate) fn inference_kb(
        &self,
        time_term: Option<&Term>,
        additional: &[Sentence],
    ) -> Vec<Sentence> {
        let mut kb: Vec<Sentence> = additional.to_vec();
        for entry in self.short_term.iter() {
            kb.push(Sentence::fact(entry.term.clone()));
        }
        let long_term = match time_term {
            None => self.long_term.snapshot_now(),
            Some(t) if self.ontology.name_of(t.functor) == "time.past" => {
                self.long_term.snapshot_past()
            }
            Some(t) if self.ontology.is_a(t.functor, self.sorts.time_now) => {
                self.long_term.snapshot_now()
            }
            Some(t) => {
                error!(
                    time_term = %t.render(&self.ontology),
                    "unsupported time term on inference; defaulting to the present"
                );
                self.long_term.snapshot_now()
            }
        };
        kb.extend(long_term);
        kb
    }

    /// Spawn a reasoning task against current memory.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn_inference(
        &mut self,
        targets: Vec<Vec<Sentence>>,
        priority: i64,
        anxiety: i64,
        find_all_answers: bool,
        time_term: Option<Term>,
        effect: Option<Box<dyn InferenceEffect>>,
        additional_sentences: Vec<Sentence>,
    ) -> InferenceId {
        let kb = self.inference_kb(time_term.as_ref(), &additional_sentences);
        let record = InferenceRecord::new(
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
        let id = record.id;
        self.inference.push(record);
        id
    }

    /// One scheduler tick. Every live record's anxiety grows by its
    /// priority; the most anxious record (ties to the earliest registered)
    /// is serviced: either retired (firing its effect exactly once) or
    /// advanced by a single resolution step. When the last record retires,
    /// overdue pending questions are re-asked.
    pub fn inference_update(&mut self) {
        let mut max_idx: Option<usize> = None;
        for i in 0..self.inference.len() {
            self.inference[i].anxiety += self.inference[i].priority;
            match max_idx {
                None => max_idx = Some(i),
                Some(m) => {
                    if self.inference[i].anxiety > self.inference[m].anxiety {
                        max_idx = Some(i);
                    }
                }
            }
        }
        let Some(idx) = max_idx else {
            return;
        };

        if self.inference[idx].is_done() {
            let mut record = self.inference.remove(idx);
            if let Some(effect) = record.effect.take() {
                effect.execute(&record, self);
            }
            if self.inference.is_empty() {
                // Inference completion doubles as a polling point for
                // conversational timeouts.
                self.check_overdue_questions();
            }
        } else {
            let record = &mut self.inference[idx];
            let cursor = record.completed;
            let finished = if record.find_all_answers {
                record.resolutions[cursor].step_accumulating_results(&self.ontology)
            } else {
                record.resolutions[cursor].step(&self.ontology)
            };
            if finished {
                record.completed += 1;
            }
        }
    }
}
