use std::collections::VecDeque;

use crate::models::SubjectWithTopics;

/// Smooth weighted round-robin over static weights. Each step every entry
/// earns its weight in credit, the richest entry wins and pays the total
/// active weight back. Over any long run each id is picked in proportion
/// to its weight; ties break by declared order, so the output is
/// deterministic.
#[derive(Debug, Clone)]
pub struct WeightedPicker {
    entries: Vec<PickerEntry>,
}

#[derive(Debug, Clone)]
struct PickerEntry {
    id: i64,
    weight: i64,
    credit: i64,
}

impl WeightedPicker {
    pub fn new(weights: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self {
            entries: weights
                .into_iter()
                .filter(|(_, w)| *w > 0)
                .map(|(id, weight)| PickerEntry {
                    id,
                    weight,
                    credit: 0,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next(&mut self) -> Option<i64> {
        if self.entries.is_empty() {
            return None;
        }
        let total: i64 = self.entries.iter().map(|e| e.weight).sum();
        for e in &mut self.entries {
            e.credit += e.weight;
        }
        let best = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(i, e)| (e.credit, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)?;
        self.entries[best].credit -= total;
        Some(self.entries[best].id)
    }
}

/// Emission from the topic sequencer: which topic to introduce next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicPick {
    pub subject_id: i64,
    pub topic_id: i64,
}

#[derive(Debug, Clone)]
struct SequencerEntry {
    subject_id: i64,
    subject_weight: i64,
    credit: i64,
    // (topic id, topic weight) in declared syllabus order.
    queue: VecDeque<(i64, i64)>,
}

impl SequencerEntry {
    // Subject and topic weight stay independent multiplicative factors.
    // Summing them would compress the priority skew between subjects.
    fn effective_weight(&self) -> i64 {
        match self.queue.front() {
            Some((_, topic_weight)) => self.subject_weight * topic_weight,
            None => 0,
        }
    }
}

/// Orders pending topics across subjects with the same credit mechanism as
/// [`WeightedPicker`], except the per-step weight is the subject weight
/// times the weight of the subject's next pending topic. A subject whose
/// topics run out simply stops earning credit; the others are undisturbed.
#[derive(Debug, Clone)]
pub struct TopicSequencer {
    entries: Vec<SequencerEntry>,
}

impl TopicSequencer {
    pub fn new(syllabus: &[SubjectWithTopics]) -> Self {
        Self {
            entries: syllabus
                .iter()
                .map(|s| SequencerEntry {
                    subject_id: s.subject.id,
                    subject_weight: s.subject.weight,
                    credit: 0,
                    queue: s.pending_topics().map(|t| (t.id, t.weight)).collect(),
                })
                .collect(),
        }
    }

    /// Topics not yet emitted.
    pub fn remaining(&self) -> usize {
        self.entries.iter().map(|e| e.queue.len()).sum()
    }

    pub fn next(&mut self) -> Option<TopicPick> {
        let total: i64 = self.entries.iter().map(|e| e.effective_weight()).sum();
        if total == 0 {
            return None;
        }
        for e in &mut self.entries {
            e.credit += e.effective_weight();
        }
        let best = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.queue.is_empty())
            .max_by_key(|(i, e)| (e.credit, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)?;
        let entry = &mut self.entries[best];
        let (topic_id, _) = entry.queue.pop_front()?;
        entry.credit -= total;
        Some(TopicPick {
            subject_id: entry.subject_id,
            topic_id,
        })
    }
}
