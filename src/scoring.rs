// src/scoring.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::models::{
    attempt::{AnswerOverride, AnswerRecord, SubmittedAnswer},
    question::{Question, QuestionType},
};

/// Grades one selection against a question. Exact-match, all or nothing:
///
/// * single-correct: exactly one option selected and it is the correct one;
/// * multiple-correct: the selected set equals the correct set exactly.
///
/// Returns (correct, marks awarded).
pub fn grade_selection(question: &Question, selected: &[usize]) -> (bool, i32) {
    let correct_set: BTreeSet<usize> = question.correct_indices().into_iter().collect();
    let selected_set: BTreeSet<usize> = selected.iter().copied().collect();

    let correct = match question.kind() {
        QuestionType::Single => {
            selected.len() == 1 && correct_set.len() == 1 && selected_set == correct_set
        }
        QuestionType::Multiple => !correct_set.is_empty() && selected_set == correct_set,
    };

    if correct {
        (true, question.marks)
    } else {
        (false, 0)
    }
}

/// Scores a full submission against the current stored questions.
///
/// Answers referencing an unknown question id are silently skipped: they
/// contribute zero and produce no record. A question is scored at most
/// once: only the first answer naming it counts, so repeats cannot push
/// the total past the quiz's total marks. Returns the snapshot records
/// and the total marks obtained.
pub fn score_submission(
    questions: &HashMap<i64, Question>,
    answers: &[SubmittedAnswer],
) -> (Vec<AnswerRecord>, i32) {
    let mut records = Vec::new();
    let mut total = 0;
    let mut scored: HashSet<i64> = HashSet::new();

    for answer in answers {
        let Some(question) = questions.get(&answer.question_id) else {
            continue;
        };
        if !scored.insert(answer.question_id) {
            continue;
        }
        let (correct, marks_awarded) = grade_selection(question, &answer.selected);
        total += marks_awarded;
        records.push(AnswerRecord {
            question_id: answer.question_id,
            selected: answer.selected.clone(),
            correct,
            marks_awarded,
            marks_possible: question.marks,
        });
    }

    (records, total)
}

/// Clamps a submission time to the attempt's duration boundary.
///
/// A late submission is accepted but recorded as if it ended exactly at
/// start + duration; an early one keeps its real time.
pub fn effective_end(
    started_at: DateTime<Utc>,
    duration_minutes: i32,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let deadline = started_at + Duration::minutes(i64::from(duration_minutes));
    now.min(deadline)
}

/// Applies faculty overrides to the stored answer records in place and
/// returns the recomputed total.
///
/// Overriding marks are clamped to [0, marks_possible] of the snapshot.
/// Overrides naming a question with no stored record are skipped, matching
/// the unknown-answer leniency at submission.
pub fn apply_overrides(records: &mut [AnswerRecord], overrides: &[AnswerOverride]) -> i32 {
    let by_question: HashMap<i64, &AnswerOverride> =
        overrides.iter().map(|o| (o.question_id, o)).collect();

    for record in records.iter_mut() {
        if let Some(over) = by_question.get(&record.question_id) {
            record.correct = over.correct;
            record.marks_awarded = over.marks_obtained.clamp(0, record.marks_possible);
        }
    }

    records.iter().map(|r| r.marks_awarded).sum()
}
