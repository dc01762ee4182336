use crate::models::answer::Answer;
use crate::models::question::{AnswerKey, AnswerValue, Question, QuestionType, ShapeError};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradedQuestion {
    pub question_id: Uuid,
    pub question_type: QuestionType,
    pub marks: i32,
    pub answered: bool,
    pub is_correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    /// Percentage in `[0, 100]`; `None` when the test has no questions.
    pub score: Option<f64>,
    pub earned_marks: i64,
    pub total_marks: i64,
    pub questions: Vec<GradedQuestion>,
}

pub struct GradingService;

impl GradingService {
    pub fn score(questions: &[Question], answers: &[Answer]) -> ScoreReport {
        if questions.is_empty() {
            return ScoreReport {
                score: None,
                earned_marks: 0,
                total_marks: 0,
                questions: Vec::new(),
            };
        }

        let by_question: HashMap<Uuid, &Answer> =
            answers.iter().map(|a| (a.question_id, a)).collect();

        let mut total_marks: i64 = 0;
        let mut earned_marks: i64 = 0;
        let mut graded = Vec::with_capacity(questions.len());

        for question in questions {
            if question.marks <= 0 {
                continue;
            }
            total_marks += i64::from(question.marks);

            let answer = by_question.get(&question.id).copied();
            let outcome = match answer {
                Some(answer) => Self::judge(question, answer),
                None => Ok(Verdict::Unanswered),
            };

            let (is_correct, note) = match outcome {
                Ok(Verdict::Correct) => (true, None),
                Ok(Verdict::Incorrect) => (false, None),
                Ok(Verdict::Unanswered) => (false, None),
                Ok(Verdict::NoKey) => (false, Some("no correct answer defined".to_string())),
                Err(err) => {
                    tracing::warn!(
                        question_id = %question.id,
                        error = %err,
                        "skipping question with malformed answer shape"
                    );
                    (false, Some(err.to_string()))
                }
            };

            if is_correct {
                earned_marks += i64::from(question.marks);
            }
            graded.push(GradedQuestion {
                question_id: question.id,
                question_type: question.question_type,
                marks: question.marks,
                answered: answer.is_some(),
                is_correct,
                note,
            });
        }

        let score = if total_marks > 0 {
            (earned_marks as f64 / total_marks as f64) * 100.0
        } else {
            0.0
        };

        ScoreReport {
            score: Some(score),
            earned_marks,
            total_marks,
            questions: graded,
        }
    }

    fn judge(question: &Question, answer: &Answer) -> Result<Verdict, ShapeError> {
        let Some(key) = question.answer_key()? else {
            return Ok(Verdict::NoKey);
        };
        let submitted = AnswerValue::from_json(&answer.answer_data)?;

        if Self::is_correct(question.question_type, &key, submitted.as_ref()) {
            Ok(Verdict::Correct)
        } else {
            Ok(Verdict::Incorrect)
        }
    }

    /// Comparison rule per question type. mcq compares normalized multisets;
    /// every other type compares one trimmed, case-folded string. Numbers are
    /// compared as text, so `"4.0"` and `"4"` differ.
    pub fn is_correct(
        question_type: QuestionType,
        key: &AnswerKey,
        submitted: Option<&AnswerValue>,
    ) -> bool {
        match question_type {
            QuestionType::Mcq => {
                let expected = normalized_sorted(key.as_list());
                let given = normalized_sorted(submitted.map(AnswerValue::as_list).unwrap_or_default());
                !expected.is_empty() && expected == given
            }
            QuestionType::Single | QuestionType::Text | QuestionType::Number => {
                match (submitted.and_then(AnswerValue::first), key.first()) {
                    (Some(given), Some(expected)) => normalize(&given) == normalize(&expected),
                    _ => false,
                }
            }
        }
    }
}

enum Verdict {
    Correct,
    Incorrect,
    Unanswered,
    NoKey,
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn normalized_sorted(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| normalize(v))
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out
}
