// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Follow-up question carousel
//!
//! A completed answer may embed a batch of follow-up questions as
//! `{"follow_up_questions": [...]}`, usually inside a fenced json block. The
//! questions are answered one at a time locally; only after the last one is
//! a single summary turn sent back to the service.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

/// Header line of the summary turn sent after the last answer
pub const SUMMARY_HEADER: &str = "追问回答：";

/// One question of a follow-up batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    #[serde(default)]
    pub id: i64,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// An answer keyed by question id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpAnswer {
    pub id: i64,
    pub answer: String,
}

/// Questions and the answers given, frozen onto a transcript message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FollowUpSnapshot {
    pub questions: Vec<FollowUpQuestion>,
    pub answers: Vec<FollowUpAnswer>,
}

impl FollowUpSnapshot {
    /// Numbered list of the answers, one per line
    pub fn answer_list(&self) -> String {
        number_answers(self.answers.iter().map(|a| a.answer.as_str()))
    }
}

#[derive(Deserialize)]
struct FollowUpEnvelope {
    follow_up_questions: Option<Vec<FollowUpQuestion>>,
}

fn fenced_json() -> Option<&'static Regex> {
    static FENCED_JSON: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    FENCED_JSON
        .get_or_init(|| Regex::new(r"(?i)```json\s*([\s\S]*?)```"))
        .as_ref()
        .ok()
}

/// Find a follow-up batch in answer text.
///
/// Uses the first fenced json block when there is one, otherwise the whole
/// text. Returns `None` when there is no batch or it is empty.
pub fn extract_follow_ups(text: &str) -> Option<Vec<FollowUpQuestion>> {
    let raw = fenced_json()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str());

    let envelope: FollowUpEnvelope = serde_json::from_str(raw.trim()).ok()?;
    envelope.follow_up_questions.filter(|qs| !qs.is_empty())
}

/// `1. a\n2. b` style list
pub fn number_answers<'a>(answers: impl IntoIterator<Item = &'a str>) -> String {
    answers
        .into_iter()
        .enumerate()
        .map(|(idx, answer)| format!("{}. {}", idx + 1, answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Content of the turn sent once every question is answered
pub fn summary_turn(snapshot: &FollowUpSnapshot) -> String {
    format!("{}\n{}", SUMMARY_HEADER, snapshot.answer_list())
}

/// Result of answering one carousel question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarouselStep {
    /// More questions remain; `index` is the next one to show
    Advanced { index: usize, total: usize },
    /// Every question is answered
    Complete(FollowUpSnapshot),
}

/// Sequential answer collection over one follow-up batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpCarousel {
    questions: Vec<FollowUpQuestion>,
    answers: Vec<FollowUpAnswer>,
}

impl FollowUpCarousel {
    /// Start a carousel; `None` for an empty batch
    pub fn new(questions: Vec<FollowUpQuestion>) -> Option<Self> {
        (!questions.is_empty()).then(|| Self {
            questions,
            answers: Vec::new(),
        })
    }

    pub fn current(&self) -> Option<&FollowUpQuestion> {
        self.questions.get(self.answers.len())
    }

    pub fn index(&self) -> usize {
        self.answers.len()
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn questions(&self) -> &[FollowUpQuestion] {
        &self.questions
    }

    pub fn answers(&self) -> &[FollowUpAnswer] {
        &self.answers
    }

    /// Zero-answer snapshot of the batch
    pub fn snapshot(&self) -> FollowUpSnapshot {
        FollowUpSnapshot {
            questions: self.questions.clone(),
            answers: self.answers.clone(),
        }
    }

    /// Record an answer to the current question
    pub fn answer(&mut self, answer: &str) -> Result<CarouselStep> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ParleyError::Precondition(
                "follow-up answer is empty".to_string(),
            ));
        }
        let id = self
            .current()
            .map(|q| q.id)
            .ok_or_else(|| ParleyError::Precondition("no follow-up question pending".to_string()))?;

        self.answers.push(FollowUpAnswer {
            id,
            answer: answer.to_string(),
        });

        if self.answers.len() >= self.questions.len() {
            Ok(CarouselStep::Complete(self.snapshot()))
        } else {
            Ok(CarouselStep::Advanced {
                index: self.answers.len(),
                total: self.questions.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FENCED: &str = "```json\n{\"follow_up_questions\":[{\"id\":1,\"question\":\"Q1\",\"options\":[\"A\",\"B\"]}]}\n```";

    #[test]
    fn test_extract_fenced() {
        let questions = extract_follow_ups(FENCED).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question, "Q1");
        assert_eq!(questions[0].options, vec!["A", "B"]);
    }

    #[test]
    fn test_extract_fence_case_insensitive() {
        let text = "说明\n```JSON\n{\"follow_up_questions\":[{\"id\":2,\"question\":\"Q\"}]}```";
        let questions = extract_follow_ups(text).unwrap();
        assert_eq!(questions[0].id, 2);
        assert!(questions[0].options.is_empty());
    }

    #[test]
    fn test_extract_raw() {
        let text = r#"{"follow_up_questions":[{"id":1,"question":"Q1","options":[]}]}"#;
        assert!(extract_follow_ups(text).is_some());
    }

    #[test]
    fn test_extract_none() {
        assert!(extract_follow_ups("你好").is_none());
        assert!(extract_follow_ups(r#"{"follow_up_questions":[]}"#).is_none());
        assert!(extract_follow_ups(r#"{"other":1}"#).is_none());
        assert!(extract_follow_ups("```json\n{broken\n```").is_none());
    }

    #[test]
    fn test_carousel_flow() {
        let questions = vec![
            FollowUpQuestion {
                id: 1,
                question: "Q1".to_string(),
                options: vec!["A".to_string()],
            },
            FollowUpQuestion {
                id: 2,
                question: "Q2".to_string(),
                options: vec!["B".to_string()],
            },
        ];
        let mut carousel = FollowUpCarousel::new(questions).unwrap();
        assert_eq!(carousel.current().unwrap().question, "Q1");
        assert!(carousel.snapshot().answers.is_empty());

        assert_eq!(
            carousel.answer("A").unwrap(),
            CarouselStep::Advanced { index: 1, total: 2 }
        );
        assert_eq!(carousel.current().unwrap().id, 2);

        let snapshot = match carousel.answer("B").unwrap() {
            CarouselStep::Complete(snapshot) => snapshot,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(snapshot.answer_list(), "1. A\n2. B");
        assert_eq!(summary_turn(&snapshot), "追问回答：\n1. A\n2. B");
        assert!(carousel.current().is_none());
        assert!(carousel.answer("C").is_err());
    }

    #[test]
    fn test_empty_answer_rejected() {
        let mut carousel = FollowUpCarousel::new(vec![FollowUpQuestion {
            id: 1,
            question: "Q".to_string(),
            options: vec![],
        }])
        .unwrap();
        assert!(matches!(
            carousel.answer("  "),
            Err(ParleyError::Precondition(_))
        ));
        assert_eq!(carousel.index(), 0);
    }

    #[test]
    fn test_empty_batch() {
        assert!(FollowUpCarousel::new(Vec::new()).is_none());
    }
}
