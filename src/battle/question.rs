use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    answer::{key_text, normalize_options},
    protocol::RawQuestion,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    /// 정답 키는 화면으로 내보내지 않는다.
    #[serde(skip)]
    pub correct_answer: Option<String>,
}

impl Question {
    pub fn from_raw(raw: RawQuestion) -> Self {
        let options = normalize_options(&raw.options);
        if options.is_empty() {
            warn!("Question {} has no usable options", raw.id);
        }

        Self {
            correct_answer: raw.correct_answer.as_ref().and_then(key_text),
            id: raw.id,
            prompt: raw.prompt,
            options,
        }
    }
}

/// 순서가 있는 append-only 문제 목록.
#[derive(Debug, Clone, Default)]
pub struct QuestionDeck {
    questions: Vec<Question>,
    seen: HashSet<String>,
}

impl QuestionDeck {
    pub fn from_raw(raw: Vec<RawQuestion>) -> Self {
        let mut deck = Self::default();
        deck.append(raw);
        deck
    }

    /// 새 문제를 뒤에 붙인다. 이미 가진 id 는 건너뛰고, 실제로 추가된 개수를 돌려준다.
    pub fn append(&mut self, raw: Vec<RawQuestion>) -> usize {
        let mut added = 0;
        for question in raw {
            if !self.seen.insert(question.id.clone()) {
                debug!("Skipping duplicate question {}", question.id);
                continue;
            }
            self.questions.push(Question::from_raw(question));
            added += 1;
        }
        added
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// 지금까지 받은 문제 id (받은 순서대로)
    pub fn ids(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.id.clone()).collect()
    }
}
