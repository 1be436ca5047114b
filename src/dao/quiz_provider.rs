//! Quiz content collaborator: the ordered, immutable quiz sequence played in a room.

use std::{fs, path::Path, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::dao::{
    models::Quiz,
    storage::{StorageError, StorageResult},
};

/// Source of the quiz sequence for a room. The sequence never changes for the room's lifetime.
pub trait QuizProvider: Send + Sync {
    fn quiz_sequence(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Arc<[Quiz]>>>;
}

/// Provider serving sequences registered up-front (from a JSON file or by tests).
#[derive(Clone, Default)]
pub struct StaticQuizProvider {
    sequences: Arc<DashMap<String, Arc<[Quiz]>>>,
}

impl StaticQuizProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sequence played in `room_id`, replacing any earlier registration.
    pub fn insert(&self, room_id: impl Into<String>, quizzes: Vec<Quiz>) {
        self.sequences.insert(room_id.into(), Arc::from(quizzes));
    }

    /// Load a JSON object mapping room ids to quiz arrays.
    pub fn from_json_file(path: &Path) -> StorageResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            StorageError::unavailable(format!("reading quiz file {}", path.display()), err)
        })?;
        let rooms: IndexMap<String, Vec<Quiz>> = serde_json::from_str(&contents).map_err(|err| {
            StorageError::unavailable(format!("parsing quiz file {}", path.display()), err)
        })?;

        let provider = Self::new();
        for (room_id, quizzes) in rooms {
            provider.insert(room_id, quizzes);
        }
        Ok(provider)
    }
}

impl QuizProvider for StaticQuizProvider {
    fn quiz_sequence(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Arc<[Quiz]>>> {
        let result = self
            .sequences
            .get(room_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StorageError::not_found(room_id));
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::QuizType;

    #[tokio::test]
    async fn unknown_room_has_no_sequence() {
        let provider = StaticQuizProvider::new();
        let err = provider.quiz_sequence("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn loads_sequences_from_json() {
        let path = std::env::temp_dir().join(format!("quizzes-{}.json", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"{"room-1": [{
                "quizId": "q1", "title": "Capitals", "question": "Capital of Japan?",
                "type": "input", "correctAnswer": "Tokyo", "acceptableAnswers": ["東京"],
                "genre": "geography"
            }]}"#,
        )
        .unwrap();

        let provider = StaticQuizProvider::from_json_file(&path).unwrap();
        let quizzes = provider.quiz_sequence("room-1").await.unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(quizzes.len(), 1);
        assert_eq!(quizzes[0].kind, QuizType::Input);
        assert_eq!(quizzes[0].acceptable_answers, vec!["東京".to_string()]);
        assert!(quizzes[0].choices.is_empty());
    }
}
