//! Project records - read-only knowledge attached to a chat

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Error;
use crate::Result;

/// A document belonging to a project, with text extracted at upload time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    pub filename: String,
    #[serde(default)]
    pub parsed_content: Option<String>,
}

/// The project a conversation belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub name: String,
    /// Goal / instruction text
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub non_goals: Option<String>,
    #[serde(default)]
    pub documents: Vec<ProjectDocument>,
}

/// Project lookup - interface to the chat/project records
#[async_trait]
pub trait ProjectSource: Send + Sync {
    /// Project the chat belongs to, if any
    async fn project_for_chat(&self, chat_id: &str) -> Result<Option<ProjectContext>>;
}

/// In-memory project records
#[derive(Debug, Default)]
pub struct InMemoryProjects {
    by_chat: HashMap<String, ProjectContext>,
}

impl InMemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chat_id: impl Into<String>, project: ProjectContext) {
        self.by_chat.insert(chat_id.into(), project);
    }
}

#[async_trait]
impl ProjectSource for InMemoryProjects {
    async fn project_for_chat(&self, chat_id: &str) -> Result<Option<ProjectContext>> {
        Ok(self.by_chat.get(chat_id).cloned())
    }
}

/// JSON file of `{ "<chatId>": { project } }`, re-read on every lookup so
/// edits apply without a restart.
pub struct JsonProjectStore {
    path: PathBuf,
}

impl JsonProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProjectSource for JsonProjectStore {
    async fn project_for_chat(&self, chat_id: &str) -> Result<Option<ProjectContext>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut projects: HashMap<String, ProjectContext> = serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("invalid projects file {:?}: {}", self.path, e)))?;
        Ok(projects.remove(chat_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectContext {
        ProjectContext {
            name: "Relaunch".into(),
            goal: Some("Neue Website".into()),
            non_goals: None,
            documents: vec![ProjectDocument {
                filename: "brief.pdf".into(),
                parsed_content: Some("Briefing".into()),
            }],
        }
    }

    #[tokio::test]
    async fn test_in_memory_lookup() {
        let mut store = InMemoryProjects::new();
        store.insert("chat-1", project());

        assert_eq!(store.project_for_chat("chat-1").await.unwrap(), Some(project()));
        assert_eq!(store.project_for_chat("chat-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        std::fs::write(
            &path,
            r#"{"chat-1": {"name": "Relaunch", "goal": "Neue Website",
                "documents": [{"filename": "brief.pdf", "parsedContent": "Briefing"}]}}"#,
        )
        .unwrap();

        let store = JsonProjectStore::new(&path);
        assert_eq!(store.project_for_chat("chat-1").await.unwrap(), Some(project()));
        assert_eq!(store.project_for_chat("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProjectStore::new(dir.path().join("none.json"));
        assert_eq!(store.project_for_chat("chat-1").await.unwrap(), None);
    }
}
