//! Generated document model: titled markdown plus a conversation log.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One cached extraction result for a single page.
///
/// Field names match the on-disk cache format (`pages_cache.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number at extraction time.
    pub page: u32,
    /// Extracted text for exactly this page.
    pub text: String,
}

/// One turn in a document's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A generated document: one folder under the output root holding the
/// markdown body and an ordered conversation history JSON.
#[derive(Debug, Clone)]
pub struct Document {
    pub title: String,
    pub content: String,
    pub conversation: Vec<ConversationTurn>,
}

/// Filename of the conversation history inside a document folder.
const CONVERSATION_FILE: &str = "conversation.json";

impl Document {
    pub fn new(title: String, content: String) -> Self {
        Self {
            title,
            content,
            conversation: Vec::new(),
        }
    }

    /// Folder for this document under the output root.
    pub fn folder(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.title)
    }

    /// Persist the markdown body and conversation history.
    ///
    /// An existing folder with the same title is overwritten in place.
    pub fn save(&self, output_dir: &Path) -> std::io::Result<PathBuf> {
        let folder = self.folder(output_dir);
        std::fs::create_dir_all(&folder)?;
        let md_path = folder.join(format!("{}.md", self.title));
        std::fs::write(&md_path, &self.content)?;
        if !self.conversation.is_empty() {
            let json = serde_json::to_string_pretty(&self.conversation)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(folder.join(CONVERSATION_FILE), json)?;
        }
        Ok(md_path)
    }

    /// Load a document from its folder. The markdown body is whichever
    /// `.md` file the folder holds; missing conversation history is empty.
    pub fn load(folder: &Path) -> std::io::Result<Self> {
        let title = folder
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("untitled")
            .to_string();

        let mut content = String::new();
        for entry in std::fs::read_dir(folder)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "md") {
                content = std::fs::read_to_string(&path)?;
                break;
            }
        }

        let conversation_path = folder.join(CONVERSATION_FILE);
        let conversation = if conversation_path.exists() {
            let raw = std::fs::read_to_string(&conversation_path)?;
            serde_json::from_str(&raw)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        } else {
            Vec::new()
        };

        Ok(Self {
            title,
            content,
            conversation,
        })
    }

    /// Append a user/assistant turn pair and persist the history.
    pub fn append_turns(
        &mut self,
        folder: &Path,
        user: ConversationTurn,
        assistant: ConversationTurn,
    ) -> std::io::Result<()> {
        self.conversation.push(user);
        self.conversation.push(assistant);
        let json = serde_json::to_string_pretty(&self.conversation)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(folder.join(CONVERSATION_FILE), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let doc = Document::new("Notes".to_string(), "# Notes\n\nbody".to_string());
        let md_path = doc.save(dir.path()).unwrap();
        assert_eq!(md_path, dir.path().join("Notes/Notes.md"));

        let loaded = Document::load(&dir.path().join("Notes")).unwrap();
        assert_eq!(loaded.title, "Notes");
        assert_eq!(loaded.content, "# Notes\n\nbody");
        assert!(loaded.conversation.is_empty());
    }

    #[test]
    fn test_append_turns_persists_ordered_history() {
        let dir = tempdir().unwrap();
        let mut doc = Document::new("Log".to_string(), "body".to_string());
        doc.save(dir.path()).unwrap();
        let folder = doc.folder(dir.path());

        doc.append_turns(
            &folder,
            ConversationTurn::user("what is this?"),
            ConversationTurn::assistant("a summary"),
        )
        .unwrap();

        let loaded = Document::load(&folder).unwrap();
        assert_eq!(loaded.conversation.len(), 2);
        assert_eq!(loaded.conversation[0].role, "user");
        assert_eq!(loaded.conversation[1].role, "assistant");
        assert_eq!(loaded.conversation[1].content, "a summary");
    }

    #[test]
    fn test_save_overwrites_existing_title() {
        let dir = tempdir().unwrap();
        Document::new("Same".to_string(), "old".to_string())
            .save(dir.path())
            .unwrap();
        Document::new("Same".to_string(), "new".to_string())
            .save(dir.path())
            .unwrap();

        let loaded = Document::load(&dir.path().join("Same")).unwrap();
        assert_eq!(loaded.content, "new");
    }
}
