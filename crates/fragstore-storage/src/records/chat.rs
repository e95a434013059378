use serde::{Deserialize, Serialize};

use super::{Record, RecordKind, RecordStore};
use crate::error::{Result, StorageError};

/// One chat message between a user and an AI persona.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub msg_id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub ai_id: String,
    pub content: String,
    /// Unix seconds
    pub timestamp: i64,
}

impl Message {
    /// A message stamped with the current time.
    pub fn new(
        msg_id: impl Into<String>,
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        ai_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            msg_id: msg_id.into(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            ai_id: ai_id.into(),
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl Record for Message {
    const KIND: RecordKind = RecordKind::Message;

    fn id(&self) -> &str {
        &self.msg_id
    }

    fn storage_key(id: &str) -> String {
        format!("chat_{}", id)
    }
}

/// Ordered messages of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    pub conversation_id: String,
    pub messages: Vec<Message>,
}

impl ChatHistory {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
        }
    }
}

impl Record for ChatHistory {
    const KIND: RecordKind = RecordKind::ChatHistory;

    fn id(&self) -> &str {
        &self.conversation_id
    }

    fn storage_key(id: &str) -> String {
        format!("history_{}", id)
    }
}

pub type MessageStore = RecordStore<Message>;
pub type ChatHistoryStore = RecordStore<ChatHistory>;

impl RecordStore<ChatHistory> {
    /// Append `message` to a conversation, starting the history if absent.
    pub fn append_message(&self, conversation_id: &str, message: Message) -> Result<ChatHistory> {
        if conversation_id.is_empty() {
            return Err(StorageError::InvalidRecordId(RecordKind::ChatHistory));
        }
        if message.msg_id.is_empty() {
            return Err(StorageError::InvalidRecordId(RecordKind::Message));
        }

        let mut history = match self.get(conversation_id) {
            Ok(history) => history,
            Err(e) if e.is_not_found() => ChatHistory::new(conversation_id),
            Err(e) => return Err(e),
        };
        history.messages.push(message);
        self.save(&history)?;
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragmentation::FragmentationDirectory;
    use fragstore_common::StorageConfig;

    fn test_message(id: &str, conversation: &str) -> Message {
        Message {
            msg_id: id.into(),
            conversation_id: conversation.into(),
            user_id: "user_001".into(),
            ai_id: "ai_001".into(),
            content: "Hello, this is a test message".into(),
            timestamp: 1_700_000_000,
        }
    }

    fn stores(base: &std::path::Path) -> (MessageStore, ChatHistoryStore) {
        let config = StorageConfig::with_base_dir(base);
        let directory = FragmentationDirectory::open(&config);
        (
            MessageStore::new(directory.clone(), &config),
            ChatHistoryStore::new(directory, &config),
        )
    }

    #[test]
    fn test_message_save_get_update_delete() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (messages, _) = stores(dir.path());

        let mut msg = test_message("msg_001", "conv_001");
        messages.save(&msg).unwrap();
        assert_eq!(messages.get("msg_001").unwrap(), msg);

        msg.content = "edited".into();
        messages.update(&msg).unwrap();
        assert_eq!(messages.get("msg_001").unwrap().content, "edited");

        messages.delete("msg_001").unwrap();
        assert!(messages.get("msg_001").unwrap_err().is_not_found());
    }

    #[test]
    fn test_message_uses_prefixed_key() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (messages, _) = stores(dir.path());

        messages.save(&test_message("msg_001", "conv_001")).unwrap();
        assert!(messages.directory().exists("chat_msg_001").unwrap());
        assert!(!messages.directory().exists("msg_001").unwrap());
    }

    #[test]
    fn test_message_empty_id_rejected() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (messages, _) = stores(dir.path());

        let err = messages.save(&test_message("", "conv_001")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecordId(RecordKind::Message)));
    }

    #[test]
    fn test_chat_history_round_trip() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (_, histories) = stores(dir.path());

        let history = ChatHistory {
            conversation_id: "conv_get_test".into(),
            messages: vec![
                test_message("msg_001", "conv_get_test"),
                test_message("msg_002", "conv_get_test"),
            ],
        };
        histories.save(&history).unwrap();

        let read = histories.get("conv_get_test").unwrap();
        assert_eq!(read.messages.len(), 2);
        assert_eq!(read.messages[1].msg_id, "msg_002");
        assert!(histories.directory().exists("history_conv_get_test").unwrap());
    }

    #[test]
    fn test_append_message_creates_then_extends() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (_, histories) = stores(dir.path());

        let first = histories
            .append_message("conv_new", test_message("m1", "conv_new"))
            .unwrap();
        assert_eq!(first.messages.len(), 1);

        let second = histories
            .append_message("conv_new", test_message("m2", "conv_new"))
            .unwrap();
        assert_eq!(second.messages.len(), 2);
        assert_eq!(histories.get("conv_new").unwrap(), second);
    }

    #[test]
    fn test_append_message_validation() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (_, histories) = stores(dir.path());

        assert!(matches!(
            histories.append_message("", test_message("m1", "")),
            Err(StorageError::InvalidRecordId(RecordKind::ChatHistory))
        ));
        assert!(matches!(
            histories.append_message("conv", test_message("", "conv")),
            Err(StorageError::InvalidRecordId(RecordKind::Message))
        ));
    }

    #[test]
    fn test_message_new_stamps_time() {
        let msg = Message::new("m", "c", "u", "a", "hi");
        assert!(msg.timestamp > 0);
        assert_eq!(msg.content, "hi");
    }
}
