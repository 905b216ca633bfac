//! Typed tool invocations decoded from model output.

use crate::catalogue::ToolKind;
use falcon_core::error::ToolError;
use falcon_core::memory::NoteId;
use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaveNoteArgs {
    pub note: String,
    #[serde(default)]
    pub keywords: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecallArgs {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForgetArgs {
    #[serde(deserialize_with = "note_id")]
    pub memory_id: NoteId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicArgs {
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskArgs {
    pub task_description: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageArgs {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SongArgs {
    pub song_name: String,
}

/// Models sometimes quote integers; accept `3`, `3.0` and `"3"`.
fn note_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NoteId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(id) => Ok(id),
        Raw::Float(f) if f.fract() == 0.0 => Ok(f as i64),
        Raw::Float(f) => Err(de::Error::custom(format!("memory_id must be an integer, got {f}"))),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("memory_id must be an integer, got '{s}'"))),
    }
}

/// One decoded tool call with its typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    SaveMemoryNote(SaveNoteArgs),
    RecallMemory(RecallArgs),
    ForgetMemory(ForgetArgs),
    SummarizeConversationTopic(TopicArgs),
    ExecuteSystemTask(TaskArgs),
    GenerateImage(ImageArgs),
    GenerateAndSaveContent(TopicArgs),
    PlaySong(SongArgs),
}

impl ToolInvocation {
    /// Decode `arguments` for a known tool.
    pub fn decode(kind: ToolKind, arguments: &serde_json::Value) -> Result<Self, ToolError> {
        fn args<T: for<'de> Deserialize<'de>>(
            kind: ToolKind,
            value: &serde_json::Value,
        ) -> Result<T, ToolError> {
            T::deserialize(value)
                .map_err(|e| ToolError::InvalidArguments(format!("{}: {e}", kind.name())))
        }

        Ok(match kind {
            ToolKind::SaveMemoryNote => Self::SaveMemoryNote(args(kind, arguments)?),
            ToolKind::RecallMemory => Self::RecallMemory(args(kind, arguments)?),
            ToolKind::ForgetMemory => Self::ForgetMemory(args(kind, arguments)?),
            ToolKind::SummarizeConversationTopic => {
                Self::SummarizeConversationTopic(args(kind, arguments)?)
            }
            ToolKind::ExecuteSystemTask => Self::ExecuteSystemTask(args(kind, arguments)?),
            ToolKind::GenerateImage => Self::GenerateImage(args(kind, arguments)?),
            ToolKind::GenerateAndSaveContent => Self::GenerateAndSaveContent(args(kind, arguments)?),
            ToolKind::PlaySong => Self::PlaySong(args(kind, arguments)?),
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::SaveMemoryNote(_) => ToolKind::SaveMemoryNote,
            Self::RecallMemory(_) => ToolKind::RecallMemory,
            Self::ForgetMemory(_) => ToolKind::ForgetMemory,
            Self::SummarizeConversationTopic(_) => ToolKind::SummarizeConversationTopic,
            Self::ExecuteSystemTask(_) => ToolKind::ExecuteSystemTask,
            Self::GenerateImage(_) => ToolKind::GenerateImage,
            Self::GenerateAndSaveContent(_) => ToolKind::GenerateAndSaveContent,
            Self::PlaySong(_) => ToolKind::PlaySong,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_save_note_with_and_without_keywords() {
        let inv = ToolInvocation::decode(
            ToolKind::SaveMemoryNote,
            &json!({"note": "favorite color is blue", "keywords": "preferences"}),
        )
        .unwrap();
        assert_eq!(
            inv,
            ToolInvocation::SaveMemoryNote(SaveNoteArgs {
                note: "favorite color is blue".into(),
                keywords: Some("preferences".into()),
            })
        );

        let inv = ToolInvocation::decode(ToolKind::SaveMemoryNote, &json!({"note": "x"})).unwrap();
        assert!(matches!(inv, ToolInvocation::SaveMemoryNote(SaveNoteArgs { keywords: None, .. })));
    }

    #[test]
    fn memory_id_accepts_numbers_and_numeric_strings() {
        for raw in [json!(12), json!(12.0), json!("12"), json!(" 12 ")] {
            let inv = ToolInvocation::decode(ToolKind::ForgetMemory, &json!({"memory_id": raw})).unwrap();
            assert_eq!(inv, ToolInvocation::ForgetMemory(ForgetArgs { memory_id: 12 }));
        }
    }

    #[test]
    fn memory_id_rejects_non_integers() {
        for raw in [json!(1.5), json!("twelve"), json!(null)] {
            let err = ToolInvocation::decode(ToolKind::ForgetMemory, &json!({"memory_id": raw}))
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
    }

    #[test]
    fn missing_required_argument_is_invalid() {
        let err = ToolInvocation::decode(ToolKind::PlaySong, &json!({"song": "x"})).unwrap_err();
        assert!(err.to_string().contains("play_song"));
        assert!(err.to_string().contains("song_name"));
    }

    #[test]
    fn kind_matches_decoded_tool() {
        let inv = ToolInvocation::decode(ToolKind::GenerateAndSaveContent, &json!({"topic": "a haiku"}))
            .unwrap();
        assert_eq!(inv.kind(), ToolKind::GenerateAndSaveContent);
    }
}
