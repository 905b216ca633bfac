//! The fixed tool catalogue advertised to the reasoning API.

use falcon_core::tool::ToolDefinition;
use serde_json::json;

/// Every tool the assistant can call. The set is closed: names that do not
/// map to a variant are reported back to the model as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SaveMemoryNote,
    RecallMemory,
    ForgetMemory,
    SummarizeConversationTopic,
    ExecuteSystemTask,
    GenerateImage,
    GenerateAndSaveContent,
    PlaySong,
}

impl ToolKind {
    /// All tools, in the order they are advertised.
    pub const ALL: [ToolKind; 8] = [
        ToolKind::SaveMemoryNote,
        ToolKind::RecallMemory,
        ToolKind::ForgetMemory,
        ToolKind::SummarizeConversationTopic,
        ToolKind::ExecuteSystemTask,
        ToolKind::GenerateImage,
        ToolKind::GenerateAndSaveContent,
        ToolKind::PlaySong,
    ];

    /// The wire name used by the model.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::SaveMemoryNote => "save_memory_note",
            ToolKind::RecallMemory => "recall_memory",
            ToolKind::ForgetMemory => "forget_memory",
            ToolKind::SummarizeConversationTopic => "summarize_conversation_topic",
            ToolKind::ExecuteSystemTask => "execute_system_task",
            ToolKind::GenerateImage => "generate_image",
            ToolKind::GenerateAndSaveContent => "generate_and_save_content",
            ToolKind::PlaySong => "play_song",
        }
    }

    /// Look up a tool by its wire name.
    pub fn from_name(name: &str) -> Option<ToolKind> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::SaveMemoryNote => {
                "Save a fact, preference or piece of information to permanent long-term memory. \
                 Use when the user says 'remember this', 'make a note that...' or 'don't forget'."
            }
            ToolKind::RecallMemory => {
                "Search long-term memory for notes matching a query. Use when the user asks \
                 'what did I say about...', 'do you remember...' or 'find my notes on...'."
            }
            ToolKind::ForgetMemory => {
                "Permanently delete one note from long-term memory by its ID. Find the ID with \
                 recall_memory first and confirm with the user before deleting."
            }
            ToolKind::SummarizeConversationTopic => {
                "Search the whole conversation history for a topic and summarize what was said. \
                 Use for 'summarize our discussion about...' or 'what have we talked about regarding...'."
            }
            ToolKind::ExecuteSystemTask => {
                "Run an operating-system task such as opening an application, managing files or \
                 changing system settings."
            }
            ToolKind::GenerateImage => "Create an image from a detailed text prompt and open it.",
            ToolKind::GenerateAndSaveContent => {
                "Write structured content (code, articles, scripts) and save it to a file."
            }
            ToolKind::PlaySong => "Play a song by name from the user's music library.",
        }
    }

    /// JSON Schema of the tool's arguments.
    pub fn parameters_schema(self) -> serde_json::Value {
        match self {
            ToolKind::SaveMemoryNote => json!({
                "type": "object",
                "properties": {
                    "note": { "type": "string", "description": "The information to save." },
                    "keywords": { "type": "string", "description": "Comma-separated keywords for easier retrieval." }
                },
                "required": ["note", "keywords"]
            }),
            ToolKind::RecallMemory => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Topic or keywords to search for." }
                },
                "required": ["query"]
            }),
            ToolKind::ForgetMemory => json!({
                "type": "object",
                "properties": {
                    "memory_id": { "type": "integer", "description": "ID of the note to delete." }
                },
                "required": ["memory_id"]
            }),
            ToolKind::SummarizeConversationTopic => json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string", "description": "The topic to search for and summarize." }
                },
                "required": ["topic"]
            }),
            ToolKind::ExecuteSystemTask => json!({
                "type": "object",
                "properties": {
                    "task_description": { "type": "string", "description": "A clear description of the system task." }
                },
                "required": ["task_description"]
            }),
            ToolKind::GenerateImage => json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "A detailed description of the desired image." }
                },
                "required": ["prompt"]
            }),
            ToolKind::GenerateAndSaveContent => json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string", "description": "A detailed prompt for the content to write." }
                },
                "required": ["topic"]
            }),
            ToolKind::PlaySong => json!({
                "type": "object",
                "properties": {
                    "song_name": { "type": "string", "description": "The name of the song to play." }
                },
                "required": ["song_name"]
            }),
        }
    }

    pub fn to_definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Definitions for every tool in the catalogue.
pub fn definitions() -> Vec<ToolDefinition> {
    ToolKind::ALL.into_iter().map(ToolKind::to_definition).collect()
}
