//! `falcon memory`: Inspect and edit stored conversations and notes.

use clap::Subcommand;
use falcon_config::AppConfig;
use falcon_core::memory::MemoryStore;
use falcon_gateway::export::ExportFormat;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Count stored turns and notes
    Stats,

    /// Search past conversations
    Search {
        topic: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Search long-term notes
    Notes {
        query: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Save a long-term note
    Remember {
        note: String,

        #[arg(short, long)]
        keywords: Option<String>,
    },

    /// Delete a long-term note by id
    Forget { id: i64 },

    /// Export the full conversation history
    Export {
        /// csv or json
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}

async fn open_store() -> Result<Arc<dyn MemoryStore>, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(falcon_memory::build_from_config(&config).await?)
}

pub async fn run(action: MemoryAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store().await?;

    match action {
        MemoryAction::Stats => {
            let turns = store.all_turns().await?;
            let answered = turns.iter().filter(|t| t.is_complete()).count();
            println!("🧠 Memory Statistics");
            println!("====================");
            println!("  Backend:  {}", store.name());
            println!("  Turns:    {} ({answered} answered)", turns.len());
            println!("  Notes:    {}", store.note_count().await?);
        }

        MemoryAction::Search { topic, limit } => {
            println!("🔍 Conversations mentioning \"{topic}\"\n");
            let hits = store.search_turns(&topic, limit).await?;
            if hits.is_empty() {
                println!("   No matching conversations.");
            }
            for hit in hits {
                println!("  [{}]", hit.timestamp.format("%Y-%m-%d %H:%M:%S"));
                println!("    You:    {}", hit.user_message);
                println!("    Falcon: {}", hit.assistant_response.as_deref().unwrap_or("(no answer)"));
            }
        }

        MemoryAction::Notes { query, limit } => {
            let notes = store.search_notes(&query, limit).await?;
            if notes.is_empty() {
                println!("   No notes match \"{query}\".");
            }
            for note in notes {
                print!("  {:>4}. {}", note.id, note.content);
                match note.keywords.as_deref() {
                    Some(keywords) => println!("  [{keywords}]"),
                    None => println!(),
                }
            }
        }

        MemoryAction::Remember { note, keywords } => {
            let id = store.save_note(&note, keywords.as_deref()).await?;
            println!("💾 Saved note {id}.");
        }

        MemoryAction::Forget { id } => {
            if store.delete_note(id).await? {
                println!("🗑️  Note {id} forgotten.");
            } else {
                println!("⚠️  No note with id {id}.");
            }
        }

        MemoryAction::Export { format, output } => {
            let format = ExportFormat::parse(&format)
                .ok_or_else(|| format!("Unsupported format '{format}', expected csv or json"))?;
            let turns = store.all_turns().await?;
            let data = format.render(&turns)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, data)?;
                    println!("📤 Exported {} turns to {path}", turns.len());
                }
                None => print!("{data}"),
            }
        }
    }

    Ok(())
}
