//! `falcon chat`: Interactive console or single-message mode.

use falcon_config::AppConfig;
use falcon_gateway::Assistant;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>, no_speech: bool, ephemeral: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if no_speech {
        config.speech.enabled = false;
    }
    if ephemeral {
        config.memory.backend = "memory".into();
    }

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GROQ_API_KEY=gsk_...      (default provider)");
        eprintln!("    OPENAI_API_KEY=sk-...     (with FALCON_BASE_URL=https://api.openai.com/v1)");
        eprintln!("    FALCON_API_KEY=...        (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let assistant = falcon_gateway::build_assistant(&config).await;
    if !assistant.is_ready() {
        return Err(falcon_gateway::assistant::NOT_INITIALIZED.into());
    }
    let speak = config.speech.enabled;

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let reply = assistant.process_user_query(&msg).await;
        eprint!("\r              \r");
        println!("{}", reply.response);

        if speak && reply.should_speak && assistant.request_speech(&reply.response).await {
            while assistant.speech().is_speaking() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        assistant.shutdown().await;
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Falcon - Interactive Console        ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Memory:    {}", config.memory.backend);
    println!("  Speech:    {}", if speak { assistant.speech().engine_name() } else { "off" });
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/stop' interrupts speech, 'exit' or Ctrl+D quits.");
    println!();

    interactive(&assistant, speak).await?;

    assistant.shutdown().await;
    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

async fn interactive(assistant: &Assistant, speak: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "exit" | "quit" => break,
            "/stop" => {
                assistant.stop_speech();
                continue;
            }
            _ => {}
        }

        eprint!("  ...");
        let reply = assistant.process_user_query(line).await;
        eprint!("\r     \r");
        println!();
        for text_line in reply.response.lines() {
            println!("  Falcon > {text_line}");
        }
        println!();

        if speak && reply.should_speak {
            assistant.request_speech(&reply.response).await;
        }
    }

    Ok(())
}
