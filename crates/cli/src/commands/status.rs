//! `falcon status`: Show configuration summary.

use falcon_config::AppConfig;

fn enabled(slot: &Option<falcon_config::CommandConfig>) -> &'static str {
    if slot.is_some() { "enabled" } else { "disabled" }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🦅 Falcon Status");
    println!("================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Provider:     {} ({})", config.default_provider, config.api_url);
    println!("  Model:        {}", config.default_model);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Memory:       {}", config.memory.backend);
    if config.memory.backend == "sqlite" {
        println!("  Database:     {}", config.memory.resolved_database_path());
    }
    println!(
        "  Speech:       {}",
        if config.speech.enabled { config.speech.engine.as_str() } else { "off" }
    );
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Tasks:        {}", enabled(&config.collaborators.task_executor));
    println!("  Images:       {}", enabled(&config.collaborators.image_generator));
    println!("  Content:      {}", enabled(&config.collaborators.content_generator));
    println!("  Music:        {}", enabled(&config.collaborators.music_player));

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file - run `falcon onboard` first");
    }

    Ok(())
}
