//! `falcon serve`: Start the HTTP API server.

use falcon_config::AppConfig;

pub async fn run(port_override: Option<u16>, host_override: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        config.gateway.host = host;
    }

    println!("🦅 Falcon Gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.default_model);
    println!("   Speech:    {}", if config.speech.enabled { config.speech.engine.as_str() } else { "off" });

    falcon_gateway::start(config).await?;

    Ok(())
}
