//! `chorus agents`: list configured agents.

use std::path::Path;

use chorus_config::AppConfig;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        AppConfig::load_from(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if config.agents.is_empty() {
        println!("No agents configured in {}", config_path.display());
        return Ok(());
    }

    println!("{:<16} {:<16} {:<24} {:<8} TRIGGERS", "ID", "PARTICIPANT", "MODEL", "STATUS");
    for agent in &config.agents {
        let caps = &agent.capabilities;
        let mut triggers = Vec::new();
        if caps.responds_when_addressed {
            triggers.push("addressed");
        }
        if caps.responds_proactively {
            triggers.push("proactive");
        }
        if caps.can_summarize && agent.runtime.summarize_every > 0 {
            triggers.push("summarize");
        }

        println!(
            "{:<16} {:<16} {:<24} {:<8} {}",
            agent.id,
            agent.participant_id,
            format!("{}/{}", agent.model.provider, agent.model.name),
            if agent.enabled { "enabled" } else { "disabled" },
            triggers.join(",")
        );
        let tools: Vec<&str> = agent.enabled_tools().iter().map(|t| t.as_str()).collect();
        println!("{:<16} tools: {}", "", tools.join(", "));
    }
    Ok(())
}
