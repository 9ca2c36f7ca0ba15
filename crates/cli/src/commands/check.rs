//! `chorus check`: validate the config and resolve every agent's provider
//! and credentials without starting anything.

use std::path::Path;

use chorus_config::AppConfig;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Chorus config check: {}", config_path.display());
    println!("========================================\n");

    if !config_path.exists() {
        println!("  ⚠️  No config file, built-in defaults apply (no agents)");
    }
    let config = match AppConfig::load_from(config_path) {
        Ok(config) => {
            println!("  ✅ Config file valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            return Err("configuration check failed".into());
        }
    };

    let mut issues = 0;

    for (section, service) in [("knowledge_base", &config.knowledge_base), ("web_search", &config.web_search)] {
        match (&service.base_url, &service.credential_alias) {
            (None, _) => println!("  ⚠️  [{section}] not configured, the tool will report errors"),
            (Some(url), Some(alias)) => match config.credential(alias) {
                Ok(_) => println!("  ✅ [{section}] {url}"),
                Err(e) => {
                    println!("  ❌ [{section}] {e}");
                    issues += 1;
                }
            },
            (Some(url), None) => println!("  ✅ [{section}] {url}"),
        }
    }

    if config.agents.is_empty() {
        println!("  ⚠️  No agents configured");
    }
    for agent in &config.agents {
        let state = if agent.enabled { "" } else { " (disabled)" };
        match config.validate_agent(agent) {
            Ok(resolved) => {
                let model = match agent.model.name.as_str() {
                    "" | "default" => resolved
                        .default_model
                        .clone()
                        .unwrap_or_else(|| "provider default".into()),
                    name => name.to_string(),
                };
                println!(
                    "  ✅ {}{state}: {} ({:?}, {model}), {} tool(s)",
                    agent.id,
                    resolved.name,
                    resolved.kind,
                    agent.enabled_tools().len()
                );
            }
            Err(e) => {
                println!("  ❌ {}{state}: {e}", agent.id);
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
        Ok(())
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
        Err(format!("{issues} configuration issue(s)").into())
    }
}
