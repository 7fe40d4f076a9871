//! Persona management commands: list, show, import, activate, deactivate.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Deserialize;

use murmur_core::repository::character::{AgentFilter, CharacterRepository};
use murmur_types::agent::{Agent, AgentId, AgentPatch, NewAgent};

use crate::state::AppState;

/// Find a persona by id, falling back to a case-insensitive name match.
pub async fn resolve_agent(state: &AppState, key: &str) -> Result<Agent> {
    if let Ok(id) = key.parse::<AgentId>() {
        if let Some(agent) = state.repo.get(&id).await? {
            return Ok(agent);
        }
    }

    let agents = state.repo.list(None).await?;
    agents
        .into_iter()
        .find(|a| a.name.eq_ignore_ascii_case(key))
        .with_context(|| format!("no persona with id or name '{key}'"))
}

/// List personas in a table.
pub async fn list_agents(state: &AppState, active_only: bool, json: bool) -> Result<()> {
    let filter = active_only.then(AgentFilter::active_only);
    let agents = state.repo.list(filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!();
        println!(
            "  {} No personas found. Import some with: {}",
            style("i").blue().bold(),
            style("murmur agents import <file>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Hours (UTC)").fg(Color::White),
        Cell::new("Tweets").fg(Color::White),
        Cell::new("Replies").fg(Color::White),
        Cell::new("ID").fg(Color::White),
    ]);

    for agent in &agents {
        let status = if agent.active {
            Cell::new("● active").fg(Color::Green)
        } else {
            Cell::new("○ inactive").fg(Color::Yellow)
        };
        let tweets = match agent.tweet_settings.interval_minutes() {
            Some(minutes) => format!("every {minutes} min"),
            None => "off".to_string(),
        };
        let replies = if agent.reply_settings.wants_mentions() {
            format!("on ({} answered)", agent.reply_settings.replied_ids.len())
        } else {
            "off".to_string()
        };

        table.add_row(vec![
            Cell::new(&agent.name).fg(Color::Cyan),
            status,
            Cell::new(format!(
                "{:02}-{:02}",
                agent.engagement_hours.start, agent.engagement_hours.end
            )),
            Cell::new(tweets),
            Cell::new(replies),
            Cell::new(agent.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} persona{}",
        style(agents.len()).bold(),
        if agents.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

/// Show a persona's full profile.
pub async fn show_agent(state: &AppState, key: &str, json: bool) -> Result<()> {
    let agent = resolve_agent(state, key).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agent)?);
        return Ok(());
    }

    println!();
    println!("  {}", style(&agent.name).cyan().bold());
    if !agent.persona.bio.is_empty() {
        println!("  {}", style(&agent.persona.bio).dim());
    }
    println!();

    println!("  {}", style("── Schedule ──").dim());
    println!(
        "  {}   {}",
        style("Status:").bold(),
        if agent.active {
            style("active").green()
        } else {
            style("inactive").yellow()
        }
    );
    println!(
        "  {}    {:02}:00-{:02}:59 UTC",
        style("Hours:").bold(),
        agent.engagement_hours.start,
        agent.engagement_hours.end
    );
    match agent.tweet_settings.interval_minutes() {
        Some(minutes) => println!("  {}   every {minutes} min", style("Tweets:").bold()),
        None => println!("  {}   off", style("Tweets:").bold()),
    }
    println!(
        "  {}  {} ({} answered)",
        style("Replies:").bold(),
        if agent.reply_settings.wants_mentions() { "on" } else { "off" },
        agent.reply_settings.replied_ids.len()
    );
    println!();

    println!("  {}", style("── Voice ──").dim());
    if !agent.content_focus.is_empty() {
        println!("  {}    {}", style("Focus:").bold(), agent.content_focus.join(", "));
    }
    if !agent.persona.tone.is_empty() {
        println!("  {}     {}", style("Tone:").bold(), agent.persona.tone);
    }
    if !agent.persona.key_traits.is_empty() {
        println!("  {}   {}", style("Traits:").bold(), agent.persona.key_traits.join(", "));
    }
    println!();

    let ethics = &agent.ethics;
    if !ethics.ethical_boundaries.is_empty()
        || !ethics.content_restrictions.is_empty()
        || !ethics.sensitive_topics.is_empty()
    {
        println!("  {}", style("── Content policy ──").dim());
        for boundary in &ethics.ethical_boundaries {
            println!("  {} boundary: {boundary}", style("•").dim());
        }
        for restriction in &ethics.content_restrictions {
            println!("  {} restriction: {restriction}", style("•").dim());
        }
        for (topic, handling) in &ethics.sensitive_topics {
            println!("  {} topic: {topic} ({handling})", style("•").dim());
        }
        println!();
    }

    println!("  {}", style("── Timestamps ──").dim());
    println!(
        "  {}  {}",
        style("Created:").bold(),
        agent.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "  {}  {}",
        style("Updated:").bold(),
        agent.updated_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!("  {}       {}", style("ID:").bold(), style(agent.id.to_string()).dim());
    println!();
    Ok(())
}

/// TOML import files hold a list of personas under `agents`.
#[derive(Deserialize)]
struct TomlImport {
    agents: Vec<NewAgent>,
}

/// Accepts a single JSON object, a JSON array, or TOML with `[[agents]]`.
fn parse_import(path: &Path, content: &str) -> Result<Vec<NewAgent>> {
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        let parsed: TomlImport =
            toml::from_str(content).with_context(|| format!("invalid TOML in {}", path.display()))?;
        return Ok(parsed.agents);
    }

    let value: serde_json::Value = serde_json::from_str(content)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    let drafts = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(drafts)
}

/// Import personas from a file. Stops at the first invalid entry.
pub async fn import_agents(state: &AppState, path: &Path, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let drafts = parse_import(path, &content)?;
    if drafts.is_empty() {
        bail!("{} contains no personas", path.display());
    }

    let mut created = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let name = draft.name.clone();
        let agent = draft
            .into_agent()
            .map_err(|e| anyhow::anyhow!("persona '{name}': {e}"))?;
        created.push(state.repo.create(&agent).await?);
        tracing::info!(agent_id = %agent.id, name = %agent.name, "persona imported");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
        return Ok(());
    }

    println!();
    for agent in &created {
        println!(
            "  {} Imported {} {}",
            style("✓").green().bold(),
            style(&agent.name).cyan(),
            style(agent.id.to_string()).dim()
        );
    }
    println!();
    Ok(())
}

/// Flip a persona's `active` flag.
pub async fn set_active(state: &AppState, key: &str, active: bool, json: bool) -> Result<()> {
    let agent = resolve_agent(state, key).await?;
    let updated = state
        .repo
        .update(&agent.id, &AgentPatch::active(active))
        .await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"id": updated.id, "name": updated.name, "active": updated.active})
        );
    } else {
        println!(
            "  {} {} is now {}",
            style("✓").green().bold(),
            style(&updated.name).cyan(),
            if updated.active { "active" } else { "inactive" }
        );
    }
    Ok(())
}
