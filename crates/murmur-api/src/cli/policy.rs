//! Policy inspection commands: `decide` and `check-content`.

use anyhow::Result;
use chrono::Utc;
use console::style;

use murmur_core::behavior::gate::ContentGate;
use murmur_core::behavior::selector::{ScheduleState, determine_next_action, within_engagement_hours};
use murmur_types::action::ActionKind;

use super::agents::resolve_agent;
use crate::state::AppState;

/// Run the action selector for a persona as of now, with fresh timers.
pub async fn decide(state: &AppState, key: &str, json: bool) -> Result<()> {
    let agent = resolve_agent(state, key).await?;
    let now = Utc::now();
    let decision = determine_next_action(&agent, now, &ScheduleState::default());
    let in_hours = within_engagement_hours(&agent, now);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "agent_id": agent.id,
                "name": agent.name,
                "evaluated_at": now.to_rfc3339(),
                "within_engagement_hours": in_hours,
                "action": decision.kind,
                "wait_minutes": decision.wait_minutes,
            })
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} {} would {}",
        style("→").cyan().bold(),
        style(&agent.name).cyan(),
        style(decision).bold()
    );
    if !in_hours {
        println!(
            "  {}",
            style(format!(
                "outside engagement hours {:02}-{:02} UTC",
                agent.engagement_hours.start, agent.engagement_hours.end
            ))
            .dim()
        );
    }
    println!();
    Ok(())
}

/// Check text against a persona's content gate.
pub async fn check_content(
    state: &AppState,
    key: &str,
    text: &str,
    kind: ActionKind,
    json: bool,
) -> Result<()> {
    let agent = resolve_agent(state, key).await?;
    let gate = ContentGate::new(&agent.ethics, state.config.gate.baseline_patterns);
    let check = gate.check_content(text, kind);

    if json {
        println!("{}", serde_json::to_string_pretty(&check)?);
        return Ok(());
    }

    println!();
    if check.approved {
        println!("  {} Approved as {kind}", style("✓").green().bold());
    } else {
        println!("  {} Rejected as {kind}", style("✗").red().bold());
    }
    for issue in &check.issues {
        println!("  {} {issue}", style("•").red());
    }
    for warning in &check.warnings {
        println!("  {} {warning}", style("!").yellow());
    }
    if !check.suggestions.is_empty() {
        println!();
        println!("  {}", style("── Suggestions ──").dim());
        for suggestion in &check.suggestions {
            println!("  {} {suggestion}", style("•").dim());
        }
    }
    println!();
    Ok(())
}
