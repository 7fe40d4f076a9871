//! `config show`: print the effective engine configuration.

use anyhow::Result;
use console::style;

use murmur_infra::config::CONFIG_FILE;

use crate::state::AppState;

pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state.config.as_ref())?);
        return Ok(());
    }

    let path = state.data_dir.join(CONFIG_FILE);
    println!();
    println!(
        "  {} {}",
        style("# effective configuration, overrides read from").dim(),
        style(path.display()).dim()
    );
    println!();
    print!("{}", toml::to_string_pretty(state.config.as_ref())?);
    println!();
    Ok(())
}
