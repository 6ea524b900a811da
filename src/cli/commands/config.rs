//! Config Command
//!
//! Usage:
//!   repodoc config show [--json]
//!   repodoc config path
//!   repodoc config init [--global] [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Print the merged effective configuration
pub fn show(as_json: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, as_json)?);
    Ok(())
}

/// Print every configuration location and whether it exists
pub fn path() -> Result<()> {
    let config = ConfigLoader::load()?;
    for (label, location, exists) in ConfigLoader::describe_paths(&config) {
        let marker = if exists { "" } else { " (not found)" };
        println!("{:<9} {}{}", format!("{}:", label), location, marker);
    }
    Ok(())
}

pub fn init(global: bool, force: bool) -> Result<()> {
    let output = Output::new();
    let (path, written) = ConfigLoader::init(global, force)?;
    if written {
        output.success(&format!("Initialized configuration at {}", path.display()));
    } else {
        output.info(&format!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    Ok(())
}
