//! `emissary init` — write a starter config file.

use emissary_config::AppConfig;
use std::path::Path;

pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!("{} already exists, not overwriting", path.display()).into());
    }

    std::fs::write(path, AppConfig::default_toml())?;
    println!("Wrote {}", path.display());
    println!("Set AZURE_OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT, PUSHOVER_TOKEN and PUSHOVER_USER,");
    println!("put your resume PDF and experience note where [persona] points, then run `emissary serve`.");
    Ok(())
}
