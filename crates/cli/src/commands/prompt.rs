//! `emissary prompt` — print the assembled system prompt.

use emissary_config::AppConfig;
use emissary_persona::{Persona, PersonaPaths};

pub fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let persona = Persona::load(&PersonaPaths {
        name: config.persona.name.clone(),
        resume_path: config.persona.resume_path.clone(),
        experience_path: config.persona.experience_path.clone(),
    })?;

    eprintln!("{}", persona.diagnostic_summary());
    println!("{}", persona.system_prompt());
    Ok(())
}
