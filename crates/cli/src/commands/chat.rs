//! `emissary chat` — talk to the persona from the terminal.
//!
//! Interactive mode keeps an in-process history and commits a turn only
//! after a successful reply; a failed turn leaves the history unchanged.

use emissary_config::AppConfig;
use emissary_core::message::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn run(
    config: AppConfig,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = emissary_gateway::build_agent(&config)?;

    // Single-message mode
    if let Some(message) = message {
        let reply = agent.chat(&message, &[]).await?;
        println!("{reply}");
        return Ok(());
    }

    // Interactive mode
    let persona_name = agent.persona().name.clone();
    println!("Chatting with {persona_name}. Press Ctrl-D to exit.");

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"you> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match agent.chat(message, &history).await {
            Ok(reply) => {
                println!("{persona_name}> {reply}");
                history.push(Message::user(message));
                history.push(Message::assistant(reply));
            }
            Err(e) => {
                eprintln!("error: {e}");
            }
        }
    }

    Ok(())
}
