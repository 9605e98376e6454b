//! Interactive REPL over stdin.

use std::io::Write;

use magnifyingmed_core::metrics::SessionMetrics;
use magnifyingmed_core::{ConversationOrchestrator, prompts};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};

/// A line the REPL handles itself instead of passing to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Quit,
    Reset,
    Skip,
}

pub(crate) fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Some(Command::Skip);
    }
    match trimmed.to_lowercase().as_str() {
        "quit" | "exit" | "q" => Some(Command::Quit),
        "reset" => Some(Command::Reset),
        _ => None,
    }
}

/// Headline numbers of a session, without the raw claim and gap records.
pub(crate) fn metrics_summary(metrics: &SessionMetrics) -> Value {
    json!({
        "session_id": metrics.session_id,
        "citation_verification_rate": metrics.citation_verification_rate,
        "false_uncited_claims_rate": metrics.false_uncited_claims_rate,
        "demographic_flagging_rate": metrics.demographic_flagging_rate,
        "median_response_time": metrics.median_response_time,
        "time_to_first_vetted_gap": metrics.time_to_first_vetted_gap,
        "total_claims": metrics.total_claims,
        "total_gaps": metrics.total_gaps,
        "total_responses": metrics.total_responses,
        "session_duration": metrics.session_duration,
    })
}

fn prompt() {
    print!("\n\x1b[1mYou:\x1b[0m ");
    let _ = std::io::stdout().flush();
}

pub(crate) async fn run_interactive(mut session: ConversationOrchestrator) -> anyhow::Result<()> {
    println!("\n\x1b[32mMagnifyingMed:\x1b[0m {}", session.greeting());
    println!("\x1b[90mType 'reset' to start over, 'quit' to exit.\x1b[0m");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        };

        match parse_command(&line) {
            Some(Command::Skip) => continue,
            Some(Command::Quit) => break,
            Some(Command::Reset) => {
                session.reset();
                println!(
                    "\n\x1b[32mMagnifyingMed:\x1b[0m Starting fresh. {}",
                    prompts::ASK_FOR_FIELD
                );
                continue;
            }
            None => {}
        }

        let reply = session.handle_message(line.trim()).await;
        println!("\n\x1b[32mMagnifyingMed:\x1b[0m {}", reply);
    }

    let metrics = session.end_session();
    println!("\nSession metrics:");
    println!("{}", serde_json::to_string_pretty(&metrics_summary(&metrics))?);
    Ok(())
}
