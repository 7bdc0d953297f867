// Interactive terminal chat. Each line is one standalone turn; replies are
// revealed through the same cursor the web page uses.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use crate::completion::CompletionClient;
use crate::config::{ApiKey, Config};
use crate::dashboard::Dashboard;
use crate::prompt::Category;
use crate::reveal::reveal_stream;
use crate::session::Session;

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq)]
enum Input {
    Query(String),
    Mode(String),
    Clear,
    Dashboard,
    Help,
    Quit,
    Empty,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Query(line.to_string());
    };
    let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "mode" => Input::Mode(arg.trim().to_string()),
        "clear" => Input::Clear,
        "dashboard" => Input::Dashboard,
        "quit" | "exit" => Input::Quit,
        "help" => Input::Help,
        // Unknown commands go to the advisor as-is
        _ => Input::Query(line.to_string()),
    }
}

fn print_help() {
    println!("Commands: /mode <strategy|idea-gen|competition>, /clear, /dashboard, /quit");
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>, prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush().context("Failed to flush stdout")?;
    lines.next_line().await.context("Failed to read from stdin")
}

pub async fn run_chat(config: &Config, client: CompletionClient, mode: Category) -> Result<()> {
    info!(mode = mode.slug(), "Starting interactive chat session...");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    let client = if client.has_credential() {
        client
    } else {
        println!("No API key found in {}.", config.secrets_path.display());
        let key = read_line(&mut lines, "Gemini API key (leave empty to skip): ")
            .await?
            .and_then(ApiKey::new);
        client.with_credential(key)
    };

    let mut session = Session::new(mode);
    println!("Startup Advisor ({}), mode {}. Type /help for commands.", client.model(), session.mode);

    while let Some(line) = read_line(&mut lines, "> ").await? {
        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => print_help(),
            Input::Clear => {
                session.clear();
                println!("Chat cleared.");
            }
            Input::Dashboard => print!("{}", Dashboard::from_record(session.chart()).to_text()),
            Input::Mode(name) => match name.parse::<Category>() {
                Ok(category) => {
                    session.set_mode(category);
                    println!("Mode: {}", category);
                }
                Err(e) => println!("{}", e),
            },
            Input::Query(query) => {
                let before = session.chart().clone();
                let prose = session.ask(&client, &query).await;

                let mut frames = reveal_stream(prose, config.reveal_step, config.reveal_delay);
                let mut shown = 0;
                let mut stdout = std::io::stdout();
                while let Some(frame) = frames.recv().await {
                    write!(stdout, "{}", &frame.text[shown..]).context("Failed to write reply")?;
                    stdout.flush().context("Failed to flush stdout")?;
                    shown = frame.text.len();
                }
                println!();

                if session.chart() != &before {
                    print!("{}", Dashboard::from_record(session.chart()).to_text());
                }
            }
        }
    }

    info!("Chat session finished.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_queries() {
        assert_eq!(parse_input("  "), Input::Empty);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/clear"), Input::Clear);
        assert_eq!(parse_input("/dashboard"), Input::Dashboard);
        assert_eq!(parse_input("/mode idea-gen"), Input::Mode("idea-gen".to_string()));
        assert_eq!(parse_input("should we raise?"), Input::Query("should we raise?".to_string()));
        assert_eq!(parse_input("/etc/hosts is weird"), Input::Query("/etc/hosts is weird".to_string()));
    }
}
