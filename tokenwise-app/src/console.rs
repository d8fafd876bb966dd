//! Line-based operator console

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use tokenwise_client::TransactionStream;
use tokenwise_services::{Subject, ViewController};

use crate::render::{print_lines, render_status, render_view};

const HELP: &str = "Commands: dashboard | holders | live | wallet <n|address> | refresh | \
recent [n] | start | stop | status | dismiss | help | quit";

/// Default number of transactions requested by `recent`
const DEFAULT_RECENT_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Show(Subject),
    /// 1-based position in the holder list
    WalletAt(usize),
    WalletAddress(String),
    Refresh,
    Recent(u32),
    Start,
    Stop,
    Status,
    Dismiss,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Err("empty command".to_string());
    };
    let argument = parts.next();

    let parsed = match (command.to_ascii_lowercase().as_str(), argument) {
        ("dashboard", None) => ConsoleCommand::Show(Subject::Dashboard),
        ("holders", None) => ConsoleCommand::Show(Subject::Holders),
        ("live", None) => ConsoleCommand::Show(Subject::RealtimeFeed),
        ("wallet", None) => ConsoleCommand::Show(Subject::Wallet),
        ("wallet", Some(target)) => match target.parse::<usize>() {
            Ok(0) => return Err("holder positions start at 1".to_string()),
            Ok(position) => ConsoleCommand::WalletAt(position),
            Err(_) => ConsoleCommand::WalletAddress(target.to_string()),
        },
        ("refresh", None) => ConsoleCommand::Refresh,
        ("recent", None) => ConsoleCommand::Recent(DEFAULT_RECENT_LIMIT),
        ("recent", Some(limit)) => ConsoleCommand::Recent(
            limit
                .parse()
                .map_err(|_| format!("invalid limit '{}'", limit))?,
        ),
        ("start", None) => ConsoleCommand::Start,
        ("stop", None) => ConsoleCommand::Stop,
        ("status", None) => ConsoleCommand::Status,
        ("dismiss", None) => ConsoleCommand::Dismiss,
        ("help", _) => ConsoleCommand::Help,
        ("quit" | "exit", None) => ConsoleCommand::Quit,
        _ => return Err(format!("unknown command '{}'", line.trim())),
    };

    if parts.next().is_some() {
        return Err(format!("too many arguments in '{}'", line.trim()));
    }
    Ok(parsed)
}

/// Read commands from stdin until `quit` or end of input
pub async fn run(controller: ViewController, stream: &TransactionStream) -> anyhow::Result<()> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}. {}", e, HELP);
                continue;
            }
        };

        if command == ConsoleCommand::Quit {
            info!("Quit requested");
            break;
        }
        execute(&controller, stream, command).await;
    }

    Ok(())
}

async fn execute(controller: &ViewController, stream: &TransactionStream, command: ConsoleCommand) {
    let engine = controller.engine();

    match command {
        ConsoleCommand::Show(subject) => {
            if controller.set_subject(subject) {
                print_lines(&render_view(&engine.view()));
                controller.acknowledge_render();
            } else {
                println!("Select a wallet first: wallet <n|address>");
            }
        }
        ConsoleCommand::WalletAt(position) => {
            if controller.spawn_select_holder(position - 1).is_none() {
                println!("No holder at position {}", position);
            }
        }
        ConsoleCommand::WalletAddress(address) => {
            controller.spawn_select_wallet(address);
        }
        ConsoleCommand::Refresh => {
            controller.refresh_holders().await;
            print_lines(&render_view(&engine.view()));
        }
        ConsoleCommand::Recent(limit) => {
            if let Err(e) = stream.request_recent_transactions(limit).await {
                warn!("Could not request recent transactions: {}", e);
            }
        }
        ConsoleCommand::Start => {
            if controller.start_monitoring().await {
                println!("Real-time monitoring started");
            }
        }
        ConsoleCommand::Stop => {
            if controller.stop_monitoring().await {
                println!("Real-time monitoring stopped");
            }
        }
        ConsoleCommand::Status => {
            print_lines(&render_status(&engine.view(), &engine.stream_health()));
            if let Err(e) = stream.request_status().await {
                warn!("Could not request backend status: {}", e);
            }
        }
        ConsoleCommand::Dismiss => engine.dismiss_notice(),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subjects() {
        assert_eq!(
            parse_command("dashboard"),
            Ok(ConsoleCommand::Show(Subject::Dashboard))
        );
        assert_eq!(
            parse_command("  LIVE "),
            Ok(ConsoleCommand::Show(Subject::RealtimeFeed))
        );
        assert_eq!(parse_command("wallet"), Ok(ConsoleCommand::Show(Subject::Wallet)));
    }

    #[test]
    fn test_parse_wallet_targets() {
        assert_eq!(parse_command("wallet 3"), Ok(ConsoleCommand::WalletAt(3)));
        assert_eq!(
            parse_command("wallet 9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump"),
            Ok(ConsoleCommand::WalletAddress(
                "9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump".to_string()
            ))
        );
        assert!(parse_command("wallet 0").is_err());
    }

    #[test]
    fn test_parse_recent_limit() {
        assert_eq!(parse_command("recent"), Ok(ConsoleCommand::Recent(10)));
        assert_eq!(parse_command("recent 25"), Ok(ConsoleCommand::Recent(25)));
        assert!(parse_command("recent lots").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_command("").is_err());
        assert!(parse_command("launch rockets").is_err());
        assert!(parse_command("status now").is_err());
        assert_eq!(parse_command("exit"), Ok(ConsoleCommand::Quit));
    }
}
