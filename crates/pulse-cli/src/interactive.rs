use anyhow::Result;
use pulse_services::{MonitorEvent, MonitorHandle, PulseConfig};
use std::io::{self, BufRead, Write};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::output::{self, OutputFormat};

/// Interactive command prompt driving a background monitor
pub async fn run(config: PulseConfig) -> Result<()> {
    let store = crate::open_store(&config)?;

    display_welcome();
    let (handle, worker) =
        crate::start_monitor(&config, store.clone(), config.monitor.interval_secs).await?;
    let printer = tokio::spawn(print_metrics(handle.subscribe()));
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "help" | "h" | "?" => display_help(),
            "start" | "s" => {
                if handle.is_running() {
                    println!("  Monitoring is already running");
                } else if let Err(e) = handle.start() {
                    println!("Error: {}", e);
                } else {
                    println!("  Monitoring started");
                }
            }
            "stop" | "x" => {
                if !handle.is_running() {
                    println!("  Monitoring is not running");
                } else if let Err(e) = handle.stop() {
                    println!("Error: {}", e);
                } else {
                    println!("  Monitoring stopped");
                }
            }
            "interval" | "i" => handle_interval_command(&handle, &parts[1..]),
            "status" => display_status(&handle),
            "list" | "l" => match output::render_records(&store.list_all(), OutputFormat::Table) {
                Ok(table) => print!("{}", table),
                Err(e) => println!("Error: {}", e),
            },
            "clear" => match handle.clear().await {
                Ok(true) => println!("  Monitoring stopped and all metrics cleared"),
                Ok(false) => println!("  Failed to clear metrics, see the log for details"),
                Err(e) => println!("Error: {}", e),
            },
            "info" => crate::cmd_info(&config),
            "exit" | "quit" | "q" => {
                println!("  Goodbye!");
                break;
            }
            _ => {
                println!("Unknown command: {}. Type 'help' for available commands.", cmd);
            }
        }
    }

    crate::stop_monitor(&handle, worker).await?;
    printer.abort();
    Ok(())
}

fn handle_interval_command(handle: &MonitorHandle, args: &[&str]) {
    let Some(raw) = args.first() else {
        println!("Usage: interval <seconds>");
        println!("  Current interval: {}s", handle.state().interval_secs);
        return;
    };

    match raw.parse::<u32>() {
        Ok(seconds) => match handle.set_interval(seconds) {
            Ok(()) => println!("  Sampling every {}s", seconds),
            Err(e) => println!("Error: {}", e),
        },
        Err(_) => println!("Error: interval must be a whole number of seconds"),
    }
}

fn display_status(handle: &MonitorHandle) {
    let state = handle.state();
    println!();
    println!("Monitor Status:");
    println!("{:-<40}", "");
    println!("  Running:  {}", if state.running { "yes" } else { "no" });
    println!("  Interval: {}s", state.interval_secs);
    if state.running {
        println!("  Elapsed:  {}", state.elapsed_text());
    }
    println!();
}

async fn print_metrics(mut events: broadcast::Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::Metrics(snapshot)) => {
                println!("\r  {}", output::snapshot_columns(&snapshot));
            }
            // ticks would scribble over the prompt
            Ok(MonitorEvent::Tick(_)) => {}
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

fn display_welcome() {
    println!();
    println!("  Pulse - host resource monitor");
    println!();
    println!("  Use the interactive commands:");
    println!();
    println!("  start, s               # Start sampling");
    println!("  stop, x                # Stop sampling");
    println!("  interval, i <seconds>  # Change the sampling interval");
    println!("  help                   # Show all command options");
    println!("  quit, q                # Stop monitoring and exit");
    println!();
}

fn display_help() {
    println!();
    println!("Available Commands:");
    println!("  start, s               Start a monitoring session");
    println!("  stop, x                Stop the current session");
    println!("  interval, i <seconds>  Set the sampling interval (applies immediately)");
    println!("  status                 Show session state and elapsed time");
    println!("  list, l                Show stored metrics");
    println!("  clear                  Stop monitoring and delete stored metrics");
    println!("  info                   Show system information");
    println!("  help, h                Show this help message");
    println!("  exit, quit, q          Stop monitoring and exit");
    println!();
    println!("  Columns: {}", output::table_header().trim_start());
    println!();
}
