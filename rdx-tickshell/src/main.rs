use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use ticker::prelude::*;
use ticker::{ENGINE_NAME, VERSION as LIB_VERSION};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", "  tickshell :: interactive timer console".cyan().bold());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(64).dimmed());
    println!("{}", version_string);
    println!(
        "{}",
        "    Distributed under the MIT OR Apache-2.0 license.".dimmed()
    );
    println!("{}", "-".repeat(64).dimmed());
}

/// A timer created from the shell, plus the task printing its ticks if it
/// is being watched.
struct ShellTimer {
    timer: Timer,
    watcher: Option<JoinHandle<()>>,
}

impl ShellTimer {
    fn unwatch(&mut self) -> bool {
        match self.watcher.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

/// The shell's state: the service and the timers it created, keyed by a
/// small handle number that is easy to type.
struct Shell {
    service: TickerService,
    timers: BTreeMap<usize, ShellTimer>,
    next_handle: usize,
}

impl Shell {
    fn new(service: TickerService) -> Self {
        Self {
            service,
            timers: BTreeMap::new(),
            next_handle: 0,
        }
    }

    fn execute(&mut self, args: &[&str]) -> Result<(), String> {
        let Some(command) = args.first() else {
            return Ok(());
        };
        match *command {
            "new" => {
                let period = parse_millis(args.get(1), "new <MS>")?;
                let timer = self.service.create_timer(period);
                let handle = self.next_handle;
                self.next_handle += 1;
                println!(
                    "--> Created {}ms timer with handle: #{}",
                    period.as_millis(),
                    handle
                );
                self.timers.insert(
                    handle,
                    ShellTimer {
                        timer,
                        watcher: None,
                    },
                );
            }
            "start" => {
                let entry = self.lookup(args.get(1), "start <H>")?;
                entry.timer.start().map_err(|e| format!("Error: {}", e))?;
                println!("--> Timer started.");
            }
            "stop" => {
                let entry = self.lookup(args.get(1), "stop <H>")?;
                tokio::task::block_in_place(|| entry.timer.stop());
                println!("--> Timer stopped at tick #{}.", entry.timer.count());
            }
            "speed" => {
                let value = args.get(2).copied();
                let entry = self.lookup(args.get(1), "speed <H> [MS]")?;
                match value {
                    Some(_) => {
                        let period = parse_millis(value.as_ref(), "speed <H> [MS]")?;
                        entry.timer.set_speed(period);
                        println!("--> Period set to {}ms.", period.as_millis());
                    }
                    None => println!("--> Period: {:?}", entry.timer.speed()),
                }
            }
            "count" => {
                let value = args.get(2).copied();
                let entry = self.lookup(args.get(1), "count <H> [VALUE]")?;
                match value {
                    Some(value) => {
                        let count = value
                            .parse::<i64>()
                            .map_err(|_| format!("Error: '{}' is not a valid count.", value))?;
                        entry.timer.set_count(count);
                        println!("--> Count set to {}.", count);
                    }
                    None => println!("--> Count: {}", entry.timer.count()),
                }
            }
            "watch" => {
                let entry = self.lookup(args.get(1), "watch <H>")?;
                entry.unwatch();
                entry.watcher = Some(spawn_tick_printer(&entry.timer));
                println!("--> Watching timer ticks.");
            }
            "unwatch" => {
                let entry = self.lookup(args.get(1), "unwatch <H>")?;
                if entry.unwatch() {
                    println!("--> Stopped watching.");
                } else {
                    println!("--> Timer was not being watched.");
                }
            }
            "destroy" => {
                let handle = parse_handle(args.get(1), "destroy <H>")?;
                let mut entry = self
                    .timers
                    .remove(&handle)
                    .ok_or_else(|| invalid_handle(handle))?;
                entry.unwatch();
                tokio::task::block_in_place(|| entry.timer.destroy());
                println!("--> Timer #{} destroyed.", handle);
            }
            "list" => {
                println!("Timers:");
                for (handle, entry) in &self.timers {
                    let state = if entry.timer.is_running() {
                        "running".green()
                    } else {
                        "stopped".dimmed()
                    };
                    println!(
                        "  Handle #{}: {:?} every {:?}, {} ticks, {}{}",
                        handle,
                        entry.timer.id(),
                        entry.timer.speed(),
                        entry.timer.count(),
                        state,
                        if entry.watcher.is_some() { ", watched" } else { "" }
                    );
                }
            }
            "status" => {
                println!(
                    "Driver: {}, active timers: {}, outstanding timers: {}",
                    if self.service.driver_running() {
                        "running".green()
                    } else {
                        "idle".dimmed()
                    },
                    self.service.active_timers(),
                    self.service.outstanding_timers()
                );
            }
            "help" => {
                println!("Available commands:");
                println!("  new <MS>              - Creates a stopped timer ticking every MS milliseconds.");
                println!("  start <H>             - Starts a timer by its handle.");
                println!("  stop <H>              - Stops a timer.");
                println!("  speed <H> [MS]        - Shows or changes a timer's period.");
                println!("  count <H> [VALUE]     - Shows or overwrites a timer's tick count.");
                println!("  watch <H>             - Prints a timer's tick events as they arrive.");
                println!("  unwatch <H>           - Stops printing a timer's ticks.");
                println!("  destroy <H>           - Stops and releases a timer.");
                println!("  list                  - Shows the shell's timers and their handles.");
                println!("  status                - Shows the driver state.");
                println!("  exit                  - Quits the shell.");
            }
            _ => return Err(format!("Unknown command: '{}'. Type 'help'.", command)),
        }
        Ok(())
    }

    fn lookup(&mut self, arg: Option<&&str>, usage: &str) -> Result<&mut ShellTimer, String> {
        let handle = parse_handle(arg, usage)?;
        self.timers
            .get_mut(&handle)
            .ok_or_else(|| invalid_handle(handle))
    }

    fn close(&mut self) {
        for entry in self.timers.values_mut() {
            entry.unwatch();
        }
        tokio::task::block_in_place(|| {
            self.timers.clear();
            self.service.shutdown();
        });
    }
}

fn parse_handle(arg: Option<&&str>, usage: &str) -> Result<usize, String> {
    let arg = arg.ok_or_else(|| format!("Usage: {}", usage))?;
    arg.parse::<usize>()
        .map_err(|_| "Error: Handle must be a number (e.g., '0', '1').".to_string())
}

fn parse_millis(arg: Option<&&str>, usage: &str) -> Result<Duration, String> {
    let arg = arg.ok_or_else(|| format!("Usage: {}", usage))?;
    match arg.parse::<u64>() {
        Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis)),
        _ => Err(format!(
            "Error: '{}' is not a valid number of milliseconds.",
            arg
        )),
    }
}

fn invalid_handle(handle: usize) -> String {
    format!(
        "Error: Invalid handle #{}. Use 'list' to see your timers.",
        handle
    )
}

/// Spawns a task printing each tick of `timer` with the wall-clock time it
/// was received.
fn spawn_tick_printer(timer: &Timer) -> JoinHandle<()> {
    let mut tick_rx = timer.subscribe();
    tokio::spawn(async move {
        loop {
            match tick_rx.recv().await {
                Ok(event) => println!(
                    "<-- [{}] {:?} tick #{} (t={:.3}s)",
                    Local::now().format("%H:%M:%S%.3f"),
                    event.source,
                    event.count,
                    event.timestamp.as_secs_f64()
                ),
                Err(RecvError::Lagged(missed)) => println!("<-- [WATCH] missed {} ticks", missed),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Spawns a task reporting driver lifecycle events.
fn spawn_system_listener(service: &TickerService) {
    let mut system_rx = service.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            match event {
                SystemEvent::DriverStarted { .. }
                | SystemEvent::DriverStopped
                | SystemEvent::TicksSkipped { .. } => {
                    println!("\n<-- [SYSTEM EVENT] {:?}", event);
                }
                _ => {}
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let config =
        TickerConfig::load(config_path.as_deref()).context("Failed to load ticker configuration")?;
    let service = TickerService::new(config).context("Failed to create ticker service")?;
    spawn_system_listener(&service);
    info!("{} service ready.", ENGINE_NAME);

    let mut shell = Shell::new(service);

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter {}));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();
                if args.first() == Some(&"exit") {
                    break;
                }
                if let Err(message) = shell.execute(&args) {
                    println!("{}", message);
                }
            }
            Err(_) => break,
        }
    }

    println!("Exiting tickshell...");
    shell.close();
    Ok(())
}
