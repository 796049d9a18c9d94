//! Interactive console front end.
//!
//! Plays the part of the original toggle-button screen: renders status lines
//! from controller events, lets the user toggle interception and edit the
//! blocklist, and applies saved edits to the running tunnel.

use color_eyre::Result;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{debug, warn};

use tunblock::constants;
use tunblock::core::{BlocklistStore, EventListener, Listener, SessionController};
use tunblock::error::{ConnectError, RejectedOperation};
use tunblock::event::EventQueue;
use tunblock::state::{BlockedIpSet, Event, State};
use tunblock::vpn::PacketFilter;

/// One parsed console line.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Toggle,
    Connect,
    Disconnect,
    Status,
    Add(String),
    Remove(String),
    List,
    Save,
    Stats,
    Help,
    Quit,
}

impl ConsoleCommand {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?.to_lowercase();
        let arg = words.next().map(str::to_string);
        if words.next().is_some() {
            return None;
        }

        match (command.as_str(), arg) {
            ("toggle" | "t", None) => Some(Self::Toggle),
            ("connect", None) => Some(Self::Connect),
            ("disconnect", None) => Some(Self::Disconnect),
            ("status", None) => Some(Self::Status),
            ("add", Some(ip)) => Some(Self::Add(ip)),
            ("remove" | "rm", Some(ip)) => Some(Self::Remove(ip)),
            ("list" | "ls", None) => Some(Self::List),
            ("save", None) => Some(Self::Save),
            ("stats", None) => Some(Self::Stats),
            ("help" | "?", None) => Some(Self::Help),
            ("quit" | "exit" | "q", None) => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Status text for a lifecycle state.
fn status_text(state: State) -> &'static str {
    match state {
        State::Disconnected => constants::MSG_NOT_INTERCEPTING,
        State::Connecting => constants::MSG_PREPARING,
        State::Connected => constants::MSG_INTERCEPTING,
        State::Disconnecting => constants::MSG_STOPPING,
    }
}

/// Renders controller events as status lines.
struct StatusView;

impl EventListener for StatusView {
    fn on_event(&self, event: Event) {
        println!("  [{}]", status_text(event.resulting_state()));
        match event {
            Event::NetworkError => println!("  ! {}", constants::MSG_NETWORK_ERROR),
            Event::CouldntInitialize => println!("  ! {}", constants::MSG_COULDNT_INITIALIZE),
            _ => {}
        }
    }
}

struct Console<'a> {
    controller: &'a SessionController,
    engine: &'a PacketFilter,
    store: &'a BlocklistStore,
    edits: BlockedIpSet,
    dirty: bool,
}

impl Console<'_> {
    fn lifecycle(&self, outcome: Result<(), ConnectError>) {
        match outcome {
            Ok(()) => {}
            Err(ConnectError::Rejected(RejectedOperation::NotReady(state))) if state.is_transitional() => {
                println!("  {}", constants::MSG_TRY_AGAIN);
            }
            Err(ConnectError::Rejected(RejectedOperation::Disabled)) => {
                println!("  ! {}", constants::MSG_COULDNT_INITIALIZE);
            }
            Err(ConnectError::Rejected(e)) => println!("  {e}"),
            // Already reported through NETWORK_ERROR.
            Err(ConnectError::Tunnel(e)) => debug!(error = %e, "Connect failed"),
        }
    }

    /// Executes one command. Returns `false` when the console should exit.
    fn execute(&mut self, command: ConsoleCommand) -> bool {
        match command {
            ConsoleCommand::Toggle => self.lifecycle(self.controller.toggle()),
            ConsoleCommand::Connect => self.lifecycle(self.controller.connect()),
            ConsoleCommand::Disconnect => {
                self.lifecycle(self.controller.disconnect().map_err(ConnectError::from));
            }
            ConsoleCommand::Status => {
                let state = self.controller.current_state();
                println!("  [{}]", status_text(state));
                if state == State::Connected && !self.controller.is_intercepting() {
                    println!("  ! {}", constants::MSG_ENGINE_STOPPED);
                }
            }
            ConsoleCommand::Add(ip) => match self.edits.insert(&ip) {
                Ok(true) => {
                    self.dirty = true;
                    println!("  + {ip}");
                }
                Ok(false) => println!("  {}{ip}", constants::CLI_MSG_ALREADY_BLOCKED),
                Err(e) => println!("  ! {e}"),
            },
            ConsoleCommand::Remove(ip) => match self.edits.remove(&ip) {
                Ok(true) => {
                    self.dirty = true;
                    println!("  - {ip}");
                }
                Ok(false) => println!("  {}{ip}", constants::CLI_MSG_NOT_BLOCKED),
                Err(e) => println!("  ! {e}"),
            },
            ConsoleCommand::List => {
                if self.edits.is_empty() {
                    println!("{}", constants::CLI_MSG_EMPTY);
                }
                for ip in &self.edits {
                    println!("  • {ip}");
                }
                if self.dirty {
                    println!("  ({})", constants::CLI_MSG_UNSAVED);
                }
            }
            ConsoleCommand::Save => match self.store.save(&self.edits) {
                Ok(()) => {
                    self.controller.push_blocklist(self.edits.clone());
                    self.dirty = false;
                    println!("  {}", constants::MSG_BLOCKLIST_SAVED);
                }
                Err(e) => {
                    warn!(error = %e, "Saving blocklist failed");
                    println!("  ! {e}");
                }
            },
            ConsoleCommand::Stats => {
                let stats = self.engine.stats();
                println!(
                    "  inspected {}  dropped {}  forwarded {}  errors {}",
                    stats.inspected, stats.dropped, stats.forwarded, stats.errors
                );
                if self.controller.current_state() == State::Connected
                    && !self.controller.is_intercepting()
                {
                    println!("  ! {}", constants::MSG_ENGINE_STOPPED);
                }
            }
            ConsoleCommand::Help => println!("{}", constants::CONSOLE_HELP),
            ConsoleCommand::Quit => return false,
        }
        true
    }
}

/// Runs the console until `quit` or end of input, then closes the tunnel.
pub fn run(
    controller: &SessionController,
    engine: &PacketFilter,
    store: &BlocklistStore,
) -> Result<()> {
    let queue = EventQueue::new();
    let view = Arc::new(StatusView);
    controller.set_listener(Some(Listener::new(&view, queue.context())));

    println!("{} v{}", constants::APP_NAME, constants::APP_VERSION);
    if let Err(e) = controller.initialize() {
        debug!(error = %e, "Initialization failed");
    }
    queue.drain();

    let mut console = Console {
        controller,
        engine,
        store,
        edits: BlockedIpSet::clone(&controller.current_blocklist()),
        dirty: false,
    };

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", constants::PROMPT);
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            queue.drain();
            continue;
        }

        let keep_going = match ConsoleCommand::parse(&line) {
            Some(command) => console.execute(command),
            None => {
                println!("  {}", constants::CLI_MSG_UNKNOWN_COMMAND);
                true
            }
        };
        queue.drain();

        if !keep_going {
            break;
        }
    }

    if controller.current_state() == State::Connected {
        let _ = controller.disconnect();
        queue.drain();
    }
    controller.set_listener(None);
    Ok(())
}
