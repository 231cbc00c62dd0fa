//! relay-chat - line-oriented chat client.
//!
//! Type a message and press enter. Replies stream in as they arrive.
//! Commands: `/new` starts over, `/stop` (or Ctrl-C) stops a reply,
//! `/quit` exits. Ctrl-C with no reply in flight also exits.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use chat_relay_client::{movies, ChatSession, HttpChatClient, SessionEvent, SignalBus, UiSignal};
use chat_relay_core::Role;
use chat_relay_store::FileStorage;

/// Chat with the model through a chat-relay gateway.
#[derive(Parser, Debug)]
#[command(name = "relay-chat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gateway URL.
    #[arg(
        long,
        env = "CHAT_RELAY_GATEWAY",
        default_value = "http://localhost:8080"
    )]
    gateway: String,

    /// Directory where the conversation is saved.
    #[arg(long, env = "CHAT_RELAY_DATA_DIR", default_value = ".chat-relay")]
    data_dir: PathBuf,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

/// A line of user input.
enum Command<'a> {
    New,
    Stop,
    Quit,
    Say(&'a str),
    Nothing,
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Self::Nothing,
            "/new" => Self::New,
            "/stop" => Self::Stop,
            "/quit" | "/exit" => Self::Quit,
            text => Self::Say(text),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter("chat_relay=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let storage = Arc::new(FileStorage::open(&args.data_dir)?);
    let transport = Arc::new(HttpChatClient::new(&args.gateway));
    let signals = SignalBus::new();
    let session = ChatSession::new(transport, storage, signals.clone());

    let mut events = session.subscribe();
    let mut panel = signals.subscribe();

    println!("Connected to {} - /new, /stop, /quit", args.gateway);
    for message in session.transcript() {
        println!("{}> {}", message.role, message.content);
    }
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Command::Quit => break,
                    Command::New => session.new_chat(),
                    Command::Stop => {
                        if !session.stop() {
                            println!("Nothing to stop.");
                            prompt();
                        }
                    }
                    Command::Nothing => prompt(),
                    Command::Say(_) if session.request_state().is_loading => {
                        println!("A reply is still streaming; /stop it first.");
                    }
                    Command::Say(text) => {
                        let session = session.clone();
                        let text = text.to_string();
                        tokio::spawn(async move {
                            session.send(&text).await;
                        });
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                if !session.stop() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => render(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Display fell behind the reply stream");
                }
                Err(RecvError::Closed) => break,
            },
            signal = panel.recv() => {
                if let Ok(UiSignal::OpenMoviePanel) = signal {
                    print!("\n{}", movies::render_panel());
                }
            }
        }
    }

    session.stop();
    Ok(())
}

fn render(event: &SessionEvent) {
    match event {
        SessionEvent::MessageAppended(message) if message.role == Role::Assistant => {
            print!("assistant> {}", message.content);
            flush();
        }
        SessionEvent::MessageAppended(_) => {}
        SessionEvent::Delta { text, .. } => {
            print!("{text}");
            flush();
        }
        SessionEvent::Completed => {
            println!();
            prompt();
        }
        SessionEvent::Cancelled => {
            println!(" [stopped]");
            prompt();
        }
        SessionEvent::Failed { message, help } => {
            println!();
            eprintln!("error: {message}");
            if let Some(help) = help {
                eprintln!("hint: {help}");
            }
            prompt();
        }
        SessionEvent::Cleared => {
            println!("Started a new chat.");
            prompt();
        }
    }
}

fn prompt() {
    print!("you> ");
    flush();
}

fn flush() {
    // A closed stdout only loses the prompt.
    let _ = std::io::stdout().flush();
}
