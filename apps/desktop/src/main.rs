use std::{io::Write, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{self, ClientSettings},
    AuthMode, ClientEvent, DisplayMessage, MessagesUpdateReason, MessengerClient, SessionPhase,
};
use shared::domain::ConversationId;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "messenger", about = "Friendly Messenger command-line client")]
struct Args {
    /// Backend base URL, overriding config file and environment.
    #[arg(long, env = "MESSENGER_API_BASE")]
    api_base: Option<String>,
    /// Directory holding the persisted session.
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Checks that the backend is reachable.
    Health,
    Register {
        username: String,
        #[arg(long)]
        password: String,
    },
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    /// Lists conversations, newest activity first as the backend orders them.
    Conversations,
    StartChat {
        username: String,
    },
    Messages {
        conversation: i64,
    },
    Send {
        conversation: i64,
        text: String,
    },
    /// Follows a conversation, printing the thread whenever it changes.
    Watch {
        conversation: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(api_base) = args.api_base {
        settings.api_base = api_base;
    }
    if let Some(data_dir) = args.data_dir {
        settings.data_dir = Some(data_dir);
    }

    let client = MessengerClient::from_settings(&settings)
        .with_context(|| format!("failed to create client for {}", settings.api_base))?;

    match args.command {
        Command::Health => {
            let health = client.health().await?;
            println!("{} ({})", health.status, settings.api_base);
        }
        Command::Register { username, password } => {
            client
                .authenticate(AuthMode::Register, &username, &password)
                .await?;
            print_whoami(&client);
        }
        Command::Login { username, password } => {
            client
                .authenticate(AuthMode::Login, &username, &password)
                .await?;
            print_whoami(&client);
        }
        Command::Logout => {
            client.logout();
            println!("Signed out.");
        }
        Command::Whoami => {
            require_session(&client, &settings).await?;
            print_whoami(&client);
        }
        Command::Conversations => {
            require_session(&client, &settings).await?;
            let conversations = client.refresh_conversations().await?;
            if conversations.is_empty() {
                println!("No conversations yet.");
            }
            for conversation in conversations {
                println!("{:>6}  {}", conversation.id, conversation.other_username);
            }
        }
        Command::StartChat { username } => {
            require_session(&client, &settings).await?;
            match client.start_chat(&username).await? {
                Some(conversation) => println!(
                    "Conversation {} with {}",
                    conversation.id, conversation.other_username
                ),
                None => bail!("username must not be blank"),
            }
        }
        Command::Messages { conversation } => {
            require_session(&client, &settings).await?;
            client.select_conversation(ConversationId(conversation));
            let messages = client.refresh_messages().await?;
            print_thread(&client, &messages);
        }
        Command::Send { conversation, text } => {
            require_session(&client, &settings).await?;
            client.select_conversation(ConversationId(conversation));
            if !client.send_message(&text).await? {
                bail!("message must not be blank");
            }
        }
        Command::Watch { conversation } => {
            require_session(&client, &settings).await?;
            watch(&client, conversation.map(ConversationId)).await?;
        }
    }
    Ok(())
}

async fn require_session(client: &Arc<MessengerClient>, settings: &ClientSettings) -> Result<()> {
    match client.restore_session().await? {
        SessionPhase::Authenticated => Ok(()),
        _ => bail!(
            "not signed in (no valid session at {}); run `login` first",
            settings.session_path().display()
        ),
    }
}

fn print_whoami(client: &MessengerClient) {
    match client.snapshot().username() {
        Some(username) => println!("Signed in as {username}"),
        None => println!("Not signed in"),
    }
}

fn print_thread(client: &MessengerClient, messages: &[DisplayMessage]) {
    let snapshot = client.snapshot();
    if messages.is_empty() {
        println!("No messages yet. Say hello!");
    }
    print_lines(snapshot.username(), messages);
}

fn print_lines(me: Option<&str>, messages: &[DisplayMessage]) {
    for message in messages {
        println!(
            "[{}] {}: {}",
            message.time_label(),
            message.sender_label(me),
            message.text
        );
    }
}

async fn watch(client: &Arc<MessengerClient>, conversation: Option<ConversationId>) -> Result<()> {
    let mut events = client.subscribe_events();
    if let Some(id) = conversation {
        client.select_conversation(id);
    }
    let mut printed = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                match event {
                    ClientEvent::SelectionChanged(Some(id)) => {
                        println!("-- conversation {id} --");
                        printed = 0;
                    }
                    ClientEvent::MessagesUpdated { messages, reason: MessagesUpdateReason::Poll, .. } => {
                        let fresh = if messages.len() >= printed { &messages[printed..] } else { &messages[..] };
                        print_lines(client.snapshot().username(), fresh);
                        printed = messages.len();
                    }
                    ClientEvent::SessionChanged { phase: SessionPhase::Unauthenticated, .. } => {
                        bail!("session ended");
                    }
                    _ => {}
                }
                std::io::stdout().flush().ok();
            }
        }
    }
    Ok(())
}
