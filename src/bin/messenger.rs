use std::path::PathBuf;

use clap::{Parser, Subcommand};
use marketplace_messaging::{
    Conversation, Messenger, MessengerConfig, MessengerError, NewMessage, User, UserId,
    flush_tracing,
};
use uuid::Uuid;

/// Command-line access to the marketplace message store
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory for application data (falls back to MESSENGER_DATA_DIR)
    #[arg(long, value_name = "PATH", requires = "logs_dir")]
    data_dir: Option<PathBuf>,

    /// Directory for application logs (falls back to MESSENGER_LOGS_DIR)
    #[arg(long, value_name = "PATH", requires = "data_dir")]
    logs_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update a user
    AddUser {
        id: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Send a message from one user to another
    Send {
        from: String,
        to: String,
        content: String,
    },
    /// List a user's conversations by scanning their message log
    Conversations { user: String },
    /// List a user's conversations from the materialized summaries
    Summaries { user: String },
    /// Show the thread between two users, oldest first
    Thread { user: String, other: String },
    /// Mark a message read on behalf of its receiver
    Read { user: String, message_id: Uuid },
    /// Recompute a user's materialized summaries from the message log
    Rebuild { user: String },
}

fn print_conversations(conversations: &[Conversation], json: bool) -> Result<(), MessengerError> {
    if json {
        println!("{}", serde_json::to_string_pretty(conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!("No conversations");
    }
    for conversation in conversations {
        let other = &conversation.other_participant;
        println!(
            "{:<24} {:>3} unread  {}  {}",
            other.display_name().unwrap_or_else(|| other.id.to_string()),
            conversation.unread_count,
            conversation.last_message.created_at.format("%Y-%m-%d %H:%M"),
            conversation.last_message.content
        );
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), MessengerError> {
    let config = match (&args.data_dir, &args.logs_dir) {
        (Some(data_dir), Some(logs_dir)) => MessengerConfig::new(data_dir, logs_dir),
        _ => MessengerConfig::from_env()?,
    };
    let messenger = Messenger::new(config).await?;

    match args.command {
        Command::AddUser {
            id,
            first_name,
            last_name,
            email,
        } => {
            let mut user = User::new(id.as_str());
            user.first_name = first_name;
            user.last_name = last_name;
            user.email = email;
            let saved = messenger.upsert_user(&user).await?;
            println!("Saved user {}", saved.id);
        }
        Command::Send { from, to, content } => {
            let message = messenger
                .send_message(NewMessage::new(from, to, content))
                .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&message)?);
            } else {
                println!("Sent message {}", message.id);
            }
        }
        Command::Conversations { user } => {
            let outcome = messenger
                .aggregate_conversations(&UserId::from(user))
                .await?;
            print_conversations(&outcome.conversations, args.json)?;
            if !args.json && outcome.orphaned_count() > 0 {
                println!("({} conversations with deleted users hidden)", outcome.orphaned_count());
            }
        }
        Command::Summaries { user } => {
            let conversations = messenger
                .conversation_summaries(&UserId::from(user))
                .await?;
            print_conversations(&conversations, args.json)?;
        }
        Command::Thread { user, other } => {
            let thread = messenger
                .conversation_thread(&UserId::from(user), &UserId::from(other))
                .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&thread)?);
            } else {
                for message in thread {
                    println!(
                        "{}  {} -> {}{}  {}",
                        message.created_at.format("%Y-%m-%d %H:%M:%S"),
                        message.sender_id,
                        message.receiver_id,
                        if message.is_read { "" } else { " (unread)" },
                        message.content
                    );
                }
            }
        }
        Command::Read { user, message_id } => {
            let transition = messenger
                .mark_message_read_by(&UserId::from(user), &message_id)
                .await?;
            println!("{:?}", transition);
        }
        Command::Rebuild { user } => {
            let written = messenger
                .rebuild_conversation_summaries(&UserId::from(user))
                .await?;
            println!("Rebuilt {} conversation summaries", written);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let result = run(args).await;
    if let Err(err) = &result {
        tracing::error!(target: "marketplace_messaging::cli", "Command failed: {}", err);
        eprintln!("error: {}", err);
    }

    flush_tracing();

    if result.is_err() {
        std::process::exit(1);
    }
}
