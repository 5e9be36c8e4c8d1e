mod ask;
mod config_cmd;
mod context;
mod conversations;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "deepquery", about = "deepquery CLI - deep-research conversations from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the research agent a question and stream its progress
    Ask {
        /// The question to research
        question: Vec<String>,

        /// Start a new conversation instead of continuing the last one
        #[arg(long)]
        new: bool,

        /// Continue a specific conversation
        #[arg(long, conflicts_with = "new")]
        conversation: Option<String>,

        /// Force multi-round deep research on or off for this turn
        #[arg(long)]
        deep_research: Option<bool>,

        /// Knowledge source to search, e.g. cnb/docs
        #[arg(long)]
        kb: Option<String>,

        /// Skip knowledge-base retrieval for this turn
        #[arg(long)]
        no_rag: bool,
    },

    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// Show or set configuration
    Config {
        /// Set the agent server URL
        #[arg(long)]
        server: Option<String>,

        /// Set the default model id
        #[arg(long)]
        model: Option<String>,

        /// Set the default knowledge source
        #[arg(long)]
        kb: Option<String>,

        /// Enable or disable deep research by default
        #[arg(long)]
        deep_research: Option<bool>,

        /// Set the maximum research rounds per turn
        #[arg(long)]
        max_rounds: Option<u32>,
    },

    /// Check that the agent service is reachable
    Health,
}

#[derive(Subcommand)]
enum ConversationAction {
    /// List stored conversations
    List,
    /// Show a conversation's messages and make it the active one
    Show {
        /// Conversation id
        id: String,
    },
    /// Delete a conversation
    Delete {
        /// Conversation id
        id: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask {
            question,
            new,
            conversation,
            deep_research,
            kb,
            no_rag,
        } => {
            ask::run_ask(
                &question.join(" "),
                ask::AskOptions {
                    new_conversation: new,
                    conversation,
                    deep_research,
                    kb,
                    no_rag,
                },
            )
            .await
        }
        Commands::Conversations { action } => match action {
            ConversationAction::List => conversations::run_list().await,
            ConversationAction::Show { id } => conversations::run_show(&id).await,
            ConversationAction::Delete { id } => conversations::run_delete(&id).await,
        },
        Commands::Config {
            server,
            model,
            kb,
            deep_research,
            max_rounds,
        } => {
            if server.is_none()
                && model.is_none()
                && kb.is_none()
                && deep_research.is_none()
                && max_rounds.is_none()
            {
                config_cmd::show_config()
            } else {
                config_cmd::set_config(server, model, kb, deep_research, max_rounds)
            }
        }
        Commands::Health => conversations::run_health().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
