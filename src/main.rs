use std::error::Error;
use std::io::Write;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use palaver::core::providers::Provider;
use palaver::core::session::ChatSession;

#[derive(Parser)]
#[command(name = "palaver")]
#[command(about = "Multi-provider streaming chat in the terminal")]
#[command(long_about = "Palaver holds named chat threads and streams model \
responses into them token by token. Providers are configured at runtime: \
store a credential with /key, browse the provider's models with /models, \
pick one with /model, then type to chat.")]
struct Args {
    /// Preselect a model as provider:model-id (e.g. openai:gpt-4)
    #[arg(short, long)]
    model: Option<String>,
}

fn print_help() {
    println!("Commands:");
    println!("  /new                      start a new thread");
    println!("  /threads                  list threads (* marks the active one)");
    println!("  /switch <thread>          switch the active thread");
    println!("  /key <provider> [value]   set or clear a provider credential");
    println!("                            (for ollama the value is its base URL)");
    println!("  /models <provider>        refresh and list a provider's models");
    println!("  /search <provider> <term> filter a provider's model listing");
    println!("  /model <provider:model>   select the model used for chat");
    println!("  /servers                  list capability servers");
    println!("  /install <server>         mark a capability server installed");
    println!("  /run <server>             start or stop an installed server");
    println!("  /quit                     exit");
    println!("Anything else is sent to the selected model.");
}

fn parse_provider(id: &str) -> Option<Provider> {
    let provider = Provider::from_id(id);
    if provider.is_none() {
        let known: Vec<&str> = Provider::all().iter().map(|p| p.id()).collect();
        println!("Unknown provider '{id}'. Known providers: {}", known.join(", "));
    }
    provider
}

/// Run one submission and echo the assistant placeholder's growth to stdout.
/// The submission runs on its own task; this loop polls the shared session
/// the way any other observer would.
async fn stream_to_stdout(session: &ChatSession, text: String) -> std::io::Result<()> {
    let baseline = session.current_messages().await.len();
    let task = tokio::spawn({
        let session = session.clone();
        async move { session.submit_message(&text).await }
    });

    let mut printed = 0usize;
    let mut stdout = std::io::stdout();
    loop {
        let finished = task.is_finished();
        let messages = session.current_messages().await;
        if messages.len() >= baseline + 2 {
            let content = messages
                .last()
                .filter(|m| m.is_assistant())
                .map(|m| m.content.clone())
                .unwrap_or_default();
            match content.get(printed..) {
                Some(delta) => {
                    if !delta.is_empty() {
                        write!(stdout, "{delta}")?;
                        stdout.flush()?;
                        printed = content.len();
                    }
                }
                None => {
                    // The placeholder was replaced wholesale (an error
                    // overwrote partial output). Reprint it on its own line.
                    writeln!(stdout)?;
                    write!(stdout, "{content}")?;
                    stdout.flush()?;
                    printed = content.len();
                }
            }
        }
        if finished {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    writeln!(stdout)?;
    Ok(())
}

async fn handle_command(session: &ChatSession, command: &str) -> bool {
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "help" => print_help(),
        "quit" | "exit" => return false,
        "new" => {
            let key = session.create_thread().await;
            println!("Started {key}");
        }
        "threads" => {
            let active = session.active_thread_key().await;
            for title in session.thread_titles().await {
                let marker = if title == active { "*" } else { " " };
                println!("{marker} {title}");
            }
        }
        "switch" => {
            session.select_thread(rest).await;
            println!("Active thread: {}", session.active_thread_key().await);
        }
        "model" => {
            session.select_model(rest).await;
            println!("Selected model: {rest}");
        }
        "key" => {
            let (provider_id, value) = rest.split_once(' ').unwrap_or((rest, ""));
            if let Some(provider) = parse_provider(provider_id) {
                let value = value.trim();
                session.set_credential(provider, value).await;
                if value.is_empty() {
                    println!("Credential for {} cleared", provider.id());
                } else {
                    println!("Credential for {} updated", provider.id());
                }
            }
        }
        "models" => {
            if let Some(provider) = parse_provider(rest) {
                session.refresh_models(provider).await;
                if let Some(error) = session.catalog_error(provider).await {
                    println!("{}: {error}", provider.id());
                } else if let Some(models) =
                    session.filtered_models().await.remove(&provider)
                {
                    for model in models {
                        println!("{}:{model}", provider.id());
                    }
                } else {
                    println!("No models found for {}.", provider.id());
                }
            }
        }
        "search" => {
            let (provider_id, term) = rest.split_once(' ').unwrap_or((rest, ""));
            if let Some(provider) = parse_provider(provider_id) {
                session.set_search_term(provider, term.trim()).await;
            }
        }
        "servers" => {
            for (key, server) in session.capability_servers().await {
                let status = match (server.installed, server.running) {
                    (false, _) => "available",
                    (true, false) => "installed",
                    (true, true) => "running",
                };
                println!("{key:24} {status:9} {}", server.description);
            }
        }
        "install" => session.install_capability(rest).await,
        "run" => session.toggle_capability_running(rest).await,
        _ => println!("Unknown command '/{name}'. Try /help."),
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let session = ChatSession::new();
    if let Some(model) = &args.model {
        session.select_model(model).await;
    }

    println!("palaver - type a message to chat, /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(&session, command).await {
                break;
            }
        } else {
            stream_to_stdout(&session, line.to_string()).await?;
        }
    }

    session.shutdown();
    Ok(())
}
