//! Interactive routing agent.
//!
//! Reads queries from stdin, routes each one to a server from the registry,
//! connects just in time and prints the agent's answer.
//!
//! # Running
//!
//! ```bash
//! OPENAI_API_KEY=your_key cargo run --example route_query
//! ```
//!
//! The registry defaults to `servers.json` in the working directory
//! (override with `MCP_ROUTER_REGISTRY`). A `.env` file is loaded if present.
//! To see debug logs:
//! ```bash
//! RUST_LOG=mcp_router_agent=debug cargo run --example route_query
//! ```

use std::sync::Arc;

use mcp_router_agent::{
    AgentError, AgentEvent, Dispatcher, EventSink, Settings, providers::OpenAIProvider,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let settings = Settings::from_env()?;
    let registry = settings.registry()?;

    let provider = Arc::new(match &settings.base_url {
        Some(base_url) => OpenAIProvider::with_base_url(
            settings.api_key.clone(),
            settings.model.clone(),
            base_url.clone(),
        ),
        None => OpenAIProvider::new(settings.api_key.clone(), settings.model.clone()),
    });

    let (events, mut rx) = EventSink::channel(64);
    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match envelope.event {
                AgentEvent::Start { provider, .. } => println!("[*] Session ready on {provider}"),
                AgentEvent::ActionStart { name, input, .. } => {
                    println!("[*] Calling {name} with {input}");
                }
                AgentEvent::ActionEnd { name, outcome, .. } => {
                    println!("[*] {name} -> {}", outcome.output);
                }
                _ => {}
            }
        }
    });

    println!("Loaded {} server(s) from {}", registry.len(), settings.registry_path.display());
    let dispatcher = Dispatcher::new(registry, provider, settings.agent.clone()).with_events(events);

    println!("\n{}", "=".repeat(50));
    println!("SCALABLE MCP ROUTING AGENT");
    println!("{}", "=".repeat(50));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nWhat is your request? (or 'exit'): ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }

        println!("[*] Routing query to registry...");
        match dispatcher.handle(query).await {
            Ok(result) => {
                println!(
                    "[*] Answered by {} ({} step(s), {} tokens)",
                    result.provider_id,
                    result.outcome.iterations,
                    result.outcome.usage.input_tokens + result.outcome.usage.output_tokens
                );
                println!("\nAgent Output: {}", result.answer());
            }
            Err(AgentError::Routing(reason)) => {
                println!("[!] Router: No suitable server found in registry for this task.");
                println!("    ({reason})");
            }
            Err(e @ (AgentError::Connection { .. } | AgentError::Handshake { .. })) => {
                println!(
                    "\n[!] Final Result: Could not complete task because the selected server is currently unreachable."
                );
                println!("    (Error: {e})");
            }
            Err(e) => println!("\n[!] Final Result: {e}"),
        }
    }

    println!("\nGoodbye!");
    Ok(())
}
