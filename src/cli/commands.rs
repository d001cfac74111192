//! Command handlers for the one-shot and interactive modes

use std::path::Path;

use anyhow::{bail, Context, Result};
use console::Style;
use tokio::io::{AsyncBufReadExt, BufReader};

use clinic_assistant_core::agent::cognition::{LoopOutcome, ToolOutcome};
use clinic_assistant_core::{AssistantConfig, AssistantMessage, AssistantService};

fn print_trace(message: &AssistantMessage) {
    let dim = Style::new().dim();
    let tools: Vec<&str> = message.tools.iter().map(|t| t.name()).collect();
    let tools = if tools.is_empty() {
        "none".to_string()
    } else {
        tools.join(" -> ")
    };
    println!(
        "{}",
        dim.apply_to(format!("intent: {}  tools: {}", message.intent, tools))
    );
}

fn print_reply(message: &AssistantMessage, trace: bool) {
    if message.outcome == LoopOutcome::MaxIterationsExceeded {
        println!("{}", Style::new().yellow().apply_to("(step limit reached)"));
    }
    println!("{}", message.content);
    if trace {
        print_trace(message);
    }
}

pub async fn ask(service: &AssistantService, query: &str, trace: bool) -> Result<()> {
    let id = service.create_conversation(Some("cli")).id;
    let reply = service.submit(id, query).await?;
    print_reply(&reply, trace);
    Ok(())
}

/// Line REPL on a single conversation. `/clear` resets it, `/quit` exits.
pub async fn chat(service: &AssistantService, trace: bool) -> Result<()> {
    let green = Style::new().green().bold();
    let cyan = Style::new().cyan();
    let dim = Style::new().dim();

    println!(
        "{} {}  {}",
        green.apply_to("clinic-assistant"),
        cyan.apply_to(format!("v{}", env!("CARGO_PKG_VERSION"))),
        dim.apply_to(format!("model: {}", service.model().name()))
    );
    println!("{}", dim.apply_to("Type a question. /clear starts over, /quit exits."));

    let id = service.create_conversation(Some("chat")).id;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", cyan.apply_to(">"));
        std::io::Write::flush(&mut std::io::stdout()).ok();

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                service.clear_conversation(id).await?;
                println!("{}", dim.apply_to("Conversation cleared."));
                continue;
            }
            _ => {}
        }

        match service.submit(id, line).await {
            Ok(reply) => print_reply(&reply, trace),
            Err(e) if e.is_client_error() => {
                println!("{}", Style::new().red().apply_to(e.user_message()))
            }
            Err(e) => return Err(e.into()),
        }
        println!();
    }
    Ok(())
}

pub async fn tool(service: &AssistantService, name: &str, input: Option<&str>) -> Result<()> {
    let input = match input {
        Some(raw) => serde_json::from_str(raw).context("Tool input is not valid JSON")?,
        None => serde_json::Value::Null,
    };
    let result = service.invoke_tool(name, input).await?;
    match &result.outcome {
        ToolOutcome::Ok { .. } => println!("{}", result.rendered),
        ToolOutcome::Err { error } => {
            println!(
                "{} {}",
                Style::new().red().apply_to(error.code()),
                result.rendered
            );
        }
    }
    Ok(())
}

pub fn tools(service: &AssistantService) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    for tool in service.tools() {
        println!("{}  {}", bold.apply_to(&tool.name), tool.description);
        println!("    {}", dim.apply_to(&tool.usage));
    }
}

pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite",
            path.display()
        );
    }
    AssistantConfig::default().to_file(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

pub fn config_show(config: &AssistantConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some("********".to_string());
    }
    print!("{}", shown.to_toml_string()?);
    Ok(())
}
