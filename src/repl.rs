use hex_core::agent_loop::AgentLoop;
use hex_core::host::HostContext;
use hex_core::tool_registry::truncate_chars;
use hex_core::types::AgentEvent;
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::{Config as RlConfig, DefaultEditor};
use tokio::sync::mpsc;

const HELP: &str = "  Commands:
    /tools         — List available tools
    /help          — Show this help
    /exit          — Quit (also: exit, quit, q)";

/// What the shell should do with one line of input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Exit,
    Command(&'a str),
    Prompt(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if matches!(line.to_lowercase().as_str(), "exit" | "quit" | "q" | "/exit" | "/quit" | "/q") {
        return Input::Exit;
    }
    if line.starts_with('/') {
        return Input::Command(line);
    }
    Input::Prompt(line)
}

/// Run the interactive Session Shell. A transport failure ends the session
/// with an error.
pub async fn run(mut agent: AgentLoop, host: &HostContext) -> Result<()> {
    println!("\nhex v{} — {} {}", env!("CARGO_PKG_VERSION"), host.os, host.arch);
    println!(
        "   {} cores, {} GB RAM, sudo: {}  |  backend: {}",
        host.cpu_cores.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
        host.memory_gb.map(|m| m.to_string()).unwrap_or_else(|| "?".into()),
        if host.sudo { "yes" } else { "no" },
        agent.transport_name(),
    );
    println!("\nType 'exit' to quit, /help for commands.\n");

    let rl_config = RlConfig::builder().auto_add_history(true).build();
    let mut rl = DefaultEditor::with_config(rl_config)?;

    loop {
        let line = match rl.readline("you: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("\nBye.");
                break;
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        };

        match classify(&line) {
            Input::Empty => continue,
            Input::Exit => {
                println!("Bye.");
                break;
            }
            Input::Command(cmd) => handle_command(cmd, &agent),
            Input::Prompt(input) => run_turn(&mut agent, input).await?,
        }
    }

    Ok(())
}

/// Run one turn, printing tool activity as it happens.
async fn run_turn(agent: &mut AgentLoop, input: &str) -> Result<()> {
    println!("  [thinking...]");

    let (tx, mut rx) = mpsc::unbounded_channel::<AgentEvent>();
    let turn = agent.run_turn(input, &tx);
    tokio::pin!(turn);

    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Some(event) = rx.recv() => print_event(event),
        }
    };
    while let Ok(event) = rx.try_recv() {
        print_event(event);
    }
    println!();

    result?;
    Ok(())
}

fn print_event(event: AgentEvent) {
    match event {
        AgentEvent::Text(text) => {
            println!("\nhex: {}", hex_pty::sanitize(&text));
        }
        AgentEvent::ToolCallStart { name, .. } => {
            println!("  \x1b[0;35m⚡ {}\x1b[0m", name);
        }
        AgentEvent::ToolResult(output) => {
            let status = if output.is_error {
                "\x1b[0;31m✗\x1b[0m"
            } else {
                "\x1b[0;32m✓\x1b[0m"
            };
            let (preview, cut) = truncate_chars(&hex_pty::sanitize(&output.content), 200);
            let ellipsis = if cut { "..." } else { "" };
            println!("  {} {}{}", status, preview.replace('\n', "\n    "), ellipsis);
        }
        AgentEvent::Done(_) => {}
    }
}

fn handle_command(input: &str, agent: &AgentLoop) {
    let cmd = input.split_whitespace().next().unwrap_or(input);
    match cmd {
        "/tools" => {
            let registry = agent.tool_registry();
            println!("  Available tools ({}):", registry.len());
            for spec in registry.list_specs() {
                println!("    • {} — {}", spec.name, spec.description);
            }
            if !agent.supports_tools() {
                println!("  (this backend is text-only; the model CLI uses its own tools)");
            }
        }
        "/help" | "/?" => println!("{}", HELP),
        _ => println!("Unknown command: {}. Type /help for available commands.", cmd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_exit_words() {
        for line in ["exit", "quit", "q", "  EXIT  ", "/exit", "/q"] {
            assert_eq!(classify(line), Input::Exit, "{line:?}");
        }
    }

    #[test]
    fn test_classify_commands_and_prompts() {
        assert_eq!(classify("   "), Input::Empty);
        assert_eq!(classify("/tools"), Input::Command("/tools"));
        assert_eq!(classify(" list files in /tmp "), Input::Prompt("list files in /tmp"));
        assert_eq!(classify("quit smoking"), Input::Prompt("quit smoking"));
    }
}
