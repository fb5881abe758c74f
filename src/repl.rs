use std::io::Write;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::DEFAULT_TEMPERATURE;
use crate::engine::InferenceEngine;

/// Stream one completion to stdout, flushing per fragment.
async fn stream_to_stdout(engine: &InferenceEngine, prompt: &str) {
    let mut fragments =
        std::pin::pin!(engine.generate_streaming(prompt, DEFAULT_TEMPERATURE, None));
    let mut stdout = std::io::stdout();

    while let Some(fragment) = fragments.next().await {
        print!("{fragment}");
        let _ = stdout.flush();
    }
    println!();
}

/// Interactive prompt loop. `quit`/`exit`/`q` leaves, `status` prints the
/// acceleration report, anything else is sent to the model.
pub async fn interactive(engine: &InferenceEngine) -> anyhow::Result<()> {
    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("Interactive Mode - NPU-Accelerated LLM");
    println!("{rule}");
    println!("Commands:");
    println!("  - Type your prompt and press Enter");
    println!("  - Type 'quit' or 'exit' to exit");
    println!("  - Type 'status' to see NPU status");
    println!("{rule}\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou: ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("\nGoodbye!");
                break;
            }
            "status" => {
                let status = engine.status();
                println!("\n{}", engine.status_report());
                println!("Model: {}", status.model);
                println!("Server: {}", status.base_url);
            }
            _ => {
                print!("\nAssistant: ");
                let _ = std::io::stdout().flush();
                stream_to_stdout(engine, input).await;
            }
        }
    }

    Ok(())
}

/// Run a fixed set of sample prompts.
pub async fn demo(engine: &InferenceEngine) {
    let prompts = [
        "What is the capital of France?",
        "Explain quantum computing in simple terms.",
        "Write a haiku about programming.",
    ];

    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("Demo Mode - Running Sample Prompts");
    println!("{rule}");

    for (i, prompt) in prompts.iter().enumerate() {
        println!("\n[Demo {}/{}] {prompt}", i + 1, prompts.len());
        stream_to_stdout(engine, prompt).await;
    }
}

/// Single prompt, streamed to stdout.
pub async fn one_shot(engine: &InferenceEngine, prompt: &str) {
    println!("\nPrompt: {prompt}\n");
    print!("Response: ");
    let _ = std::io::stdout().flush();
    stream_to_stdout(engine, prompt).await;
}
