use sirocco::config::Config;
use sirocco::engine::InferenceEngine;
use sirocco::repl;

fn usage() {
    eprintln!("Usage:");
    eprintln!("  sirocco                    # interactive mode");
    eprintln!("  sirocco --demo             # demo mode");
    eprintln!("  sirocco --prompt <text>    # single prompt");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = Config::from_env();
    let mut engine = InferenceEngine::new(config);

    if !engine.initialize().await {
        tracing::error!("failed to initialize inference engine");
        std::process::exit(1);
    }

    match args.first().map(String::as_str) {
        None => repl::interactive(&engine).await?,
        Some("--demo") => repl::demo(&engine).await,
        Some("--prompt") => {
            if args.len() < 2 {
                eprintln!("Error: --prompt requires a prompt argument");
                std::process::exit(1);
            }
            let prompt = args[1..].join(" ");
            repl::one_shot(&engine, &prompt).await;
        }
        Some(other) => {
            eprintln!("unknown argument: {other}");
            usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
