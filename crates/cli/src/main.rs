mod terminal;

use std::sync::Arc;

use {
    anyhow::Context,
    clap::Parser,
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::warn,
    tracing_subscriber::EnvFilter,
};

use {
    natter_broker::{Broker, NatsBroker},
    natter_chat::{ChatSession, ReplaySettings},
    natter_config::NatterConfig,
};

use crate::terminal::TerminalSink;

#[derive(Parser)]
#[command(name = "natter", about = "natter — channel chat over NATS")]
struct Cli {
    /// Broker URL (overrides config value).
    #[arg(short, long, env = "NATTER_URL")]
    url: Option<String>,

    /// Channel to join at startup (overrides config value).
    #[arg(short, long, env = "NATTER_CHANNEL")]
    channel: Option<String>,

    /// Display name attached to sent messages (overrides config value).
    #[arg(short, long, env = "NATTER_NAME")]
    name: Option<String>,

    /// History replay window in seconds (overrides config value).
    #[arg(long)]
    window_secs: Option<u64>,

    /// History fetch budget in milliseconds (overrides config value).
    #[arg(long)]
    fetch_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn apply(&self, config: &mut NatterConfig) {
        if let Some(url) = &self.url {
            config.broker.url = url.clone();
        }
        if let Some(channel) = &self.channel {
            config.chat.channel = channel.clone();
        }
        if let Some(name) = &self.name {
            config.chat.username = name.clone();
        }
        if let Some(window_secs) = self.window_secs {
            config.history.window_secs = window_secs;
        }
        if let Some(fetch_timeout_ms) = self.fetch_timeout_ms {
            config.history.fetch_timeout_ms = fetch_timeout_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the chat transcript.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = natter_config::discover_and_load();
    cli.apply(&mut config);

    let broker = Arc::new(
        NatsBroker::connect(
            &config.broker.url,
            config.history.window(),
            config.history.max_messages,
        )
        .await
        .context("connecting to broker")?,
    );
    let session = ChatSession::new(
        Arc::clone(&broker) as Arc<dyn Broker>,
        Arc::new(TerminalSink),
        config.chat.username.as_str(),
    )
    .with_replay(ReplaySettings {
        window: config.history.window(),
        fetch_timeout: config.history.fetch_timeout(),
    });

    session
        .join(&config.chat.channel)
        .await
        .context("joining channel")?;
    println!(
        "joined #{} as {} — /join <channel>, /leave, /quit (Ctrl+C to exit)",
        config.chat.channel,
        session.username()
    );

    run_input_loop(&session).await?;

    if let Err(error) = session.leave().await {
        warn!(%error, "leave on shutdown failed");
    }
    if let Err(error) = broker.close().await {
        warn!(%error, "broker close failed");
    }
    Ok(())
}

async fn run_input_loop(session: &ChatSession) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("reading input")? else {
                    break;
                };
                if !handle_line(session, line.trim()).await {
                    break;
                }
            },
        }
    }
    Ok(())
}

/// One line of user input: a slash command or a message to send.
/// Returns `false` when the loop should exit.
async fn handle_line(session: &ChatSession, line: &str) -> bool {
    match line {
        "" => {},
        "/quit" => return false,
        "/leave" => {
            if let Err(error) = session.leave().await {
                eprintln!("error leaving channel: {error}");
            }
        },
        _ if line.starts_with("/join") => match line.strip_prefix("/join").map(str::trim) {
            Some(channel) if !channel.is_empty() => {
                if let Err(error) = session.join(channel).await {
                    eprintln!("error joining {channel}: {error}");
                }
            },
            _ => eprintln!("usage: /join <channel>"),
        },
        _ if line.starts_with('/') => eprintln!("unknown command: {line}"),
        _ => {
            if let Err(error) = session.send(line).await {
                eprintln!("error sending message: {error}");
            }
        },
    }
    true
}
