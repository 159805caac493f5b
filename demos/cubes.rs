//! Cubes walkthrough - interactive demo against a running CLIPS server.
//!
//! This example demonstrates:
//! - Opening a connection with an event handler
//! - Sending raw commands one step at a time
//! - Reacting to the Disconnected event instead of being killed by it
//!
//! # Running
//!
//! Start the server with `cubes.clp` in its working path, then:
//!
//! ```text
//! CLIPS_ADDR=127.0.0.1 CLIPS_PORT=5000 RUST_LOG=clips_client=debug \
//!     cargo run --example cubes
//! ```

use std::time::Duration;

use clips_client::{Connection, LinkEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
/// Gap between commands sent for the same step.
const COMMAND_SPACING: Duration = Duration::from_millis(250);

fn server_from_env() -> (String, u16) {
    let address = std::env::var("CLIPS_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let port = std::env::var("CLIPS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    (address, port)
}

/// One scripted step: what to tell the user, what to send.
struct Step {
    prompt: String,
    commands: Vec<String>,
    pause: Duration,
}

impl Step {
    fn new(prompt: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            commands: vec![command.into()],
            pause: Duration::ZERO,
        }
    }

    fn assert(fact: &str) -> Self {
        Self::new(format!("assert {}", fact), format!("(assert {})", fact))
    }

    fn run() -> Self {
        Self {
            pause: Duration::from_secs(1),
            ..Self::new("run CLIPS", "(run -1)")
        }
    }
}

fn script() -> Vec<(Option<&'static str>, Step)> {
    let load = Step {
        prompt: "load cubes.clp".to_string(),
        commands: vec!["(clear)".to_string(), "(load cubes.clp)".to_string()],
        pause: Duration::ZERO,
    };
    vec![
        (None, load),
        (None, Step::new("reset CLIPS", "(reset)")),
        (None, Step::run()),
        (Some("Cool, right!? Let's retry adding another cube..."), Step::new("reset CLIPS", "(reset)")),
        (None, Step::assert("(block G)")),
        (None, Step::assert("(on-top-of (upper nothing)(lower G))")),
        (None, Step::assert("(on-top-of (upper G)(lower D))")),
        (None, Step::run()),
        (Some("Now with yet another cube..."), Step::new("reset CLIPS", "(reset)")),
        (Some("Upon reset, we lost G, so let's add it again..."), Step::assert("(block G)")),
        (None, Step::assert("(on-top-of (upper nothing)(lower G))")),
        (None, Step::assert("(on-top-of (upper G)(lower D))")),
        (Some("Now with H..."), Step::assert("(block H)")),
        (None, Step::assert("(on-top-of (upper nothing)(lower H))")),
        (None, Step::assert("(on-top-of (upper H)(lower A))")),
        (None, Step::run()),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (address, port) = server_from_env();
    let (gone_tx, mut gone) = watch::channel(false);

    let connection = match Connection::builder()
        .on_event(move |event| match event {
            LinkEvent::Message(text) => println!("CLIPS: {}", text),
            LinkEvent::Malformed(e) => eprintln!("{}", e),
            LinkEvent::Disconnected => {
                println!("\nDisconnected");
                gone_tx.send_replace(true);
            }
        })
        .connect(&address, port)
        .await
    {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Run the server and pass the right parameters.");
            std::process::exit(1);
        }
    };
    println!("Connected to CLIPS server at {}", connection.peer_addr());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    for (banner, step) in script() {
        if let Some(banner) = banner {
            println!("\n{}", banner);
        }
        println!("Press enter to {}", step.prompt);

        tokio::select! {
            line = stdin.next_line() => {
                if line?.is_none() {
                    break;
                }
            }
            _ = gone.wait_for(|gone| *gone) => break,
        }

        for (i, command) in step.commands.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(COMMAND_SPACING).await;
            }
            connection.send(command).await?;
        }
        tokio::time::sleep(step.pause).await;
    }

    println!("All done. Shutting down...");
    connection.close().await;
    println!("Bye!");
    Ok(())
}
