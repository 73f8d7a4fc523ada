//! nke-ctl — command-line interface for the Neural Key Exchange server.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 8000;

fn print_usage() {
    println!("Usage: nke-ctl [--port <port>] <command>");
    println!();
    println!("Daemon");
    println!("  health                              Liveness and active session count");
    println!();
    println!("Sessions");
    println!("  sessions create [--k N] [--n N] [--l N]   Create a session, print its id");
    println!("  sessions inspect <id>               Participants and sync round");
    println!();
    println!(
        "Options:\n  --port <port>                       API port (default: {})",
        DEFAULT_PORT
    );
    println!();
    println!("Examples:");
    println!("  nke-ctl health");
    println!("  nke-ctl sessions create");
    println!("  nke-ctl sessions create --k 4 --n 6 --l 3");
    println!("  nke-ctl sessions inspect abcd1234");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut tpm_k = None;
    let mut tpm_n = None;
    let mut tpm_l = None;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args.get(i).context("--port requires a value")?.parse().context("--port must be a number")?;
            }
            "--k" => {
                i += 1;
                tpm_k = Some(args.get(i).context("--k requires a value")?.parse().context("--k must be a number")?);
            }
            "--n" => {
                i += 1;
                tpm_n = Some(args.get(i).context("--n requires a value")?.parse().context("--n must be a number")?);
            }
            "--l" => {
                i += 1;
                tpm_l = Some(args.get(i).context("--l requires a value")?.parse().context("--l must be a number")?);
            }
            other => remaining.push(other.to_string()),
        }
        i += 1;
    }

    let remaining_refs: Vec<&str> = remaining.iter().map(|s| s.as_str()).collect();

    match remaining_refs.as_slice() {
        ["health"] | [] => cmd::status::cmd_health(port).await,
        ["sessions", "create"] => cmd::sessions::cmd_session_create(port, tpm_k, tpm_n, tpm_l).await,
        ["sessions", "inspect", id] => cmd::sessions::cmd_session_inspect(port, id).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
