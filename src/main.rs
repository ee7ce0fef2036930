use std::io::BufRead;

use parlor::error::Result;
use parlor::session::{Client, Config, Event};
use parlor_proto::Status;

fn print_usage() {
    eprintln!(
        "parlor - buddy list client for MSN-family notification servers

Usage:
  parlor signin <email>   # sign in and stream roster updates as JSON lines
  parlor help

While signed in, stdin accepts:
  status <online|offline|away|busy>
  quit

Environment:
  PARLOR_PASSWORD   Account password (required)
  PARLOR_SERVER     Override the authentication server (host:port)
  RUST_LOG          Log filter (default: info)"
    );
}

fn cmd_signin(args: &[String]) -> Result<()> {
    let email = args.first().map(|s| s.as_str()).unwrap_or_else(|| {
        eprintln!("Error: email address required");
        std::process::exit(1);
    });

    let password = match std::env::var("PARLOR_PASSWORD") {
        Ok(p) if !p.is_empty() => p,
        _ => {
            eprintln!("Error: PARLOR_PASSWORD must be set");
            std::process::exit(1);
        }
    };

    let mut config = Config::new(email, &password);
    if let Ok(server) = std::env::var("PARLOR_SERVER") {
        config.auth_server = server;
    }

    let (client, events) = Client::sign_in(config)?;

    // Updates stream out as JSON lines while this thread owns stdin.
    let printer = std::thread::spawn(move || {
        for event in events {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::error!("unprintable event: {}", e),
            }
            if matches!(event, Event::Closed) {
                break;
            }
        }
    });

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        match words.next() {
            None => continue,
            Some("quit") => break,
            Some("status") => match words.next().and_then(Status::from_name) {
                Some(status) => client.set_status(status),
                None => eprintln!("usage: status <online|offline|away|busy>"),
            },
            Some(other) => eprintln!("unknown command: {}", other),
        }
    }

    client.close();
    let _ = printer.join();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "signin" => cmd_signin(&args[2..]),
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
