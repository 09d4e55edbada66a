mod aggregate;
mod app;
mod config;
mod db;
mod error;
mod models;
mod registry;
mod request;
mod source;

use app::App;
use config::Config;
use error::{AppError, Result};
use request::Request;

const USAGE: &str = "\
usage: tubefeed [--user <id>] <command>
       tubefeed [--user <id>] --json '<request>'

commands:
  login                       register the user
  create <feed>               create a feed
  add <feed> <@handle>        add a channel to a feed
  remove <feed> <@handle>     remove a channel from a feed
  feeds                       list feeds
  channels <feed>             list a feed's channels
  resolve <@handle>           look up a channel's identifiers
  videos <feed> [limit]       recent videos, newest first
  rename <feed> <new-name>    rename a feed
  delete <feed>               delete a feed
  delete-user                 delete the user and all their feeds";

#[tokio::main]
async fn main() {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        println!("{}", USAGE);
        return;
    }

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(mut args: Vec<String>) -> Result<()> {
    let config = Config::load()?;

    // Check for --user flag
    let user_flag = if args.len() >= 2 && args[0] == "--user" {
        let user = args.remove(1);
        args.remove(0);
        Some(user)
    } else {
        None
    };
    let identity = user_flag.or_else(|| config.user.clone()).ok_or_else(|| {
        AppError::Config("no user given; pass --user <id> or set `user` in the config".to_string())
    })?;

    // Check for --json flag
    let request = match args.as_slice() {
        [flag, json] if flag == "--json" => Request::from_json(json)?,
        _ => Request::from_args(&args)?,
    };

    let app = App::new(&config).await?;
    let response = app.handle(&identity, request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
