//! maskpaint console entry point.

use std::io::{self, BufRead, Write};

use maskpaint::AppConfig;
use maskpaint::console::{self, Command, Flow};
use maskpaint::session::Session;

fn main() {
    if let Err(e) = run() {
        log::error!("{}", e);
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    // RUST_LOG takes precedence over the configured level
    env_logger::Builder::new()
        .filter_level(config.preferences.log_level.to_level_filter())
        .parse_default_env()
        .init();
    log::info!(
        "Working in {:?} (workset {}, accepted {})",
        config.workspace.top_work_dir,
        config.workspace.workset,
        config.workspace.accepted
    );

    let mut session = Session::open(&config)?;
    session.load_latest()?;
    println!("{}", console::status(&session));

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e} (try 'help')");
                continue;
            }
        };
        match console::execute(&mut session, &config.keybindings, command) {
            Ok((Flow::Quit, message)) => {
                println!("{message}");
                return Ok(());
            }
            Ok((Flow::Continue, message)) => println!("{message}"),
            Err(e) => {
                log::warn!("{}", e);
                println!("error: {e}");
            }
        }
        stdout.flush()?;
    }

    // end of input
    session.close()?;
    Ok(())
}
