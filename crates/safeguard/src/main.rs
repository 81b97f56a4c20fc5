//! `safeguard` - CLI for the emergency trigger engine
//!
//! This binary runs interactive or scripted sessions against the simulated
//! device platform, checks trigger phrases, and manages configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use safeguard::cli::{
    parse_script, read_script, CapabilityArg, Cli, Command, ConfigCommand, DemoCommand, Driver,
    MatchCommand, Outcome, OutputFormat, RunCommand, Step, DEFAULT_SCENARIO,
};
use safeguard::platform::{self, Simulator};
use safeguard::timeline::{render_event, render_timeline, Report};
use safeguard::{init_logging, Config, KeywordMatcher, Session, Snapshot};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Run(cmd) => handle_run(config, &cmd).await,
        Command::Demo(cmd) => handle_demo(config, &cmd).await,
        Command::Match(cmd) => handle_match(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn simulator(deny: &[CapabilityArg]) -> Simulator {
    let sim = Simulator::new();
    for capability in deny {
        sim.deny((*capability).into());
    }
    sim
}

async fn handle_run(config: Config, cmd: &RunCommand) -> anyhow::Result<()> {
    let sim = simulator(&cmd.deny);
    let frame_interval = config.frame_interval();
    let session = Session::start(config, sim.devices())?;
    let driver = Driver::new(session.handle(), sim, frame_interval);

    println!("SafeGuard session on {} devices.", platform::platform_name());
    println!("Commands: sos, say <text>, level <n>, move <lat> <lng>, cancel, enable <source>,");
    println!("          deny <capability>, gps-error <code>, wait <ms>, timeline, status, quit");

    let follower = tokio::spawn(follow_events(session.handle().subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let step = match line.parse::<Step>() {
            Ok(step) => step,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match driver.apply(&step).await? {
            Outcome::Done => {}
            Outcome::Output(text) => print!("{text}"),
            Outcome::Quit => break,
        }
    }

    follower.abort();
    session.shutdown().await?;
    Ok(())
}

/// Print events as they are appended, oldest first.
async fn follow_events(mut snapshots: watch::Receiver<Arc<Snapshot>>) {
    let mut seen = 0;
    while snapshots.changed().await.is_ok() {
        let snapshot = Arc::clone(&*snapshots.borrow_and_update());
        let events = &snapshot.events;
        for event in events.iter().take(events.len().saturating_sub(seen)).rev() {
            println!("* {}", render_event(event));
        }
        seen = events.len();
    }
}

async fn handle_demo(config: Config, cmd: &DemoCommand) -> anyhow::Result<()> {
    let steps = if let Some(path) = &cmd.script {
        read_script(path)?
    } else if cmd.step.is_empty() {
        parse_script(DEFAULT_SCENARIO)?
    } else {
        cmd.step
            .iter()
            .map(|line| line.parse())
            .collect::<safeguard::Result<Vec<Step>>>()?
    };

    let sim = simulator(&cmd.deny);
    let frame_interval = config.frame_interval();
    let session = Session::start(config, sim.devices())?;
    let driver = Driver::new(session.handle(), sim, frame_interval);

    for step in &steps {
        match driver.apply(step).await? {
            Outcome::Done => {}
            Outcome::Output(text) => {
                if cmd.format == OutputFormat::Plain {
                    print!("{text}");
                }
            }
            Outcome::Quit => break,
        }
    }

    let snapshot = session.handle().settle().await?;
    session.shutdown().await?;

    match cmd.format {
        OutputFormat::Plain => {
            println!();
            println!("Emergency timeline");
            println!("------------------");
            print!("{}", render_timeline(&snapshot));
            for (kind, message) in snapshot.messages() {
                println!("[{kind}] {message}");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&Report::new(&snapshot))?);
        }
    }
    Ok(())
}

fn handle_match(config: &Config, cmd: &MatchCommand) -> anyhow::Result<()> {
    let matcher = KeywordMatcher::new(&config.trigger.keywords)?;
    if cmd.all {
        let phrases = matcher.find_all(&cmd.transcript);
        if phrases.is_empty() {
            println!("No trigger phrase.");
        }
        for phrase in phrases {
            println!("{phrase}");
        }
    } else {
        match matcher.find(&cmd.transcript) {
            Some(phrase) => println!("{phrase}"),
            None => println!("No trigger phrase."),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Trigger]");
                println!("  Keywords:           {}", config.trigger.keywords.join(", "));
                println!("  Sound threshold:    {}", config.trigger.sound_threshold);
                println!();
                println!("[Monitor]");
                println!("  Sound:              {}", config.monitor.sound_enabled);
                println!("  Voice:              {}", config.monitor.voice_enabled);
                println!("  Location:           {}", config.monitor.location_enabled);
                println!("  Frame interval:     {} ms", config.monitor.frame_interval_ms);
                println!();
                println!("[Recording]");
                println!("  Auto record:        {}", config.recording.auto_record);
                println!("  Max duration:       {} s", config.recording.max_duration_secs);
                println!("  Auto photo:         {}", config.recording.auto_photo);
                println!();
                println!("[Alert]");
                println!("  Enabled:            {}", config.alert.enabled);
                println!("  Delay:              {} ms", config.alert.delay_ms);
                println!("  Fallback location:  {}", config.fallback_location());
                println!();
                println!("[Contacts]");
                for contact in &config.contacts {
                    let notify = if contact.notify_on_emergency { "notify" } else { "-" };
                    println!(
                        "  {:<20} {:<20} {:<20} {notify}",
                        contact.name, contact.phone, contact.relationship
                    );
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
