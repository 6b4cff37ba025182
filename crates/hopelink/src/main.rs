//! `hopelink` - CLI for the wandering-detector registry
//!
//! This binary logs in against the configured shared secrets and works on
//! the record set visible to that session.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use hopelink::cli::{
    AddCommand, Cli, Command, ConfigCommand, ExportCommand, ListCommand, LoginArgs, OutputFormat,
    StatsCommand,
};
use hopelink::export;
use hopelink::listing::ListFilter;
use hopelink::{
    init_logging, Attachment, Authenticator, Config, DashboardStats, Record, RecordStore,
    RegistrationInput, SummaryClient, ViewState,
};

/// How long to wait for the first snapshot before giving up.
const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match cli.command {
        Command::Config(cmd) => handle_config(cli.config, cmd),
        command => {
            let config = Config::load_from(cli.config)?;
            run(&config, command).await
        }
    }
}

async fn run(config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Status(cmd) => handle_status(config, cmd.json).await,
        Command::Watch(cmd) => handle_watch(config, &cmd.login).await,
        Command::List(cmd) => handle_list(config, &cmd).await,
        Command::Add(cmd) => handle_add(config, &cmd).await,
        Command::Delete(cmd) => {
            let view = open_view(config, &cmd.login).await?;
            view.delete_record(&cmd.id).await?;
            println!("Deleted record {}", cmd.id);
            Ok(())
        }
        Command::Export(cmd) => handle_export(config, &cmd).await,
        Command::Stats(cmd) => handle_stats(config, &cmd).await,
        Command::Summary(cmd) => {
            let view = open_view(config, &cmd.login).await?;
            let client = SummaryClient::new(config.summary.clone());
            println!("{}", client.summarize(&view.visible_records()).await);
            Ok(())
        }
        Command::Config(cmd) => handle_config(None, cmd),
    }
}

/// Open the store, subscribe, log in and wait for the first snapshot.
async fn open_view(config: &Config, login: &LoginArgs) -> anyhow::Result<ViewState> {
    let store = RecordStore::open(config)?;
    let mut view = ViewState::new(store, Authenticator::new(config.auth.clone()));
    view.login(&login.to_request())?;
    view.attach()?;
    tokio::time::timeout(FIRST_SNAPSHOT_TIMEOUT, view.ready())
        .await
        .context("timed out waiting for the record set")??;
    Ok(view)
}

async fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = RecordStore::open(config)?;
    let records = tokio::time::timeout(FIRST_SNAPSHOT_TIMEOUT, store.snapshot())
        .await
        .context("timed out waiting for the record set")??;

    let location = if store.is_live_mode() {
        format!("{}/{}", config.cloud.project_id, config.cloud.collection)
    } else {
        config.database_path().display().to_string()
    };

    if json {
        let status = serde_json::json!({
            "backend": store.backend_name(),
            "live": store.is_live_mode(),
            "location": location,
            "records": records.len(),
            "next_sequence": RecordStore::next_sequence(&records),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("hopelink status");
        println!("---------------");
        println!(
            "Mode:          {}",
            if store.is_live_mode() {
                "live (cloud)"
            } else {
                "local"
            }
        );
        println!("Location:      {location}");
        println!("Records:       {}", records.len());
        println!("Next number:   {}", RecordStore::next_sequence(&records));
        if !store.is_live_mode() {
            println!();
            println!("Local mode: records are not shared with other machines.");
        }
    }
    Ok(())
}

async fn handle_watch(config: &Config, login: &LoginArgs) -> anyhow::Result<()> {
    let view = open_view(config, login).await?;
    let mut updates = view.updates();
    print_watch_line(&view);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                print_watch_line(&view);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_watch_line(view: &ViewState) {
    let visible = view.visible_records();
    let newest = visible
        .first()
        .and_then(|r| r.str_field("name"))
        .unwrap_or("-");
    println!(
        "[{}] {} records, newest: {newest}",
        chrono::Local::now().format("%H:%M:%S"),
        visible.len()
    );
}

async fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let view = open_view(config, &cmd.login).await?;
    let records = ListFilter::from(&cmd.filter).apply(&view.visible_records());

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Plain => {
            for record in &records {
                println!("{}", columns(record).join("\t"));
            }
        }
        OutputFormat::Table => print_table(&records),
    }
    Ok(())
}

const LIST_HEADERS: [&str; 6] = ["No.", "Center", "Name", "Serial", "Usage", "Id"];

fn columns(record: &Record) -> [String; 6] {
    let text = |key: &str| record.str_field(key).unwrap_or_default().to_string();
    [
        record
            .sequence_number()
            .map_or_else(|| "-".to_string(), |n| n.to_string()),
        text("centerName"),
        text("name"),
        text("serialNumber"),
        text("usageStatus"),
        record.id.clone(),
    ]
}

fn print_table(records: &[Record]) {
    let rows: Vec<[String; 6]> = records.iter().map(columns).collect();
    let mut widths = LIST_HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(&LIST_HEADERS));
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        println!("{}", line(&cells));
    }
    println!("({} records)", rows.len());
}

async fn handle_add(config: &Config, cmd: &AddCommand) -> anyhow::Result<()> {
    let mut input: RegistrationInput = match &cmd.input {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid registration file {}", path.display()))?
        }
        None => RegistrationInput::default(),
    };
    if let Some(name) = &cmd.name {
        input.name.clone_from(name);
    }
    if let Some(serial) = &cmd.serial {
        input.serial_number.clone_from(serial);
    }
    let consent = cmd
        .consent
        .as_deref()
        .map(Attachment::from_path)
        .transpose()?;

    let mut view = open_view(config, &cmd.login).await?;
    let now = chrono::Local::now();
    let record = view
        .form_assembler()?
        .assemble(input, consent, now.date_naive(), now.timestamp_millis())?;
    let sequence = record.sequence_number().unwrap_or_default();
    let center = record.center_name().unwrap_or_default().to_string();

    view.add_record(record).await?;
    println!("Registered No. {sequence} at {center}");
    Ok(())
}

async fn handle_export(config: &Config, cmd: &ExportCommand) -> anyhow::Result<()> {
    let view = open_view(config, &cmd.login).await?;
    let records = ListFilter::from(&cmd.filter).apply(&view.visible_records());
    let path = cmd.output.clone().unwrap_or_else(|| {
        export::default_file_name(chrono::Local::now().date_naive()).into()
    });

    export::write_csv(&path, &records)?;
    println!("{}", export::describe(&path, records.len()));
    Ok(())
}

async fn handle_stats(config: &Config, cmd: &StatsCommand) -> anyhow::Result<()> {
    let view = open_view(config, &cmd.login).await?;
    let stats = DashboardStats::compute(&view.visible_records());

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let title = view
        .session()
        .and_then(|s| s.scope())
        .map_or_else(|| "All centers".to_string(), str::to_string);
    println!("{title}");
    println!("{}", "=".repeat(title.chars().count().max(11)));
    println!("Registered:     {}", stats.total);
    println!(
        "High risk:      {} ({:.1}%)",
        stats.high_risk, stats.high_risk_rate
    );
    println!("Average age:    {:.1}", stats.average_age);
    println!();
    println!("[By center]");
    for entry in &stats.by_center {
        println!("  {:<20} {}", entry.name, entry.count);
    }
    println!();
    println!("[By diagnosis]");
    for entry in &stats.by_diagnosis {
        println!("  {:<20} {}", entry.name, entry.count);
    }
    Ok(())
}

fn handle_config(
    config_path: Option<std::path::PathBuf>,
    cmd: ConfigCommand,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Storage key:        {}", config.storage.storage_key);
                println!("  Watch interval:     {}ms", config.storage.watch_interval_ms);
                println!();
                println!("[Cloud]");
                println!("  Configured:         {}", config.cloud.is_configured());
                println!("  Project:            {}", config.cloud.project_id);
                println!("  Collection:         {}", config.cloud.collection);
                println!("  Poll interval:      {}ms", config.cloud.poll_interval_ms);
                println!();
                println!("[Auth]");
                println!("  Centers:            {}", config.auth.centers.len());
                println!();
                println!("[Summary]");
                println!("  Configured:         {}", config.summary.is_configured());
                println!("  Model:              {}", config.summary.model);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
