//! Composer CLI
//!
//! Line-driven front end for the action composer. Each command maps onto
//! one composer operation; after every command the CLI waits for the
//! outstanding responses and prints the resulting state.
//!
//! Usage:
//!   cargo run --features cli --bin composer_cli -- --offline --grant billing.write
//!   cargo run --features cli --bin composer_cli -- --config composer.yaml
//!
//! Commands:
//!   q <text>        search            pick <id>     pin an entity
//!   unpin           clear context     do <name>     select a capability
//!   set <value>     typed input       opt <value>   choose an enum option
//!   find <text>     entity search     ent <id>      choose a search result
//!   file <path>     attach a file     next | back   move between slots
//!   edit <slot>     re-open a slot    sugg          list suggestions
//!   apply <id>      apply suggestion  sim | confirm run the capability
//!   retry | reset | show | quit

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use clinic_composer::client::StubBackend;
use clinic_composer::composer::{ComposerMode, FileUpload, PermissionSet, SlotWidget};
use clinic_composer::types::{AnalysisSuggestion, Capability, EntityItem, SlotSchema, SlotUiType};
use clinic_composer::{Composer, ComposerBackend, ComposerConfig};

#[derive(Parser, Debug)]
#[command(name = "composer_cli")]
#[command(about = "Drive the action composer from a terminal")]
struct Args {
    /// YAML configuration file (falls back to COMPOSER_CONFIG)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Use the in-memory demo backend instead of the HTTP services
    #[arg(long)]
    offline: bool,

    /// Permissions held by the session (comma-separated)
    #[arg(long, short = 'g', value_delimiter = ',')]
    grant: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("clinic_composer=info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ComposerConfig::from_file(path)
            .and_then(|c| c.with_overrides(|key| std::env::var(key).ok()))
            .with_context(|| format!("loading {}", path.display()))?,
        None => ComposerConfig::from_env().context("loading composer config")?,
    };

    let backend = if args.offline {
        ComposerBackend::uniform(Arc::new(demo_backend()))
    } else {
        let http = clinic_composer::client::HttpBackend::new(&config)?;
        tracing::info!(base = %http.base_url(), "using HTTP backend");
        ComposerBackend::uniform(Arc::new(http))
    };

    let permissions = Arc::new(PermissionSet::new(args.grant.iter().cloned()));
    let mut composer = Composer::new(backend, permissions, config);
    composer.on_executed(Box::new(|receipt| {
        println!(
            "executed {} (audit {})",
            receipt.capability_id,
            receipt.result.audit_id.as_deref().unwrap_or("-")
        );
    }));
    composer.open();

    let mut rl = DefaultEditor::new()?;
    loop {
        let prompt = format!("{}> ", composer.mode());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        if command == "quit" || command == "exit" {
            break;
        }
        if let Err(e) = run_command(&mut composer, command, rest.trim()).await {
            println!("error: {e:#}");
        }
        composer.settle().await;
        print_state(&composer);
    }

    composer.close();
    Ok(())
}

async fn run_command(composer: &mut Composer, command: &str, arg: &str) -> Result<()> {
    match command {
        "q" => composer.query(arg)?,
        "pick" => composer.select_entity(arg)?,
        "unpin" => composer.clear_context()?,
        "do" => {
            composer.select_capability(arg)?;
        }
        "set" => {
            composer.submit_input(arg)?;
        }
        "opt" => {
            composer.choose_option(arg)?;
        }
        "find" => composer.search_slot_entities(arg)?,
        "ent" => {
            composer.select_slot_entity(arg)?;
        }
        "file" => composer.attach_file(read_upload(Path::new(arg)).await?)?,
        "next" => {
            composer.next_slot()?;
        }
        "back" => composer.previous_slot()?,
        "edit" => composer.edit_slot(arg)?,
        "sugg" => {
            for s in composer.visible_suggestions() {
                println!(
                    "  [{}] {} = {} ({:.0}%)",
                    s.id,
                    s.suggestion.slot_name,
                    s.suggestion.value,
                    s.suggestion.confidence * 100.0
                );
            }
        }
        "apply" => {
            let id = arg.parse().context("suggestion id must be a number")?;
            composer.apply_suggestion(id)?;
        }
        "sim" => composer.simulate()?,
        "confirm" => composer.confirm()?,
        "retry" => composer.retry()?,
        "reset" => composer.reset(),
        "show" => {}
        other => anyhow::bail!("unknown command '{other}'"),
    }
    Ok(())
}

async fn read_upload(path: &Path) -> Result<FileUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("path has no file name")?;
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "",
    };
    Ok(FileUpload::new(filename, content_type, bytes))
}

fn print_state(composer: &Composer) {
    let state = composer.state();
    if let Some(notice) = state.notice() {
        println!("! {}", notice.message);
    }
    match state.mode() {
        ComposerMode::Idle | ComposerMode::ContextLocked => {
            if let Some(ctx) = state.context() {
                println!("context: {} ({})", ctx.label, ctx.entity_type);
            }
            for e in state.entities() {
                println!("  entity  {:<8} {} [{}]", e.id, e.label, e.entity_type);
            }
            for a in state.actions() {
                println!("  action  {}", a.name);
            }
        }
        ComposerMode::SlotFilling => {
            if let Some(slot) = state.current_slot() {
                let hint = match SlotWidget::for_slot(slot) {
                    SlotWidget::TextInput => "set <text>".to_string(),
                    SlotWidget::NumberInput => "set <number>".to_string(),
                    SlotWidget::DatePicker => "set <YYYY-MM-DD>".to_string(),
                    SlotWidget::Options(options) => format!("opt {}", options.join("|")),
                    SlotWidget::EntitySearch { .. } => "find <text>, ent <id>".to_string(),
                    SlotWidget::FileUpload => "file <path>".to_string(),
                };
                println!("{} ({hint})", slot.prompt);
            }
            for e in state.slot_results() {
                println!("  result  {:<8} {}", e.id, e.label);
            }
            let offered = composer.visible_suggestions().len();
            if offered > 0 {
                println!("  {offered} suggestion(s), type 'sugg'");
            }
        }
        ComposerMode::Confirmation | ComposerMode::Result => {
            if let Some(cap) = state.capability() {
                println!("{}", cap.name);
            }
            for (name, value) in state.slots().iter() {
                println!("  {name}: {}", value.display());
            }
            if let Some(result) = state.result() {
                println!("result: {:?} {}", result.status, result.error.as_deref().unwrap_or(""));
            }
        }
    }
}

fn demo_backend() -> StubBackend {
    let installment = Capability::new("Taksit Oluştur")
        .with_permission("billing.write")
        .with_slot(SlotSchema::new("amount", "Tutar?", SlotUiType::Number))
        .with_slot(SlotSchema::new("due_date", "Vade tarihi?", SlotUiType::Date));
    let invoice = Capability::new("Fatura Kes")
        .with_permission("billing.write")
        .with_slot(
            SlotSchema::new("patient", "Hasta?", SlotUiType::EntitySearch)
                .with_entity_type("patient"),
        )
        .with_slot(SlotSchema::new("document", "Belge?", SlotUiType::File))
        .with_slot(SlotSchema::new("amount", "Tutar?", SlotUiType::Number))
        .with_slot(
            SlotSchema::new("method", "Ödeme şekli?", SlotUiType::Enum)
                .with_options(["nakit", "kart", "havale"]),
        );

    StubBackend::new()
        .with_entity(EntityItem::new("p-1", "patient", "Ahmet Yılmaz").with_sub_label("TC 123"))
        .with_entity(EntityItem::new("p-2", "patient", "Ayşe Demir"))
        .with_action(invoice)
        .with_context_action("patient", installment)
        .with_suggestion(AnalysisSuggestion::new("amount", serde_json::json!(750), 0.92))
        .with_suggestion(AnalysisSuggestion::new("notes", serde_json::json!("kontrol"), 0.4))
}
