use anyhow::{bail, Context, Result};
use guildbank_item_seeder::{
    cli::{Cli, Commands},
    config::{data_dir, SeederConfig},
    logging::init_tracing,
    source::WowheadClient,
    store::{SqliteCatalog, SqliteStore, StoreFactory},
    sync::{run_backfill, run_import, run_update},
    ui::{LogUi, TerminalUi, Ui},
};
use std::time::Instant;

/// Outcome of a pass: what to print, and whether it fully succeeded
struct Summary {
    text: String,
    ok: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = SeederConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let log_file = if cli.tui {
        let dir = data_dir()?;
        std::fs::create_dir_all(&dir).context("Failed to create data directory")?;
        Some(dir.join("seeder.log"))
    } else {
        None
    };
    init_tracing("info", log_file.as_deref())?;

    let db_path = config.database_path()?;
    let catalog = SqliteCatalog::new(&db_path);
    let client = WowheadClient::new(config.source.clone())?;
    let start = Instant::now();

    let summary = if cli.tui {
        let mut ui = TerminalUi::new(cli.command.title())?;
        let summary = run_pass(&cli.command, &config, &catalog, &client, &mut ui)?;
        ui.finish(&summary.text)?;
        summary
    } else {
        run_pass(&cli.command, &config, &catalog, &client, &mut LogUi)?
    };

    println!(
        "\n{} of {:?}: {} in {:.1}s",
        cli.command.title(),
        db_path,
        summary.text,
        start.elapsed().as_secs_f64()
    );

    if !summary.ok {
        bail!("{} finished with failures", cli.command.title());
    }
    Ok(())
}

fn run_pass(
    command: &Commands,
    config: &SeederConfig,
    catalog: &SqliteCatalog,
    client: &WowheadClient,
    ui: &mut impl Ui,
) -> Result<Summary> {
    match command {
        Commands::Import { .. } => {
            let report = run_import(catalog, client, &config.import, ui)?;
            let mut text = format!(
                "imported {}, skipped {} ({} ids scanned)",
                report.imported, report.skipped, report.processed
            );
            for failure in &report.failed_workers {
                text.push_str(&format!("\n  worker {} failed: {}", failure.worker, failure.error));
            }
            if report.lost > 0 {
                text.push_str(&format!(
                    "\n  {} staged items dropped with failed batches, {} ids requeued",
                    report.lost, report.requeued
                ));
            }
            if !report.unrecovered_ids.is_empty() {
                text.push_str(&format!(
                    "\n  never retried (import them with --first/--last): {:?}",
                    report.unrecovered_ids
                ));
            }
            if report.unscanned > 0 {
                text.push_str(&format!("\n  {} ids left unscanned", report.unscanned));
            }
            if report.interrupted {
                text.push_str("\n  stopped early; rerun to resume");
            }
            Ok(Summary { text, ok: report.is_success() })
        }

        Commands::Update { .. } => {
            let mut store: SqliteStore = catalog.open()?;
            let report = run_update(&mut store, client, &config.update, ui)?;
            let text = format!(
                "updated {}, unchanged {}, skipped {} over {} pages",
                report.updated, report.unchanged, report.skipped, report.pages
            );
            Ok(Summary { text, ok: true })
        }

        Commands::Backfill { .. } => {
            let backfill = &config.backfill;
            let marker = backfill
                .marker_locale()
                .context("No backfill locales configured")?;

            let mut store: SqliteStore = catalog.open()?;
            let report = run_backfill(
                &mut store,
                client,
                &backfill.locales,
                marker,
                backfill.page_size,
                backfill.workers,
                ui,
            )?;
            let text = match report.frontier {
                Some(frontier) => format!(
                    "set {} names ({} recovered) for {} items from id {}, skipped {}",
                    report.names_set, report.recovered, report.items, frontier, report.skipped
                ),
                None => format!("nothing to do, every item has a {} name", marker),
            };
            Ok(Summary { text, ok: true })
        }

        Commands::Config => bail!("config is handled before any pass runs"),
    }
}
