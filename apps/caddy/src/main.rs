use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use cabinet_client::{
    CabinetApi, CabinetClient, CreateOutcome, DeleteOutcome, HealthStatus, QueryOptions,
};
use clap::{Parser, Subcommand};
use coordinator::{
    CoordinatorEvent, ExtensionRuntime, NoticeKind, PanelAction, PanelNotice, SettingsStore,
    Trigger,
};
use shared::domain::{CabinetName, LengthBounds};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "caddy", about = "Collect web page text into cabinets")]
struct Cli {
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Health,
    List,
    Create {
        name: String,
    },
    Delete {
        name: String,
    },
    Add {
        cabinet: String,
        text: String,
        #[arg(long, default_value = "unknown")]
        source_url: String,
    },
    Query {
        cabinet: String,
        query: String,
        #[arg(long)]
        top_k: Option<u32>,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Runs a context-menu capture through the full coordinator.
    Capture {
        text: String,
        #[arg(long)]
        cabinet: Option<String>,
        #[arg(long)]
        source_url: Option<String>,
    },
    SetBounds {
        min: usize,
        max: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut store = SettingsStore::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(url) = cli.server_url {
        store.settings_mut().server_url = url;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        store.settings_mut().request_timeout_ms = timeout_ms;
    }
    let settings = store.settings().clone();
    tracing::debug!(
        server_url = %settings.server_url,
        timeout_ms = settings.request_timeout_ms,
        "settings resolved"
    );
    let client = CabinetClient::with_timeout(&settings.server_url, settings.request_timeout())?;

    match cli.command {
        Command::Health => match client.health().await {
            HealthStatus::Healthy => println!("connected to {}", client.base_url()),
            HealthStatus::Unhealthy { status } => println!("server error: status={status}"),
            HealthStatus::Unreachable { reason } => bail!("disconnected: {reason}"),
        },
        Command::List => {
            let cabinets = client.list_cabinets().await?;
            if cabinets.is_empty() {
                println!("no cabinets");
            }
            for cabinet in cabinets {
                println!("{}\t{} items", cabinet.name, cabinet.item_count);
            }
        }
        Command::Create { name } => match client.create_cabinet(&name).await? {
            CreateOutcome::Created { message, .. } => println!("{message}"),
            CreateOutcome::Conflict { detail } => bail!("{detail}"),
        },
        Command::Delete { name } => {
            let name = CabinetName::parse(&name)?;
            match client.delete_cabinet(&name).await? {
                DeleteOutcome::Deleted { message } => println!("{message}"),
                DeleteOutcome::NotFound { detail } => bail!("{detail}"),
            }
        }
        Command::Add {
            cabinet,
            text,
            source_url,
        } => {
            let cabinet = CabinetName::parse(&cabinet)?;
            settings.bounds().check(&text).into_result()?;
            let added = client.add_text(&cabinet, &text, &source_url).await?;
            println!("{}", added.message);
        }
        Command::Query {
            cabinet,
            query,
            top_k,
            threshold,
        } => {
            let cabinet = CabinetName::parse(&cabinet)?;
            let defaults = settings.query_options();
            let options = QueryOptions {
                top_k: top_k.unwrap_or(defaults.top_k),
                similarity_threshold: threshold.unwrap_or(defaults.similarity_threshold),
            };
            let hits = client.query(&cabinet, &query, options).await?;
            if hits.is_empty() {
                println!("No results found");
            }
            for hit in hits {
                let source = hit.source_url.as_deref().unwrap_or("unknown");
                println!("[{:.0}%] {} ({source})", hit.percentage(), hit.text);
            }
        }
        Command::Capture {
            text,
            cabinet,
            source_url,
        } => {
            let cabinet = cabinet.as_deref().map(CabinetName::parse).transpose()?;
            let wait = settings.readiness_timeout() + settings.request_timeout() * 3;
            let runtime = ExtensionRuntime::launch(store, Arc::new(client));
            let outcome = capture(&runtime, text, cabinet, source_url, wait).await;
            runtime.shutdown().await;
            outcome?;
        }
        Command::SetBounds { min, max } => {
            let bounds = LengthBounds::new(min, max)?;
            store.update_bounds(bounds)?;
            println!(
                "saved bounds {}..={} to {}",
                bounds.min(),
                bounds.max(),
                store.path().display()
            );
        }
    }

    Ok(())
}

async fn capture(
    runtime: &ExtensionRuntime,
    text: String,
    cabinet: Option<CabinetName>,
    source_url: Option<String>,
    wait: Duration,
) -> Result<()> {
    let mut notices = runtime.subscribe_notices();
    let mut events = runtime.subscribe_events();

    if let Some(cabinet) = cabinet {
        runtime.trigger(Trigger::IconActivated);
        tokio::time::timeout(wait, async {
            loop {
                match events.recv().await {
                    Ok(CoordinatorEvent::PanelReady { .. }) => return Ok(()),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => bail!("coordinator stopped"),
                }
            }
        })
        .await
        .context("panel did not become ready")??;
        runtime.panel_action(PanelAction::SelectCabinet(cabinet));
    }

    runtime.trigger(Trigger::ContextMenu {
        selection_text: Some(text),
        tab_url: source_url,
    });

    tokio::time::timeout(wait, async {
        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Ok(notice) => {
                        if let Some(line) = describe(&notice) {
                            println!("{line}");
                        }
                        match notice {
                            PanelNotice::TextAdded { .. } | PanelNotice::Prompt { .. } => {
                                return Ok(())
                            }
                            PanelNotice::Error(error) => bail!("{}", error.message()),
                            _ => {}
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => bail!("panel stopped"),
                },
                event = events.recv() => {
                    if let Ok(CoordinatorEvent::DeliveryFailed {
                        command_name,
                        reason,
                        ..
                    }) = event
                    {
                        bail!("{command_name} was not delivered: {reason}");
                    }
                }
            }
        }
    })
    .await
    .context("capture did not finish in time")?
}

fn describe(notice: &PanelNotice) -> Option<String> {
    match notice {
        PanelNotice::Message { kind, text } => Some(match kind {
            NoticeKind::Info => format!("info: {text}"),
            NoticeKind::Success => format!("ok: {text}"),
            NoticeKind::Error => format!("error: {text}"),
        }),
        PanelNotice::Error(error) => Some(format!("error: {}", error.message())),
        PanelNotice::ConnectionStatus(status) => Some(format!("connection: {status:?}")),
        PanelNotice::CabinetsUpdated(cabinets) => Some(format!("{} cabinets", cabinets.len())),
        PanelNotice::SelectionChanged(Some(name)) => Some(format!("selected \"{name}\"")),
        PanelNotice::TextAdded { cabinet, source_url } => {
            Some(format!("ok: added text to \"{cabinet}\" (source {source_url})"))
        }
        PanelNotice::Prompt { .. } => {
            Some("no cabinet selected; pass --cabinet to choose one".to_string())
        }
        _ => None,
    }
}
