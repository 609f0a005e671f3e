use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client_core::{
    alerts::{reference_records, AlertConfig},
    AcceptingSink, AlertStore, CorrectionDraft, HttpClientConfig, HttpPriceSource,
    HttpSubmissionSink, PriceBoard, PriceSource, SessionState, StubPriceSource, SubmissionSink,
    VerificationEngine, VerificationEvent,
};
use shared::domain::{AlertTarget, District, Scope};
use tokio::sync::broadcast;
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Review backend; the built-in stub data is used when absent.
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the aggregate price and the district table.
    Prices,
    /// Answer "is this price correct?" for one scope.
    Verify {
        /// `global` or a district name.
        #[arg(long, default_value = "global")]
        scope: String,
        #[arg(long)]
        dispute: bool,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        district: Option<String>,
    },
    /// Configure the price alert and list notifications.
    Alerts {
        #[arg(long)]
        disable: bool,
        #[arg(long)]
        threshold: Option<f64>,
        /// Narrows the threshold to one district.
        #[arg(long, requires = "threshold")]
        district: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    match args.command {
        Command::Prices => show_prices(args.server_url.as_deref()).await,
        Command::Verify {
            scope,
            dispute,
            price,
            location,
            district,
        } => {
            let scope = parse_scope(&scope)?;
            let draft = CorrectionDraft {
                proposed_price: price.unwrap_or_default(),
                location_label: location.unwrap_or_default(),
                district,
            };
            run_verification(args.server_url.as_deref(), scope, dispute, draft).await
        }
        Command::Alerts {
            disable,
            threshold,
            district,
        } => configure_alerts(disable, threshold, district.as_deref()),
    }
}

fn parse_scope(raw: &str) -> Result<Scope> {
    if raw.trim().eq_ignore_ascii_case("global") {
        return Ok(Scope::Global);
    }
    District::known(raw)
        .map(Scope::District)
        .ok_or_else(|| anyhow!("unknown district '{raw}'"))
}

fn price_source(server_url: Option<&str>) -> Result<Box<dyn PriceSource>> {
    match server_url {
        Some(url) => Ok(Box::new(HttpPriceSource::new(url, HttpClientConfig::default())?)),
        None => Ok(Box::new(StubPriceSource::new())),
    }
}

fn submission_sink(server_url: Option<&str>) -> Result<Arc<dyn SubmissionSink>> {
    match server_url {
        Some(url) => Ok(Arc::new(HttpSubmissionSink::new(url, HttpClientConfig::default())?)),
        None => Ok(Arc::new(AcceptingSink)),
    }
}

async fn show_prices(server_url: Option<&str>) -> Result<()> {
    let source = price_source(server_url)?;
    let mut board = PriceBoard::default();
    board
        .refresh(source.as_ref())
        .await
        .context("failed to load prices")?;

    if let Some(quote) = board.current() {
        println!("Tamil Nadu average: ₹{:.2}/kg ({})", quote.value, quote.captured_at);
    }
    for row in board.districts() {
        println!(
            "{:<14} ₹{:>6.2}  range ₹{:.2}-₹{:.2}  {}",
            row.district.as_str(),
            row.quote.value,
            row.min,
            row.max,
            row.trend
        );
    }
    Ok(())
}

async fn run_verification(
    server_url: Option<&str>,
    scope: Scope,
    dispute: bool,
    draft: CorrectionDraft,
) -> Result<()> {
    let engine = VerificationEngine::new(submission_sink(server_url)?);
    let mut events = engine.subscribe_events();

    engine.open_prompt(scope.clone()).await?;
    if !dispute {
        engine.confirm(&scope).await?;
        wait_until_cleared(&mut events).await?;
        println!("Thanks for confirming the price.");
        return Ok(());
    }

    engine.dispute(&scope).await?;
    loop {
        match next_event(&mut events).await? {
            VerificationEvent::StateChanged(snapshot)
                if matches!(snapshot.state, SessionState::AwaitingCorrection { .. }) =>
            {
                break
            }
            VerificationEvent::Cleared { .. } => bail!("session closed before the correction form opened"),
            _ => {}
        }
    }

    if let Err(error) = engine.submit_correction(&scope, draft).await {
        engine.cancel(&scope).await?;
        return Err(error.into());
    }
    wait_until_cleared(&mut events).await?;
    println!("Correction submitted for review.");
    Ok(())
}

async fn next_event(events: &mut broadcast::Receiver<VerificationEvent>) -> Result<VerificationEvent> {
    let event = events.recv().await.context("verification events closed")?;
    info!(?event, "verification event");
    Ok(event)
}

async fn wait_until_cleared(events: &mut broadcast::Receiver<VerificationEvent>) -> Result<()> {
    loop {
        if let VerificationEvent::Cleared { .. } = next_event(events).await? {
            return Ok(());
        }
    }
}

fn configure_alerts(disable: bool, threshold: Option<f64>, district: Option<&str>) -> Result<()> {
    let mut store = AlertStore::with_records(AlertConfig::default(), reference_records(Utc::now()));

    if disable {
        store.set_enabled(false);
    }
    if let Some(price) = threshold {
        let target = match district {
            Some(raw) => AlertTarget::District(
                District::known(raw).ok_or_else(|| anyhow!("unknown district '{raw}'"))?,
            ),
            None => AlertTarget::AllDistricts,
        };
        store.set_threshold(price, target)?;
    }

    match store.create_alert_from_config() {
        Ok(id) => info!(%id, "alert created"),
        Err(error) => println!("{error}"),
    }

    let now = Utc::now();
    println!("{} unread", store.unread_count());
    for record in store.records() {
        println!(
            "[{}] {} ({})",
            if record.read { " " } else { "*" },
            record.message,
            record.age_label(now)
        );
    }
    Ok(())
}
