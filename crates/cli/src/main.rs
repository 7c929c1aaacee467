use std::env;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use voltio_core::{ChatInput, QuoteTables, RiskCategory, ServiceCatalog};
use voltio_flow::{DirectQuoteRequest, IntakeAgent};
use voltio_observability::{init_tracing, AppMetrics};
use voltio_storage::MemoryStore;

#[derive(Debug, Parser)]
#[command(name = "voltio")]
#[command(about = "Voltio quoting assistant CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive intake chat.
    Chat,
    /// One-shot quote from explicit fields.
    Quote {
        #[arg(long)]
        service: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        subtype: Option<String>,
        #[arg(long)]
        area: Option<f64>,
        #[arg(long)]
        floors: Option<u32>,
        #[arg(long)]
        quantity: Option<f64>,
    },
    /// Print the service catalog.
    Catalog,
    /// Print the municipal fee schedule.
    Tariffs,
    /// Check the loaded schedules for missing rows.
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("voltio_cli");
    let cli = Cli::parse();

    let agent = build_agent().context("failed building the quoting agent")?;

    match cli.command {
        Command::Chat => run_chat(agent).await?,
        Command::Quote {
            service,
            category,
            subtype,
            area,
            floors,
            quantity,
        } => {
            let quote = agent
                .quote_direct(&DirectQuoteRequest {
                    service,
                    category,
                    subtype,
                    area_m2: area,
                    floors,
                    quantity,
                })
                .context("quote failed")?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }
        Command::Catalog => {
            println!(
                "{}",
                serde_json::to_string_pretty(agent.catalog().entries())?
            );
        }
        Command::Tariffs => {
            for risk in RiskCategory::ALL {
                let entry = agent.tables().municipal(risk).context("schedule row")?;
                println!(
                    "{:<10} fee {} renewal {} plazo {} días",
                    risk.as_code(),
                    entry.fee,
                    entry.renewal_fee,
                    entry.statutory_days
                );
            }
        }
        Command::Validate => {
            agent.tables().validate().context("fee tables incomplete")?;
            agent
                .catalog()
                .validate()
                .context("service catalog incomplete")?;
            println!("tables ok: every risk level and service has its row");
        }
    }

    Ok(())
}

async fn run_chat(agent: IntakeAgent<MemoryStore>) -> Result<()> {
    let mut session_id: Option<String> = None;

    println!("Asistente Voltio. Escribe 'exit' para salir.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }
        if message.is_empty() {
            continue;
        }

        let reply = agent
            .handle_message(ChatInput {
                session_id: session_id.clone(),
                text: message.to_string(),
            })
            .await?;

        session_id = Some(reply.session_id.clone());

        println!("\n{}\n", reply.reply_text);

        if let Some(url) = reply.whatsapp_url {
            println!("WhatsApp: {url}\n");
        }
    }

    Ok(())
}

fn build_agent() -> Result<IntakeAgent<MemoryStore>> {
    let tables = QuoteTables::from_env()?;
    tables.validate().context("fee tables incomplete")?;
    let catalog = ServiceCatalog::builtin();
    catalog.validate().context("service catalog incomplete")?;

    let whatsapp_number =
        env::var("VOLTIO_WHATSAPP_NUMBER").unwrap_or_else(|_| "51987654321".to_string());

    Ok(IntakeAgent::new(
        catalog,
        tables,
        Arc::new(MemoryStore::new()),
        AppMetrics::shared(),
        whatsapp_number,
    ))
}
