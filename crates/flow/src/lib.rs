mod transition;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use voltio_core::{
    classify_risk, compute_quote, normalize_text, ChatInput, IntakeSession, IntakeTurn, Quote,
    QuoteBasis, QuoteError, QuoteTables, ServiceCatalog, ServiceId, Stage,
};
use voltio_observability::AppMetrics;
use voltio_storage::SessionRepository;

pub use transition::{advance, StepOutcome};

const MAX_TURNS: usize = 40;

/// What the conversation layer hands back to its transport (HTTP, CLI).
#[derive(Debug, Clone, Serialize)]
pub struct FlowReply {
    pub session_id: String,
    pub reply_text: String,
    pub stage: Stage,
    pub quick_replies: Vec<String>,
    pub quote: Option<Quote>,
    pub whatsapp_url: Option<String>,
    pub json_payload: Value,
}

/// One-shot quote request, for callers that already have every field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectQuoteRequest {
    pub service: String,
    pub category: Option<String>,
    pub subtype: Option<String>,
    pub area_m2: Option<f64>,
    pub floors: Option<u32>,
    pub quantity: Option<f64>,
}

/// Drives intake conversations: loads the session, advances the state
/// machine, persists the result and keeps the counters honest.
#[derive(Clone)]
pub struct IntakeAgent<S>
where
    S: SessionRepository,
{
    catalog: Arc<ServiceCatalog>,
    tables: Arc<QuoteTables>,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
    whatsapp_number: String,
}

impl<S> IntakeAgent<S>
where
    S: SessionRepository,
{
    pub fn new(
        catalog: ServiceCatalog,
        tables: QuoteTables,
        store: Arc<S>,
        metrics: Arc<AppMetrics>,
        whatsapp_number: impl Into<String>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            tables: Arc::new(tables),
            store,
            metrics,
            whatsapp_number: whatsapp_number.into(),
        }
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn tables(&self) -> &QuoteTables {
        &self.tables
    }

    #[instrument(skip(self, input))]
    pub async fn handle_message(&self, input: ChatInput) -> Result<FlowReply> {
        let started = Instant::now();
        self.metrics.inc_request();

        let normalized = normalize_text(&input.text);
        let session_id = input
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut session = self
            .store
            .load_session(&session_id)
            .await?
            .unwrap_or_else(|| IntakeSession::new(session_id.clone()));

        let outcome = match advance(
            &mut session,
            &normalized,
            &self.catalog,
            &self.tables,
            &self.whatsapp_number,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                if matches!(err, QuoteError::MissingTableEntry { .. }) {
                    self.metrics.inc_table_miss();
                    warn!(session_id = %session_id, error = %err, "fee table row missing");
                }
                return Err(err.into());
            }
        };

        if outcome.rejected_input {
            self.metrics.inc_rejected_input();
        }
        if outcome.quote_ready {
            self.metrics.inc_quote();
        }

        session.expires_at = Utc::now() + Duration::hours(IntakeSession::TTL_HOURS);
        session.turns.push(IntakeTurn {
            at: Utc::now(),
            user_text: normalized.clone(),
            reply_text: outcome.reply_text.clone(),
            stage: session.stage,
        });
        if session.turns.len() > MAX_TURNS {
            let keep_from = session.turns.len() - MAX_TURNS;
            session.turns = session.turns.split_off(keep_from);
        }

        self.store.upsert_session(&session).await?;

        let reply = FlowReply {
            session_id: session_id.clone(),
            reply_text: outcome.reply_text,
            stage: session.stage,
            quick_replies: outcome.quick_replies,
            quote: session.quote.clone(),
            whatsapp_url: outcome.whatsapp_url,
            json_payload: json!({
                "session_id": session_id,
                "stage": session.stage,
                "service": session.service,
                "risk": session.risk,
                "quote_ready": outcome.quote_ready,
                "rejected_input": outcome.rejected_input,
                "done": outcome.done,
            }),
        };

        self.metrics.observe_latency(started.elapsed());
        info!(
            session_id = %session_id,
            stage = session.stage.as_code(),
            quote_ready = outcome.quote_ready,
            rejected = outcome.rejected_input,
            "intake message handled"
        );

        Ok(reply)
    }

    /// Prices a request in one call, outside any conversation.
    pub fn quote_direct(&self, request: &DirectQuoteRequest) -> Result<Quote, QuoteError> {
        let service =
            ServiceId::parse(&request.service).ok_or_else(|| QuoteError::InvalidInput {
                field: "service",
                message: format!("unknown service {:?}", request.service),
            })?;
        let entry = self.catalog.get(service)?;

        let basis = match &entry.strategy {
            voltio_core::PricingStrategy::RiskTiered => {
                let category = request
                    .category
                    .as_deref()
                    .and_then(voltio_core::EstablishmentCategory::parse)
                    .ok_or_else(|| QuoteError::InvalidInput {
                        field: "category",
                        message: "a recognized establishment category is required".to_string(),
                    })?;
                let area = request.area_m2.ok_or_else(|| QuoteError::InvalidInput {
                    field: "area_m2",
                    message: "area in square meters is required".to_string(),
                })?;
                let floors = request.floors.ok_or_else(|| QuoteError::InvalidInput {
                    field: "floors",
                    message: "floor count is required".to_string(),
                })?;
                QuoteBasis::Risk(classify_risk(category, area, floors)?)
            }
            voltio_core::PricingStrategy::FlatRange { .. }
            | voltio_core::PricingStrategy::SiteVisit => QuoteBasis::None,
            _ => {
                let quantity = request.quantity.ok_or_else(|| QuoteError::InvalidInput {
                    field: "quantity",
                    message: "a quantity is required for this service".to_string(),
                })?;
                QuoteBasis::Quantity(quantity)
            }
        };

        compute_quote(&self.catalog, &self.tables, service, basis)
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now()).await
    }
}
