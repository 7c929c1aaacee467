use std::sync::Arc;

use anyhow::Result;
use voltio_core::{ChatInput, QuoteTables, ServiceCatalog, Stage};
use voltio_flow::{FlowReply, IntakeAgent};
use voltio_observability::AppMetrics;
use voltio_storage::{MemoryStore, SessionRepository};

fn agent_with_store() -> (IntakeAgent<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let agent = IntakeAgent::new(
        ServiceCatalog::builtin(),
        QuoteTables::published(),
        store.clone(),
        AppMetrics::shared(),
        "51987654321",
    );
    (agent, store)
}

async fn say(agent: &IntakeAgent<MemoryStore>, session_id: &str, text: &str) -> Result<FlowReply> {
    agent
        .handle_message(ChatInput {
            session_id: Some(session_id.to_string()),
            text: text.to_string(),
        })
        .await
}

#[tokio::test]
async fn two_sessions_do_not_share_state() -> Result<()> {
    let (agent, _) = agent_with_store();

    say(&agent, "a", "itse").await?;
    say(&agent, "b", "luces de emergencia").await?;

    say(&agent, "a", "industria").await?;
    let b_quote = say(&agent, "b", "5").await?;
    assert_eq!(b_quote.quote.as_ref().expect("quote").total.min.cents(), 75000);

    // Session "a" is still collecting its profile.
    let a_reply = say(&agent, "a", "taller de soldadura").await?;
    assert_eq!(a_reply.stage, Stage::Area);
    assert!(a_reply.quote.is_none());

    Ok(())
}

#[tokio::test]
async fn identical_conversations_produce_identical_quotes() -> Result<()> {
    let (agent, _) = agent_with_store();

    for session in ["first", "second"] {
        say(&agent, session, "itse").await?;
        say(&agent, session, "hospedaje").await?;
        say(&agent, session, "hostal").await?;
        say(&agent, session, "480").await?;
        say(&agent, session, "3").await?;
    }

    let first = say(&agent, "first", "cuando pueda").await?;
    let second = say(&agent, "second", "cuando pueda").await?;
    assert_eq!(first.quote, second.quote);
    // Lodging at 480 m2 and 3 floors stays in the high bucket.
    assert_eq!(
        first.quote.as_ref().expect("quote").risk,
        Some(voltio_core::RiskCategory::High)
    );

    Ok(())
}

#[tokio::test]
async fn session_state_is_persisted_between_turns() -> Result<()> {
    let (agent, store) = agent_with_store();

    say(&agent, "s-1", "planos").await?;
    let stored = store
        .load_session("s-1")
        .await?
        .expect("session persisted");
    assert_eq!(stored.stage, Stage::Quantity);

    say(&agent, "s-1", "120,5").await?;
    let stored = store
        .load_session("s-1")
        .await?
        .expect("session persisted");
    assert_eq!(stored.stage, Stage::Scheduling);
    // 120.5 m2 of drawings at S/ 3.50 per m2.
    assert_eq!(stored.quote.as_ref().expect("quote").total.min.cents(), 42175);

    Ok(())
}

#[tokio::test]
async fn done_session_restarts_cleanly() -> Result<()> {
    let (agent, _) = agent_with_store();

    say(&agent, "s-2", "pozo a tierra").await?;
    say(&agent, "s-2", "sábado 9am").await?;
    say(&agent, "s-2", "Eva Díaz, 999888777").await?;
    let finished = say(&agent, "s-2", "sí").await?;
    assert_eq!(finished.stage, Stage::Done);
    assert!(finished.whatsapp_url.is_some());

    let fresh = say(&agent, "s-2", "hola de nuevo").await?;
    assert_eq!(fresh.stage, Stage::ServiceSelection);
    assert!(fresh.quote.is_none());

    Ok(())
}
