use serde_json::{json, Value};

use crate::models::{ContactInfo, EstablishmentProfile, Quote, ServiceCatalogEntry};

/// Human-readable quote recap plus the structured payload and the WhatsApp
/// deep link the notification layer sends out.
#[derive(Debug, Clone)]
pub struct QuoteSummary {
    pub text: String,
    pub whatsapp_url: String,
    pub payload: Value,
}

pub fn compose_quote_summary(
    quote: &Quote,
    entry: &ServiceCatalogEntry,
    profile: Option<&EstablishmentProfile>,
    contact: Option<&ContactInfo>,
    schedule_note: Option<&str>,
    whatsapp_number: &str,
) -> QuoteSummary {
    let mut lines = vec![format!("Resumen de cotización — {}", entry.name)];

    if let Some(profile) = profile {
        lines.push(format!(
            "Local: {} ({}), {} m2, {} piso(s)",
            profile.category.label_es(),
            profile.subtype,
            profile.area_m2,
            profile.floors
        ));
    }
    if let Some(risk) = quote.risk {
        lines.push(format!("Nivel de riesgo: {}", risk.label_es()));
    }
    if let Some(municipal) = quote.municipal_fee {
        lines.push(format!("Derecho municipal (TUPA): {municipal}"));
    }
    lines.push(format!("Servicio: {}", quote.service_fee));
    lines.push(format!("Total estimado: {}", quote.total));
    if let Some(days) = quote.statutory_days {
        lines.push(format!("Plazo legal de trámite: {days} días hábiles"));
    }
    if !quote.included.is_empty() {
        lines.push(format!("Incluye: {}", quote.included.join(", ")));
    }
    if let Some(note) = schedule_note {
        lines.push(format!("Visita/coordinación: {note}"));
    }
    if let Some(contact) = contact {
        lines.push(format!("Contacto: {} ({})", contact.name, contact.phone));
    }

    let text = lines.join("\n");
    let whatsapp_url = whatsapp_link(whatsapp_number, &text);

    let payload = json!({
        "service": quote.service,
        "risk": quote.risk,
        "municipal_fee_cents": quote.municipal_fee,
        "service_fee_cents": { "min": quote.service_fee.min, "max": quote.service_fee.max },
        "total_cents": { "min": quote.total.min, "max": quote.total.max },
        "statutory_days": quote.statutory_days,
        "contact": contact,
        "schedule_note": schedule_note,
    });

    QuoteSummary {
        text,
        whatsapp_url,
        payload,
    }
}

/// Recap for services that are only quoted after a technical visit.
pub fn compose_site_visit_summary(
    entry: &ServiceCatalogEntry,
    contact: Option<&ContactInfo>,
    schedule_note: Option<&str>,
    whatsapp_number: &str,
) -> QuoteSummary {
    let mut lines = vec![
        format!("Solicitud de visita técnica — {}", entry.name),
        "El precio se cotiza luego de la evaluación en sitio, sin costo de visita.".to_string(),
    ];
    if !entry.included.is_empty() {
        lines.push(format!("Incluye: {}", entry.included.join(", ")));
    }
    if let Some(note) = schedule_note {
        lines.push(format!("Visita/coordinación: {note}"));
    }
    if let Some(contact) = contact {
        lines.push(format!("Contacto: {} ({})", contact.name, contact.phone));
    }

    let text = lines.join("\n");
    let whatsapp_url = whatsapp_link(whatsapp_number, &text);

    let payload = json!({
        "service": entry.id,
        "site_visit_required": true,
        "contact": contact,
        "schedule_note": schedule_note,
    });

    QuoteSummary {
        text,
        whatsapp_url,
        payload,
    }
}

fn whatsapp_link(number: &str, text: &str) -> String {
    format!("https://wa.me/{}?text={}", number, pct_encode(text))
}

pub fn pct_encode(input: &str) -> String {
    let mut output = String::with_capacity(input.len() * 2);
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            output.push(byte as char);
        } else {
            output.push('%');
            output.push_str(&format!("{byte:02X}"));
        }
    }
    output
}
