use voltio_core::{
    classify_risk, compose_quote_summary, compose_site_visit_summary, compute_quote,
    parse_area_m2, parse_contact, parse_floors, parse_quantity, parse_yes_no,
    EstablishmentCategory, EstablishmentProfile, IntakeSession, PricingStrategy, QuoteBasis,
    QuoteError, QuoteTables, ServiceCatalog, ServiceId, Stage,
};

/// Result of feeding one user message into the intake state machine.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub reply_text: String,
    pub quick_replies: Vec<String>,
    /// The quote was computed on this step.
    pub quote_ready: bool,
    pub whatsapp_url: Option<String>,
    /// Input failed validation; the stage did not advance.
    pub rejected_input: bool,
    pub done: bool,
}

impl StepOutcome {
    fn prompt(reply_text: String, quick_replies: Vec<String>) -> Self {
        Self {
            reply_text,
            quick_replies,
            quote_ready: false,
            whatsapp_url: None,
            rejected_input: false,
            done: false,
        }
    }

    fn reprompt(reply_text: String, quick_replies: Vec<String>) -> Self {
        Self {
            rejected_input: true,
            ..Self::prompt(reply_text, quick_replies)
        }
    }
}

/// Advances the conversation one step.
///
/// Invalid user input never fails the call: it produces a re-prompt and the
/// stage stays put. Errors escape only for configuration defects
/// (`MissingTableEntry`) the conversation cannot recover from. The risk
/// classifier and the quote calculator each run at most once per session, at
/// the step where their last input arrives.
pub fn advance(
    session: &mut IntakeSession,
    text: &str,
    catalog: &ServiceCatalog,
    tables: &QuoteTables,
    whatsapp_number: &str,
) -> Result<StepOutcome, QuoteError> {
    match session.stage {
        Stage::ServiceSelection => select_service(session, text, catalog, tables),
        Stage::Category => {
            let Some(category) = EstablishmentCategory::parse(text) else {
                return Ok(StepOutcome::reprompt(
                    format!(
                        "No reconocí el giro del local. Elige una opción:\n{}",
                        category_menu()
                    ),
                    category_quick_replies(),
                ));
            };
            session.category = Some(category);
            session.stage = Stage::Subtype;
            Ok(StepOutcome::prompt(
                format!(
                    "Perfecto, {}. ¿Qué tipo exactamente? (por ejemplo: bodega, ferretería, consultorio)",
                    category.label_es().to_lowercase()
                ),
                Vec::new(),
            ))
        }
        Stage::Subtype => {
            if text.is_empty() {
                return Ok(StepOutcome::reprompt(
                    "Cuéntame qué tipo de local es, en una palabra está bien.".to_string(),
                    Vec::new(),
                ));
            }
            session.subtype = Some(text.to_string());
            session.stage = Stage::Area;
            Ok(StepOutcome::prompt(
                "¿Cuántos metros cuadrados tiene el local? (área techada total)".to_string(),
                Vec::new(),
            ))
        }
        Stage::Area => match parse_area_m2(text) {
            Ok(area) => {
                session.area_m2 = Some(area);
                session.stage = Stage::Floors;
                Ok(StepOutcome::prompt(
                    "¿Cuántos pisos ocupa el local?".to_string(),
                    vec!["1".to_string(), "2".to_string(), "3".to_string()],
                ))
            }
            Err(_) => Ok(StepOutcome::reprompt(
                "Necesito el área en números, por ejemplo: 120. Debe ser mayor que cero."
                    .to_string(),
                Vec::new(),
            )),
        },
        Stage::Floors => classify_and_price(session, text, catalog, tables),
        Stage::Quantity => price_by_quantity(session, text, catalog, tables),
        Stage::Scheduling => {
            if text.is_empty() {
                return Ok(StepOutcome::reprompt(
                    "¿Qué día y hora te acomodan para la visita?".to_string(),
                    Vec::new(),
                ));
            }
            session.schedule_note = Some(text.to_string());
            session.stage = Stage::Contact;
            Ok(StepOutcome::prompt(
                "Para coordinar, dime tu nombre y un teléfono de contacto (ej: Ana Torres, 987654321)"
                    .to_string(),
                Vec::new(),
            ))
        }
        Stage::Contact => {
            let Some(contact) = parse_contact(text) else {
                return Ok(StepOutcome::reprompt(
                    "No pude leer el contacto. Escribe tu nombre seguido del teléfono, ej: Ana Torres, 987654321"
                        .to_string(),
                    Vec::new(),
                ));
            };
            session.contact = Some(contact);
            session.stage = Stage::Confirm;

            let preview = final_summary(session, catalog, whatsapp_number)?;
            Ok(StepOutcome::prompt(
                format!("{}\n\n¿Confirmamos el envío? (sí / no)", preview.text),
                vec!["sí".to_string(), "no".to_string()],
            ))
        }
        Stage::Confirm => match parse_yes_no(text) {
            Some(true) => {
                session.stage = Stage::Done;
                let summary = final_summary(session, catalog, whatsapp_number)?;
                Ok(StepOutcome {
                    reply_text: format!(
                        "¡Listo! Registramos tu solicitud. Puedes enviarnos el resumen directo por WhatsApp:\n{}",
                        summary.whatsapp_url
                    ),
                    quick_replies: Vec::new(),
                    quote_ready: false,
                    whatsapp_url: Some(summary.whatsapp_url),
                    rejected_input: false,
                    done: true,
                })
            }
            Some(false) => {
                session.restart();
                Ok(StepOutcome::prompt(
                    format!("Sin problema, empecemos de nuevo.\n{}", service_menu(catalog)),
                    service_quick_replies(catalog),
                ))
            }
            None => Ok(StepOutcome::reprompt(
                "¿Confirmamos el envío? Responde sí o no.".to_string(),
                vec!["sí".to_string(), "no".to_string()],
            )),
        },
        Stage::Done => {
            session.restart();
            Ok(StepOutcome::prompt(
                format!(
                    "Iniciemos una nueva cotización.\n{}",
                    service_menu(catalog)
                ),
                service_quick_replies(catalog),
            ))
        }
    }
}

fn select_service(
    session: &mut IntakeSession,
    text: &str,
    catalog: &ServiceCatalog,
    tables: &QuoteTables,
) -> Result<StepOutcome, QuoteError> {
    let Some(service) = ServiceId::parse(text) else {
        return Ok(StepOutcome::reprompt(
            format!("Hola, soy el asistente de Voltio. {}", service_menu(catalog)),
            service_quick_replies(catalog),
        ));
    };

    let entry = catalog.get(service)?;
    session.service = Some(service);

    match &entry.strategy {
        PricingStrategy::RiskTiered => {
            session.stage = Stage::Category;
            Ok(StepOutcome::prompt(
                format!(
                    "Para el {} primero clasificamos el nivel de riesgo del local. ¿Cuál es el giro?\n{}",
                    entry.name,
                    category_menu()
                ),
                category_quick_replies(),
            ))
        }
        PricingStrategy::PerUnit { unit_label, unit_price } => {
            session.stage = Stage::Quantity;
            Ok(StepOutcome::prompt(
                format!(
                    "{}: {} por {}. ¿Cuántos necesitas?",
                    entry.name, unit_price, unit_label
                ),
                Vec::new(),
            ))
        }
        PricingStrategy::PerArea { price_per_m2 } => {
            session.stage = Stage::Quantity;
            Ok(StepOutcome::prompt(
                format!(
                    "{}: {} por metro cuadrado. ¿Cuántos m2 tiene el local?",
                    entry.name, price_per_m2
                ),
                Vec::new(),
            ))
        }
        PricingStrategy::Tiered { .. } => {
            session.stage = Stage::Quantity;
            Ok(StepOutcome::prompt(
                format!("{}: el precio va por rango de área. ¿Cuántos m2 tiene el local?", entry.name),
                Vec::new(),
            ))
        }
        PricingStrategy::FlatRange { .. } => {
            let quote = compute_quote(catalog, tables, service, QuoteBasis::None)?;
            session.quote = Some(quote.clone());
            session.stage = Stage::Scheduling;
            Ok(StepOutcome {
                reply_text: format!(
                    "{}: el precio referencial es {} (depende del terreno y los materiales).\n¿Qué día y hora te acomodan para la visita?",
                    entry.name, quote.total
                ),
                quick_replies: Vec::new(),
                quote_ready: true,
                whatsapp_url: None,
                rejected_input: false,
                done: false,
            })
        }
        PricingStrategy::SiteVisit => {
            session.stage = Stage::Scheduling;
            Ok(StepOutcome::prompt(
                format!(
                    "{} se cotiza luego de una visita técnica gratuita. ¿Qué día y hora te acomodan?",
                    entry.name
                ),
                Vec::new(),
            ))
        }
    }
}

fn classify_and_price(
    session: &mut IntakeSession,
    text: &str,
    catalog: &ServiceCatalog,
    tables: &QuoteTables,
) -> Result<StepOutcome, QuoteError> {
    let floors = match parse_floors(text) {
        Ok(floors) => floors,
        Err(_) => {
            return Ok(StepOutcome::reprompt(
                "Necesito el número de pisos como entero, por ejemplo: 2.".to_string(),
                Vec::new(),
            ))
        }
    };

    let (Some(service), Some(category), Some(subtype), Some(area)) = (
        session.service,
        session.category,
        session.subtype.clone(),
        session.area_m2,
    ) else {
        // Session data went missing mid-flow; start over rather than guess.
        session.restart();
        return Ok(StepOutcome::prompt(
            format!("Retomemos desde el inicio.\n{}", service_menu(catalog)),
            service_quick_replies(catalog),
        ));
    };

    let profile = match EstablishmentProfile::new(category, subtype, area, floors) {
        Ok(profile) => profile,
        Err(err) => {
            return Ok(StepOutcome::reprompt(
                format!("Hay un dato fuera de rango ({err}). ¿Cuántos pisos ocupa el local?"),
                Vec::new(),
            ))
        }
    };

    session.floors = Some(floors);

    let risk = match classify_risk(profile.category, profile.area_m2, profile.floors) {
        Ok(risk) => risk,
        Err(err) => {
            return Ok(StepOutcome::reprompt(
                format!("Hay un dato fuera de rango ({err}). ¿Cuántos pisos ocupa el local?"),
                Vec::new(),
            ))
        }
    };
    session.risk = Some(risk);

    let quote = compute_quote(catalog, tables, service, QuoteBasis::Risk(risk))?;
    let entry = catalog.get(service)?;

    let statutory = quote
        .statutory_days
        .map(|days| format!("\nPlazo legal de trámite: {days} días hábiles"))
        .unwrap_or_default();
    let municipal = quote
        .municipal_fee
        .map(|fee| format!("\nDerecho municipal (TUPA): {fee}"))
        .unwrap_or_default();

    let reply_text = format!(
        "Tu local clasifica como {}.{}\nServicio {}: {}\nTotal estimado: {}{}\n\n¿Qué día y hora te acomodan para la inspección?",
        risk.label_es(),
        municipal,
        entry.name,
        quote.service_fee,
        quote.total,
        statutory
    );

    session.quote = Some(quote);
    session.stage = Stage::Scheduling;

    Ok(StepOutcome {
        reply_text,
        quick_replies: Vec::new(),
        quote_ready: true,
        whatsapp_url: None,
        rejected_input: false,
        done: false,
    })
}

fn price_by_quantity(
    session: &mut IntakeSession,
    text: &str,
    catalog: &ServiceCatalog,
    tables: &QuoteTables,
) -> Result<StepOutcome, QuoteError> {
    let Some(service) = session.service else {
        session.restart();
        return Ok(StepOutcome::prompt(
            format!("Retomemos desde el inicio.\n{}", service_menu(catalog)),
            service_quick_replies(catalog),
        ));
    };

    let quantity = match parse_quantity(text) {
        Ok(quantity) => quantity,
        Err(_) => {
            return Ok(StepOutcome::reprompt(
                "Necesito una cantidad en números mayor que cero, por ejemplo: 5.".to_string(),
                Vec::new(),
            ))
        }
    };

    let entry = catalog.get(service)?;
    if matches!(entry.strategy, PricingStrategy::PerUnit { .. }) && quantity.fract() != 0.0 {
        return Ok(StepOutcome::reprompt(
            "Para este servicio la cantidad debe ser un número entero.".to_string(),
            Vec::new(),
        ));
    }

    let quote = match compute_quote(catalog, tables, service, QuoteBasis::Quantity(quantity)) {
        Ok(quote) => quote,
        Err(err @ QuoteError::MissingTableEntry { .. }) => return Err(err),
        Err(_) => {
            return Ok(StepOutcome::reprompt(
                "Necesito una cantidad en números mayor que cero, por ejemplo: 5.".to_string(),
                Vec::new(),
            ))
        }
    };

    session.quantity = Some(quantity);

    let reply_text = format!(
        "{} por {}: total {}.\n\n¿Qué día y hora te acomodan para la visita?",
        entry.name,
        describe_quantity(&entry.strategy, quantity),
        quote.total
    );

    session.quote = Some(quote);
    session.stage = Stage::Scheduling;

    Ok(StepOutcome {
        reply_text,
        quick_replies: Vec::new(),
        quote_ready: true,
        whatsapp_url: None,
        rejected_input: false,
        done: false,
    })
}

fn final_summary(
    session: &IntakeSession,
    catalog: &ServiceCatalog,
    whatsapp_number: &str,
) -> Result<voltio_core::QuoteSummary, QuoteError> {
    let service = session.service.ok_or_else(|| QuoteError::InvalidInput {
        field: "service",
        message: "no service selected yet".to_string(),
    })?;
    let entry = catalog.get(service)?;

    let profile = session.category.and_then(|category| {
        EstablishmentProfile::new(
            category,
            session.subtype.clone().unwrap_or_default(),
            session.area_m2.unwrap_or(1.0),
            session.floors.unwrap_or(1),
        )
        .ok()
    });

    Ok(match &session.quote {
        Some(quote) => compose_quote_summary(
            quote,
            entry,
            profile.as_ref(),
            session.contact.as_ref(),
            session.schedule_note.as_deref(),
            whatsapp_number,
        ),
        None => compose_site_visit_summary(
            entry,
            session.contact.as_ref(),
            session.schedule_note.as_deref(),
            whatsapp_number,
        ),
    })
}

fn describe_quantity(strategy: &PricingStrategy, quantity: f64) -> String {
    match strategy {
        PricingStrategy::PerUnit { unit_label, .. } => {
            format!("{} {}(s)", quantity, unit_label)
        }
        _ => format!("{quantity} m2"),
    }
}

fn service_menu(catalog: &ServiceCatalog) -> String {
    let mut lines = vec!["¿Qué servicio necesitas?".to_string()];
    for (index, entry) in catalog.entries().iter().enumerate() {
        lines.push(format!("{}. {}", index + 1, entry.name));
    }
    lines.join("\n")
}

fn service_quick_replies(catalog: &ServiceCatalog) -> Vec<String> {
    catalog
        .entries()
        .iter()
        .map(|entry| entry.name.clone())
        .collect()
}

fn category_menu() -> String {
    EstablishmentCategory::ALL
        .iter()
        .enumerate()
        .map(|(index, category)| format!("{}. {}", index + 1, category.label_es()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn category_quick_replies() -> Vec<String> {
    EstablishmentCategory::ALL
        .iter()
        .map(|category| category.label_es().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltio_core::RiskCategory;

    const WA: &str = "51987654321";

    fn fixtures() -> (ServiceCatalog, QuoteTables) {
        (ServiceCatalog::builtin(), QuoteTables::published())
    }

    fn step(
        session: &mut IntakeSession,
        text: &str,
        catalog: &ServiceCatalog,
        tables: &QuoteTables,
    ) -> StepOutcome {
        advance(session, text, catalog, tables, WA).expect("no table defects")
    }

    #[test]
    fn certificate_flow_collects_fields_then_quotes_once() {
        let (catalog, tables) = fixtures();
        let mut session = IntakeSession::new("t-1");

        step(&mut session, "quiero el certificado itse", &catalog, &tables);
        assert_eq!(session.stage, Stage::Category);

        step(&mut session, "comercio", &catalog, &tables);
        assert_eq!(session.stage, Stage::Subtype);

        step(&mut session, "bodega", &catalog, &tables);
        assert_eq!(session.stage, Stage::Area);

        step(&mut session, "120 m2", &catalog, &tables);
        assert_eq!(session.stage, Stage::Floors);

        let outcome = step(&mut session, "2 pisos", &catalog, &tables);
        assert!(outcome.quote_ready);
        assert_eq!(session.stage, Stage::Scheduling);
        assert_eq!(session.risk, Some(RiskCategory::Medium));

        let quote = session.quote.clone().expect("quote stored");
        assert_eq!(quote.total.min.cents(), 65860);
        assert_eq!(quote.total.max.cents(), 85860);
        assert!(outcome.reply_text.contains("S/ 208.60"));

        step(&mut session, "lunes 10am", &catalog, &tables);
        assert_eq!(session.stage, Stage::Contact);

        let preview = step(&mut session, "Ana Torres, 987654321", &catalog, &tables);
        assert_eq!(session.stage, Stage::Confirm);
        assert!(preview.reply_text.contains("S/ 658.60 - S/ 858.60"));

        let finish = step(&mut session, "sí", &catalog, &tables);
        assert!(finish.done);
        assert_eq!(session.stage, Stage::Done);
        let url = finish.whatsapp_url.expect("deep link");
        assert!(url.starts_with("https://wa.me/51987654321?text="));
    }

    #[test]
    fn invalid_area_reprompts_without_advancing() {
        let (catalog, tables) = fixtures();
        let mut session = IntakeSession::new("t-2");

        step(&mut session, "itse", &catalog, &tables);
        step(&mut session, "oficina", &catalog, &tables);
        step(&mut session, "estudio contable", &catalog, &tables);
        assert_eq!(session.stage, Stage::Area);

        let outcome = step(&mut session, "no estoy seguro", &catalog, &tables);
        assert!(outcome.rejected_input);
        assert_eq!(session.stage, Stage::Area);
        assert!(session.area_m2.is_none());

        let outcome = step(&mut session, "0", &catalog, &tables);
        assert!(outcome.rejected_input);
        assert_eq!(session.stage, Stage::Area);
    }

    #[test]
    fn per_unit_flow_quotes_from_quantity() {
        let (catalog, tables) = fixtures();
        let mut session = IntakeSession::new("t-3");

        step(&mut session, "luces de emergencia", &catalog, &tables);
        assert_eq!(session.stage, Stage::Quantity);

        let rejected = step(&mut session, "5.5", &catalog, &tables);
        assert!(rejected.rejected_input);
        assert_eq!(session.stage, Stage::Quantity);

        let outcome = step(&mut session, "5", &catalog, &tables);
        assert!(outcome.quote_ready);
        assert_eq!(session.quote.as_ref().expect("quote").total.min.cents(), 75000);
        assert_eq!(session.stage, Stage::Scheduling);
    }

    #[test]
    fn site_visit_service_skips_pricing() {
        let (catalog, tables) = fixtures();
        let mut session = IntakeSession::new("t-4");

        let outcome = step(&mut session, "mantenimiento", &catalog, &tables);
        assert_eq!(session.stage, Stage::Scheduling);
        assert!(!outcome.quote_ready);
        assert!(session.quote.is_none());

        step(&mut session, "viernes en la tarde", &catalog, &tables);
        step(&mut session, "Luis Paz, 912345678", &catalog, &tables);
        let finish = step(&mut session, "sí", &catalog, &tables);
        assert!(finish.done);
        assert!(finish.whatsapp_url.is_some());
        assert!(session.quote.is_none());
    }

    #[test]
    fn flat_range_service_quotes_immediately() {
        let (catalog, tables) = fixtures();
        let mut session = IntakeSession::new("t-5");

        let outcome = step(&mut session, "pozo a tierra", &catalog, &tables);
        assert!(outcome.quote_ready);
        assert_eq!(session.stage, Stage::Scheduling);
        let quote = session.quote.as_ref().expect("quote");
        assert_eq!(quote.total.min.cents(), 110000);
        assert_eq!(quote.total.max.cents(), 160000);
    }

    #[test]
    fn declining_confirmation_restarts_the_intake() {
        let (catalog, tables) = fixtures();
        let mut session = IntakeSession::new("t-6");

        step(&mut session, "pozo a tierra", &catalog, &tables);
        step(&mut session, "sábado 9am", &catalog, &tables);
        step(&mut session, "Eva Díaz, 999888777", &catalog, &tables);
        assert_eq!(session.stage, Stage::Confirm);

        step(&mut session, "no", &catalog, &tables);
        assert_eq!(session.stage, Stage::ServiceSelection);
        assert!(session.service.is_none());
        assert!(session.quote.is_none());
    }

    #[test]
    fn unknown_service_text_shows_menu_again() {
        let (catalog, tables) = fixtures();
        let mut session = IntakeSession::new("t-7");

        let outcome = step(&mut session, "hola", &catalog, &tables);
        assert!(outcome.rejected_input);
        assert_eq!(session.stage, Stage::ServiceSelection);
        assert!(outcome.reply_text.contains("Certificado ITSE"));
        assert_eq!(outcome.quick_replies.len(), 7);
    }
}
