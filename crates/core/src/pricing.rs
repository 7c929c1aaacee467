use crate::error::QuoteError;
use crate::models::{FeeRange, PricingStrategy, Quote, RiskCategory, ServiceId};
use crate::tables::{QuoteTables, ServiceCatalog};

/// What the caller already knows when asking for a price: the classified risk
/// (certificate path), a quantity (metered paths), or nothing (flat ranges).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuoteBasis {
    Risk(RiskCategory),
    Quantity(f64),
    None,
}

/// Prices one service against the static schedules. Pure: same inputs, same
/// quote, nothing retained between calls.
pub fn compute_quote(
    catalog: &ServiceCatalog,
    tables: &QuoteTables,
    service: ServiceId,
    basis: QuoteBasis,
) -> Result<Quote, QuoteError> {
    let entry = catalog.get(service)?;

    match &entry.strategy {
        PricingStrategy::RiskTiered => {
            let QuoteBasis::Risk(risk) = basis else {
                return Err(QuoteError::InvalidInput {
                    field: "basis",
                    message: format!(
                        "service {} is priced by risk level, not by quantity",
                        service.as_code()
                    ),
                });
            };

            let municipal = tables.municipal(risk)?;
            let service_fee = tables.inspection_range(risk)?;

            Ok(Quote {
                service,
                risk: Some(risk),
                municipal_fee: Some(municipal.fee),
                statutory_days: Some(municipal.statutory_days),
                service_fee,
                total: service_fee.shift(municipal.fee),
                included: entry.included.clone(),
            })
        }
        PricingStrategy::PerUnit { unit_price, .. } => {
            let quantity = positive_quantity(basis, service)?;
            let fee = unit_price.times(quantity);
            Ok(metered_quote(service, entry.included.clone(), fee))
        }
        PricingStrategy::PerArea { price_per_m2 } => {
            let quantity = positive_quantity(basis, service)?;
            let fee = price_per_m2.times(quantity);
            Ok(metered_quote(service, entry.included.clone(), fee))
        }
        PricingStrategy::FlatRange { min, max } => {
            if !matches!(basis, QuoteBasis::None) {
                return Err(QuoteError::InvalidInput {
                    field: "basis",
                    message: format!(
                        "service {} has a fixed price range and takes no sizing input",
                        service.as_code()
                    ),
                });
            }
            let service_fee = FeeRange::new(*min, *max);
            Ok(Quote {
                service,
                risk: None,
                municipal_fee: None,
                statutory_days: None,
                service_fee,
                total: service_fee,
                included: entry.included.clone(),
            })
        }
        PricingStrategy::Tiered { tiers } => {
            let quantity = positive_quantity(basis, service)?;
            let tier = tiers
                .iter()
                .find(|tier| tier.up_to.map_or(true, |limit| quantity <= limit))
                .ok_or_else(|| QuoteError::MissingTableEntry {
                    table: "price_tiers",
                    key: service.as_code().to_string(),
                })?;
            Ok(metered_quote(service, entry.included.clone(), tier.price))
        }
        PricingStrategy::SiteVisit => Err(QuoteError::InvalidInput {
            field: "service",
            message: format!(
                "service {} is only quoted after an on-site evaluation",
                service.as_code()
            ),
        }),
    }
}

fn metered_quote(service: ServiceId, included: Vec<String>, fee: crate::models::Money) -> Quote {
    let service_fee = FeeRange::exact(fee);
    Quote {
        service,
        risk: None,
        municipal_fee: None,
        statutory_days: None,
        service_fee,
        total: service_fee,
        included,
    }
}

fn positive_quantity(basis: QuoteBasis, service: ServiceId) -> Result<f64, QuoteError> {
    match basis {
        QuoteBasis::Quantity(value) if value.is_finite() && value > 0.0 => Ok(value),
        QuoteBasis::Quantity(value) => Err(QuoteError::InvalidInput {
            field: "quantity",
            message: format!("quantity must be a positive number, got {value}"),
        }),
        _ => Err(QuoteError::InvalidInput {
            field: "quantity",
            message: format!("service {} is priced by quantity", service.as_code()),
        }),
    }
}
