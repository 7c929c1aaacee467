use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::QuoteError;
use crate::models::{
    FeeRange, Money, PriceTier, PricingStrategy, RiskCategory, ServiceCatalogEntry, ServiceId,
};

pub const TABLES_PATH_ENV: &str = "VOLTIO_TABLES_PATH";

/// One row of the municipal fee schedule (TUPA), keyed by risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MunicipalFeeEntry {
    pub fee: Money,
    pub renewal_fee: Money,
    /// Legally mandated processing time, in working days.
    pub statutory_days: u16,
}

/// The two risk-keyed schedules the certificate path prices from. Loaded once
/// at startup and never mutated; a schedule change ships as a new deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteTables {
    municipal: BTreeMap<RiskCategory, MunicipalFeeEntry>,
    inspection_ranges: BTreeMap<RiskCategory, FeeRange>,
}

impl QuoteTables {
    /// The schedule currently in force, as published.
    pub fn published() -> Self {
        let municipal = BTreeMap::from([
            (
                RiskCategory::Low,
                MunicipalFeeEntry {
                    fee: Money::from_cents(16630),
                    renewal_fee: Money::from_cents(15010),
                    statutory_days: 9,
                },
            ),
            (
                RiskCategory::Medium,
                MunicipalFeeEntry {
                    fee: Money::from_cents(20860),
                    renewal_fee: Money::from_cents(18770),
                    statutory_days: 9,
                },
            ),
            (
                RiskCategory::High,
                MunicipalFeeEntry {
                    fee: Money::from_cents(124330),
                    renewal_fee: Money::from_cents(111900),
                    statutory_days: 12,
                },
            ),
            (
                RiskCategory::VeryHigh,
                MunicipalFeeEntry {
                    fee: Money::from_cents(146290),
                    renewal_fee: Money::from_cents(131660),
                    statutory_days: 12,
                },
            ),
        ]);

        let inspection_ranges = BTreeMap::from([
            (
                RiskCategory::Low,
                FeeRange::new(Money::from_cents(35000), Money::from_cents(50000)),
            ),
            (
                RiskCategory::Medium,
                FeeRange::new(Money::from_cents(45000), Money::from_cents(65000)),
            ),
            (
                RiskCategory::High,
                FeeRange::new(Money::from_cents(75000), Money::from_cents(120000)),
            ),
            (
                RiskCategory::VeryHigh,
                FeeRange::new(Money::from_cents(120000), Money::from_cents(200000)),
            ),
        ]);

        Self {
            municipal,
            inspection_ranges,
        }
    }

    /// Reads an overriding schedule from a JSON file. Amounts are céntimos.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading fee tables from {}", path.display()))?;
        let tables: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing fee tables from {}", path.display()))?;
        tables.validate().context("fee tables are incomplete")?;
        Ok(tables)
    }

    /// Published schedule, or the file named by `VOLTIO_TABLES_PATH`.
    pub fn from_env() -> Result<Self> {
        match env::var(TABLES_PATH_ENV) {
            Ok(path) => Self::from_json_path(path),
            Err(_) => Ok(Self::published()),
        }
    }

    pub fn municipal(&self, risk: RiskCategory) -> Result<&MunicipalFeeEntry, QuoteError> {
        self.municipal
            .get(&risk)
            .ok_or_else(|| QuoteError::MissingTableEntry {
                table: "municipal_fees",
                key: risk.as_code().to_string(),
            })
    }

    pub fn inspection_range(&self, risk: RiskCategory) -> Result<FeeRange, QuoteError> {
        self.inspection_ranges
            .get(&risk)
            .copied()
            .ok_or_else(|| QuoteError::MissingTableEntry {
                table: "inspection_ranges",
                key: risk.as_code().to_string(),
            })
    }

    /// Fail-fast completeness check: both schedules must cover every risk
    /// level before the process serves a single request.
    pub fn validate(&self) -> Result<(), QuoteError> {
        for risk in RiskCategory::ALL {
            self.municipal(risk)?;
            self.inspection_range(risk)?;
        }
        Ok(())
    }
}

/// Everything the company sells through the intake chat, with its pricing
/// strategy and the disclosed line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCatalog {
    entries: Vec<ServiceCatalogEntry>,
}

impl ServiceCatalog {
    pub fn builtin() -> Self {
        let entries = vec![
            ServiceCatalogEntry {
                id: ServiceId::CertificadoItse,
                name: "Certificado ITSE".to_string(),
                strategy: PricingStrategy::RiskTiered,
                included: vec![
                    "Inspección de campo".to_string(),
                    "Elaboración del expediente técnico".to_string(),
                    "Levantamiento de observaciones".to_string(),
                    "Acompañamiento hasta la emisión del certificado".to_string(),
                ],
            },
            ServiceCatalogEntry {
                id: ServiceId::PozoTierra,
                name: "Instalación de pozo a tierra".to_string(),
                strategy: PricingStrategy::FlatRange {
                    min: Money::from_cents(110000),
                    max: Money::from_cents(160000),
                },
                included: vec![
                    "Excavación y electrodo de cobre".to_string(),
                    "Tratamiento químico del terreno".to_string(),
                    "Conexión al tablero general".to_string(),
                ],
            },
            ServiceCatalogEntry {
                id: ServiceId::MedicionPozoTierra,
                name: "Medición de pozo a tierra con protocolo".to_string(),
                strategy: PricingStrategy::PerUnit {
                    unit_price: Money::from_cents(25000),
                    unit_label: "pozo".to_string(),
                },
                included: vec![
                    "Medición con telurómetro calibrado".to_string(),
                    "Protocolo firmado por ingeniero colegiado CIP".to_string(),
                ],
            },
            ServiceCatalogEntry {
                id: ServiceId::LucesEmergencia,
                name: "Luces de emergencia".to_string(),
                strategy: PricingStrategy::PerUnit {
                    unit_price: Money::from_cents(15000),
                    unit_label: "punto".to_string(),
                },
                included: vec![
                    "Equipo certificado con batería".to_string(),
                    "Instalación y prueba de autonomía".to_string(),
                ],
            },
            ServiceCatalogEntry {
                id: ServiceId::PlanosElectricos,
                name: "Planos eléctricos".to_string(),
                strategy: PricingStrategy::PerArea {
                    price_per_m2: Money::from_cents(350),
                },
                included: vec![
                    "Levantamiento en sitio".to_string(),
                    "Plano de distribución y diagrama unifilar".to_string(),
                    "Firma de ingeniero colegiado CIP".to_string(),
                ],
            },
            ServiceCatalogEntry {
                id: ServiceId::InstalacionesElectricas,
                name: "Instalaciones eléctricas".to_string(),
                strategy: PricingStrategy::Tiered {
                    tiers: vec![
                        PriceTier {
                            up_to: Some(50.0),
                            price: Money::from_cents(250000),
                        },
                        PriceTier {
                            up_to: Some(150.0),
                            price: Money::from_cents(650000),
                        },
                        PriceTier {
                            up_to: None,
                            price: Money::from_cents(1200000),
                        },
                    ],
                },
                included: vec![
                    "Cableado y tablero de distribución".to_string(),
                    "Tomacorrientes y puntos de luz".to_string(),
                    "Pruebas de aislamiento".to_string(),
                ],
            },
            ServiceCatalogEntry {
                id: ServiceId::MantenimientoElectrico,
                name: "Mantenimiento eléctrico".to_string(),
                strategy: PricingStrategy::SiteVisit,
                included: vec![
                    "Diagnóstico en sitio".to_string(),
                    "Informe de hallazgos y propuesta".to_string(),
                ],
            },
        ];

        Self { entries }
    }

    pub fn entries(&self) -> &[ServiceCatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: ServiceId) -> Result<&ServiceCatalogEntry, QuoteError> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .ok_or_else(|| QuoteError::MissingTableEntry {
                table: "service_catalog",
                key: id.as_code().to_string(),
            })
    }

    pub fn validate(&self) -> Result<(), QuoteError> {
        for id in ServiceId::ALL {
            self.get(id)?;
        }
        Ok(())
    }
}
