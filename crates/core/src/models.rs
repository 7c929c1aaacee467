use std::fmt;
use std::ops::Add;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Amount in céntimos. Fee arithmetic stays in integers so quoted totals add
/// up exactly against the published schedule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Price for a fractional quantity, rounded to the nearest céntimo.
    pub fn times(self, quantity: f64) -> Money {
        Money((self.0 as f64 * quantity).round() as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S/ {}.{:02}", self.0 / 100, (self.0 % 100).abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRange {
    pub min: Money,
    pub max: Money,
}

impl FeeRange {
    pub const fn new(min: Money, max: Money) -> Self {
        Self { min, max }
    }

    pub const fn exact(amount: Money) -> Self {
        Self {
            min: amount,
            max: amount,
        }
    }

    pub fn is_exact(self) -> bool {
        self.min == self.max
    }

    pub fn shift(self, by: Money) -> FeeRange {
        FeeRange {
            min: self.min + by,
            max: self.max + by,
        }
    }
}

impl fmt::Display for FeeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{} - {}", self.min, self.max)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [Self::Low, Self::Medium, Self::High, Self::VeryHigh];

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    pub fn label_es(self) -> &'static str {
        match self {
            Self::Low => "riesgo bajo",
            Self::Medium => "riesgo medio",
            Self::High => "riesgo alto",
            Self::VeryHigh => "riesgo muy alto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstablishmentCategory {
    Commerce,
    Office,
    Restaurant,
    Lodging,
    Assembly,
    Industrial,
    Health,
    Education,
}

impl EstablishmentCategory {
    pub const ALL: [EstablishmentCategory; 8] = [
        Self::Commerce,
        Self::Office,
        Self::Restaurant,
        Self::Lodging,
        Self::Assembly,
        Self::Industrial,
        Self::Health,
        Self::Education,
    ];

    /// Accepts a menu number or a Spanish keyword from the intake chat.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "1" | "comercio" | "tienda" | "bodega" | "galeria" | "galería" | "mercado" => {
                Some(Self::Commerce)
            }
            "2" | "oficina" | "oficinas" | "administrativo" | "consultora" => Some(Self::Office),
            "3" | "restaurante" | "restaurant" | "cafeteria" | "cafetería" | "polleria"
            | "pollería" | "chifa" => Some(Self::Restaurant),
            "4" | "hospedaje" | "hotel" | "hostal" | "alojamiento" => Some(Self::Lodging),
            "5" | "reunion" | "reunión" | "auditorio" | "iglesia" | "cine" | "teatro"
            | "gimnasio" => Some(Self::Assembly),
            "6" | "industria" | "industrial" | "fabrica" | "fábrica" | "taller" | "almacen"
            | "almacén" => Some(Self::Industrial),
            "7" | "salud" | "clinica" | "clínica" | "consultorio" | "botica" | "farmacia" => {
                Some(Self::Health)
            }
            "8" | "educacion" | "educación" | "colegio" | "academia" | "instituto" | "cuna" => {
                Some(Self::Education)
            }
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Commerce => "commerce",
            Self::Office => "office",
            Self::Restaurant => "restaurant",
            Self::Lodging => "lodging",
            Self::Assembly => "assembly",
            Self::Industrial => "industrial",
            Self::Health => "health",
            Self::Education => "education",
        }
    }

    pub fn label_es(self) -> &'static str {
        match self {
            Self::Commerce => "Comercio",
            Self::Office => "Oficinas administrativas",
            Self::Restaurant => "Restaurante",
            Self::Lodging => "Hospedaje",
            Self::Assembly => "Local de reunión",
            Self::Industrial => "Industria",
            Self::Health => "Establecimiento de salud",
            Self::Education => "Centro educativo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceId {
    CertificadoItse,
    PozoTierra,
    MedicionPozoTierra,
    LucesEmergencia,
    PlanosElectricos,
    InstalacionesElectricas,
    MantenimientoElectrico,
}

impl ServiceId {
    pub const ALL: [ServiceId; 7] = [
        Self::CertificadoItse,
        Self::PozoTierra,
        Self::MedicionPozoTierra,
        Self::LucesEmergencia,
        Self::PlanosElectricos,
        Self::InstalacionesElectricas,
        Self::MantenimientoElectrico,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        match lower.as_str() {
            "1" | "certificado_itse" | "itse" | "certificado" => {
                return Some(Self::CertificadoItse)
            }
            "2" | "pozo_tierra" => return Some(Self::PozoTierra),
            "3" | "medicion_pozo_tierra" | "medicion" | "medición" | "protocolo" => {
                return Some(Self::MedicionPozoTierra)
            }
            "4" | "luces_emergencia" | "luces" => return Some(Self::LucesEmergencia),
            "5" | "planos_electricos" | "planos" => return Some(Self::PlanosElectricos),
            "6" | "instalaciones_electricas" | "instalaciones" | "instalacion" | "instalación" => {
                return Some(Self::InstalacionesElectricas)
            }
            "7" | "mantenimiento_electrico" | "mantenimiento" => {
                return Some(Self::MantenimientoElectrico)
            }
            _ => {}
        }

        if lower.contains("itse") || lower.contains("certificado") || lower.contains("defensa") {
            Some(Self::CertificadoItse)
        } else if lower.contains("medicion") || lower.contains("medición") || lower.contains("protocolo") {
            Some(Self::MedicionPozoTierra)
        } else if lower.contains("pozo") || lower.contains("puesta a tierra") {
            Some(Self::PozoTierra)
        } else if lower.contains("luces") || lower.contains("emergencia") {
            Some(Self::LucesEmergencia)
        } else if lower.contains("plano") {
            Some(Self::PlanosElectricos)
        } else if lower.contains("instalacion") || lower.contains("instalación") || lower.contains("cableado") {
            Some(Self::InstalacionesElectricas)
        } else if lower.contains("mantenimiento") {
            Some(Self::MantenimientoElectrico)
        } else {
            None
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::CertificadoItse => "certificado_itse",
            Self::PozoTierra => "pozo_tierra",
            Self::MedicionPozoTierra => "medicion_pozo_tierra",
            Self::LucesEmergencia => "luces_emergencia",
            Self::PlanosElectricos => "planos_electricos",
            Self::InstalacionesElectricas => "instalaciones_electricas",
            Self::MantenimientoElectrico => "mantenimiento_electrico",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    /// Inclusive upper bound for the quantity; `None` marks the open-ended
    /// last bracket.
    pub up_to: Option<f64>,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingStrategy {
    /// Priced from the risk-keyed range table plus the municipal fee.
    RiskTiered,
    PerUnit {
        unit_price: Money,
        unit_label: String,
    },
    PerArea {
        price_per_m2: Money,
    },
    FlatRange {
        min: Money,
        max: Money,
    },
    Tiered {
        tiers: Vec<PriceTier>,
    },
    /// Only quoted after an on-site evaluation.
    SiteVisit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCatalogEntry {
    pub id: ServiceId,
    pub name: String,
    pub strategy: PricingStrategy,
    /// Line items disclosed to the customer; never priced individually.
    pub included: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishmentProfile {
    pub category: EstablishmentCategory,
    pub subtype: String,
    pub area_m2: f64,
    pub floors: u32,
}

impl EstablishmentProfile {
    pub fn new(
        category: EstablishmentCategory,
        subtype: impl Into<String>,
        area_m2: f64,
        floors: u32,
    ) -> Result<Self, crate::QuoteError> {
        if !area_m2.is_finite() || area_m2 <= 0.0 {
            return Err(crate::QuoteError::InvalidInput {
                field: "area_m2",
                message: format!("area must be a positive number of square meters, got {area_m2}"),
            });
        }
        if floors < 1 {
            return Err(crate::QuoteError::InvalidInput {
                field: "floors",
                message: "floor count must be at least 1".to_string(),
            });
        }

        Ok(Self {
            category,
            subtype: subtype.into(),
            area_m2,
            floors,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub service: ServiceId,
    pub risk: Option<RiskCategory>,
    pub municipal_fee: Option<Money>,
    pub statutory_days: Option<u16>,
    pub service_fee: FeeRange,
    pub total: FeeRange,
    pub included: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ServiceSelection,
    Category,
    Subtype,
    Area,
    Floors,
    Quantity,
    Scheduling,
    Contact,
    Confirm,
    Done,
}

impl Stage {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::ServiceSelection => "service_selection",
            Self::Category => "category",
            Self::Subtype => "subtype",
            Self::Area => "area",
            Self::Floors => "floors",
            Self::Quantity => "quantity",
            Self::Scheduling => "scheduling",
            Self::Contact => "contact",
            Self::Confirm => "confirm",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeTurn {
    pub at: DateTime<Utc>,
    pub user_text: String,
    pub reply_text: String,
    pub stage: Stage,
}

/// Conversation state for one intake session. Profile fields fill in one at a
/// time as the chat progresses; `risk` and `quote` are set at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeSession {
    pub session_id: String,
    pub stage: Stage,
    pub service: Option<ServiceId>,
    pub category: Option<EstablishmentCategory>,
    pub subtype: Option<String>,
    pub area_m2: Option<f64>,
    pub floors: Option<u32>,
    pub quantity: Option<f64>,
    pub schedule_note: Option<String>,
    pub contact: Option<ContactInfo>,
    pub risk: Option<RiskCategory>,
    pub quote: Option<Quote>,
    pub expires_at: DateTime<Utc>,
    pub turns: Vec<IntakeTurn>,
}

impl IntakeSession {
    pub const TTL_HOURS: i64 = 24;

    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            stage: Stage::ServiceSelection,
            service: None,
            category: None,
            subtype: None,
            area_m2: None,
            floors: None,
            quantity: None,
            schedule_note: None,
            contact: None,
            risk: None,
            quote: None,
            expires_at: Utc::now() + Duration::hours(Self::TTL_HOURS),
            turns: Vec::new(),
        }
    }

    /// Drops everything collected so far and returns to service selection,
    /// keeping the session id and transcript.
    pub fn restart(&mut self) {
        self.stage = Stage::ServiceSelection;
        self.service = None;
        self.category = None;
        self.subtype = None;
        self.area_m2 = None;
        self.floors = None;
        self.quantity = None;
        self.schedule_note = None;
        self.contact = None;
        self.risk = None;
        self.quote = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub session_id: Option<String>,
    pub text: String,
}
