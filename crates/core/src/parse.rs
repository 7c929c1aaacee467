use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::QuoteError;
use crate::models::ContactInfo;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:[.,]\d+)?").expect("static pattern"));

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s\-]{5,}\d").expect("static pattern"));

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// First number in the message, with Peruvian comma decimals accepted
/// ("120,5 m2" reads as 120.5).
fn first_number(input: &str) -> Option<f64> {
    let matched = NUMBER_RE.find(input)?;
    matched.as_str().replace(',', ".").parse::<f64>().ok()
}

pub fn parse_area_m2(input: &str) -> Result<f64, QuoteError> {
    let area = first_number(input).ok_or_else(|| QuoteError::InvalidInput {
        field: "area_m2",
        message: format!("no area in square meters found in {input:?}"),
    })?;

    if !area.is_finite() || area <= 0.0 {
        return Err(QuoteError::InvalidInput {
            field: "area_m2",
            message: format!("area must be a positive number of square meters, got {area}"),
        });
    }

    Ok(area)
}

pub fn parse_floors(input: &str) -> Result<u32, QuoteError> {
    let value = first_number(input).ok_or_else(|| QuoteError::InvalidInput {
        field: "floors",
        message: format!("no floor count found in {input:?}"),
    })?;

    if value.fract() != 0.0 || value < 1.0 || value > 200.0 {
        return Err(QuoteError::InvalidInput {
            field: "floors",
            message: format!("floor count must be a whole number of at least 1, got {value}"),
        });
    }

    Ok(value as u32)
}

pub fn parse_quantity(input: &str) -> Result<f64, QuoteError> {
    let quantity = first_number(input).ok_or_else(|| QuoteError::InvalidInput {
        field: "quantity",
        message: format!("no quantity found in {input:?}"),
    })?;

    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(QuoteError::InvalidInput {
            field: "quantity",
            message: format!("quantity must be a positive number, got {quantity}"),
        });
    }

    Ok(quantity)
}

pub fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "si" | "sí" | "s" | "claro" | "ok" | "dale" | "confirmo" | "de acuerdo" | "yes" => {
            Some(true)
        }
        "no" | "n" | "nop" | "cancelar" | "todavia no" | "todavía no" => Some(false),
        _ => None,
    }
}

/// Pulls a phone number out of the message; whatever precedes it is the name.
pub fn parse_contact(input: &str) -> Option<ContactInfo> {
    let normalized = normalize_text(input);
    let matched = PHONE_RE.find(&normalized)?;

    let digits = matched.as_str().chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 6 {
        return None;
    }

    let name = normalized[..matched.start()]
        .trim()
        .trim_end_matches([',', ':', '-'])
        .trim()
        .to_string();
    if name.is_empty() {
        return None;
    }

    let phone = matched
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect::<String>();

    Some(ContactInfo { name, phone })
}
