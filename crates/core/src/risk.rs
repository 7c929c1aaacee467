use crate::error::QuoteError;
use crate::models::{EstablishmentCategory, RiskCategory};

/// Maps an establishment to its inspection risk level.
///
/// Thresholds follow the published classification table. Comparisons are
/// inclusive on the low-risk side: an establishment sitting exactly on a
/// boundary lands in the lower bucket.
pub fn classify_risk(
    category: EstablishmentCategory,
    area_m2: f64,
    floors: u32,
) -> Result<RiskCategory, QuoteError> {
    if !area_m2.is_finite() || area_m2 <= 0.0 {
        return Err(QuoteError::InvalidInput {
            field: "area_m2",
            message: format!("area must be a positive number of square meters, got {area_m2}"),
        });
    }
    if floors < 1 {
        return Err(QuoteError::InvalidInput {
            field: "floors",
            message: "floor count must be at least 1".to_string(),
        });
    }

    use EstablishmentCategory::*;
    use RiskCategory::*;

    Ok(match category {
        Commerce => {
            if area_m2 <= 100.0 && floors <= 2 {
                Low
            } else if area_m2 <= 500.0 {
                Medium
            } else {
                High
            }
        }
        Office => {
            if area_m2 <= 560.0 && floors <= 4 {
                Low
            } else {
                Medium
            }
        }
        Restaurant => {
            if area_m2 > 150.0 {
                High
            } else {
                Medium
            }
        }
        Lodging | Assembly => {
            if area_m2 > 500.0 || floors > 3 {
                VeryHigh
            } else {
                High
            }
        }
        Industrial => {
            if area_m2 > 300.0 {
                VeryHigh
            } else {
                High
            }
        }
        // Fixed base risk for these, regardless of size.
        Health | Education => Medium,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use EstablishmentCategory::*;
    use RiskCategory::*;

    fn risk(category: EstablishmentCategory, area: f64, floors: u32) -> RiskCategory {
        classify_risk(category, area, floors).expect("valid input")
    }

    #[test]
    fn commerce_boundaries_favor_lower_bucket() {
        assert_eq!(risk(Commerce, 100.0, 2), Low);
        assert_eq!(risk(Commerce, 101.0, 2), Medium);
        assert_eq!(risk(Commerce, 100.0, 3), Medium);
        assert_eq!(risk(Commerce, 500.0, 1), Medium);
        assert_eq!(risk(Commerce, 501.0, 1), High);
    }

    #[test]
    fn office_boundaries() {
        assert_eq!(risk(Office, 560.0, 4), Low);
        assert_eq!(risk(Office, 560.0, 5), Medium);
        assert_eq!(risk(Office, 561.0, 4), Medium);
    }

    #[test]
    fn restaurant_boundaries() {
        assert_eq!(risk(Restaurant, 150.0, 1), Medium);
        assert_eq!(risk(Restaurant, 151.0, 1), High);
    }

    #[test]
    fn lodging_and_assembly_escalate_on_area_or_floors() {
        assert_eq!(risk(Lodging, 500.0, 3), High);
        assert_eq!(risk(Lodging, 501.0, 3), VeryHigh);
        assert_eq!(risk(Lodging, 200.0, 4), VeryHigh);
        assert_eq!(risk(Assembly, 500.0, 3), High);
        assert_eq!(risk(Assembly, 120.0, 4), VeryHigh);
    }

    #[test]
    fn industrial_boundaries() {
        assert_eq!(risk(Industrial, 300.0, 1), High);
        assert_eq!(risk(Industrial, 301.0, 1), VeryHigh);
    }

    #[test]
    fn health_and_education_ignore_size() {
        assert_eq!(risk(Health, 10.0, 1), Medium);
        assert_eq!(risk(Health, 5000.0, 12), Medium);
        assert_eq!(risk(Education, 10.0, 1), Medium);
        assert_eq!(risk(Education, 5000.0, 12), Medium);
    }

    #[test]
    fn every_category_classifies_for_valid_input() {
        for category in EstablishmentCategory::ALL {
            for area in [1.0, 100.0, 150.0, 300.0, 500.0, 560.0, 2000.0] {
                for floors in [1, 2, 3, 4, 5, 10] {
                    classify_risk(category, area, floors).expect("total for valid input");
                }
            }
        }
    }

    #[test]
    fn rejects_non_positive_area_and_zero_floors() {
        for bad_area in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = classify_risk(Commerce, bad_area, 1).unwrap_err();
            assert!(matches!(err, QuoteError::InvalidInput { field: "area_m2", .. }));
        }
        let err = classify_risk(Commerce, 50.0, 0).unwrap_err();
        assert!(matches!(err, QuoteError::InvalidInput { field: "floors", .. }));
    }

    #[test]
    fn classification_is_deterministic() {
        let first = risk(Commerce, 120.0, 2);
        let second = risk(Commerce, 120.0, 2);
        assert_eq!(first, second);
    }
}
