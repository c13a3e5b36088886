//! C9 — flag derivation, scoring, and action recommendation. Pure
//! function of its inputs; no I/O, no clock reads beyond what callers
//! hand in via `debug_meta`/`calculation`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::Thresholds;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionInput {
    pub field_confidences: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationInput {
    pub missing_fields: Vec<String>,
    pub distribution_tariff_meta_missing: bool,
    pub distribution_tariff_lookup_failed: bool,
    pub distribution_line_mismatch: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculationInput {
    pub meta_pricing_source: Option<String>,
    pub meta_distribution_source: Option<String>,
    pub distribution_total: f64,
    pub consumption_kwh: f64,
    pub meta_total_mismatch: bool,
    pub calculated_total: f64,
    pub invoice_total: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugMetaInput {
    pub json_repair_applied: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculationErrorInput {
    pub message: Option<String>,
}

pub struct ScorerInput<'a> {
    pub extraction: &'a ExtractionInput,
    pub validation: &'a ValidationInput,
    pub calculation: &'a CalculationInput,
    pub calculation_error: &'a CalculationErrorInput,
    pub debug_meta: &'a DebugMetaInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    S1,
    S2,
    S3,
    S4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagCode {
    CalcBug,
    MarketPriceMissing,
    TariffMetaMissing,
    DistributionMissing,
    TariffLookupFailed,
    ConsumptionMissing,
    InvoiceTotalMismatch,
    DistributionMismatch,
    MissingFields,
    JsonRepairApplied,
    LowConfidence,
    ValidationFail,
    Outlier,
    Unknown,
}

impl FlagCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagCode::CalcBug => "CALC_BUG",
            FlagCode::MarketPriceMissing => "MARKET_PRICE_MISSING",
            FlagCode::TariffMetaMissing => "TARIFF_META_MISSING",
            FlagCode::DistributionMissing => "DISTRIBUTION_MISSING",
            FlagCode::TariffLookupFailed => "TARIFF_LOOKUP_FAILED",
            FlagCode::ConsumptionMissing => "CONSUMPTION_MISSING",
            FlagCode::InvoiceTotalMismatch => "INVOICE_TOTAL_MISMATCH",
            FlagCode::DistributionMismatch => "DISTRIBUTION_MISMATCH",
            FlagCode::MissingFields => "MISSING_FIELDS",
            FlagCode::JsonRepairApplied => "JSON_REPAIR_APPLIED",
            FlagCode::LowConfidence => "LOW_CONFIDENCE",
            FlagCode::ValidationFail => "VALIDATION_FAIL",
            FlagCode::Outlier => "OUTLIER",
            FlagCode::Unknown => "UNKNOWN",
        }
    }

    /// Base catalog severity. `INVOICE_TOTAL_MISMATCH`'s effective
    /// severity/priority is decided per-invoice by the mismatch
    /// classifier and overrides this default (S2) when constructing the
    /// flag detail.
    fn base_severity(&self) -> Severity {
        match self {
            FlagCode::CalcBug
            | FlagCode::MarketPriceMissing
            | FlagCode::TariffMetaMissing
            | FlagCode::DistributionMissing
            | FlagCode::TariffLookupFailed
            | FlagCode::ConsumptionMissing => Severity::S1,
            FlagCode::InvoiceTotalMismatch | FlagCode::DistributionMismatch | FlagCode::MissingFields => {
                Severity::S2
            }
            FlagCode::JsonRepairApplied | FlagCode::LowConfidence | FlagCode::ValidationFail => Severity::S3,
            FlagCode::Outlier | FlagCode::Unknown => Severity::S4,
        }
    }

    /// Lowest number wins. `INVOICE_TOTAL_MISMATCH` occupies two slots
    /// (7 for its S1 variant, 9 for its S2 variant); `priority_rank`
    /// returns the slot matching `severity`.
    fn priority_rank(&self, severity: Severity) -> u8 {
        match self {
            FlagCode::CalcBug => 1,
            FlagCode::MarketPriceMissing => 2,
            FlagCode::TariffMetaMissing => 3,
            FlagCode::DistributionMissing => 4,
            FlagCode::TariffLookupFailed => 5,
            FlagCode::ConsumptionMissing => 6,
            FlagCode::InvoiceTotalMismatch => {
                if severity == Severity::S1 {
                    7
                } else {
                    9
                }
            }
            FlagCode::DistributionMismatch => 8,
            FlagCode::MissingFields => 10,
            FlagCode::JsonRepairApplied => 11,
            FlagCode::LowConfidence => 12,
            FlagCode::ValidationFail => 13,
            FlagCode::Outlier => 14,
            FlagCode::Unknown => 15,
        }
    }

    fn deduction(&self, severity: Severity) -> u32 {
        match self {
            FlagCode::CalcBug => 40,
            FlagCode::MarketPriceMissing
            | FlagCode::TariffMetaMissing
            | FlagCode::DistributionMissing
            | FlagCode::TariffLookupFailed
            | FlagCode::ConsumptionMissing => 35,
            FlagCode::InvoiceTotalMismatch => {
                if severity == Severity::S1 {
                    30
                } else {
                    20
                }
            }
            FlagCode::DistributionMismatch => 20,
            FlagCode::MissingFields => 15,
            FlagCode::JsonRepairApplied | FlagCode::LowConfidence | FlagCode::ValidationFail => 10,
            FlagCode::Outlier => 5,
            FlagCode::Unknown => 0,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            FlagCode::TariffMetaMissing => "TARIFF_META_MISSING",
            FlagCode::TariffLookupFailed | FlagCode::DistributionMissing => "TARIFF_MISSING",
            FlagCode::MarketPriceMissing => "PRICE_MISSING",
            FlagCode::ConsumptionMissing => "CONSUMPTION_MISSING",
            FlagCode::CalcBug => "CALC_BUG",
            FlagCode::InvoiceTotalMismatch | FlagCode::DistributionMismatch => "MISMATCH",
            FlagCode::Outlier => "OUTLIER",
            FlagCode::JsonRepairApplied => "JSON_REPAIR",
            FlagCode::MissingFields | FlagCode::LowConfidence | FlagCode::ValidationFail | FlagCode::Unknown => {
                "VALIDATION_FAIL"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    UserFix,
    RetryLookup,
    FallbackOk,
    BugReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub action_type: ActionType,
    pub owner: &'static str,
    pub code: &'static str,
    pub hint_text: &'static str,
}

fn action_for(code: FlagCode) -> Action {
    match code {
        FlagCode::CalcBug | FlagCode::TariffLookupFailed | FlagCode::DistributionMissing | FlagCode::MarketPriceMissing => {
            Action {
                action_type: ActionType::RetryLookup,
                owner: "system",
                code: code.as_str(),
                hint_text: "Automatic lookup retry scheduled",
            }
        }
        FlagCode::ConsumptionMissing | FlagCode::MissingFields => Action {
            action_type: ActionType::UserFix,
            owner: "user",
            code: code.as_str(),
            hint_text: "Required invoice fields are missing",
        },
        FlagCode::InvoiceTotalMismatch => Action {
            action_type: ActionType::UserFix,
            owner: "user",
            code: code.as_str(),
            hint_text: "Invoice total does not match the calculated total",
        },
        FlagCode::TariffMetaMissing => Action {
            action_type: ActionType::BugReport,
            owner: "engineering",
            code: code.as_str(),
            hint_text: "Distribution tariff metadata is missing",
        },
        _ => Action {
            action_type: ActionType::UserFix,
            owner: "user",
            code: "UNKNOWN",
            hint_text: "Review required",
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionClass {
    VerifyOcr,
    VerifyInvoiceLogic,
    AcceptRoundingTolerance,
}

#[derive(Debug, Clone, Serialize)]
pub struct MismatchInfo {
    pub has_mismatch: bool,
    pub delta: f64,
    pub ratio: f64,
    pub severity: Severity,
    pub suspect_reason: Option<&'static str>,
}

/// Computes delta/ratio/severity/suspect-reason for a total-amount
/// mismatch. `min_confidence` is the lowest per-field extraction
/// confidence observed, used for the OCR-suspect branch.
pub fn classify_mismatch(
    calculated_total: f64,
    invoice_total: f64,
    min_confidence: f64,
    thresholds: &Thresholds,
) -> MismatchInfo {
    let delta = (calculated_total - invoice_total).abs();
    let ratio = if invoice_total.abs() > f64::EPSILON {
        delta / invoice_total.abs()
    } else {
        0.0
    };
    let t = &thresholds.mismatch;

    if delta < t.rounding_delta && ratio < t.rounding_ratio {
        return MismatchInfo {
            has_mismatch: false,
            delta,
            ratio,
            severity: Severity::S4,
            suspect_reason: None,
        };
    }

    let severity = if (ratio >= t.severe_ratio && delta >= t.absolute) || delta >= t.severe_absolute {
        Severity::S1
    } else if ratio >= t.ratio || delta >= t.absolute {
        Severity::S2
    } else {
        return MismatchInfo {
            has_mismatch: false,
            delta,
            ratio,
            severity: Severity::S4,
            suspect_reason: None,
        };
    };

    let suspect_reason = if min_confidence < thresholds.validation.low_confidence && ratio >= t.ocr_suspect_ratio {
        Some("OCR_LOCALE_SUSPECT")
    } else {
        None
    };

    MismatchInfo {
        has_mismatch: true,
        delta,
        ratio,
        severity,
        suspect_reason,
    }
}

pub fn generate_action_hint(mismatch: &MismatchInfo, thresholds: &Thresholds) -> (ActionClass, &'static str) {
    if mismatch.suspect_reason == Some("OCR_LOCALE_SUSPECT") {
        return (
            ActionClass::VerifyOcr,
            "Re-read the consumption and unit-price fields; OCR locale confusion is suspected",
        );
    }
    let t = &thresholds.mismatch;
    if mismatch.delta < t.rounding_delta && mismatch.ratio < t.rounding_ratio {
        return (
            ActionClass::AcceptRoundingTolerance,
            "Delta is within rounding tolerance; no action required",
        );
    }
    (
        ActionClass::VerifyInvoiceLogic,
        "Verify the tariff and consumption inputs used in the comparative calculation",
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct FlagDetail {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub deduction: u32,
    pub delta: Option<f64>,
    pub ratio: Option<f64>,
    pub suspect_reason: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    Ok,
    Check,
    Bad,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityScore {
    pub score: i32,
    pub grade: Grade,
    pub flags: Vec<String>,
    pub flag_details: Vec<FlagDetail>,
    pub primary_flag: Option<String>,
    pub secondary_flags: Vec<String>,
    pub category: Option<&'static str>,
    pub action: Option<Action>,
    pub action_hint: Option<String>,
}

fn grade_for(score: i32) -> Grade {
    if score >= 80 {
        Grade::Ok
    } else if score >= 50 {
        Grade::Check
    } else {
        Grade::Bad
    }
}

/// detect CALC_BUG: distribution lookup succeeded (source is neither
/// `not_found` nor empty) and the resulting total is zero/negative/
/// implausibly low against consumption.
fn check_calc_bug_conditions(calc: &CalculationInput) -> bool {
    let lookup_succeeded = match &calc.meta_distribution_source {
        Some(source) => source != "not_found" && !source.is_empty(),
        None => false,
    };
    if !lookup_succeeded {
        return false;
    }
    if calc.distribution_total == 0.0 && calc.consumption_kwh > 0.0 {
        return true;
    }
    if calc.distribution_total < 0.0 {
        return true;
    }
    const MIN_PER_KWH_FLOOR: f64 = 0.001;
    if calc.consumption_kwh > 0.0 && calc.distribution_total / calc.consumption_kwh < MIN_PER_KWH_FLOOR {
        return true;
    }
    false
}

pub struct Scorer<'a> {
    thresholds: &'a Thresholds,
}

impl<'a> Scorer<'a> {
    pub fn new(thresholds: &'a Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn score(&self, input: ScorerInput) -> QualityScore {
        let mut codes: Vec<(FlagCode, Severity, Option<f64>, Option<f64>, Option<&'static str>)> = Vec::new();
        let mut seen: HashSet<FlagCode> = HashSet::new();
        let mut push = |codes: &mut Vec<(FlagCode, Severity, Option<f64>, Option<f64>, Option<&'static str>)>,
                        seen: &mut HashSet<FlagCode>,
                        code: FlagCode,
                        severity: Severity,
                        delta: Option<f64>,
                        ratio: Option<f64>,
                        suspect: Option<&'static str>| {
            if seen.insert(code) {
                codes.push((code, severity, delta, ratio, suspect));
            }
        };

        if let Some(msg) = &input.calculation_error.message {
            if msg.to_lowercase().contains("market price") {
                push(&mut codes, &mut seen, FlagCode::MarketPriceMissing, Severity::S1, None, None, None);
            }
        }

        if input.validation.missing_fields.iter().any(|f| f == "consumption_kwh") {
            push(&mut codes, &mut seen, FlagCode::ConsumptionMissing, Severity::S1, None, None, None);
        } else if !input.validation.missing_fields.is_empty() {
            push(&mut codes, &mut seen, FlagCode::MissingFields, Severity::S2, None, None, None);
        }

        if input.validation.distribution_tariff_meta_missing {
            push(&mut codes, &mut seen, FlagCode::TariffMetaMissing, Severity::S1, None, None, None);
        } else if input.validation.distribution_tariff_lookup_failed {
            push(&mut codes, &mut seen, FlagCode::TariffLookupFailed, Severity::S1, None, None, None);
        }

        if input.validation.distribution_line_mismatch {
            push(&mut codes, &mut seen, FlagCode::DistributionMismatch, Severity::S2, None, None, None);
        }

        if matches!(input.calculation.meta_pricing_source.as_deref(), Some("not_found") | Some("default")) {
            push(&mut codes, &mut seen, FlagCode::MarketPriceMissing, Severity::S1, None, None, None);
        }

        if input.calculation.meta_distribution_source.as_deref() == Some("not_found") {
            push(&mut codes, &mut seen, FlagCode::DistributionMissing, Severity::S1, None, None, None);
        }

        if check_calc_bug_conditions(input.calculation) {
            push(&mut codes, &mut seen, FlagCode::CalcBug, Severity::S1, None, None, None);
        }

        if input.calculation.meta_total_mismatch {
            let min_confidence = input
                .extraction
                .field_confidences
                .iter()
                .map(|(_, c)| *c)
                .fold(1.0_f64, f64::min);
            let mismatch = classify_mismatch(
                input.calculation.calculated_total,
                input.calculation.invoice_total,
                min_confidence,
                self.thresholds,
            );
            if mismatch.has_mismatch {
                push(
                    &mut codes,
                    &mut seen,
                    FlagCode::InvoiceTotalMismatch,
                    mismatch.severity,
                    Some(mismatch.delta),
                    Some(mismatch.ratio),
                    mismatch.suspect_reason,
                );
            }
        }

        if input.debug_meta.json_repair_applied {
            push(&mut codes, &mut seen, FlagCode::JsonRepairApplied, Severity::S3, None, None, None);
        }

        let low_confidence_cutoff = self.thresholds.validation.low_confidence;
        if input
            .extraction
            .field_confidences
            .iter()
            .any(|(_, c)| *c < low_confidence_cutoff)
        {
            push(&mut codes, &mut seen, FlagCode::LowConfidence, Severity::S3, None, None, None);
        }

        codes.sort_by_key(|(code, severity, ..)| code.priority_rank(*severity));

        let flag_details: Vec<FlagDetail> = codes
            .iter()
            .map(|(code, severity, delta, ratio, suspect)| FlagDetail {
                code: code.as_str().to_string(),
                severity: *severity,
                message: format!("{} detected", code.as_str()),
                deduction: code.deduction(*severity),
                delta: *delta,
                ratio: *ratio,
                suspect_reason: *suspect,
            })
            .collect();

        let total_deduction: u32 = flag_details.iter().map(|f| f.deduction).sum();
        let score = (100_i32 - total_deduction as i32).max(0);

        let s1_s2_details: Vec<&FlagDetail> = flag_details
            .iter()
            .filter(|f| matches!(f.severity, Severity::S1 | Severity::S2))
            .collect();

        let (primary_flag, secondary_flags, category, action, action_hint) = if let Some(primary) = s1_s2_details.first()
        {
            let primary_code = codes
                .iter()
                .find(|(c, ..)| c.as_str() == primary.code)
                .map(|(c, ..)| *c)
                .unwrap_or(FlagCode::Unknown);
            let secondary: Vec<String> = s1_s2_details[1..].iter().map(|f| f.code.clone()).collect();
            let category = primary_code.category();
            let action = action_for(primary_code);
            let action_hint = if primary_code == FlagCode::InvoiceTotalMismatch {
                primary.suspect_reason.map(|reason| reason.to_string()).or_else(|| {
                    Some(
                        generate_action_hint(
                            &MismatchInfo {
                                has_mismatch: true,
                                delta: primary.delta.unwrap_or(0.0),
                                ratio: primary.ratio.unwrap_or(0.0),
                                severity: primary.severity,
                                suspect_reason: primary.suspect_reason,
                            },
                            self.thresholds,
                        )
                        .1
                        .to_string(),
                    )
                })
            } else {
                None
            };
            (
                Some(primary.code.clone()),
                secondary,
                Some(category),
                Some(action),
                action_hint,
            )
        } else {
            (None, Vec::new(), None, None, None)
        };

        QualityScore {
            score,
            grade: grade_for(score),
            flags: flag_details.iter().map(|f| f.code.clone()).collect(),
            flag_details,
            primary_flag,
            secondary_flags,
            category,
            action,
            action_hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn calc_bug_outranks_market_price_missing() {
        let t = thresholds();
        let scorer = Scorer::new(&t);
        let extraction = ExtractionInput::default();
        let validation = ValidationInput::default();
        let calculation = CalculationInput {
            meta_pricing_source: Some("not_found".to_string()),
            meta_distribution_source: Some("lookup".to_string()),
            distribution_total: 0.0,
            consumption_kwh: 100.0,
            ..Default::default()
        };
        let calc_error = CalculationErrorInput::default();
        let debug_meta = DebugMetaInput::default();
        let result = scorer.score(ScorerInput {
            extraction: &extraction,
            validation: &validation,
            calculation: &calculation,
            calculation_error: &calc_error,
            debug_meta: &debug_meta,
        });
        assert_eq!(result.primary_flag.as_deref(), Some("CALC_BUG"));
        assert!(result.secondary_flags.contains(&"MARKET_PRICE_MISSING".to_string()));
    }

    #[test]
    fn no_flags_yields_perfect_ok_score() {
        let t = thresholds();
        let scorer = Scorer::new(&t);
        let extraction = ExtractionInput {
            field_confidences: vec![("consumption_kwh".to_string(), 0.99)],
        };
        let validation = ValidationInput::default();
        let calculation = CalculationInput::default();
        let calc_error = CalculationErrorInput::default();
        let debug_meta = DebugMetaInput::default();
        let result = scorer.score(ScorerInput {
            extraction: &extraction,
            validation: &validation,
            calculation: &calculation,
            calculation_error: &calc_error,
            debug_meta: &debug_meta,
        });
        assert_eq!(result.score, 100);
        assert_eq!(result.grade, Grade::Ok);
        assert!(result.primary_flag.is_none());
    }

    #[test]
    fn severe_mismatch_is_s1_and_rounding_tolerance_suppresses_flag() {
        let t = thresholds();
        assert!(classify_mismatch(600.0, 0.0, 0.99, &t).has_mismatch);
        let tiny = classify_mismatch(100.0, 100.005, 0.99, &t);
        assert!(!tiny.has_mismatch);
    }

    #[test]
    fn ocr_suspect_drives_verify_ocr_action_class() {
        let t = thresholds();
        let mismatch = classify_mismatch(1000.0, 400.0, 0.2, &t);
        assert_eq!(mismatch.suspect_reason, Some("OCR_LOCALE_SUSPECT"));
        let (class, _) = generate_action_hint(&mismatch, &t);
        assert_eq!(class, ActionClass::VerifyOcr);
    }

    #[test]
    fn happy_path_invoice_raises_no_flag() {
        // consumption=10,000 kWh, unit_price=3.5: energy 35,000 + dist 5,000
        // + btv 350 + vat(20% of 40,350) 8,070 = 48,420, matching the
        // invoice total exactly.
        let t = thresholds();
        let scorer = Scorer::new(&t);
        let extraction = ExtractionInput { field_confidences: vec![("consumption_kwh".to_string(), 0.95)] };
        let validation = ValidationInput::default();
        let calculation = CalculationInput {
            consumption_kwh: 10_000.0,
            calculated_total: 48_420.0,
            invoice_total: 48_420.0,
            meta_total_mismatch: false,
            ..Default::default()
        };
        let result = scorer.score(ScorerInput {
            extraction: &extraction,
            validation: &validation,
            calculation: &calculation,
            calculation_error: &CalculationErrorInput::default(),
            debug_meta: &DebugMetaInput::default(),
        });
        assert_eq!(result.grade, Grade::Ok);
        assert!(result.primary_flag.is_none());
    }

    #[test]
    fn s2_mismatch_routes_to_verify_invoice_logic() {
        let t = thresholds();
        let scorer = Scorer::new(&t);
        let extraction = ExtractionInput { field_confidences: vec![("consumption_kwh".to_string(), 0.90)] };
        let validation = ValidationInput::default();
        let calculation = CalculationInput {
            consumption_kwh: 10_000.0,
            calculated_total: 48_420.0,
            invoice_total: 48_800.0,
            meta_total_mismatch: true,
            ..Default::default()
        };
        let result = scorer.score(ScorerInput {
            extraction: &extraction,
            validation: &validation,
            calculation: &calculation,
            calculation_error: &CalculationErrorInput::default(),
            debug_meta: &DebugMetaInput::default(),
        });
        assert_eq!(result.primary_flag.as_deref(), Some("INVOICE_TOTAL_MISMATCH"));
        let detail = &result.flag_details[0];
        assert_eq!(detail.severity, Severity::S2);
        let mismatch = classify_mismatch(48_420.0, 48_800.0, 0.90, &t);
        let (class, _) = generate_action_hint(&mismatch, &t);
        assert_eq!(class, ActionClass::VerifyInvoiceLogic);
    }

    #[test]
    fn s1_ocr_suspect_routes_to_verify_ocr() {
        let t = thresholds();
        let scorer = Scorer::new(&t);
        let extraction = ExtractionInput { field_confidences: vec![("consumption_kwh".to_string(), 0.55)] };
        let validation = ValidationInput::default();
        let calculation = CalculationInput {
            consumption_kwh: 10_000.0,
            calculated_total: 48_420.0,
            invoice_total: 100_000.0,
            meta_total_mismatch: true,
            ..Default::default()
        };
        let result = scorer.score(ScorerInput {
            extraction: &extraction,
            validation: &validation,
            calculation: &calculation,
            calculation_error: &CalculationErrorInput::default(),
            debug_meta: &DebugMetaInput::default(),
        });
        assert_eq!(result.primary_flag.as_deref(), Some("INVOICE_TOTAL_MISMATCH"));
        let detail = &result.flag_details[0];
        assert_eq!(detail.severity, Severity::S1);
        assert_eq!(detail.suspect_reason, Some("OCR_LOCALE_SUSPECT"));
        let mismatch = classify_mismatch(48_420.0, 100_000.0, 0.55, &t);
        let (class, _) = generate_action_hint(&mismatch, &t);
        assert_eq!(class, ActionClass::VerifyOcr);
    }

    #[test]
    fn normalize_is_stable_across_permutations() {
        let t = thresholds();
        let scorer = Scorer::new(&t);
        let extraction = ExtractionInput::default();
        let validation = ValidationInput {
            missing_fields: vec!["amount".to_string()],
            distribution_tariff_meta_missing: true,
            ..Default::default()
        };
        let calculation = CalculationInput::default();
        let calc_error = CalculationErrorInput::default();
        let debug_meta = DebugMetaInput::default();
        let result = scorer.score(ScorerInput {
            extraction: &extraction,
            validation: &validation,
            calculation: &calculation,
            calculation_error: &calc_error,
            debug_meta: &debug_meta,
        });
        assert_eq!(result.primary_flag.as_deref(), Some("TARIFF_META_MISSING"));
    }
}
