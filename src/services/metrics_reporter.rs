//! C14 — KPI queries and health-dashboard calculations over the incidents
//! store: drift detection, mismatch histogram, top offenders, feedback
//! calibration, retry funnel, MTTR, and a Prometheus-style text exposition.
//! Pure aggregation over what C9-C13 already wrote; no new state of its own.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::Thresholds;
use crate::models::_entities::incidents;
use crate::models::incident::ResolutionReason;

const RATIO_EPSILON: f64 = 0.01;

const HISTOGRAM_BUCKETS: [(f64, f64, &str); 5] = [
    (0.00, 0.02, "0-2%"),
    (0.02, 0.05, "2-5%"),
    (0.05, 0.10, "5-10%"),
    (0.10, 0.20, "10-20%"),
    (0.20, f64::INFINITY, "20%+"),
];

pub fn ratio_bucket(ratio: f64) -> &'static str {
    for (min, max, label) in HISTOGRAM_BUCKETS {
        if ratio >= min && ratio < max {
            return label;
        }
    }
    "20%+"
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    pub label: &'static str,
    pub count: u64,
}

pub fn mismatch_histogram(ratios: &[f64]) -> Vec<HistogramBucket> {
    let mut counts: HashMap<&'static str, u64> = HashMap::new();
    for &ratio in ratios {
        *counts.entry(ratio_bucket(ratio)).or_insert(0) += 1;
    }
    HISTOGRAM_BUCKETS
        .iter()
        .map(|(_, _, label)| HistogramBucket { label, count: *counts.get(label).copied().get_or_insert(0).to_owned() })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PeriodStats {
    pub total_invoices: u64,
    pub mismatch_count: u64,
    pub s1_count: u64,
    pub s2_count: u64,
    pub ocr_suspect_count: u64,
}

impl PeriodStats {
    pub fn mismatch_rate(&self) -> f64 {
        if self.total_invoices == 0 { 0.0 } else { self.mismatch_count as f64 / self.total_invoices as f64 }
    }

    pub fn s1_rate(&self) -> f64 {
        let total = self.s1_count + self.s2_count;
        if total == 0 { 0.0 } else { self.s1_count as f64 / total as f64 }
    }

    pub fn ocr_suspect_rate(&self) -> f64 {
        if self.mismatch_count == 0 { 0.0 } else { self.ocr_suspect_count as f64 / self.mismatch_count as f64 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    S1RateDrift,
    OcrSuspectDrift,
    MismatchRateDrift,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftAlert {
    pub alert_type: AlertType,
    pub old_rate: f64,
    pub new_rate: f64,
    pub old_count: u64,
    pub new_count: u64,
    pub triggered: bool,
}

/// An alert fires only when all three hold: the new sample is large enough,
/// the absolute move is large enough, and the relative move clears the
/// configured multiplier (or the rate moved from zero at all).
fn triple_guard(
    alert_type: AlertType,
    old_rate: f64,
    new_rate: f64,
    old_count: u64,
    new_count: u64,
    new_total: u64,
    thresholds: &crate::config::DriftThresholds,
) -> DriftAlert {
    let sample_large_enough = new_total >= thresholds.min_sample;
    let delta = new_count.abs_diff(old_count);
    let delta_large_enough = delta >= thresholds.min_absolute_delta;
    let rate_moved = if old_rate > 0.0 {
        new_rate >= old_rate * thresholds.rate_multiplier
    } else {
        new_count >= thresholds.min_absolute_delta
    };

    DriftAlert {
        alert_type,
        old_rate,
        new_rate,
        old_count,
        new_count,
        triggered: sample_large_enough && delta_large_enough && rate_moved,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopOffender {
    pub provider: String,
    pub total_count: u64,
    pub mismatch_count: u64,
}

impl TopOffender {
    pub fn mismatch_rate(&self) -> f64 {
        if self.total_count == 0 { 0.0 } else { self.mismatch_count as f64 / self.total_count as f64 }
    }
}

/// Ranked by rate, tie-broken by provider name for determinism; callers
/// that want the count-ranked view sort the same slice by `total_count`.
pub fn rank_top_offenders_by_rate(mut offenders: Vec<TopOffender>, min_invoices: u64) -> Vec<TopOffender> {
    offenders.retain(|o| o.total_count >= min_invoices);
    offenders.sort_by(|a, b| {
        b.mismatch_rate()
            .partial_cmp(&a.mismatch_rate())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.provider.cmp(&b.provider))
    });
    offenders
}

pub fn rank_top_offenders_by_count(mut offenders: Vec<TopOffender>) -> Vec<TopOffender> {
    offenders.sort_by(|a, b| b.total_count.cmp(&a.total_count).then_with(|| a.provider.cmp(&b.provider)));
    offenders
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ActionClassDistribution {
    pub verify_ocr: u64,
    pub verify_invoice_logic: u64,
    pub accept_rounding: u64,
}

impl ActionClassDistribution {
    pub fn total(&self) -> u64 {
        self.verify_ocr + self.verify_invoice_logic + self.accept_rounding
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetryFunnel {
    pub attempts_total: u64,
    pub attempts_success: u64,
    pub resolved_after_retry: u64,
    pub still_pending: u64,
    pub exhausted: u64,
}

impl RetryFunnel {
    /// The false-success rate: a retry reported success but the incident
    /// never reached RESOLVED.
    pub fn false_success_rate(&self) -> f64 {
        if self.attempts_success == 0 { 0.0 } else { self.still_pending as f64 / self.attempts_success as f64 }
    }
}

/// What an operator actually did when closing an incident out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackAction {
    VerifiedOcr,
    VerifiedLogic,
    AcceptedRounding,
    Escalated,
    NoActionRequired,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct IncidentFeedback {
    pub action_taken: FeedbackAction,
    pub was_hint_correct: bool,
    pub actual_root_cause: Option<String>,
    pub resolution_time_seconds: i64,
    pub feedback_at: DateTime<Utc>,
    pub feedback_by: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackValidationError {
    #[error("incident is not resolved: {0}")]
    NotResolved(String),
    #[error("invalid feedback data: {0}")]
    InvalidData(String),
}

/// Only a RESOLVED incident can carry feedback, and `actual_root_cause` is
/// capped by `Thresholds::feedback.root_cause_max_length`.
pub fn validate_feedback(feedback: &IncidentFeedback, incident_status: &str, thresholds: &Thresholds) -> Result<(), FeedbackValidationError> {
    if incident_status != "RESOLVED" {
        return Err(FeedbackValidationError::NotResolved(format!(
            "feedback can only be submitted for RESOLVED incidents, current status: {incident_status}"
        )));
    }
    if feedback.resolution_time_seconds < 0 {
        return Err(FeedbackValidationError::InvalidData("resolution_time_seconds must be >= 0".to_string()));
    }
    if let Some(root_cause) = &feedback.actual_root_cause {
        if root_cause.chars().count() > thresholds.feedback.root_cause_max_length {
            return Err(FeedbackValidationError::InvalidData(format!(
                "actual_root_cause exceeds {} characters",
                thresholds.feedback.root_cause_max_length
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackStats {
    pub hint_accuracy_rate: f64,
    pub total_feedback_count: u64,
    pub action_class_accuracy: HashMap<String, f64>,
    pub avg_resolution_time_by_class: HashMap<String, f64>,
    pub feedback_coverage: f64,
    pub resolved_with_feedback: u64,
    pub resolved_total: u64,
}

pub fn compute_feedback_stats(feedbacks: &[(IncidentFeedback, &'static str)], resolved_total: u64) -> FeedbackStats {
    let total = feedbacks.len() as u64;
    let accurate = feedbacks.iter().filter(|(f, _)| f.was_hint_correct).count() as u64;

    let mut by_class_total: HashMap<String, u64> = HashMap::new();
    let mut by_class_accurate: HashMap<String, u64> = HashMap::new();
    let mut by_class_time: HashMap<String, Vec<i64>> = HashMap::new();

    for (feedback, action_class) in feedbacks {
        let key = action_class.to_string();
        *by_class_total.entry(key.clone()).or_insert(0) += 1;
        if feedback.was_hint_correct {
            *by_class_accurate.entry(key.clone()).or_insert(0) += 1;
        }
        by_class_time.entry(key).or_default().push(feedback.resolution_time_seconds);
    }

    let action_class_accuracy = by_class_total
        .iter()
        .map(|(k, &total)| {
            let accurate = by_class_accurate.get(k).copied().unwrap_or(0);
            (k.clone(), if total == 0 { 0.0 } else { accurate as f64 / total as f64 })
        })
        .collect();

    let avg_resolution_time_by_class = by_class_time
        .iter()
        .map(|(k, times)| (k.clone(), times.iter().sum::<i64>() as f64 / times.len() as f64))
        .collect();

    FeedbackStats {
        hint_accuracy_rate: if total == 0 { 0.0 } else { accurate as f64 / total as f64 },
        total_feedback_count: total,
        action_class_accuracy,
        avg_resolution_time_by_class,
        feedback_coverage: if resolved_total == 0 { 0.0 } else { total as f64 / resolved_total as f64 },
        resolved_with_feedback: total,
        resolved_total,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * pct).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

pub fn latency_percentiles(samples_ms: &[f64]) -> LatencyPercentiles {
    let mut sorted = samples_ms.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    LatencyPercentiles {
        p50: percentile(&sorted, 0.50),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub stats: PeriodStats,
    pub retry_funnel: RetryFunnel,
    pub mttr_seconds: f64,
    pub latency: LatencyPercentiles,
    pub queue_depth: u64,
    pub stuck: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("metrics reporter db error: {0}")]
pub struct MetricsReporterError(pub String);

impl From<sea_orm::DbErr> for MetricsReporterError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self(e.to_string())
    }
}

pub struct MetricsReporter<'a> {
    db: &'a DatabaseConnection,
    thresholds: &'a Thresholds,
}

impl<'a> MetricsReporter<'a> {
    pub fn new(db: &'a DatabaseConnection, thresholds: &'a Thresholds) -> Self {
        Self { db, thresholds }
    }

    /// Mean of (resolved_at - first_seen_at) across incidents whose
    /// resolution_reason lands in the RESOLVED_SET — RECLASSIFIED never
    /// counts, even though the incident briefly passed through RESOLVED
    /// adjacent state.
    pub async fn mttr_seconds(&self, tenant_id: &str, since: DateTime<Utc>) -> Result<f64, MetricsReporterError> {
        let resolved = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::Status.eq("RESOLVED"))
            .filter(incidents::Column::ResolvedAt.gte(since))
            .all(self.db)
            .await?;

        let durations: Vec<f64> = resolved
            .iter()
            .filter(|m| {
                m.resolution_reason
                    .as_deref()
                    .and_then(|r| r.parse::<ResolutionReasonParsed>().ok())
                    .map(|r| r.0.is_resolved())
                    .unwrap_or(false)
            })
            .filter_map(|m| m.resolved_at.map(|resolved_at| (resolved_at - m.first_seen_at).num_seconds() as f64))
            .collect();

        if durations.is_empty() {
            return Ok(0.0);
        }
        Ok(durations.iter().sum::<f64>() / durations.len() as f64)
    }

    pub async fn retry_funnel(&self, tenant_id: &str, since: DateTime<Utc>) -> Result<RetryFunnel, MetricsReporterError> {
        let attempted = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::RetryLastAttemptAt.gte(since))
            .all(self.db)
            .await?;

        let attempts_total = attempted.len() as u64;
        let attempts_success = attempted.iter().filter(|m| m.retry_success).count() as u64;
        let resolved_after_retry = attempted.iter().filter(|m| m.retry_success && m.status == "RESOLVED").count() as u64;
        let still_pending = attempted.iter().filter(|m| m.retry_success && m.status != "RESOLVED").count() as u64;
        let exhausted = attempted.iter().filter(|m| m.retry_exhausted_at.is_some()).count() as u64;

        Ok(RetryFunnel {
            attempts_total,
            attempts_success,
            resolved_after_retry,
            still_pending,
            exhausted,
        })
    }

    pub async fn queue_depth(&self, tenant_id: &str) -> Result<u64, MetricsReporterError> {
        let pending = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::Status.is_in(["PENDING_RETRY", "PENDING_RECOMPUTE"]))
            .all(self.db)
            .await?;
        Ok(pending.len() as u64)
    }

    pub async fn stuck_pending_recompute_count(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<u64, MetricsReporterError> {
        let threshold = now - chrono::Duration::minutes(self.thresholds.recovery.stuck_minutes);
        let stuck = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::Status.eq("PENDING_RECOMPUTE"))
            .filter(incidents::Column::UpdatedAt.lt(threshold))
            .all(self.db)
            .await?;
        Ok(stuck.len() as u64)
    }

    /// Aggregates one window of incidents into [`PeriodStats`].
    ///
    /// `total_invoices` is a sum of `occurrence_count` over the window, not
    /// the full ingested invoice population: this store only ever persists
    /// rows for invoices that tripped at least one flag, so it has no
    /// visibility into clean invoices. `mismatch_rate()` here is therefore
    /// a rate over *flagged* volume, not over everything the pipeline
    /// processed upstream.
    pub async fn period_stats(&self, tenant_id: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<PeriodStats, MetricsReporterError> {
        let rows = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::FirstSeenAt.gte(since))
            .filter(incidents::Column::FirstSeenAt.lt(until))
            .all(self.db)
            .await?;

        let mut stats = PeriodStats::default();
        for row in &rows {
            stats.total_invoices += row.occurrence_count.max(1) as u64;
            stats.mismatch_count += 1;
            match row.severity.as_str() {
                "S1" => stats.s1_count += 1,
                "S2" => stats.s2_count += 1,
                _ => {}
            }
            if incident_is_ocr_suspect(row) {
                stats.ocr_suspect_count += 1;
            }
        }
        Ok(stats)
    }

    /// Per-incident mismatch ratios for the histogram, read back out of the
    /// flag-detail blob each incident stored at creation time.
    pub async fn mismatch_ratios(&self, tenant_id: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<f64>, MetricsReporterError> {
        let rows = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::FirstSeenAt.gte(since))
            .filter(incidents::Column::FirstSeenAt.lt(until))
            .all(self.db)
            .await?;
        Ok(rows.iter().filter_map(incident_mismatch_ratio).collect())
    }

    /// Groups incidents by category in lieu of a per-provider column the
    /// store does not carry (no supplier/extraction-provider identity is
    /// persisted on the incident row). `total_count` is the category's
    /// flagged-occurrence volume and `mismatch_count` its distinct incident
    /// count, so the "rate" is occurrences-per-distinct-incident rather
    /// than a true mismatch-over-total-invoices ratio.
    pub async fn top_offenders_by_category(&self, tenant_id: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<TopOffender>, MetricsReporterError> {
        let rows = incidents::Entity::find()
            .filter(incidents::Column::TenantId.eq(tenant_id))
            .filter(incidents::Column::FirstSeenAt.gte(since))
            .filter(incidents::Column::FirstSeenAt.lt(until))
            .all(self.db)
            .await?;

        let mut by_category: HashMap<String, TopOffender> = HashMap::new();
        for row in &rows {
            let entry = by_category.entry(row.category.clone()).or_insert_with(|| TopOffender {
                provider: row.category.clone(),
                total_count: 0,
                mismatch_count: 0,
            });
            entry.total_count += row.occurrence_count.max(1) as u64;
            entry.mismatch_count += 1;
        }
        Ok(by_category.into_values().collect())
    }

    /// Compares two adjacent windows of equal length and runs the
    /// triple-guard rule over S1 rate, OCR-suspect rate, and mismatch rate.
    pub async fn drift_report(&self, tenant_id: &str, now: DateTime<Utc>, window: chrono::Duration) -> Result<Vec<DriftAlert>, MetricsReporterError> {
        let new_since = now - window;
        let old_since = now - window * 2;

        let old_stats = self.period_stats(tenant_id, old_since, new_since).await?;
        let new_stats = self.period_stats(tenant_id, new_since, now).await?;

        let s1_alert = triple_guard(
            AlertType::S1RateDrift,
            old_stats.s1_rate(),
            new_stats.s1_rate(),
            old_stats.s1_count,
            new_stats.s1_count,
            new_stats.s1_count + new_stats.s2_count,
            &self.thresholds.drift,
        );
        let ocr_alert = triple_guard(
            AlertType::OcrSuspectDrift,
            old_stats.ocr_suspect_rate(),
            new_stats.ocr_suspect_rate(),
            old_stats.ocr_suspect_count,
            new_stats.ocr_suspect_count,
            new_stats.mismatch_count,
            &self.thresholds.drift,
        );
        let mismatch_alert = triple_guard(
            AlertType::MismatchRateDrift,
            old_stats.mismatch_rate(),
            new_stats.mismatch_rate(),
            old_stats.mismatch_count,
            new_stats.mismatch_count,
            new_stats.total_invoices,
            &self.thresholds.drift,
        );

        Ok(vec![s1_alert, ocr_alert, mismatch_alert])
    }

    /// Compact dashboard snapshot: counts, rates, retry funnel, MTTR,
    /// queue depth, and the stuck-recompute flag for one calendar range.
    pub async fn run_summary(
        &self,
        tenant_id: &str,
        period_start: NaiveDate,
        period_end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RunSummary, MetricsReporterError> {
        let since = DateTime::<Utc>::from_naive_utc_and_offset(
            period_start.and_hms_opt(0, 0, 0).unwrap_or_default(),
            Utc,
        );
        let until = DateTime::<Utc>::from_naive_utc_and_offset(
            period_end.and_hms_opt(23, 59, 59).unwrap_or_default(),
            Utc,
        );

        let stats = self.period_stats(tenant_id, since, until).await?;
        let retry_funnel = self.retry_funnel(tenant_id, since).await?;
        let mttr_seconds = self.mttr_seconds(tenant_id, since).await?;
        let queue_depth = self.queue_depth(tenant_id).await?;
        let stuck_count = self.stuck_pending_recompute_count(tenant_id, now).await?;

        Ok(RunSummary {
            generated_at: now,
            period_start,
            period_end,
            stats,
            retry_funnel,
            mttr_seconds,
            latency: LatencyPercentiles::default(),
            queue_depth,
            stuck: stuck_count > 0,
        })
    }
}

/// `true` when any flag detail on the incident carries a `suspect_reason`
/// (the mismatch classifier's OCR-suspect signal, §4.9).
fn incident_is_ocr_suspect(row: &incidents::Model) -> bool {
    row.routed_payload
        .as_ref()
        .and_then(|p| p.get("flag_details"))
        .and_then(|v| v.as_array())
        .map(|details| details.iter().any(|d| d.get("suspect_reason").map(|s| !s.is_null()).unwrap_or(false)))
        .unwrap_or(false)
}

/// Reads the stored mismatch ratio off the primary flag's detail entry, if
/// any — incidents raised for a non-mismatch reason (e.g. a missing field)
/// carry no ratio and are excluded from the histogram.
fn incident_mismatch_ratio(row: &incidents::Model) -> Option<f64> {
    let details = row.routed_payload.as_ref()?.get("flag_details")?.as_array()?;
    details
        .iter()
        .find(|d| d.get("code").and_then(|c| c.as_str()) == Some(row.primary_flag.as_str()))
        .and_then(|d| d.get("ratio"))
        .and_then(|r| r.as_f64())
}

struct ResolutionReasonParsed(ResolutionReason);

impl std::str::FromStr for ResolutionReasonParsed {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recompute_resolved" => Ok(Self(ResolutionReason::RecomputeResolved)),
            "manual_resolved" => Ok(Self(ResolutionReason::ManualResolved)),
            "auto_resolved" => Ok(Self(ResolutionReason::AutoResolved)),
            "recompute_limit_exceeded" => Ok(Self(ResolutionReason::RecomputeLimitExceeded)),
            "retry_exhausted" => Ok(Self(ResolutionReason::RetryExhausted)),
            "reclassified" => Ok(Self(ResolutionReason::Reclassified)),
            _ => Err(()),
        }
    }
}

/// Renders the counters a scrape endpoint would expose, Prometheus
/// exposition-format lines. Structured JSON (`RunSummary`) covers the same
/// ground for the admin dashboard; this is the text view for `/metrics`.
pub fn render_prometheus_text(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("# HELP qa_engine_invoices_total Invoices processed in the current period\n");
    out.push_str("# TYPE qa_engine_invoices_total counter\n");
    out.push_str(&format!("qa_engine_invoices_total {}\n", summary.stats.total_invoices));

    out.push_str("# HELP qa_engine_mismatch_rate Invoice total mismatch rate\n");
    out.push_str("# TYPE qa_engine_mismatch_rate gauge\n");
    out.push_str(&format!("qa_engine_mismatch_rate {:.4}\n", summary.stats.mismatch_rate()));

    out.push_str("# HELP qa_engine_s1_rate Share of critical flags that are S1\n");
    out.push_str("# TYPE qa_engine_s1_rate gauge\n");
    out.push_str(&format!("qa_engine_s1_rate {:.4}\n", summary.stats.s1_rate()));

    out.push_str("# HELP qa_engine_retry_attempts_total Retry attempts in the current period\n");
    out.push_str("# TYPE qa_engine_retry_attempts_total counter\n");
    out.push_str(&format!("qa_engine_retry_attempts_total {}\n", summary.retry_funnel.attempts_total));

    out.push_str("# HELP qa_engine_retry_false_success_rate Retries reported success without reaching RESOLVED\n");
    out.push_str("# TYPE qa_engine_retry_false_success_rate gauge\n");
    out.push_str(&format!("qa_engine_retry_false_success_rate {:.4}\n", summary.retry_funnel.false_success_rate()));

    out.push_str("# HELP qa_engine_mttr_seconds Mean time to resolve, seconds\n");
    out.push_str("# TYPE qa_engine_mttr_seconds gauge\n");
    out.push_str(&format!("qa_engine_mttr_seconds {:.1}\n", summary.mttr_seconds));

    out.push_str("# HELP qa_engine_queue_depth Incidents currently pending retry or recompute\n");
    out.push_str("# TYPE qa_engine_queue_depth gauge\n");
    out.push_str(&format!("qa_engine_queue_depth {}\n", summary.queue_depth));

    out.push_str("# HELP qa_engine_recompute_stuck Stuck PENDING_RECOMPUTE incidents detected\n");
    out.push_str("# TYPE qa_engine_recompute_stuck gauge\n");
    out.push_str(&format!("qa_engine_recompute_stuck {}\n", if summary.stuck { 1 } else { 0 }));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_bucket_boundaries_are_half_open() {
        assert_eq!(ratio_bucket(0.0), "0-2%");
        assert_eq!(ratio_bucket(0.0199), "0-2%");
        assert_eq!(ratio_bucket(0.02), "2-5%");
        assert_eq!(ratio_bucket(0.25), "20%+");
    }

    #[test]
    fn drift_requires_all_three_guards() {
        let t = crate::config::DriftThresholds::default();
        let alert = triple_guard(AlertType::S1RateDrift, 0.10, 0.30, 10, 30, 100, &t);
        assert!(alert.triggered);

        let small_sample = triple_guard(AlertType::S1RateDrift, 0.10, 0.30, 1, 3, 5, &t);
        assert!(!small_sample.triggered);

        let small_delta = triple_guard(AlertType::S1RateDrift, 0.10, 0.11, 10, 11, 100, &t);
        assert!(!small_delta.triggered);
    }

    #[test]
    fn drift_from_zero_baseline_needs_absolute_delta() {
        let t = crate::config::DriftThresholds::default();
        let alert = triple_guard(AlertType::MismatchRateDrift, 0.0, 0.05, 0, 6, 100, &t);
        assert!(alert.triggered);

        let too_few = triple_guard(AlertType::MismatchRateDrift, 0.0, 0.02, 0, 2, 100, &t);
        assert!(!too_few.triggered);
    }

    #[test]
    fn e7_s1_rate_drift_from_5_to_20_over_100_triggers() {
        // Previous period: S1=5 over S1+S2=100. Current period: S1=20 over
        // 100. n=100 >= 20, |20-5|=15 >= 5, 20% >= 2*5% -> triggers.
        let t = crate::config::DriftThresholds::default();
        let old_rate = 5.0 / 100.0;
        let new_rate = 20.0 / 100.0;
        let alert = triple_guard(AlertType::S1RateDrift, old_rate, new_rate, 5, 20, 100, &t);
        assert!(alert.triggered);
    }

    #[test]
    fn top_offenders_by_rate_respects_minimum_volume() {
        let offenders = vec![
            TopOffender { provider: "tiny".to_string(), total_count: 3, mismatch_count: 3 },
            TopOffender { provider: "big".to_string(), total_count: 100, mismatch_count: 40 },
        ];
        let ranked = rank_top_offenders_by_rate(offenders, 20);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].provider, "big");
    }

    #[test]
    fn feedback_validation_rejects_non_resolved_incidents() {
        let thresholds = Thresholds::default();
        let feedback = IncidentFeedback {
            action_taken: FeedbackAction::VerifiedOcr,
            was_hint_correct: true,
            actual_root_cause: None,
            resolution_time_seconds: 120,
            feedback_at: Utc::now(),
            feedback_by: "ops".to_string(),
        };
        assert!(validate_feedback(&feedback, "OPEN", &thresholds).is_err());
        assert!(validate_feedback(&feedback, "RESOLVED", &thresholds).is_ok());
    }

    #[test]
    fn feedback_root_cause_length_is_enforced() {
        let thresholds = Thresholds::default();
        let feedback = IncidentFeedback {
            action_taken: FeedbackAction::Escalated,
            was_hint_correct: false,
            actual_root_cause: Some("x".repeat(201)),
            resolution_time_seconds: 10,
            feedback_at: Utc::now(),
            feedback_by: "ops".to_string(),
        };
        assert!(validate_feedback(&feedback, "RESOLVED", &thresholds).is_err());
    }

    #[test]
    fn latency_percentiles_on_empty_samples_are_zero() {
        let p = latency_percentiles(&[]);
        assert_eq!(p.p50, 0.0);
        assert_eq!(p.p99, 0.0);
    }
}
