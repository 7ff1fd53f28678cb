use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::TransformConfig;
use crate::constants::{TRUSTED_URL_HOST, URL_NOT_FOUND};
use crate::observability::metrics;
use crate::types::{
    CleanedRecord, EnrichedRecord, ProcessingStatus, RiskLevel, SizeCategory, VelocityCategory,
};

/// Derives identifiers, hazard resolution, the batch-normalized hazard
/// score and the categorical buckets for a whole cleaned batch.
///
/// The hazard score depends on every record in the batch, so this works
/// in two passes over a fully buffered batch: first the min/max of
/// `velocity * diameter_max`, then the per-record derivation.
pub struct Transformer {
    config: TransformConfig,
}

/// Min/max of the hazard product across one batch
#[derive(Debug, Clone, Copy, PartialEq)]
struct BatchStats {
    min_product: f64,
    max_product: f64,
}

impl BatchStats {
    fn collect(records: &[CleanedRecord]) -> Option<Self> {
        records
            .iter()
            .filter_map(hazard_product)
            .fold(None, |acc: Option<BatchStats>, p| {
                Some(match acc {
                    None => BatchStats { min_product: p, max_product: p },
                    Some(s) => BatchStats {
                        min_product: s.min_product.min(p),
                        max_product: s.max_product.max(p),
                    },
                })
            })
    }

    /// Min-max scale into [0, 1]; a zero-width range maps to 0.0.
    fn normalize(&self, product: f64) -> f64 {
        let range = self.max_product - self.min_product;
        if range <= 0.0 {
            0.0
        } else {
            ((product - self.min_product) / range).clamp(0.0, 1.0)
        }
    }
}

fn hazard_product(record: &CleanedRecord) -> Option<f64> {
    Some(record.velocity_kmph? * record.diameter_max_m?)
}

impl Transformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// Enrich one batch. `now` drives the creation timestamp, batch id and
    /// record id suffixes so a run is reproducible for a fixed clock.
    pub fn transform(&self, records: Vec<CleanedRecord>, now: DateTime<Utc>) -> Vec<EnrichedRecord> {
        let input_len = records.len();
        let batch_id = batch_id_for(now);
        let stats = BatchStats::collect(&records);

        let mut seen_ids = HashSet::new();
        let mut duplicates = 0usize;
        let mut enriched = Vec::with_capacity(input_len);

        for (seq, record) in records.into_iter().enumerate() {
            let data_id = data_id_for(&record.nasa_id, now, seq);
            if !seen_ids.insert(data_id.clone()) {
                duplicates += 1;
                continue;
            }
            enriched.push(self.enrich(record, stats, data_id, &batch_id, now));
        }

        if duplicates > 0 {
            warn!(duplicates, "dropped records with colliding data_id");
            metrics::transform::duplicate_ids_dropped(duplicates);
        }
        metrics::transform::records_enriched(enriched.len());
        info!(input = input_len, output = enriched.len(), batch_id = %batch_id, "transformed approach records");
        enriched
    }

    fn enrich(
        &self,
        record: CleanedRecord,
        stats: Option<BatchStats>,
        data_id: String,
        batch_id: &str,
        now: DateTime<Utc>,
    ) -> EnrichedRecord {
        let is_potentially_hazardous = self.resolve_hazard(&record);
        let hazard_score = match (hazard_product(&record), stats) {
            (Some(product), Some(stats)) => Some(self.round_score(stats.normalize(product))),
            _ => None,
        };
        let nasa_site_url = verify_url(record.nasa_site_url.as_deref());

        let is_deleted = record.asteroid_name.is_none()
            || record.closest_approach_time.is_none()
            || record.velocity_kmph.is_none()
            || record.diameter_min_m.is_none()
            || record.diameter_max_m.is_none();

        EnrichedRecord {
            velocity_category: record.velocity_kmph.map(|v| self.velocity_category(v)),
            risk_level: hazard_score.map(|s| self.risk_level(s)),
            size_category: record.diameter_max_m.and_then(|d| self.size_category(d)),
            is_close: record.closest_approach_distance_km < self.config.close_approach_km,
            nasa_id: record.nasa_id,
            asteroid_name: record.asteroid_name,
            closest_approach_time: record.closest_approach_time,
            closest_approach_distance_km: record.closest_approach_distance_km,
            velocity_kmph: record.velocity_kmph,
            diameter_min_m: record.diameter_min_m,
            diameter_max_m: record.diameter_max_m,
            nasa_site_url,
            is_potentially_hazardous,
            hazard_score,
            is_missing_data: record.is_missing_data,
            is_outlier: record.is_outlier,
            is_deleted,
            processing_status: ProcessingStatus::Transformed,
            created_at: now,
            data_id,
            batch_id: batch_id.to_string(),
        }
    }

    /// Explicit flag first; the size/distance/speed heuristic only when
    /// the flag is absent or unreadable.
    pub fn resolve_hazard(&self, record: &CleanedRecord) -> bool {
        match record.hazard_flag.as_deref().map(str::trim) {
            Some("true" | "yes" | "1") => true,
            Some("false" | "no" | "0") => false,
            _ => {
                let h = &self.config.hazard_heuristic;
                record.diameter_max_m.is_some_and(|d| d > h.min_diameter_max_m)
                    && record.closest_approach_distance_km < h.max_distance_km
                    && record.velocity_kmph.is_some_and(|v| v > h.min_velocity_kmph)
            }
        }
    }

    pub fn velocity_category(&self, velocity_kmph: f64) -> VelocityCategory {
        let bands = &self.config.velocity_bands;
        if velocity_kmph < bands.slow_below {
            VelocityCategory::Slow
        } else if velocity_kmph < bands.moderate_below {
            VelocityCategory::Moderate
        } else {
            VelocityCategory::Fast
        }
    }

    pub fn risk_level(&self, hazard_score: f64) -> RiskLevel {
        let bands = &self.config.risk_bands;
        if hazard_score >= bands.critical_from {
            RiskLevel::Critical
        } else if hazard_score >= bands.high_from {
            RiskLevel::High
        } else if hazard_score >= bands.medium_from {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// `None` for negative diameters, which have no bucket.
    pub fn size_category(&self, diameter_max_m: f64) -> Option<SizeCategory> {
        let bands = &self.config.size_bands;
        if diameter_max_m < 0.0 {
            None
        } else if diameter_max_m <= bands.small_max {
            Some(SizeCategory::Small)
        } else if diameter_max_m <= bands.medium_max {
            Some(SizeCategory::Medium)
        } else if diameter_max_m <= bands.large_max {
            Some(SizeCategory::Large)
        } else {
            Some(SizeCategory::VeryLarge)
        }
    }

    fn round_score(&self, score: f64) -> f64 {
        let factor = 10f64.powi(self.config.hazard_score_precision as i32);
        (score * factor).round() / factor
    }
}

/// Millisecond-resolution batch id, e.g. `20240101120000123`.
pub fn batch_id_for(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S%3f").to_string()
}

/// Natural id plus a generation-time suffix and the record's position in
/// the batch, so two records generated in the same tick still differ.
pub fn data_id_for(nasa_id: &str, now: DateTime<Utc>, seq: usize) -> String {
    format!("{}-{}{:05}", nasa_id, now.format("%d%m%y%H%M%S%3f"), seq)
}

fn verify_url(url: Option<&str>) -> String {
    match url {
        Some(url) if url.starts_with("https://") && url.contains(TRUSTED_URL_HOST) => url.to_string(),
        _ => URL_NOT_FOUND.to_string(),
    }
}
