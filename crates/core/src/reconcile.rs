//! Merges the immutable claim baseline with mutable provider updates and
//! selects one winning record per logical key.
//!
//! Two consumers sit downstream with different needs. The presentation layer
//! wants the most recent provider-submitted value with the claim carried as a
//! contractual lower bound. The metrics layer wants the best value per key,
//! where the claim acts as a floor the derived score can never drop below.
//! Both views are built from the same latest-entry selection.

use std::collections::BTreeMap;

use tracing::warn;

use crate::domain::observation::{
    Analyte, FlowKind, FlowObservation, Observation, ObservationKey, PfasObservation, Provenance,
    PwsId, SourceName,
};
use crate::errors::DomainError;

/// First reporting year shown in the portal.
pub const WINDOW_START_YEAR: i32 = 2013;
/// Last historical reporting year; later years are the live update year.
pub const WINDOW_END_YEAR: i32 = 2022;
/// The year providers are actively adding or correcting production for.
pub const UPDATE_YEAR: i32 = 2023;
/// Impacted sources always show at least this many production years.
pub const MIN_DISPLAY_YEARS: usize = 3;
/// 2013 was a partial intake year; it never contributes to the AFR average.
pub const AFR_EXCLUDED_YEAR: i32 = 2013;

#[derive(Clone, Debug, PartialEq)]
pub struct ReconciledRecord<T> {
    pub winner: T,
    /// Normalized claim value for the key, present whenever a claim record
    /// exists. Carried even when a provider update wins so the presentation
    /// layer can enforce the contractual floor.
    pub lower_bound: Option<f64>,
    pub provenance: Provenance,
}

/// Keeps only the most recent provider-submitted record per key.
pub fn latest_per_key<T>(updates: &[T]) -> Vec<T>
where
    T: Observation + Clone,
{
    let mut latest: BTreeMap<ObservationKey, T> = BTreeMap::new();
    for record in updates {
        if !record.submitted_by_provider() {
            continue;
        }
        match latest.get(&record.key()) {
            Some(current) if current.submitted_at() >= record.submitted_at() => {}
            _ => {
                latest.insert(record.key(), record.clone());
            }
        }
    }
    latest.into_values().collect()
}

/// Produces one winning record per key: the most recent provider update when
/// one exists, otherwise the claim record. Keys present in neither input are
/// absent from the output; keys with an incomplete would-be winner fall back
/// to the claim and are never silently dropped.
pub fn reconcile<T>(claims: &[T], updates: &[T]) -> BTreeMap<ObservationKey, ReconciledRecord<T>>
where
    T: Observation + Clone,
{
    let claim_by_key: BTreeMap<ObservationKey, &T> =
        claims.iter().map(|record| (record.key(), record)).collect();

    let mut reconciled = BTreeMap::new();

    for update in latest_per_key(updates) {
        let key = update.key();
        let lower_bound = claim_by_key.get(&key).map(|claim| claim.normalized_value());

        let missing = update.missing_required_fields();
        if missing.is_empty() {
            reconciled.insert(
                key,
                ReconciledRecord {
                    winner: update,
                    lower_bound,
                    provenance: Provenance::ProviderUpdate,
                },
            );
            continue;
        }

        let error = DomainError::IncompleteRecord { key: key.to_string(), missing };
        warn!(
            event_name = "reconcile.incomplete_record",
            key = %key,
            error = %error,
            "provider update is missing required fields, falling back to claim"
        );
        if let Some(claim) = claim_by_key.get(&key) {
            reconciled.insert(
                key,
                ReconciledRecord {
                    winner: (*claim).clone(),
                    lower_bound,
                    provenance: Provenance::Claim,
                },
            );
        } else {
            // No claim to fall back to; keep the incomplete update rather
            // than dropping the key.
            reconciled.insert(
                key,
                ReconciledRecord {
                    winner: update,
                    lower_bound,
                    provenance: Provenance::ProviderUpdate,
                },
            );
        }
    }

    for (key, claim) in claim_by_key {
        reconciled.entry(key).or_insert_with(|| ReconciledRecord {
            winner: claim.clone(),
            lower_bound: Some(claim.normalized_value()),
            provenance: Provenance::Claim,
        });
    }

    reconciled
}

/// Folds a combined record set down to the maximum normalized value per key.
pub fn max_by_key<T>(records: impl IntoIterator<Item = T>) -> Vec<T>
where
    T: Observation,
{
    let mut max_per_key: BTreeMap<ObservationKey, T> = BTreeMap::new();
    for record in records {
        match max_per_key.get(&record.key()) {
            Some(current) if current.normalized_value() >= record.normalized_value() => {}
            _ => {
                max_per_key.insert(record.key(), record);
            }
        }
    }
    max_per_key.into_values().collect()
}

/// The record set metrics derivation consumes: claim baseline plus winning
/// provider updates, best value per key. The claim acts as a scoring floor.
pub fn scoring_set<T>(claims: &[T], updates: &[T]) -> Vec<T>
where
    T: Observation + Clone,
{
    let combined = claims.iter().cloned().chain(latest_per_key(updates));
    max_by_key(combined)
}

/// Annual-production subset of the scoring set, with the excluded partial
/// intake year removed.
pub fn scoring_annuals(claims: &[FlowObservation], updates: &[FlowObservation]) -> Vec<FlowObservation> {
    let keep = |record: &FlowObservation| {
        matches!(record.kind, FlowKind::Annual { year } if year != AFR_EXCLUDED_YEAR)
    };
    let claims: Vec<FlowObservation> = claims.iter().filter(|r| keep(r)).cloned().collect();
    let updates: Vec<FlowObservation> = updates.iter().filter(|r| keep(r)).cloned().collect();
    scoring_set(&claims, &updates)
}

/// Guarantees PFOA and PFOS entries exist so scoring always has both inputs,
/// synthesizing zero-valued "not available" records when absent.
pub fn ensure_pfoa_pfos(
    results: &mut Vec<PfasObservation>,
    pwsid: &PwsId,
    water_source_id: Option<i64>,
    source_name: &SourceName,
) {
    for analyte in [Analyte::pfoa(), Analyte::pfos()] {
        if !results.iter().any(|result| result.analyte == analyte) {
            results.push(PfasObservation::not_available(
                pwsid.clone(),
                water_source_id,
                source_name.clone(),
                analyte,
            ));
        }
    }
}

/// Applies the display-windowing policy to reconciled annual records:
/// - the update year is always present (zero placeholder when absent);
/// - all-non-detect sources show every year in the window;
/// - impacted sources show non-zero years, backfilled with the most recent
///   zero years until at least `MIN_DISPLAY_YEARS` are present.
///
/// Output is sorted ascending by year.
pub fn window_annuals(
    annuals: &[FlowObservation],
    all_nds: bool,
    pwsid: &PwsId,
    source_name: &SourceName,
) -> Vec<FlowObservation> {
    let mut windowed = Vec::new();
    let mut non_zero_years = Vec::new();
    let mut zero_years = Vec::new();

    for record in annuals {
        let FlowKind::Annual { year } = record.kind else { continue };

        if year == UPDATE_YEAR {
            windowed.push(record.clone());
        } else if (WINDOW_START_YEAR..=WINDOW_END_YEAR).contains(&year) {
            if all_nds {
                windowed.push(record.clone());
            } else if record.value() > 0.0 {
                non_zero_years.push(record.clone());
            } else {
                zero_years.push(record.clone());
            }
        }
    }

    if !all_nds {
        let backfill = MIN_DISPLAY_YEARS.saturating_sub(non_zero_years.len());
        windowed.append(&mut non_zero_years);
        if backfill > 0 {
            zero_years.sort_by_key(|record| std::cmp::Reverse(record.kind.year()));
            windowed.extend(zero_years.into_iter().take(backfill));
        }
    }

    if !windowed.iter().any(|record| record.kind.year() == Some(UPDATE_YEAR)) {
        windowed.push(FlowObservation::placeholder_year(
            pwsid.clone(),
            source_name.clone(),
            UPDATE_YEAR,
        ));
    }

    windowed.sort_by_key(|record| record.kind.year());
    windowed
}
