//! Radius and recency search over sighting records
//!
//! The search is a full scan: every candidate is scored with [`geo`], filtered
//! by radius and age, then ordered by distance. Candidates are expected in
//! creation order, which the stable sort keeps for equal distances so repeated
//! queries over the same records return identical output.
//!
//! [`geo`]: crate::geo

use chrono::{DateTime, TimeDelta, Utc};

use crate::errors::SightingError;
use crate::geo::{bearing_degrees, distance_km};
use crate::models::{Coordinate, ProximityResult, SightingRecord};

pub const DEFAULT_RADIUS_KM: f64 = 50.0;
pub const DEFAULT_LIMIT: i64 = 50;

/// Validated parameters of a proximity search
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityQuery {
    pub origin: Coordinate,
    pub radius_km: f64,
    /// Maximum age of a sighting's capture time, in hours
    pub max_age_hours: Option<u32>,
    pub limit: usize,
}

impl ProximityQuery {
    pub fn new(
        origin: Coordinate,
        radius_km: f64,
        max_age_hours: Option<u32>,
        limit: i64,
    ) -> Result<Self, SightingError> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(SightingError::InvalidRadius(radius_km));
        }
        if limit <= 0 {
            return Err(SightingError::InvalidLimit(limit));
        }
        let limit = usize::try_from(limit).map_err(|_| SightingError::InvalidLimit(limit))?;

        Ok(Self {
            origin,
            radius_km,
            max_age_hours,
            limit,
        })
    }

    fn is_recent(&self, record: &SightingRecord, now: DateTime<Utc>) -> bool {
        match self.max_age_hours {
            Some(hours) => now - record.captured_at <= TimeDelta::hours(i64::from(hours)),
            None => true,
        }
    }
}

/// Run a proximity search over `candidates`
///
/// Returns at most `query.limit` results within `query.radius_km` of the
/// origin, nearest first.
pub fn query<I>(candidates: I, query: &ProximityQuery, now: DateTime<Utc>) -> Vec<ProximityResult>
where
    I: IntoIterator<Item = SightingRecord>,
{
    let mut results: Vec<ProximityResult> = candidates
        .into_iter()
        .filter_map(|record| {
            let distance = distance_km(query.origin, record.coordinate);
            if distance > query.radius_km || !query.is_recent(&record, now) {
                return None;
            }
            Some(ProximityResult {
                bearing_from_origin: bearing_degrees(query.origin, record.coordinate),
                distance_km: distance,
                record,
            })
        })
        .collect();

    // sort_by is stable, equal distances keep candidate order
    results.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    results.truncate(query.limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bearing, MediaRef, MediaType, SightingId};
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap()
    }

    fn record(id: i64, lat: f64, lon: f64, hours_ago: i64) -> SightingRecord {
        SightingRecord {
            id: SightingId::new(id),
            coordinate: Coordinate::new(lat, lon).unwrap(),
            bearing: Bearing::try_from(0.0).unwrap(),
            captured_at: now() - TimeDelta::hours(hours_ago),
            device_id: format!("device-{}", id),
            flag: None,
            media_type: MediaType::Photo,
            media: MediaRef {
                original_name: format!("{}.jpg", id),
                path: PathBuf::from(format!("uploads/{}.jpg", id)),
            },
        }
    }

    fn ids(results: &[ProximityResult]) -> Vec<i64> {
        results.iter().map(|r| r.record.id.value()).collect()
    }

    #[test]
    fn radius_excludes_far_records() {
        let origin = Coordinate::new(40.0, -75.0).unwrap();
        let q = ProximityQuery::new(origin, 10.0, None, 50).unwrap();
        let candidates = vec![record(1, 40.0899, -75.0, 0), record(2, 41.0, -75.0, 0)];

        let results = query(candidates, &q, now());

        assert_eq!(ids(&results), vec![1]);
        assert!((results[0].distance_km - 10.0).abs() < 0.01);
        assert!(results[0].bearing_from_origin.abs() < 1e-9);
    }

    #[test]
    fn results_sorted_by_distance_and_within_radius() {
        let origin = Coordinate::new(60.0, 25.0).unwrap();
        let q = ProximityQuery::new(origin, 60.0, None, 50).unwrap();
        let candidates = vec![
            record(1, 60.3, 25.0, 0),
            record(2, 60.05, 25.0, 0),
            record(3, 61.0, 25.0, 0),
            record(4, 60.0, 25.2, 0),
            record(5, 59.8, 24.8, 0),
        ];

        let results = query(candidates, &q, now());

        assert_eq!(ids(&results), vec![2, 4, 5, 1]);
        assert!(results.iter().all(|r| r.distance_km <= 60.0));
        assert!(results
            .windows(2)
            .all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn equal_distances_keep_creation_order() {
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        let q = ProximityQuery::new(origin, 500.0, None, 50).unwrap();
        let candidates = vec![
            record(1, 0.0, 1.0, 0),
            record(2, 1.0, 0.0, 0),
            record(3, 0.0, 1.0, 0),
            record(4, 0.0, 0.5, 0),
        ];

        let first = query(candidates.clone(), &q, now());
        let second = query(candidates, &q, now());

        assert_eq!(ids(&first), vec![4, 1, 2, 3]);
        assert_eq!(first, second);
    }

    #[test]
    fn max_age_filters_old_records() {
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        let q = ProximityQuery::new(origin, 100.0, Some(24), 50).unwrap();
        let candidates = vec![
            record(1, 0.1, 0.0, 2),
            record(2, 0.2, 0.0, 24),
            record(3, 0.3, 0.0, 25),
        ];

        let results = query(candidates, &q, now());

        assert_eq!(ids(&results), vec![1, 2]);
    }

    #[test]
    fn limit_truncates_after_sorting() {
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        let q = ProximityQuery::new(origin, 1000.0, None, 2).unwrap();
        let candidates = vec![
            record(1, 3.0, 0.0, 0),
            record(2, 1.0, 0.0, 0),
            record(3, 2.0, 0.0, 0),
        ];

        assert_eq!(ids(&query(candidates, &q, now())), vec![2, 3]);
    }

    #[test]
    fn zero_radius_matches_exact_position_only() {
        let origin = Coordinate::new(10.0, 10.0).unwrap();
        let q = ProximityQuery::new(origin, 0.0, None, 10).unwrap();
        let candidates = vec![record(1, 10.0, 10.0, 0), record(2, 10.0001, 10.0, 0)];

        let results = query(candidates, &q, now());

        assert_eq!(ids(&results), vec![1]);
        assert_eq!(results[0].distance_km, 0.0);
        assert_eq!(results[0].bearing_from_origin, 0.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        assert!(matches!(
            ProximityQuery::new(origin, 10.0, None, 0),
            Err(SightingError::InvalidLimit(0))
        ));
        assert!(matches!(
            ProximityQuery::new(origin, 10.0, None, -5),
            Err(SightingError::InvalidLimit(-5))
        ));
        assert!(matches!(
            ProximityQuery::new(origin, -1.0, None, 10),
            Err(SightingError::InvalidRadius(_))
        ));
        assert!(ProximityQuery::new(origin, f64::NAN, None, 10).is_err());
    }

    #[test]
    fn empty_candidates_give_empty_result() {
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        let q = ProximityQuery::new(origin, DEFAULT_RADIUS_KM, None, DEFAULT_LIMIT).unwrap();
        assert!(query(Vec::new(), &q, now()).is_empty());
    }
}
