//! Clusterer (§4.E): density-based clustering of a chosen axis's vectors,
//! producing weighted centroids.
//!
//! Grounded in `calm/clustering/experience.py`'s `ExperienceClusterer`: the
//! same 10 000-point scroll cap, the same three `structlog` warning events
//! (`clustering.scroll_limit_reached`, `clustering.all_noise`,
//! `clustering.complete`) translated here to `tracing` events on the
//! `ghap_core::cluster` target, and the same per-axis skip-on-error
//! behavior in `cluster_all_axes` (`clustering.axis_skipped`).

use std::collections::HashMap;

use hdbscan::{DistanceMetric, Hdbscan, HdbscanHyperParams};
use serde::{Deserialize, Serialize};

use crate::enums::{self, axis_collection_name, tier_weight};
use crate::error::Error;
use crate::vector::VectorStore;

/// Empirically chosen to cluster moderately sized cohesive groups. A more
/// conservative 5/3 pairing is a documented prior this must not regress to
/// (spec §4.E) — 3/2 is the calibrated default that ships.
pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 3;
pub const DEFAULT_MIN_SAMPLES: usize = 2;

/// The clusterer never pulls more than this many points from a single axis
/// collection in one pass; exceeding it only logs a warning; it never
/// silently truncates without signaling (§4.E).
pub const SCROLL_CAP: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    /// `"{axis}_{label}"`, the handle exposed to callers.
    pub id: String,
    pub label: i64,
    pub centroid: Vec<f32>,
    pub member_ids: Vec<String>,
    pub size: usize,
    pub avg_weight: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterReport {
    pub clusters: Vec<Cluster>,
    pub noise_ids: Vec<String>,
}

pub struct Clusterer {
    min_cluster_size: usize,
    min_samples: usize,
}

impl Default for Clusterer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CLUSTER_SIZE, DEFAULT_MIN_SAMPLES)
    }
}

impl Clusterer {
    pub fn new(min_cluster_size: usize, min_samples: usize) -> Self {
        Self {
            min_cluster_size,
            min_samples,
        }
    }

    /// Clusters an already-loaded cohort of `(id, vector, confidence_tier)`
    /// triples. This is the pure algorithmic core; `cluster_axis` below
    /// wraps it with the scroll/telemetry concerns of pulling the cohort
    /// from a live vector-store axis collection.
    pub fn cluster(&self, points: &[(String, Vec<f32>, Option<String>)]) -> Result<ClusterReport, Error> {
        if points.is_empty() {
            return Err(Error::InsufficientData("no points to cluster".to_string()));
        }

        // Inputs are L2-unit-norm (§3), so Euclidean distance over them is a
        // strictly monotonic function of cosine distance
        // (||a-b||^2 = 2 - 2*cos(a,b) for unit vectors): using the crate's
        // Euclidean metric over pre-normalized vectors reproduces cosine
        // nearest-neighbor structure without requiring a cosine-native
        // metric variant.
        let data: Vec<Vec<f64>> = points
            .iter()
            .map(|(_, v, _)| v.iter().map(|x| *x as f64).collect())
            .collect();

        let hyper_params = HdbscanHyperParams::builder()
            .min_cluster_size(self.min_cluster_size)
            .min_samples(self.min_samples)
            .dist_metric(DistanceMetric::Euclidean)
            .build();
        let clusterer = Hdbscan::new(&data, hyper_params);
        let labels = clusterer
            .cluster()
            .map_err(|e| Error::Internal(format!("clustering failed: {e}")))?;

        let mut by_label: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut noise_ids = Vec::new();
        for (idx, label) in labels.iter().enumerate() {
            let label = *label as i64;
            if label < 0 {
                noise_ids.push(points[idx].0.clone());
            } else {
                by_label.entry(label).or_default().push(idx);
            }
        }

        let mut labels_sorted: Vec<i64> = by_label.keys().copied().collect();
        labels_sorted.sort_unstable();

        let dim = points[0].1.len();
        let mut clusters = Vec::with_capacity(labels_sorted.len());
        for label in labels_sorted {
            let member_indices = &by_label[&label];
            let mut centroid = vec![0.0f32; dim];
            let mut weight_sum = 0.0f32;
            for &idx in member_indices {
                let weight = tier_weight(points[idx].2.as_deref());
                for (c, v) in centroid.iter_mut().zip(points[idx].1.iter()) {
                    *c += v * weight;
                }
                weight_sum += weight;
            }
            if weight_sum > 0.0 {
                for c in centroid.iter_mut() {
                    *c /= weight_sum;
                }
            }
            let member_ids: Vec<String> = member_indices.iter().map(|&idx| points[idx].0.clone()).collect();
            let avg_weight = weight_sum / member_indices.len() as f32;
            clusters.push(Cluster {
                id: format!("_{label}"), // axis prefix filled in by cluster_axis
                label,
                centroid,
                member_ids,
                size: member_indices.len(),
                avg_weight,
            });
        }

        Ok(ClusterReport { clusters, noise_ids })
    }

    /// Pulls up to [`SCROLL_CAP`] points from `axis`'s collection and
    /// clusters them, logging the telemetry events named in the module doc.
    pub fn cluster_axis(&self, store: &dyn VectorStore, axis: &str) -> Result<ClusterReport, Error> {
        enums::validate_axis(axis)?;
        let collection = axis_collection_name(axis).expect("validated axis has a collection name");

        let page = store.scroll(collection, SCROLL_CAP, 0, true, None)?;
        if page.next_offset.is_some() || page.points.len() >= SCROLL_CAP {
            tracing::warn!(
                target: "ghap_core::cluster",
                event = "clustering.scroll_limit_reached",
                axis,
                cap = SCROLL_CAP,
                "axis collection exceeds the clustering scroll cap; clustering a truncated cohort"
            );
        }

        if page.points.is_empty() {
            return Err(Error::InsufficientData(format!("axis '{axis}' has no vectors to cluster")));
        }

        let points: Vec<(String, Vec<f32>, Option<String>)> = page
            .points
            .into_iter()
            .map(|p| {
                let tier = p
                    .payload
                    .get("confidence_tier")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                (p.id, p.vector, tier)
            })
            .collect();

        let mut report = self.cluster(&points)?;
        for cluster in report.clusters.iter_mut() {
            cluster.id = format!("{axis}_{}", cluster.label);
        }

        if report.clusters.is_empty() {
            tracing::warn!(
                target: "ghap_core::cluster",
                event = "clustering.all_noise",
                axis,
                point_count = points.len(),
                "every point in the axis cohort was classified as noise"
            );
        } else {
            tracing::info!(
                target: "ghap_core::cluster",
                event = "clustering.complete",
                axis,
                cluster_count = report.clusters.len(),
                noise_count = report.noise_ids.len(),
                "clustering complete"
            );
        }

        Ok(report)
    }

    /// Upserts every cluster's centroid into the `cluster_centroids`
    /// collection under its `"{axis}_{label}"` id, the handle
    /// [`crate::values::ValueStore`] looks up admission centroids by.
    /// Centroids are weighted means (§3) and are stored exactly as
    /// computed, not re-normalized.
    pub fn persist_centroids(&self, store: &dyn VectorStore, report: &ClusterReport) -> Result<(), Error> {
        if report.clusters.is_empty() {
            return Ok(());
        }
        let dim = report.clusters[0].centroid.len();
        store.create_collection("cluster_centroids", dim)?;
        for cluster in &report.clusters {
            store.upsert(
                "cluster_centroids",
                &cluster.id,
                cluster.centroid.clone(),
                serde_json::json!({"size": cluster.size, "avg_weight": cluster.avg_weight}),
            )?;
        }
        Ok(())
    }

    /// Clusters every axis independently; a failure on one axis is logged
    /// as `clustering.axis_skipped` and does not abort the others.
    pub fn cluster_all_axes(&self, store: &dyn VectorStore) -> HashMap<String, ClusterReport> {
        let mut reports = HashMap::new();
        for axis in enums::AXES {
            match self.cluster_axis(store, axis) {
                Ok(report) => {
                    reports.insert((*axis).to_string(), report);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "ghap_core::cluster",
                        event = "clustering.axis_skipped",
                        axis = *axis,
                        error = %e,
                        "skipping axis after clustering error"
                    );
                }
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort_around(center: [f32; 4], n: usize, jitter: f32) -> Vec<(String, Vec<f32>, Option<String>)> {
        (0..n)
            .map(|i| {
                let seed = i as f32 * 0.001;
                let mut v: Vec<f32> = center.iter().map(|c| c + jitter * (seed - 0.5)).collect();
                let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                for x in v.iter_mut() {
                    *x /= norm;
                }
                (format!("id_{i}"), v, Some("gold".to_string()))
            })
            .collect()
    }

    #[test]
    fn thirty_similar_vectors_yield_at_least_one_cluster_of_size_three_or_more() {
        let points = cohort_around([1.0, 0.0, 0.0, 0.0], 30, 0.01);
        let clusterer = Clusterer::new(3, 2);
        let report = clusterer.cluster(&points).unwrap();
        assert!(report.clusters.iter().any(|c| c.size >= 3));
    }

    #[test]
    fn four_similar_points_with_min_cluster_size_five_yields_no_clusters() {
        let points = cohort_around([1.0, 0.0, 0.0, 0.0], 4, 0.01);
        let clusterer = Clusterer::new(5, 3);
        let report = clusterer.cluster(&points).unwrap();
        assert!(report.clusters.is_empty());
    }

    #[test]
    fn centroid_is_the_tier_weighted_mean_of_members() {
        let points = vec![
            ("a".to_string(), vec![1.0, 0.0], Some("gold".to_string())),
            ("b".to_string(), vec![0.0, 1.0], Some("bronze".to_string())),
            ("c".to_string(), vec![1.0, 0.0], Some("gold".to_string())),
        ];
        let clusterer = Clusterer::new(2, 1);
        let report = clusterer.cluster(&points).unwrap();
        assert_eq!(report.clusters.len(), 1);
        let cluster = &report.clusters[0];
        // weighted mean: (1.0*[1,0] + 0.5*[0,1] + 1.0*[1,0]) / 2.5
        let expected_x = (1.0 + 0.5 * 0.0 + 1.0) / 2.5;
        let expected_y = (0.0 + 0.5 * 1.0 + 0.0) / 2.5;
        assert!((cluster.centroid[0] - expected_x).abs() < 1e-5);
        assert!((cluster.centroid[1] - expected_y).abs() < 1e-5);
    }

    #[test]
    fn empty_cohort_is_insufficient_data() {
        let clusterer = Clusterer::default();
        let err = clusterer.cluster(&[]).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn persisted_centroids_are_retrievable_by_cluster_id() {
        use crate::vector::memory::InMemoryVectorStore;

        let points = cohort_around([1.0, 0.0, 0.0, 0.0], 30, 0.01);
        let clusterer = Clusterer::new(3, 2);
        let report = clusterer.cluster(&points).unwrap();
        let store = InMemoryVectorStore::new();
        clusterer.persist_centroids(&store, &report).unwrap();

        let cluster = &report.clusters[0];
        let point = store.get("cluster_centroids", &cluster.id).unwrap().unwrap();
        assert_eq!(point.vector, cluster.centroid);
    }
}
