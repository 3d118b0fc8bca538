use rand::seq::SliceRandom;

/// A model produced by a [`Trainable`] backend.
#[derive(Debug, Clone)]
pub enum FittedModel {
    /// Labelled centroids; prediction is nearest-centroid lookup.
    Classifier {
        /// One centroid per label, built from the mean of its samples.
        centroids: Vec<(String, Vec<f64>)>,
    },
    /// Unlabelled centroids from k-means.
    Clusterer {
        /// Cluster centers indexed by cluster id.
        centroids: Vec<Vec<f64>>,
    },
}

/// Outcome of running a fitted model against a feature vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Classifier output.
    Label(String),
    /// Clusterer output.
    Cluster(usize),
}

impl FittedModel {
    /// Predict against a feature vector. Returns None when the vector's
    /// dimension does not match the model or the model is empty.
    pub fn predict(&self, features: &[f64]) -> Option<Prediction> {
        match self {
            FittedModel::Classifier { centroids } => {
                let (label, _) = centroids
                    .iter()
                    .filter(|(_, c)| c.len() == features.len())
                    .map(|(label, c)| (label, squared_distance(features, c)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))?;
                Some(Prediction::Label(label.clone()))
            }
            FittedModel::Clusterer { centroids } => {
                let (index, _) = centroids
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.len() == features.len())
                    .map(|(i, c)| (i, squared_distance(features, c)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))?;
                Some(Prediction::Cluster(index))
            }
        }
    }
}

/// Capability seam for model fitting. Backends return None instead of
/// erroring when they cannot produce a model from the given samples.
pub trait Trainable: Send + Sync {
    /// Fit a classifier from (features, label) pairs.
    fn fit_classifier(&self, samples: &[(Vec<f64>, String)]) -> Option<FittedModel>;

    /// Fit a k-cluster model from feature vectors.
    fn fit_clusterer(&self, samples: &[Vec<f64>], k: usize) -> Option<FittedModel>;
}

/// Default statistics backend: per-label mean centroids for classification
/// and plain k-means for clustering.
#[derive(Debug, Default)]
pub struct StatsBackend;

const KMEANS_ITERATIONS: usize = 25;

impl Trainable for StatsBackend {
    fn fit_classifier(&self, samples: &[(Vec<f64>, String)]) -> Option<FittedModel> {
        let dimension = samples.first().map(|(f, _)| f.len())?;
        if dimension == 0 {
            return None;
        }

        let mut sums: Vec<(String, Vec<f64>, usize)> = Vec::new();
        for (features, label) in samples {
            if features.len() != dimension {
                return None;
            }
            match sums.iter_mut().find(|(l, _, _)| l == label) {
                Some((_, sum, count)) => {
                    for (s, f) in sum.iter_mut().zip(features) {
                        *s += f;
                    }
                    *count += 1;
                }
                None => sums.push((label.clone(), features.clone(), 1)),
            }
        }

        let centroids = sums
            .into_iter()
            .map(|(label, sum, count)| {
                let mean = sum.into_iter().map(|s| s / count as f64).collect();
                (label, mean)
            })
            .collect();

        Some(FittedModel::Classifier { centroids })
    }

    fn fit_clusterer(&self, samples: &[Vec<f64>], k: usize) -> Option<FittedModel> {
        if k == 0 || samples.len() < k {
            return None;
        }
        let dimension = samples[0].len();
        if dimension == 0 || samples.iter().any(|s| s.len() != dimension) {
            return None;
        }

        let mut rng = rand::thread_rng();
        let mut centroids: Vec<Vec<f64>> = samples
            .choose_multiple(&mut rng, k)
            .cloned()
            .collect();

        let mut assignments = vec![0usize; samples.len()];
        for _ in 0..KMEANS_ITERATIONS {
            let mut changed = false;
            for (i, sample) in samples.iter().enumerate() {
                let nearest = centroids
                    .iter()
                    .enumerate()
                    .map(|(j, c)| (j, squared_distance(sample, c)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(j, _)| j)
                    .unwrap_or(0);
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }

            for (j, centroid) in centroids.iter_mut().enumerate() {
                let members: Vec<&Vec<f64>> = samples
                    .iter()
                    .zip(&assignments)
                    .filter(|(_, a)| **a == j)
                    .map(|(s, _)| s)
                    .collect();
                if members.is_empty() {
                    continue;
                }
                for d in 0..dimension {
                    centroid[d] =
                        members.iter().map(|m| m[d]).sum::<f64>() / members.len() as f64;
                }
            }

            if !changed {
                break;
            }
        }

        Some(FittedModel::Clusterer { centroids })
    }
}

/// Backend used when model training capability is absent; every fit
/// degrades to None so callers report failure without erroring.
#[derive(Debug, Default)]
pub struct NullBackend;

impl Trainable for NullBackend {
    fn fit_classifier(&self, _samples: &[(Vec<f64>, String)]) -> Option<FittedModel> {
        None
    }

    fn fit_clusterer(&self, _samples: &[Vec<f64>], _k: usize) -> Option<FittedModel> {
        None
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
