//! Isolation Forest
//!
//! ランダムな軸平行分割を繰り返し、少ない分割で孤立する点を異常とみなす。
//!
//! - スコア: `score_samples` は `-2^(-E[h(x)] / c(ψ))`（-1〜0、小さいほど異常）
//! - オフセット: contamination が比率なら学習スコアのパーセンタイル、`Auto` なら -0.5
//! - 決定関数: `score - offset`（負 = 外れ値）

use super::{check_feature_count, check_training_input, percentile, AnomalyDetector, FittedDetector};
use crate::config::check_detector_contamination;
use crate::error::{Error, Result};
use crate::telemetry::seeded_rng;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// オイラー・マスケローニ定数
const EULER_GAMMA: f64 = 0.577_215_664_9;

/// `Auto` 指定時のオフセット
const AUTO_OFFSET: f64 = -0.5;

/// 期待される外れ値比率
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contamination {
    /// 固定オフセット -0.5
    Auto,
    /// 学習データ中の外れ値比率 (0, 0.5]
    Fraction(f64),
}

/// Isolation Forest のハイパーパラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    contamination: Contamination,
    random_state: Option<u64>,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: Contamination::Auto,
            random_state: None,
        }
    }
}

impl IsolationForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// 各木のサブサンプル数上限（実際は min(max_samples, n)）
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_contamination(mut self, contamination: Contamination) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn contamination(&self) -> Contamination {
        self.contamination
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(Error::invalid("n_estimators", "must be at least 1"));
        }
        if self.max_samples == 0 {
            return Err(Error::invalid("max_samples", "must be at least 1"));
        }
        if let Contamination::Fraction(c) = self.contamination {
            check_detector_contamination("contamination", c)?;
        }
        Ok(())
    }
}

impl AnomalyDetector for IsolationForest {
    type Model = IsolationForestModel;

    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn fit(&self, x: ArrayView2<'_, f64>) -> Result<IsolationForestModel> {
        self.validate()?;
        check_training_input(x)?;

        let n_samples = x.nrows();
        let psi = self.max_samples.min(n_samples);
        let height_limit = height_limit(psi);
        let mut rng = seeded_rng(self.random_state);

        debug!(
            n_samples,
            psi,
            height_limit,
            n_estimators = self.n_estimators,
            "building isolation trees"
        );

        let trees = (0..self.n_estimators)
            .map(|_| {
                let sample = index::sample(&mut rng, n_samples, psi).into_vec();
                IsolationTree::grow(x, sample, height_limit, &mut rng)
            })
            .collect();

        let mut model = IsolationForestModel {
            trees,
            psi,
            n_features: x.ncols(),
            offset: AUTO_OFFSET,
        };

        if let Contamination::Fraction(c) = self.contamination {
            let scores = model.score_samples(x)?.to_vec();
            model.offset = percentile(&scores, 100.0 * c);
        }

        info!(
            trees = self.n_estimators,
            samples = n_samples,
            offset = model.offset,
            "Isolation Forest trained"
        );

        Ok(model)
    }
}

/// 木のノード（配列インデックスで子を参照）
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(x: ArrayView2<'_, f64>, sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(x, sample, 0, height_limit, rng);
        tree
    }

    fn grow_node(
        &mut self,
        x: ArrayView2<'_, f64>,
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();

        if depth >= height_limit || rows.len() <= 1 {
            self.nodes.push(Node::Leaf { size: rows.len() });
            return id;
        }

        // 分割可能な（値が一定でない）特徴量のみ候補
        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|feature| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = x[[r, feature]];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();

        if candidates.is_empty() {
            self.nodes.push(Node::Leaf { size: rows.len() });
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| x[[r, feature]] <= threshold);

        self.nodes.push(Node::Leaf { size: 0 });
        let left = self.grow_node(x, left_rows, depth + 1, height_limit, rng);
        let right = self.grow_node(x, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// 経路長（葉に残った点数の補正込み）
    fn path_length(&self, point: ArrayView1<'_, f64>) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if point[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

/// 学習済み Isolation Forest
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForestModel {
    trees: Vec<IsolationTree>,
    psi: usize,
    n_features: usize,
    offset: f64,
}

impl IsolationForestModel {
    /// 異常スコア（-1〜0、小さいほど異常）
    pub fn score_samples(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_feature_count(self.n_features, x)?;

        let normalizer = match average_path_length(self.psi) {
            c if c > 0.0 => c,
            _ => 1.0,
        };
        let n_trees = self.trees.len() as f64;

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mean_depth =
                    self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / n_trees;
                -(2f64.powf(-mean_depth / normalizer))
            })
            .collect())
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }
}

impl FittedDetector for IsolationForestModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        Ok(self.score_samples(x)? - self.offset)
    }
}

/// 木の高さ上限 ceil(log2 ψ)
fn height_limit(psi: usize) -> usize {
    if psi <= 1 {
        0
    } else {
        (psi as f64).log2().ceil() as usize
    }
}

/// n 点の二分探索木における失敗探索の平均経路長 c(n)
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}
