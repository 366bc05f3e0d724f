//! One-Class SVM (ν-SVM, RBF kernel)
//!
//! 原点から正常データを最大マージンで分離する境界を学習する。
//! 双対問題を SMO（2変数ずつの解析的更新）で解く。
//!
//! ```text
//! min  ½ αᵀQα   s.t. 0 ≤ αᵢ ≤ 1,  Σαᵢ = ν·l,   Qᵢⱼ = exp(-γ‖xᵢ - xⱼ‖²)
//! f(x) = Σ αᵢ K(xᵢ, x) - ρ        （f(x) ≤ 0 なら外れ値）
//! ```

use super::{check_feature_count, check_training_input, AnomalyDetector, FittedDetector, Label};
use crate::config::{check_nu, check_positive};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 二次係数の下限（非正定値の補正）
const TAU: f64 = 1e-12;

/// RBF カーネル幅
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
    /// 1 / (n_features * Var(X))
    Scale,
    /// 固定値
    Value(f64),
}

impl Gamma {
    fn resolve(&self, x: ArrayView2<'_, f64>) -> Result<f64> {
        match *self {
            Gamma::Value(gamma) => {
                check_positive("gamma", gamma)?;
                Ok(gamma)
            }
            Gamma::Scale => {
                let variance = x.var(0.0);
                if variance > 0.0 {
                    Ok(1.0 / (x.ncols() as f64 * variance))
                } else {
                    Ok(1.0)
                }
            }
        }
    }
}

/// One-Class SVM のハイパーパラメータ
#[derive(Debug, Clone, PartialEq)]
pub struct OneClassSvm {
    nu: f64,
    gamma: Gamma,
    tol: f64,
    max_iter: usize,
}

impl Default for OneClassSvm {
    fn default() -> Self {
        Self {
            nu: 0.5,
            gamma: Gamma::Scale,
            tol: 1e-3,
            max_iter: 1_000_000,
        }
    }
}

impl OneClassSvm {
    pub fn new() -> Self {
        Self::default()
    }

    /// 学習外れ値比率の上限 / サポートベクター比率の下限 (0, 1]
    pub fn with_nu(mut self, nu: f64) -> Self {
        self.nu = nu;
        self
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.gamma = gamma;
        self
    }

    /// KKT 違反の許容値
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_nu("nu", self.nu)?;
        check_positive("tol", self.tol)?;
        if self.max_iter == 0 {
            return Err(Error::invalid("max_iter", "must be at least 1"));
        }
        Ok(())
    }
}

impl AnomalyDetector for OneClassSvm {
    type Model = OneClassSvmModel;

    fn name(&self) -> &'static str {
        "one_class_svm"
    }

    fn fit(&self, x: ArrayView2<'_, f64>) -> Result<OneClassSvmModel> {
        self.validate()?;
        check_training_input(x)?;
        let gamma = self.gamma.resolve(x)?;

        let kernel = RbfKernel { x, gamma };
        let solution = Smo::new(&kernel, self.nu).solve(self.tol, self.max_iter);

        let support: Vec<usize> = solution
            .alpha
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > 0.0)
            .map(|(i, _)| i)
            .collect();

        let support_vectors = x.select(Axis(0), &support);
        let dual_coef: Array1<f64> = support.iter().map(|&i| solution.alpha[i]).collect();

        info!(
            samples = x.nrows(),
            support_vectors = support.len(),
            iterations = solution.iterations,
            rho = solution.rho,
            "One-Class SVM trained"
        );

        Ok(OneClassSvmModel {
            support_vectors,
            dual_coef,
            rho: solution.rho,
            gamma,
        })
    }
}

/// 学習データ上の RBF カーネル
struct RbfKernel<'a> {
    x: ArrayView2<'a, f64>,
    gamma: f64,
}

impl RbfKernel<'_> {
    fn len(&self) -> usize {
        self.x.nrows()
    }

    /// Q の i 行目（対角は常に 1）
    fn row(&self, i: usize) -> Vec<f64> {
        let xi = self.x.row(i);
        self.x
            .rows()
            .into_iter()
            .map(|xj| rbf(xi, xj, self.gamma))
            .collect()
    }
}

fn rbf(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>, gamma: f64) -> f64 {
    let squared: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum();
    (-gamma * squared).exp()
}

struct Solution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
}

/// SMO ソルバー（全サンプル y = +1、上限 C = 1）
struct Smo<'k, 'a> {
    kernel: &'k RbfKernel<'a>,
    alpha: Vec<f64>,
    gradient: Vec<f64>,
}

impl<'k, 'a> Smo<'k, 'a> {
    /// 実行可能な初期解: 先頭 floor(ν·l) 個を上限に、端数を次の1個に割り当てる
    fn new(kernel: &'k RbfKernel<'a>, nu: f64) -> Self {
        let l = kernel.len();
        let total = nu * l as f64;
        let n_full = (total.floor() as usize).min(l);

        let mut alpha = vec![0.0; l];
        for a in alpha.iter_mut().take(n_full) {
            *a = 1.0;
        }
        if n_full < l {
            alpha[n_full] = total - n_full as f64;
        }

        let mut gradient = vec![0.0; l];
        for (i, &a) in alpha.iter().enumerate() {
            if a > 0.0 {
                for (g, q) in gradient.iter_mut().zip(kernel.row(i)) {
                    *g += a * q;
                }
            }
        }

        Self {
            kernel,
            alpha,
            gradient,
        }
    }

    fn is_upper_bound(&self, i: usize) -> bool {
        self.alpha[i] >= 1.0
    }

    fn is_lower_bound(&self, i: usize) -> bool {
        self.alpha[i] <= 0.0
    }

    /// 2次情報による作業集合選択。最適なら None
    fn select_working_set(&self, tol: f64) -> Option<(usize, usize, Vec<f64>)> {
        let mut g_max = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..self.alpha.len() {
            if !self.is_upper_bound(t) && -self.gradient[t] >= g_max {
                g_max = -self.gradient[t];
                i_sel = Some(t);
            }
        }
        let i = i_sel?;
        let q_i = self.kernel.row(i);

        let mut g_max2 = f64::NEG_INFINITY;
        let mut j_sel = None;
        let mut obj_diff_min = f64::INFINITY;
        for t in 0..self.alpha.len() {
            if self.is_lower_bound(t) {
                continue;
            }
            let g = self.gradient[t];
            if g >= g_max2 {
                g_max2 = g;
            }
            let grad_diff = g_max + g;
            if grad_diff > 0.0 {
                let quad = match 2.0 - 2.0 * q_i[t] {
                    q if q > 0.0 => q,
                    _ => TAU,
                };
                let obj_diff = -(grad_diff * grad_diff) / quad;
                if obj_diff <= obj_diff_min {
                    obj_diff_min = obj_diff;
                    j_sel = Some(t);
                }
            }
        }

        if g_max + g_max2 < tol {
            return None;
        }
        j_sel.map(|j| (i, j, q_i))
    }

    fn solve(mut self, tol: f64, max_iter: usize) -> Solution {
        let mut iterations = 0;
        let mut converged = false;

        while iterations < max_iter {
            let Some((i, j, q_i)) = self.select_working_set(tol) else {
                converged = true;
                break;
            };
            let q_j = self.kernel.row(j);
            iterations += 1;

            let old_ai = self.alpha[i];
            let old_aj = self.alpha[j];

            let quad = match 2.0 - 2.0 * q_i[j] {
                q if q > 0.0 => q,
                _ => TAU,
            };
            let delta = (self.gradient[i] - self.gradient[j]) / quad;
            let sum = old_ai + old_aj;
            let mut ai = old_ai - delta;
            let mut aj = old_aj + delta;

            // 箱制約 [0, 1] と等式制約 ai + aj = sum を両立させる
            if sum > 1.0 {
                if ai > 1.0 {
                    ai = 1.0;
                    aj = sum - 1.0;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > 1.0 {
                if aj > 1.0 {
                    aj = 1.0;
                    ai = sum - 1.0;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }

            self.alpha[i] = ai;
            self.alpha[j] = aj;

            let delta_i = ai - old_ai;
            let delta_j = aj - old_aj;
            for (k, g) in self.gradient.iter_mut().enumerate() {
                *g += q_i[k] * delta_i + q_j[k] * delta_j;
            }
        }

        if !converged {
            warn!(max_iter, "SMO reached the iteration limit before convergence");
        } else {
            debug!(iterations, "SMO converged");
        }

        let rho = self.rho();
        Solution {
            alpha: self.alpha,
            rho,
            iterations,
        }
    }

    /// 自由なサポートベクターの勾配平均。なければ境界値の中点
    fn rho(&self) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free_count = 0usize;

        for (i, &g) in self.gradient.iter().enumerate() {
            if self.is_upper_bound(i) {
                lower = lower.max(g);
            } else if self.is_lower_bound(i) {
                upper = upper.min(g);
            } else {
                free_sum += g;
                free_count += 1;
            }
        }

        if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper + lower) / 2.0
        }
    }
}

/// 学習済み One-Class SVM（サポートベクターのみ保持）
#[derive(Debug, Clone, PartialEq)]
pub struct OneClassSvmModel {
    support_vectors: Array2<f64>,
    dual_coef: Array1<f64>,
    rho: f64,
    gamma: f64,
}

impl OneClassSvmModel {
    pub fn n_support(&self) -> usize {
        self.support_vectors.nrows()
    }

    pub fn support_vectors(&self) -> ArrayView2<'_, f64> {
        self.support_vectors.view()
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// 実際に使用した γ
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// ρ を引く前のカーネル和
    pub fn score_samples(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_feature_count(self.support_vectors.ncols(), x)?;

        Ok(x.rows()
            .into_iter()
            .map(|point| {
                self.support_vectors
                    .rows()
                    .into_iter()
                    .zip(self.dual_coef.iter())
                    .map(|(sv, coef)| coef * rbf(sv, point, self.gamma))
                    .sum::<f64>()
            })
            .collect())
    }
}

impl FittedDetector for OneClassSvmModel {
    fn n_features(&self) -> usize {
        self.support_vectors.ncols()
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        Ok(self.score_samples(x)? - self.rho)
    }

    /// 境界上（f(x) = 0）も外れ値として扱う
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        Ok(self
            .decision_function(x)?
            .iter()
            .map(|&d| if d > 0.0 { Label::Inlier } else { Label::Outlier })
            .collect())
    }
}
