//! Least-squares problems and the `levenberg-marquardt` backend that solves
//! them.

use levenberg_marquardt::LevenbergMarquardt;
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

/// Residual model minimised by [`solve_lm`].
pub trait NllsProblem {
    fn num_params(&self) -> usize;

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of [`NllsProblem::residuals`]. The default uses central
    /// differences.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let r0 = self.residuals(x);
        let mut j = DMatrix::zeros(r0.len(), x.len());
        let mut xp = x.clone();
        for col in 0..x.len() {
            let h = 1e-6 * (1.0 + x[col].abs());
            xp[col] = x[col] + h;
            let rp = self.residuals(&xp);
            xp[col] = x[col] - h;
            let rm = self.residuals(&xp);
            xp[col] = x[col];
            j.set_column(col, &((rp - rm) / (2.0 * h)));
        }
        j
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    /// Budget of `max_iterations * (num_params + 1)` residual evaluations.
    pub max_iterations: usize,
    /// Relative tolerance on both the parameter step and the cost decrease.
    pub epsilon: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            epsilon: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    /// Sum of squared residuals at the starting point.
    pub initial_cost: f64,
    pub final_cost: f64,
    pub num_residuals: usize,
    pub converged: bool,
    /// Why the solver stopped.
    pub termination: String,
}

impl SolveReport {
    /// Root mean square over residual pairs, i.e. per 2D observation.
    pub fn rms(&self, cost: f64) -> f64 {
        let observations = (self.num_residuals / 2).max(1);
        (cost / observations as f64).sqrt()
    }

    pub fn initial_rms(&self) -> f64 {
        self.rms(self.initial_cost)
    }

    pub fn final_rms(&self) -> f64 {
        self.rms(self.final_cost)
    }
}

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> levenberg_marquardt::LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.problem.jacobian(&self.params))
    }
}

/// Minimise `|r(x)|^2` starting at `x0`.
///
/// Parameters whose Jacobian column is identically zero stay put, which is
/// how callers hold parameters fixed.
pub fn solve_lm<P: NllsProblem>(
    problem: &P,
    x0: DVector<f64>,
    options: &SolveOptions,
) -> (DVector<f64>, SolveReport) {
    let r0 = problem.residuals(&x0);
    let initial_cost = r0.norm_squared();
    let num_residuals = r0.len();

    let tol = options.epsilon.max(0.0);
    let lm = LevenbergMarquardt::new()
        .with_ftol(tol)
        .with_xtol(tol)
        .with_gtol(0.0)
        .with_patience(options.max_iterations.max(1));

    let wrapper = LmWrapper {
        problem,
        params: x0,
    };
    let (wrapper, report) = lm.minimize(wrapper);
    debug!(
        "lm stopped after {} evaluations: {:?}",
        report.number_of_evaluations, report.termination
    );

    // the crate's objective is half the squared norm
    let final_cost = if num_residuals == 0 {
        initial_cost
    } else {
        2.0 * report.objective_function
    };
    let solve_report = SolveReport {
        iterations: report.number_of_evaluations,
        initial_cost,
        final_cost,
        num_residuals,
        converged: report.termination.was_successful(),
        termination: format!("{:?}", report.termination),
    };
    (wrapper.params, solve_report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Fit `y = a * exp(b * t)`.
    struct ExpFit {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl NllsProblem for ExpFit {
        fn num_params(&self) -> usize {
            2
        }

        fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.t.len(),
                self.t
                    .iter()
                    .zip(&self.y)
                    .map(|(t, y)| x[0] * (x[1] * t).exp() - y),
            )
        }
    }

    struct Rosenbrock;

    impl NllsProblem for Rosenbrock {
        fn num_params(&self) -> usize {
            2
        }

        fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![1.0 - x[0], 10.0 * (x[1] - x[0] * x[0])])
        }
    }

    /// `x[1]` has no effect on the residuals.
    struct HalfFixed;

    impl NllsProblem for HalfFixed {
        fn num_params(&self) -> usize {
            2
        }

        fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![x[0] - 3.0, 2.0 * (x[0] - 3.0)])
        }
    }

    #[test]
    fn fits_exponential() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|t| 2.5 * (-1.3 * t).exp()).collect();
        let problem = ExpFit { t, y };

        let (x, report) = solve_lm(&problem, DVector::from_vec(vec![1.0, 0.0]), &SolveOptions::default());
        assert_relative_eq!(x[0], 2.5, epsilon = 1e-6);
        assert_relative_eq!(x[1], -1.3, epsilon = 1e-6);
        assert!(report.converged, "{}", report.termination);
        assert!(report.final_cost < report.initial_cost);
        assert!(report.iterations > 0);
    }

    #[test]
    fn solves_rosenbrock() {
        let (x, report) = solve_lm(
            &Rosenbrock,
            DVector::from_vec(vec![-1.2, 1.0]),
            &SolveOptions {
                max_iterations: 200,
                epsilon: 1e-14,
            },
        );
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-5);
        assert!(report.final_cost < 1e-10);
    }

    #[test]
    fn evaluation_count_is_bounded() {
        let (_, report) = solve_lm(
            &Rosenbrock,
            DVector::from_vec(vec![-1.2, 1.0]),
            &SolveOptions {
                max_iterations: 3,
                epsilon: 0.0,
            },
        );
        assert!(report.iterations <= 3 * (2 + 1), "{}", report.iterations);
    }

    #[test]
    fn zero_jacobian_column_stays_put() {
        let (x, report) = solve_lm(&HalfFixed, DVector::from_vec(vec![0.0, 7.0]), &SolveOptions::default());
        assert_relative_eq!(x[0], 3.0, epsilon = 1e-8);
        assert_relative_eq!(x[1], 7.0);
        assert!(report.final_rms() < 1e-8);
    }
}
