//! Non-negative least squares
//!
//! Lawson–Hanson active-set method: repeatedly free the variable whose gradient
//! most reduces the residual, solve the unconstrained problem on the free set,
//! and step back towards the previous iterate whenever that solution leaves the
//! feasible region.

use linfa_linalg::{cholesky::Cholesky, triangular::SolveTriangular, triangular::UPLO};
use ndarray::{Array1, Array2, ArrayView2, Axis};

const GRADIENT_TOLERANCE: f64 = 1e-10;
const ZERO_TOLERANCE: f64 = 1e-12;

/// Minimise `‖a·x − b‖²` subject to `x ≥ 0`.
pub fn nnls(a: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let k = a.ncols();
    let mut x = Array1::<f64>::zeros(k);
    if k == 0 || a.nrows() != b.len() {
        return x;
    }
    let mut free = vec![false; k];
    let max_iter = 30 * k;

    for _ in 0..max_iter {
        let residual = b - &a.dot(&x);
        let gradient = a.t().dot(&residual);

        let entering = (0..k)
            .filter(|&j| !free[j] && gradient[j] > GRADIENT_TOLERANCE)
            .max_by(|&i, &j| gradient[i].total_cmp(&gradient[j]));
        let Some(entering) = entering else {
            break;
        };
        free[entering] = true;

        for _ in 0..max_iter {
            let indices: Vec<usize> = (0..k).filter(|&j| free[j]).collect();
            let Some(solution) = least_squares(a.select(Axis(1), &indices).view(), b) else {
                tracing::trace!("Singular normal equations on {} columns", indices.len());
                break;
            };

            if solution.iter().all(|v| *v >= 0.0) {
                for (&j, &value) in indices.iter().zip(solution.iter()) {
                    x[j] = value;
                }
                break;
            }

            // Largest step towards the solution that keeps every variable feasible
            let alpha = indices
                .iter()
                .zip(solution.iter())
                .filter(|&(&j, &s)| s <= 0.0 && x[j] > 0.0)
                .map(|(&j, &s)| x[j] / (x[j] - s))
                .fold(1.0, f64::min);

            for (&j, &s) in indices.iter().zip(solution.iter()) {
                x[j] += alpha * (s - x[j]);
                if x[j] <= ZERO_TOLERANCE {
                    free[j] = false;
                    x[j] = 0.0;
                }
            }
        }
    }
    x.mapv_inplace(|v| v.max(0.0));
    x
}

/// Unconstrained least squares through the normal equations.
fn least_squares(a: ArrayView2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let ata = a.t().dot(&a);
    let atb = a.t().dot(b).insert_axis(Axis(1));
    let l = ata.cholesky().ok()?;
    let y = l.solve_triangular(&atb, UPLO::Lower).ok()?;
    let z = l.t().solve_triangular(&y, UPLO::Upper).ok()?;
    let solution = z.column(0).to_owned();
    solution.iter().all(|v| v.is_finite()).then_some(solution)
}
