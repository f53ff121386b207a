//! Comparison of predicted and expected class tensors.

use ndarray::{ArrayView1, ArrayView3, Axis};
use std::fmt;
use ufcnn_core::{Error, Label, Result};

/// Per-row error and class agreement over a prediction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionReport {
    /// Number of `(sample, time)` rows compared.
    pub rows: usize,
    /// Summed squared error per row, averaged over rows.
    pub mean_squared_error: f64,
    /// Rows where the arg-max classes agree.
    pub correct: usize,
    /// Arg-max counts of the prediction, per class.
    pub predicted_counts: Vec<usize>,
    /// Arg-max counts of the target, per class.
    pub expected_counts: Vec<usize>,
}

impl PredictionReport {
    /// Fraction of rows with the right class.
    pub fn accuracy(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.correct as f64 / self.rows as f64
        }
    }
}

impl fmt::Display for PredictionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total MSE error: {:.6}", self.mean_squared_error)?;
        writeln!(f, "Correct class assignment: {:6} / {:7}", self.correct, self.rows)?;
        for (class, (predicted, expected)) in self.predicted_counts.iter().zip(&self.expected_counts).enumerate() {
            match Label::from_index(class).filter(|_| self.predicted_counts.len() == Label::COUNT) {
                Some(label) => writeln!(f, "Predicted {:>4} {predicted:6} / {expected:7}", label.name())?,
                None => writeln!(f, "Predicted {predicted:6} / {expected:7}")?,
            }
        }
        Ok(())
    }
}

fn argmax(row: ArrayView1<'_, f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}

/// Compare expected `y` with predicted `yp`, both `(samples, time, classes)`.
pub fn check_prediction(y: ArrayView3<'_, f64>, yp: ArrayView3<'_, f64>) -> Result<PredictionReport> {
    if y.dim() != yp.dim() {
        return Err(Error::shape(format!(
            "expected shape {:?} differs from predicted shape {:?}",
            y.dim(),
            yp.dim()
        )));
    }
    let classes = y.len_of(Axis(2));
    let mut report = PredictionReport {
        predicted_counts: vec![0; classes],
        expected_counts: vec![0; classes],
        ..Default::default()
    };
    if classes == 0 {
        return Ok(report);
    }

    let mut total_error = 0.0;
    for (expected, predicted) in y.rows().into_iter().zip(yp.rows()) {
        total_error += expected
            .iter()
            .zip(predicted.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>();

        let e = argmax(expected);
        let p = argmax(predicted);
        if e == p {
            report.correct += 1;
        }
        report.expected_counts[e] += 1;
        report.predicted_counts[p] += 1;
        report.rows += 1;
    }
    if report.rows > 0 {
        report.mean_squared_error = total_error / report.rows as f64;
    }
    Ok(report)
}
