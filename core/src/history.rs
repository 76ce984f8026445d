//! Time-stamped simulation records.
//!
//! [`StateSpaceData`] is the output collaborator of every pipeline: one record per simulated step
//! holding the time, the estimated (or simulated) state, optionally its covariance, the control
//! applied, and optionally the ground truth. Records are append-only and exported to CSV.
use crate::Result;

use std::path::Path;

use nalgebra::{DMatrix, DVector};

/// Ordered, append-only record of a simulation run.
///
/// `covariance` and `truth` are only populated when the caller supplies them, so they may be shorter
/// than `time` (empty for the open-loop responses, which carry no covariance).
#[derive(Clone, Debug, Default)]
pub struct StateSpaceData {
    /// Simulation time of each record in seconds
    pub time: Vec<f64>,
    /// State vector at each record
    pub state: Vec<DVector<f64>>,
    /// State covariance at each record, when tracked
    pub covariance: Vec<DMatrix<f64>>,
    /// Control input applied at each record
    pub control: Vec<DVector<f64>>,
    /// Ground truth at each record, when known
    pub truth: Vec<DVector<f64>>,
}

/// Alias used by the pipelines for histories that pair an estimate with its ground truth
pub type SimulationHistory = StateSpaceData;

impl StateSpaceData {
    pub fn new() -> Self {
        Self::default()
    }
    /// Append one record.
    pub fn append_step(
        &mut self,
        t: f64,
        x: &DVector<f64>,
        cov: Option<&DMatrix<f64>>,
        u: &DVector<f64>,
        x_truth: Option<&DVector<f64>>,
    ) {
        self.time.push(t);
        self.state.push(x.clone());
        if let Some(cov) = cov {
            self.covariance.push(cov.clone());
        }
        self.control.push(u.clone());
        if let Some(x_truth) = x_truth {
            self.truth.push(x_truth.clone());
        }
    }
    pub fn len(&self) -> usize {
        self.time.len()
    }
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
    /// Writes the history to a CSV file.
    ///
    /// One row per record with columns `t`, `x_i`, `var_i` (covariance diagonal), `u_j`, and
    /// `truth_i`. The covariance and truth columns are only written when every record carries them.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use statespace::state_space::mass_spring_damper_model;
    ///
    /// let ss = mass_spring_damper_model(0.05).unwrap();
    /// let data = ss.step_response(0.05, 200);
    /// data.to_csv("step_response.csv").unwrap();
    /// ```
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        if self.is_empty() {
            writer.flush()?;
            return Ok(());
        }
        let n = self.state[0].len();
        let m = self.control[0].len();
        let with_cov = self.covariance.len() == self.len();
        let with_truth = self.truth.len() == self.len();

        let mut header = vec!["t".to_string()];
        header.extend((0..n).map(|i| format!("x{i}")));
        if with_cov {
            header.extend((0..n).map(|i| format!("var{i}")));
        }
        header.extend((0..m).map(|j| format!("u{j}")));
        if with_truth {
            header.extend((0..self.truth[0].len()).map(|i| format!("truth{i}")));
        }
        writer.write_record(&header)?;

        for k in 0..self.len() {
            let mut row = vec![self.time[k].to_string()];
            row.extend(self.state[k].iter().map(|v| v.to_string()));
            if with_cov {
                row.extend(self.covariance[k].diagonal().iter().map(|v| v.to_string()));
            }
            row.extend(self.control[k].iter().map(|v| v.to_string()));
            if with_truth {
                row.extend(self.truth[k].iter().map(|v| v.to_string()));
            }
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn append_step_records_everything_supplied() {
        let mut data = StateSpaceData::new();
        assert!(data.is_empty());
        data.append_step(
            0.1,
            &DVector::from_vec(vec![0.1, 0.2]),
            Some(&DMatrix::identity(2, 2)),
            &DVector::from_vec(vec![0.3]),
            None,
        );
        assert_eq!(data.len(), 1);
        assert_approx_eq!(data.time[0], 0.1);
        assert_approx_eq!(data.state[0][1], 0.2);
        assert_eq!(data.covariance[0], DMatrix::identity(2, 2));
        assert_approx_eq!(data.control[0][0], 0.3);
        assert!(data.truth.is_empty());
    }

    #[test]
    fn csv_export_writes_one_row_per_record() {
        let mut data = StateSpaceData::new();
        for k in 0..3 {
            let x = DVector::from_vec(vec![k as f64, -(k as f64)]);
            data.append_step(
                k as f64 * 0.5,
                &x,
                Some(&(DMatrix::identity(2, 2) * 2.0)),
                &DVector::from_vec(vec![1.0]),
                Some(&x),
            );
        }
        let path = std::env::temp_dir().join("statespace_history_export.csv");
        data.to_csv(&path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["t", "x0", "x1", "var0", "var1", "u0", "truth0", "truth1"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][1].parse::<f64>().unwrap(), 2.0);
        assert_eq!(rows[2][3].parse::<f64>().unwrap(), 2.0);
        std::fs::remove_file(&path).unwrap();
    }
}
