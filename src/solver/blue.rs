use crate::analysis::ErrorBreakdown;
use crate::combination::Blue;
use crate::config::Config;
use crate::covariance::CovarianceSet;
use crate::error::Result;
use crate::model::DataModel;
use crate::types::Vector;

use super::Solver;

/// The closed-form GLS combination behind the [`Solver`] interface.
#[derive(Debug, Clone)]
pub struct BlueSolver<'a> {
    model: &'a DataModel,
    covariances: &'a CovarianceSet,
    config: &'a Config,
    fit: Option<(Blue, Vector)>,
}

impl<'a> BlueSolver<'a> {
    /// Solver over a model and its covariance snapshot.
    pub fn new(model: &'a DataModel, covariances: &'a CovarianceSet, config: &'a Config) -> Self {
        Self {
            model,
            covariances,
            config,
            fit: None,
        }
    }

    /// The combination, once solved.
    pub fn blue(&self) -> Option<&Blue> {
        self.fit.as_ref().map(|(blue, _)| blue)
    }
}

impl Solver for BlueSolver<'_> {
    fn solve(&mut self) -> Result<()> {
        let blue = Blue::compute(self.model, self.covariances, self.config)?;
        let errors = ErrorBreakdown::compute(&blue, self.covariances, self.config).total_errors();
        self.fit = Some((blue, errors));
        Ok(())
    }

    fn parameter_names(&self) -> Vec<String> {
        self.model.group_matrix().labels().to_vec()
    }

    fn parameters(&self) -> Option<Vector> {
        self.fit.as_ref().map(|(blue, _)| blue.averages().clone())
    }

    fn parameter_errors(&self) -> Option<Vector> {
        self.fit.as_ref().map(|(_, errors)| errors.clone())
    }

    fn chisq(&self) -> Option<f64> {
        self.fit.as_ref().map(|(blue, _)| blue.chisq())
    }

    fn ndof(&self) -> usize {
        self.model.len().saturating_sub(self.model.group_matrix().n_groups())
    }
}
