use thiserror::Error;

use crate::domain::{ForecastVariable, RawUnit};

/// Failures of a forecast pipeline run.
///
/// `Clone` because one single-flight result is handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ForecastError {
    #[error("unknown {variable} category code '{code}'")]
    UnknownCategoryCode {
        variable: ForecastVariable,
        code: String,
    },

    #[error("{variable} cannot be given as {unit} ({value})")]
    UnitMismatch {
        variable: ForecastVariable,
        unit: RawUnit,
        value: String,
    },

    #[error("{variable} has {samples} usable samples, at least 2 are required")]
    InsufficientData {
        variable: ForecastVariable,
        samples: usize,
    },

    #[error("forecast variables share no common time span")]
    DisjointHorizon,

    #[error("no power estimates to analyze")]
    EmptySeries,

    #[error("weather source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("forecast run aborted: {0}")]
    PipelineAborted(String),
}

pub type ForecastResult<T> = Result<T, ForecastError>;
