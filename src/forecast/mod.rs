//! Weather-to-power forecasting pipeline

pub mod analyzer;
pub mod cache;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod normalizer;
pub mod resample;
pub mod schedule;
pub mod solar;
pub mod summary;
pub mod weather;

pub use analyzer::{AnalyzerConfig, TimeSeriesAnalyzer};
pub use cache::{CacheStats, ForecastCache};
pub use engine::ForecastPipeline;
pub use error::{ForecastError, ForecastResult};
pub use estimator::{
    ClearSkyModelParams, ClearSkyPowerModel, ModelConfig, ModelInputs, PowerEstimator, PowerModel,
    WindTurbineParams, WindTurbinePowerModel,
};
pub use normalizer::{ForecastNormalizer, NormalizerConfig, UnknownCodePolicy};
pub use resample::{NormalizedSeries, Resampler};
pub use schedule::{Clock, IssuanceSchedule, SystemClock};
pub use solar::SolarPosition;
pub use summary::{summarize_daily, DailyEnergy};
pub use weather::{KmaClient, WeatherSource};
