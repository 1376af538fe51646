//! Decoded probe data: temperatures, predictions, sessions and logs.

pub mod instant_read;
pub mod log;
pub mod prediction;
pub mod session;
pub mod temperatures;

pub use instant_read::InstantReadFilter;
pub use log::{LoggedProbeDataPoint, ProbeTemperatureLog};
pub use prediction::{
    PredictionInfo, PredictionLog, PredictionMode, PredictionState, PredictionStatus,
    PredictionType,
};
pub use session::SessionInformation;
pub use temperatures::{
    ProbeTemperatures, RawTemperature, VirtualSensors, VirtualTemperatures,
};
