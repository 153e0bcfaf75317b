//! Sensor input, frame types and configuration.
//!
//! The sensor driver is an external collaborator; this module defines the
//! boundary it must satisfy and ships a mock implementation that replays
//! injected frames or synthesizes a scene, so the pipeline runs without
//! hardware.

mod config;
mod frame;
mod mock;
mod sensor;
mod synthetic;

pub use config::{ConfigError, FileConfig, OutputConfig, PipelineConfig, SyntheticSensorConfig};
pub use frame::{
    ColorFrame, DepthFrame, Stream, Timestamp, COLOR_BYTES_PER_PIXEL, COLOR_HEIGHT, COLOR_WIDTH,
    DEPTH_HEIGHT, DEPTH_WIDTH,
};
pub use mock::{MockSensor, MockSensorHandle};
pub use sensor::{MultiSourceFrame, SensorDriver, SensorError, SensorReader, SourceSelection};
pub use synthetic::SyntheticScene;
