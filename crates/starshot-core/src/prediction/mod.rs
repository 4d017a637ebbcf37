//! Remote predictions: data model, API client, poller, and the generator
//! that ties them together.

pub(crate) mod api;
pub(crate) mod generator;
pub(crate) mod poller;
pub(crate) mod types;

pub use api::{resolve_env_var, PredictionApi, ReplicateClient};
pub use generator::{Generator, GENERATION_RETRY};
pub use poller::{PollPolicy, Poller};
pub use types::{
    ImageInput, ModelRef, Prediction, PredictionInput, PredictionOutput, PredictionStatus,
};
