#[macro_use]
extern crate log;

pub mod app;
pub mod blockfeed;
pub mod config;
pub mod diff;
pub mod error;
pub mod estimator;
pub mod kinematics;
pub mod pipeline;
pub mod pubsub;
pub mod recommend;
pub mod rpc;
pub mod types;
pub mod velocity;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
pub use estimator::{Estimator, Update};
