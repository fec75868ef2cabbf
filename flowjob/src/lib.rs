mod actors;
pub mod client;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod events;
pub mod identity;
pub mod local;
pub mod monitor;
pub mod registry;
pub mod remote;
pub mod spec;
pub mod termination;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{ClusterClient, JobHandle, JobHandleRef, JobRecord};
pub use config::{MonitorConfig, ServiceEnv};
pub use controller::JobController;
pub use environment::{BasicEnvironment, Environment};
pub use error::{Error, FailureKind};
pub use events::{JobState, JobStatus};
pub use identity::JobCoordinate;
pub use local::{LocalCluster, LocalJobHandle};
pub use remote::RemoteCluster;
pub use spec::{CodePackage, JobSpec, LaunchRequest, Resources};
