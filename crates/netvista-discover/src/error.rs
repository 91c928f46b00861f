//! Error types for the netvista-discover crate.

use thiserror::Error;

use netvista_core::types::{JobId, JobStatus, SubnetId};

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid CIDR: {cidr}")]
    InvalidCidr { cidr: String },

    #[error("Subnet {subnet} already has a running scan (job {job})")]
    AlreadyRunning { subnet: SubnetId, job: JobId },

    #[error("Unknown subnet: {0}")]
    InvalidSubnet(SubnetId),

    #[error("No such scan job: {0}")]
    JobNotFound(JobId),

    #[error("Job {job} is already terminal ({status:?})")]
    AlreadyTerminal { job: JobId, status: JobStatus },

    #[error("Job aborted: {0}")]
    JobAborted(String),

    #[error("Inventory error: {0}")]
    Inventory(#[from] netvista_inventory::InventoryError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
