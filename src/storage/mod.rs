pub mod blobs;
pub mod catalog;
pub mod error;
pub mod status;
