//! Bulk, concurrent transfers between a local directory and an s3 bucket.
//!
//! The heart of the crate is [`Dispatcher`], which drives any [`Transferable`] over
//! a work list with a bounded number of workers and aggregates the per-item
//! outcomes into a [`DispatchResult`]. [`S3Download`] and [`S3Upload`] are the two
//! backends, [`worklist`] builds their work lists and [`report`] turns results into
//! console output.

#![forbid(unsafe_code)]

pub mod backend;
pub mod dispatch;
pub mod progress;
pub mod report;
pub mod worklist;

pub use crate::backend::{S3Download, S3Upload, Transferable};
pub use crate::dispatch::{
    Completion, DispatchConfig, DispatchResult, Dispatcher, TransferError,
    TransferOutcome, DEFAULT_ITEM_TIMEOUT, DEFAULT_MAX_WORKERS,
};
pub use crate::progress::{ProgressState, ProgressTracker};
