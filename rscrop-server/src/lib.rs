//! HTTP binding of the rscrop analysis pipeline.

pub mod http;
