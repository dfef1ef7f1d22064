pub mod normalizer;
pub mod payload;
pub mod worker;

pub use normalizer::{process_payload, NormalizeOutcome};
pub use payload::{parse_payload, Dialect, NormalizedBatch, ParseError, RawSwap};
pub use worker::{run_ingestion_worker, IngestionConfig};
