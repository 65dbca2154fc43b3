//! KSeF gateway access: transport seam, error taxonomy, invoice metadata
//! retrieval and typed access to the returned records.

pub mod error;
pub mod query;
pub mod record;
pub mod retriever;
pub mod transport;

pub use error::KsefError;
pub use record::RawRecord;
pub use retriever::{ChunkedFetch, EmptyStreakPolicy, Retriever, RetrieverConfig};
pub use transport::{GatewayTransport, HttpTransport};
