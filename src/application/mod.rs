// Application layer - use cases and orchestration over the domain ledger,
// storage, and the host's payment mechanism.

pub mod error;
pub mod payment;
pub mod service;

pub use error::*;
pub use payment::*;
pub use service::*;
