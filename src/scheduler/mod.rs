pub mod join;
pub mod ledger;
pub mod metrics;
pub mod naming;
pub mod orchestrator;
pub mod pools;
pub mod queue;
pub mod report;
pub mod retry;
pub mod sequential;
pub mod types;


pub use join::*;
pub use ledger::*;
pub use metrics::*;
pub use naming::*;
pub use orchestrator::*;
pub use pools::*;
pub use queue::*;
pub use report::*;
pub use retry::*;
pub use sequential::*;
pub use types::*;
