//! Application-productivity classification: LLM suggestions, dynamic
//! auto-approval thresholds and the human review queue.

pub mod classifier;
pub mod service;
pub mod store;
pub mod threshold;
pub mod types;

pub use classifier::AppClassifier;
pub use service::{ClassificationService, ManualRuleRequest, USAGE_WINDOW_DAYS};
pub use store::ClassificationStore;
pub use threshold::ThresholdPolicy;
pub use types::*;
