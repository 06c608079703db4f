//! 循环守卫：重复调用抑制、连续失败截断与失败分类

pub mod classify;
pub mod loop_guard;

pub use classify::{categorize, ErrorCategory, ErrorClassifier, KeywordClassifier, KeywordRule};
pub use loop_guard::{CallSignature, FailureOutcome, GuardConfig, GuardVerdict, LoopGuard};
