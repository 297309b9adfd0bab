//! Rule-based bomber used as training opponent and as the policy of last
//! resort when no trainable backend is configured.

mod fallback;

pub use fallback::FallbackPolicy;
