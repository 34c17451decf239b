mod generate;
mod health;
mod stats;

pub use generate::{PROMPT_FIELD, generate};
pub use health::{health_check, root};
pub use stats::rate_limit_stats;
