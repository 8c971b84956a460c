//! Safety boundary shared by every tool: path containment, execution limits,
//! network/database gates and secret scrubbing.

mod gates;
mod limits;
mod paths;
mod scrub;

pub use gates::check_gates;
pub use limits::{StoppingCriterion, TRUNCATION_MARKER, TargetNumber, stopping_criterion, truncate};
pub use paths::{WorkspacePaths, safe_relpath};
pub use scrub::SecretScrubber;
