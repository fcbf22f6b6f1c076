use super::{DescribeError, Describer};
use std::path::Path;

/// Used when `vision.enabled = false`: the pipeline runs end to end without
/// credentials and every scene gets a fixed placeholder.
pub struct NoopDescriber;

pub const PLACEHOLDER: &str = "Description unavailable (vision service disabled).";

impl Describer for NoopDescriber {
    fn describe(&self, _prompt: &str, _images: &[&Path]) -> Result<String, DescribeError> {
        Ok(PLACEHOLDER.to_string())
    }

    fn name(&self) -> &str {
        "noop"
    }
}
