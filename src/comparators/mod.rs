pub mod moss;
pub mod script;
pub mod traits;

use clap::ValueEnum;
use std::path::Path;

pub use moss::MossClient;
pub use script::MossScript;
pub use traits::{CompareError, CompareOptions, Comparator, ComparisonInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EngineKind {
    /// Talk to the hosted MOSS server directly
    #[default]
    Service,
    /// Run a local copy of the `moss` submission script
    Script,
}

/// Build the comparison engine selected on the command line.
pub fn build_comparator(
    kind: EngineKind,
    moss_id: &str,
    server: &str,
    script: &Path,
) -> Box<dyn Comparator> {
    match kind {
        EngineKind::Service => Box::new(MossClient::new(moss_id, server)),
        EngineKind::Script => Box::new(MossScript::new(script)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_comparator_by_kind() {
        let service = build_comparator(
            EngineKind::Service,
            "1",
            "moss.stanford.edu:7690",
            Path::new("moss"),
        );
        assert_eq!(service.name(), "MOSS service");

        let script = build_comparator(EngineKind::Script, "1", "unused", Path::new("moss"));
        assert_eq!(script.name(), "MOSS script");
    }
}
