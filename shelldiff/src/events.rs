use std::{collections::HashSet, fmt::Display};

use shelldiff_harness::trace_categories;
use tracing_subscriber::{
    Layer, filter::Targets, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Type of event to trace.
#[derive(Clone, Debug, Eq, Hash, PartialEq, clap::ValueEnum)]
pub enum TraceEvent {
    /// Traces spawning, timing out, and killing shell processes.
    #[clap(name = "process")]
    Process,
    /// Traces output normalization and prompt discovery.
    #[clap(name = "normalize")]
    Normalize,
    /// Traces staging and snapshot directory management.
    #[clap(name = "workspace")]
    Workspace,
    /// Traces the resource-safety check.
    #[clap(name = "safety")]
    Safety,
    /// Traces loading and sequencing of test categories.
    #[clap(name = "suite")]
    Suite,
}

impl Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.target())
    }
}

impl TraceEvent {
    const fn target(&self) -> &'static str {
        match self {
            Self::Process => trace_categories::PROCESS,
            Self::Normalize => trace_categories::NORMALIZE,
            Self::Workspace => trace_categories::WORKSPACE,
            Self::Safety => trace_categories::SAFETY,
            Self::Suite => trace_categories::SUITE,
        }
    }
}

/// Installs the global tracing subscriber, writing to stderr.
///
/// Everything at `WARN` and above is shown; the given events are additionally shown down to
/// `DEBUG`.
pub(crate) fn init(enabled_log_events: &[TraceEvent]) {
    let enabled: HashSet<&TraceEvent> = enabled_log_events.iter().collect();

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_filter(compose_filter(&enabled));

    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        // Something went wrong; proceed on anyway but complain audibly.
        eprintln!("warning: failed to initialize tracing.");
    }
}

fn compose_filter(enabled: &HashSet<&TraceEvent>) -> Targets {
    Targets::new()
        .with_default(tracing_subscriber::filter::LevelFilter::WARN)
        .with_targets(
            enabled
                .iter()
                .map(|event| (event.target(), tracing::Level::DEBUG)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn enabled_events_are_raised_to_debug() {
        let enabled: HashSet<&TraceEvent> = [&TraceEvent::Safety].into_iter().collect();
        let filter = compose_filter(&enabled);

        assert!(filter.would_enable(trace_categories::SAFETY, &tracing::Level::DEBUG));
        assert!(!filter.would_enable(trace_categories::PROCESS, &tracing::Level::DEBUG));
        assert!(filter.would_enable(trace_categories::PROCESS, &tracing::Level::WARN));
        assert!(!filter.would_enable("anything", &tracing::Level::INFO));
        assert_eq!(filter.default_level(), Some(LevelFilter::WARN));
    }

    #[test]
    fn display_matches_target() {
        assert_eq!(TraceEvent::Workspace.to_string(), "workspace");
    }
}
