//! Log output for the `glossary` command.
//!
//! What gets logged:
//!
//! - publish lifecycle events from [`crate::obs`] (`publish.started`,
//!   `publish.wipe_soft_failure`, `publish.finished`, ...) inside a
//!   `glossary.publish` span that carries the glossary id
//! - audit writes (`audit.recorded`), and audit failures as warnings
//! - proposal files written for review
//! - catalog HTTP requests and polled operations, at debug
//!
//! Everything goes to stderr; stdout carries only command output such as
//! plans and summaries. `--verbose` lowers the glossary crates to debug,
//! `--json` switches to one JSON object per line, and `RUST_LOG` replaces
//! the default filter entirely. HTTP stack crates stay at `warn` unless
//! `RUST_LOG` says otherwise.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose logs follow the command's verbosity.
const GLOSSARY_TARGETS: &[&str] = &["glossary", "glossary_core", "catalog_client"];

/// Filter used when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        GLOSSARY_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str().to_ascii_lowercase())),
    );
    directives.join(",")
}

/// Install the global subscriber. Only the first call in a process has
/// any effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_verbosity_to_glossary_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,glossary=debug,glossary_core=debug,catalog_client=debug"
        );
        assert!(default_directives(Level::INFO).parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still alive");
    }
}
