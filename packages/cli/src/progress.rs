//! Terminal progress and logging.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use listing_enrich_pipeline::progress::ProgressCallback;

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} [{elapsed}]";
const BAR_TEMPLATE: &str =
    "{msg} {bar:40.green/dim} {pos}/{len} listings ({per_sec}, eta {eta})";

/// Reports batch progress on a terminal bar.
///
/// Spins while the listing count is unknown and becomes a bar once
/// [`ProgressCallback::set_total`] is called.
pub struct IndicatifProgress {
    bar: ProgressBar,
    counted: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds a listings bar to `multi`.
    #[must_use]
    pub fn listings_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let spinning = ProgressStyle::with_template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let counted = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let bar = multi.add(ProgressBar::new_spinner().with_style(spinning));
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));

        Arc::new(Self { bar, counted })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.counted.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` (configured by `RUST_LOG`) behind
/// `indicatif-log-bridge`, so log output and progress bars share the
/// terminal without tearing.
///
/// Returns the [`MultiProgress`] every bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();
    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let max_level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}
