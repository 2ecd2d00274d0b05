//! Progress bars for transfers.

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{wide_bar}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} {bytes} ({bytes_per_sec})";

/// Create a byte progress bar for a transfer of `total` bytes.
///
/// A total of 0 means the size is unknown; a spinner with a running byte
/// count is shown instead. With `visible` false the bar draws nothing but
/// still counts.
pub fn transfer_bar(total: u64, label: &str, visible: bool) -> ProgressBar {
    let bar = if !visible {
        ProgressBar::hidden()
    } else if total == 0 {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::new(total)
    };

    if total > 0 {
        bar.set_length(total);
    }

    let template = if total == 0 { SPINNER_TEMPLATE } else { BAR_TEMPLATE };
    match ProgressStyle::with_template(template) {
        Ok(style) => bar.set_style(style.progress_chars("=> ")),
        Err(e) => tracing::debug!("Invalid progress template: {}", e),
    }

    bar.set_message(label.to_string());
    bar
}
