use crate::ui;
use catalog_diff::filters::AVAILABLE;

/// Print the post-filters `--filter` accepts
pub fn run() {
    ui::info("Available filters:");
    for name in AVAILABLE {
        println!("  {name}");
    }
}
