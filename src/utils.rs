use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// 总数未知时使用，只显示处理速度
pub fn pb_style_speed() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos} ({per_sec}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn new_progress_bar(len: Option<u64>) -> ProgressBar {
    let pb = match len {
        Some(len) => ProgressBar::new(len).with_style(pb_style()),
        None => ProgressBar::no_length().with_style(pb_style_speed()),
    };
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}
