use crate::script::Caption;
use crate::utils::ensure_parent_dir;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub fn write_srt(path: &Path, captions: &[Caption]) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    let mut f = BufWriter::new(File::create(path)?);
    for (i, caption) in captions.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(
            f,
            "{} --> {}",
            format_srt_time(caption.start),
            format_srt_time(caption.end)
        )?;
        for line in wrap_text(&caption.text, 80) {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)?;
    }
    f.flush()?;
    Ok(())
}

fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Greedy word wrap; `width` counts characters, not bytes.
pub fn wrap_text(s: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in s.split_whitespace() {
        let word_len = word.chars().count();
        if current_len + word_len + 1 > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        } else {
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
