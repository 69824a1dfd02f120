//! Prompt templates.
//!
//! A template is plain text with placeholders: `%t` (local time), `%u` (user),
//! `%h` (host) and `%w` (basename of the working directory).

use chrono::Local;
use std::env;
use std::fs;

pub const DEFAULT_PROMPT: &str = "slsh> ";

/// Predefined templates, selectable by name with `config set prompt <style>`.
pub const STYLES: &[(&str, &str)] = &[
    ("simple", DEFAULT_PROMPT),
    ("timed", "[%t] slsh> "),
    ("user", "%u@slsh> "),
    ("full", "[%t] %u@%h:%w slsh> "),
    ("minimal", "> "),
    ("color", "\x1b[32mslsh\x1b[0m> "),
];

pub fn style(name: &str) -> Option<&'static str> {
    STYLES
        .iter()
        .find(|(style, _)| *style == name)
        .map(|(_, template)| *template)
}

/// Expands every placeholder in `template`. An empty template renders the
/// default prompt.
pub fn render(template: &str) -> String {
    if template.is_empty() {
        return DEFAULT_PROMPT.to_string();
    }

    let mut prompt = template.to_string();
    if prompt.contains("%t") {
        prompt = prompt.replace("%t", &Local::now().format("%H:%M:%S").to_string());
    }
    if prompt.contains("%u") {
        prompt = prompt.replace("%u", &user());
    }
    if prompt.contains("%h") {
        prompt = prompt.replace("%h", &hostname());
    }
    if prompt.contains("%w") {
        prompt = prompt.replace("%w", &cwd_name());
    }
    prompt
}

fn user() -> String {
    env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn hostname() -> String {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn cwd_name() -> String {
    env::current_dir()
        .ok()
        .and_then(|dir| {
            dir.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .or_else(|| Some(dir.display().to_string()))
        })
        .unwrap_or_else(|| "unknown".to_string())
}
