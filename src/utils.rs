use std::sync::OnceLock;

use indicatif::ProgressStyle;
use regex::Regex;
use ureq::{Agent, AgentBuilder};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.3";

pub fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {pos}/{len} {percent}% {msg}")
        .expect("hardcoded")
}

pub fn agent() -> Agent {
    AgentBuilder::new().user_agent(USER_AGENT).build()
}

/// Capitalises the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_alpha {
                output.extend(c.to_lowercase());
            } else {
                output.extend(c.to_uppercase());
            }
            previous_alpha = true;
        } else {
            output.push(c);
            previous_alpha = false;
        }
    }
    output
}

/// Lowercased with everything outside `a-z` dropped, spaces included.
pub fn slug(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|x| x.is_ascii_lowercase())
        .collect()
}

pub fn first_number(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\d+").expect("hardcoded"));
    re.find(text)?.as_str().parse().ok()
}

pub fn first_letters(text: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[a-zA-Z]+").expect("hardcoded"));
    Some(re.find(text)?.as_str())
}

pub fn collapse_whitespace(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\s+").expect("hardcoded"));
    re.replace_all(text, " ").trim().to_string()
}
