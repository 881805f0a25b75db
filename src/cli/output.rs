use colored::Colorize;
use serde::Serialize;

use crate::client::TokenStatus;
use crate::error::LookupError;
use crate::types::{CustomValue, FetchAttempt, LocationDetail, LocationSummary, Lookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Pretty,
    Json,
}

impl OutputMode {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Pretty
        }
    }
}

fn paint(text: &str, is_tty: bool, style: fn(&str) -> colored::ColoredString) -> String {
    if is_tty {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

pub fn render_locations(lookup: &Lookup<Vec<LocationSummary>>, is_tty: bool) -> String {
    if lookup.data.is_empty() {
        return paint("No locations found.", is_tty, |s| s.dimmed());
    }
    let mut out = String::new();
    for loc in &lookup.data {
        let place: Vec<&str> = [&loc.city, &loc.state, &loc.country]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .collect();
        out.push_str(&format!(
            "{}  {}",
            paint(&loc.id, is_tty, |s| s.cyan()),
            paint(&loc.name, is_tty, |s| s.bold())
        ));
        if !place.is_empty() {
            out.push_str(&format!("  ({})", place.join(", ")));
        }
        out.push('\n');
    }
    out
}

pub fn render_location(lookup: &Lookup<Option<LocationDetail>>, is_tty: bool) -> String {
    let Some(loc) = &lookup.data else {
        return paint("Location returned no data.", is_tty, |s| s.dimmed());
    };
    let mut out = format!(
        "{} {}\n",
        paint(&loc.name, is_tty, |s| s.bold()),
        paint(&format!("[{}]", loc.id), is_tty, |s| s.cyan())
    );
    let fields = [
        ("Email", &loc.email),
        ("Phone", &loc.phone),
        ("Website", &loc.website),
        ("Timezone", &loc.timezone),
        ("Address", &loc.address),
        ("City", &loc.city),
        ("State", &loc.state),
        ("Postal code", &loc.postal_code),
        ("Country", &loc.country),
    ];
    for (label, value) in fields {
        if let Some(v) = value {
            out.push_str(&format!("  {}: {v}\n", paint(label, is_tty, |s| s.dimmed())));
        }
    }
    out
}

pub fn render_custom_values(lookup: &Lookup<Vec<CustomValue>>, is_tty: bool) -> String {
    if lookup.data.is_empty() {
        let mut out = paint(
            "No custom values found. Endpoints tried:",
            is_tty,
            |s| s.yellow(),
        );
        out.push('\n');
        out.push_str(&render_trail(&lookup.attempts, is_tty));
        return out;
    }
    let mut out = String::new();
    for cv in &lookup.data {
        out.push_str(&format!(
            "{} = {}",
            paint(&cv.name, is_tty, |s| s.bold()),
            cv.value
        ));
        if let Some(key) = &cv.field_key {
            out.push_str(&format!("  {}", paint(key, is_tty, |s| s.dimmed())));
        }
        out.push('\n');
    }
    out
}

pub fn render_trail(attempts: &[FetchAttempt], is_tty: bool) -> String {
    let mut out = String::new();
    for a in attempts {
        let status = a
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());
        let status = if !is_tty {
            status
        } else if a.ok {
            status.green().to_string()
        } else {
            status.red().to_string()
        };
        out.push_str(&format!("  {status} {}", a.url));
        if let Some(msg) = &a.message {
            out.push_str(&format!("  {}", paint(msg, is_tty, |s| s.dimmed())));
        }
        out.push('\n');
    }
    out
}

pub fn render_token(status: &TokenStatus, is_tty: bool) -> String {
    let mut out = format!(
        "{} expires at {} (in {}s)\n",
        paint("Access token acquired,", is_tty, |s| s.green()),
        status.expires_at.to_rfc3339(),
        status.expires_in_secs
    );
    if let Some(rt) = &status.refresh_token {
        out.push_str(&format!("Refresh token: {rt}\n"));
    }
    out
}

/// Print any lookup result as `{ "data": ..., "attempts": [...] }`.
pub fn print_json<T: Serialize>(value: &T) {
    println!("{}", to_json(value));
}

pub fn print_pretty(rendered: &str) {
    print!("{rendered}");
    if !rendered.ends_with('\n') {
        println!();
    }
}

pub fn print_error(err: &LookupError, mode: OutputMode, is_tty: bool) {
    match mode {
        OutputMode::Json => println!("{}", to_json(&err.to_json())),
        OutputMode::Pretty => {
            eprintln!("{}: {}", paint("Error", is_tty, |s| s.red().bold()), err);
            if !err.attempts.is_empty() {
                eprintln!("Attempted:");
                eprint!("{}", render_trail(&err.attempts, is_tty));
            }
        }
    }
}
