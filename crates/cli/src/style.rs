//! Terminal styling for status lines and report headings.

use console::{Style, StyledObject};

fn marked(symbol: StyledObject<&str>, msg: &str) -> String {
    format!("{symbol} {msg}")
}

/// Green check mark before `msg`.
pub fn success(msg: &str) -> String {
    marked(Style::new().green().apply_to("✓"), msg)
}

/// Red cross before `msg`.
pub fn error(msg: &str) -> String {
    marked(Style::new().red().bold().apply_to("✗"), msg)
}

/// Yellow warning sign before `msg`.
pub fn warn(msg: &str) -> String {
    marked(Style::new().yellow().apply_to("⚠"), msg)
}

pub fn header(title: &str) -> String {
    Style::new().bold().underlined().apply_to(title).to_string()
}

pub fn dim(text: &str) -> String {
    Style::new().dim().italic().apply_to(text).to_string()
}

/// Cumulative score line, coloured by whether the order needs any manual
/// resolution at all.
pub fn cumulative(score: f64) -> String {
    let style = if score == 0.0 {
        Style::new().green().bold()
    } else {
        Style::new().yellow().bold()
    };
    style.apply_to(format!("{score:.2}")).to_string()
}
