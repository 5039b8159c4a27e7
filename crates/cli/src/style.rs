//! Terminal colours for gitstage output.

use console::Style;

use gitstage_core::models::StateTag;

fn marked(mark: &str, colour: Style, msg: &str) -> String {
    format!("{} {}", colour.apply_to(mark), msg)
}

pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

pub fn warn(msg: &str) -> String {
    marked("!", Style::new().yellow().bold(), msg)
}

/// Bold text for file names and section titles.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Coloured label for a change state: green when staged, red when
/// conflicted, yellow otherwise.
pub fn state_label(state: StateTag) -> String {
    let style = if state == StateTag::Conflicted {
        Style::new().red().bold()
    } else if state.is_staged() {
        Style::new().green()
    } else {
        Style::new().yellow()
    };
    style.apply_to(state.to_string()).to_string()
}

/// Diff-style colouring for a quick-view line.
pub fn diff_line(line: &str) -> String {
    let style = match line.chars().next() {
        Some('+') => Style::new().green(),
        Some('-') => Style::new().red(),
        Some('<') if line.starts_with("<<<") => Style::new().cyan(),
        _ => Style::new(),
    };
    style.apply_to(line).to_string()
}
