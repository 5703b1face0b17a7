// Terminal reporting for the render and check commands
// Everything goes to stderr so stdout carries only the rendered JSON or the verdict

use std::path::Path;

const BOLD_CYAN: &str = "1;36";
const GREEN: &str = "32";
const YELLOW: &str = "33";
const BOLD_RED: &str = "1;31";
const DIM: &str = "2";

fn paint(style: &str, text: &str) -> String {
    format!("\x1b[{}m{}\x1b[0m", style, text)
}

/// Right-aligned command header: "   Rendering card.yaml"
pub fn header(action: &str, config: &Path) {
    eprintln!("{} {}", paint(BOLD_CYAN, &format!("{:>12}", action)), config.display());
}

/// Final verdict of a command
pub fn done(message: &str) {
    eprintln!("{} {}", paint(GREEN, "  \u{2713}"), message);
}

/// Configuration or entity-list problem that did not stop the command
pub fn warning(message: &str) {
    eprintln!("{} {}", paint(YELLOW, "  !"), message);
}

/// An expression that fell back to the error sentinel
pub fn expression_failed(expression: &str, message: &str) {
    eprintln!("{} '{}': {}", paint(BOLD_RED, "failed:"), expression, message);
}

/// Lifecycle detail: static builds, pending values
pub fn note(message: &str) {
    eprintln!("{}", paint(DIM, &format!("  {}", message)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_resets_style() {
        assert_eq!(paint(GREEN, "ok"), "\x1b[32mok\x1b[0m");
    }
}
