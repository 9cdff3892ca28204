//! Shell command rendering for commands executed on the remote compute instance

pub mod package_manager;

/// Wrap a command so its failure does not abort the surrounding script.
pub fn continue_on_error(command: &str) -> String {
    format!("{{ {command} ; }} || true")
}

/// Render a script delivered to an interpreter through a quoted heredoc.
///
/// The delimiter is quoted, so the remote shell performs no expansion inside `body`.
pub fn heredoc(interpreter: &str, delimiter: &str, body: &str) -> String {
    let body = body.trim_end_matches('\n');
    format!("{interpreter} <<'{delimiter}'\n{body}\n{delimiter}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_on_error() {
        assert_eq!(
            continue_on_error("sudo dnf install -y python3-pip"),
            "{ sudo dnf install -y python3-pip ; } || true"
        );
    }

    #[test]
    fn test_heredoc_quotes_delimiter() {
        let rendered = heredoc("python3 -", "PMM_EOF", "print('$HOME')\n");
        assert_eq!(rendered, "python3 - <<'PMM_EOF'\nprint('$HOME')\nPMM_EOF");
    }
}
