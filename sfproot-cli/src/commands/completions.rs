//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io;

use crate::Cli;

/// Write the completion script for `shell` to `out`.
fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd
        .get_name()
        .to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completions_for(shell: Shell) -> String {
        let mut buf = Vec::new();
        write_completions(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_bash_completions_list_subcommands() {
        let output = completions_for(Shell::Bash);
        assert!(output.contains("sfproot"));
        for sub in ["unlock", "shell", "baud", "upload", "commit", "flash", "monitor"] {
            assert!(output.contains(sub), "{sub}");
        }
    }

    #[test]
    fn test_every_shell_generates_output() {
        for shell in [
            Shell::Bash,
            Shell::Zsh,
            Shell::Fish,
            Shell::PowerShell,
            Shell::Elvish,
        ] {
            assert!(completions_for(shell).contains("sfproot"), "{shell}");
        }
    }
}
