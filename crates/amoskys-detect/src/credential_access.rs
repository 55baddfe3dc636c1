//! Credential-access heuristics (§4.5): command lines and file reads
//! characteristic of harvesting secrets already on disk or in memory,
//! rather than guessing or intercepting them (those are covered by the
//! SSH-brute-force correlation rule and network-layer detection).

use once_cell::sync::Lazy;
use regex::Regex;

struct CredentialPattern {
    technique: &'static str,
    mitre: &'static str,
    pattern: &'static str,
}

static PATTERNS: Lazy<Vec<(CredentialPattern, Regex)>> = Lazy::new(|| {
    let raw = [
        CredentialPattern {
            technique: "lsass-dump",
            mitre: "T1003.001",
            pattern: r"(?i)(procdump|rundll32|comsvcs\.dll).*lsass",
        },
        CredentialPattern {
            technique: "mimikatz-invocation",
            mitre: "T1003.001",
            pattern: r"(?i)mimikatz|sekurlsa::logonpasswords",
        },
        CredentialPattern {
            technique: "shadow-file-read",
            mitre: "T1003.008",
            pattern: r"(?i)\b(cat|cp|tar|dd)\b.*\betc/shadow\b",
        },
        CredentialPattern {
            technique: "ssh-private-key-harvest",
            mitre: "T1552.004",
            pattern: r"(?i)\b(cat|cp|tar|scp|rsync)\b.*\.ssh/id_(rsa|ed25519|ecdsa)\b",
        },
        CredentialPattern {
            technique: "browser-credential-store-read",
            mitre: "T1555.003",
            pattern: r"(?i)(login data|cookies\.sqlite|key[3-4]\.db)",
        },
    ];

    raw.into_iter()
        .map(|p| {
            let regex = Regex::new(p.pattern).expect("credential access pattern is a fixed, tested literal");
            (p, regex)
        })
        .collect()
});

pub struct CredentialAccessMatch {
    pub technique: &'static str,
    pub mitre_technique: &'static str,
}

pub fn match_command_line(cmdline: &str) -> Option<CredentialAccessMatch> {
    PATTERNS.iter().find_map(|(pattern, regex)| {
        regex.is_match(cmdline).then_some(CredentialAccessMatch {
            technique: pattern.technique,
            mitre_technique: pattern.mitre,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_lsass_dump_via_comsvcs() {
        let m = match_command_line(r"rundll32.exe C:\windows\system32\comsvcs.dll, MiniDump 612 lsass.dmp full").unwrap();
        assert_eq!(m.technique, "lsass-dump");
    }

    #[test]
    fn flags_shadow_read() {
        let m = match_command_line("cat /etc/shadow").unwrap();
        assert_eq!(m.mitre_technique, "T1003.008");
    }

    #[test]
    fn ordinary_commands_do_not_match() {
        assert!(match_command_line("cat /etc/hostname").is_none());
    }
}
