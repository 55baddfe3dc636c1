//! Living-off-the-land binary detection (§4.5): commands that invoke a
//! legitimate, preinstalled binary in a way characteristic of execution
//! or defense-evasion abuse rather than its ordinary admin use.

use once_cell::sync::Lazy;
use regex::Regex;

struct LolbinPattern {
    technique: &'static str,
    mitre: &'static str,
    pattern: &'static str,
}

/// Each entry pairs a case-insensitive regex against a command line with
/// the MITRE ATT&CK technique it corresponds to. Deliberately narrow:
/// each pattern targets a specific abuse shape (a download-and-execute
/// flag combination, a process-dump incantation) rather than matching on
/// the binary name alone, which would drown operators in false
/// positives from routine admin use.
static PATTERNS: Lazy<Vec<(LolbinPattern, Regex)>> = Lazy::new(|| {
    let raw = [
        LolbinPattern {
            technique: "certutil-download",
            mitre: "T1105",
            pattern: r"(?i)certutil(\.exe)?\s+.*-urlcache.*-split.*-f\s+https?://",
        },
        LolbinPattern {
            technique: "certutil-decode",
            mitre: "T1140",
            pattern: r"(?i)certutil(\.exe)?\s+.*-decode\s",
        },
        LolbinPattern {
            technique: "mshta-remote-script",
            mitre: "T1218.005",
            pattern: r"(?i)mshta(\.exe)?\s+https?://",
        },
        LolbinPattern {
            technique: "rundll32-javascript",
            mitre: "T1218.011",
            pattern: r"(?i)rundll32(\.exe)?\s+.*javascript:",
        },
        LolbinPattern {
            technique: "powershell-encoded-command",
            mitre: "T1059.001",
            pattern: r"(?i)powershell(\.exe)?\s+.*-(enc|encodedcommand)\s+[A-Za-z0-9+/=]{40,}",
        },
        LolbinPattern {
            technique: "powershell-download-string",
            mitre: "T1059.001",
            pattern: r"(?i)powershell(\.exe)?\s+.*(downloadstring|downloadfile|invoke-webrequest)",
        },
        LolbinPattern {
            technique: "wmic-process-call-create",
            mitre: "T1047",
            pattern: r"(?i)wmic(\.exe)?\s+process\s+call\s+create",
        },
        LolbinPattern {
            technique: "bitsadmin-transfer",
            mitre: "T1197",
            pattern: r"(?i)bitsadmin(\.exe)?\s+.*/transfer",
        },
    ];

    raw.into_iter()
        .map(|p| {
            let regex = Regex::new(p.pattern).expect("lolbin pattern is a fixed, tested literal");
            (p, regex)
        })
        .collect()
});

/// A regex match against the LOLBin table, naming the abuse technique
/// and its MITRE ATT&CK identifier.
pub struct LolbinMatch {
    pub technique: &'static str,
    pub mitre_technique: &'static str,
}

pub fn match_command_line(cmdline: &str) -> Option<LolbinMatch> {
    PATTERNS.iter().find_map(|(pattern, regex)| {
        regex.is_match(cmdline).then_some(LolbinMatch {
            technique: pattern.technique,
            mitre_technique: pattern.mitre,
        })
    })
}
