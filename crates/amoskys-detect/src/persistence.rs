//! Persistence-path tripwire (§4.5): filesystem locations where a write
//! is itself suspicious, independent of file content, because the only
//! legitimate writers are package managers and system configuration
//! tools that don't run interactively.

const PERSISTENCE_PREFIXES: &[(&str, &str, &str)] = &[
    ("/etc/cron.d/", "cron-persistence", "T1053.003"),
    ("/etc/cron.daily/", "cron-persistence", "T1053.003"),
    ("/etc/cron.hourly/", "cron-persistence", "T1053.003"),
    ("/var/spool/cron/", "cron-persistence", "T1053.003"),
    ("/etc/systemd/system/", "systemd-unit-persistence", "T1543.002"),
    ("/lib/systemd/system/", "systemd-unit-persistence", "T1543.002"),
    ("/etc/init.d/", "sysv-init-persistence", "T1543.002"),
    ("/etc/ld.so.preload", "ld-preload-hijack", "T1574.006"),
    ("/root/.ssh/authorized_keys", "ssh-authorized-keys", "T1098.004"),
    ("/home/", "ssh-authorized-keys", "T1098.004"), // refined below for the .ssh/authorized_keys suffix
    ("/etc/passwd", "passwd-tamper", "T1098"),
    ("/etc/shadow", "shadow-tamper", "T1098"),
    ("/etc/sudoers", "sudoers-tamper", "T1548.003"),
    ("/etc/sudoers.d/", "sudoers-tamper", "T1548.003"),
];

pub struct PersistenceMatch {
    pub class: &'static str,
    pub mitre_technique: &'static str,
}

/// Matches `path` against the tripwire table. The `/home/` entry is a
/// deliberately loose prefix, narrowed here to only fire on an actual
/// `authorized_keys` suffix so routine home-directory writes don't.
pub fn match_path(path: &str) -> Option<PersistenceMatch> {
    if path.ends_with(".ssh/authorized_keys") {
        return Some(PersistenceMatch {
            class: "ssh-authorized-keys",
            mitre_technique: "T1098.004",
        });
    }

    PERSISTENCE_PREFIXES
        .iter()
        .filter(|(prefix, _, _)| *prefix != "/home/")
        .find(|(prefix, _, _)| path.starts_with(prefix))
        .map(|(_, class, mitre)| PersistenceMatch {
            class,
            mitre_technique: mitre,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_cron_drop() {
        let m = match_path("/etc/cron.d/evil").unwrap();
        assert_eq!(m.class, "cron-persistence");
    }

    #[test]
    fn flags_authorized_keys_anywhere_under_home() {
        let m = match_path("/home/alice/.ssh/authorized_keys").unwrap();
        assert_eq!(m.class, "ssh-authorized-keys");
    }

    #[test]
    fn ordinary_home_writes_do_not_match() {
        assert!(match_path("/home/alice/notes.txt").is_none());
    }

    #[test]
    fn flags_ld_preload() {
        assert!(match_path("/etc/ld.so.preload").is_some());
    }
}
