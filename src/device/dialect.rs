/// How a family of devices enters configuration mode, commits staged
/// changes and persists its running configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    pub config_enter: Option<&'static str>,
    pub config_exit: Option<&'static str>,
    pub commit: Option<&'static str>,
    pub save: Option<&'static str>,
}

const CISCO_LIKE_SAVE: &str = "write memory";

const DIALECTS: &[Dialect] = &[
    Dialect {
        name: "cisco_ios",
        config_enter: Some("configure terminal"),
        config_exit: Some("end"),
        commit: None,
        save: Some(CISCO_LIKE_SAVE),
    },
    Dialect {
        name: "cisco_xe",
        config_enter: Some("configure terminal"),
        config_exit: Some("end"),
        commit: None,
        save: Some(CISCO_LIKE_SAVE),
    },
    Dialect {
        name: "cisco_asa",
        config_enter: Some("configure terminal"),
        config_exit: Some("end"),
        commit: None,
        save: Some(CISCO_LIKE_SAVE),
    },
    Dialect {
        name: "cisco_nxos",
        config_enter: Some("configure terminal"),
        config_exit: Some("end"),
        commit: None,
        save: Some("copy running-config startup-config"),
    },
    Dialect {
        name: "cisco_xr",
        config_enter: Some("configure terminal"),
        config_exit: Some("end"),
        commit: Some("commit"),
        save: None,
    },
    Dialect {
        name: "arista_eos",
        config_enter: Some("configure terminal"),
        config_exit: Some("end"),
        commit: None,
        save: Some(CISCO_LIKE_SAVE),
    },
    Dialect {
        name: "juniper",
        config_enter: Some("configure"),
        config_exit: Some("exit configuration-mode"),
        commit: Some("commit"),
        save: None,
    },
    Dialect {
        name: "juniper_junos",
        config_enter: Some("configure"),
        config_exit: Some("exit configuration-mode"),
        commit: Some("commit"),
        save: None,
    },
    Dialect {
        name: "linux",
        config_enter: None,
        config_exit: None,
        commit: None,
        save: None,
    },
];

const GENERIC: Dialect = Dialect {
    name: "generic",
    config_enter: Some("configure terminal"),
    config_exit: Some("end"),
    commit: None,
    save: None,
};

impl Dialect {
    /// Unknown device types fall back to a generic config-mode dialect
    /// with no commit or save support.
    pub fn for_device_type(device_type: &str) -> Dialect {
        DIALECTS
            .iter()
            .find(|d| d.name == device_type)
            .copied()
            .unwrap_or(GENERIC)
    }

    /// Wrap `lines` in this dialect's enter/exit configuration commands
    pub fn config_script<S: AsRef<str>>(&self, lines: &[S]) -> String {
        let mut script = String::new();
        let mut push = |line: &str| {
            script.push_str(line);
            script.push('\n');
        };

        if let Some(enter) = self.config_enter {
            push(enter);
        }
        for line in lines {
            push(line.as_ref());
        }
        if let Some(exit) = self.config_exit {
            push(exit);
        }
        script
    }

    /// Commit has to be issued from inside configuration mode
    pub fn commit_script(&self) -> Option<String> {
        self.commit.map(|commit| self.config_script(&[commit]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_device_types() {
        assert_eq!(Dialect::for_device_type("cisco_ios").save, Some("write memory"));
        assert_eq!(Dialect::for_device_type("juniper_junos").commit, Some("commit"));
        assert_eq!(Dialect::for_device_type("mystery_box").name, "generic");
    }

    #[test]
    fn config_script_wraps_lines() {
        let dialect = Dialect::for_device_type("cisco_ios");
        let script = dialect.config_script(&["interface Gi0/1", " description uplink"]);
        assert_eq!(
            script,
            "configure terminal\ninterface Gi0/1\n description uplink\nend\n"
        );
    }

    #[test]
    fn linux_has_no_config_mode() {
        let dialect = Dialect::for_device_type("linux");
        assert_eq!(dialect.config_script(&["uptime"]), "uptime\n");
        assert!(dialect.commit_script().is_none());
    }

    #[test]
    fn junos_commit_runs_inside_config_mode() {
        let dialect = Dialect::for_device_type("juniper");
        assert_eq!(
            dialect.commit_script().as_deref(),
            Some("configure\ncommit\nexit configuration-mode\n")
        );
    }
}
