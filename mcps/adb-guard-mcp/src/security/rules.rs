//! Risk rule tables
//!
//! Rules match against a normalized command segment: shell words joined by
//! single spaces, wrappers such as `busybox` or `nohup` already removed.
//! Critical rules are checked on every segment before anything else; the
//! ordered table is first-match-wins.

use regex::Regex;

use super::types::{Classification, CommandRule, ProtectedPath, RiskLevel};
use crate::config::{ConfigError, RuleConfig};

const SYSTEM_PARTITIONS: &str = r"/(system|vendor|product|odm|system_ext|apex)(/|\s|$)";

type RuleSpec = (&'static str, &'static str, &'static str);

fn critical_specs() -> Vec<(String, &'static str, &'static str)> {
    let fixed: [RuleSpec; 11] = [
        (r"^dd(\s|$)", "partition_write", "Raw block copy with dd"),
        (
            r"^(mkfs(\.\w+)?|mke2fs|make_ext4fs|make_f2fs|newfs_msdos|sgdisk|sfdisk|fdisk|parted|blkdiscard)(\s|$)",
            "filesystem_format",
            "Formatting or repartitioning storage",
        ),
        (
            r"^(flash_image|erase_image|fastboot)(\s|$)",
            "partition_write",
            "Flashing device partitions",
        ),
        (
            r"^(reboot|svc power reboot)(\s+-\S+)*\s+(bootloader|fastboot|edl|download|sideload|sideload-auto-reboot)(\s|$)",
            "bootloader",
            "Rebooting into bootloader or flashing mode",
        ),
        (
            r"^setprop\s+sys\.powerctl\s+\S*(bootloader|fastboot|edl|download|sideload)",
            "bootloader",
            "Requesting a bootloader reboot through a property",
        ),
        (
            r"(^|\s)(oem|flashing)\s+(unlock|lock)",
            "bootloader",
            "Changing the bootloader lock state",
        ),
        (
            r"(--wipe_data|--wipe_cache|MASTER_CLEAR|FACTORY_RESET)|^wipe(\s|$)",
            "factory_reset",
            "Wiping user data",
        ),
        (
            r"^rm\s+(.*\s)?(/|/data|/sdcard|/storage|/storage/emulated/0)/?\*?(\s|$)",
            "destructive_delete",
            "Deleting an entire storage root",
        ),
        (
            r"^(mount\s+(.*\s)?-o\s*\S*\b(rw|remount)\b|remount(\s|$)|disable-verity|enable-verity)",
            "system_partition_write",
            "Remounting system partitions writable",
        ),
        (
            r"(?i)^setenforce\s+(0|permissive)(\s|$)",
            "selinux",
            "Disabling SELinux enforcement",
        ),
        (
            r"^(su|sudo|magisk|resetprop)(\s|$)",
            "privilege_escalation",
            "Running commands as root",
        ),
    ];

    let mut specs: Vec<(String, &'static str, &'static str)> = fixed
        .iter()
        .map(|(pattern, category, description)| (pattern.to_string(), *category, *description))
        .collect();

    specs.push((
        format!(
            r"^(rm|rmdir|unlink|chmod|chown|chgrp|chcon|touch|mkdir|tee|truncate|restorecon)\s(.*\s)?{SYSTEM_PARTITIONS}"
        ),
        "system_partition_write",
        "Modifying a read-only system partition",
    ));
    specs.push((
        format!(r"^sed\s+(.*\s)?-i.*\s{SYSTEM_PARTITIONS}"),
        "system_partition_write",
        "Editing files on a system partition",
    ));
    specs.push((
        r"^(cp|mv|ln|install|push)\s.*\s/(system|vendor|product|odm|system_ext|apex)(/\S*)?$".to_string(),
        "system_partition_write",
        "Writing into a system partition",
    ));
    specs.push((
        format!(r">>?\s?{SYSTEM_PARTITIONS}"),
        "system_partition_write",
        "Redirecting output into a system partition",
    ));
    specs
}

const ORDERED: &[(&str, RiskLevel, &str, &str)] = &[
    (
        r"^((pm|cmd package)\s+uninstall|uninstall)(\s|$)",
        RiskLevel::High,
        "app_removal",
        "Uninstalling an application",
    ),
    (
        r"^((pm|cmd package)\s+(install|install-create|install-write|install-commit|install-existing)|install|install-multiple)(\s|$)",
        RiskLevel::High,
        "app_install",
        "Installing an application package",
    ),
    (
        r"^(pm|cmd package)\s+clear(\s|$)",
        RiskLevel::High,
        "app_data",
        "Clearing application data",
    ),
    (
        r"^(pm|cmd package)\s+(disable|disable-user|disable-until-used|hide|suspend)(\s|$)",
        RiskLevel::High,
        "app_state",
        "Disabling an application",
    ),
    (
        r"^(pm|cmd package)\s+(enable|unhide|unsuspend)(\s|$)",
        RiskLevel::Medium,
        "app_state",
        "Re-enabling an application",
    ),
    (
        r"^(pm|cmd package)\s+(grant|revoke|reset-permissions)(\s|$)",
        RiskLevel::High,
        "permissions",
        "Changing runtime permissions",
    ),
    (
        r"^(pm|cmd package)\s+(list|path|dump|resolve-activity|query-activities)(\s|$)",
        RiskLevel::Safe,
        "package_query",
        "Querying installed packages",
    ),
    (
        r"^settings\s+(put|delete|reset)(\s|$)",
        RiskLevel::High,
        "settings_write",
        "Changing system settings",
    ),
    (
        r"^settings\s+(get|list)(\s|$)",
        RiskLevel::Safe,
        "settings_read",
        "Reading system settings",
    ),
    (
        r"^setprop(\s|$)",
        RiskLevel::High,
        "property_write",
        "Setting a system property",
    ),
    (
        r"^getprop(\s|$)",
        RiskLevel::Safe,
        "device_info",
        "Reading system properties",
    ),
    (
        r"^(reboot|shutdown|halt|poweroff|svc\s+power)(\s|$)",
        RiskLevel::High,
        "device_power",
        "Rebooting or powering off the device",
    ),
    (
        r"^svc\s+(wifi|data|bluetooth|nfc|usb)(\s|$)",
        RiskLevel::High,
        "connectivity",
        "Toggling device connectivity",
    ),
    (
        r"^(kill|killall|pkill)(\s|$)",
        RiskLevel::High,
        "process_control",
        "Killing processes",
    ),
    (
        r"^am\s+dumpheap(\s|$)",
        RiskLevel::Medium,
        "diagnostics",
        "Dumping a process heap",
    ),
    (
        r"^am\s+(force-stop|kill|kill-all|crash|start|start-activity|startservice|start-service|stopservice|stop-service|broadcast|instrument)(\s|$)",
        RiskLevel::Medium,
        "app_lifecycle",
        "Starting or stopping application components",
    ),
    (
        r"^monkey(\s|$)",
        RiskLevel::Medium,
        "app_lifecycle",
        "Launching an application",
    ),
    (
        r"^wm\s+(size|density)$",
        RiskLevel::Safe,
        "display_info",
        "Reading display configuration",
    ),
    (
        r"^wm\s+(size|density|overscan)\s",
        RiskLevel::High,
        "display_config",
        "Changing display configuration",
    ),
    (
        r"^find\s(.*\s)?-(delete|exec|execdir|ok)(\s|$)",
        RiskLevel::High,
        "file_delete",
        "find with a destructive action",
    ),
    (
        r"^(rm|rmdir|unlink)(\s|$)",
        RiskLevel::High,
        "file_delete",
        "Deleting files",
    ),
    (
        r"^(mv|cp|chmod|chown|chgrp|chcon|ln|truncate)(\s|$)",
        RiskLevel::High,
        "file_modify",
        "Modifying files",
    ),
    (
        r"(^tee(\s|$))|>",
        RiskLevel::High,
        "file_write",
        "Writing to a file",
    ),
    (
        r"^push(\s|$)",
        RiskLevel::High,
        "file_write",
        "Pushing a file to the device",
    ),
    (
        r"^pull(\s|$)",
        RiskLevel::Low,
        "file_transfer",
        "Pulling a file from the device",
    ),
    (
        r"^(mkdir|touch)(\s|$)",
        RiskLevel::Medium,
        "file_create",
        "Creating files or directories",
    ),
    (
        r"^(screencap|screenrecord)(\s|$)",
        RiskLevel::Low,
        "media",
        "Capturing the screen",
    ),
    (
        r"^uiautomator\s+dump(\s|$)",
        RiskLevel::Low,
        "ui_inspect",
        "Dumping the UI hierarchy",
    ),
    (
        r"^input\s",
        RiskLevel::Low,
        "ui_input",
        "Simulating user input",
    ),
    (
        r"^logcat\s(.*\s)?-c(\s|$)",
        RiskLevel::Medium,
        "logs",
        "Clearing device logs",
    ),
    (r"^logcat(\s|$)", RiskLevel::Safe, "logs", "Reading device logs"),
    (
        r"^(bugreport|bugreportz)(\s|$)",
        RiskLevel::Medium,
        "diagnostics",
        "Capturing a bug report",
    ),
    (
        r"^(dumpsys|dumpstate)(\s|$)",
        RiskLevel::Safe,
        "diagnostics",
        "Reading system service state",
    ),
    (
        r"^(ls|stat|du|df|wc|cat|head|tail|find|grep|file|md5sum|sha1sum|sha256sum|readlink|realpath|pwd|basename|dirname|tree|test|\[)(\s|$)",
        RiskLevel::Safe,
        "filesystem_read",
        "Reading files or directories",
    ),
    (
        r"^(ps|top|uptime|id|whoami|date|uname|free|getenforce|pidof|vmstat|iostat|lsof|printenv|env)(\s|$)",
        RiskLevel::Safe,
        "process_info",
        "Reading process or system information",
    ),
    (
        r"^(ip|ifconfig|netstat|ping|ping6|ss|nslookup)(\s|$)",
        RiskLevel::Low,
        "network_info",
        "Inspecting network state",
    ),
    (
        r"^(echo|printf|true|false|sleep|which|type)(\s|$)",
        RiskLevel::Low,
        "output",
        "Printing or waiting",
    ),
];

const PROTECTED: &[(&str, &str)] = &[
    ("/dev/block/", "raw block devices"),
    ("/dev/mtd", "raw flash devices"),
    ("/dev/mmcblk", "raw eMMC devices"),
    ("/dev/sd", "raw disk devices"),
    ("/boot/", "boot partition"),
    ("/recovery/", "recovery partition"),
    ("/persist/", "persistent calibration data"),
    ("/efs/", "radio calibration data"),
    ("/metadata/", "encryption metadata"),
    ("/proc/sysrq-trigger", "kernel sysrq trigger"),
];

/// Classification for commands no rule recognizes
pub fn unknown() -> Classification {
    Classification::new(RiskLevel::Medium, "unknown", "Unrecognized command")
}

/// Compiled rule tables. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct RuleSet {
    critical: Vec<CommandRule>,
    ordered: Vec<CommandRule>,
    protected: Vec<ProtectedPath>,
}

fn compile(
    pattern: &str,
    risk: RiskLevel,
    category: &str,
    description: &str,
) -> Result<CommandRule, ConfigError> {
    let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(CommandRule {
        pattern: regex,
        risk,
        category: category.to_string(),
        description: description.to_string(),
    })
}

impl RuleSet {
    /// Built-in tables plus operator extras. Extra rules go ahead of the
    /// built-in rules in their band; critical extras join the critical band.
    pub fn new(
        extra_rules: &[RuleConfig],
        extra_protected: &[ProtectedPath],
    ) -> Result<Self, ConfigError> {
        let mut critical = Vec::new();
        let mut ordered = Vec::new();

        for extra in extra_rules {
            let description = if extra.description.is_empty() {
                &extra.category
            } else {
                &extra.description
            };
            let rule = compile(&extra.pattern, extra.risk, &extra.category, description)?;
            if rule.risk == RiskLevel::Critical {
                critical.push(rule);
            } else {
                ordered.push(rule);
            }
        }

        for (pattern, category, description) in critical_specs() {
            critical.push(compile(&pattern, RiskLevel::Critical, category, description)?);
        }
        for (pattern, risk, category, description) in ORDERED {
            ordered.push(compile(pattern, *risk, category, description)?);
        }

        let mut protected: Vec<ProtectedPath> = extra_protected.to_vec();
        protected.extend(
            PROTECTED
                .iter()
                .map(|(prefix, reason)| ProtectedPath::new(*prefix, *reason)),
        );

        Ok(Self {
            critical,
            ordered,
            protected,
        })
    }

    pub fn builtin() -> Result<Self, ConfigError> {
        Self::new(&[], &[])
    }

    pub fn critical_match(&self, segment: &str) -> Option<&CommandRule> {
        self.critical.iter().find(|rule| rule.matches(segment))
    }

    pub fn ordered_match(&self, segment: &str) -> Option<&CommandRule> {
        self.ordered.iter().find(|rule| rule.matches(segment))
    }

    pub fn protected_match(&self, path: &str) -> Option<&ProtectedPath> {
        self.protected.iter().find(|p| p.covers(path))
    }

    pub fn protected_paths(&self) -> &[ProtectedPath] {
        &self.protected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::builtin().unwrap()
    }

    fn ordered(segment: &str) -> Option<(RiskLevel, String)> {
        rules()
            .ordered_match(segment)
            .map(|r| (r.risk, r.category.clone()))
    }

    #[test]
    fn test_builtin_tables_compile() {
        let rules = rules();
        assert!(!rules.critical.is_empty());
        assert!(!rules.ordered.is_empty());
        assert_eq!(rules.protected_paths().len(), PROTECTED.len());
    }

    #[test]
    fn test_critical_rules() {
        let rules = rules();
        for segment in [
            "dd if=/dev/zero of=/dev/block/sda",
            "mkfs.ext4 /dev/block/sda1",
            "make_ext4fs /dev/block/by-name/userdata",
            "fastboot flash boot boot.img",
            "reboot bootloader",
            "svc power reboot edl",
            "reboot -f bootloader",
            "reboot -p -f fastboot",
            "setprop sys.powerctl reboot,bootloader",
            "setprop sys.powerctl 'reboot,edl'",
            "fastboot oem unlock",
            "recovery --wipe_data",
            "rm -rf /",
            "rm -rf /data",
            "rm -rf /sdcard/*",
            "rm -rf /storage/emulated/0/",
            "rm /system/app/Foo.apk",
            "chmod 777 /vendor/bin/x",
            "sed -i s/a/b/ /system/build.prop",
            "cp /sdcard/libx.so /system/lib64",
            "mv /sdcard/a /product/app/a",
            "echo x >/system/etc/hosts",
            "mount -o rw,remount /system",
            "remount",
            "setenforce 0",
            "setenforce Permissive",
            "su -c id",
            "resetprop ro.debuggable 1",
        ] {
            let rule = rules.critical_match(segment);
            assert!(rule.is_some(), "expected critical for {segment:?}");
            assert_eq!(rule.map(|r| r.risk), Some(RiskLevel::Critical));
        }
    }

    #[test]
    fn test_critical_rules_leave_ordinary_commands_alone() {
        let rules = rules();
        for segment in [
            "rm -rf /sdcard/Download/old.txt",
            "ls /system/app",
            "cat /system/build.prop",
            "reboot",
            "reboot recovery",
            "reboot -f recovery",
            "setprop sys.powerctl reboot",
            "getprop ro.boot.verifiedbootstate",
            "cp /system/etc/hosts /sdcard/hosts",
            "setenforce 1",
            "pm list packages",
        ] {
            assert!(
                rules.critical_match(segment).is_none(),
                "unexpected critical for {segment:?}"
            );
        }
    }

    #[test]
    fn test_ordered_rules() {
        assert_eq!(
            ordered("getprop ro.build.version.release"),
            Some((RiskLevel::Safe, "device_info".to_string()))
        );
        assert_eq!(
            ordered("pm uninstall com.example.app"),
            Some((RiskLevel::High, "app_removal".to_string()))
        );
        assert_eq!(
            ordered("cmd package uninstall -k com.example.app"),
            Some((RiskLevel::High, "app_removal".to_string()))
        );
        assert_eq!(
            ordered("pm list packages -f"),
            Some((RiskLevel::Safe, "package_query".to_string()))
        );
        assert_eq!(
            ordered("settings put global adb_enabled 0"),
            Some((RiskLevel::High, "settings_write".to_string()))
        );
        assert_eq!(
            ordered("wm size"),
            Some((RiskLevel::Safe, "display_info".to_string()))
        );
        assert_eq!(
            ordered("wm size 720x1280"),
            Some((RiskLevel::High, "display_config".to_string()))
        );
        assert_eq!(
            ordered("reboot recovery"),
            Some((RiskLevel::High, "device_power".to_string()))
        );
        assert_eq!(
            ordered("am force-stop com.example.app"),
            Some((RiskLevel::Medium, "app_lifecycle".to_string()))
        );
        assert_eq!(
            ordered("logcat -b all -c"),
            Some((RiskLevel::Medium, "logs".to_string()))
        );
        assert_eq!(
            ordered("logcat -d -v threadtime"),
            Some((RiskLevel::Safe, "logs".to_string()))
        );
        assert_eq!(
            ordered("find /sdcard -name *.tmp -delete"),
            Some((RiskLevel::High, "file_delete".to_string()))
        );
        assert_eq!(
            ordered("cat > /sdcard/notes.txt"),
            Some((RiskLevel::High, "file_write".to_string()))
        );
        assert_eq!(
            ordered("input tap 100 200"),
            Some((RiskLevel::Low, "ui_input".to_string()))
        );
        assert_eq!(
            ordered("am dumpheap -n 4242 /data/local/tmp/4242.hprof"),
            Some((RiskLevel::Medium, "diagnostics".to_string()))
        );
        assert_eq!(
            ordered("bugreport /tmp/bugreport.zip"),
            Some((RiskLevel::Medium, "diagnostics".to_string()))
        );
        assert_eq!(ordered("frobnicate --all"), None);
    }

    #[test]
    fn test_extra_rules_take_precedence() {
        let extras = vec![
            RuleConfig {
                pattern: r"^getprop\s+ro\.serialno".to_string(),
                risk: RiskLevel::High,
                category: "identifier".to_string(),
                description: String::new(),
            },
            RuleConfig {
                pattern: r"^wipe_cache_tool".to_string(),
                risk: RiskLevel::Critical,
                category: "vendor_tool".to_string(),
                description: "Vendor wipe tool".to_string(),
            },
        ];
        let rules = RuleSet::new(&extras, &[]).unwrap();

        let serial = rules.ordered_match("getprop ro.serialno").unwrap();
        assert_eq!(serial.risk, RiskLevel::High);
        assert_eq!(serial.description, "identifier");
        assert_eq!(
            rules.ordered_match("getprop ro.product.model").map(|r| r.risk),
            Some(RiskLevel::Safe)
        );
        assert_eq!(
            rules
                .critical_match("wipe_cache_tool --now")
                .map(|r| r.category.as_str()),
            Some("vendor_tool")
        );
    }

    #[test]
    fn test_invalid_extra_pattern() {
        let extras = vec![RuleConfig {
            pattern: "(unclosed".to_string(),
            risk: RiskLevel::High,
            category: "broken".to_string(),
            description: String::new(),
        }];
        assert!(matches!(
            RuleSet::new(&extras, &[]),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_protected_paths() {
        let extra = [ProtectedPath::new("/data/misc/keystore/", "keystore")];
        let rules = RuleSet::new(&[], &extra).unwrap();
        assert_eq!(
            rules.protected_match("/dev/block/by-name/boot").map(|p| p.reason.as_str()),
            Some("raw block devices")
        );
        assert!(rules.protected_match("/data/misc/keystore/user_0").is_some());
        assert!(rules.protected_match("/sdcard/boot/readme").is_none());
        assert!(rules.protected_match("/dev/null").is_none());
    }
}
