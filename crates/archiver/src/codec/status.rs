//! Alarm severity, archiver info markers and their status texts.

use std::fmt;

/// EPICS alarm severity names, indexed by severity.
const SEVERITY_STRINGS: [&str; 4] = ["NO_ALARM", "MINOR", "MAJOR", "INVALID"];

/// EPICS alarm status names, indexed by status.
const STATUS_STRINGS: [&str; 22] = [
    "NO_ALARM",
    "READ",
    "WRITE",
    "HIHI",
    "HIGH",
    "LOLO",
    "LOW",
    "STATE",
    "COS",
    "COMM",
    "TIMEOUT",
    "HWLIMIT",
    "CALC",
    "SCAN",
    "LINK",
    "SOFT",
    "BAD_SUB",
    "UDF",
    "DISABLE",
    "SIMM",
    "READ_ACCESS",
    "WRITE_ACCESS",
];

/// Sample severity.
///
/// Besides the EPICS alarm severities, the archiver stores out-of-band
/// markers in the `0x0f00` range. Repeat markers carry their repeat count
/// in the sample's status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Severity(pub u16);

impl Severity {
    /// No alarm.
    pub const NO_ALARM: Self = Self(0);
    /// Minor alarm.
    pub const MINOR: Self = Self(1);
    /// Major alarm.
    pub const MAJOR: Self = Self(2);
    /// Invalid alarm.
    pub const INVALID: Self = Self(3);

    /// Sample without a value.
    pub const ARCH_NO_VALUE: Self = Self(0x0f00);
    /// Estimated repeat count (status holds the count).
    pub const ARCH_EST_REPEAT: Self = Self(0x0f80);
    /// Channel was disconnected.
    pub const ARCH_DISCONNECT: Self = Self(0x0f40);
    /// Archiving was stopped.
    pub const ARCH_STOPPED: Self = Self(0x0f20);
    /// Repeat count (status holds the count).
    pub const ARCH_REPEAT: Self = Self(0x0f10);
    /// Archiving was disabled.
    pub const ARCH_DISABLED: Self = Self(0x0f08);
    /// Write frequency changed.
    pub const ARCH_CHANGE_WRITE_FREQ: Self = Self(0x0f04);
    /// Sampling period changed.
    pub const ARCH_CHANGE_PERIOD: Self = Self(0x0f02);
    /// Array size changed.
    pub const ARCH_CHANGE_SIZE: Self = Self(0x0f01);

    /// Info markers carry no usable value.
    pub fn is_info(self) -> bool {
        self == Self::ARCH_DISCONNECT || self == Self::ARCH_STOPPED || self == Self::ARCH_DISABLED
    }

    /// Repeat markers stand for a run of unchanged values.
    pub fn is_repeat(self) -> bool {
        self == Self::ARCH_REPEAT || self == Self::ARCH_EST_REPEAT
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match SEVERITY_STRINGS.get(self.0 as usize) {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:04x}", self.0),
        }
    }
}

/// Renders the status column for a sample.
pub fn status_text(status: u16, severity: Severity) -> String {
    let sevr = Severity(severity.0 & 0x0fff);
    match sevr {
        Severity::NO_ALARM => String::new(),
        Severity::ARCH_EST_REPEAT => format!("Est_Repeat {}", status),
        Severity::ARCH_REPEAT => format!("Repeat {}", status),
        Severity::ARCH_DISCONNECT => "Disconnected".to_string(),
        Severity::ARCH_STOPPED => "Archive_Off".to_string(),
        Severity::ARCH_DISABLED => "Archive_Disabled".to_string(),
        Severity::ARCH_CHANGE_PERIOD => "Change Sampling Period".to_string(),
        _ => match (
            SEVERITY_STRINGS.get(sevr.0 as usize),
            STATUS_STRINGS.get(status as usize),
        ) {
            (Some(sevr_name), Some(stat_name)) => format!("{} {}", sevr_name, stat_name),
            _ => format!("{} {}", sevr.0, status),
        },
    }
}

/// Parses a status column back into `(status, severity)`.
///
/// Returns `None` for text [`status_text`] would never produce.
pub fn parse_status(text: &str) -> Option<(u16, Severity)> {
    if text.is_empty() {
        return Some((0, Severity::NO_ALARM));
    }
    if let Some(count) = text.strip_prefix("Est_Repeat ") {
        return Some((count.trim().parse().ok()?, Severity::ARCH_EST_REPEAT));
    }
    if let Some(count) = text.strip_prefix("Repeat ") {
        return Some((count.trim().parse().ok()?, Severity::ARCH_REPEAT));
    }
    match text {
        "Disconnected" => return Some((0, Severity::ARCH_DISCONNECT)),
        "Archive_Off" => return Some((0, Severity::ARCH_STOPPED)),
        "Archive_Disabled" => return Some((0, Severity::ARCH_DISABLED)),
        "Change Sampling Period" => return Some((0, Severity::ARCH_CHANGE_PERIOD)),
        _ => {}
    }

    let (sevr_part, stat_part) = text.split_once(' ')?;
    if let Some(sevr) = SEVERITY_STRINGS.iter().position(|s| *s == sevr_part) {
        let stat = STATUS_STRINGS.iter().position(|s| *s == stat_part.trim())?;
        return Some((stat as u16, Severity(sevr as u16)));
    }
    // Numeric fallback "<sevr> <stat>"
    let sevr = sevr_part.parse().ok()?;
    let stat = stat_part.trim().parse().ok()?;
    Some((stat, Severity(sevr)))
}
