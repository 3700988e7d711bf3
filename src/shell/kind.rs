//! The closed set of supported shell interpreters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ZrunError;

/// Which interpreter executes the command text.
///
/// The set is closed: adding a variant is a breaking interface change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    /// Windows command interpreter (`cmd.exe`).
    Cmd,
    /// PowerShell (`powershell.exe` on Windows, `pwsh` elsewhere).
    #[serde(alias = "pwsh")]
    PowerShell,
    /// POSIX-compatible shell (`bash`).
    Bash,
}

impl ShellKind {
    /// All recognized kinds, in wire order.
    pub const ALL: [ShellKind; 3] = [ShellKind::Cmd, ShellKind::PowerShell, ShellKind::Bash];

    /// Convert a raw numeric discriminant (`0 = cmd`, `1 = powershell`,
    /// `2 = bash`).
    pub fn from_raw(value: i32) -> Result<Self, ZrunError> {
        match value {
            0 => Ok(ShellKind::Cmd),
            1 => Ok(ShellKind::PowerShell),
            2 => Ok(ShellKind::Bash),
            other => Err(ZrunError::UnsupportedShellKind(other.to_string())),
        }
    }

    /// Numeric discriminant matching [`ShellKind::from_raw`].
    pub fn as_raw(&self) -> i32 {
        match self {
            ShellKind::Cmd => 0,
            ShellKind::PowerShell => 1,
            ShellKind::Bash => 2,
        }
    }

    /// Lowercase name used in config files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            ShellKind::Cmd => "cmd",
            ShellKind::PowerShell => "powershell",
            ShellKind::Bash => "bash",
        }
    }

    /// The native shell of the current platform.
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            ShellKind::PowerShell
        } else {
            ShellKind::Bash
        }
    }
}

impl Default for ShellKind {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShellKind {
    type Err = ZrunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cmd" | "cmd.exe" => Ok(ShellKind::Cmd),
            "powershell" | "powershell.exe" | "pwsh" => Ok(ShellKind::PowerShell),
            "bash" => Ok(ShellKind::Bash),
            _ => Err(ZrunError::UnsupportedShellKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        for kind in ShellKind::ALL {
            assert_eq!(ShellKind::from_raw(kind.as_raw()).unwrap(), kind);
        }
    }

    #[test]
    fn test_raw_out_of_range() {
        assert!(matches!(
            ShellKind::from_raw(3),
            Err(ZrunError::UnsupportedShellKind(_))
        ));
        assert!(ShellKind::from_raw(-1).is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("cmd".parse::<ShellKind>().unwrap(), ShellKind::Cmd);
        assert_eq!("PowerShell".parse::<ShellKind>().unwrap(), ShellKind::PowerShell);
        assert_eq!("pwsh".parse::<ShellKind>().unwrap(), ShellKind::PowerShell);
        assert_eq!(" bash ".parse::<ShellKind>().unwrap(), ShellKind::Bash);
    }

    #[test]
    fn test_parse_unsupported() {
        let err = "fish".parse::<ShellKind>().unwrap_err();
        assert!(matches!(err, ZrunError::UnsupportedShellKind(ref s) if s == "fish"));
        assert!("sh".parse::<ShellKind>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ShellKind::PowerShell).unwrap();
        assert_eq!(json, "\"powershell\"");

        let kind: ShellKind = serde_json::from_str("\"pwsh\"").unwrap();
        assert_eq!(kind, ShellKind::PowerShell);

        assert!(serde_json::from_str::<ShellKind>("\"zsh\"").is_err());
    }

    #[test]
    fn test_platform_default() {
        #[cfg(unix)]
        assert_eq!(ShellKind::default(), ShellKind::Bash);
        #[cfg(windows)]
        assert_eq!(ShellKind::default(), ShellKind::PowerShell);
    }
}
