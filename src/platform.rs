//! # Platform-specific utilities
//!
//! Questo modulo centralizza la gestione cross-platform dei nomi dei tool
//! esterni e il controllo all'avvio che siano disponibili.

use crate::error::{Result, TranscodeError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Platform-specific command manager
pub struct PlatformCommands {
    commands: HashMap<&'static str, &'static str>,
    which_command: &'static str,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    fn new() -> Self {
        let (commands, which_command) = if cfg!(windows) {
            (HashMap::from([("ffmpeg", "ffmpeg.exe"), ("ffprobe", "ffprobe.exe")]), "where")
        } else {
            (HashMap::from([("ffmpeg", "ffmpeg"), ("ffprobe", "ffprobe")]), "which")
        };

        Self {
            commands,
            which_command,
        }
    }

    /// Get the platform-specific command name
    pub fn get_command<'a>(&self, base_name: &'a str) -> &'a str {
        self.commands.get(base_name).copied().unwrap_or(base_name)
    }

    /// Get the command used to check if a program exists
    pub fn which_command(&self) -> &str {
        self.which_command
    }

    /// Check if a program is runnable: an explicit path must exist, a bare
    /// name must resolve through the search path
    pub async fn is_command_available(&self, program: &Path) -> bool {
        if program.components().count() > 1 {
            return program.is_file();
        }

        let result = tokio::process::Command::new(self.which_command)
            .arg(program)
            .output()
            .await;

        match result {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("{} unavailable: {}", self.which_command, e);
                false
            }
        }
    }

    /// Fail with [`TranscodeError::MissingDependency`] for the first missing program
    pub async fn check_dependencies(&self, programs: &[&Path]) -> Result<()> {
        let found =
            futures::future::join_all(programs.iter().map(|p| self.is_command_available(p))).await;
        for (program, available) in programs.iter().zip(found) {
            if !available {
                return Err(TranscodeError::MissingDependency(format!(
                    "{} is required for transcoding",
                    program.display()
                )));
            }
            debug!(program = %program.display(), "dependency found");
        }
        Ok(())
    }

    /// Get system information for debugging
    pub fn system_info() -> SystemInfo {
        SystemInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            family: std::env::consts::FAMILY,
        }
    }
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl std::fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.os, self.arch, self.family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_commands() {
        let platform = PlatformCommands::instance();
        for tool in ["ffmpeg", "ffprobe"] {
            assert!(platform.get_command(tool).starts_with(tool));
        }
        assert_eq!(platform.get_command("mkvmerge"), "mkvmerge");
        assert!(!platform.which_command().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_paths() {
        let platform = PlatformCommands::instance();
        let dir = tempfile::TempDir::new().unwrap();
        let tool = dir.path().join("ffprobe");
        assert!(!platform.is_command_available(&tool).await);

        std::fs::write(&tool, b"").unwrap();
        assert!(platform.is_command_available(&tool).await);
    }

    #[tokio::test]
    async fn test_missing_dependency() {
        let platform = PlatformCommands::instance();
        let missing = Path::new("/nonexistent/dir/ffmpeg");
        let err = platform.check_dependencies(&[missing]).await.unwrap_err();
        assert!(matches!(err, TranscodeError::MissingDependency(ref m) if m.contains("ffmpeg")));
    }

    #[test]
    fn test_system_info() {
        let info = PlatformCommands::system_info();
        assert!(!info.os.is_empty());
        assert!(!info.to_string().is_empty());
    }
}
