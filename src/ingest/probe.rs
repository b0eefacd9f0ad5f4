use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::debug;

use crate::ingest::{DurationProbe, error::IngestError};

/// Reads the container duration with `ffprobe`.
pub struct Ffprobe {
    program: PathBuf,
}

impl Ffprobe {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DurationProbe for Ffprobe {
    fn duration_secs(&self, path: &Path) -> Result<u64, IngestError> {
        let program = self.program.to_string_lossy().into_owned();

        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| IngestError::upstream(&program, format!("failed to spawn: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::upstream(&program, stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("{program} {} -> {}", path.to_string_lossy(), stdout.trim());

        parse_duration(&stdout)
            .ok_or_else(|| IngestError::upstream(&program, format!("unexpected output {stdout:?}")))
    }
}

/// Parses ffprobe's `duration` line (`"215.484082\n"`) into whole seconds.
pub fn parse_duration(output: &str) -> Option<u64> {
    let secs: f64 = output.lines().next()?.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs.round() as u64)
    } else {
        None
    }
}
