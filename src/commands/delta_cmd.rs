use clap::Args;
use std::path::Path;

use client_sync::delta;

#[derive(Args)]
pub struct DiffCommand {
    /// Original text
    pub original: String,

    /// Target text
    pub target: String,

    /// Treat the arguments as file paths
    #[arg(long, short)]
    pub file: bool,
}

#[derive(Args)]
pub struct MergeCommand {
    /// Original text
    pub original: String,

    /// Delta produced by `diff`
    pub delta: String,

    /// Treat the arguments as file paths
    #[arg(long, short)]
    pub file: bool,
}

/// Returns `arg` itself, or the contents of the file it names.
fn read_input(arg: &str, file: bool) -> Result<String, Box<dyn std::error::Error>> {
    if !file {
        return Ok(arg.to_string());
    }
    std::fs::read_to_string(Path::new(arg))
        .map_err(|e| format!("Failed to read '{}': {}", arg, e).into())
}

impl DiffCommand {
    pub fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let original = read_input(&self.original, self.file)?;
        let target = read_input(&self.target, self.file)?;

        match delta::diff(&original, &target) {
            Some(d) => println!("{}", d),
            None => eprintln!("No differences"),
        }
        Ok(())
    }
}

impl MergeCommand {
    pub fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let original = read_input(&self.original, self.file)?;
        let patch = read_input(&self.delta, self.file)?;

        println!("{}", delta::merge(&original, &patch)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_input_literal() {
        assert_eq!(read_input("The fox", false).unwrap(), "The fox");
    }

    #[test]
    fn test_read_input_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("original.json");
        std::fs::write(&path, r#"{"a": 1}"#).unwrap();

        let contents = read_input(path.to_str().unwrap(), true).unwrap();
        assert_eq!(contents, r#"{"a": 1}"#);
    }

    #[test]
    fn test_read_input_missing_file() {
        let err = read_input("/nonexistent/delta.txt", true).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_merge_rejects_bad_delta() {
        let cmd = MergeCommand {
            original: "abc".to_string(),
            delta: "<0,9>".to_string(),
            file: false,
        };
        assert!(cmd.run().is_err());
    }
}
