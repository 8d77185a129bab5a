//! Stitch Binary - Merge recorded segments outside of a recording session
//!
//! Useful for sessions whose merge failed: point it at the recovery manifest
//! the recorder wrote, at a directory of segments, or at the segment files.

use camstitch::adapters::local::fs::read_manifest;
use camstitch::ports::merge::MergePort;
use camstitch::{FfmpegContainers, RecorderConfig, Segment, SegmentMerger};
use clap::Parser;
use regex::Regex;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::info;

/// Concatenate recorded segments into one container without re-encoding
#[derive(Parser, Debug)]
#[command(name = "stitch", version, about)]
struct Cli {
    /// Merged output file
    #[arg(short, long)]
    output: PathBuf,

    /// Recovery manifest listing the segments in order
    #[arg(long, conflicts_with_all = ["dir", "files"])]
    manifest: Option<PathBuf>,

    /// Directory of segments, ordered by the number at the end of each name
    #[arg(long, conflicts_with = "files")]
    dir: Option<PathBuf>,

    /// Segment files in merge order
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = RecorderConfig::from_env();

    if let Err(e) = run(cli, config).await {
        eprintln!("stitch failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: RecorderConfig) -> Result<(), Box<dyn Error>> {
    let segments = if let Some(manifest) = &cli.manifest {
        read_manifest(manifest).await?.segments
    } else if let Some(dir) = &cli.dir {
        directory_segments(dir, &cli.output)?
    } else {
        cli.files.iter().map(|path| Segment::new(path, 0)).collect()
    };
    check_output(&segments, &cli.output)?;
    info!("Stitching {} segments into {:?}", segments.len(), cli.output);

    let merger = SegmentMerger::new(FfmpegContainers::new(config.container_format));
    let report = MergePort::merge(&merger, segments, cli.output.clone()).await?;

    if report.verbatim {
        println!("Copied single segment to {}", cli.output.display());
    } else {
        println!(
            "Stitched {} segments into {} (video {} samples, audio {} samples)",
            report.segments,
            cli.output.display(),
            report.video.map(|v| v.samples).unwrap_or(0),
            report.audio.map(|a| a.samples).unwrap_or(0),
        );
    }
    Ok(())
}

/// Segments found in `dir`, leaving out manifests and `output` itself.
fn directory_segments(dir: &Path, output: &Path) -> Result<Vec<Segment>, Box<dyn Error>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().map(|ext| ext == "json").unwrap_or(true) {
            continue;
        }
        if same_file(&path, output) {
            info!("Skipping {:?}, it is the output", path);
            continue;
        }
        paths.push(path);
    }
    sort_segments(&mut paths)?;
    Ok(paths.into_iter().map(|path| Segment::new(path, 0)).collect())
}

/// Writing the output over one of the segments would destroy it.
fn check_output(segments: &[Segment], output: &Path) -> Result<(), String> {
    match segments.iter().find(|segment| same_file(&segment.path, output)) {
        Some(segment) => Err(format!(
            "output {} is also an input segment",
            segment.path.display()
        )),
        None => Ok(()),
    }
}

/// Paths that do not exist yet are compared as written.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// `segment_2` before `segment_10`. Names without a trailing number go last.
fn sort_segments(paths: &mut [PathBuf]) -> Result<(), regex::Error> {
    let re = Regex::new(r"(\d+)$")?;
    let number = |path: &PathBuf| -> Option<u64> {
        let stem = path.file_stem()?.to_str()?;
        re.captures(stem)?.get(1)?.as_str().parse().ok()
    };

    paths.sort_by(|a, b| match (number(a), number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use tempfile::tempdir;

    #[test]
    fn test_sort_segments_numerically() {
        let mut paths: Vec<PathBuf> = ["segment_10.mp4", "notes.mp4", "segment_2.mp4", "segment_1.mp4"]
            .iter()
            .map(PathBuf::from)
            .collect();

        sort_segments(&mut paths).unwrap();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("segment_1.mp4"),
                PathBuf::from("segment_2.mp4"),
                PathBuf::from("segment_10.mp4"),
                PathBuf::from("notes.mp4"),
            ]
        );
    }

    #[test]
    fn test_directory_skips_manifests() {
        let dir = tempdir().unwrap();
        for name in ["seg_1.mp4", "seg_0.mp4", "recovery_x.json"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let segments = directory_segments(dir.path(), &dir.path().join("out.mp4")).unwrap();

        let names: Vec<_> = segments
            .iter()
            .map(|segment| segment.path.file_name().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["seg_0.mp4", "seg_1.mp4"]);
    }

    #[test]
    fn test_directory_skips_output() {
        let dir = tempdir().unwrap();
        for name in ["seg_0.mp4", "seg_1.mp4", "merged.mp4"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let segments = directory_segments(dir.path(), &dir.path().join("merged.mp4")).unwrap();

        assert_eq!(segments.len(), 2);
        assert!(segments
            .iter()
            .all(|segment| segment.path.file_name().unwrap() != "merged.mp4"));
    }

    #[test]
    fn test_output_matching_input_through_other_spelling() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let input = dir.path().join("a.mp4");
        std::fs::write(&input, b"x").unwrap();

        let result = check_output(
            &[Segment::new(&input, 0)],
            &dir.path().join("sub").join("..").join("a.mp4"),
        );

        assert!(result.unwrap_err().contains("a.mp4"));
        assert!(check_output(&[Segment::new(&input, 0)], &dir.path().join("b.mp4")).is_ok());
    }

    #[tokio::test]
    async fn test_output_among_inputs_leaves_segments_untouched() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"first segment").unwrap();
        std::fs::write(&b, b"second segment").unwrap();
        let cli = Cli::try_parse_from([
            OsStr::new("stitch"),
            OsStr::new("-o"),
            a.as_os_str(),
            a.as_os_str(),
            b.as_os_str(),
        ])
        .unwrap();

        let result = run(cli, RecorderConfig::immediate()).await;

        assert!(result.unwrap_err().to_string().contains("also an input segment"));
        assert_eq!(std::fs::read(&a).unwrap(), b"first segment");
        assert_eq!(std::fs::read(&b).unwrap(), b"second segment");
    }

    #[test]
    fn test_cli_rejects_manifest_with_files() {
        let result = Cli::try_parse_from(["stitch", "-o", "out.mp4", "--manifest", "m.json", "a.mp4"]);
        assert!(result.is_err());
    }
}
