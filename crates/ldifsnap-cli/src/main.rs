//! ldifsnap - Inspect LDIF directory dumps as typed Active Directory snapshots
//!
//! This tool indexes LDIF exports, decodes their binary attributes and
//! reports what a snapshot consumer would see: the synthesized header, the
//! schema registries and the objects themselves.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use ldifsnap_core::{DirectoryObject, Snapshot, SnapshotConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Category label for objects whose category does not resolve
const UNCATEGORIZED: &str = "(none)";

/// Inspect LDIF directory dumps as typed Active Directory snapshots
#[derive(Parser, Debug)]
#[command(name = "ldifsnap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Server name to report in the snapshot header
    #[arg(long, default_value = "ldifdump")]
    server_name: String,

    /// Only list the indexed distinguished names
    #[arg(long, conflicts_with = "dn")]
    list_only: bool,

    /// Print the decoded attributes of a single object
    #[arg(long)]
    dn: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single LDIF file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of LDIF files to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Outcome of walking a directory
#[derive(Debug, Default, PartialEq, Eq)]
struct WalkStats {
    processed: usize,
    failed: usize,
}

/// What a full pass over a snapshot found
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    objects: usize,
    class_keys: usize,
    properties: usize,
    /// Resolved category -> number of objects
    categories: BTreeMap<String, usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory).map(|_| ())
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Process a single LDIF file
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    process_ldif(cli, file)
}

/// Process every LDIF file below a directory
fn process_directory(cli: &Cli, directory: &Path) -> Result<WalkStats> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut stats = WalkStats::default();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_ldif_file(path) {
            trace!("Skipping: {}", path.display());
            continue;
        }

        debug!("Processing LDIF file: {}", path.display());
        match process_ldif(cli, path) {
            Ok(()) => stats.processed += 1,
            Err(e) => {
                // Log error but continue with other files
                warn!("Error processing {}: {:#}", path.display(), e);
                stats.failed += 1;
            }
        }
    }

    info!(
        "Processed {} LDIF files ({} failed)",
        stats.processed, stats.failed
    );
    Ok(stats)
}

/// Visible files with an `.ldif` extension
fn is_ldif_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);

    let ldif = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("ldif"))
        .unwrap_or(false);

    !hidden && ldif
}

fn open_snapshot(cli: &Cli, path: &Path) -> Result<Snapshot> {
    let config = SnapshotConfig::new().server_name(cli.server_name.clone());
    let mut snapshot = Snapshot::open_with_config(path, config)
        .with_context(|| format!("Failed to open LDIF file: {}", path.display()))?;

    snapshot
        .parse_header()
        .with_context(|| format!("Failed to index LDIF file: {}", path.display()))?;
    Ok(snapshot)
}

/// Process one LDIF file according to the selected mode
fn process_ldif(cli: &Cli, path: &Path) -> Result<()> {
    let mut snapshot = open_snapshot(cli, path)?;

    if cli.list_only {
        if let Some(index) = snapshot.index() {
            for (dn, _) in index.iter() {
                println!("{}", dn);
            }
        }
        return Ok(());
    }

    snapshot
        .parse_classes()
        .with_context(|| format!("Failed to collect schema from: {}", path.display()))?;

    if let Some(ref dn) = cli.dn {
        let obj = snapshot
            .object_by_dn(dn)
            .with_context(|| format!("Failed to read object '{}'", dn))?;
        print_object(&obj);
        return Ok(());
    }

    let summary = summarize(&mut snapshot)?;
    print_summary(&snapshot, &summary);
    Ok(())
}

/// Walk every object once and tally categories
fn summarize(snapshot: &mut Snapshot) -> Result<Summary> {
    let mut summary = Summary {
        class_keys: snapshot.classes().len(),
        properties: snapshot.properties().len(),
        ..Summary::default()
    };

    for obj in snapshot.objects() {
        let obj = obj?;
        let category = obj
            .category()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        *summary.categories.entry(category).or_default() += 1;
        summary.objects += 1;
    }

    Ok(summary)
}

fn print_summary(snapshot: &Snapshot, summary: &Summary) {
    println!("File:        {}", snapshot.path().display());
    if let Some(header) = snapshot.header() {
        println!("Server:      {}", header.server);
        println!("Modified:    {}", header.filetime_unix);
    }
    println!("Objects:     {}", summary.objects);
    println!("Class keys:  {}", summary.class_keys);
    println!("Properties:  {}", summary.properties);
    for (category, count) in &summary.categories {
        println!("  {:<24} {}", category, count);
    }
}

fn print_object(obj: &DirectoryObject) {
    println!("dn: {}", obj.dn());
    for (name, values) in obj.attributes().iter() {
        for value in values {
            println!("{}: {}", name, value);
        }
    }
    if let Some(category) = obj.category() {
        println!("# category: {}", category);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const DUMP: &str = "\
dn: CN=Person,CN=Schema,CN=Configuration,DC=example,DC=com
objectClass: classSchema
cn: Person
distinguishedName: CN=Person,CN=Schema,CN=Configuration,DC=example,DC=com

dn: CN=alice,CN=Users,DC=example,DC=com
objectClass: user
cn: alice
objectCategory: CN=Person,CN=Schema,CN=Configuration,DC=example,DC=com

dn: CN=bob,CN=Users,DC=example,DC=com
objectClass: user
cn: bob
objectCategory: CN=Person,CN=Schema,CN=Configuration,DC=example,DC=com
";

    fn cli_for(file: &Path) -> Cli {
        Cli::parse_from(["ldifsnap", "--file", file.to_str().unwrap()])
    }

    #[test]
    fn test_summarize_counts_categories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dump.ldif");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(DUMP.as_bytes())
            .unwrap();

        let cli = cli_for(&path);
        let mut snapshot = open_snapshot(&cli, &path).unwrap();
        snapshot.parse_classes().unwrap();
        let summary = summarize(&mut snapshot).unwrap();

        assert_eq!(summary.objects, 3);
        assert_eq!(summary.properties, 0);
        assert_eq!(summary.categories.get("person"), Some(&2));
        assert_eq!(summary.categories.get(UNCATEGORIZED), Some(&1));
    }

    #[test]
    fn test_corrupt_file_reports_context() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.ldif");
        std::fs::write(&path, "cn: no dn here\n").unwrap();

        let err = process_ldif(&cli_for(&path), &path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to index LDIF file"));
    }

    #[test]
    fn test_is_ldif_file() {
        assert!(is_ldif_file(Path::new("/tmp/dump.ldif")));
        assert!(is_ldif_file(Path::new("/tmp/DUMP.LDIF")));
        assert!(!is_ldif_file(Path::new("/tmp/.hidden.ldif")));
        assert!(!is_ldif_file(Path::new("/tmp/dump.json")));
        assert!(!is_ldif_file(Path::new("/tmp/dump")));
    }

    #[test]
    fn test_directory_counts_only_successes() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("dump.ldif"), DUMP).unwrap();
        std::fs::write(temp_dir.path().join("broken.ldif"), "cn: no dn here\n").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "not ldif").unwrap();

        let dir = temp_dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["ldifsnap", "--directory", dir, "--list-only"]);
        let stats = process_directory(&cli, temp_dir.path()).unwrap();

        assert_eq!(stats, WalkStats { processed: 1, failed: 1 });
    }

    #[test]
    fn test_input_flags() {
        let cli = Cli::try_parse_from(["ldifsnap", "-f", "dump.ldif", "--list-only"]).unwrap();
        assert_eq!(cli.input.file, Some(PathBuf::from("dump.ldif")));
        assert!(cli.list_only);

        // Exactly one input mode
        assert!(Cli::try_parse_from(["ldifsnap", "--list-only"]).is_err());
        assert!(Cli::try_parse_from(["ldifsnap", "-f", "a.ldif", "-d", "dir"]).is_err());
        assert!(Cli::try_parse_from(["ldifsnap", "dump.ldif"]).is_err());
    }

    #[test]
    fn test_list_conflicts_with_dn() {
        let result = Cli::try_parse_from([
            "ldifsnap",
            "--file",
            "dump.ldif",
            "--list-only",
            "--dn",
            "CN=x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
