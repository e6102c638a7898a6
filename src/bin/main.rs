use clap::{Arg, ArgAction, Command};
use log::{debug, error, info, warn};
use mathdown2pdf::config::{self, ConfigSource};
use mathdown2pdf::session::{EditorSession, LogIndicator};
use mathdown2pdf::styling::StyleMatch;
use mathdown2pdf::surface::RecordingSurface;
use mathdown2pdf::{markdown, pdf, validation, MdpError};
#[cfg(feature = "fetch")]
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Debug)]
enum AppError {
    FileReadError(std::io::Error),
    ConversionError(MdpError),
    UsageError(String),
    #[cfg(feature = "fetch")]
    NetworkError(String),
}

impl From<MdpError> for AppError {
    fn from(e: MdpError) -> Self {
        AppError::ConversionError(e)
    }
}

/// Verbosity level for output
#[derive(Debug, Clone, Copy, PartialEq)]
enum Verbosity {
    Quiet,   // No output except errors
    Normal,  // Standard output
    Verbose, // Detailed output
}

impl Verbosity {
    fn from_matches(matches: &clap::ArgMatches) -> Self {
        if matches.get_flag("quiet") {
            Verbosity::Quiet
        } else if matches.get_flag("verbose") {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn default_filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
        }
    }
}

fn get_markdown_input(matches: &clap::ArgMatches) -> Result<String, AppError> {
    if let Some(file_path) = matches.get_one::<String>("path") {
        return fs::read_to_string(file_path).map_err(AppError::FileReadError);
    }

    #[cfg(feature = "fetch")]
    if let Some(url) = matches.get_one::<String>("url") {
        return Client::new()
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::NetworkError(e.to_string()))?
            .text()
            .map_err(|e| AppError::NetworkError(e.to_string()));
    }

    if let Some(markdown_string) = matches.get_one::<String>("string") {
        Ok(markdown_string.to_string())
    } else if matches.get_flag("example") {
        Ok(String::new())
    } else {
        Err(AppError::UsageError("No input provided".to_string()))
    }
}

/// Resolves the style table.
///
/// Priority order:
/// 1. `--config FILE`, which must exist and parse
/// 2. `./mathdown2pdfrc.toml` or `<config dir>/mathdown2pdf/config.toml`
/// 3. built-in defaults
fn get_style(matches: &clap::ArgMatches) -> Result<StyleMatch, AppError> {
    if let Some(config_file) = matches.get_one::<String>("config") {
        return Ok(config::load_config_file(config_file)?);
    }
    match config::discover_config_file() {
        Some(path) => {
            debug!("using configuration {}", path.display());
            let path = path.to_string_lossy();
            Ok(config::load_config_from_source(ConfigSource::File(&path)))
        }
        None => Ok(config::load_config_from_source(ConfigSource::Default)),
    }
}

fn get_output_dir(matches: &clap::ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("output-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn run(matches: clap::ArgMatches) -> Result<(), AppError> {
    let verbosity = Verbosity::from_matches(&matches);

    let style = get_style(&matches)?;
    let mut session = EditorSession::new(style).with_content(get_markdown_input(&matches)?);
    if let Some(name) = matches.get_one::<String>("filename") {
        session = session.with_filename(name.as_str());
    }
    if matches.get_flag("example") {
        session.insert_example();
    }

    if matches.get_flag("word-count") {
        println!("{}", session.word_count());
        return Ok(());
    }

    if let Some(tree_path) = matches.get_one::<String>("dump-tree") {
        let document = markdown::parse(&session.content)?;
        document
            .save_to_json_file(tree_path)
            .map_err(|e| MdpError::IoError {
                message: format!("Cannot write tree dump: {}", e),
                path: tree_path.to_string(),
                suggestion: "Check that the directory exists and is writable".to_string(),
            })?;
        if verbosity != Verbosity::Quiet {
            println!("✅ Wrote document tree to {}", tree_path);
        }
        return Ok(());
    }

    let output_dir = get_output_dir(&matches);
    let output_path = output_dir.join(format!("{}.pdf", pdf::basename(&session.filename)));

    if verbosity != Verbosity::Quiet {
        let warnings =
            validation::validate_conversion(&session.content, output_path.to_str());
        if !warnings.is_empty() {
            info!("🔍 Pre-flight validation:");
            for warning in &warnings {
                warn!("{}", warning);
            }
        } else {
            info!("✓ Pre-flight validation passed");
        }
    }

    if matches.get_flag("dry-run") {
        let document = markdown::parse(&session.content)?;
        let mut surface = RecordingSurface::new();
        let mut resolver = pdf::resolver_for(&session.style);
        let report =
            pdf::render_to_surface(&document, &mut surface, &session.style, &mut resolver)?;
        if verbosity != Verbosity::Quiet {
            println!(
                "✓ Dry-run complete: {} page(s), {} block(s), {} equation fallback(s), {} skipped. No PDF generated.",
                report.pages,
                report.blocks.len(),
                report.equation_failures,
                report.skipped
            );
        }
        return Ok(());
    }

    let path = session.export(&output_dir, &mut LogIndicator)?;

    if verbosity != Verbosity::Quiet {
        println!("✅ Successfully saved PDF to {}", path.display());
        if verbosity == Verbosity::Verbose {
            print_size(&path);
        }
    }
    Ok(())
}

fn print_size(path: &Path) {
    if let Ok(metadata) = fs::metadata(path) {
        let size_kb = metadata.len() as f64 / 1024.0;
        if size_kb < 1024.0 {
            println!("   Size: {:.1} KB", size_kb);
        } else {
            println!("   Size: {:.2} MB", size_kb / 1024.0);
        }
    }
}

fn build_cli() -> Command {
    let cmd = Command::new("mathdown2pdf")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Render Markdown with LaTeX equations to PDF")
        .after_help(
            "EXAMPLES:\n  \
            mathdown2pdf -p notes.md -f notes -o out/\n  \
            mathdown2pdf -s \"# Energy\n\nHello \\$E=mc^2\\$ world.\"\n  \
            mathdown2pdf -p notes.md --dry-run --verbose\n  \
            mathdown2pdf --example --dump-tree tree.json\n",
        )
        .arg({
            let arg = Arg::new("path")
                .short('p')
                .long("path")
                .value_name("FILE_PATH")
                .help("Path to the markdown file");
            #[cfg(feature = "fetch")]
            let arg = arg.conflicts_with_all(["string", "url"]);
            #[cfg(not(feature = "fetch"))]
            let arg = arg.conflicts_with("string");
            arg
        })
        .arg({
            let arg = Arg::new("string")
                .short('s')
                .long("string")
                .value_name("MARKDOWN_STRING")
                .help("Markdown content as a string");
            #[cfg(feature = "fetch")]
            let arg = arg.conflicts_with_all(["path", "url"]);
            #[cfg(not(feature = "fetch"))]
            let arg = arg.conflicts_with("path");
            arg
        });

    #[cfg(feature = "fetch")]
    let cmd = cmd.arg(
        Arg::new("url")
            .short('u')
            .long("url")
            .value_name("URL")
            .help("URL to fetch markdown content from (requires 'fetch' feature)")
            .conflicts_with_all(["string", "path"]),
    );

    cmd.arg(
        Arg::new("example")
            .long("example")
            .help("Append the bundled example document to the input")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new("filename")
            .short('f')
            .long("filename")
            .value_name("NAME")
            .help("Basename of the generated PDF (defaults to documento)"),
    )
    .arg(
        Arg::new("output-dir")
            .short('o')
            .long("output-dir")
            .value_name("DIR")
            .help("Directory the PDF is written to (defaults to the current directory)"),
    )
    .arg(
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("CONFIG_FILE")
            .help("Path to configuration file (TOML format). Auto-detects mathdown2pdfrc.toml if not specified"),
    )
    .arg(
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Show detailed output including validation warnings and file size")
            .action(ArgAction::SetTrue)
            .conflicts_with("quiet"),
    )
    .arg(
        Arg::new("quiet")
            .short('q')
            .long("quiet")
            .help("Suppress all output except errors")
            .action(ArgAction::SetTrue)
            .conflicts_with("verbose"),
    )
    .arg(
        Arg::new("dry-run")
            .long("dry-run")
            .help("Lay the document out without writing a PDF")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new("word-count")
            .long("word-count")
            .help("Print the number of words in the input and exit")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new("dump-tree")
            .long("dump-tree")
            .value_name("FILE")
            .help("Write the parsed document tree as JSON and exit"),
    )
    .arg(
        Arg::new("get-default-configuration")
            .long("get-default-configuration")
            .help("Print a default mathdown2pdfrc.toml to stdout and exit")
            .action(ArgAction::SetTrue),
    )
}

fn has_input(matches: &clap::ArgMatches) -> bool {
    #[cfg(feature = "fetch")]
    let has_url = matches.contains_id("url");
    #[cfg(not(feature = "fetch"))]
    let has_url = false;

    matches.contains_id("path")
        || matches.contains_id("string")
        || matches.get_flag("example")
        || has_url
}

fn main() {
    let mut cmd = build_cli();
    let matches = cmd.clone().get_matches();

    let verbosity = Verbosity::from_matches(&matches);
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(verbosity.default_filter()),
    )
    .format_timestamp_millis()
    .init();

    if matches.get_flag("get-default-configuration") {
        match config::default_config_toml() {
            Some(toml) => print!("{}", toml),
            None => {
                error!("[X] The default configuration is missing from this build");
                process::exit(1);
            }
        }
        process::exit(0);
    }

    if !has_input(&matches) {
        let _ = cmd.print_help();
        println!();
        process::exit(1);
    }

    if let Err(e) = run(matches) {
        match e {
            AppError::FileReadError(e) => error!("[X] Error reading file: {}", e),
            AppError::ConversionError(e) => error!("[X] {}", e),
            AppError::UsageError(e) => error!("[X] {}", e),
            #[cfg(feature = "fetch")]
            AppError::NetworkError(e) => error!("[X] Network error: {}", e),
        }
        process::exit(1);
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn input_from_string_and_file() {
        let matches = build_cli().get_matches_from(["mathdown2pdf", "-s", "# Hello"]);
        assert!(get_markdown_input(&matches).unwrap().contains("Hello"));

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.md");
        fs::write(&file, "# From file").unwrap();
        let matches = build_cli().get_matches_from(["mathdown2pdf", "-p", file.to_str().unwrap()]);
        assert!(get_markdown_input(&matches).unwrap().contains("From file"));
    }

    #[test]
    fn string_and_path_conflict() {
        let result = build_cli().try_get_matches_from(["mathdown2pdf", "-s", "x", "-p", "y.md"]);
        assert!(result.is_err());
    }

    #[test]
    fn output_dir_defaults_to_current_directory() {
        let matches = build_cli().get_matches_from(["mathdown2pdf", "-s", "x"]);
        assert_eq!(get_output_dir(&matches), PathBuf::from("."));
        let matches = build_cli().get_matches_from(["mathdown2pdf", "-s", "x", "-o", "out"]);
        assert_eq!(get_output_dir(&matches), PathBuf::from("out"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let matches =
            build_cli().get_matches_from(["mathdown2pdf", "-s", "x", "-c", "missing-config.toml"]);
        assert!(matches!(
            get_style(&matches),
            Err(AppError::ConversionError(MdpError::IoError { .. }))
        ));
    }

    #[test]
    fn verbosity_flags_map_to_log_filters() {
        let matches = build_cli().get_matches_from(["mathdown2pdf", "-s", "x", "-q"]);
        assert_eq!(Verbosity::from_matches(&matches).default_filter(), "error");
        let matches = build_cli().get_matches_from(["mathdown2pdf", "-s", "x", "-v"]);
        assert_eq!(Verbosity::from_matches(&matches), Verbosity::Verbose);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let matches = build_cli().get_matches_from([
            "mathdown2pdf",
            "-s",
            "# Small",
            "-o",
            dir.path().to_str().unwrap(),
            "--dry-run",
            "-c",
            "/dev/null",
        ]);
        assert!(run(matches).is_ok());
        assert!(!dir.path().join("documento.pdf").exists());
    }
}
