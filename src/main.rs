mod args;
mod colors;
mod config;
mod context;
mod extract;
mod fetch;
mod link;
mod vars;
mod version;

use crate::args::Args;
use crate::colors::*;
use crate::config::*;
use crate::context::Context;
use crate::extract::extract_with_context;
use crate::fetch::{FetchError, FetchRequest, Fetcher};
use crate::link::replace_link;
use crate::version::Version;
use anyhow::Context as _;
use clap::Parser;
use std::env;
use std::path::{self, Path, PathBuf};
use std::time::{Duration, Instant};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{level_filters::*, *};
use tracing_subscriber::EnvFilter;

// Exit code used in case there were no errors.
#[doc(hidden)]
const EXIT_OK: i32 = 0;

// Exit code used in case of errors.
#[doc(hidden)]
const EXIT_NOK: i32 = 1;

/// Main entry point for the application.
fn main() {
    // enable ansi support to use colorised/styled output
    #[cfg(windows)]
    let _ = nu_ansi_term::enable_ansi_support();

    // delegate
    if let Err(err) = internal_main() {
        let err_str = ATTENTION_COLOR.paint(format!("err = {err:#}"));
        eprintln!("Failed! {err_str}");
        debug!("{err:?}");
        std::process::exit(EXIT_NOK);
    } else {
        std::process::exit(EXIT_OK);
    }
}

// Internal main entry point for the application.
#[doc(hidden)]
fn internal_main() -> anyhow::Result<()> {
    // remember start date/time
    let start = Instant::now();

    // parse arguments
    let args = Args::parse();

    // print some information
    if !args.quiet || args.version {
        print_info();
    }

    // stop here in case only the version was requested
    if args.version {
        return Ok(());
    }

    // init tracing
    init_tracing(&args);

    // print parsed arguments
    trace!("arguments: {args:#?}");

    // load config (if any)
    let cwd = env::current_dir().context("failed to determine current directory")?;
    let (config, basedir) = load_config(&args, &cwd)?;
    let options = Options::resolve(&args, &config, &basedir, &cwd)?;
    debug!(?options);

    // print the plan
    if !args.quiet {
        let release = INFO_COLOR.paint(format!("{} ({})", options.release, options.flavor));
        println!("Installing release {release} from {}{}", options.url, options.release_path);
        println!("Unpacking into {}", PATH_COLOR.paint(options.source.to_string_lossy()));
        println!(
            "Linking into {}: {} -> {}",
            PATH_COLOR.paint(options.destination.to_string_lossy()),
            PATH_COLOR.paint(options.link_target.to_string_lossy()),
            PATH_COLOR.paint(options.link_source.to_string_lossy())
        );
    }

    if args.dry_run {
        let not = ATTENTION_COLOR.paint("NOT");
        println!("dry-run: {not} installing release");
        return Ok(());
    }

    let ctx = Context::with_optional_timeout(options.timeout);
    set_ctrlc_handler(&ctx)?;

    let fetcher = Fetcher::default();
    install(&ctx, &fetcher, &options)?;

    // print some statistics
    if !args.quiet {
        let installed = SUCCESS_COLOR.paint("Installed");
        println!("{installed} {}", PATH_COLOR.paint(options.link_target.to_string_lossy()));
        let elapsed = start.elapsed();
        println!("Total time: {}", format_elapsed(elapsed));
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        println!("Finished at: {}", format_now(now));
    }

    Ok(())
}

// Loads the configuration given on the command line or the default configuration file (if present).
//
// Returns the configuration together with the directory relative paths within are resolved against.
#[doc(hidden)]
fn load_config(args: &Args, cwd: &Path) -> anyhow::Result<(Config, PathBuf)> {
    let config_path = match &args.config {
        Some(config) => PathBuf::from(config),
        None => {
            let config_path = cwd.join(CONFIG_FILENAME);
            if !config_path.is_file() {
                trace!("no configuration file");
                return Ok((Config::default(), cwd.to_path_buf()));
            }
            config_path
        }
    };
    let config_path = path::absolute(&config_path).unwrap_or(config_path);
    println!("Using configuration from {}.", PATH_COLOR.paint(config_path.to_string_lossy()));
    let config = Config::load_from_file(&config_path).with_context(|| format!("failed to load configuration from {}", config_path.display()))?;
    debug!(?config);

    // derive base directory from config file
    let basedir = config_path.parent().map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
    debug!(basedir = %basedir.display());

    Ok((config, basedir))
}

// Fetches and unpacks the release and links the executable.
#[instrument(level = "trace", skip_all)]
fn install(ctx: &Context, fetcher: &Fetcher, options: &Options) -> anyhow::Result<()> {
    let request = FetchRequest::new(&options.url, &options.release_path);
    let stream = fetcher.fetch(ctx, &request).map_err(|err| {
        let stage = match err {
            FetchError::Cancelled => "fetch failed (cancelled)",
            _ if err.is_transport() => "fetch failed (server not reachable)",
            _ => "fetch failed",
        };
        anyhow::Error::new(err).context(stage)
    })?;
    debug!(url = %stream.url(), content_length = ?stream.content_length());

    let summary = extract_with_context(ctx, &options.source, stream).context("extract failed")?;
    info!(directories = summary.directories, files = summary.files, skipped = summary.skipped, "unpacked release");

    replace_link(&options.link_source, &options.link_target).context("link failed")?;

    Ok(())
}

// Cancels the context on the first Ctrl+C (the running stage stops and reports), exits on the second one.
#[doc(hidden)]
fn set_ctrlc_handler(ctx: &Context) -> anyhow::Result<()> {
    let ctx = ctx.clone();
    ctrlc::set_handler(move || {
        if ctx.is_cancelled() {
            std::process::exit(EXIT_NOK);
        }
        eprintln!("{}", ATTENTION_COLOR.paint("Cancelling (press Ctrl+C again to exit immediately)"));
        ctx.cancel_handle().cancel();
    })?;

    Ok(())
}

// Formats the elapsed time (seconds resolution).
#[doc(hidden)]
fn format_elapsed(elapsed: Duration) -> String {
    // null out everything below seconds
    let elapsed = Duration::from_secs(elapsed.as_secs());

    // format the remaining duration
    humantime::format_duration(elapsed).to_string()
}

// Formats the given date/time in the local offset.
#[doc(hidden)]
fn format_now(now: OffsetDateTime) -> String {
    // define format
    const FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]");

    // local offset or UTC
    let offset = UtcOffset::current_local_offset();
    let offset = offset.unwrap_or(UtcOffset::UTC);
    trace!(?offset);

    // format
    let now = now.to_offset(offset);
    now.format(&FORMAT).unwrap_or(now.to_string())
}

// Prints some information (version, path of executable, etc.).
#[doc(hidden)]
fn print_info() {
    let version = Version::default();
    if let Ok(exe) = std::env::current_exe() {
        let exe = PATH_COLOR.paint(exe.to_string_lossy());
        println!("{version} [{exe}]");
    } else {
        println!("{version}");
    }
}

// Initialises the tracing framework based on given command line arguments.
#[doc(hidden)]
fn init_tracing(args: &Args) {
    let level_filter = match args.verbose {
        0 => LevelFilter::ERROR.into(),
        1 => LevelFilter::WARN.into(),
        2 => LevelFilter::INFO.into(),
        3 => LevelFilter::DEBUG.into(),
        _ => LevelFilter::TRACE.into(),
    };
    let env_filter = EnvFilter::from_default_env().add_directive(level_filter);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::extract::tests::{TestEntry, archive};
    use crate::fetch::tests::{http_response, serve_once, test_fetcher};
    use tempfile::tempdir;
    use test_log::test;

    fn options(url: String, source: PathBuf, destination: PathBuf) -> Options {
        Options {
            link_source: source.join("nvim-linux64/bin/nvim"),
            link_target: destination.join("bin/nvim"),
            source,
            destination,
            release: "stable".to_string(),
            flavor: "linux64".to_string(),
            url,
            timeout: Some(Duration::from_secs(30)),
            release_path: "/neovim/neovim/releases/download/stable/nvim-linux64.tar.gz".to_string(),
        }
    }

    #[test]
    fn format_elapsed_drops_subseconds() {
        assert_eq!(format_elapsed(Duration::from_millis(61_999)), "1m 1s");
    }

    #[cfg(unix)]
    #[test]
    fn install_end_to_end() {
        let body = archive(&[
            TestEntry::Dir("nvim-linux64/"),
            TestEntry::Dir("nvim-linux64/bin/"),
            TestEntry::File("nvim-linux64/bin/nvim", b"#!/bin/sh\n", 0o755),
        ]);
        let (url, requests) = serve_once(http_response("200 OK", &body));
        let tempdir = tempdir().unwrap();
        let source = tempdir.path().join("opt");
        let destination = tempdir.path().join("prefix");
        std::fs::create_dir(&source).unwrap();

        let options = options(url, source.clone(), destination.clone());
        install(&Context::background(), &test_fetcher(), &options).unwrap();

        assert_eq!(requests.recv().unwrap(), "GET /neovim/neovim/releases/download/stable/nvim-linux64.tar.gz HTTP/1.1");
        assert_eq!(std::fs::read_link(destination.join("bin/nvim")).unwrap(), source.join("nvim-linux64/bin/nvim"));
        assert_eq!(std::fs::read(destination.join("bin/nvim")).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn install_reports_fetch_stage() {
        let (url, _requests) = serve_once(http_response("404 Not Found", b""));
        let tempdir = tempdir().unwrap();
        let options = options(url, tempdir.path().to_path_buf(), tempdir.path().join("prefix"));

        let err = install(&Context::background(), &test_fetcher(), &options).unwrap_err();
        assert_eq!(err.to_string(), "fetch failed");
        assert!(matches!(err.downcast_ref::<FetchError>(), Some(FetchError::UnexpectedStatus { code: 404 })));
        assert!(!tempdir.path().join("prefix").exists());
    }

    #[test]
    fn install_reports_unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let tempdir = tempdir().unwrap();
        let options = options(url, tempdir.path().to_path_buf(), tempdir.path().join("prefix"));

        let err = install(&Context::background(), &test_fetcher(), &options).unwrap_err();
        assert_eq!(err.to_string(), "fetch failed (server not reachable)");
    }

    #[test]
    fn install_reports_cancellation() {
        let (url, _requests) = serve_once(http_response("404 Not Found", b""));
        let tempdir = tempdir().unwrap();
        let options = options(url, tempdir.path().to_path_buf(), tempdir.path().join("prefix"));
        let ctx = Context::background();
        ctx.cancel_handle().cancel();

        let err = install(&ctx, &test_fetcher(), &options).unwrap_err();
        assert_eq!(err.to_string(), "fetch failed (cancelled)");
        assert_eq!(format!("{err:#}"), "fetch failed (cancelled): transport error: request cancelled");
        assert!(!tempdir.path().join("prefix").exists());
    }

    #[test]
    fn install_reports_extract_stage() {
        let (url, _requests) = serve_once(http_response("200 OK", b"garbage"));
        let tempdir = tempdir().unwrap();
        let options = options(url, tempdir.path().join("missing"), tempdir.path().join("prefix"));

        let err = install(&Context::background(), &test_fetcher(), &options).unwrap_err();
        assert_eq!(err.to_string(), "extract failed");
        assert!(matches!(err.downcast_ref::<crate::extract::ExtractError>(), Some(crate::extract::ExtractError::DestinationMissing(_))));
    }
}
