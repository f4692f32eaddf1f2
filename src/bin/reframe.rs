use std::{error::Error, fmt, path::PathBuf, sync::Arc};

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reframe::{
    EncoderOptions, FfmpegLogLevel, FrameReplacer, ProgressCallback, ProgressInfo, ReframeError,
    ReplaceOptions, ReplaceReport, VideoCodec,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
    registry::LookupSpan,
};

const CLI_AFTER_HELP: &str = "Examples:\n  reframe -i input.mkv -r sr/frame_%05d.png -o output.mkv\n  reframe -i input.mp4 -r 'upscaled/*.png' -o output.mp4 --vscale 2 --progress\n  reframe -i input.mkv -r f_%d.png -o out.mkv --codec h265 --crf 18 --codec-opt preset=slow\n  reframe --completions zsh > _reframe";

const EXIT_CODES_HELP: &str = "Exit codes: 0 success, 1 usage or other error, 2 I/O, 3 demux, 4 missing substitute frame, 5 timestamp monotonicity violation, 6 encode";

#[derive(Debug, Parser)]
#[command(
    name = "reframe",
    version,
    about = "Replace every video frame with a numbered image, keeping the original timestamps",
    after_help = CLI_AFTER_HELP,
    after_long_help = format!("{CLI_AFTER_HELP}\n\n{EXIT_CODES_HELP}")
)]
struct Cli {
    /// Input video.
    #[arg(short, long, required_unless_present = "completions")]
    input: Option<PathBuf>,

    /// Replacement image pattern: `frame_%05d.png` or `frames/*.png`.
    #[arg(short, long, required_unless_present = "completions")]
    replacement: Option<String>,

    /// Output video. Its extension selects the container.
    #[arg(short, long, required_unless_present = "completions")]
    output: Option<PathBuf>,

    /// Upscale every replacement image by this integer factor.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    vscale: u32,

    /// File number of the image for the first frame [default: 1, or the
    /// smallest matched number for `*` patterns].
    #[arg(long)]
    start_number: Option<u64>,

    /// Allow replacing an existing output file.
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// Output codec (h264, h265, mpeg4).
    #[arg(long, default_value = "h264")]
    codec: VideoCodec,

    /// Specific FFmpeg encoder, e.g. libx265 or hevc_nvenc.
    #[arg(long)]
    encoder: Option<String>,

    /// Constant rate factor.
    #[arg(long)]
    crf: Option<u32>,

    /// Target bitrate in bits per second.
    #[arg(long)]
    bitrate: Option<usize>,

    /// Output pixel format.
    #[arg(long, default_value = "yuv420p")]
    pix_fmt: String,

    /// Extra encoder option as key=value. Repeatable.
    #[arg(long = "codec-opt", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    codec_opts: Vec<(String, String)>,

    /// Show a progress bar.
    #[arg(long)]
    progress: bool,

    /// Show debug logging.
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<FfmpegLogLevel>,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,

    /// Print shell completions and exit.
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    let (key, option_value) = value
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{value}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{value}`"));
    }
    Ok((key.to_string(), option_value.to_string()))
}

/// Renders events as `warning: message key=value` with coloured prefixes.
struct CliFormat;

impl<S, N> FormatEvent<S, N> for CliFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        match *event.metadata().level() {
            Level::ERROR => write!(writer, "{} ", "error:".red().bold())?,
            Level::WARN => write!(writer, "{} ", "warning:".yellow().bold())?,
            Level::INFO => {}
            _ => write!(writer, "{} ", "debug:".dimmed())?,
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}

/// Route `tracing` events and the library's `log` records to stderr.
/// `RUST_LOG` overrides the level chosen by `--verbose`.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .event_format(CliFormat)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn Error>> {
        let bar = ProgressBar::no_length();
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(timestamp) = info.current_timestamp {
            self.bar
                .set_message(format!("{:.3}s, {} reused", timestamp.as_secs_f64(), info.reused));
        }
    }
}

fn encoder_options(cli: &Cli) -> EncoderOptions {
    let mut options = EncoderOptions::default()
        .codec(cli.codec)
        .pixel_format(cli.pix_fmt.clone());
    if let Some(name) = &cli.encoder {
        options = options.encoder_name(name.clone());
    }
    if let Some(crf) = cli.crf {
        options = options.crf(crf);
    }
    if let Some(bitrate) = cli.bitrate {
        options = options.bitrate(bitrate);
    }
    for (key, value) in &cli.codec_opts {
        options = options.option(key.clone(), value.clone());
    }
    options
}

fn print_report(report: &ReplaceReport) {
    println!("{} {}", "saved".green().bold(), report.output.display());
    println!(
        "frames={} reused={} duration={:.3}s ({} ticks at {}/{})",
        report.frames,
        report.reused,
        report.total_duration().as_secs_f64(),
        report.total_duration_ticks,
        report.time_base.numerator(),
        report.time_base.denominator(),
    );
    println!(
        "video={}x{} encoder={} copied_streams={} vfr={}",
        report.width,
        report.height,
        report.encoder,
        report.passthrough_streams,
        report.timing.is_variable_frame_rate(),
    );
    if let Some(index) = report.first_reused_index {
        println!(
            "{} substitutes ran out at frame {index}; earlier images were reused",
            "note:".cyan().bold()
        );
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "reframe", &mut std::io::stdout());
        return Ok(());
    }

    init_logging(cli.verbose);
    if let Some(level) = cli.log_level {
        reframe::set_ffmpeg_log_level(level);
    }

    let (Some(input), Some(replacement), Some(output)) =
        (cli.input.clone(), cli.replacement.clone(), cli.output.clone())
    else {
        return Err("--input, --replacement, and --output are required".into());
    };

    if output.exists() && cli.overwrite {
        tracing::warn!("overwriting {}", output.display());
    }

    let mut options = ReplaceOptions::new()
        .with_scale(cli.vscale)
        .with_overwrite(cli.overwrite)
        .with_encoder(encoder_options(&cli))
        .with_batch_size(10);
    if let Some(start_number) = cli.start_number {
        options = options.with_start_number(start_number);
    }

    let progress = if cli.progress {
        let progress = Arc::new(TerminalProgress::new()?);
        options = options.with_progress(progress.clone());
        Some(progress)
    } else {
        None
    };

    let result = FrameReplacer::new(input, replacement, output)
        .options(options)
        .run();

    if let Some(progress) = &progress {
        match &result {
            Ok(_) => progress.bar.finish_and_clear(),
            Err(_) => progress.bar.abandon(),
        }
    }
    let report = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            std::process::exit(if error.use_stderr() { 1 } else { 0 });
        }
    };

    if let Err(error) = run(cli) {
        eprintln!("{} {error}", "error:".red().bold());
        let code = error
            .downcast_ref::<ReframeError>()
            .map_or(1, ReframeError::exit_code);
        std::process::exit(code);
    }
}
