use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use frameseek::{DecodeOptions, FrameSeekError, MediaFile, RowOrder};
use image::{RgbImage, imageops};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  frameseek info input.mov --json\n  frameseek frame input.mov 1200 --out frame.png --nearest\n  frameseek frame input.mov 1200 --out frame.rgb --bottom-up\n  frameseek frames input.mp4 --out frames --start 100 --end 199 --progress\n  frameseek completions zsh > _frameseek";

#[derive(Debug, Parser)]
#[command(
    name = "frameseek",
    version,
    about = "Decode exact frames from video files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Print library diagnostics to stderr.
    #[arg(long, global = true)]
    verbose: bool,

    /// FFmpeg log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the video streams of a file.
    #[command(about = "Show video stream information")]
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Decode one frame to an image, or to raw RGB24 with a `.rgb`/`.raw`
    /// extension.
    #[command(about = "Decode a single frame")]
    Frame {
        input: PathBuf,
        frame: u64,
        #[arg(long)]
        out: PathBuf,
        /// Fall back to the nearest decodable frame.
        #[arg(long)]
        nearest: bool,
        /// Extra seek attempts after the first one.
        #[arg(long, default_value_t = frameseek::configuration::DEFAULT_MAX_RETRIES)]
        retries: u32,
        /// Video stream to decode.
        #[arg(long, default_value_t = 0)]
        stream: usize,
        /// Write rows bottom-up.
        #[arg(long)]
        bottom_up: bool,
    },

    /// Decode a range of frames in order into a directory.
    #[command(about = "Decode a range of frames")]
    Frames {
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        start: Option<u64>,
        #[arg(long)]
        end: Option<u64>,
        #[arg(long, default_value = "png")]
        ext: String,
        #[arg(long, default_value_t = 0)]
        stream: usize,
        #[arg(long)]
        progress: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match value.to_ascii_lowercase().as_str() {
        "off" | "quiet" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" | "verbose" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

fn is_raw_output(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            extension.eq_ignore_ascii_case("rgb") || extension.eq_ignore_ascii_case("raw")
        })
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if global.verbose {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .parse_default_env()
            .init();
    }

    frameseek::initialize()?;
    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        frameseek::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

fn open_input(input: &Path) -> Result<MediaFile<frameseek::FfmpegBackend>, FrameSeekError> {
    MediaFile::open_path(input)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Info { input, json } => {
            let file = open_input(&input)?;
            let streams = (0..file.stream_count())
                .map(|index| file.stream_metadata(index))
                .collect::<Result<Vec<_>, _>>()?;

            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "streams": streams.iter().map(|stream| json!({
                        "container_index": stream.container_index,
                        "codec": stream.codec,
                        "width": stream.info.width,
                        "height": stream.info.height,
                        "pixel_aspect": stream.info.pixel_aspect,
                        "frame_count": stream.info.frame_count,
                        "frame_rate": {
                            "numerator": stream.frame_rate.numerator,
                            "denominator": stream.frame_rate.denominator,
                        },
                        "time_base": {
                            "numerator": stream.time_base.numerator,
                            "denominator": stream.time_base.denominator,
                        },
                        "start_pts": stream.start_pts,
                        "codec_delay": stream.codec_delay,
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("File: {}", input.display());
                for (index, stream) in streams.iter().enumerate() {
                    println!(
                        "Stream {index} (#{}): {}x{} @ {:.3} fps, {} frames, aspect {:.4} [{}]",
                        stream.container_index,
                        stream.info.width,
                        stream.info.height,
                        stream.frame_rate.as_f64(),
                        stream.info.frame_count,
                        stream.info.pixel_aspect,
                        stream.codec,
                    );
                }
            }
        }
        Commands::Frame {
            input,
            frame,
            out,
            nearest,
            retries,
            stream,
            bottom_up,
        } => {
            let file = open_input(&input)?;
            let row_order = if bottom_up {
                RowOrder::BottomUp
            } else {
                RowOrder::TopDown
            };
            let options = DecodeOptions::new()
                .with_load_nearest(nearest)
                .with_max_retries(retries)
                .with_stream(stream)
                .with_row_order(row_order);

            let info = file.info(stream)?;
            let mut buffer = vec![0u8; info.rgb_buffer_len()];
            let delivered = if is_raw_output(&out) {
                let delivered = file.decode_with(&mut buffer, frame, &options)?;
                fs::write(&out, &buffer)?;
                delivered
            } else {
                // Images are encoded top-down; flip after decoding instead.
                let top_down = options.with_row_order(RowOrder::TopDown);
                let delivered = file.decode_with(&mut buffer, frame, &top_down)?;
                let mut image = RgbImage::from_raw(info.width, info.height, buffer)
                    .ok_or("decoded buffer does not match the stream size")?;
                if bottom_up {
                    imageops::flip_vertical_in_place(&mut image);
                }
                image.save(&out)?;
                delivered
            };

            if delivered != frame {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("frame {frame} unavailable, wrote nearest frame {delivered}").yellow()
                );
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Wrote frame {delivered} to {}", out.display()).green()
            );
        }
        Commands::Frames {
            input,
            out,
            start,
            end,
            ext,
            stream,
            progress,
        } => {
            fs::create_dir_all(&out)?;

            let file = open_input(&input)?;
            let info = file.info(stream)?;
            if info.frame_count == 0 {
                return Err("stream has no frames".into());
            }
            let max_frame = info.frame_count - 1;
            let start_frame = start.unwrap_or(0).min(max_frame);
            let end_frame = end.unwrap_or(max_frame).min(max_frame);
            if start_frame > end_frame {
                return Err("--start must be <= --end".into());
            }

            let progress_bar = if progress {
                let bar = ProgressBar::new(end_frame - start_frame + 1);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?;
                bar.set_style(style.progress_chars("##-"));
                Some(bar)
            } else {
                None
            };

            let ext_clean = ext.trim_start_matches('.').to_ascii_lowercase();
            let options = DecodeOptions::new().with_stream(stream);
            let mut decoded = 0_u64;
            let mut missing = 0_u64;

            for frame in start_frame..=end_frame {
                let output_path = out.join(format!("frame_{frame:06}.{ext_clean}"));
                match file.save_frame(frame, &output_path, &options) {
                    Ok(()) => decoded += 1,
                    Err(error) if error.is_missing_frame() => {
                        missing += 1;
                        log::warn!("{error}");
                    }
                    Err(error) => return Err(error.into()),
                }
                if let Some(bar) = &progress_bar {
                    bar.inc(1);
                }
            }

            if let Some(bar) = progress_bar {
                bar.finish_with_message("done");
            }

            if missing > 0 {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("{missing} frame(s) could not be decoded").yellow()
                );
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Decoded {decoded} frame(s) to {}", out.display()).green()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "frameseek", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
