use std::{path::PathBuf, time::Duration};

use ceremony_core::{
    revealed_segments, AppConfig, BufferedOutput, CeremonyEvent, CeremonyOrchestrator,
    CeremonyState, ContentProvider, ContentSegment, EditionsFileProvider, Point,
    PositionIndexedReveal, RecordingCanvas, SessionHandoff, StaticContentProvider,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> ceremony_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::live_defaults(),
    };

    match cli.command {
        Commands::Rehearse {
            content,
            audio,
            seconds,
            signature_out,
        } => run_rehearsal(config, content, audio, seconds, signature_out),
        Commands::Timeline { positions } => run_timeline(&config, &positions),
    }
}

fn run_rehearsal(
    config: AppConfig,
    content: Option<PathBuf>,
    audio: Option<PathBuf>,
    seconds: u64,
    signature_out: Option<PathBuf>,
) -> ceremony_core::Result<()> {
    let audio = audio.or_else(|| {
        let fixed = PathBuf::from(&config.audio.asset_path);
        fixed.exists().then_some(fixed)
    });
    let output = match &audio {
        Some(path) => BufferedOutput::from_wav(path, &config.audio)?,
        None => {
            tracing::info!(seconds, "no narration given, using a synthetic track");
            BufferedOutput::synthetic(Duration::from_secs(seconds), &config.audio)
        }
    }
    .with_autoplay_policy(true);

    let provider: Box<dyn ContentProvider> = match content {
        Some(path) => Box::new(EditionsFileProvider::new(path)),
        None => Box::new(placeholder_content(config.reveal.timings.len())),
    };

    let frame = config.visualizer.frame_interval();
    let limit = Duration::from_secs_f32(output.duration_seconds()) + Duration::from_secs(5);
    let mut ceremony = CeremonyOrchestrator::new(config, output)?;
    let mut canvas = RecordingCanvas::default();

    let handoff = match sign(&mut ceremony) {
        Some(handoff) => handoff,
        None => return Err("signature was not accepted".into()),
    };
    if let (Some(path), Some(signature)) = (&signature_out, &handoff.signature) {
        std::fs::write(path, signature.to_json()?)?;
        tracing::info!(path = %path.display(), "signature saved");
    }

    ceremony.enter_ceremony(handoff, provider.as_ref());
    if let Some(placeholder) = ceremony.content().placeholder() {
        println!("{placeholder}");
    }

    let mut elapsed = Duration::ZERO;
    let mut shown = 0;
    while elapsed < limit && ceremony.state() != CeremonyState::Ended {
        for event in ceremony.tick(frame, &mut canvas) {
            if let CeremonyEvent::Revealed(cursor) = event {
                let segments = revealed_segments(ceremony.content().segments(), cursor);
                let position = ceremony.playback().position_seconds();
                for segment in segments.iter().skip(shown) {
                    println!("[{position:>6.2}s] {}", segment.primary_text);
                    println!("          {}", segment.secondary_text);
                }
                shown = segments.len();
            }
        }
        elapsed += frame;
    }

    print_bars(&canvas, ceremony.visualizer().frames_painted());
    ceremony.teardown();
    Ok(())
}

fn sign(ceremony: &mut CeremonyOrchestrator<BufferedOutput>) -> Option<SessionHandoff> {
    let strokes: [&[(f32, f32)]; 2] = [
        &[(40.0, 120.0), (70.0, 60.0), (100.0, 130.0), (140.0, 70.0)],
        &[(160.0, 110.0), (220.0, 95.0), (300.0, 100.0)],
    ];

    for stroke in strokes {
        let mut points = stroke.iter().map(|(x, y)| Point::new(*x, *y));
        if let Some(first) = points.next() {
            ceremony.begin_stroke(first);
        }
        for point in points {
            ceremony.extend_stroke(point);
        }
        ceremony.end_stroke();
    }

    ceremony
        .confirm_signature()
        .into_iter()
        .find_map(|event| match event {
            CeremonyEvent::Signed(handoff) => Some(handoff),
            _ => None,
        })
}

fn run_timeline(config: &AppConfig, positions: &[f32]) -> ceremony_core::Result<()> {
    let reveal = PositionIndexedReveal::new(config.reveal.timings.clone())?;
    for position in positions {
        let index = reveal.lookup(*position).map(|i| i as i64).unwrap_or(-1);
        println!("{position:>8.2}s -> {index}");
    }
    Ok(())
}

fn placeholder_content(count: usize) -> StaticContentProvider {
    StaticContentProvider::new(
        (0..count)
            .map(|order| {
                ContentSegment::new(
                    order,
                    format!("Verse {}", order + 1),
                    format!("Translation of verse {}", order + 1),
                )
            })
            .collect(),
    )
}

fn print_bars(canvas: &RecordingCanvas, frames: u64) {
    const ROWS: usize = 8;

    let tallest = canvas
        .bars
        .iter()
        .map(|bar| bar.height)
        .fold(0.0_f32, f32::max);
    if canvas.bars.is_empty() || tallest <= 0.0 {
        println!("visualizer painted {frames} frames");
        return;
    }

    println!("last of {frames} visualizer frames:");
    for row in (0..ROWS).rev() {
        let threshold = tallest * row as f32 / ROWS as f32;
        let line: String = canvas
            .bars
            .iter()
            .map(|bar| if bar.height > threshold { '█' } else { ' ' })
            .collect();
        println!("|{line}|");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless runner for the signing ceremony", long_about = None)]
struct Cli {
    /// JSON configuration file. Defaults mirror the live ceremony.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign, then play the recitation start to finish without a display.
    Rehearse {
        /// Saved two-edition content document.
        #[arg(long)]
        content: Option<PathBuf>,
        /// Narration as a WAV file.
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Length of the synthetic track used when no narration is given.
        #[arg(long, default_value_t = 50)]
        seconds: u64,
        /// Where to write the signature snapshot as JSON.
        #[arg(long)]
        signature_out: Option<PathBuf>,
    },
    /// Print the reveal index for each playback position.
    Timeline {
        positions: Vec<f32>,
    },
}
