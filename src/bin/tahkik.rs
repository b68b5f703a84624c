use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tahkik::config::{load_settings, settings_file_path, Settings};
use tahkik::playback::{token_at, AudioChunk, PlaybackPosition};
use tahkik::records::{AudioChunkRecord, ProjectBundle};
use tahkik::{DocumentStore, Witness};

#[derive(Parser, Debug)]
#[command(name = "tahkik")]
#[command(about = "Render and inspect a critical edition project", long_about = None)]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Override the font size used for pagination
    #[arg(long, global = true)]
    font_size: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render pages of a project bundle as HTML
    Render {
        bundle: PathBuf,
        /// Witness to render (1-4)
        #[arg(short, long, default_value = "1")]
        witness: u8,
        /// Only render this page (1-based)
        #[arg(short, long)]
        page: Option<usize>,
        /// Highlight this global token as now playing
        #[arg(long)]
        playing: Option<usize>,
    },
    /// List the virtual pages of a witness
    Pages {
        bundle: PathBuf,
        #[arg(short, long, default_value = "1")]
        witness: u8,
    },
    /// Show where a global token lives
    Locate {
        bundle: PathBuf,
        token: usize,
        #[arg(short, long, default_value = "1")]
        witness: u8,
    },
    /// Resolve a playback time against a synthesized audio chunk's timepoints
    Timepoint {
        /// JSON audio chunk record
        chunk: PathBuf,
        /// Playback time in seconds
        time: f64,
    },
}

fn load_store(
    bundle: &Path,
    witness: u8,
    settings: Settings,
    font_size: Option<f32>,
) -> Result<DocumentStore, String> {
    let bundle = ProjectBundle::load(bundle)
        .map_err(|e| format!("Failed to load '{}': {}", bundle.display(), e))?;
    let mut store = DocumentStore::from_bundle(bundle, settings).map_err(|e| e.to_string())?;
    store.set_active_witness(Witness::new(witness).map_err(|e| e.to_string())?);
    if let Some(size) = font_size {
        store.set_font_size(size).map_err(|e| e.to_string())?;
    }
    Ok(store)
}

fn cmd_render(
    store: &DocumentStore,
    page: Option<usize>,
    playing: Option<usize>,
) -> Result<(), String> {
    let playback = playing.map(PlaybackPosition::at).unwrap_or_default();
    let indices: Vec<usize> = match page {
        Some(0) => return Err("Pages are numbered from 1".to_string()),
        Some(n) => vec![n - 1],
        None => (0..store.pages().len()).collect(),
    };

    for idx in indices {
        let rendered = store
            .render_page(idx, playback)
            .ok_or_else(|| format!("Page {} does not exist", idx + 1))?;
        print!("{}", rendered.to_html());
    }
    Ok(())
}

fn cmd_pages(store: &DocumentStore) -> Result<(), String> {
    for page in store.pages() {
        let first = page.lines.first().map(|l| l.line_no).unwrap_or_default();
        let last = page.lines.last().map(|l| l.line_no).unwrap_or_default();
        println!(
            "{}\tlines {}-{}\t{} footnotes\t{:.0}px",
            page.key,
            first,
            last,
            page.footnotes.len(),
            page.estimated_height
        );
    }
    Ok(())
}

fn cmd_locate(store: &DocumentStore, token: usize) -> Result<(), String> {
    let loc = store
        .locate_token(token)
        .ok_or_else(|| format!("Token {} is not in this witness", token))?;
    println!("token:   {}", loc.token);
    println!("line:    {} (word {})", loc.line_no, loc.word_in_line);
    println!("chars:   {}..{}", loc.char_start, loc.char_end);
    println!("page:    {}", loc.page_key.as_deref().unwrap_or("-"));
    match loc.image {
        Some(image) => println!("image:   {} ({})", image.key, image.image_filename),
        None => println!("image:   -"),
    }
    Ok(())
}

fn cmd_timepoint(chunk: &Path, time: f64) -> Result<(), String> {
    let contents = fs::read_to_string(chunk)
        .map_err(|e| format!("Failed to read '{}': {}", chunk.display(), e))?;
    let record: AudioChunkRecord =
        serde_json::from_str(&contents).map_err(|e| format!("Invalid audio chunk: {}", e))?;
    let chunk = AudioChunk::from_record(record);
    match token_at(&chunk.timepoints, time) {
        Some(token) => println!("{}", token),
        None => println!("-"),
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tahkik=info")),
        )
        .init();

    let args = Args::parse();

    let settings = match args.settings.or_else(settings_file_path) {
        Some(path) => load_settings(&path),
        None => Settings::default(),
    };
    let open = |bundle: &Path, witness: u8| load_store(bundle, witness, settings.clone(), args.font_size);

    let result = match args.command {
        Commands::Render {
            bundle,
            witness,
            page,
            playing,
        } => open(&bundle, witness)
            .and_then(|store| cmd_render(&store, page, playing)),
        Commands::Pages { bundle, witness } => {
            open(&bundle, witness).and_then(|store| cmd_pages(&store))
        }
        Commands::Locate {
            bundle,
            token,
            witness,
        } => open(&bundle, witness).and_then(|store| cmd_locate(&store, token)),
        Commands::Timepoint { chunk, time } => cmd_timepoint(&chunk, time),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
