//! wms-tiles - Render tiled WMS overlays from the command line
#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wms_tiles::overlay::{RgbaCanvas, TileGrid, TileOverlay, Viewport, WebMercator};
use wms_tiles::tiles::{HttpFetcher, TileFetcher};
use wms_tiles::{Config, GeoPoint, WmsSource};

/// How often the render loop checks for Ctrl-C while waiting on tiles
const POLL_INTERVAL: Duration = Duration::from_millis(200);

const DEFAULT_SIZE: (u32, u32) = (800, 600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        Command::Grid(view, json) => grid_cli(&view, json),
        Command::Render { view, out, sources } => render_cli(&view, out, &sources).await,
        Command::Sources => list_sources(),
        Command::Config { init } => config_cli(init),
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Map view shared by `grid` and `render`
#[derive(Debug, Clone, Copy, PartialEq)]
struct View {
    center: GeoPoint,
    zoom: u8,
    width: u32,
    height: u32,
}

impl View {
    const fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height, self.zoom)
    }
}

/// CLI commands
#[derive(Debug, PartialEq)]
enum Command {
    Grid(View, bool),
    Render {
        view: View,
        out: PathBuf,
        sources: Vec<String>,
    },
    Sources,
    Config {
        init: bool,
    },
    Help,
    Version,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),

        "grid" => {
            let view = parse_view(&args[1..])?;
            let json = args.iter().any(|a| a == "--json");
            Ok(Command::Grid(view, json))
        }

        "render" => {
            let view = parse_view(&args[1..])?;
            let out = flag_value(args, "--out", "-o")
                .map_or_else(|| PathBuf::from("map.png"), PathBuf::from);

            // --source may repeat
            let mut sources = Vec::new();
            let mut i = 1;
            while i < args.len() {
                if args[i] == "--source" || args[i] == "-s" {
                    if let Some(name) = args.get(i + 1) {
                        sources.push(name.clone());
                    }
                    i += 2;
                } else {
                    i += 1;
                }
            }

            Ok(Command::Render { view, out, sources })
        }

        "sources" => Ok(Command::Sources),

        "config" => Ok(Command::Config {
            init: args.get(1).is_some_and(|a| a == "init"),
        }),

        other => Err(anyhow::anyhow!(
            "Unknown command: {other}\nRun 'wms-tiles --help' for usage"
        )),
    }
}

/// Parse `<lat> <lon> <zoom>` plus an optional `--size WxH`.
fn parse_view(args: &[String]) -> Result<View> {
    let positional = |index: usize, name: &str| {
        args.get(index)
            .ok_or_else(|| anyhow::anyhow!("Missing {name}\nUsage: <lat> <lon> <zoom>"))
    };

    let lat: f64 = positional(0, "latitude")?
        .parse()
        .context("Latitude must be a number")?;
    let lon: f64 = positional(1, "longitude")?
        .parse()
        .context("Longitude must be a number")?;
    let zoom: u8 = positional(2, "zoom")?
        .parse()
        .context("Zoom must be between 0 and 255")?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        anyhow::bail!("Coordinates out of range: {lat}, {lon}");
    }

    let (width, height) = match flag_value(args, "--size", "-S") {
        Some(size) => parse_size(size)?,
        None => DEFAULT_SIZE,
    };

    Ok(View {
        center: GeoPoint::new(lat, lon),
        zoom,
        width,
        height,
    })
}

fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (w, h) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("Size must look like 800x600, got '{size}'"))?;
    let width: u32 = w.trim().parse().context("Invalid width")?;
    let height: u32 = h.trim().parse().context("Invalid height")?;
    if width == 0 || height == 0 {
        anyhow::bail!("Size must not be empty: {size}");
    }
    Ok((width, height))
}

fn flag_value<'a>(args: &'a [String], long: &str, short: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == long || a == short)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn print_help() {
    let config_path = Config::default_path()
        .map_or_else(|_| "Unknown".to_string(), |p| p.display().to_string());

    println!(
        r#"🗺️  wms-tiles - Tiled WMS overlays

USAGE:
    wms-tiles [COMMAND]

COMMANDS:
    grid <lat> <lon> <zoom> [OPTIONS]      Show the tiles covering a view
      Options:
        -S, --size <WxH>                   View size in pixels (default: 800x600)
        --json                             Print as JSON

    render <lat> <lon> <zoom> [OPTIONS]    Draw all sources into an image
      Options:
        -S, --size <WxH>                   View size in pixels (default: 800x600)
        -o, --out <file>                   Output image (default: map.png)
        -s, --source <name>                Only this source (repeatable)
      Examples:
        wms-tiles render 52.52 13.40 10
        wms-tiles render 48.85 2.35 12 --size 1024x768 -o paris.png

    sources                                List configured WMS sources
    config [init]                          Show the config, or write the default one

OPTIONS:
    -h, --help                             Show this help message
    -v, --version                          Show version information

Press Ctrl-C during render to stop and keep the tiles loaded so far.

CONFIG:
    {}
"#,
        config_path
    );
}

fn print_version() {
    println!("wms-tiles {}", wms_tiles::VERSION);
}

fn grid_cli(view: &View, json: bool) -> Result<()> {
    let config = Config::load()?;
    let viewport = view.viewport();
    let projection = WebMercator::new(view.center, &viewport);
    let tiles = TileGrid::new(config.tile_size, config.origin).compute(&viewport, &projection);

    if json {
        println!("{}", serde_json::to_string_pretty(&tiles)?);
        return Ok(());
    }

    println!(
        "{} tiles of {}px for {}x{} at zoom {}\n",
        tiles.len(),
        config.tile_size,
        view.width,
        view.height,
        view.zoom
    );
    for tile in tiles {
        let b = tile.bbox;
        println!(
            "  {:<16} at {:>6},{:<6} bbox {:.5},{:.5},{:.5},{:.5}",
            tile.key.to_string(),
            tile.position.x,
            tile.position.y,
            b.min_lon,
            b.min_lat,
            b.max_lon,
            b.max_lat
        );
    }
    Ok(())
}

async fn render_cli(view: &View, out: PathBuf, names: &[String]) -> Result<()> {
    let config = Config::load()?;
    let sources = select_sources(&config, names)?;
    let viewport = view.viewport();
    let projection = WebMercator::new(view.center, &viewport);
    let overlay_config = config.overlay_config();

    // Every visible tile must fit in the cache or later passes evict earlier tiles
    let visible = TileGrid::new(overlay_config.tile_size, overlay_config.origin)
        .compute(&viewport, &projection)
        .len();
    let mut loader_config = config.loader_config();
    if loader_config.target_size < visible {
        let slack = loader_config
            .tolerated_size
            .saturating_sub(loader_config.target_size)
            .max(1);
        tracing::info!(
            "Raising cache size from {} to {} for {} visible tiles",
            loader_config.target_size,
            visible,
            visible
        );
        loader_config.target_size = visible;
        loader_config.tolerated_size = visible + slack;
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;

    let fetcher = HttpFetcher::new(config.request_timeout())?;
    let mut overlay = TileOverlay::with_sources(sources, loader_config, overlay_config, &fetcher)?;

    let max_passes = config.max_draw_passes.max(1);
    let mut pass = 0;
    let canvas = loop {
        pass += 1;
        let mut canvas = RgbaCanvas::new(view.width, view.height);
        let stats = overlay.draw(&viewport, &projection, &mut canvas);
        tracing::info!(
            "Pass {pass}: drew {}/{} tiles",
            stats.drawn,
            stats.requested
        );

        if stats.is_complete() {
            break canvas;
        }
        if pass >= max_passes || interrupted.load(Ordering::SeqCst) {
            println!(
                "⚠ {} of {} tiles missing",
                stats.requested - stats.drawn,
                stats.requested
            );
            break canvas;
        }

        wait_for_tiles(&mut overlay, config.request_timeout(), &interrupted).await;
    };

    overlay.close();
    canvas
        .save(&out)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("✓ Wrote {}", out.display());
    Ok(())
}

/// Wait until loading settles, `timeout` passes or the user interrupts.
async fn wait_for_tiles<F: TileFetcher>(
    overlay: &mut TileOverlay<F>,
    timeout: Duration,
    interrupted: &AtomicBool,
) {
    let deadline = Instant::now() + timeout;
    while overlay.is_loading() && Instant::now() < deadline {
        if interrupted.load(Ordering::SeqCst) {
            println!("Interrupted, writing what is loaded");
            return;
        }
        if let Ok(None) = tokio::time::timeout(POLL_INTERVAL, overlay.next_event()).await {
            return;
        }
    }
}

fn select_sources(config: &Config, names: &[String]) -> Result<Vec<WmsSource>> {
    if names.is_empty() {
        if config.sources.is_empty() {
            anyhow::bail!("No WMS sources configured. Run: wms-tiles config init");
        }
        return Ok(config.sources.clone());
    }

    names
        .iter()
        .map(|name| {
            config
                .source(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Unknown source: {name}\nRun: wms-tiles sources"))
        })
        .collect()
}

fn list_sources() -> Result<()> {
    let config = Config::load()?;

    if config.sources.is_empty() {
        println!("No sources configured.");
        println!("\nAdd [[sources]] entries to the config file or run:");
        println!("  wms-tiles config init");
        return Ok(());
    }

    println!("Configured sources (bottom layer first):\n");

    for source in &config.sources {
        println!(
            "  {}  [{}]\n    {}  (WMS {}, {}, {})",
            source.name,
            source.layers.join(","),
            source.url,
            source.version,
            source.srs,
            source.format
        );
    }

    Ok(())
}

fn config_cli(init: bool) -> Result<()> {
    let path = Config::default_path()?;

    if init {
        if path.exists() {
            println!("Config already exists: {}", path.display());
        } else {
            Config::default().save_to(&path)?;
            println!("✓ Wrote default config to {}", path.display());
        }
        return Ok(());
    }

    let config = Config::load_from(&path)?;
    println!("# {}\n", path.display());
    print!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to serialize config")?
    );
    Ok(())
}
