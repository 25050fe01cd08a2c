use std::time::Instant;

use anyhow::Result;
use landmark_quality::config::Config;
use landmark_quality::synthetic::{standing_pose, translated, with_noise};
use landmark_quality::{FrameInput, LandmarkPipeline, VERSION};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::{fmt, EnvFilter};

const CONFIG_PATH: &str = "config.toml";

fn init_logging() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(d) = "landmark_quality=info".parse() {
        filter = filter.add_directive(d);
    }
    fmt().with_env_filter(filter).init();
}

fn run(label: &str, config: Config, iterations: usize) -> Result<()> {
    let mut pipeline = LandmarkPipeline::new(config);
    let mut rng = StdRng::seed_from_u64(42);
    let base = standing_pose(0.9, 0.0);

    let mut quality = 0.0;
    let start = Instant::now();
    for i in 0..iterations {
        let t = i as f64 / 30.0;
        // ゆっくり左右に揺れる人物 + σ=2px のノイズ
        let sway = 40.0 * (t * 0.5).sin();
        let frame = with_noise(&translated(&base, sway, 0.0), 2.0, &mut rng);
        let out = pipeline.process(&FrameInput::from_pixels(&frame, t, 1280, 1280))?;
        quality += out.report.overall_quality;
    }
    let elapsed = start.elapsed();

    let avg_ms = elapsed.as_secs_f64() * 1000.0 / iterations as f64;
    let stats = pipeline.cache_stats();
    println!(
        "{:<10} {:.3}ms/frame = {:.0} FPS, quality {:.3}, cache hit rate {:.1}%",
        label,
        avg_ms,
        1000.0 / avg_ms,
        quality / iterations as f64,
        stats.hit_rate() * 100.0
    );
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let config = Config::load_or_default(CONFIG_PATH);

    println!("=== landmark_quality {} ===", VERSION);
    let iterations = 1000;

    run("full", config.clone(), iterations)?;

    let mut no_cache = config.clone();
    no_cache.features.enable_caching = false;
    run("no-cache", no_cache, iterations)?;

    let mut filter_only = config;
    filter_only.features.enable_caching = false;
    filter_only.features.enable_validation = false;
    filter_only.features.enable_interpolation = false;
    filter_only.features.enable_averaging = false;
    run("filter", filter_only, iterations)?;

    Ok(())
}
