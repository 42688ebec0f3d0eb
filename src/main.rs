//! gasmeter-reader - frame normalization tool
//!
//! Prepares meter photos the way the live feed does before detection, and
//! maps detector boxes back onto the original photo.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gasmeter_reader::capture::RawFrame;
use gasmeter_reader::storage;
use gasmeter_reader::vision::{
    self, highlight::HIGHLIGHT_GREEN, BoundingBox, LetterboxTransform, NormalizedImage,
};

/// gasmeter-reader - meter frame normalization
#[derive(Parser, Debug)]
#[command(name = "gasmeter-reader")]
#[command(about = "Prepare meter photos for the digit detector and map its boxes back")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the model-ready square image for a photo
    Normalize {
        /// Input photo
        #[arg(short, long)]
        input: PathBuf,
        /// Output image path
        #[arg(short, long)]
        output: PathBuf,
        /// EXIF orientation code of the photo (1, 3, 6, 8)
        #[arg(long, default_value = "1")]
        orientation: u16,
        /// Crop region `left,top,width,height` applied after orientation
        #[arg(long, value_parser = parse_xywh)]
        crop: Option<BoundingBox>,
        /// Canvas side (overrides config)
        #[arg(long)]
        side: Option<u32>,
        /// Desaturate before letterboxing
        #[arg(long)]
        grayscale: bool,
    },
    /// Map a model-space box onto the original photo
    MapBox {
        /// Input photo
        #[arg(short, long)]
        input: PathBuf,
        /// Box `left,top,right,bottom` in model space
        #[arg(long = "box", value_parser = parse_ltrb)]
        bbox: BoundingBox,
        /// EXIF orientation code of the photo (1, 3, 6, 8)
        #[arg(long, default_value = "1")]
        orientation: u16,
        /// Canvas side (overrides config)
        #[arg(long)]
        side: Option<u32>,
        /// Draw the mapped box on the upright photo and save it here
        #[arg(long)]
        highlight: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct MapBoxReport {
    transform: LetterboxTransform,
    model_box: BoundingBox,
    original_box: BoundingBox,
}

fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = storage::load_or_default(args.config);

    match args.command {
        Command::Normalize { input, output, orientation, crop, side, grayscale } => {
            let mut frame = vision::correct_orientation(load_frame(&input)?, orientation);
            if let Some(region) = crop {
                frame = vision::crop(&frame, &region)?;
            }
            if grayscale || config.normalizer.grayscale {
                frame = vision::to_grayscale(&frame);
            }

            let normalizer = config.normalizer_config();
            let side = side.unwrap_or(normalizer.target_side);
            let normalized = vision::letterbox_with_fill(&frame.image, side, normalizer.fill)?;
            drop(frame);

            normalized
                .image
                .save(&output)
                .with_context(|| format!("Failed to write {:?}", output))?;
            info!("Wrote {}x{} model input to {:?}", side, side, output);
            println!("{}", serde_json::to_string_pretty(&normalized.transform)?);
        }
        Command::MapBox { input, bbox, orientation, side, highlight } => {
            let frame = vision::correct_orientation(load_frame(&input)?, orientation);
            let side = side.unwrap_or(config.normalizer.target_side);
            let normalized: NormalizedImage = vision::letterbox_to_square(&frame, side)?;
            let original_box = normalized.map_box_to_original(&bbox);

            if let Some(path) = highlight {
                let mut image = frame.image;
                if !vision::draw_box(&mut image, &original_box, HIGHLIGHT_GREEN, 3) {
                    tracing::warn!("Mapped box lies outside the photo");
                }
                image
                    .save(&path)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                info!("Wrote highlighted photo to {:?}", path);
            }

            let report = MapBoxReport {
                transform: normalized.transform,
                model_box: bbox,
                original_box,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Decode a photo into an RGBA frame
fn load_frame(path: &Path) -> Result<RawFrame> {
    let image = image::open(path)
        .with_context(|| format!("Failed to load image: {:?}", path))?
        .to_rgba8();
    Ok(RawFrame::new(image, 0))
}

fn parse_floats(s: &str) -> Result<[f32; 4], String> {
    let values: Vec<f32> = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| format!("{:?}: {}", v, e)))
        .collect::<Result<_, _>>()?;
    values
        .try_into()
        .map_err(|_| "expected four comma-separated numbers".to_string())
}

fn parse_xywh(s: &str) -> Result<BoundingBox, String> {
    let [x, y, w, h] = parse_floats(s)?;
    Ok(BoundingBox::from_xywh(x, y, w, h))
}

fn parse_ltrb(s: &str) -> Result<BoundingBox, String> {
    let [l, t, r, b] = parse_floats(s)?;
    Ok(BoundingBox::new(l, t, r, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_box_formats() {
        assert_eq!(parse_ltrb("1,2,30,40").unwrap(), BoundingBox::new(1.0, 2.0, 30.0, 40.0));
        assert_eq!(parse_xywh("10, 20, 5, 5").unwrap(), BoundingBox::new(10.0, 20.0, 15.0, 25.0));
    }

    #[test]
    fn test_parse_box_rejects_bad_input() {
        assert!(parse_ltrb("1,2,3").is_err());
        assert!(parse_ltrb("1,2,3,x").is_err());
        assert!(parse_xywh("").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "gasmeter-reader",
            "map-box",
            "--input",
            "meter.jpg",
            "--box",
            "0,160,640,480",
            "--orientation",
            "6",
        ])
        .unwrap();

        match args.command {
            Command::MapBox { bbox, orientation, side, .. } => {
                assert_eq!(bbox, BoundingBox::new(0.0, 160.0, 640.0, 480.0));
                assert_eq!(orientation, 6);
                assert_eq!(side, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
