mod classify;
mod codec;
mod data;
mod errors;
mod etl;

use std::env;
use std::fs::{create_dir_all, File};
use std::io;
use std::path::Path;

use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::errors::Result;
use crate::etl::decode::DecodeStage;
use crate::etl::render_map::RenderMapStage;
use crate::etl::Stage;

#[derive(Deserialize)]
pub struct UserConfig {
    pub data_path: String,
    pub output_dir: String,
    pub width_px: u64,
    pub height_px: u64,
}

fn load_user_config(path: &str) -> UserConfig {
    let file = File::open(path).expect("Could not open config file.");
    serde_json::from_reader(file).expect("Could not parse config.")
}

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    setup_logging();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/map.json".to_string());
    let config = load_user_config(&config_path);
    let output_dir = Path::new(&config.output_dir);
    create_dir_all(output_dir)?;

    DecodeStage::new(&config).process(output_dir)?;
    RenderMapStage::new(&config).process(output_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::enc;
    use crate::etl::decode::{self, testsupport::BlockBuilder};
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use xz::write::XzEncoder;

    fn write_container(path: &Path, blocks: &[Vec<u8>]) {
        let mut framed = Vec::new();
        for block in blocks {
            enc::varint(&mut framed, block.len() as u64);
            framed.extend_from_slice(block);
        }
        let mut encoder = XzEncoder::new(File::create(path).unwrap(), 6);
        encoder.write_all(&framed).unwrap();
        encoder.finish().unwrap();
    }

    fn read_png(path: &Path) -> (png::OutputInfo, Vec<u8>) {
        let decoder = png::Decoder::new(File::open(path).unwrap());
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        buf.truncate(info.buffer_size());
        (info, buf)
    }

    fn scratch_dir() -> PathBuf {
        let dir = env::temp_dir().join(format!("statemap-e2e-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn pipeline_renders_images_from_a_synthetic_container() {
        let dir = scratch_dir();

        // Block 1: border square corners (dense) and the two border ways,
        // grouped into a country relation.
        let mut block1 = BlockBuilder::new();
        block1.dense_points(&[
            (1, 0.0, 0.0, &[]),
            (2, 0.0, 7.0, &[]),
            (3, 6.0, 7.0, &[]),
            (4, 6.0, 0.0, &[]),
        ]);
        let border_tags = [("boundary", "administrative"), ("admin_level", "2")];
        block1.way(10, &border_tags, &[1, 2, 3]);
        block1.way(11, &border_tags, &[3, 4, 1]);
        block1.relation(
            20,
            &[
                ("boundary", "administrative"),
                ("admin_level", "2"),
                ("name", "Czechia"),
            ],
            &[(1, 10, "outer"), (1, 11, "outer")],
        );

        // Block 2: a named river crossing the square, referencing its own
        // sparse points.
        let mut block2 = BlockBuilder::new();
        block2.sparse_point(5, 6.0, 0.0, &[]);
        block2.sparse_point(6, 0.0, 8.0, &[]);
        block2.way(12, &[("waterway", "river"), ("name", "Vltava")], &[5, 6]);

        let data_path = dir.join("map.bin.xz");
        write_container(&data_path, &[block1.build(), block2.build()]);

        let config = UserConfig {
            data_path: data_path.display().to_string(),
            output_dir: dir.display().to_string(),
            width_px: 200,
            height_px: 100,
        };
        DecodeStage::new(&config).process(&dir).unwrap();
        RenderMapStage::new(&config).process(&dir).unwrap();

        assert!(dir.join(decode::OUTPUT_FILE_NAME).exists());
        for name in [
            "RIVER",
            "MOUNTAIN",
            "REGION",
            "DISTRICT",
            "CITY",
            "OTHER_ADMINISTRATIVE",
        ] {
            assert!(dir.join(format!("{}.png", name)).exists(), "{} missing", name);
        }

        let (info, pixels) = read_png(&dir.join("RIVER.png"));
        assert_eq!((info.width, info.height), (200, 100));
        // White background in the margin.
        assert_eq!(&pixels[0..4], &[0xff, 0xff, 0xff, 0xff]);
        // The river stroke leaves bluish pixels.
        assert!(pixels
            .chunks_exact(4)
            .any(|px| px[2] > px[0].saturating_add(0x40)));

        // No thematic layer for mountains, only the black reference border.
        let (_, pixels) = read_png(&dir.join("MOUNTAIN.png"));
        assert!(pixels.chunks_exact(4).any(|px| px[0] < 0x80 && px[2] < 0x80));
        assert!(!pixels
            .chunks_exact(4)
            .any(|px| px[2] > px[0].saturating_add(0x40)));
    }
}
