use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{error, info};
use raqote::{
    DrawOptions, DrawTarget, LineCap, LineJoin, PathBuilder, SolidSource, Source, StrokeStyle,
};

use crate::data::feature::{FeatureMap, Polyline, Type};
use crate::data::RawMapData;
use crate::errors::Result;
use crate::etl::{decode, Stage};
use crate::UserConfig;

pub const STAGE_NAME: &str = "render_map";

/// Fixed pixel margin on every side of the projected envelope.
const MARGIN: f64 = 20.0;

const BACKGROUND: SolidSource = SolidSource {
    r: 0xff,
    g: 0xff,
    b: 0xff,
    a: 0xff,
};

fn reference_color<'a>() -> Source<'a> {
    Source::Solid(SolidSource::from_unpremultiplied_argb(0xff, 0x00, 0x00, 0x00))
}

fn thematic_color<'a>() -> Source<'a> {
    Source::Solid(SolidSource::from_unpremultiplied_argb(0xff, 0x00, 0x00, 0xff))
}

/// Geographic bounding box, x = longitude, y = latitude.
struct Envelope {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Envelope {
    fn new() -> Envelope {
        Envelope {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    fn expand(&mut self, lon: f64, lat: f64) {
        self.min_x = self.min_x.min(lon);
        self.max_x = self.max_x.max(lon);
        self.min_y = self.min_y.min(lat);
        self.max_y = self.max_y.max(lat);
    }

    /// True for empty geometry and for zero-width or zero-height boxes,
    /// where the projection would divide by zero.
    fn is_degenerate(&self) -> bool {
        !(self.max_x > self.min_x && self.max_y > self.min_y)
    }

    /// Equirectangular projection into pixel space, truncated to integer
    /// pixels. Latitude grows upward, image y grows downward.
    fn project(&self, width: i32, height: i32, lon: f64, lat: f64) -> (i32, i32) {
        let x = (lon - self.min_x) / (self.max_x - self.min_x) * (width as f64 - 2.0 * MARGIN)
            + MARGIN;
        let y = (self.max_y - lat) / (self.max_y - self.min_y) * (height as f64 - 2.0 * MARGIN)
            + MARGIN;
        (x as i32, y as i32)
    }
}

fn stroke(width: f32) -> StrokeStyle {
    StrokeStyle {
        cap: LineCap::Round,
        join: LineJoin::Round,
        width,
        miter_limit: 2.0,
        dash_array: Vec::new(),
        dash_offset: 0.0,
    }
}

fn stroke_layer(
    dt: &mut DrawTarget,
    envelope: &Envelope,
    width: i32,
    height: i32,
    layer: &[&Polyline],
    color: &Source,
) {
    for polyline in layer {
        if polyline.points.len() < 2 {
            continue;
        }
        let mut pb = PathBuilder::new();
        let (x0, y0) = envelope.project(width, height, polyline.points[0].lon, polyline.points[0].lat);
        pb.move_to(x0 as f32, y0 as f32);
        for point in &polyline.points[1..] {
            let (x, y) = envelope.project(width, height, point.lon, point.lat);
            pb.line_to(x as f32, y as f32);
        }
        dt.stroke(&pb.finish(), color, &stroke(1.0), &DrawOptions::new());
    }
}

/// Rasterizes both layers onto a white canvas, reference first so thematic
/// strokes sit on top. Fails when the combined envelope is degenerate;
/// other pending renders are unaffected since each image is its own call.
pub fn render_layers(
    reference: &[&Polyline],
    thematic: &[&Polyline],
    width: i32,
    height: i32,
) -> Result<DrawTarget> {
    let mut envelope = Envelope::new();
    for polyline in reference.iter().chain(thematic) {
        for point in &polyline.points {
            envelope.expand(point.lon, point.lat);
        }
    }
    if envelope.is_degenerate() {
        return Err("Degenerate bounding envelope, nothing to project".into());
    }

    let mut dt = DrawTarget::new(width, height);
    dt.clear(BACKGROUND);
    stroke_layer(&mut dt, &envelope, width, height, reference, &reference_color());
    stroke_layer(&mut dt, &envelope, width, height, thematic, &thematic_color());
    Ok(dt)
}

/// Types that get their own image. Country is the reference layer of every
/// image and is not a thematic subject itself.
fn rendered_types() -> impl Iterator<Item = Type> {
    Type::FEATURE_TYPES
        .into_iter()
        .filter(|kind| *kind != Type::Country)
}

fn image_path(dir: &Path, kind: Type) -> PathBuf {
    dir.join(format!("{}.png", kind.name()))
}

pub struct RenderMapStage<'a> {
    config: &'a UserConfig,
}

impl RenderMapStage<'_> {
    pub fn new(config: &UserConfig) -> RenderMapStage {
        RenderMapStage { config }
    }
}

impl Stage for RenderMapStage<'_> {
    type Input = RawMapData;
    type Output = Vec<(Type, DrawTarget)>;

    fn name(&self) -> &str {
        STAGE_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(rendered_types().all(|kind| image_path(dir, kind).exists()))
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        let mut input_file = File::open(dir.join(decode::OUTPUT_FILE_NAME))?;
        let mut buf_vec: Vec<u8> = Vec::new();
        input_file.read_to_end(&mut buf_vec)?;

        let input: RawMapData = unsafe {
            rkyv::from_bytes_unchecked(&buf_vec)
                .map_err(|_| "Could not deserialize raw element cache")?
        };
        Ok(input)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let map = FeatureMap::build(&input);
        let borders = map.borders();
        let width = i32::try_from(self.config.width_px)?;
        let height = i32::try_from(self.config.height_px)?;

        let mut images = Vec::new();
        for kind in rendered_types() {
            let thematic = map.polylines(kind);
            match render_layers(&borders, &thematic, width, height) {
                Ok(dt) => images.push((kind, dt)),
                // Scoped to this image; the remaining types still render.
                Err(err) => {
                    error!(kind = kind.name(), err = err.message; "Rendering failed with error")
                }
            }
        }
        Ok(images)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        fs::create_dir_all(dir)?;
        for (kind, dt) in output {
            let path = image_path(dir, kind);
            dt.write_png(&path)
                .map_err(|_| "Could not write png (encoding error)")?;
            info!(kind = kind.name(), path = path.display().to_string(); "Image written");
        }
        Ok(())
    }
}
