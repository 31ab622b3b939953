use crate::{
    config::LandmarkerConfig,
    landmark_service::{ExtractorError, LandmarkExtractor},
    landmarks::{Landmark, LandmarkSet},
    ort_service::{build_sessions, SessionPool},
};
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use ndarray::{Array, Ix4};
use ort::value::TensorRef;

/// Maps between the source image and the square, zero-padded network input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Letterbox {
    scale: f32,
    scaled_w: u32,
    scaled_h: u32,
    pad_x: u32,
    pad_y: u32,
    width: u32,
    height: u32,
    size: u32,
}

impl Letterbox {
    pub(crate) fn new(width: u32, height: u32, size: u32) -> Self {
        let scale = size as f32 / width.max(height).max(1) as f32;
        let scaled_w = ((width as f32 * scale).round() as u32).clamp(1, size);
        let scaled_h = ((height as f32 * scale).round() as u32).clamp(1, size);

        Self {
            scale,
            scaled_w,
            scaled_h,
            pad_x: (size - scaled_w) / 2,
            pad_y: (size - scaled_h) / 2,
            width,
            height,
            size,
        }
    }

    fn scaled_dimensions(&self) -> (u32, u32) {
        (self.scaled_w, self.scaled_h)
    }

    /// Converts a landmark in network-input pixels to normalised image space.
    pub(crate) fn to_normalized(&self, x: f32, y: f32, z: f32) -> Landmark {
        let width = self.width.max(1) as f32;
        let height = self.height.max(1) as f32;
        Landmark::new(
            (x - self.pad_x as f32) / self.scale / width,
            (y - self.pad_y as f32) / self.scale / height,
            z / self.scale / width,
        )
    }

    fn apply(&self, image: &RgbImage) -> RgbImage {
        let (scaled_w, scaled_h) = self.scaled_dimensions();
        let resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([0, 0, 0]));
        imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }
}

fn to_input_tensor(canvas: &RgbImage, channels_last: bool) -> Array<f32, Ix4> {
    let (w, h) = canvas.dimensions();
    let (w, h) = (w as usize, h as usize);
    let mut input = if channels_last {
        Array::zeros((1, h, w, 3))
    } else {
        Array::zeros((1, 3, h, w))
    };

    for (x, y, pixel) in canvas.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (c, value) in pixel.0.iter().enumerate() {
            let value = *value as f32 / 255.;
            if channels_last {
                input[[0, y, x, c]] = value;
            } else {
                input[[0, c, y, x]] = value;
            }
        }
    }
    input
}

/// Hand landmark network run through ONNX Runtime.
///
/// Expects a MediaPipe-style landmark model: a single square RGB input in
/// `[0, 1]`, output 0 holding 21 `(x, y, z)` triples in input pixels and
/// output 1 holding the hand presence score.
pub struct OrtHandLandmarker {
    pool: SessionPool,
    landmarks_output: String,
    presence_output: String,
    input_size: u32,
    channels_last: bool,
    min_detection_confidence: f32,
}

impl OrtHandLandmarker {
    pub fn new(config: &LandmarkerConfig) -> Result<Self, ExtractorError> {
        let path = config.get_path();
        if !path.exists() {
            return Err(ExtractorError::Load(format!(
                "model file not found at {}",
                path.display()
            )));
        }

        let sessions = build_sessions(&path, config.num_instances)
            .map_err(|e| ExtractorError::Load(e.to_string()))?;
        let pool = SessionPool::new(sessions);

        let mut names = pool.output_names().into_iter();
        let (landmarks_output, presence_output) = match (names.next(), names.next()) {
            (Some(landmarks), Some(presence)) => (landmarks, presence),
            _ => {
                return Err(ExtractorError::Load(
                    "hand landmark model needs landmark and presence outputs".into(),
                ))
            }
        };

        tracing::info!(
            "Created {} hand landmark ONNX sessions from {}",
            pool.len(),
            path.display()
        );

        Ok(Self {
            pool,
            landmarks_output,
            presence_output,
            input_size: config.input_size,
            channels_last: config.channels_last,
            min_detection_confidence: config.min_detection_confidence,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<(Vec<f32>, f32), ExtractorError> {
        self.pool
            .with_session(|session| {
                let tensor_ref = TensorRef::from_array_view(input.view())
                    .map_err(|e| format!("failed to build tensor: {}", e))?;

                let outputs = session
                    .run(ort::inputs![tensor_ref])
                    .map_err(|e| format!("inference failed: {}", e))?;

                let (_, coords) = outputs[self.landmarks_output.as_str()]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| format!("failed to extract landmarks: {}", e))?;
                let (_, presence) = outputs[self.presence_output.as_str()]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| format!("failed to extract presence: {}", e))?;

                let presence = presence
                    .first()
                    .copied()
                    .ok_or_else(|| "empty presence tensor".to_string())?;
                Ok((coords.to_vec(), presence))
            })
            .map_err(ExtractorError::Inference)
    }
}

impl LandmarkExtractor for OrtHandLandmarker {
    fn extract(&self, image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractorError> {
        let (width, height) = image.dimensions();
        let letterbox = Letterbox::new(width, height, self.input_size);
        let input = to_input_tensor(&letterbox.apply(image), self.channels_last);

        let (coords, presence) = self.run_inference(&input)?;
        tracing::debug!(presence, "Hand landmark inference finished");

        if presence < self.min_detection_confidence {
            return Ok(None);
        }
        landmarks_from_output(&coords, &letterbox).map(Some)
    }
}

/// Network output is exactly 21 `(x, y, z)` triples in input pixels.
fn landmarks_from_output(
    coords: &[f32],
    letterbox: &Letterbox,
) -> Result<LandmarkSet, ExtractorError> {
    let raw = LandmarkSet::from_flat(coords)
        .map_err(|e| ExtractorError::MalformedOutput(e.to_string()))?;
    Ok(raw.map(|p| letterbox.to_normalized(p.x, p.y, p.z)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::FEATURE_COUNT;

    #[test]
    fn letterbox_pads_the_short_side() {
        let letterbox = Letterbox::new(400, 200, 224);

        assert_eq!(letterbox.scaled_dimensions(), (224, 112));
        assert_eq!(letterbox.pad_x, 0);
        assert_eq!(letterbox.pad_y, 56);
    }

    #[test]
    fn letterbox_maps_input_pixels_back_to_normalised_space() {
        let letterbox = Letterbox::new(400, 200, 224);

        let centre = letterbox.to_normalized(112.0, 112.0, 0.0);
        assert!((centre.x - 0.5).abs() < 1e-5);
        assert!((centre.y - 0.5).abs() < 1e-5);

        let corner = letterbox.to_normalized(0.0, 56.0, 0.0);
        assert!(corner.x.abs() < 1e-5);
        assert!(corner.y.abs() < 1e-5);
    }

    #[test]
    fn input_tensor_layouts() {
        let mut canvas = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        canvas.put_pixel(1, 2, Rgb([255, 0, 51]));

        let nhwc = to_input_tensor(&canvas, true);
        assert_eq!(nhwc.shape(), &[1, 4, 4, 3]);
        assert_eq!(nhwc[[0, 2, 1, 0]], 1.0);
        assert!((nhwc[[0, 2, 1, 2]] - 0.2).abs() < 1e-6);

        let nchw = to_input_tensor(&canvas, false);
        assert_eq!(nchw.shape(), &[1, 3, 4, 4]);
        assert_eq!(nchw[[0, 0, 2, 1]], 1.0);
    }

    #[test]
    fn letterboxed_canvas_is_square() {
        let image = RgbImage::from_pixel(30, 10, Rgb([200, 200, 200]));
        let letterbox = Letterbox::new(30, 10, 12);
        let canvas = letterbox.apply(&image);

        assert_eq!(canvas.dimensions(), (12, 12));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert!(canvas.get_pixel(6, 6).0.iter().all(|&c| c > 150));
    }

    #[test]
    fn output_must_hold_exactly_21_landmarks() {
        let letterbox = Letterbox::new(400, 200, 224);

        let mut coords = vec![112.0; FEATURE_COUNT];
        let landmarks = landmarks_from_output(&coords, &letterbox).unwrap();
        assert!(landmarks
            .points()
            .iter()
            .all(|p| (p.x - 0.5).abs() < 1e-5 && (p.y - 0.5).abs() < 1e-5));

        coords.push(0.0);
        assert!(matches!(
            landmarks_from_output(&coords, &letterbox),
            Err(ExtractorError::MalformedOutput(_))
        ));
        assert!(landmarks_from_output(&coords[..60], &letterbox).is_err());
    }
}
