use crate::landmarks::{LandmarkSet, HAND_CONNECTIONS};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use embedded_graphics::{
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle},
};
use image::{ImageFormat, ImageReader, RgbImage};
use std::{convert::Infallible, io::Cursor};
use thiserror::Error;

const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

const CONNECTION_COLOR: Rgb888 = Rgb888::new(0, 0, 255);
const LANDMARK_COLOR: Rgb888 = Rgb888::new(0, 255, 0);
const LANDMARK_BORDER_COLOR: Rgb888 = Rgb888::new(255, 255, 255);
const STROKE_WIDTH: u32 = 2;
const LANDMARK_RADIUS: u32 = 2;

#[derive(Error, Debug)]
pub enum CvUtilsError {
    #[error("Invalid base64 payload: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("Failed to decode image: {0}")]
    ImageDecode(image::ImageError),
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(image::ImageError),
}

/// Drops everything up to and including the first comma of a data URL.
/// A payload without a comma is taken to be bare base64.
pub fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data.trim(),
        None => payload.trim(),
    }
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, CvUtilsError> {
    Ok(STANDARD.decode(strip_data_url(payload))?)
}

/// Decodes any supported image format into 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, CvUtilsError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CvUtilsError::ImageDecode(image::ImageError::IoError(e)))?
        .decode()
        .map_err(CvUtilsError::ImageDecode)?;
    Ok(image.to_rgb8())
}

pub fn to_jpg(image: &RgbImage) -> Result<Vec<u8>, CvUtilsError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .map_err(CvUtilsError::EncodeFrameFailed)?;
    Ok(buf)
}

pub fn to_jpeg_data_url(image: &RgbImage) -> Result<String, CvUtilsError> {
    let jpg = to_jpg(image)?;
    Ok(format!("{}{}", JPEG_DATA_URL_PREFIX, STANDARD.encode(jpg)))
}

/// Returns a copy of `image` with the hand skeleton drawn on it.
pub fn annotate(image: &RgbImage, landmarks: &LandmarkSet) -> RgbImage {
    let mut annotated = image.clone();
    let (width, height) = annotated.dimensions();
    let points: Vec<Point> = landmarks
        .points()
        .iter()
        .map(|lm| {
            Point::new(
                (lm.x * width as f32).round() as i32,
                (lm.y * height as f32).round() as i32,
            )
        })
        .collect();

    let mut canvas = Canvas(&mut annotated);
    let connection_style = PrimitiveStyle::with_stroke(CONNECTION_COLOR, STROKE_WIDTH);
    for &(start, end) in HAND_CONNECTIONS.iter() {
        draw(
            Line::new(points[start], points[end]).into_styled(connection_style),
            &mut canvas,
        );
    }

    let border_style = PrimitiveStyle::with_fill(LANDMARK_BORDER_COLOR);
    let landmark_style = PrimitiveStyle::with_fill(LANDMARK_COLOR);
    for &point in &points {
        draw(
            Circle::with_center(point, 2 * (LANDMARK_RADIUS + 1) + 1).into_styled(border_style),
            &mut canvas,
        );
        draw(
            Circle::with_center(point, 2 * LANDMARK_RADIUS + 1).into_styled(landmark_style),
            &mut canvas,
        );
    }

    annotated
}

fn draw<D>(drawable: D, canvas: &mut Canvas<'_>)
where
    D: Drawable<Color = Rgb888, Output = ()>,
{
    match drawable.draw(canvas) {
        Ok(()) => {}
        Err(infallible) => match infallible {},
    }
}

/// Draw target over an RGB image; pixels outside the image are dropped.
struct Canvas<'a>(&'a mut RgbImage);

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && (point.x as u32) < self.0.width()
                && point.y >= 0
                && (point.y as u32) < self.0.height()
            {
                self.0.put_pixel(
                    point.x as u32,
                    point.y as u32,
                    image::Rgb([color.r(), color.g(), color.b()]),
                );
            }
        }

        Ok(())
    }
}
