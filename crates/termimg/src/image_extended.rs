use fast_image_resize::{PixelType, Resizer, images::Image};
use image::{DynamicImage, GenericImageView, RgbaImage};

use crate::error::{Error, Result};

pub trait FitImage {
    /// shrinks the image so it fits inside `max_width` x `max_height` pixels.
    /// never upscales. when `preserve_aspect_ratio` is false the image is stretched to the box.
    /// # example:
    /// ```
    /// use termimg::image_extended::FitImage;
    ///
    /// let img = image::DynamicImage::new_rgba8(400, 200);
    /// let fitted = img.fit_into(100, 100, true).unwrap();
    /// assert_eq!(fitted.dimensions(), (100, 50));
    /// ```
    fn fit_into(
        &self,
        max_width: u32,
        max_height: u32,
        preserve_aspect_ratio: bool,
    ) -> Result<RgbaImage>;
}

impl FitImage for DynamicImage {
    fn fit_into(
        &self,
        max_width: u32,
        max_height: u32,
        preserve_aspect_ratio: bool,
    ) -> Result<RgbaImage> {
        let (src_width, src_height) = self.dimensions();
        if src_width == 0 || src_height == 0 || max_width == 0 || max_height == 0 {
            return Err(Error::EmptyImage);
        }

        let (new_width, new_height) = if preserve_aspect_ratio {
            if src_width <= max_width && src_height <= max_height {
                (src_width, src_height)
            } else {
                calc_fit(src_width, src_height, max_width, max_height)
            }
        } else {
            (src_width.min(max_width), src_height.min(max_height))
        };

        let src = DynamicImage::ImageRgba8(self.to_rgba8());
        if (new_width, new_height) == (src_width, src_height) {
            return Ok(src.into_rgba8());
        }

        let mut dst_image = Image::new(new_width.max(1), new_height.max(1), PixelType::U8x4);
        let mut resizer = Resizer::new();
        resizer.resize(&src, &mut dst_image, None)?;

        RgbaImage::from_raw(dst_image.width(), dst_image.height(), dst_image.into_vec())
            .ok_or(Error::EmptyImage)
    }
}

/// calculates the dimensions of an image into fit bounding box
/// # example:
/// ```
/// use termimg::image_extended::calc_fit;
///
/// let (new_width, new_height) = calc_fit(1920, 1080, 800, 400);
/// assert_eq!((new_width, new_height), (711, 400));
/// ```
/// the above returns dimensions close to 800x400 that maintain the aspect ratio of 1920x1080
pub fn calc_fit(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> (u32, u32) {
    let src_ar = src_width as f32 / src_height as f32;
    let dst_ar = dst_width as f32 / dst_height as f32;

    if src_ar > dst_ar {
        // Image is wider than target: scale by width
        let scaled_height = (dst_width as f32 / src_ar).round() as u32;
        (dst_width, scaled_height.max(1))
    } else {
        // Image is taller than target: scale by height
        let scaled_width = (dst_height as f32 * src_ar).round() as u32;
        (scaled_width.max(1), dst_height)
    }
}
