//! Region-of-interest extraction with whole-image fallback.

use crate::locator::FaceLocator;
use crate::types::BoundingBox;
use image::{imageops, RgbImage};

/// A rectangular crop of a borrowed image. Corners are pixel coordinates
/// with `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy)]
pub struct Region<'a> {
    pub image: &'a RgbImage,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl<'a> Region<'a> {
    /// The whole image as a single region.
    pub fn whole(image: &'a RgbImage) -> Self {
        Self {
            image,
            x1: 0,
            y1: 0,
            x2: image.width(),
            y2: image.height(),
        }
    }

    /// Clamp a located box to the image and convert it to a region.
    /// Returns `None` when nothing of the box remains inside the image.
    pub fn from_box(image: &'a RgbImage, bbox: &BoundingBox) -> Option<Self> {
        let clamp = |v: f32, max: u32| -> u32 {
            // Truncation toward zero, then clamp into [0, max].
            let v = v.trunc();
            if v.is_nan() || v <= 0.0 {
                0
            } else if v >= max as f32 {
                max
            } else {
                v as u32
            }
        };

        let x1 = clamp(bbox.x, image.width());
        let y1 = clamp(bbox.y, image.height());
        let x2 = clamp(bbox.x + bbox.width, image.width());
        let y2 = clamp(bbox.y + bbox.height, image.height());

        (x2 > x1 && y2 > y1).then_some(Self { image, x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Copy the region's pixels out of the source image.
    pub fn crop(&self) -> RgbImage {
        imageops::crop_imm(self.image, self.x1, self.y1, self.width(), self.height()).to_image()
    }
}

/// Extract the regions to classify. Never returns an empty list.
///
/// Localization is best-effort: a missing locator, an error, or no usable
/// boxes all degrade to classifying the whole image.
pub fn extract_regions<'a>(image: &'a RgbImage, locator: Option<&dyn FaceLocator>) -> Vec<Region<'a>> {
    let Some(locator) = locator else {
        return vec![Region::whole(image)];
    };

    let boxes = match locator.locate(image) {
        Ok(boxes) => boxes,
        Err(e) => {
            tracing::warn!(error = %e, "face localization failed; using full image");
            return vec![Region::whole(image)];
        }
    };

    let regions: Vec<Region<'a>> = boxes.iter().filter_map(|b| Region::from_box(image, b)).collect();
    tracing::debug!(located = boxes.len(), usable = regions.len(), "face regions extracted");

    if regions.is_empty() {
        vec![Region::whole(image)]
    } else {
        regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LocatorError;

    struct FixedLocator(Vec<BoundingBox>);

    impl FaceLocator for FixedLocator {
        fn locate(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>, LocatorError> {
            Ok(self.0.clone())
        }
    }

    struct FailingLocator;

    impl FaceLocator for FailingLocator {
        fn locate(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>, LocatorError> {
            Err(LocatorError::InferenceFailed("boom".into()))
        }
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    fn is_whole(r: &Region) -> bool {
        (r.x1, r.y1, r.x2, r.y2) == (0, 0, r.image.width(), r.image.height())
    }

    #[test]
    fn test_no_locator_uses_whole_image() {
        let image = RgbImage::new(40, 30);
        let regions = extract_regions(&image, None);
        assert_eq!(regions.len(), 1);
        assert!(is_whole(&regions[0]));
    }

    #[test]
    fn test_locator_error_falls_back() {
        let image = RgbImage::new(40, 30);
        let regions = extract_regions(&image, Some(&FailingLocator));
        assert_eq!(regions.len(), 1);
        assert!(is_whole(&regions[0]));
    }

    #[test]
    fn test_empty_detection_falls_back() {
        let image = RgbImage::new(40, 30);
        let regions = extract_regions(&image, Some(&FixedLocator(vec![])));
        assert_eq!(regions.len(), 1);
        assert!(is_whole(&regions[0]));
    }

    #[test]
    fn test_boxes_clamped_to_image() {
        let image = RgbImage::new(100, 80);
        let locator = FixedLocator(vec![bbox(-10.0, -5.5, 50.0, 40.0), bbox(70.9, 60.0, 100.0, 100.0)]);
        let regions = extract_regions(&image, Some(&locator));
        assert_eq!(regions.len(), 2);

        let r = &regions[0];
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (0, 0, 40, 34));
        let r = &regions[1];
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (70, 60, 100, 80));
        assert_eq!(r.crop().dimensions(), (30, 20));
    }

    #[test]
    fn test_order_follows_locator() {
        let image = RgbImage::new(100, 100);
        let locator = FixedLocator(vec![bbox(50.0, 50.0, 10.0, 10.0), bbox(0.0, 0.0, 10.0, 10.0)]);
        let regions = extract_regions(&image, Some(&locator));
        assert_eq!(regions[0].x1, 50);
        assert_eq!(regions[1].x1, 0);
    }

    #[test]
    fn test_boxes_outside_image_fall_back() {
        let image = RgbImage::new(50, 50);
        let locator = FixedLocator(vec![bbox(60.0, 60.0, 10.0, 10.0), bbox(-30.0, 0.0, 10.0, 10.0)]);
        let regions = extract_regions(&image, Some(&locator));
        assert_eq!(regions.len(), 1);
        assert!(is_whole(&regions[0]));
    }

    #[test]
    fn test_crop_copies_pixels() {
        let mut image = RgbImage::new(10, 10);
        image.put_pixel(3, 4, image::Rgb([9, 8, 7]));
        let region = Region::from_box(&image, &bbox(3.0, 4.0, 2.0, 2.0)).unwrap();
        let crop = region.crop();
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(crop.get_pixel(0, 0), &image::Rgb([9, 8, 7]));
    }
}
