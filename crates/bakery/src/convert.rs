use image::RgbaImage;

use crate::error::ConversionError;
use crate::gpu::Readback;

/// Maps one float channel to a byte: clamp to `[0, 1]`, scale by 255.99 and
/// truncate. NaN becomes 0.
pub fn to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.99) as u8
}

/// Converts a bottom-up float readback into a top-down RGBA8 image.
pub fn convert(readback: &Readback) -> Result<RgbaImage, ConversionError> {
    if readback.channels != 4 {
        return Err(ConversionError::Channels(readback.channels));
    }
    let width = readback.width as usize;
    let height = readback.height as usize;
    let expected = width * height * 4;
    if readback.texels.len() != expected {
        return Err(ConversionError::Shape {
            width: readback.width,
            height: readback.height,
            expected,
            actual: readback.texels.len(),
        });
    }

    let mut pixels = Vec::with_capacity(expected);
    if width > 0 {
        for row in readback.texels.chunks_exact(width * 4).rev() {
            pixels.extend(row.iter().copied().map(to_byte));
        }
    }

    RgbaImage::from_raw(readback.width, readback.height, pixels).ok_or(ConversionError::Shape {
        width: readback.width,
        height: readback.height,
        expected,
        actual: readback.texels.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readback(width: u32, height: u32, texels: Vec<f32>) -> Readback {
        Readback {
            width,
            height,
            channels: 4,
            texels,
        }
    }

    #[test]
    fn maps_extremes_and_clamps() {
        assert_eq!(to_byte(0.0), 0);
        assert_eq!(to_byte(1.0), 255);
        assert_eq!(to_byte(-3.5), 0);
        assert_eq!(to_byte(42.0), 255);
        assert_eq!(to_byte(f32::NAN), 0);
        assert_eq!(to_byte(f32::INFINITY), 255);
    }

    #[test]
    fn round_trips_within_one_unit() {
        for byte in 0..=255u8 {
            let back = to_byte(f32::from(byte) / 255.0);
            assert!((i16::from(back) - i16::from(byte)).abs() <= 1, "{byte} -> {back}");
        }
    }

    #[test]
    fn flips_rows_to_top_down() {
        // bottom row red, top row green
        let texels = vec![
            1.0, 0.0, 0.0, 1.0, //
            0.0, 1.0, 0.0, 1.0,
        ];
        let image = convert(&readback(1, 2, texels)).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(image.get_pixel(0, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let err = convert(&readback(2, 2, vec![0.0; 12])).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Shape {
                width: 2,
                height: 2,
                expected: 16,
                actual: 12
            }
        );

        let mut three = readback(1, 1, vec![0.0; 3]);
        three.channels = 3;
        assert_eq!(convert(&three).unwrap_err(), ConversionError::Channels(3));
    }
}
