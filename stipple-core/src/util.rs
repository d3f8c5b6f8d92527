use std::io::Cursor;

use anyhow::Result;
use base64::{prelude::BASE64_STANDARD, Engine};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Tensor};
use image::DynamicImage;

use crate::DeviceMap;

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    match device_map {
        DeviceMap::ForceCpu => Ok(Device::Cpu),
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Ok(Device::new_cuda(ordinal)?),
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Ok(Device::new_metal(ordinal)?),
        DeviceMap::Ordinal(_) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                tracing::warn!(
                    "running on CPU, build with `--features metal` to run on GPU (this will be slow)"
                );
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                tracing::warn!(
                    "running on CPU, build with `--features cuda` to run on GPU (this will be slow)"
                );
            }
            Ok(Device::Cpu)
        }
    }
}

/// Converts a decoded VAE sample into an RGB image. The VAE emits channel-major
/// `(3, height, width)` planes; callers rescale to u8 and move to CPU first.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_image expects an image with 3 channels, got {channels}");
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| anyhow::anyhow!("error converting tensor to image buffer"))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

/// Encodes an image as PNG and wraps it in a `data:image/png;base64,` URI.
pub fn image_to_data_uri(img: &DynamicImage) -> Result<String> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(format!("{PNG_DATA_URI_PREFIX}{}", BASE64_STANDARD.encode(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn data_uri_holds_a_decodable_png() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(16, 8, image::Rgb([255, 0, 0])));
        let uri = image_to_data_uri(&img).unwrap();

        let payload = uri.strip_prefix(PNG_DATA_URI_PREFIX).unwrap();
        let bytes = BASE64_STANDARD.decode(payload).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn tensor_to_image_keeps_channel_layout() {
        // Channel-major: R plane all 10, G plane all 20, B plane all 30.
        let planes: Vec<u8> = [10u8, 20, 30]
            .iter()
            .flat_map(|v| std::iter::repeat(*v).take(6))
            .collect();
        let tensor = Tensor::from_vec(planes, (3, 2, 3), &Device::Cpu).unwrap();
        let img = tensor_to_image(&tensor).unwrap().to_rgb8();

        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [10, 20, 30]);
    }

    #[test]
    fn tensor_to_image_rejects_non_rgb() {
        let tensor = Tensor::zeros((1, 4, 4), DType::U8, &Device::Cpu).unwrap();
        assert!(tensor_to_image(&tensor).is_err());
    }
}
