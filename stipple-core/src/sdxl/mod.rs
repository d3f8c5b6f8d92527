use std::path::PathBuf;

use anyhow::{Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::Module;
use candle_transformers::models::stable_diffusion::{
    self, clip, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL, StableDiffusionConfig,
};
use hf_hub::api::tokio::{Api, ApiBuilder};
use image::DynamicImage;
use tokenizers::Tokenizer;

use crate::{
    select_best_device, tensor_to_image, token, DeviceMap, GenerationParams, Loader, ModelLike,
};

pub const DEFAULT_MODEL_ID: &str = "stabilityai/stable-diffusion-xl-base-1.0";
pub const DEFAULT_ATTENTION_SLICE_SIZE: usize = 2;

const CLIP_TOKENIZER_REPO: &str = "openai/clip-vit-large-patch14";
const CLIP2_TOKENIZER_REPO: &str = "laion/CLIP-ViT-bigG-14-laion2B-39B-b160k";
// The stock SDXL VAE overflows in f16.
const FP16_VAE_REPO: &str = "madebyollin/sdxl-vae-fp16-fix";
const VAE_SCALE: f64 = 0.13025;
const LATENT_CHANNELS: usize = 4;

/// One CLIP text encoder with its tokenizer, padded to the model's context length.
struct TextEncoder {
    tokenizer: Tokenizer,
    model: clip::ClipTextTransformer,
    pad_id: u32,
    max_len: usize,
}

impl TextEncoder {
    fn new(
        tokenizer_file: PathBuf,
        weights_file: PathBuf,
        config: &clip::Config,
        device: &Device,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(Error::msg)
            .context("failed to load CLIP tokenizer")?;
        let pad_token = config.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(pad_token)
            .with_context(|| format!("pad token {pad_token:?} missing from tokenizer"))?;
        // Text encoders stay in f32; their output is cast to the UNet dtype.
        let model =
            stable_diffusion::build_clip_transformer(config, weights_file, device, DType::F32)
                .context("failed to load CLIP text encoder")?;
        Ok(Self {
            tokenizer,
            model,
            pad_id,
            max_len: config.max_position_embeddings,
        })
    }

    fn encode(&self, text: &str, device: &Device) -> Result<Tensor> {
        let mut tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        tokens.truncate(self.max_len);
        tokens.resize(self.max_len, self.pad_id);
        let tokens = Tensor::new(tokens.as_slice(), device)?.unsqueeze(0)?;
        Ok(self.model.forward(&tokens)?)
    }
}

pub struct SdxlModel {
    device: Device,
    dtype: DType,
    sliced_attention_size: Option<usize>,
    clip: TextEncoder,
    clip2: TextEncoder,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
}

impl SdxlModel {
    /// Embeddings from both encoders concatenated on the hidden axis. With
    /// guidance the batch is `[unconditional, prompt]`.
    fn text_embeddings(&self, prompt: &str, use_guidance: bool) -> Result<Tensor> {
        let mut embeddings = Vec::with_capacity(2);
        for encoder in [&self.clip, &self.clip2] {
            let cond = encoder.encode(prompt, &self.device)?;
            let emb = if use_guidance {
                let uncond = encoder.encode("", &self.device)?;
                Tensor::cat(&[uncond, cond], 0)?
            } else {
                cond
            };
            embeddings.push(emb.to_dtype(self.dtype)?);
        }
        Ok(Tensor::cat(&embeddings, D::Minus1)?)
    }
}

impl ModelLike for SdxlModel {
    fn run(&self, params: &GenerationParams) -> Result<DynamicImage> {
        // Flush pending kernels before a new generation claims memory.
        self.device.synchronize()?;

        // At a scale of 1.0 the guided and unguided predictions coincide.
        let use_guidance = params.guidance_scale > 1.0;
        let text_embeddings = self.text_embeddings(&params.prompt, use_guidance)?;

        let config = StableDiffusionConfig::sdxl(
            self.sliced_attention_size,
            Some(params.height),
            Some(params.width),
        );
        let mut scheduler = config.build_scheduler(params.steps)?;
        let timesteps = scheduler.timesteps().to_vec();

        let noise = Tensor::randn(
            0f32,
            1f32,
            (1, LATENT_CHANNELS, params.height / 8, params.width / 8),
            &self.device,
        )?;
        let mut latents = (noise * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        for (index, &timestep) in timesteps.iter().enumerate() {
            let model_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let model_input = scheduler.scale_model_input(model_input, timestep)?;
            let noise_pred = self
                .unet
                .forward(&model_input, timestep as f64, &text_embeddings)?;
            let noise_pred = if use_guidance {
                let chunks = noise_pred.chunk(2, 0)?;
                let (uncond, cond) = (&chunks[0], &chunks[1]);
                (uncond + ((cond - uncond)? * params.guidance_scale)?)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            tracing::debug!(step = index + 1, total = timesteps.len(), "denoising step done");
        }

        let decoded = self.vae.decode(&(latents / VAE_SCALE)?)?;
        let img = ((decoded / 2.)? + 0.5)?
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F32)?;
        let img = (img.clamp(0f32, 1f32)? * 255.)?.to_dtype(DType::U8)?;
        tensor_to_image(&img.i(0)?)
    }
}

#[derive(Debug, Clone)]
pub struct SdxlLoader {
    pub model_id: String,
    pub device_map: DeviceMap,
    /// Attention slice size used on accelerators; `None` disables slicing.
    pub attention_slice_size: Option<usize>,
    pub use_flash_attn: bool,
}

impl Default for SdxlLoader {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            device_map: DeviceMap::default(),
            attention_slice_size: Some(DEFAULT_ATTENTION_SLICE_SIZE),
            use_flash_attn: cfg!(feature = "flash-attn"),
        }
    }
}

fn weights_file(component: &str, stem: &str, dtype: DType) -> String {
    match dtype {
        DType::F16 => format!("{component}/{stem}.fp16.safetensors"),
        _ => format!("{component}/{stem}.safetensors"),
    }
}

fn hub_api() -> Result<Api> {
    let builder = ApiBuilder::new().with_progress(false);
    let builder = match token::hub_token() {
        Some(token) => {
            tracing::info!("authenticating with the Hugging Face hub");
            builder.with_token(Some(token))
        }
        None => {
            tracing::warn!(
                "no HF_TOKEN or HUGGINGFACE_TOKEN found, gated SDXL weights require authentication"
            );
            builder
        }
    };
    builder.build().context("failed to build Hugging Face hub client")
}

impl Loader for SdxlLoader {
    type Model = SdxlModel;

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn load(&self) -> Result<Self::Model> {
        let api = hub_api()?;

        let device = select_best_device(self.device_map).context("failed to set up device")?;
        let (dtype, sliced_attention_size) = if device.is_cpu() {
            (DType::F32, None)
        } else {
            (DType::F16, self.attention_slice_size)
        };
        tracing::info!(?device, ?dtype, ?sliced_attention_size, "selected device");

        let config = StableDiffusionConfig::sdxl(sliced_attention_size, None, None);
        let clip2_config = config
            .clip2
            .as_ref()
            .context("SDXL config has no second text encoder")?;
        let repo = api.model(self.model_id.clone());

        // --- Text encoders ---
        let clip_tokenizer = api
            .model(CLIP_TOKENIZER_REPO.to_string())
            .get("tokenizer.json")
            .await
            .context("failed to get CLIP tokenizer")?;
        let clip_weights = repo
            .get(&weights_file("text_encoder", "model", dtype))
            .await
            .context("failed to get CLIP weights")?;
        let clip = TextEncoder::new(clip_tokenizer, clip_weights, &config.clip, &device)?;

        let clip2_tokenizer = api
            .model(CLIP2_TOKENIZER_REPO.to_string())
            .get("tokenizer.json")
            .await
            .context("failed to get second CLIP tokenizer")?;
        let clip2_weights = repo
            .get(&weights_file("text_encoder_2", "model", dtype))
            .await
            .context("failed to get second CLIP weights")?;
        let clip2 = TextEncoder::new(clip2_tokenizer, clip2_weights, clip2_config, &device)?;

        // --- UNet ---
        let unet_weights = repo
            .get(&weights_file("unet", "diffusion_pytorch_model", dtype))
            .await
            .context("failed to get UNet weights")?;
        let unet = config
            .build_unet(
                unet_weights,
                &device,
                LATENT_CHANNELS,
                self.use_flash_attn,
                dtype,
            )
            .context("failed to load UNet")?;

        // --- VAE ---
        let vae_weights = match dtype {
            DType::F16 => api
                .model(FP16_VAE_REPO.to_string())
                .get("diffusion_pytorch_model.safetensors")
                .await
                .context("failed to get fp16 VAE weights")?,
            _ => repo
                .get(&weights_file("vae", "diffusion_pytorch_model", dtype))
                .await
                .context("failed to get VAE weights")?,
        };
        let vae = config
            .build_vae(vae_weights, &device, dtype)
            .context("failed to load VAE")?;

        Ok(SdxlModel {
            device,
            dtype,
            sliced_attention_size,
            clip,
            clip2,
            unet,
            vae,
        })
    }
}
