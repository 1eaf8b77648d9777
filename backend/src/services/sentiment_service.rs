use crate::error::{AnalysisError, Result};
use crate::models::SentimentLabel;
use anyhow::{anyhow, bail, Context};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Every text is truncated and padded to exactly this many tokens.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

const NUM_LABELS: usize = 3;

pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<SentimentLabel>;

    /// Labels must not depend on how texts are grouped into batches.
    fn classify_batch(&self, texts: &[String]) -> Result<Vec<SentimentLabel>> {
        texts.iter().map(|text| self.classify(text)).collect()
    }
}

#[derive(Debug, Deserialize)]
struct ClassificationHeadConfig {
    dim: usize,
    #[serde(default)]
    id2label: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    do_lower_case: Option<bool>,
}

/// DistilBERT encoder with a sequence-classification head, loaded once at startup.
pub struct InferenceEngine {
    model: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
}

impl InferenceEngine {
    /// Loads `config.json`, the weights (`model.safetensors` or `pytorch_model.bin`)
    /// and a tokenizer (`tokenizer.json` or `vocab.txt`) from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        Self::try_load(model_dir).map_err(|e| AnalysisError::ModelUnavailable {
            path: model_dir.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    fn try_load(model_dir: &Path) -> anyhow::Result<Self> {
        if !model_dir.is_dir() {
            bail!("model directory not found");
        }

        let device = Device::cuda_if_available(0)?;
        info!(
            "Loading sentiment model from {} on {}",
            model_dir.display(),
            if device.is_cuda() { "CUDA" } else { "CPU" }
        );

        let config_json = std::fs::read_to_string(model_dir.join("config.json"))
            .context("failed to read config.json")?;

        let safetensors = model_dir.join("model.safetensors");
        let pytorch = model_dir.join("pytorch_model.bin");
        let vb = if safetensors.is_file() {
            unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, &device)? }
        } else if pytorch.is_file() {
            VarBuilder::from_pth(&pytorch, DType::F32, &device)?
        } else {
            bail!("no model.safetensors or pytorch_model.bin found");
        };

        let tokenizer = load_tokenizer(model_dir)?;
        let engine = Self::from_parts(vb, &config_json, tokenizer, device)?;
        info!("Sentiment model loaded");
        Ok(engine)
    }

    fn from_parts(
        vb: VarBuilder,
        config_json: &str,
        mut tokenizer: Tokenizer,
        device: Device,
    ) -> anyhow::Result<Self> {
        let config: DistilBertConfig =
            serde_json::from_str(config_json).context("invalid config.json")?;
        let head: ClassificationHeadConfig =
            serde_json::from_str(config_json).context("invalid config.json")?;

        if let Some(labels) = &head.id2label {
            if labels.len() != NUM_LABELS {
                bail!("expected {NUM_LABELS} classes, config.json declares {}", labels.len());
            }
        }

        // Sequence-classification checkpoints nest the encoder under `distilbert.`.
        let model = DistilBertModel::load(vb.pp("distilbert"), &config)?;
        let pre_classifier = linear(head.dim, head.dim, vb.pp("pre_classifier"))?;
        let classifier = linear(head.dim, NUM_LABELS, vb.pp("classifier"))?;

        configure_tokenizer(&mut tokenizer)?;

        Ok(InferenceEngine {
            model,
            pre_classifier,
            classifier,
            tokenizer,
            device,
        })
    }

    /// Raw class scores, one row of `[negative, neutral, positive]` per text.
    pub fn logits(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut input_ids = Vec::with_capacity(texts.len() * MAX_SEQUENCE_LENGTH);
        let mut padding_mask = Vec::with_capacity(texts.len() * MAX_SEQUENCE_LENGTH);
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| AnalysisError::Inference(format!("tokenization failed: {e}")))?;
            if encoding.get_ids().len() != MAX_SEQUENCE_LENGTH {
                return Err(AnalysisError::Inference(format!(
                    "expected {MAX_SEQUENCE_LENGTH} tokens, got {}",
                    encoding.get_ids().len()
                )));
            }
            input_ids.extend_from_slice(encoding.get_ids());
            // The encoder masks positions set to 1.
            padding_mask.extend(encoding.get_attention_mask().iter().map(|&m| u8::from(m == 0)));
        }

        let batch = texts.len();
        let input_ids = Tensor::from_vec(input_ids, (batch, MAX_SEQUENCE_LENGTH), &self.device)?;
        let padding_mask =
            Tensor::from_vec(padding_mask, (batch, 1, 1, MAX_SEQUENCE_LENGTH), &self.device)?;

        let hidden = self.model.forward(&input_ids, &padding_mask)?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pre_classifier.forward(&cls)?.relu()?;
        let logits = self.classifier.forward(&pooled)?;

        debug!("Classified batch of {batch}");
        Ok(logits.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }
}

impl SentimentClassifier for InferenceEngine {
    fn classify(&self, text: &str) -> Result<SentimentLabel> {
        self.classify_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| AnalysisError::Inference("model returned no prediction".to_string()))
    }

    fn classify_batch(&self, texts: &[String]) -> Result<Vec<SentimentLabel>> {
        self.logits(texts)?
            .iter()
            .map(|row| {
                argmax(row)
                    .and_then(SentimentLabel::from_class_index)
                    .ok_or_else(|| AnalysisError::Inference(format!("unexpected logits {row:?}")))
            })
            .collect()
    }
}

/// Index of the highest score; ties go to the lowest index and NaNs are ignored.
pub(crate) fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

fn load_tokenizer(model_dir: &Path) -> anyhow::Result<Tokenizer> {
    let tokenizer_json = model_dir.join("tokenizer.json");
    if tokenizer_json.is_file() {
        return Tokenizer::from_file(&tokenizer_json)
            .map_err(|e| anyhow!("failed to load tokenizer.json: {e}"));
    }

    let vocab = model_dir.join("vocab.txt");
    if !vocab.is_file() {
        bail!("no tokenizer.json or vocab.txt found");
    }

    let lowercase = std::fs::read_to_string(model_dir.join("tokenizer_config.json"))
        .ok()
        .and_then(|raw| serde_json::from_str::<TokenizerConfig>(&raw).ok())
        .unwrap_or_default()
        .do_lower_case
        .unwrap_or(true);

    wordpiece_tokenizer(&vocab, lowercase)
}

/// Assembles the BERT WordPiece pipeline from a plain `vocab.txt`.
fn wordpiece_tokenizer(vocab: &Path, lowercase: bool) -> anyhow::Result<Tokenizer> {
    let vocab = vocab
        .to_str()
        .ok_or_else(|| anyhow!("vocab path is not valid UTF-8"))?;
    let wordpiece = WordPiece::from_file(vocab)
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| anyhow!("failed to load vocab.txt: {e}"))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::new(true, true, None, lowercase)));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));

    let cls = tokenizer
        .token_to_id("[CLS]")
        .ok_or_else(|| anyhow!("vocab.txt has no [CLS] token"))?;
    let sep = tokenizer
        .token_to_id("[SEP]")
        .ok_or_else(|| anyhow!("vocab.txt has no [SEP] token"))?;
    tokenizer.with_post_processor(Some(BertProcessing::new(
        ("[SEP]".to_string(), sep),
        ("[CLS]".to_string(), cls),
    )));

    Ok(tokenizer)
}

fn configure_tokenizer(tokenizer: &mut Tokenizer) -> anyhow::Result<()> {
    let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::Fixed(MAX_SEQUENCE_LENGTH),
        pad_id,
        pad_token: "[PAD]".to_string(),
        ..Default::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQUENCE_LENGTH,
            ..Default::default()
        }))
        .map_err(|e| anyhow!("failed to configure truncation: {e}"))?;
    Ok(())
}
