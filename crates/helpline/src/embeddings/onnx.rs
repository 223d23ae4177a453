//! Local sentence-transformer embeddings through ONNX Runtime
//!
//! Model and tokenizer are fetched from the Hugging Face hub on first start and cached
//! there. Inference runs on the blocking pool, one text at a time, then mean-pools the
//! last hidden state and normalizes it.

use async_trait::async_trait;
use hf_hub::api::tokio::Api;
use ndarray::Array2;
use ort::{session::Session, value::Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

use super::{check_vectors, l2_normalize, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const TOKENIZER_FILE: &str = "tokenizer.json";
const MODEL_FILE: &str = "onnx/model.onnx";
const MAX_SEQUENCE_LENGTH: usize = 256;

struct OnnxModel {
  session: Session,
  tokenizer: Tokenizer,
}

pub struct OnnxProvider {
  model: Arc<Mutex<OnnxModel>>,
  model_name: String,
  dimension: usize,
  batch_size: usize,
}

struct ModelFiles {
  tokenizer_file: PathBuf,
  model_path: PathBuf,
}

// Model initialization
#[cfg(not(tarpaulin_include))]
impl OnnxProvider {
  pub async fn load(config: &EmbeddingConfig) -> Result<Self, String> {
    let model_name = config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
    herald::info!("loading embedding model {model_name}...");

    let files = download_model(&model_name).await?;
    let mut tokenizer = Tokenizer::from_file(files.tokenizer_file)
      .map_err(|e| format!("failed to load tokenizer: {e}"))?;
    tokenizer
      .with_truncation(Some(tokenizers::TruncationParams {
        max_length: MAX_SEQUENCE_LENGTH,
        ..Default::default()
      }))
      .map_err(|e| format!("failed to configure truncation: {e}"))?;

    let session = Session::builder()
      .and_then(|builder| builder.commit_from_file(files.model_path))
      .map_err(|e| format!("failed to load ONNX session: {e}"))?;

    herald::success!("embedding model {model_name} loaded");
    Ok(Self {
      model: Arc::new(Mutex::new(OnnxModel { session, tokenizer })),
      model_name,
      dimension: config.dimension,
      batch_size: config.batch_size.max(1),
    })
  }
}

#[cfg(not(tarpaulin_include))]
async fn download_model(model_name: &str) -> Result<ModelFiles, String> {
  let api = Api::new().map_err(|e| format!("HF API initialization failed: {e}"))?;
  let repo = api.model(model_name.to_string());

  let tokenizer_file =
    repo.get(TOKENIZER_FILE).await.map_err(|e| format!("failed to download tokenizer: {e}"))?;
  let model_path =
    repo.get(MODEL_FILE).await.map_err(|e| format!("failed to download ONNX model: {e}"))?;

  Ok(ModelFiles { tokenizer_file, model_path })
}

// Embedding processing
impl OnnxModel {
  fn embed_one(&mut self, text: &str) -> Result<Vec<f32>, String> {
    let encoding =
      self.tokenizer.encode(text, true).map_err(|e| format!("tokenization failed: {e}"))?;

    let accepts_type_ids = self.session.inputs.iter().any(|input| input.name == "token_type_ids");

    let mut inputs: HashMap<String, Value> = HashMap::new();
    inputs.insert("input_ids".to_string(), to_tensor(encoding.get_ids())?);
    inputs.insert("attention_mask".to_string(), to_tensor(encoding.get_attention_mask())?);
    if accepts_type_ids {
      inputs.insert("token_type_ids".to_string(), to_tensor(encoding.get_type_ids())?);
    }

    let outputs = self.session.run(inputs).map_err(|e| format!("inference failed: {e}"))?;
    let output = outputs
      .get("last_hidden_state")
      .or_else(|| outputs.get("0"))
      .ok_or_else(|| "model produced no last_hidden_state output".to_string())?;

    let (shape, data) =
      output.try_extract_tensor::<f32>().map_err(|e| format!("unexpected output tensor: {e}"))?;

    let mut pooled = mean_pool(shape.as_ref(), data)?;
    l2_normalize(&mut pooled);
    Ok(pooled)
  }
}

fn to_tensor(values: &[u32]) -> Result<Value, String> {
  let ids: Vec<i64> = values.iter().map(|&x| x as i64).collect();
  let array = Array2::from_shape_vec((1, ids.len()), ids).map_err(|e| e.to_string())?;
  Ok(Value::from_array(array).map_err(|e| e.to_string())?.into())
}

/// Average token vectors of a `[1, seq, hidden]` tensor
fn mean_pool(shape: &[i64], data: &[f32]) -> Result<Vec<f32>, String> {
  if shape.len() != 3 {
    return Err(format!("expected a rank-3 hidden state, got shape {shape:?}"));
  }
  let seq_length = shape[1] as usize;
  let hidden_size = shape[2] as usize;
  if seq_length == 0 || data.len() < seq_length * hidden_size {
    return Err("hidden state is empty".to_string());
  }

  let mut pooled = vec![0.0f32; hidden_size];
  for token in data[..seq_length * hidden_size].chunks(hidden_size) {
    for (sum, value) in pooled.iter_mut().zip(token) {
      *sum += value;
    }
  }
  for value in pooled.iter_mut() {
    *value /= seq_length as f32;
  }
  Ok(pooled)
}

#[async_trait]
impl EmbeddingProvider for OnnxProvider {
  fn name(&self) -> String {
    format!("onnx:{}", self.model_name)
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  fn max_batch_size(&self) -> usize {
    self.batch_size
  }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
    let model = self.model.clone();
    let owned = texts.to_vec();

    let vectors = tokio::task::spawn_blocking(move || {
      let mut guard = model.lock().map_err(|_| "embedding model lock poisoned".to_string())?;
      owned.iter().map(|text| guard.embed_one(text)).collect::<Result<Vec<_>, String>>()
    })
    .await
    .map_err(|e| ProviderError::Inference(format!("embedding task failed: {e}")))?
    .map_err(ProviderError::Inference)?;

    check_vectors(&vectors, texts.len(), self.dimension)?;
    Ok(vectors)
  }
}
