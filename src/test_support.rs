/// Fixtures shared by the unit tests

use crate::annotate::{CAPTION_PROMPT, KEYWORDS_PROMPT};
use crate::config::{Configuration, LanguageCode};
use crate::error::InferenceError;
use crate::iptc::iim::{self, DataSet};
use crate::iptc::jpeg::JpegFile;
use crate::vision::client::VisionModel;
use crate::vision::preprocess::ImagePayload;
use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// A small gradient JPEG with no metadata
pub fn plain_jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, 128])
    });
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode_image(&img)
        .unwrap();
    bytes
}

/// Write a 32x24 JPEG without metadata
pub fn write_plain_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, plain_jpeg_bytes(32, 24)).unwrap();
    path
}

/// Write a 32x24 JPEG carrying the given IIM datasets
pub fn write_jpeg_with_iptc(dir: &Path, name: &str, datasets: &[DataSet]) -> PathBuf {
    let mut jpeg = JpegFile::parse(&plain_jpeg_bytes(32, 24)).unwrap();
    jpeg.set_iptc_block(iim::serialize(datasets)).unwrap();

    let path = dir.join(name);
    fs::write(&path, jpeg.to_bytes()).unwrap();
    path
}

/// A run configuration pointing at `dir`
pub fn test_config(dir: &Path, overwrite: bool, language: &str) -> Configuration {
    Configuration {
        model: "llava:7b".to_string(),
        base_url: "http://127.0.0.1:9".to_string(),
        timeout: Duration::from_secs(1),
        directory: dir.to_path_buf(),
        overwrite,
        language: LanguageCode::parse(language).unwrap(),
    }
}

/// Vision model answering from a script and recording the prompts it saw
pub struct ScriptedModel {
    keywords: Result<&'static str, ()>,
    caption: Result<&'static str, ()>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// `Err(())` makes the matching request fail like an unreachable server
    pub fn new(keywords: Result<&'static str, ()>, caption: Result<&'static str, ()>) -> Self {
        Self {
            keywords,
            caption,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _image: &ImagePayload) -> Result<String, InferenceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let answer = if prompt == KEYWORDS_PROMPT {
            self.keywords
        } else if prompt == CAPTION_PROMPT {
            self.caption
        } else {
            panic!("unexpected prompt: {}", prompt);
        };

        answer
            .map(str::to_string)
            .map_err(|_| InferenceError::Status(503))
    }
}
